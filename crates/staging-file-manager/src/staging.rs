//! Staging directories with unguessable file names.

use crate::{
    error::{Result, StagingError},
    security::{is_within, sanitize_file_name, set_secure_permissions},
};

use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// A file written into a staging directory.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// A server-controlled directory for temporary uploads and outputs.
///
/// Every name handed out starts with a random UUID, so concurrent writers never
/// collide and clients cannot guess paths of other sessions.
#[derive(Clone, Debug)]
pub struct StagingArea {
    base_dir: PathBuf,
}

impl StagingArea {
    /// Create a new builder for configuring the staging area.
    #[must_use]
    pub fn builder() -> StagingAreaBuilder {
        StagingAreaBuilder::new()
    }

    /// Base directory of this staging area.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Fresh path of the form `<uuid>.<extension>`.
    ///
    /// The extension is expected to be a normalized format identifier; it is
    /// sanitized anyway so it can never introduce path separators.
    #[must_use]
    pub fn unique_path_with_extension(&self, extension: &str) -> PathBuf {
        let id = Uuid::new_v4().simple();
        let extension = sanitize_file_name(extension);
        self.base_dir.join(format!("{id}.{extension}"))
    }

    /// Fresh path of the form `<uuid>_<sanitized display name>`.
    #[must_use]
    pub fn unique_path_for(&self, display_name: &str) -> PathBuf {
        let id = Uuid::new_v4().simple();
        self.base_dir
            .join(format!("{id}_{}", sanitize_file_name(display_name)))
    }

    /// Write `contents` under a fresh `<uuid>.<extension>` name.
    ///
    /// # Errors
    /// Returns an error if the underlying write fails.
    pub async fn stage_bytes<C: AsRef<[u8]>>(
        &self,
        display_name: &str,
        extension: &str,
        contents: C,
    ) -> Result<StagedFile> {
        let path = self.unique_path_with_extension(extension);
        let contents = contents.as_ref();

        fs::write(&path, contents).await?;

        tracing::trace!(
            "Staged '{}' ({} bytes) at {}",
            display_name,
            contents.len(),
            path.display()
        );

        Ok(StagedFile {
            path,
            size_bytes: contents.len() as u64,
        })
    }

    /// Whether `path` resolves inside this staging area.
    pub async fn contains(&self, path: &Path) -> bool {
        is_within(path, &self.base_dir).await
    }

    /// List entries left in the staging directory by a previous process.
    ///
    /// Regular files are always included; directories only when their name
    /// starts with one of `scratch_prefixes`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    pub async fn leftovers(&self, scratch_prefixes: &[&str]) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.base_dir).await?;
        let mut found = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let is_scratch = file_type.is_dir()
                && entry.file_name().to_str().is_some_and(|name| {
                    scratch_prefixes
                        .iter()
                        .any(|prefix| name.starts_with(prefix))
                });
            if file_type.is_file() || is_scratch {
                found.push(entry.path());
            }
        }

        Ok(found)
    }
}

/// Builder for configuring a `StagingArea`.
pub struct StagingAreaBuilder {
    base_directory: Option<PathBuf>,
}

impl StagingAreaBuilder {
    fn new() -> Self {
        Self {
            base_directory: None,
        }
    }

    /// Set the base directory for staged files.
    #[must_use]
    pub fn base_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base_directory = Some(path.into());
        self
    }

    /// Build the `StagingArea`, creating the directory with owner-only
    /// permissions.
    ///
    /// # Errors
    /// Returns an error if the base directory is not set or cannot be created
    /// or secured.
    pub async fn build(self) -> Result<StagingArea> {
        let base_dir = self
            .base_directory
            .ok_or_else(|| StagingError::Configuration {
                message: "Base directory is required".to_string(),
            })?;

        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| StagingError::DirectoryCreation {
                path: base_dir.clone(),
                source: e,
            })?;

        set_secure_permissions(&base_dir).await?;

        tracing::info!("StagingArea initialized - base_dir: {:?}", base_dir);

        Ok(StagingArea { base_dir })
    }
}
