//! Zip packaging of multi-file deliverables.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use crate::errors::{AppError, AppResult};
use crate::models::file_stem;

/// Reduce an entry name to its base name so archives cannot carry paths.
fn sanitize_archive_filename(filename: &str, fallback: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(fallback)
        .to_string()
}

/// `name.ext`, `name (1).ext`, `name (2).ext`, ...
fn disambiguate(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let stem = file_stem(name);
    let extension = &name[stem.len()..];
    (1..)
        .map(|n| format!("{stem} ({n}){extension}"))
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or_else(|| name.to_string())
}

/// Write `files` into a new zip at `destination`, each entry named by its
/// display name.
pub async fn zip_files(files: Vec<(PathBuf, String)>, destination: PathBuf) -> AppResult<()> {
    tokio::task::spawn_blocking(move || write_zip(&files, &destination)).await?
}

fn write_zip(files: &[(PathBuf, String)], destination: &Path) -> AppResult<()> {
    let file = File::create(destination).map_err(|e| {
        AppError::archive(format!("Failed to create {}: {e}", destination.display()))
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut taken = HashSet::new();
    for (index, (path, display_name)) in files.iter().enumerate() {
        let safe_name = sanitize_archive_filename(display_name, &format!("file_{}", index + 1));
        let entry_name = disambiguate(&safe_name, &mut taken);

        let mut source = File::open(path)
            .map_err(|e| AppError::archive(format!("Failed to open {}: {e}", path.display())))?;
        zip.start_file(entry_name.as_str(), options)
            .map_err(|e| AppError::archive(format!("Failed to add {entry_name} to zip: {e}")))?;
        std::io::copy(&mut source, &mut zip)
            .map_err(|e| AppError::archive(format!("Failed to write {entry_name} to zip: {e}")))?;
    }

    let mut writer = zip
        .finish()
        .map_err(|e| AppError::archive(format!("Failed to finalize zip: {e}")))?;
    writer
        .flush()
        .map_err(|e| AppError::archive(format!("Failed to finalize zip: {e}")))?;

    tracing::debug!(
        "Packaged {} file(s) into {}",
        files.len(),
        destination.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_sanitize_archive_filename() {
        assert_eq!(sanitize_archive_filename("../../etc/passwd", "fallback"), "passwd");
        assert_eq!(sanitize_archive_filename("report.pdf", "fallback"), "report.pdf");
        assert_eq!(sanitize_archive_filename("..", "fallback"), "fallback");
        assert_eq!(sanitize_archive_filename("", "fallback"), "fallback");
    }

    #[test]
    fn test_disambiguate() {
        let mut taken = HashSet::new();
        assert_eq!(disambiguate("report.pdf", &mut taken), "report.pdf");
        assert_eq!(disambiguate("report.pdf", &mut taken), "report (1).pdf");
        assert_eq!(disambiguate("report.pdf", &mut taken), "report (2).pdf");
        assert_eq!(disambiguate("README", &mut taken), "README");
        assert_eq!(disambiguate("README", &mut taken), "README (1)");
    }

    #[tokio::test]
    async fn test_zip_uses_display_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let a = temp_dir.path().join("0f3a_a.pdf");
        let b = temp_dir.path().join("9bc1_b.pdf");
        std::fs::write(&a, "first").unwrap();
        std::fs::write(&b, "second").unwrap();
        let destination = temp_dir.path().join("bundle.zip");

        zip_files(
            vec![
                (a, "notes.pdf".to_string()),
                (b, "notes.pdf".to_string()),
            ],
            destination.clone(),
        )
        .await
        .unwrap();

        assert_eq!(
            entry_names(&destination),
            vec!["notes.pdf".to_string(), "notes (1).pdf".to_string()]
        );

        let mut archive = zip::ZipArchive::new(File::open(&destination).unwrap()).unwrap();
        let mut contents = String::new();
        archive
            .by_name("notes (1).pdf")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "second");
    }

    #[tokio::test]
    async fn test_missing_input_is_an_archive_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = zip_files(
            vec![(temp_dir.path().join("gone.pdf"), "gone.pdf".to_string())],
            temp_dir.path().join("bundle.zip"),
        )
        .await;
        assert!(matches!(result, Err(AppError::Archive { .. })));
    }
}
