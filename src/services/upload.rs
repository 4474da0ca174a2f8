//! Upload ingestion: validate, stage, suggest, issue the upload token.

use axum::body::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use staging_file_manager::security::base_file_name;
use staging_file_manager::{CleanupScheduler, StagedFile, StagingArea};

use crate::config::LimitsConfig;
use crate::config::human_serde::byte_size;
use crate::conversion::ConversionRegistry;
use crate::errors::{AppError, AppResult};
use crate::models::{Format, UploadResponse, UploadSession};
use crate::services::token_codec::TokenCodec;

/// One file part of an upload request
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub data: Bytes,
}

/// A file that passed validation and is ready to be written
struct AcceptedFile<'a> {
    name: &'a str,
    format: Format,
    data: &'a Bytes,
}

#[derive(Clone)]
pub struct UploadService {
    registry: Arc<ConversionRegistry>,
    codec: TokenCodec,
    upload_area: StagingArea,
    cleanup: CleanupScheduler,
    limits: LimitsConfig,
    cleanup_delay: Duration,
    token_ttl: Duration,
}

impl UploadService {
    pub fn new(
        registry: Arc<ConversionRegistry>,
        codec: TokenCodec,
        upload_area: StagingArea,
        cleanup: CleanupScheduler,
        limits: LimitsConfig,
        cleanup_delay: Duration,
        token_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            codec,
            upload_area,
            cleanup,
            limits,
            cleanup_delay,
            token_ttl,
        }
    }

    /// Stage `files` and issue an upload token for them.
    ///
    /// Every file is validated before the first one is written, so a rejected
    /// batch leaves nothing on disk.
    pub async fn ingest(&self, files: &[IncomingFile]) -> AppResult<UploadResponse> {
        let accepted = self.validate(files)?;

        let mut staged: Vec<StagedFile> = Vec::with_capacity(accepted.len());
        for file in &accepted {
            match self
                .upload_area
                .stage_bytes(file.name, file.format.as_str(), file.data)
                .await
            {
                Ok(staged_file) => staged.push(staged_file),
                Err(e) => {
                    warn!("Failed to stage upload '{}': {}", file.name, e);
                    self.cleanup.schedule(&staged, Duration::ZERO);
                    return Err(e.into());
                }
            }
        }

        // Cleanup is owed whether or not the client ever comes back.
        self.cleanup.schedule(&staged, self.cleanup_delay);

        let session = UploadSession {
            files: staged.iter().map(|file| file.path.clone()).collect(),
            original_names: accepted.iter().map(|file| file.name.to_string()).collect(),
        };
        let token = self.codec.issue(&session, self.token_ttl)?;

        let extensions: Vec<Format> = accepted.iter().map(|file| file.format.clone()).collect();
        let suggested_outputs = self.registry.suggest_outputs(&extensions);

        info!(
            "Accepted upload of {} file(s) ({} bytes): {}",
            staged.len(),
            staged.iter().map(|file| file.size_bytes).sum::<u64>(),
            session.original_names.join(", ")
        );

        Ok(UploadResponse {
            token,
            original_names: session.original_names,
            extensions,
            suggested_outputs,
        })
    }

    fn validate<'a>(&self, files: &'a [IncomingFile]) -> AppResult<Vec<AcceptedFile<'a>>> {
        if files.is_empty() {
            return Err(AppError::invalid_input("No files uploaded"));
        }

        if files.len() > self.limits.max_files {
            return Err(AppError::invalid_input(format!(
                "Too many files: {} (max {})",
                files.len(),
                self.limits.max_files
            )));
        }

        files
            .iter()
            .map(|file| {
                let name = base_file_name(&file.file_name)
                    .ok_or_else(|| AppError::invalid_input("Invalid file name"))?;

                let format = Format::from_file_name(name)
                    .filter(|format| self.registry.is_known_format(format))
                    .ok_or_else(|| {
                        AppError::invalid_input(format!("Unsupported format: {name}"))
                    })?;

                if file.data.len() as u64 > self.limits.max_file_size {
                    return Err(AppError::invalid_input(format!(
                        "File too large: {name} (max {})",
                        byte_size::format(self.limits.max_file_size)
                    )));
                }

                Ok(AcceptedFile {
                    name,
                    format,
                    data: &file.data,
                })
            })
            .collect()
    }
}
