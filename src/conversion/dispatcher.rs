//! Batch conversion of an upload session into one deliverable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use staging_file_manager::{CleanupScheduler, StagingArea};

use super::backend::{ConversionBackend, ConversionJob};
use super::capability::Capability;
use super::registry::ConversionRegistry;
use crate::errors::{AppError, AppResult};
use crate::models::{DownloadDescriptor, DownloadTicket, Format, UploadSession, file_stem};
use crate::services::archive;
use crate::services::token_codec::TokenCodec;

/// Display name of a multi-file deliverable
pub const ARCHIVE_DISPLAY_NAME: &str = "converted_files.zip";

/// A file of the batch with its resolved capability
struct PlannedConversion<'a> {
    input: &'a Path,
    original_name: &'a str,
    source: Format,
    capability: Capability,
}

#[derive(Clone)]
pub struct ConversionService {
    registry: Arc<ConversionRegistry>,
    backend: Arc<dyn ConversionBackend>,
    codec: TokenCodec,
    output_area: StagingArea,
    cleanup: CleanupScheduler,
    cleanup_delay: Duration,
    token_ttl: Duration,
}

impl ConversionService {
    pub fn new(
        registry: Arc<ConversionRegistry>,
        backend: Arc<dyn ConversionBackend>,
        codec: TokenCodec,
        output_area: StagingArea,
        cleanup: CleanupScheduler,
        cleanup_delay: Duration,
        token_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            backend,
            codec,
            output_area,
            cleanup,
            cleanup_delay,
            token_ttl,
        }
    }

    /// Convert every file of `session` to `target` and issue a download token
    /// for the result.
    ///
    /// All capabilities are resolved before anything runs. The first failing
    /// file aborts the batch; files after it are not attempted.
    pub async fn convert(
        &self,
        session: &UploadSession,
        target: &str,
    ) -> AppResult<DownloadTicket> {
        if !session.is_well_formed() {
            return Err(AppError::InvalidSession);
        }

        let target = Format::parse(target)
            .ok_or_else(|| AppError::invalid_input("Output format is required"))?;
        let plan = self.plan(session, &target)?;
        let started = Instant::now();

        let mut outputs: Vec<(PathBuf, String)> = Vec::with_capacity(plan.len());
        for step in &plan {
            let display_name = format!("{}.{}", file_stem(step.original_name), target);
            let output = self.output_area.unique_path_for(&display_name);

            // Registered before the backend runs so partial output is removed too
            self.cleanup.schedule([&output], self.cleanup_delay);

            let job = ConversionJob {
                capability: step.capability,
                source: &step.source,
                target: &target,
                input: step.input,
                output: &output,
            };
            if let Err(cause) = self.backend.convert(job).await {
                error!(
                    "Conversion of '{}' ({} -> {}) failed: {}",
                    step.original_name, step.source, target, cause
                );
                return Err(AppError::conversion_failed(step.original_name, cause));
            }

            outputs.push((output, display_name));
        }

        let descriptor = self.deliverable(outputs).await?;
        let token = self.codec.issue(&descriptor, self.token_ttl)?;

        info!(
            "Converted {} file(s) to {} in {}ms",
            plan.len(),
            target,
            started.elapsed().as_millis()
        );

        Ok(DownloadTicket {
            token,
            file_name: descriptor.name,
        })
    }

    fn plan<'a>(
        &self,
        session: &'a UploadSession,
        target: &Format,
    ) -> AppResult<Vec<PlannedConversion<'a>>> {
        session
            .entries()
            .map(|(input, original_name)| {
                let source = Format::from_file_name(original_name);
                let capability = source
                    .as_ref()
                    .and_then(|source| self.registry.lookup(source, target));

                match (source, capability) {
                    (Some(source), Some(capability)) => Ok(PlannedConversion {
                        input,
                        original_name,
                        source,
                        capability,
                    }),
                    (source, _) => Err(AppError::unsupported(
                        source.map(|s| s.to_string()).unwrap_or_default(),
                        target.as_str(),
                    )),
                }
            })
            .collect()
    }

    /// One output is delivered as is; several are zipped.
    async fn deliverable(
        &self,
        mut outputs: Vec<(PathBuf, String)>,
    ) -> AppResult<DownloadDescriptor> {
        if outputs.len() == 1
            && let Some((file, name)) = outputs.pop()
        {
            return Ok(DownloadDescriptor { file, name });
        }

        let archive_path = self.output_area.unique_path_for(ARCHIVE_DISPLAY_NAME);
        self.cleanup.schedule([&archive_path], self.cleanup_delay);
        archive::zip_files(outputs, archive_path.clone()).await?;

        Ok(DownloadDescriptor {
            file: archive_path,
            name: ARCHIVE_DISPLAY_NAME.to_string(),
        })
    }
}
