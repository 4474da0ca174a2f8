//! Execution of conversion capabilities.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, trace};

use super::capability::{Capability, Tool};
use super::native;
use crate::config::ToolsConfig;
use crate::errors::{ConversionError, ConversionResult};
use crate::models::Format;

/// Lines of stderr kept when a tool fails
const STDERR_TAIL_LINES: usize = 10;

const OFFICE_SCRATCH_PREFIX: &str = "office-";
const UNZIP_SCRATCH_PREFIX: &str = "unzip-";

/// Name prefixes of the scratch directories [`ToolBackend`] creates.
pub const SCRATCH_PREFIXES: [&str; 2] = [OFFICE_SCRATCH_PREFIX, UNZIP_SCRATCH_PREFIX];

/// One file to convert
#[derive(Debug, Clone, Copy)]
pub struct ConversionJob<'a> {
    pub capability: Capability,
    pub source: &'a Format,
    pub target: &'a Format,
    pub input: &'a Path,
    pub output: &'a Path,
}

/// Runs a capability, writing the converted file to `job.output`.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    async fn convert(&self, job: ConversionJob<'_>) -> ConversionResult<()>;
}

/// Production backend: external tools plus a few in-process conversions.
///
/// Scratch directories (LibreOffice output, extracted archives) are created
/// under `scratch_dir` and removed before `convert` returns.
#[derive(Debug, Clone)]
pub struct ToolBackend {
    tools: ToolsConfig,
    scratch_dir: PathBuf,
}

impl ToolBackend {
    pub fn new(tools: ToolsConfig, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools,
            scratch_dir: scratch_dir.into(),
        }
    }

    fn scratch(&self, prefix: &str) -> ConversionResult<TempDir> {
        Ok(tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.scratch_dir)?)
    }

    async fn run_tool(&self, tool: Tool, args: Vec<OsString>) -> ConversionResult<()> {
        let command = self.tools.command(tool);
        trace!("Running {} {:?}", command, args);

        let output = Command::new(command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ConversionError::ToolMissing {
                tool: command.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ConversionError::ToolFailed {
                tool: command.to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(())
    }

    async fn ensure_output(&self, tool: Tool, output: &Path) -> ConversionResult<()> {
        if tokio::fs::try_exists(output).await? {
            Ok(())
        } else {
            Err(ConversionError::NoOutput {
                tool: self.tools.command(tool).to_string(),
            })
        }
    }

    /// LibreOffice names its output after the input and only lets us pick a
    /// directory, so convert into a scratch dir and move the result.
    async fn convert_office(&self, job: &ConversionJob<'_>) -> ConversionResult<()> {
        let scratch = self.scratch(OFFICE_SCRATCH_PREFIX)?;
        let profile = std::path::absolute(scratch.path().join("profile"))?;

        self.run_tool(
            Tool::LibreOffice,
            vec![
                // Separate profile per run so concurrent conversions do not
                // fight over the user installation lock.
                format!("-env:UserInstallation=file://{}", profile.display()).into(),
                "--headless".into(),
                "--convert-to".into(),
                job.target.as_str().into(),
                "--outdir".into(),
                scratch.path().into(),
                job.input.into(),
            ],
        )
        .await?;

        let stem = job.input.file_stem().unwrap_or_default();
        let produced = scratch
            .path()
            .join(stem)
            .with_extension(job.target.as_str());
        self.ensure_output(Tool::LibreOffice, &produced).await?;

        move_file(&produced, job.output).await
    }

    async fn convert_pandoc(&self, job: &ConversionJob<'_>) -> ConversionResult<()> {
        let mut args: Vec<OsString> = vec![job.input.into(), "-o".into(), job.output.into()];
        if job.target.as_str() == "txt" {
            args.extend(["-t".into(), "plain".into()]);
        }
        self.run_tool(Tool::Pandoc, args).await?;
        self.ensure_output(Tool::Pandoc, job.output).await
    }

    async fn convert_zip_to_rar(&self, job: &ConversionJob<'_>) -> ConversionResult<()> {
        let scratch = self.scratch(UNZIP_SCRATCH_PREFIX)?;
        let input = job.input.to_path_buf();
        let extracted = scratch.path().to_path_buf();
        tokio::task::spawn_blocking(move || native::extract_zip(&input, &extracted))
            .await
            .map_err(|e| ConversionError::library("zip", e))??;

        // Trailing separator plus -ep1 stores the directory's contents
        // without the scratch directory itself.
        let mut contents = scratch.path().as_os_str().to_os_string();
        contents.push(std::path::MAIN_SEPARATOR_STR);

        self.run_tool(
            Tool::Rar,
            vec![
                "a".into(),
                "-idq".into(),
                "-ep1".into(),
                "-r".into(),
                job.output.into(),
                contents,
            ],
        )
        .await?;
        self.ensure_output(Tool::Rar, job.output).await
    }

    async fn convert_zip_to_tar_gz(&self, job: &ConversionJob<'_>) -> ConversionResult<()> {
        let scratch = self.scratch(UNZIP_SCRATCH_PREFIX)?;
        let input = job.input.to_path_buf();
        let output = job.output.to_path_buf();
        let extracted = scratch.path().to_path_buf();

        tokio::task::spawn_blocking(move || {
            native::extract_zip(&input, &extracted)?;
            native::tar_gz_directory(&extracted, &output)
        })
        .await
        .map_err(|e| ConversionError::library("tar", e))?
    }
}

#[async_trait]
impl ConversionBackend for ToolBackend {
    async fn convert(&self, job: ConversionJob<'_>) -> ConversionResult<()> {
        debug!(
            "Converting {} -> {} via {} ({} -> {})",
            job.source,
            job.target,
            job.capability,
            job.input.display(),
            job.output.display()
        );

        match job.capability {
            Capability::Office => self.convert_office(&job).await,
            Capability::Pandoc => self.convert_pandoc(&job).await,
            Capability::ImageMagick => {
                self.run_tool(Tool::Magick, vec![job.input.into(), job.output.into()])
                    .await?;
                self.ensure_output(Tool::Magick, job.output).await
            }
            Capability::RasterImage => {
                let input = job.input.to_path_buf();
                let output = job.output.to_path_buf();
                let target = job.target.clone();
                tokio::task::spawn_blocking(move || {
                    native::transcode_image(&input, &output, &target)
                })
                .await
                .map_err(|e| ConversionError::library("image", e))?
            }
            Capability::Inkscape => {
                self.run_tool(
                    Tool::Inkscape,
                    vec![
                        job.input.into(),
                        format!("--export-type={}", job.target).into(),
                        {
                            let mut arg = OsString::from("--export-filename=");
                            arg.push(job.output);
                            arg
                        },
                    ],
                )
                .await?;
                self.ensure_output(Tool::Inkscape, job.output).await
            }
            Capability::Ffmpeg => {
                self.run_tool(
                    Tool::Ffmpeg,
                    vec![
                        "-hide_banner".into(),
                        "-loglevel".into(),
                        "error".into(),
                        "-y".into(),
                        "-i".into(),
                        job.input.into(),
                        job.output.into(),
                    ],
                )
                .await?;
                self.ensure_output(Tool::Ffmpeg, job.output).await
            }
            Capability::HtmlToPdf => {
                self.run_tool(
                    Tool::Wkhtmltopdf,
                    vec!["--quiet".into(), job.input.into(), job.output.into()],
                )
                .await?;
                self.ensure_output(Tool::Wkhtmltopdf, job.output).await
            }
            Capability::TsvToCsv => {
                let input = job.input.to_path_buf();
                let output = job.output.to_path_buf();
                tokio::task::spawn_blocking(move || native::tsv_to_csv(&input, &output))
                    .await
                    .map_err(|e| ConversionError::library("csv", e))?
            }
            Capability::ZipToTarGz => self.convert_zip_to_tar_gz(&job).await,
            Capability::ZipToRar => self.convert_zip_to_rar(&job).await,
        }
    }
}

async fn move_file(from: &Path, to: &Path) -> ConversionResult<()> {
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn job<'a>(
        capability: Capability,
        source: &'a Format,
        target: &'a Format,
        input: &'a Path,
        output: &'a Path,
    ) -> ConversionJob<'a> {
        ConversionJob {
            capability,
            source,
            target,
            input,
            output,
        }
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (1..=15).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 6"));
        assert!(tail.ends_with("line 15"));
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tools = ToolsConfig {
            pandoc: "/nonexistent/pandoc".to_string(),
            ..ToolsConfig::default()
        };
        let backend = ToolBackend::new(tools, temp_dir.path());

        let input = temp_dir.path().join("in.md");
        let output = temp_dir.path().join("out.html");
        std::fs::write(&input, "# hi").unwrap();
        let (md, html) = (Format::parse("md").unwrap(), Format::parse("html").unwrap());

        let result = backend
            .convert(job(Capability::Pandoc, &md, &html, &input, &output))
            .await;
        assert!(matches!(result, Err(ConversionError::ToolMissing { .. })));
    }

    #[tokio::test]
    async fn test_native_tsv_conversion() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = ToolBackend::new(ToolsConfig::default(), temp_dir.path());

        let input = temp_dir.path().join("in.tsv");
        let output = temp_dir.path().join("out.csv");
        std::fs::write(&input, "a\tb\n1\t2\n").unwrap();
        let (tsv, csv) = (Format::parse("tsv").unwrap(), Format::parse("csv").unwrap());

        backend
            .convert(job(Capability::TsvToCsv, &tsv, &csv, &input, &output))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_zip_to_tar_gz_leaves_no_scratch_behind() {
        let temp_dir = tempfile::tempdir().unwrap();
        let scratch = temp_dir.path().join("converted");
        std::fs::create_dir(&scratch).unwrap();
        let backend = ToolBackend::new(ToolsConfig::default(), &scratch);

        let input = temp_dir.path().join("in.zip");
        {
            let mut writer = zip::ZipWriter::new(std::fs::File::create(&input).unwrap());
            writer
                .start_file("hello.txt", zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(b"hello").unwrap();
            writer.finish().unwrap();
        }
        let output = scratch.join("out.tar.gz");
        let (zip_format, tar_gz) = (
            Format::parse("zip").unwrap(),
            Format::parse("tar.gz").unwrap(),
        );

        backend
            .convert(job(
                Capability::ZipToTarGz,
                &zip_format,
                &tar_gz,
                &input,
                &output,
            ))
            .await
            .unwrap();

        assert!(output.exists());
        let leftovers: Vec<_> = std::fs::read_dir(&scratch)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path != &output)
            .collect();
        assert!(leftovers.is_empty(), "scratch left behind: {leftovers:?}");
    }
}
