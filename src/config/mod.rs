use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod human_serde;

use defaults::*;
use human_serde::{byte_size, duration};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for any request body, multipart uploads included
    #[serde(default = "default_max_request_size", with = "byte_size")]
    pub max_request_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_path")]
    pub upload_path: PathBuf,
    #[serde(default = "default_converted_path")]
    pub converted_path: PathBuf,
    /// How long staged uploads and converted outputs live on disk
    #[serde(default = "default_cleanup_delay", with = "duration")]
    pub cleanup_delay: Duration,
    /// Schedule files left behind by a previous run for deletion at startup
    #[serde(default = "default_sweep_on_startup")]
    pub sweep_on_startup: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Token signing key. Falls back to the environment, then to a random key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default = "default_token_ttl", with = "duration")]
    pub token_ttl: Duration,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_file_size", with = "byte_size")]
    pub max_file_size: u64,
}

/// Executable names or paths of the external conversion tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_libreoffice_command")]
    pub libreoffice: String,
    #[serde(default = "default_pandoc_command")]
    pub pandoc: String,
    #[serde(default = "default_ffmpeg_command")]
    pub ffmpeg: String,
    #[serde(default = "default_magick_command")]
    pub magick: String,
    #[serde(default = "default_inkscape_command")]
    pub inkscape: String,
    #[serde(default = "default_wkhtmltopdf_command")]
    pub wkhtmltopdf: String,
    #[serde(default = "default_rar_command")]
    pub rar: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Refuse to start when a registered conversion's tool is missing
    #[serde(default = "default_strict_tool_check")]
    pub strict_tool_check: bool,
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_request_size() -> u64 {
    parse_default_size(DEFAULT_MAX_REQUEST_SIZE)
}

// Storage defaults
fn default_upload_path() -> PathBuf {
    PathBuf::from(DEFAULT_UPLOAD_PATH)
}

fn default_converted_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONVERTED_PATH)
}

fn default_cleanup_delay() -> Duration {
    parse_default_duration(DEFAULT_CLEANUP_DELAY)
}

fn default_sweep_on_startup() -> bool {
    DEFAULT_SWEEP_ON_STARTUP
}

// Security defaults
fn default_token_ttl() -> Duration {
    parse_default_duration(DEFAULT_TOKEN_TTL)
}

// Limit defaults
fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}

fn default_max_file_size() -> u64 {
    parse_default_size(DEFAULT_MAX_FILE_SIZE)
}

// Tool defaults
fn default_libreoffice_command() -> String {
    DEFAULT_LIBREOFFICE_COMMAND.to_string()
}

fn default_pandoc_command() -> String {
    DEFAULT_PANDOC_COMMAND.to_string()
}

fn default_ffmpeg_command() -> String {
    DEFAULT_FFMPEG_COMMAND.to_string()
}

fn default_magick_command() -> String {
    DEFAULT_MAGICK_COMMAND.to_string()
}

fn default_inkscape_command() -> String {
    DEFAULT_INKSCAPE_COMMAND.to_string()
}

fn default_wkhtmltopdf_command() -> String {
    DEFAULT_WKHTMLTOPDF_COMMAND.to_string()
}

fn default_rar_command() -> String {
    DEFAULT_RAR_COMMAND.to_string()
}

fn default_strict_tool_check() -> bool {
    DEFAULT_STRICT_TOOL_CHECK
}

// The constants above are known-good literals; the fallbacks only guard
// against someone editing them into something unparseable.
fn parse_default_duration(value: &str) -> Duration {
    humantime::parse_duration(value).unwrap_or(Duration::from_secs(30 * 60))
}

fn parse_default_size(value: &str) -> u64 {
    byte_size::parse(value).unwrap_or(50 * 1024 * 1024)
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_size: default_max_request_size(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_path: default_upload_path(),
            converted_path: default_converted_path(),
            cleanup_delay: default_cleanup_delay(),
            sweep_on_startup: default_sweep_on_startup(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            token_ttl: default_token_ttl(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            libreoffice: default_libreoffice_command(),
            pandoc: default_pandoc_command(),
            ffmpeg: default_ffmpeg_command(),
            magick: default_magick_command(),
            inkscape: default_inkscape_command(),
            wkhtmltopdf: default_wkhtmltopdf_command(),
            rar: default_rar_command(),
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            strict_tool_check: default_strict_tool_check(),
        }
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Check settings that serde alone cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.storage.upload_path == self.storage.converted_path {
            bail!(
                "storage.upload_path and storage.converted_path must differ (both {:?})",
                self.storage.upload_path
            );
        }

        if self.limits.max_files == 0 {
            bail!("limits.max_files must be at least 1");
        }

        if self.limits.max_file_size == 0 {
            bail!("limits.max_file_size must be greater than zero");
        }

        if self.security.token_ttl.is_zero() {
            bail!("security.token_ttl must be greater than zero");
        }

        let cleanup_delay = self.storage.cleanup_delay;
        if cleanup_delay.is_zero() {
            bail!("storage.cleanup_delay must be greater than zero");
        }
        if cleanup_delay < self.security.token_ttl {
            bail!(
                "storage.cleanup_delay ({}) must not be shorter than security.token_ttl ({})",
                humantime::format_duration(cleanup_delay),
                humantime::format_duration(self.security.token_ttl)
            );
        }
        if cleanup_delay > MAX_CLEANUP_DELAY {
            bail!(
                "storage.cleanup_delay must be at most {}",
                humantime::format_duration(MAX_CLEANUP_DELAY)
            );
        }

        if let Some(secret) = &self.security.secret_key
            && secret.len() < MIN_SECRET_KEY_LEN
        {
            bail!("security.secret_key must be at least {MIN_SECRET_KEY_LEN} bytes");
        }

        Ok(())
    }
}
