use std::time::Duration;

/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_REQUEST_SIZE: &str = "64MB";

// Storage defaults
pub const DEFAULT_UPLOAD_PATH: &str = "./data/uploads";
pub const DEFAULT_CONVERTED_PATH: &str = "./data/converted";
pub const DEFAULT_CLEANUP_DELAY: &str = "30m";
pub const DEFAULT_SWEEP_ON_STARTUP: bool = true;
pub const MAX_CLEANUP_DELAY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// Security defaults
pub const DEFAULT_TOKEN_TTL: &str = "30m";
pub const MIN_SECRET_KEY_LEN: usize = 16;
pub const SECRET_KEY_ENV: &str = "CONVERT_GATEWAY_SECRET";

// Upload limits
pub const DEFAULT_MAX_FILES: usize = 10;
pub const DEFAULT_MAX_FILE_SIZE: &str = "50MB";

// External tool commands
pub const DEFAULT_LIBREOFFICE_COMMAND: &str = "soffice";
pub const DEFAULT_PANDOC_COMMAND: &str = "pandoc";
pub const DEFAULT_FFMPEG_COMMAND: &str = "ffmpeg";
pub const DEFAULT_MAGICK_COMMAND: &str = "magick";
pub const DEFAULT_INKSCAPE_COMMAND: &str = "inkscape";
pub const DEFAULT_WKHTMLTOPDF_COMMAND: &str = "wkhtmltopdf";
pub const DEFAULT_RAR_COMMAND: &str = "rar";

// Conversion defaults
pub const DEFAULT_STRICT_TOOL_CHECK: bool = false;
