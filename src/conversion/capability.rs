use std::fmt;

use crate::config::ToolsConfig;

/// External executables a capability may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tool {
    LibreOffice,
    Pandoc,
    Ffmpeg,
    Magick,
    Inkscape,
    Wkhtmltopdf,
    Rar,
}

impl Tool {
    /// Arguments that make the tool print its version and exit zero
    pub fn version_args(self) -> &'static [&'static str] {
        match self {
            Tool::Ffmpeg => &["-version"],
            Tool::Wkhtmltopdf => &["--version"],
            // rar prints its banner and usage when run without arguments
            Tool::Rar => &[],
            _ => &["--version"],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tool::LibreOffice => "libreoffice",
            Tool::Pandoc => "pandoc",
            Tool::Ffmpeg => "ffmpeg",
            Tool::Magick => "magick",
            Tool::Inkscape => "inkscape",
            Tool::Wkhtmltopdf => "wkhtmltopdf",
            Tool::Rar => "rar",
        };
        f.write_str(name)
    }
}

impl ToolsConfig {
    /// Configured command for `tool`
    pub fn command(&self, tool: Tool) -> &str {
        match tool {
            Tool::LibreOffice => &self.libreoffice,
            Tool::Pandoc => &self.pandoc,
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Magick => &self.magick,
            Tool::Inkscape => &self.inkscape,
            Tool::Wkhtmltopdf => &self.wkhtmltopdf,
            Tool::Rar => &self.rar,
        }
    }
}

/// How a (source, target) pair gets converted.
///
/// The target format travels alongside the capability, so one variant covers
/// every pair a tool handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `soffice --headless --convert-to <target>`
    Office,
    /// `pandoc <in> -o <out>`
    Pandoc,
    /// `magick <in> <out>`
    ImageMagick,
    /// In-process decode and re-encode with the `image` crate
    RasterImage,
    /// `inkscape --export-type=<target>`
    Inkscape,
    /// `ffmpeg -y -i <in> <out>`
    Ffmpeg,
    /// `wkhtmltopdf <in> <out>`
    HtmlToPdf,
    /// Tab-separated to comma-separated, in process
    TsvToCsv,
    /// Zip repacked as a gzip-compressed tarball, in process
    ZipToTarGz,
    /// Zip extracted and repacked with `rar`
    ZipToRar,
}

impl Capability {
    pub fn required_tools(self) -> &'static [Tool] {
        match self {
            Capability::Office => &[Tool::LibreOffice],
            Capability::Pandoc => &[Tool::Pandoc],
            Capability::ImageMagick => &[Tool::Magick],
            Capability::Inkscape => &[Tool::Inkscape],
            Capability::Ffmpeg => &[Tool::Ffmpeg],
            Capability::HtmlToPdf => &[Tool::Wkhtmltopdf],
            Capability::ZipToRar => &[Tool::Rar],
            Capability::RasterImage | Capability::TsvToCsv | Capability::ZipToTarGz => &[],
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
