//! Domain types shared by the services and the web layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Normalized format identifier: a lowercase file extension such as `pdf` or
/// `tar.gz`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Format(String);

impl Format {
    /// Normalize user input: trims whitespace and leading dots, lowercases.
    ///
    /// Returns `None` for input that is empty after normalization.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().trim_start_matches('.').trim().to_ascii_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    /// Format of a file name: the text after its last `.`, lowercased.
    ///
    /// `"archive.tar.gz"` yields `gz`; a name without a dot has no format.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, extension) = name.rsplit_once('.')?;
        let extension = extension.trim().to_ascii_lowercase();
        if extension.is_empty() {
            None
        } else {
            Some(Self(extension))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// MIME type advertised when serving a file of this format
    pub fn mime_type(&self) -> &'static str {
        match self.0.as_str() {
            "pdf" => "application/pdf",
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "xls" => "application/vnd.ms-excel",
            "odt" => "application/vnd.oasis.opendocument.text",
            "epub" => "application/epub+zip",
            "txt" => "text/plain; charset=utf-8",
            "md" => "text/markdown; charset=utf-8",
            "html" => "text/html; charset=utf-8",
            "csv" => "text/csv; charset=utf-8",
            "tsv" => "text/tab-separated-values; charset=utf-8",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "heic" => "image/heic",
            "svg" => "image/svg+xml",
            "mp4" => "video/mp4",
            "mov" => "video/quicktime",
            "webm" => "video/webm",
            "mp3" => "audio/mpeg",
            "wav" => "audio/wav",
            "aac" => "audio/aac",
            "zip" => "application/zip",
            "gz" | "tar.gz" => "application/gzip",
            "rar" => "application/vnd.rar",
            _ => "application/octet-stream",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Format {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name without its final extension: `"report.final.docx"` -> `"report.final"`.
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Payload of an upload token.
///
/// `files[i]` was uploaded by the client as `original_names[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub files: Vec<PathBuf>,
    pub original_names: Vec<String>,
}

impl UploadSession {
    /// A session is only usable when it names at least one file and both lists
    /// line up.
    pub fn is_well_formed(&self) -> bool {
        !self.files.is_empty() && self.files.len() == self.original_names.len()
    }

    /// Staged paths paired with the client's file names, in upload order.
    pub fn entries(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.files
            .iter()
            .map(PathBuf::as_path)
            .zip(self.original_names.iter().map(String::as_str))
    }
}

/// Payload of a download token: one deliverable on disk and the name the
/// client should save it as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    pub file: PathBuf,
    pub name: String,
}

/// Result of a successful conversion request
#[derive(Debug, Clone)]
pub struct DownloadTicket {
    pub token: String,
    pub file_name: String,
}

/// Response body of `POST /api/upload`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub token: String,
    pub original_names: Vec<String>,
    pub extensions: Vec<Format>,
    pub suggested_outputs: Vec<Format>,
}

/// Request body of `POST /api/convert`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub token: String,
    pub output_ext: String,
}

/// Response body of `POST /api/convert`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub download_url: String,
    pub file_name: String,
}

/// Response body of `GET /api/formats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatsResponse {
    pub formats: BTreeMap<Format, Vec<Format>>,
}

/// Response body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pending_cleanups: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pdf", Some("pdf"))]
    #[case("  .PDF ", Some("pdf"))]
    #[case(".tar.gz", Some("tar.gz"))]
    #[case("", None)]
    #[case(" . ", None)]
    fn test_parse_normalizes(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(Format::parse(raw).as_ref().map(Format::as_str), expected);
    }

    #[rstest]
    #[case("report.docx", Some("docx"))]
    #[case("Photo.JPG", Some("jpg"))]
    #[case("archive.tar.gz", Some("gz"))]
    #[case("README", None)]
    #[case("trailing.", None)]
    fn test_from_file_name(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            Format::from_file_name(name).as_ref().map(Format::as_str),
            expected
        );
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("report.docx"), "report");
        assert_eq!(file_stem("report.final.docx"), "report.final");
        assert_eq!(file_stem("README"), "README");
        assert_eq!(file_stem(".bashrc"), ".bashrc");
    }

    #[test]
    fn test_session_shape() {
        let session = UploadSession {
            files: vec![PathBuf::from("/tmp/a.pdf")],
            original_names: vec!["a.pdf".to_string()],
        };
        assert!(session.is_well_formed());

        let mismatched = UploadSession {
            files: vec![PathBuf::from("/tmp/a.pdf")],
            original_names: vec![],
        };
        assert!(!mismatched.is_well_formed());

        let empty = UploadSession {
            files: vec![],
            original_names: vec![],
        };
        assert!(!empty.is_well_formed());
    }

    #[test]
    fn test_format_serializes_as_string() {
        let json = serde_json::to_string(&vec![Format::parse("pdf").unwrap()]).unwrap();
        assert_eq!(json, r#"["pdf"]"#);
    }
}
