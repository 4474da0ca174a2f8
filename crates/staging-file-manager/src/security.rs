//! Security utilities for staged file names and directory permissions.

use crate::error::{Result, StagingError};
use std::path::Path;
use tokio::fs;

/// Longest sanitized file name kept on disk (bytes); the random prefix is extra.
const MAX_SANITIZED_LEN: usize = 120;

/// Sets secure permissions on a directory (Unix only).
pub async fn set_secure_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|_e| StagingError::Permission {
                operation: "set secure permissions".to_string(),
                path: path.to_path_buf(),
            })?;
    }

    #[cfg(not(unix))]
    {
        if !path.exists() {
            return Err(StagingError::PathValidation {
                path: path.to_path_buf(),
                reason: "Directory does not exist".to_string(),
            });
        }
    }

    Ok(())
}

/// Reduce a client-supplied file name to its final component.
///
/// Both `/` and `\` count as separators so Windows-style upload names are
/// handled the same way on every platform. Returns `None` when nothing usable
/// is left (empty, `.`, `..`, or a name containing null bytes).
pub fn base_file_name(name: &str) -> Option<&str> {
    if name.contains('\0') {
        return None;
    }
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    match last {
        "" | "." | ".." => None,
        other => Some(other),
    }
}

/// Make a display name safe to embed in an on-disk file name.
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
/// Leading dots are stripped so the result is never a hidden file.
pub fn sanitize_file_name(name: &str) -> String {
    let base = base_file_name(name).unwrap_or("file");
    let mut sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.starts_with('.') {
        sanitized.remove(0);
    }

    if sanitized.len() > MAX_SANITIZED_LEN {
        // Keep the tail so the extension survives truncation.
        let cut = sanitized.len() - MAX_SANITIZED_LEN;
        sanitized = sanitized[cut..].to_string();
    }

    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized
    }
}

/// Validates that a path is inside the sandbox directory.
///
/// Both sides are canonicalized when they exist so `..` segments and symlinks
/// cannot be used to point outside the staging directory.
pub async fn is_within(path: &Path, base: &Path) -> bool {
    let Ok(canonical_base) = fs::canonicalize(base).await else {
        return false;
    };

    let resolved = match fs::canonicalize(path).await {
        Ok(resolved) => Some(resolved),
        Err(_) => match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => {
                fs::canonicalize(parent).await.ok().map(|parent| parent.join(name))
            }
            _ => None,
        },
    };

    resolved.is_some_and(|p| p.starts_with(&canonical_base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_file_name() {
        assert_eq!(base_file_name("report.docx"), Some("report.docx"));
        assert_eq!(base_file_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(base_file_name("C:\\Users\\me\\notes.txt"), Some("notes.txt"));
        assert_eq!(base_file_name("dir/"), None);
        assert_eq!(base_file_name(".."), None);
        assert_eq!(base_file_name("bad\0name.txt"), None);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("my report (final).pdf"), "my_report__final_.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("../x/évian.txt"), "_vian.txt");
        assert_eq!(sanitize_file_name(""), "file");

        let long = format!("{}.pdf", "a".repeat(400));
        let sanitized = sanitize_file_name(&long);
        assert_eq!(sanitized.len(), MAX_SANITIZED_LEN);
        assert!(sanitized.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn test_is_within() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path();

        let inside = base.join("inside.txt");
        std::fs::write(&inside, "content").unwrap();
        assert!(is_within(&inside, base).await);
        assert!(is_within(&base.join("not-yet-created.txt"), base).await);

        let outside_dir = tempfile::tempdir().unwrap();
        let outside = outside_dir.path().join("outside.txt");
        std::fs::write(&outside, "content").unwrap();
        assert!(!is_within(&outside, base).await);
        assert!(!is_within(&base.join("..").join("escape.txt"), base).await);
    }
}
