use crate::models::{ContentKind, WorkItem};
use anyhow::{Result, anyhow};
use glob::Pattern;
use std::path::Path;

/// Reason a candidate file was skipped. Not an error: skips never fail a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates file size against the inclusive `[min_size, max_size]` window
pub fn validate_file_size(size: u64, min_size: u64, max_size: u64) -> Result<(), ValidationError> {
    if size == 0 {
        return Err(ValidationError {
            code: "EMPTY_FILE",
            message: "File is empty".to_string(),
        });
    }
    if size < min_size {
        return Err(ValidationError {
            code: "FILE_TOO_SMALL",
            message: format!(
                "File size {} bytes is below minimum {} bytes",
                size, min_size
            ),
        });
    }
    if size > max_size {
        return Err(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                size, max_size
            ),
        });
    }
    Ok(())
}

/// Infers the content kind from the extension
pub fn validate_content_kind(path: &Path) -> Result<ContentKind, ValidationError> {
    ContentKind::from_path(path).ok_or_else(|| ValidationError {
        code: "UNSUPPORTED_TYPE",
        message: format!(
            "Extension of '{}' is not a supported image format",
            path.display()
        ),
    })
}

/// Builds a work item from a file's current metadata, or the reason to skip it.
/// `size` is `None` when the file no longer exists.
pub fn validate_work_item(
    path: &Path,
    size: Option<u64>,
    min_size: u64,
    max_size: u64,
) -> Result<WorkItem, ValidationError> {
    let size = size.ok_or_else(|| ValidationError {
        code: "FILE_MISSING",
        message: format!("File '{}' no longer exists", path.display()),
    })?;
    validate_file_size(size, min_size, max_size)?;
    let content_kind = validate_content_kind(path)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ValidationError {
            code: "INVALID_FILENAME",
            message: format!("File name of '{}' is not valid UTF-8", path.display()),
        })?
        .to_string();

    Ok(WorkItem {
        path: path.to_path_buf(),
        file_name,
        size_bytes: size,
        content_kind,
    })
}

/// File-name glob patterns selecting producer candidates.
#[derive(Debug, Clone)]
pub struct NamePatterns {
    patterns: Vec<Pattern>,
}

impl NamePatterns {
    /// Compiles the patterns; an empty list matches every name.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = if patterns.is_empty() {
            vec![Pattern::new("*")?]
        } else {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p.as_ref())
                        .map_err(|e| anyhow!("Invalid pattern '{}': {}", p.as_ref(), e))
                })
                .collect::<Result<Vec<_>>>()?
        };
        Ok(Self { patterns })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_size() {
        assert!(validate_file_size(100, 1, 1000).is_ok());
        assert!(validate_file_size(1000, 1, 1000).is_ok());
        assert_eq!(validate_file_size(0, 0, 1000).unwrap_err().code, "EMPTY_FILE");
        assert_eq!(validate_file_size(5, 10, 1000).unwrap_err().code, "FILE_TOO_SMALL");
        assert_eq!(validate_file_size(1001, 1, 1000).unwrap_err().code, "FILE_TOO_LARGE");
    }

    #[test]
    fn test_validate_work_item() {
        let item = validate_work_item(Path::new("/tmp/in/a.PNG"), Some(2000), 1, 10_000).unwrap();
        assert_eq!(item.file_name, "a.PNG");
        assert_eq!(item.content_kind, ContentKind::Png);
        assert_eq!(item.size_bytes, 2000);

        let missing = validate_work_item(Path::new("/tmp/in/a.png"), None, 1, 10_000);
        assert_eq!(missing.unwrap_err().code, "FILE_MISSING");

        let unsupported = validate_work_item(Path::new("/tmp/in/notes.txt"), Some(10), 1, 10_000);
        assert_eq!(unsupported.unwrap_err().code, "UNSUPPORTED_TYPE");
    }

    #[test]
    fn test_name_patterns() {
        let patterns = NamePatterns::new(&["*.png", "photo-?.jpg"]).unwrap();
        assert!(patterns.matches("a.png"));
        assert!(patterns.matches("photo-1.jpg"));
        assert!(!patterns.matches("photo-12.jpg"));
        assert!(!patterns.matches("a.gif"));

        let everything = NamePatterns::new::<&str>(&[]).unwrap();
        assert!(everything.matches("anything.bin"));

        assert!(NamePatterns::new(&["[unclosed"]).is_err());
    }
}
