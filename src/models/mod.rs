use chrono::{DateTime, Utc};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Raster formats the pipeline accepts, inferred from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
}

impl ContentKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Webp => "image/webp",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Gif => ImageFormat::Gif,
            Self::Bmp => ImageFormat::Bmp,
            Self::Tiff => ImageFormat::Tiff,
            Self::Webp => ImageFormat::WebP,
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Webp => "webp",
        };
        f.write_str(name)
    }
}

/// A local file that passed validation and is ready to be staged.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    pub content_kind: ContentKind,
}

/// Body of a queue message. References the staged payload instead of embedding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRecord {
    pub original_file_name: String,
    pub staged_object_name: String,
    pub content_kind: ContentKind,
    pub size_bytes: u64,
    pub enqueued_at_utc: DateTime<Utc>,
}

impl ReferenceRecord {
    pub fn for_item(item: &WorkItem, staged_object_name: String) -> Self {
        Self {
            original_file_name: item.file_name.clone(),
            staged_object_name,
            content_kind: item.content_kind,
            size_bytes: item.size_bytes,
            enqueued_at_utc: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}

/// Result of handling one file or one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded,
    Skipped { reason: String },
    /// Message referenced a staged object that no longer exists.
    Orphaned,
    Failed { error: String },
}

/// Outcome of one item, keyed by the original file name when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl ItemReport {
    pub fn new(name: impl Into<String>, outcome: ItemOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
        }
    }
}

/// Summary of one producer or consumer sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub items: Vec<ItemReport>,
}

impl RunResult {
    pub fn from_reports(items: Vec<ItemReport>) -> Self {
        let mut result = Self::default();
        for item in &items {
            result.processed += 1;
            match &item.outcome {
                ItemOutcome::Succeeded => result.succeeded += 1,
                ItemOutcome::Skipped { .. } | ItemOutcome::Orphaned => result.skipped += 1,
                ItemOutcome::Failed { error } => {
                    result.failed += 1;
                    result.errors.push(format!("{}: {}", item.name, error));
                }
            }
        }
        result.items = items;
        result
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Process exit status: 0 when nothing failed, 2 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() { 2 } else { 0 }
    }
}
