use std::path::Path;
use uuid::Uuid;

/// Suffix appended to the base name of every resized result.
pub const PROCESSED_SUFFIX: &str = "-50";

/// Fresh, collision-resistant name for a staged upload. Keeps the original
/// file name as a trailing component for traceability.
pub fn staged_object_name(original_file_name: &str) -> String {
    format!("{}-{}", Uuid::new_v4().simple(), original_file_name)
}

/// Deterministic result name: same input name always maps to the same output.
pub fn processed_object_name(original_file_name: &str) -> String {
    let path = Path::new(original_file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original_file_name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}{}.{}", stem, PROCESSED_SUFFIX, ext),
        None => format!("{}{}", stem, PROCESSED_SUFFIX),
    }
}
