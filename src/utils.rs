//! Utility functions and helpers

use std::path::Path;

use crate::error::{Result, ResultExt};

/// Upper bound for the default number of in-flight embedding computations.
pub(crate) const MAX_DEFAULT_CONCURRENCY: usize = 4;

/// Lowercase and trim a predicted class name
pub(crate) fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Whether an image reference points at a remote resource
pub(crate) fn is_remote_ref(image_ref: &str) -> bool {
    let lower = image_ref.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Ensure a directory exists, creating it if necessary
pub(crate) fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    Ok(())
}

/// Map a storage key onto a filesystem-safe file name
///
/// Every byte outside `[A-Za-z0-9.-]` becomes `_XX` (uppercase hex), so
/// distinct keys always map to distinct names.
pub(crate) fn storage_file_name(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{:02X}", byte));
        }
    }
    format!("{}.json", stem)
}

/// Hardware parallelism clamped to `[1, MAX_DEFAULT_CONCURRENCY]`
pub(crate) fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_DEFAULT_CONCURRENCY)
}
