use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const DEFAULT_LOG_ROOT: &str = "/var/log/docker";

/// Makes one path segment safe to join under the log root.
#[must_use]
pub fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '\\' | '\0' => '-',
            _ => c,
        })
        .collect();

    match cleaned.as_str() {
        "." | ".." => cleaned.replace('.', "_"),
        _ => cleaned,
    }
}

/// `<root>/<image>`, keeping `/`-separated image components as directories.
pub fn log_file_path(root: &Path, image: &str) -> Result<PathBuf, StoreError> {
    let segments: Vec<String> = image
        .trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(sanitize_segment)
        .collect();

    if segments.is_empty() {
        return Err(StoreError::InvalidImageName {
            image: image.to_owned(),
        });
    }

    let mut path = root.to_path_buf();
    path.extend(segments);
    Ok(path)
}
