//! Path normalization shared by user-supplied and backend-reported paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured view of a slash-delimited path.
///
/// For every non-root path `path == parent_path + filename`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathInfo {
    /// Last path segment, `None` at the root.
    pub filename: Option<String>,
    /// Directory containing the entry, always ending with `/`.
    pub parent_path: String,
    /// Final dot-suffix of the filename including the dot, e.g. `.txt`.
    pub extension: Option<String>,
    /// Filename without its extension.
    pub name: Option<String>,
    /// Canonical path.
    pub path: String,
}

impl PathInfo {
    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.filename.is_none()
    }
}

impl fmt::Display for PathInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Normalize a path string into its structured fields.
///
/// Leading and trailing slashes are ignored; `a/b`, `/a/b` and `/a/b/` all
/// resolve to `/a/b`. Empty interior segments are kept as they are.
pub fn resolve(path: &str) -> PathInfo {
    let mut segments: Vec<&str> = path.split('/').collect();

    while segments.first().is_some_and(|s| s.is_empty()) {
        segments.remove(0);
    }
    while segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }

    let Some(filename) = segments.pop() else {
        return PathInfo {
            filename: None,
            parent_path: "/".to_string(),
            extension: None,
            name: None,
            path: "/".to_string(),
        };
    };

    let parent_path = if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    };

    let (name, extension) = match filename.rfind('.') {
        Some(dot) => (&filename[..dot], Some(filename[dot..].to_string())),
        None => (filename, None),
    };

    PathInfo {
        filename: Some(filename.to_string()),
        path: format!("{}{}", parent_path, filename),
        parent_path,
        extension,
        name: Some(name.to_string()),
    }
}
