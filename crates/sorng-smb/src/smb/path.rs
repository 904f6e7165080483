//! Share-name and path normalisation. Pure functions, no I/O.
//!
//! Paths handed to engines are share-relative, `/`-separated, with no
//! leading or trailing separator. The share root is the empty string.

use crate::smb::error::{SmbError, SmbResult};

/// Strip separators and any `\\server\` prefix from a share name.
///
/// `"\\\\nas\\media"`, `"/media/"` and `"media"` all become `"media"`.
pub fn normalize_share_name(raw: &str) -> String {
    raw.split(['/', '\\'])
        .filter(|s| !s.trim().is_empty())
        .last()
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Normalise a share-relative path: unify separators, drop empty and `.`
/// segments, resolve `..` without ever climbing above the share root.
pub fn normalize_path(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Join a normalised directory path and a child name.
pub fn join(dir: &str, name: &str) -> String {
    let dir = normalize_path(dir);
    let name = normalize_path(name);
    if dir.is_empty() {
        name
    } else if name.is_empty() {
        dir
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent directory of a path (`""` for top-level entries and the root).
pub fn parent(path: &str) -> String {
    let path = normalize_path(path);
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

/// Last segment of a path (`""` for the root).
pub fn file_name(path: &str) -> String {
    let path = normalize_path(path);
    match path.rfind('/') {
        Some(idx) => path[idx + 1..].to_string(),
        None => path,
    }
}

/// Number of segments (`0` for the root).
pub fn depth(path: &str) -> usize {
    let path = normalize_path(path);
    if path.is_empty() {
        0
    } else {
        path.split('/').count()
    }
}

/// Backslash form used on the wire: `dir/file` → `\dir\file`.
pub fn to_wire(path: &str) -> String {
    format!("\\{}", normalize_path(path).replace('/', "\\"))
}

/// A single entry name: non-empty, no separators, not a pseudo-entry.
pub fn validate_name(name: &str) -> SmbResult<()> {
    if name.trim().is_empty() {
        return Err(SmbError::invalid_input("name must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(SmbError::invalid_input(format!("'{}' is not a valid name", name)));
    }
    if name.contains(['/', '\\']) {
        return Err(SmbError::invalid_input(format!(
            "name '{}' must not contain path separators",
            name
        )));
    }
    Ok(())
}

/// Self/parent pseudo-entries returned by directory listings.
pub fn is_pseudo_entry(name: &str) -> bool {
    name == "." || name == ".."
}
