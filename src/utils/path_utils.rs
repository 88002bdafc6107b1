use std::io;
use std::path::{Component, Path, PathBuf};

/// Canonicalize a path, stripping the Windows extended path prefix (\\?\) if present.
pub fn safe_canonicalize(path: &Path) -> io::Result<PathBuf> {
    let canonical = std::fs::canonicalize(path)?;
    Ok(strip_extended_path_prefix(canonical))
}

#[cfg(windows)]
pub fn strip_extended_path_prefix(path: PathBuf) -> PathBuf {
    let path_str = path.to_string_lossy();
    if let Some(stripped) = path_str.strip_prefix(r"\\?\") {
        PathBuf::from(stripped)
    } else {
        path
    }
}

#[cfg(not(windows))]
pub fn strip_extended_path_prefix(path: PathBuf) -> PathBuf {
    path
}

/// Key used to deduplicate project scopes: the canonical path when it
/// exists, otherwise a lexical cleanup (`.` dropped, `..` folded,
/// trailing separators removed).
pub fn normalize_project_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = safe_canonicalize(path) {
        return canonical;
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
