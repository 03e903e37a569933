//! Path resolution and naming rules.
//!
//! Paths use `/` as the separator. An absolute path starts at the root and its
//! first component stands for the root itself (locations look like
//! `/root/docs`), so that component is skipped. Relative paths start at the
//! current directory. `.` and empty components are ignored and `..` climbs one
//! level, stopping quietly at the root.

use crate::error::{FsError, Result};
use crate::node::{DirId, Tree};

pub const SEPARATOR: char = '/';

/// Walks `path` from the root or from `cwd` and returns the directory it names.
///
/// # Errors
///
/// Fails with [`FsError::PathNotFound`] carrying the first component that does
/// not name an existing subdirectory. Nothing past that component is examined.
pub fn resolve(tree: &Tree, cwd: DirId, path: &str) -> Result<DirId> {
    let (mut current, components): (DirId, Vec<&str>) = if path.starts_with(SEPARATOR) {
        let trimmed = path.trim_matches(SEPARATOR);
        (tree.root(), trimmed.split(SEPARATOR).skip(1).collect())
    } else {
        (cwd, path.split(SEPARATOR).collect())
    };

    for part in components {
        match part {
            "" | "." => continue,
            ".." => {
                if let Some(parent) = tree.dir(current)?.parent {
                    current = parent;
                }
            }
            name => match tree.find_subdirectory(current, name)? {
                Some(next) => current = next,
                None => {
                    debug!("resolution of '{}' stopped at '{}'", path, name);
                    return Err(FsError::PathNotFound(name.to_string()));
                }
            },
        }
    }
    Ok(current)
}

/// Splits a path into the directory part and the final component.
///
/// `"/root/a/f.txt"` gives `("/root/a", "f.txt")`, `"/f"` gives `("/", "f")`
/// and a bare `"f"` gives `("", "f")`, where the empty directory part means
/// the current directory.
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind(SEPARATOR) {
        Some(i) => {
            let head = &path[..=i];
            let trimmed = head.trim_end_matches(SEPARATOR);
            let head = if trimmed.is_empty() { &head[..1] } else { trimmed };
            (head, &path[i + 1..])
        }
        None => ("", path),
    }
}

/// Rejects names that could not be reached again through a path.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(SEPARATOR) {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Splits `name` into stem and extension, the extension keeping its dot.
/// Leading dots never start an extension, so `.profile` has none.
fn split_extension(name: &str) -> (&str, &str) {
    let leading_dots = name.len() - name.trim_start_matches('.').len();
    match name.rfind('.') {
        Some(i) if i > leading_dots => name.split_at(i),
        _ => (name, ""),
    }
}

/// First name of the form `<stem>_copyN<ext>` (N counting from 1) for which
/// `taken` returns false.
pub fn copy_name<F>(name: &str, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let (stem, ext) = split_extension(name);
    let mut count = 1;
    loop {
        let candidate = format!("{}_copy{}{}", stem, count, ext);
        if !taken(&candidate) {
            return candidate;
        }
        count += 1;
    }
}
