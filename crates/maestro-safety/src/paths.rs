//! Lexical path normalization for policy checks.
//!
//! Policy decisions must not depend on filesystem state (the target path may
//! not exist yet), so normalization is purely lexical: `.` segments drop,
//! `..` segments pop, and a `..` that would escape the root rejects the path.

use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically.
///
/// Returns `None` when the path is relative, empty, or attempts to traverse
/// above its root.
pub fn normalize(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    let mut depth: usize = 0;
    let mut saw_root = false;

    for component in path.components() {
        match component {
            Component::Prefix(p) => {
                result.push(p.as_os_str());
            }
            Component::RootDir => {
                saw_root = true;
                result.push(Component::RootDir.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    // Escapes the root: reject rather than guess.
                    return None;
                }
                result.pop();
                depth -= 1;
            }
            Component::Normal(seg) => {
                result.push(seg);
                depth += 1;
            }
        }
    }

    if !saw_root {
        return None;
    }
    Some(result)
}

/// Expand a leading `~` to the user's home directory.
///
/// Paths that do not start with `~` are returned unchanged.
pub fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    } else if raw == "~" {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home);
        }
    }
    PathBuf::from(raw)
}

/// Whether `path` (already normalized) falls under `root` (already
/// normalized).
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plain_absolute_path() {
        let p = normalize(Path::new("/home/user/Documents/note.txt")).unwrap();
        assert_eq!(p, PathBuf::from("/home/user/Documents/note.txt"));
    }

    #[test]
    fn test_normalize_drops_cur_dir_segments() {
        let p = normalize(Path::new("/home/./user/./file")).unwrap();
        assert_eq!(p, PathBuf::from("/home/user/file"));
    }

    #[test]
    fn test_normalize_resolves_parent_segments() {
        let p = normalize(Path::new("/home/user/tmp/../Documents/a.txt")).unwrap();
        assert_eq!(p, PathBuf::from("/home/user/Documents/a.txt"));
    }

    #[test]
    fn test_normalize_rejects_escape() {
        assert!(normalize(Path::new("/home/../../etc/passwd")).is_none());
        assert!(normalize(Path::new("/../x")).is_none());
    }

    #[test]
    fn test_normalize_rejects_relative_paths() {
        assert!(normalize(Path::new("Documents/file.txt")).is_none());
        assert!(normalize(Path::new("../file.txt")).is_none());
        assert!(normalize(Path::new("")).is_none());
    }

    #[test]
    fn test_is_within() {
        let root = PathBuf::from("/home/user/Documents");
        assert!(is_within(Path::new("/home/user/Documents/a/b.txt"), &root));
        assert!(is_within(Path::new("/home/user/Documents"), &root));
        assert!(!is_within(Path::new("/home/user/Downloads/x"), &root));
        // Sibling directory sharing a string prefix is not inside.
        assert!(!is_within(Path::new("/home/user/DocumentsEvil/x"), &root));
    }

    #[test]
    fn test_expand_home() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_home("~/Documents"),
            PathBuf::from("/home/tester/Documents")
        );
        assert_eq!(expand_home("~"), PathBuf::from("/home/tester"));
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    }
}
