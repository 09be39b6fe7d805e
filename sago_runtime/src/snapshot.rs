//! File snapshots for a task's declared files.
//!
//! Snapshots are taken before an attempt so the changed files can be cached
//! afterwards. All writes go through [`resolve_in_root`], which keeps paths
//! inside the project root.

use crate::error::{Result, RuntimeError};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Relative file path to file content.
pub type FileMap = BTreeMap<String, String>;

/// Resolves a relative path against `root`, rejecting escapes.
///
/// The check is lexical: absolute paths, prefixes, and `..` components that
/// climb above the root are rejected.
pub fn resolve_in_root(root: &Path, relative: &str) -> Result<PathBuf> {
    let mut depth = 0usize;
    let mut clean = PathBuf::new();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                depth += 1;
                clean.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(RuntimeError::PathEscape(relative.to_string()));
                }
                depth -= 1;
                clean.pop();
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RuntimeError::PathEscape(relative.to_string()));
            }
        }
    }

    if depth == 0 {
        return Err(RuntimeError::PathEscape(relative.to_string()));
    }

    Ok(root.join(clean))
}

/// Reads the listed files that exist under `root`.
///
/// Missing, unreadable, non-UTF-8 or out-of-root files are skipped.
pub async fn read_files(root: &Path, paths: &[String]) -> FileMap {
    let mut files = FileMap::new();

    for relative in paths {
        let Ok(path) = resolve_in_root(root, relative) else {
            tracing::warn!("Skipping out-of-root path {}", relative);
            continue;
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                files.insert(relative.clone(), content);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::debug!("Could not read {}: {}", path.display(), e);
            }
        }
    }

    files
}

/// Returns the files in `after` that are new or differ from `before`.
pub fn changed_files(before: &FileMap, after: &FileMap) -> FileMap {
    after
        .iter()
        .filter(|(path, content)| before.get(*path) != Some(*content))
        .map(|(path, content)| (path.clone(), content.clone()))
        .collect()
}

/// Writes files under `root`, creating parent directories.
///
/// Every path is validated before anything is written, so a single escaping
/// path leaves the tree untouched.
///
/// # Returns
///
/// The relative paths written, in order.
pub async fn write_files(root: &Path, files: &FileMap) -> Result<Vec<String>> {
    let mut resolved = Vec::with_capacity(files.len());
    for (relative, content) in files {
        resolved.push((relative, resolve_in_root(root, relative)?, content));
    }

    let mut written = Vec::with_capacity(resolved.len());
    for (relative, path, content) in resolved {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        written.push(relative.clone());
    }

    Ok(written)
}

/// Formats files as `=== path ===` blocks for prompt context.
pub fn render_files(files: &FileMap) -> String {
    files
        .iter()
        .map(|(path, content)| format!("=== {} ===\n{}", path, content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_in_root() {
        let root = Path::new("/project");

        assert_eq!(
            resolve_in_root(root, "src/a.py").unwrap(),
            PathBuf::from("/project/src/a.py")
        );
        assert_eq!(
            resolve_in_root(root, "./src/../b.py").unwrap(),
            PathBuf::from("/project/b.py")
        );
        assert!(resolve_in_root(root, "../outside.py").is_err());
        assert!(resolve_in_root(root, "src/../../outside.py").is_err());
        assert!(resolve_in_root(root, "/etc/passwd").is_err());
        assert!(resolve_in_root(root, "").is_err());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let mut files = FileMap::new();
        files.insert("pkg/mod.py".to_string(), "x = 1\n".to_string());

        let written = write_files(temp.path(), &files).await.unwrap();
        assert_eq!(written, vec!["pkg/mod.py".to_string()]);

        let read = read_files(
            temp.path(),
            &["pkg/mod.py".to_string(), "missing.py".to_string()],
        )
        .await;
        assert_eq!(read, files);
    }

    #[tokio::test]
    async fn test_escaping_write_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let mut files = FileMap::new();
        files.insert("a.py".to_string(), "ok".to_string());
        files.insert("../evil.py".to_string(), "bad".to_string());

        let result = write_files(temp.path(), &files).await;
        assert!(matches!(result, Err(RuntimeError::PathEscape(_))));
        assert!(!temp.path().join("a.py").exists());
    }

    #[test]
    fn test_changed_files() {
        let mut before = FileMap::new();
        before.insert("same.py".to_string(), "1".to_string());
        before.insert("edited.py".to_string(), "old".to_string());

        let mut after = before.clone();
        after.insert("edited.py".to_string(), "new".to_string());
        after.insert("created.py".to_string(), "fresh".to_string());

        let changed = changed_files(&before, &after);
        let keys: Vec<&str> = changed.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["created.py", "edited.py"]);
    }

    #[test]
    fn test_render_files() {
        let mut files = FileMap::new();
        files.insert("a.py".to_string(), "A".to_string());
        files.insert("b.py".to_string(), "B".to_string());

        assert_eq!(render_files(&files), "=== a.py ===\nA\n\n=== b.py ===\nB");
        assert_eq!(render_files(&FileMap::new()), "");
    }
}
