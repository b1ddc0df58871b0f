//! Workspace-confined path resolution

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("permission denied: {path} is outside workspace {workspace}")]
    OutsideWorkspace { path: String, workspace: String },

    #[error("invalid value for path: must not be empty")]
    Empty,
}

/// Resolve `path` against `workspace` and make sure it stays inside.
///
/// Relative paths are joined to the workspace, `~/` expands to the home
/// directory. `..` components are folded lexically so paths that do not
/// exist yet can be checked.
pub fn resolve_in_workspace(path: &str, workspace: &Path) -> Result<PathBuf, PathError> {
    if path.trim().is_empty() {
        return Err(PathError::Empty);
    }

    let root = absolute(workspace);
    let candidate = if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| root.join(rest))
    } else if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        root.join(path)
    };
    let resolved = normalize(&candidate);

    if !resolved.starts_with(&root) {
        return Err(PathError::OutsideWorkspace {
            path: path.to_string(),
            workspace: root.display().to_string(),
        });
    }
    Ok(resolved)
}

fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_joins_workspace() {
        let ws = Path::new("/srv/ws");
        assert_eq!(
            resolve_in_workspace("notes/a.md", ws).unwrap(),
            PathBuf::from("/srv/ws/notes/a.md")
        );
    }

    #[test]
    fn test_parent_escape_is_rejected() {
        let ws = Path::new("/srv/ws");
        let err = resolve_in_workspace("../etc/passwd", ws).unwrap_err();
        assert!(matches!(err, PathError::OutsideWorkspace { .. }));
        assert!(err.to_string().starts_with("permission denied"));
    }

    #[test]
    fn test_inner_parent_is_folded() {
        let ws = Path::new("/srv/ws");
        assert_eq!(
            resolve_in_workspace("a/../b.txt", ws).unwrap(),
            PathBuf::from("/srv/ws/b.txt")
        );
    }

    #[test]
    fn test_absolute_outside_is_rejected() {
        assert!(resolve_in_workspace("/tmp/x", Path::new("/srv/ws")).is_err());
        assert!(resolve_in_workspace("/srv/ws/x", Path::new("/srv/ws")).is_ok());
    }

    #[test]
    fn test_sibling_prefix_is_rejected() {
        assert!(resolve_in_workspace("/srv/ws2/x", Path::new("/srv/ws")).is_err());
    }

    #[test]
    fn test_empty_path() {
        assert_eq!(
            resolve_in_workspace("  ", Path::new("/srv/ws")),
            Err(PathError::Empty)
        );
    }
}
