//! Path utilities

use std::path::{Path, PathBuf};

/// Data directory (~/.warden)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".warden")
}

/// Config file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Default workspace location
pub fn workspace_path() -> PathBuf {
    data_dir().join("workspace")
}

/// Worker log directory
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Ensure directory exists
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Sanitize a logical name for use as a file name
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect()
}
