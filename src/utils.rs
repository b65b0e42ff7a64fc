//! Utility functions for directory lookup and file output
//!
//! Follows the XDG Base Directory specification:
//!
//! - Config: `~/.config/vpnfw/` - pool configuration (`pools.json`)
//!
//! # Example
//!
//! ```
//! use vpnfw::utils::default_pools_path;
//!
//! if let Some(path) = default_pools_path() {
//!     assert!(path.ends_with("pools.json"));
//! }
//! ```

use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const POOLS_FILE: &str = "pools.json";

pub fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "vpnfw", "vpnfw").map(|pd| pd.config_dir().to_path_buf())
}

/// Where pools are read from when `--config` is not given
pub fn default_pools_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(POOLS_FILE))
}

/// Writes `contents` to `path` using an atomic write pattern.
/// 1. Writes to a temporary file next to the target.
/// 2. Sets restrictive permissions (0o600).
/// 3. Atomically renames to the target path.
///
/// A reader never observes a half-written rules file. The temporary file is
/// removed again if any step fails.
///
/// # Errors
///
/// Returns `Err` if the temporary file cannot be written or renamed.
pub async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let temp_path = temp_path_for(path);

    let result = match write_temp(&temp_path, contents).await {
        Ok(()) => tokio::fs::rename(&temp_path, path).await,
        Err(e) => Err(e),
    };

    let Err(e) = result else {
        return Ok(());
    };

    if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await
        && cleanup.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {cleanup}", temp_path.display());
    }

    if e.kind() == std::io::ErrorKind::StorageFull {
        Err(std::io::Error::new(
            std::io::ErrorKind::StorageFull,
            format!("Disk full: cannot write {}", path.display()),
        ))
    } else {
        Err(e)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    path.with_file_name(temp_name)
}

async fn write_temp(temp_path: &Path, contents: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    // Create file with restrictive permissions from the start to prevent
    // race condition where file is briefly world-readable
    #[cfg(unix)]
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(temp_path)
        .await?;

    #[cfg(not(unix))]
    let mut file = tokio::fs::File::create(temp_path).await?;

    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await
}
