//! Application paths for config and uploaded documents.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application paths.
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Data directory.
    pub data: PathBuf,
}

impl AppPaths {
    /// Create paths for the ocrmux application.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("dev", "ocrmux", "ocrmux") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            // No home directory; stay relative to the working dir
            Self {
                config: PathBuf::from(".ocrmux"),
                data: PathBuf::from("storage"),
            }
        }
    }

    /// Path to the config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Default root for per-job upload directories.
    #[must_use]
    pub fn uploads_dir(&self) -> PathBuf {
        self.data.join("uploads")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
