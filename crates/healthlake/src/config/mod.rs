mod pipeline;

pub use pipeline::{LookbackDays, PipelineConfig};

use crate::error::{HealthlakeError, Result};
use std::path::{Path, PathBuf};

/// Default configuration directory name
const CONFIG_DIR_NAME: &str = "healthlake";

/// Get the configuration directory path
/// Returns ~/.config/healthlake on Unix, ~/Library/Application Support/healthlake on macOS
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(CONFIG_DIR_NAME))
        .ok_or_else(|| HealthlakeError::config("Could not determine config directory"))
}

/// Get the data directory holding landing files, staged partitions and marts
/// Returns ~/.local/share/healthlake on Unix, ~/Library/Application Support/healthlake on macOS
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|p| p.join(CONFIG_DIR_NAME))
        .ok_or_else(|| HealthlakeError::config("Could not determine data directory"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_exists() {
        let dir = config_dir();
        assert!(dir.is_ok());
        let path = dir.unwrap();
        assert!(path.ends_with("healthlake"));
    }

    #[test]
    fn test_data_dir_exists() {
        let dir = data_dir();
        assert!(dir.is_ok());
        let path = dir.unwrap();
        assert!(path.ends_with("healthlake"));
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let temp = tempfile::TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
