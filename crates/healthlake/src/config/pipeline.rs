use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HealthlakeError, Result};
use crate::models::Domain;
use crate::transform::window::{resolve_zone, IncrementalWindow, MAX_LOOKBACK_DAYS};

const CONFIG_FILENAME: &str = "config.json";

/// Incremental staging lookback, per source domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookbackDays {
    pub health: u32,
    pub workouts: u32,
    pub activities: u32,
}

impl Default for LookbackDays {
    fn default() -> Self {
        Self {
            health: 15,
            workouts: 15,
            activities: 15,
        }
    }
}

impl LookbackDays {
    pub fn for_domain(&self, domain: Domain) -> u32 {
        match domain {
            Domain::Health => self.health,
            Domain::Workouts => self.workouts,
            Domain::Activities => self.activities,
        }
    }
}

/// Pipeline settings, stored as `config.json` in the config directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Entity the daily marts are built for
    pub entity: String,

    /// IANA zone used for every calendar-date derivation
    pub timezone: String,

    /// Window of the "recent" marts
    pub recent_days: u32,

    pub lookback_days: LookbackDays,

    /// Overrides the platform data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            entity: "default".to_string(),
            timezone: "Australia/Melbourne".to_string(),
            recent_days: 365,
            lookback_days: LookbackDays::default(),
            data_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf> {
        Ok(super::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            HealthlakeError::config(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            super::ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check the settings before any data is touched
    pub fn validate(&self) -> Result<()> {
        if self.entity.trim().is_empty() {
            return Err(HealthlakeError::config("entity must not be empty"));
        }
        self.zone()?;
        check_days("recent_days", self.recent_days)?;
        for domain in Domain::ALL {
            check_days(
                &format!("lookback_days.{}", domain),
                self.lookback_days.for_domain(domain),
            )?;
        }
        Ok(())
    }

    pub fn zone(&self) -> Result<Tz> {
        resolve_zone(&self.timezone)
    }

    /// Configured data directory, falling back to the platform default
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => super::data_dir(),
        }
    }

    /// Staging window for one domain
    pub fn staging_window(&self, domain: Domain) -> Result<IncrementalWindow> {
        Ok(IncrementalWindow::with_zone(
            self.lookback_days.for_domain(domain),
            self.zone()?,
        ))
    }

    /// Window of the "recent" marts
    pub fn recent_window(&self) -> Result<IncrementalWindow> {
        Ok(IncrementalWindow::with_zone(self.recent_days, self.zone()?))
    }
}

fn check_days(name: &str, days: u32) -> Result<()> {
    if days == 0 || days > MAX_LOOKBACK_DAYS {
        return Err(HealthlakeError::config(format!(
            "{} must be between 1 and {} (got {})",
            name, MAX_LOOKBACK_DAYS, days
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::load(&temp.path().join("config.json")).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.lookback_days.for_domain(Domain::Workouts), 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.json");

        let config = PipelineConfig {
            entity: "me".to_string(),
            timezone: "Europe/London".to_string(),
            data_dir: Some(temp.path().join("data")),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.data_dir().unwrap(), temp.path().join("data"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"timezone": "UTC", "lookback_days": {"workouts": 30}}"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.lookback_days.workouts, 30);
        assert_eq!(config.lookback_days.health, 15);
        assert_eq!(config.recent_days, 365);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(HealthlakeError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let bad_zone = PipelineConfig {
            timezone: "Nowhere/Special".to_string(),
            ..Default::default()
        };
        assert!(matches!(bad_zone.validate(), Err(HealthlakeError::TimeZone(_))));

        let mut zero_lookback = PipelineConfig::default();
        zero_lookback.lookback_days.activities = 0;
        assert!(matches!(zero_lookback.validate(), Err(HealthlakeError::Config(_))));

        let no_recent = PipelineConfig {
            recent_days: 0,
            ..Default::default()
        };
        assert!(no_recent.validate().is_err());

        let huge_recent = PipelineConfig {
            recent_days: 3_000_000_000,
            ..Default::default()
        };
        assert!(matches!(huge_recent.validate(), Err(HealthlakeError::Config(_))));

        let mut huge_lookback = PipelineConfig::default();
        huge_lookback.lookback_days.health = MAX_LOOKBACK_DAYS + 1;
        assert!(matches!(huge_lookback.validate(), Err(HealthlakeError::Config(_))));

        let mut longest = PipelineConfig::default();
        longest.lookback_days.health = MAX_LOOKBACK_DAYS;
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_windows_use_configured_zone() {
        let config = PipelineConfig::default();
        let window = config.staging_window(Domain::Health).unwrap();
        assert_eq!(window.lookback_days(), 15);
        assert_eq!(window.zone(), chrono_tz::Australia::Melbourne);
        assert_eq!(config.recent_window().unwrap().lookback_days(), 365);
    }
}
