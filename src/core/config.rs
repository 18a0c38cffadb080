use crate::core::download::DEFAULT_USER_AGENT;
use crate::error::{InstallError, Result};
use crate::utils::fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const URL_ENV_VAR: &str = "ZIPINSTALL_URL";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub source_url: Option<String>,
    pub destination: Option<PathBuf>,
    pub clamp_permissions: bool,
    pub staged_extraction: bool,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_url: None,
            destination: None,
            clamp_permissions: true,
            staged_extraction: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 300,
        }
    }
}

impl Config {
    /// Load the user config, creating it with defaults on first use.
    /// `ZIPINSTALL_URL` overrides the stored source URL.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&get_config_path()?)?;
        if let Ok(url) = std::env::var(URL_ENV_VAR) {
            if !url.trim().is_empty() {
                config.source_url = Some(url);
            }
        }
        Ok(config)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::ensure_dir_exists(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn set_source_url(&mut self, url: String) -> Result<()> {
        self.source_url = Some(url);
        self.validate()?;
        self.save()
    }

    pub fn set_destination(&mut self, destination: PathBuf) -> Result<()> {
        self.destination = Some(destination);
        self.save()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if let Some(url) = &self.source_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(InstallError::config_error(format!(
                    "source_url must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(InstallError::config_error("timeout_secs must be greater than 0"));
        }
        Ok(())
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("zipinstall").join("config.json"))
        .ok_or(InstallError::ConfigDirectoryNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_first_load_writes_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_round_trip_and_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");

        let config = Config {
            source_url: Some("https://example.com/pack.zip".to_string()),
            destination: Some(PathBuf::from("/opt/pack")),
            staged_extraction: true,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        std::fs::write(&path, r#"{ "timeout_secs": 20 }"#).unwrap();
        let partial = Config::load_from(&path).unwrap();
        assert_eq!(partial.timeout(), Duration::from_secs(20));
        assert!(partial.clamp_permissions);
    }

    #[test]
    fn test_rejects_bad_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");

        std::fs::write(&path, r#"{ "source_url": "ftp://example.com/a.zip" }"#).unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(InstallError::Config { .. })
        ));

        std::fs::write(&path, r#"{ "timeout_secs": 0 }"#).unwrap();
        assert!(Config::load_from(&path).is_err());

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(InstallError::Json(_))));
    }
}
