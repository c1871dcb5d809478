//! Configuration file handling

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use hpcalcs_core::{CableModel, CalcModel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cable: CableConfig,
    pub calc: CalcConfig,
    pub log: LogConfig,
}

impl Config {
    /// Get the config file path for this platform
    pub fn path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "hpcalcs").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load config from file, or create default if it doesn't exist
    pub fn load_or_create() -> Result<Self, Box<dyn Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;
        Self::load_or_create_at(&path)
    }

    pub fn load_or_create_at(path: &Path) -> Result<Self, Box<dyn Error>> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_with_header(path)?;
            eprintln!("created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Save config with header comments for new files
    pub fn save_with_header(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let header = r#"# hpcalcs configuration file
# cable models: nul, prime-hid
# calculator models: prime
# log levels: error, warn, info, debug, trace

"#;
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, format!("{header}{contents}"))?;
        Ok(())
    }

    pub fn cable_model(&self) -> Result<CableModel, Box<dyn Error>> {
        Ok(self.cable.model.parse()?)
    }

    pub fn calc_model(&self) -> Result<CalcModel, Box<dyn Error>> {
        Ok(self.calc.model.parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CableConfig {
    /// Cable model name
    pub model: String,
    /// How long a single report read may block
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for CableConfig {
    fn default() -> Self {
        Self {
            model: CableModel::PrimeHid.to_string(),
            read_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcConfig {
    /// Calculator model name
    pub model: String,
    /// Negotiate the extended protocol right after attaching
    pub extended_protocol: bool,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            model: CalcModel::Prime.to_string(),
            extended_protocol: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default log filter when RUST_LOG is unset and no -v is given
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cable]
            read_timeout = "500ms"
            "#,
        )
        .unwrap();
        assert_eq!(config.cable.read_timeout, Duration::from_millis(500));
        assert_eq!(config.cable_model().unwrap(), CableModel::PrimeHid);
        assert_eq!(config.calc_model().unwrap(), CalcModel::Prime);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn created_file_loads_back() {
        let path = std::env::temp_dir()
            .join(format!("hpcalcs-config-test-{}", std::process::id()))
            .join("config.toml");
        let _ = fs::remove_file(&path);

        let created = Config::load_or_create_at(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# hpcalcs configuration file"));

        let loaded = Config::load_or_create_at(&path).unwrap();
        assert_eq!(loaded.cable.model, created.cable.model);
        assert_eq!(loaded.cable.read_timeout, created.cable.read_timeout);
        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn bad_model_name_is_reported() {
        let config: Config = toml::from_str("[calc]\nmodel = \"ti-92\"\n").unwrap();
        assert!(config.calc_model().is_err());
    }
}
