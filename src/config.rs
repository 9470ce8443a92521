//! Report configuration.
//!
//! Everything has a default matching the published analysis (Paraíba,
//! Jan-Nov 2024), so the binaries run without a config file; a
//! `report.toml` at the repository root overrides selectively.
use crate::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Two-letter state code the analysis is restricted to.
    pub uf: String,
    /// Year of the hospitalization extract.
    pub year: u16,
    /// Last competency month included (the report covers January up to and
    /// including this month).
    pub max_competency_month: u8,
    /// Where the facility/bed registry CSV is downloaded from.
    pub beds_registry_url: String,
    /// Where the hospitalization records CSV is downloaded from.
    pub admissions_url: String,
    /// Bed count the simple regression model produces a prediction for.
    pub predict_beds: f64,
    pub fetch: FetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uf: "PB".to_string(),
            year: 2024,
            max_competency_month: 11,
            beds_registry_url:
                "https://drive.google.com/uc?id=1LRPmb12Et55FEBwi8eL2NgX0s4JQvJ5d".to_string(),
            admissions_url:
                "https://drive.google.com/uc?id=1EhOmaJoCLpzDT9HCEY2XmqVnH3KFckVV".to_string(),
            predict_beds: 260.0,
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            retries: 3,
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !crate::path_exists(path)? {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("while reading \"{}\"", path.display()))?;
        toml::from_str(&text).with_context(|| format!("while parsing \"{}\"", path.display()))
    }
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn partial_config_overrides_defaults() {
        let config: Config = toml::from_str("year = 2023\nuf = \"PE\"").unwrap();
        assert_eq!(config.year, 2023);
        assert_eq!(config.uf, "PE");
        assert_eq!(config.max_competency_month, 11);
        assert_eq!(config.fetch.retries, 3);
    }
}
