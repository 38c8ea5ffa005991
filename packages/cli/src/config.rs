//! Engine configuration file.
//!
//! ```toml
//! [spawn]
//! base_rate = 0.05
//! hourly_rates = { "8" = 2.0, "17" = 1.8 }
//! day_multipliers = { "0" = 1.3 }
//!
//! [geodata]
//! base_url = "https://cms.example.org"
//! country_id = "bb"
//!
//! [catchment]
//! buffer_km = 0.5
//!
//! [reservoir]
//! window_minutes = 15
//!
//! [[models]]
//! name = "island"
//! path = "models/island.json"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rider_demand_catchment::CatchmentConfig;
use rider_demand_factors::{FactorModel, ModelError, ModelFormat};
use rider_demand_geodata::GeodataConfig;
use rider_demand_reservoir::ReservoirConfig;
use rider_demand_spawn_models::SpawnConfig;
use serde::Deserialize;

/// Overrides `geodata.base_url`.
pub const GEODATA_URL_VAR: &str = "RIDER_DEMAND_GEODATA_URL";

/// Overrides `geodata.token`.
pub const GEODATA_TOKEN_VAR: &str = "RIDER_DEMAND_GEODATA_TOKEN";

/// Errors that can occur while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`EngineConfig`].
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The values parse but make no sense together.
    #[error("Invalid configuration: {message}")]
    Validation {
        /// Every problem found, joined.
        message: String,
    },
}

const fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

const fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// A factor model to load at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelEntry {
    /// Name the model is registered under.
    pub name: String,
    /// JSON or TOML model document.
    pub path: PathBuf,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Spawn pipeline rates and multipliers.
    #[serde(default)]
    pub spawn: SpawnConfig,
    /// Geodata API; catchment loading is unavailable without it.
    #[serde(default)]
    pub geodata: Option<GeodataConfig>,
    /// Buffer radii and worker timeouts.
    #[serde(default)]
    pub catchment: CatchmentConfig,
    /// Tick window and seed.
    #[serde(default)]
    pub reservoir: ReservoirConfig,
    /// Factor models loaded at startup.
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

impl EngineConfig {
    /// Loads `path` (or defaults when `None`), applies environment
    /// overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or
    /// fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                log::debug!("Reading config from {}", path.display());
                Self::parse(&std::fs::read_to_string(path)?)?
            }
            None => Self::default(),
        };
        config.apply_overrides(
            std::env::var(GEODATA_URL_VAR).ok(),
            std::env::var(GEODATA_TOKEN_VAR).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the document does not parse.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies the geodata URL and token overrides. A token without any
    /// geodata section is ignored.
    pub fn apply_overrides(&mut self, url: Option<String>, token: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            match &mut self.geodata {
                Some(geodata) => geodata.base_url = url,
                None => self.geodata = Some(GeodataConfig::new(url)),
            }
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            match &mut self.geodata {
                Some(geodata) => geodata.token = Some(token),
                None => log::warn!("{GEODATA_TOKEN_VAR} set without a geodata URL, ignoring"),
            }
        }
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] listing every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if let Some(rate) = self.spawn.base_rate.filter(|r| !is_non_negative(*r)) {
            problems.push(format!("spawn.base_rate must be non-negative, got {rate}"));
        }
        if !is_positive(self.catchment.buffer_km) {
            problems.push(format!(
                "catchment.buffer_km must be positive, got {}",
                self.catchment.buffer_km
            ));
        }
        if !is_positive(self.catchment.depot_radius_km) {
            problems.push(format!(
                "catchment.depot_radius_km must be positive, got {}",
                self.catchment.depot_radius_km
            ));
        }
        if self.reservoir.window_minutes == 0 {
            problems.push("reservoir.window_minutes must be at least 1".to_string());
        }
        if let Some(geodata) = &self.geodata {
            if geodata.base_url.trim().is_empty() {
                problems.push("geodata.base_url must not be empty".to_string());
            }
            if geodata.page_size == 0 {
                problems.push("geodata.page_size must be at least 1".to_string());
            }
        }

        let mut names = BTreeSet::new();
        for entry in &self.models {
            if !names.insert(entry.name.as_str()) {
                problems.push(format!("model '{}' is listed more than once", entry.name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation {
                message: problems.join("; "),
            })
        }
    }

    /// A [`FactorModel`] with every `[[models]]` entry loaded and validated.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModelError`].
    pub fn factor_model(&self) -> Result<FactorModel, ModelError> {
        let mut factors = FactorModel::new();
        for entry in &self.models {
            let format =
                ModelFormat::from_path(&entry.path).ok_or_else(|| ModelError::UnsupportedFormat {
                    path: entry.path.display().to_string(),
                })?;
            let contents = std::fs::read_to_string(&entry.path)?;
            factors.load_model_str(&entry.name, &contents, format, true)?;
            log::info!(
                "Loaded model '{}' from {}",
                entry.name,
                entry.path.display()
            );
        }
        Ok(factors)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::parse("").unwrap();
        assert!(config.geodata.is_none());
        assert_eq!(config.reservoir.window_minutes, 15);
        assert!((config.catchment.buffer_km - 0.5).abs() < 1e-12);
        assert!(config.models.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn parses_all_sections() {
        let config = EngineConfig::parse(
            r#"
            [spawn]
            base_rate = 0.05
            hourly_rates = { "8" = 2.0 }
            day_multipliers = { "0" = 1.3 }

            [geodata]
            base_url = "https://cms.example.org"
            country_id = "bb"

            [catchment]
            buffer_km = 0.75

            [reservoir]
            window_minutes = 5
            seed = 99

            [[models]]
            name = "island"
            path = "models/island.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.spawn.base_rate, Some(0.05));
        assert_eq!(config.spawn.hourly_rates.get(8), Some(2.0));
        assert_eq!(config.spawn.day_multipliers.get(0), Some(1.3));
        let geodata = config.geodata.as_ref().unwrap();
        assert_eq!(geodata.country_id.as_deref(), Some("bb"));
        assert_eq!(geodata.page_size, 1000);
        assert_eq!(config.reservoir.seed, Some(99));
        assert_eq!(config.models[0].name, "island");
        config.validate().unwrap();
    }

    #[test]
    fn bad_rate_keys_fail_to_parse() {
        let err = EngineConfig::parse("[spawn]\nhourly_rates = { \"25\" = 1.0 }").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn validation_collects_problems() {
        let mut config = EngineConfig::parse(
            r#"
            [catchment]
            buffer_km = 0.0

            [reservoir]
            window_minutes = 0

            [[models]]
            name = "a"
            path = "a.json"

            [[models]]
            name = "a"
            path = "b.json"
            "#,
        )
        .unwrap();
        config.spawn.base_rate = Some(-1.0);
        let Err(ConfigError::Validation { message }) = config.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(message.split("; ").count(), 4);
        assert!(message.contains("buffer_km"));
        assert!(message.contains("more than once"));
    }

    #[test]
    fn overrides_create_or_update_geodata() {
        let mut config = EngineConfig::default();
        config.apply_overrides(None, Some("secret".to_string()));
        assert!(config.geodata.is_none());

        config.apply_overrides(Some("http://localhost:1337".to_string()), None);
        config.apply_overrides(None, Some("secret".to_string()));
        let geodata = config.geodata.as_ref().unwrap();
        assert_eq!(geodata.base_url, "http://localhost:1337");
        assert_eq!(geodata.token.as_deref(), Some("secret"));

        config.apply_overrides(Some("  ".to_string()), None);
        assert_eq!(config.geodata.unwrap().base_url, "http://localhost:1337");
    }

    #[test]
    fn loads_listed_models() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"locations": {{"stop": {{"passenger_rates": {{
                "boarding": {{"peak": {{"rate_per_hour": 10.0}}, "off_peak": {{"rate_per_hour": 5.0}}}},
                "alighting": {{"peak": {{"rate_per_hour": 8.0}}, "off_peak": {{"rate_per_hour": 4.0}}}}
            }}}}}}}}"#
        )
        .unwrap();

        let config = EngineConfig {
            models: vec![ModelEntry {
                name: "island".to_string(),
                path: file.path().to_path_buf(),
            }],
            ..EngineConfig::default()
        };
        let factors = config.factor_model().unwrap();
        assert_eq!(factors.model_names().collect::<Vec<_>>(), vec!["island"]);
    }
}
