#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Temporal and contextual passenger-flow factor model.
//!
//! A [`FactorModel`] holds any number of named [`Model`]s plus the current
//! real-time [`Conditions`]. Evaluating a location composes four factor
//! groups multiplicatively onto its peak or off-peak base rate:
//!
//! 1. time: day type (holiday, sunday, saturday, weekday) and the active
//!    peak window's multiplier,
//! 2. seasonal: the season of the target month,
//! 3. event: every matching special event, compounded,
//! 4. real-time: the four condition lookup tables.
//!
//! Unknown model names and location ids yield `None` rather than an error
//! so a loop over many locations survives one bad key.

pub mod calendar;
pub mod events;
pub mod flow;
pub mod schedule;
pub mod validate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rand::Rng;
use rider_demand_factors_models::{Conditions, FlowResult, Model};
use strum_macros::{AsRefStr, Display, EnumString};

pub use schedule::PassengerSchedule;
pub use validate::validate_model;

/// Errors that can occur while loading a model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The model file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON document did not match the model schema.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The TOML document did not match the model schema.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The model parsed but failed semantic validation.
    #[error("Model '{name}' failed validation: {}", .problems.join("; "))]
    Validation {
        /// Name the model would have been registered under.
        name: String,
        /// Every problem found.
        problems: Vec<String>,
    },

    /// Neither a file nor a model in the models directory matched.
    #[error("Model not found: {name}")]
    NotFound {
        /// The name or path that was looked up.
        name: String,
    },

    /// The file extension is not a supported model format.
    #[error("Unsupported model format: {path}")]
    UnsupportedFormat {
        /// Offending path.
        path: String,
    },
}

/// Serialisation format of a model document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ModelFormat {
    /// `.json`
    Json,
    /// `.toml`
    Toml,
}

impl ModelFormat {
    /// Guesses the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }

    /// Parses `contents` into a [`Model`].
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Json`] or [`ModelError::Toml`] if the document
    /// does not match the model schema.
    pub fn parse(self, contents: &str) -> Result<Model, ModelError> {
        Ok(match self {
            Self::Json => serde_json::from_str(contents)?,
            Self::Toml => toml::from_str(contents)?,
        })
    }
}

/// Registry of named passenger-flow models and the current real-time
/// conditions.
#[derive(Debug, Clone, Default)]
pub struct FactorModel {
    models: BTreeMap<String, Model>,
    conditions: Conditions,
    models_dir: Option<PathBuf>,
}

impl FactorModel {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory searched by [`load_model`](Self::load_model)
    /// when it is given a bare name.
    #[must_use]
    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = Some(dir.into());
        self
    }

    /// Loads a model from a path, or by name from the models directory
    /// (`<name>.json`, then `<name>.toml`), and registers it under the
    /// file stem.
    ///
    /// Returns the name the model was registered under. A model that fails
    /// to parse or validate is not registered.
    ///
    /// # Errors
    ///
    /// * [`ModelError::NotFound`] if no file matches
    /// * [`ModelError::UnsupportedFormat`] for unknown extensions
    /// * [`ModelError::Io`] if the file cannot be read
    /// * [`ModelError::Json`] / [`ModelError::Toml`] on parse failure
    /// * [`ModelError::Validation`] if `validate` is set and checks fail
    pub fn load_model(&mut self, name_or_path: &str, validate: bool) -> Result<String, ModelError> {
        let path = self.resolve(name_or_path).ok_or_else(|| ModelError::NotFound {
            name: name_or_path.to_owned(),
        })?;
        let format = ModelFormat::from_path(&path).ok_or_else(|| ModelError::UnsupportedFormat {
            path: path.display().to_string(),
        })?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name_or_path)
            .to_owned();

        let contents = std::fs::read_to_string(&path)?;
        self.load_model_str(&name, &contents, format, validate)?;
        log::info!("Loaded model '{name}' from {}", path.display());
        Ok(name)
    }

    fn resolve(&self, name_or_path: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(name_or_path);
        if direct.is_file() {
            return Some(direct);
        }
        let dir = self.models_dir.as_ref()?;
        ["json", "toml"]
            .iter()
            .map(|ext| dir.join(format!("{name_or_path}.{ext}")))
            .find(|p| p.is_file())
    }

    /// Parses `contents` and registers the model as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the document does not parse or, when
    /// `validate` is set, fails validation.
    pub fn load_model_str(
        &mut self,
        name: &str,
        contents: &str,
        format: ModelFormat,
        validate: bool,
    ) -> Result<(), ModelError> {
        let model = format.parse(contents)?;
        self.register_model(name, model, validate)
    }

    /// Registers an already-parsed model as `name`, replacing any model
    /// previously registered under that name.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] if `validate` is set and the
    /// model fails validation.
    pub fn register_model(
        &mut self,
        name: &str,
        model: Model,
        validate: bool,
    ) -> Result<(), ModelError> {
        if validate {
            let problems = validate_model(&model);
            if !problems.is_empty() {
                log::warn!(
                    "Rejected model '{name}': {} validation problem(s)",
                    problems.len()
                );
                return Err(ModelError::Validation {
                    name: name.to_owned(),
                    problems,
                });
            }
        }
        log::debug!(
            "Registered model '{name}' with {} location(s)",
            model.locations.len()
        );
        self.models.insert(name.to_owned(), model);
        Ok(())
    }

    /// Removes a model, returning it if it was registered.
    pub fn unload_model(&mut self, name: &str) -> Option<Model> {
        self.models.remove(name)
    }

    /// Looks up a registered model.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// Names of every registered model, in sorted order.
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Merges `update` into the current conditions. Fields left unset in
    /// `update` keep their current value.
    pub fn update_conditions(&mut self, update: Conditions) {
        self.conditions.merge(update);
    }

    /// Resets every real-time condition.
    pub fn clear_conditions(&mut self) {
        self.conditions = Conditions::default();
    }

    /// Current real-time conditions.
    #[must_use]
    pub const fn current_conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// Evaluates expected passenger flow at `location_id` starting at
    /// `time` for `duration_minutes`, drawing rate variance from the
    /// thread-local RNG.
    ///
    /// Returns `None` if the model or location is unknown.
    #[must_use]
    pub fn calculate_passenger_flow(
        &self,
        model_name: &str,
        location_id: &str,
        time: NaiveDateTime,
        duration_minutes: u32,
    ) -> Option<FlowResult> {
        self.calculate_passenger_flow_with_rng(
            model_name,
            location_id,
            time,
            duration_minutes,
            &mut rand::thread_rng(),
        )
    }

    /// Same as [`calculate_passenger_flow`](Self::calculate_passenger_flow)
    /// with an explicit RNG for reproducible variance.
    pub fn calculate_passenger_flow_with_rng<R: Rng + ?Sized>(
        &self,
        model_name: &str,
        location_id: &str,
        time: NaiveDateTime,
        duration_minutes: u32,
        rng: &mut R,
    ) -> Option<FlowResult> {
        let Some(model) = self.models.get(model_name) else {
            log::debug!("Unknown model '{model_name}'");
            return None;
        };
        let Some(location) = model.locations.get(location_id) else {
            log::debug!("Unknown location '{location_id}' in model '{model_name}'");
            return None;
        };
        Some(flow::evaluate(
            model,
            location_id,
            location,
            &self.conditions,
            time,
            duration_minutes,
            rng,
        ))
    }

    /// Builds a lazy schedule of flow results for every location of
    /// `model_name` at each `interval_minutes` boundary in `[start, end)`.
    ///
    /// The current conditions are captured now; later
    /// [`update_conditions`](Self::update_conditions) calls do not affect
    /// an existing schedule. Without a `seed` one is drawn and kept, so
    /// the schedule still replays identically on restart.
    ///
    /// Returns `None` if the model is unknown.
    #[must_use]
    pub fn generate_passenger_schedule(
        &self,
        model_name: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        interval_minutes: u32,
        seed: Option<u64>,
    ) -> Option<PassengerSchedule<'_>> {
        let Some(model) = self.models.get(model_name) else {
            log::debug!("Unknown model '{model_name}'");
            return None;
        };
        let seed = seed.unwrap_or_else(|| rand::thread_rng().r#gen());
        Some(PassengerSchedule::new(
            model,
            self.conditions.clone(),
            start,
            end,
            interval_minutes,
            seed,
        ))
    }
}
