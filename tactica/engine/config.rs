use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tactica_logging::LogLevel;

use crate::{
    inference::InferenceConfig, telemetry::EngineTelemetry, training::TrainingConfig,
};

/// Engine settings, usually read from a TOML file.
///
/// ```toml
/// model_path = "models/predictor_tactico.json"
/// log_path = "logs/engine.log"
/// log_level = "INFO"
///
/// [training]
/// min_samples = 10
/// validation_ratio = 0.2
/// seed = 42
///
/// [training.forest]
/// n_estimators = 50
/// max_depth = 5
/// min_samples_split = 2
///
/// [inference]
/// unseen_penalty = 0.7
/// max_unseen_features = 2
/// min_confidence = 0.05
/// default_top_n = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Artifact file.
    pub model_path: PathBuf,
    /// JSON-lines log file; logging is off when absent.
    pub log_path: Option<PathBuf>,
    /// Minimum level written to the log.
    pub log_level: LogLevel,
    /// Training settings.
    pub training: TrainingConfig,
    /// Inference settings.
    pub inference: InferenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/predictor_tactico.json"),
            log_path: None,
            log_level: LogLevel::Info,
            training: TrainingConfig::default(),
            inference: InferenceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads and validates a TOML file. Relative paths resolve against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        let mut config =
            Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if config.model_path.is_relative() {
            config.model_path = source_dir.join(&config.model_path);
        }
        if let Some(log_path) = config.log_path.as_mut().filter(|p| p.is_relative()) {
            *log_path = source_dir.join(&*log_path);
        }
        Ok(config)
    }

    /// Parses and validates TOML text without touching paths.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every bound.
    pub fn validate(&self) -> Result<()> {
        let training = &self.training;
        if training.min_samples < 2 {
            bail!("training.min_samples must be at least 2");
        }
        if !(training.validation_ratio > 0.0 && training.validation_ratio < 1.0) {
            bail!("training.validation_ratio must lie strictly between 0 and 1");
        }
        if training.forest.n_estimators == 0 {
            bail!("training.forest.n_estimators must be at least 1");
        }
        if training.forest.max_depth == 0 {
            bail!("training.forest.max_depth must be at least 1");
        }
        if training.forest.min_samples_split < 2 {
            bail!("training.forest.min_samples_split must be at least 2");
        }
        let inference = &self.inference;
        if !(inference.unseen_penalty > 0.0 && inference.unseen_penalty <= 1.0) {
            bail!("inference.unseen_penalty must be in (0, 1]");
        }
        if !(1..=3).contains(&inference.max_unseen_features) {
            bail!("inference.max_unseen_features must be between 1 and 3");
        }
        if !(0.0..=1.0).contains(&inference.min_confidence) {
            bail!("inference.min_confidence must be in [0, 1]");
        }
        if inference.default_top_n == 0 {
            bail!("inference.default_top_n must be at least 1");
        }
        Ok(())
    }

    /// Telemetry for `module`, writing to `log_path` when one is configured.
    pub fn telemetry(&self, module: &str) -> Result<EngineTelemetry> {
        match &self.log_path {
            Some(path) => EngineTelemetry::builder(module)
                .log_path(path)
                .min_level(self.log_level)
                .build(),
            None => Ok(EngineTelemetry::disabled(module)),
        }
    }
}
