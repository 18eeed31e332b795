use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;
use thiserror::Error;

use crate::error::TriageError;
use crate::profile::DEFAULT_SPREAD_FLOOR;
use crate::ranking::{ConfidenceTier, RankOptions, RankerConfig, TierThresholds};
use crate::scoring::{ScoringParams, SimilarityKernel, Weights};

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

pub const CONFIG_PATH_ENV: &str = "TRIAGE_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!(
                "expected one of development, staging, production; got {other}"
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        })
    }
}

/// Log verbosity. `WARNING` and `CRITICAL` are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    #[must_use]
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" | "CRITICAL" => Ok(LogLevel::Error),
            other => Err(format!(
                "expected one of TRACE, DEBUG, INFO, WARNING, ERROR, CRITICAL; got {other}"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("expected json or pretty; got {other}")),
        }
    }
}

/// Overrides read from the YAML file named by `TRIAGE_CONFIG`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TriageFileSettings {
    pub weights: Option<Weights>,
    pub scoring: Option<ScoringParams>,
    pub thresholds: Option<TierThresholds>,
    pub options: Option<RankOptions>,
    pub spread_floor: Option<f64>,
}

impl TriageFileSettings {
    /// # Errors
    /// Returns [`ConfigError::Io`] or [`ConfigError::Deserialize`].
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Deserialize {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply(self, config: &mut TriageConfig) {
        if let Some(weights) = self.weights {
            config.ranker.weights = weights;
        }
        if let Some(scoring) = self.scoring {
            config.ranker.scoring = scoring;
        }
        if let Some(thresholds) = self.thresholds {
            config.ranker.thresholds = thresholds;
        }
        if let Some(options) = self.options {
            config.ranker.options = options;
        }
        if let Some(spread_floor) = self.spread_floor {
            config.spread_floor = spread_floor;
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to read triage config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse triage config at {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("configuration rejected: {0}")]
    Rejected(#[from] TriageError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriageConfig {
    environment: Environment,
    log_level: LogLevel,
    log_format: LogFormat,
    ranker: RankerConfig,
    spread_floor: f64,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: LogLevel::Info,
            log_format: LogFormat::Pretty,
            ranker: RankerConfig::default(),
            spread_floor: DEFAULT_SPREAD_FLOOR,
        }
    }
}

impl TriageConfig {
    /// Defaults, then the `TRIAGE_CONFIG` YAML file if set, then environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a variable fails to parse, the file cannot be
    /// read or parsed, or the combined configuration is rejected by the engine.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.environment = parse_env("APP_ENV")?.unwrap_or_default();
        config.log_format = match config.environment {
            Environment::Production => LogFormat::Json,
            Environment::Development | Environment::Staging => LogFormat::Pretty,
        };
        if let Some(format) = parse_env("LOG_FORMAT")? {
            config.log_format = format;
        }
        if let Some(level) = parse_env("LOG_LEVEL")? {
            config.log_level = level;
        }

        if let Some(path) = env_value(CONFIG_PATH_ENV) {
            TriageFileSettings::load_from_path(Path::new(&path))?.apply(&mut config);
        }

        if let Some(raw) = env_value("TRIAGE_WEIGHTS") {
            config.ranker.weights = parse_weights(&raw).map_err(|source| ConfigError::Invalid {
                name: "TRIAGE_WEIGHTS",
                source,
            })?;
        }
        if let Some(raw) = env_value("TRIAGE_TOP_N") {
            let top_n = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
                name: "TRIAGE_TOP_N",
                source: anyhow::Error::new(error),
            })?;
            config.ranker.options.top_n = (top_n > 0).then_some(top_n);
        }
        if let Some(min_score) = parse_env::<f64>("TRIAGE_MIN_SCORE")? {
            if !(0.0..=1.0).contains(&min_score) {
                return Err(ConfigError::Invalid {
                    name: "TRIAGE_MIN_SCORE",
                    source: anyhow::anyhow!("{min_score} is outside [0, 1]"),
                });
            }
            config.ranker.options.min_score = min_score;
        }
        if let Some(tier) = parse_env::<ConfidenceTier>("TRIAGE_MIN_CONFIDENCE")? {
            config.ranker.options.min_confidence_tier = tier;
        }
        if let Some(max_penalty) = parse_env::<f64>("TRIAGE_MAX_PENALTY")? {
            if !max_penalty.is_finite() || max_penalty <= 0.0 {
                return Err(ConfigError::Invalid {
                    name: "TRIAGE_MAX_PENALTY",
                    source: anyhow::anyhow!("{max_penalty} must be finite and positive"),
                });
            }
            config.ranker.scoring.max_penalty = max_penalty;
        }
        if let Some(kernel) = parse_env::<SimilarityKernel>("TRIAGE_KERNEL")? {
            config.ranker.scoring.kernel = kernel;
        }
        if let Some(spread_floor) = parse_env::<f64>("TRIAGE_SPREAD_FLOOR")? {
            if !spread_floor.is_finite() || spread_floor <= 0.0 {
                return Err(ConfigError::Invalid {
                    name: "TRIAGE_SPREAD_FLOOR",
                    source: anyhow::anyhow!("{spread_floor} must be finite and positive"),
                });
            }
            config.spread_floor = spread_floor;
        }

        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`ConfigError::Rejected`] when the ranker settings or spread floor are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ranker.validate()?;
        crate::profile::ProfileBuilder::new(self.spread_floor)?;
        Ok(())
    }

    #[must_use]
    pub fn with_ranker(mut self, ranker: RankerConfig) -> Self {
        self.ranker = ranker;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: RankOptions) -> Self {
        self.ranker.options = options;
        self
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    #[must_use]
    pub fn ranker(&self) -> &RankerConfig {
        &self.ranker
    }

    #[must_use]
    pub fn options(&self) -> &RankOptions {
        &self.ranker.options
    }

    #[must_use]
    pub fn spread_floor(&self) -> f64 {
        self.spread_floor
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_env<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env_value(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|error| ConfigError::Invalid {
                name,
                source: anyhow::Error::msg(error.to_string()),
            })
        })
        .transpose()
}

/// Parses `energy=2, valence=0.5` style weight lists.
fn parse_weights(raw: &str) -> anyhow::Result<Weights> {
    let pairs = raw
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, weight) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("expected dimension=weight, got '{pair}'"))?;
            let weight = weight
                .trim()
                .parse::<f64>()
                .map_err(|error| anyhow::anyhow!("weight for '{}': {error}", name.trim()))?;
            Ok((name.trim().to_string(), weight))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Weights::from_named(pairs)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Dimension;

    const VARS: [&str; 12] = [
        "APP_ENV",
        "LOG_LEVEL",
        "LOG_FORMAT",
        CONFIG_PATH_ENV,
        "TRIAGE_WEIGHTS",
        "TRIAGE_TOP_N",
        "TRIAGE_MIN_SCORE",
        "TRIAGE_MIN_CONFIDENCE",
        "TRIAGE_MAX_PENALTY",
        "TRIAGE_KERNEL",
        "TRIAGE_SPREAD_FLOOR",
        "RUST_LOG",
    ];

    fn set_env(name: &str, value: &str) {
        // SAFETY: tests hold ENV_MUTEX and assign valid UTF-8 values.
        unsafe {
            env::set_var(name, value);
        }
    }

    fn reset_env() {
        for name in VARS {
            // SAFETY: tests hold ENV_MUTEX while mutating the environment.
            unsafe {
                env::remove_var(name);
            }
        }
    }

    #[test]
    fn from_env_uses_defaults() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();

        let config = TriageConfig::from_env().expect("config loads");
        assert_eq!(config, TriageConfig::default());
        assert_eq!(config.ranker().weights, Weights::uniform());
        assert_eq!(config.options().top_n, None);
    }

    #[test]
    fn from_env_overrides_values() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("APP_ENV", "production");
        set_env("LOG_LEVEL", "warning");
        set_env("TRIAGE_WEIGHTS", "energy=2, valence=0.5");
        set_env("TRIAGE_TOP_N", "3");
        set_env("TRIAGE_MIN_SCORE", "0.4");
        set_env("TRIAGE_MIN_CONFIDENCE", "medium");
        set_env("TRIAGE_MAX_PENALTY", "3");
        set_env("TRIAGE_KERNEL", "reciprocal");
        set_env("TRIAGE_SPREAD_FLOOR", "0.05");

        let config = TriageConfig::from_env().expect("config loads");
        assert_eq!(config.environment(), Environment::Production);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.log_level(), LogLevel::Warn);
        assert_eq!(config.ranker().weights.get(Dimension::Energy), 2.0);
        assert_eq!(config.ranker().weights.get(Dimension::Tempo), 0.0);
        assert_eq!(config.options().top_n, Some(3));
        assert_eq!(config.options().min_confidence_tier, ConfidenceTier::Medium);
        assert_eq!(config.ranker().scoring.kernel, SimilarityKernel::Reciprocal);
        assert_eq!(config.ranker().scoring.max_penalty, 3.0);
        assert_eq!(config.spread_floor(), 0.05);
        reset_env();
    }

    #[test]
    fn zero_top_n_means_unbounded() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("TRIAGE_TOP_N", "0");

        let config = TriageConfig::from_env().expect("config loads");
        assert_eq!(config.options().top_n, None);
        reset_env();
    }

    #[test]
    fn from_env_rejects_unknown_log_level() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("LOG_LEVEL", "VERBOSE");

        let error = TriageConfig::from_env().unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { name: "LOG_LEVEL", .. }));
        reset_env();
    }

    #[test]
    fn from_env_rejects_out_of_range_min_score() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("TRIAGE_MIN_SCORE", "1.2");

        let error = TriageConfig::from_env().unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { name: "TRIAGE_MIN_SCORE", .. }));
        reset_env();
    }

    #[test]
    fn from_env_rejects_malformed_weights() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("TRIAGE_WEIGHTS", "energy:2");

        let error = TriageConfig::from_env().unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { name: "TRIAGE_WEIGHTS", .. }));
        reset_env();
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env(CONFIG_PATH_ENV, "/nonexistent/triage.yaml");

        let error = TriageConfig::from_env().unwrap_err();
        assert!(matches!(error, ConfigError::Io { .. }));
        reset_env();
    }

    #[test]
    fn bundled_config_file_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/triage.local.yaml");
        let settings = TriageFileSettings::load_from_path(&path).expect("fixture parses");
        let weights = settings.weights.expect("weights present");
        assert!(weights.get(Dimension::Energy) > 0.0);
        assert!(settings.options.is_some());
    }

    #[test]
    fn log_level_aliases() {
        assert_eq!("CRITICAL".parse::<LogLevel>(), Ok(LogLevel::Error));
        assert_eq!("Warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(LogLevel::Debug.as_directive(), "debug");
    }
}
