//! Engine Configuration
//!
//! Unified configuration for an analysis run:
//! - Slicing window
//! - Deterministic detector thresholds
//! - Learned detector hyperparameters
//! - Persistence thresholds
//! - Runtime parameters
//! - Logging
//!
//! Every section falls back to its defaults, so a TOML file only needs the
//! keys it overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use ledgerlens_core::config::EngineConfig;
//!
//! // Load from environment
//! let config = EngineConfig::from_env()?;
//!
//! // Or load from file
//! let config = EngineConfig::from_file("config/production.toml")?;
//! config.validate()?;
//! ```

use crate::error::{EngineError, Result};
use crate::observability::{LogConfig, LogLevel};
use crate::window::SliceWindow;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Graph construction settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Slice width.
    pub window: SliceWindow,
}

/// Circular trading detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Shortest cycle reported.
    pub min_length: usize,
    /// Longest cycle searched.
    pub max_length: usize,
    /// Cap on start nodes.
    pub max_candidates: usize,
    /// Cap on unique cycles collected per graph.
    pub max_cycles: usize,
    /// Cap on path expansions per start node.
    pub max_path_expansions: usize,
    /// Minimum average edge weight along the cycle.
    pub min_average_amount: f64,
    /// Maximum relative deviation of any edge from the average.
    pub max_deviation: f64,
    /// Severity of emitted anomalies.
    pub severity: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_length: 6,
            max_candidates: 200,
            max_cycles: 100,
            max_path_expansions: 50_000,
            min_average_amount: 100.0,
            max_deviation: 0.2,
            severity: 0.9,
        }
    }
}

/// Dense cluster detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Smallest component evaluated.
    pub min_size: usize,
    /// Components smaller than this use `small_density`.
    pub large_size: usize,
    /// Density threshold for small components.
    pub small_density: f64,
    /// Density threshold for large components.
    pub large_density: f64,
    /// Severity of emitted anomalies.
    pub severity: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_size: 4,
            large_size: 10,
            small_density: 0.8,
            large_density: 0.5,
            severity: 0.7,
        }
    }
}

impl ClusterConfig {
    /// Density a component of `size` nodes must exceed.
    #[must_use]
    pub fn threshold_for(&self, size: usize) -> f64 {
        if size < self.large_size {
            self.small_density
        } else {
            self.large_density
        }
    }
}

/// Wash trading detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WashConfig {
    /// Gross volume the pair must exceed.
    pub min_total_volume: f64,
    /// Net flow must be below this share of gross volume.
    pub max_net_ratio: f64,
    /// Severity of emitted anomalies.
    pub severity: f64,
}

impl Default for WashConfig {
    fn default() -> Self {
        Self {
            min_total_volume: 5000.0,
            max_net_ratio: 0.05,
            severity: 0.85,
        }
    }
}

/// Structuring detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuringConfig {
    /// Minimum fan degree.
    pub min_degree: usize,
    /// Mean edge weight must exceed this.
    pub min_mean_amount: f64,
    /// Coefficient of variation must be below this.
    pub max_variation: f64,
    /// Severity of emitted anomalies.
    pub severity: f64,
}

impl Default for StructuringConfig {
    fn default() -> Self {
        Self {
            min_degree: 5,
            min_mean_amount: 100.0,
            max_variation: 0.1,
            severity: 0.95,
        }
    }
}

/// Learned structural detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedConfig {
    /// Run the learned detector at all.
    pub enabled: bool,
    /// Slices need strictly more edges than this.
    pub min_edges: usize,
    /// First GCN layer width.
    pub hidden_dim: usize,
    /// Embedding width.
    pub embedding_dim: usize,
    /// Decoder hidden width.
    pub decoder_hidden_dim: usize,
    /// Training iterations.
    pub epochs: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Edges scoring above this are flagged.
    pub threshold: f64,
    /// Base seed; mixed with the slice label per slice.
    pub seed: u64,
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_edges: 10,
            hidden_dim: 16,
            embedding_dim: 8,
            decoder_hidden_dim: 16,
            epochs: 100,
            learning_rate: 0.01,
            threshold: 0.5,
            seed: 42,
        }
    }
}

/// Cross-slice persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Occurrences needed for Medium confidence.
    pub medium_occurrences: usize,
    /// Occurrences needed for High confidence.
    pub high_occurrences: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            medium_occurrences: 2,
            high_occurrences: 3,
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Analyze slices on a worker pool.
    pub parallel_slices: bool,
    /// Worker pool size; 0 uses the global pool.
    pub worker_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            parallel_slices: true,
            worker_threads: 0,
        }
    }
}

/// Unified engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Environment name
    pub environment: String,
    /// Graph configuration
    pub graph: GraphConfig,
    /// Circular trading configuration
    pub cycles: CycleConfig,
    /// Dense cluster configuration
    pub clusters: ClusterConfig,
    /// Wash trading configuration
    pub wash: WashConfig,
    /// Structuring configuration
    pub structuring: StructuringConfig,
    /// Learned detector configuration
    pub learned: LearnedConfig,
    /// Persistence configuration
    pub persistence: PersistenceConfig,
    /// Runtime configuration
    pub runtime: RuntimeConfig,
    /// Logging configuration
    pub logging: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            graph: GraphConfig::default(),
            cycles: CycleConfig::default(),
            clusters: ClusterConfig::default(),
            wash: WashConfig::default(),
            structuring: StructuringConfig::default(),
            learned: LearnedConfig::default(),
            persistence: PersistenceConfig::default(),
            runtime: RuntimeConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Development configuration: sequential slices, verbose logs.
    pub fn development() -> Self {
        Self {
            environment: "development".to_string(),
            runtime: RuntimeConfig {
                parallel_slices: false,
                worker_threads: 0,
            },
            logging: LogConfig::development(),
            ..Default::default()
        }
    }

    /// Production configuration: parallel slices, JSON logs.
    pub fn production() -> Self {
        Self {
            environment: "production".to_string(),
            runtime: RuntimeConfig {
                parallel_slices: true,
                worker_threads: 0,
            },
            logging: LogConfig::production(),
            ..Default::default()
        }
    }

    /// Load configuration from `LEDGERLENS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("LEDGERLENS_ENV").as_deref().unwrap_or("development") {
            "production" | "prod" => Self::production(),
            _ => Self::development(),
        };

        if let Some(window) = lookup("LEDGERLENS_WINDOW") {
            config.graph.window = window.parse().map_err(EngineError::config)?;
        }

        if let Some(parallel) = lookup("LEDGERLENS_PARALLEL") {
            config.runtime.parallel_slices = parse_var("LEDGERLENS_PARALLEL", &parallel)?;
        }

        if let Some(workers) = lookup("LEDGERLENS_WORKERS") {
            config.runtime.worker_threads = parse_var("LEDGERLENS_WORKERS", &workers)?;
        }

        if let Some(enabled) = lookup("LEDGERLENS_LEARNED_ENABLED") {
            config.learned.enabled = parse_var("LEDGERLENS_LEARNED_ENABLED", &enabled)?;
        }

        if let Some(epochs) = lookup("LEDGERLENS_EPOCHS") {
            config.learned.epochs = parse_var("LEDGERLENS_EPOCHS", &epochs)?;
        }

        if let Some(seed) = lookup("LEDGERLENS_SEED") {
            config.learned.seed = parse_var("LEDGERLENS_SEED", &seed)?;
        }

        if let Some(level) = lookup("LEDGERLENS_LOG_LEVEL") {
            config.logging.level = level.parse::<LogLevel>().map_err(EngineError::config)?;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EngineError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| EngineError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Render configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = self.to_toml()?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| EngineError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let cycles = &self.cycles;
        if cycles.min_length < 2 || cycles.min_length > cycles.max_length {
            return Err(EngineError::config(format!(
                "cycle length range {}..={} is invalid",
                cycles.min_length, cycles.max_length
            )));
        }
        if cycles.max_cycles == 0 || cycles.max_candidates == 0 {
            return Err(EngineError::config("cycle caps must be positive"));
        }
        if !(0.0..=1.0).contains(&self.wash.max_net_ratio) {
            return Err(EngineError::config("wash.max_net_ratio must be in [0, 1]"));
        }
        if self.clusters.min_size < 2 {
            return Err(EngineError::config("clusters.min_size must be at least 2"));
        }
        if self.structuring.min_degree < 2 {
            return Err(EngineError::config("structuring.min_degree must be at least 2"));
        }

        let severities = [
            cycles.severity,
            self.clusters.severity,
            self.wash.severity,
            self.structuring.severity,
        ];
        if severities.iter().any(|s| !(0.0..=1.0).contains(s)) {
            return Err(EngineError::config("severities must be in [0, 1]"));
        }

        let learned = &self.learned;
        if learned.hidden_dim == 0 || learned.embedding_dim == 0 || learned.decoder_hidden_dim == 0
        {
            return Err(EngineError::config("learned layer widths must be positive"));
        }
        if !(learned.learning_rate.is_finite() && learned.learning_rate > 0.0) {
            return Err(EngineError::config("learned.learning_rate must be positive"));
        }
        if !(0.0..=1.0).contains(&learned.threshold) {
            return Err(EngineError::config("learned.threshold must be in [0, 1]"));
        }
        if learned.epochs == 0 {
            tracing::warn!("Learned detector configured with zero epochs; scores are untrained");
        }

        let persistence = &self.persistence;
        if persistence.medium_occurrences < 2
            || persistence.high_occurrences <= persistence.medium_occurrences
        {
            return Err(EngineError::config(
                "persistence thresholds must satisfy 2 <= medium < high",
            ));
        }

        Ok(())
    }

    /// Set environment
    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        self.environment = env.into();
        self
    }

    /// Set slice window
    pub fn with_window(mut self, window: SliceWindow) -> Self {
        self.graph.window = window;
        self
    }

    /// Enable or disable the learned detector
    pub fn with_learned(mut self, enabled: bool) -> Self {
        self.learned.enabled = enabled;
        self
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| EngineError::ConfigError(format!("Invalid {}={}: {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::development().validate().is_ok());
        assert!(EngineConfig::production().validate().is_ok());
    }

    #[test]
    fn test_cluster_threshold_shrinks_with_size() {
        let clusters = ClusterConfig::default();
        assert_eq!(clusters.threshold_for(4), 0.8);
        assert_eq!(clusters.threshold_for(9), 0.8);
        assert_eq!(clusters.threshold_for(10), 0.5);
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml(
            r#"
            environment = "staging"

            [graph]
            window = "quarter"

            [learned]
            epochs = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.environment, "staging");
        assert_eq!(config.graph.window, SliceWindow::Quarter);
        assert_eq!(config.learned.epochs, 25);
        assert_eq!(config.learned.hidden_dim, 16, "unset keys keep defaults");
        assert_eq!(config.wash, WashConfig::default());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let config = EngineConfig::production().with_window(SliceWindow::All);
        config.to_file(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("LEDGERLENS_ENV", "production"),
            ("LEDGERLENS_WINDOW", "quarter"),
            ("LEDGERLENS_EPOCHS", "12"),
            ("LEDGERLENS_PARALLEL", "false"),
            ("LEDGERLENS_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let config =
            EngineConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.environment, "production");
        assert_eq!(config.graph.window, SliceWindow::Quarter);
        assert_eq!(config.learned.epochs, 12);
        assert!(!config.runtime.parallel_slices);
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = EngineConfig::from_lookup(|key| {
            (key == "LEDGERLENS_EPOCHS").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::ConfigError(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.persistence.high_occurrences = 2;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.cycles.min_length = 7;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.learned.learning_rate = 0.0;
        assert!(config.validate().is_err());
    }
}
