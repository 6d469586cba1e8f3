//! Structured Logging
//!
//! Initializes `tracing-subscriber` from a [`LogConfig`]. Pipeline crates
//! log with structured fields (`slice`, `detector`, `run_id`, counts), so
//! the JSON output of [`LogConfig::production`] can be filtered per run.
//!
//! # Example
//!
//! ```rust,ignore
//! use ledgerlens_core::observability::logging::{LogConfig, LogLevel};
//!
//! LogConfig::production()
//!     .with_target_level("ledgerlens_graph", LogLevel::Warn)
//!     .init()?;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-edge and per-cycle detail
    Trace,
    /// Per-detector progress
    Debug,
    /// Run and slice summaries
    #[default]
    Info,
    /// Degraded slices, skipped input
    Warn,
    /// Failed slices
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    /// Directive name understood by `EnvFilter`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let name = if name == "warning" { "warn" } else { name.as_str() };
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == name)
            .ok_or_else(|| format!("unknown log level `{}`", s))
    }
}

/// Log output target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output
    Stdout,
    /// Standard error. Keeps stdout free for reports.
    #[default]
    Stderr,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default log level
    pub level: LogLevel,
    /// Emit one JSON object per event
    pub structured: bool,
    /// Include file and line
    pub include_location: bool,
    /// Include thread ids (useful with parallel slices)
    pub include_thread_ids: bool,
    /// Output target
    pub output: LogOutput,
    /// Per-target log levels (e.g. `ledgerlens_graph`)
    pub target_levels: BTreeMap<String, LogLevel>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            structured: false,
            include_location: false,
            include_thread_ids: false,
            output: LogOutput::Stderr,
            target_levels: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Human-readable debug output with source locations.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            include_location: true,
            ..Default::default()
        }
    }

    /// JSON output at info with thread ids.
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            structured: true,
            include_thread_ids: true,
            ..Default::default()
        }
    }

    /// Set log level for a specific target
    pub fn with_target_level(mut self, target: impl Into<String>, level: LogLevel) -> Self {
        self.target_levels.insert(target.into(), level);
        self
    }

    /// Filter directive string, e.g. `info,ledgerlens_graph=warn`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.to_string();
        for (target, level) in &self.target_levels {
            directives.push_str(&format!(",{}={}", target, level));
        }
        directives
    }

    fn writer(&self) -> tracing_subscriber::fmt::writer::BoxMakeWriter {
        use tracing_subscriber::fmt::writer::BoxMakeWriter;
        match self.output {
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }

    /// Install the global subscriber. `RUST_LOG` takes precedence over the
    /// configured levels. A subscriber installed earlier stays in place.
    pub fn init(&self) -> crate::error::Result<()> {
        use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()));

        let json = self.structured.then(|| {
            fmt::layer()
                .json()
                .with_writer(self.writer())
                .with_thread_ids(self.include_thread_ids)
                .with_file(self.include_location)
                .with_line_number(self.include_location)
        });
        let text = (!self.structured).then(|| {
            fmt::layer()
                .with_writer(self.writer())
                .with_thread_ids(self.include_thread_ids)
                .with_file(self.include_location)
                .with_line_number(self.include_location)
        });

        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(json)
            .with(text)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!(
                directives = %self.directives(),
                structured = self.structured,
                "Logging initialized"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" trace ".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
        assert!(LogLevel::Debug < LogLevel::Error);
        assert_eq!(format!("[{:<5}]", LogLevel::Info), "[info ]");
    }

    #[test]
    fn test_directives() {
        let config = LogConfig::default()
            .with_target_level("ledgerlens_graph", LogLevel::Warn)
            .with_target_level("ledgerlens_compliance", LogLevel::Trace);
        assert_eq!(
            config.directives(),
            "info,ledgerlens_compliance=trace,ledgerlens_graph=warn"
        );
    }

    #[test]
    fn test_config_roundtrip() {
        let config = LogConfig::production().with_target_level("ledgerlens", LogLevel::Debug);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"level\":\"info\""));
        let back: LogConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        LogConfig::development().init().unwrap();
        LogConfig::production().init().unwrap();
    }
}
