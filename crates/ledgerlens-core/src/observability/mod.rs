//! Observability
//!
//! Structured logging setup shared by the library crates and the CLI.

pub mod logging;

pub use logging::{LogConfig, LogLevel, LogOutput};
