//! # Offline Common
//!
//! Logging configuration shared by the offline worker crates and the CLI.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LoggingError};
