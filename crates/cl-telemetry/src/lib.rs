//! # cl-telemetry
//!
//! Logging for the cl-memory workspace. Library crates only emit `tracing`
//! records; binaries and test harnesses call [`init_logging`] once.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cl_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     init_logging(&TelemetryConfig::from_env()).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CLMEM_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `CLMEM_JSON_LOGS` | `false` | JSON formatted records |
//! | `CLMEM_CONSOLE_OUTPUT` | `true` | Write records to stdout |
//! | `CLMEM_SERVICE_NAME` | `cl-memory` | Name in the startup record |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging from the environment.
pub fn init_from_env() -> Result<TelemetryConfig, TelemetryError> {
    let config = TelemetryConfig::from_env();
    init_logging(&config)?;
    Ok(config)
}
