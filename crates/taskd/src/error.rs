use thiserror::Error;

/// Fatal startup failures. `main` logs these via `tracing::error!` and
/// exits non-zero (§6 "Process contract", §7 "Fatal errors") — nothing in
/// this enum is recoverable at runtime.
#[derive(Debug, Error)]
pub enum TaskdError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install signal handler: {0}")]
    SignalSetup(#[source] std::io::Error),

    #[error("CPU calibration failed: {0}")]
    Calibration(#[from] taskd_executor::CalibrationError),
}
