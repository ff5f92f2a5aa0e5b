//! Error types for the syncrepl probe

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while building the probe configuration.
///
/// All of these are reported as UNKNOWN and never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required option: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {option}: {reason}")]
    InvalidValue { option: &'static str, reason: String },

    #[error("Unknown encryption method: {0} (expected none, simple_tls or start_tls)")]
    UnknownEncryption(String),

    #[error("Unknown output format: {0} (expected text or json)")]
    UnknownOutput(String),

    #[error("Client certificate {0:?} given without a private key")]
    ClientKeyMissing(PathBuf),

    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors raised while fetching the CSN set of a single host.
///
/// Any of these aborts the whole run; they are never treated as divergence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("bind failed: {0}")]
    Auth(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("no contextCSN values returned for {0}")]
    EmptyCsnSet(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Connect(_) => "connect",
            FetchError::Auth(_) => "auth",
            FetchError::Tls(_) => "tls",
            FetchError::Search(_) => "search",
            FetchError::EmptyCsnSet(_) => "empty",
        }
    }
}
