//! Syncrepl Core Library
//!
//! Types, configuration and the convergence checker used to verify that
//! a set of directory servers agree on their replication `contextCSN`.

pub mod checker;
pub mod config;
pub mod error;
pub mod report;
pub mod types;

pub use checker::{CheckerConfig, ConvergenceChecker, DirectoryClient};
pub use config::{ConnectionConfig, EncryptionMode, OutputFormat, ProbeConfig, ProbeOptions};
pub use error::{ConfigError, FetchError, Result};
pub use report::{Report, Status};
pub use types::{CsnSet, DivergentPair, Host, Verdict};

/// Probe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default LDAP port
pub const DEFAULT_PORT: u16 = 389;

/// Default connect/operation timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Attribute holding the replication change sequence numbers
pub const CONTEXT_CSN_ATTR: &str = "contextCSN";
