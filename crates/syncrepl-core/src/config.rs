//! Configuration for the syncrepl probe
//!
//! Options arrive from three layers, lowest precedence first: an optional
//! TOML file, environment variables, and command-line flags. Each layer is
//! a [`ProbeOptions`] with every field optional; the layers are merged and
//! then validated once into an immutable [`ProbeConfig`].
//!
//! Example file:
//! ```toml
//! hosts = ["ldap1.example.com", "ldap2.example.com"]
//! base = "dc=example,dc=com"
//! user = "cn=monitor,dc=example,dc=com"
//! password = "secret"
//! encryption = "start_tls"
//! ca_certificate = "/etc/ssl/certs/ldap-ca.pem"
//! retries = 3
//! retry_delay_secs = 5
//! ```

use crate::error::{ConfigError, Result};
use crate::types::Host;
use crate::{DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Encryption
// ============================================================================

/// How the LDAP connection is protected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionMode {
    /// Plain LDAP
    None,
    /// LDAPS: TLS from the first byte
    SimpleTls,
    /// LDAP upgraded with the StartTLS extended operation
    StartTls,
}

impl EncryptionMode {
    /// Pick the effective mode and whether the peer certificate is verified.
    ///
    /// `--insecure` alone turns encryption off. Any other combination
    /// encrypts (LDAPS unless told otherwise); `--insecure` then only
    /// disables certificate verification.
    pub fn resolve(explicit: Option<EncryptionMode>, insecure: bool) -> (EncryptionMode, bool) {
        match explicit {
            Some(EncryptionMode::None) => (EncryptionMode::None, false),
            None if insecure => (EncryptionMode::None, false),
            Some(mode) => (mode, !insecure),
            None => (EncryptionMode::SimpleTls, true),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        !matches!(self, EncryptionMode::None)
    }

    pub fn url_scheme(&self) -> &'static str {
        match self {
            EncryptionMode::SimpleTls => "ldaps",
            EncryptionMode::None | EncryptionMode::StartTls => "ldap",
        }
    }
}

impl FromStr for EncryptionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(EncryptionMode::None),
            "simple_tls" => Ok(EncryptionMode::SimpleTls),
            "start_tls" => Ok(EncryptionMode::StartTls),
            _ => Err(ConfigError::UnknownEncryption(s.to_string())),
        }
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EncryptionMode::None => "none",
            EncryptionMode::SimpleTls => "simple_tls",
            EncryptionMode::StartTls => "start_tls",
        })
    }
}

// ============================================================================
// Output
// ============================================================================

/// Rendering of the final status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Single monitoring status line
    #[default]
    Text,
    /// JSON document
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::UnknownOutput(s.to_string())),
        }
    }
}

// ============================================================================
// Validated configuration
// ============================================================================

/// Everything needed to open and bind a connection to one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub port: u16,
    /// Bind DN; `None` means an anonymous bind
    pub user: Option<String>,
    pub password: Option<String>,
    pub encryption: EncryptionMode,
    /// Verify the server certificate (off in insecure mode)
    pub verify_peer: bool,
    pub ca_certificate: Option<PathBuf>,
    pub client_certificate: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    /// Connect and per-operation timeout
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let (encryption, verify_peer) = EncryptionMode::resolve(None, false);
        Self {
            port: DEFAULT_PORT,
            user: None,
            password: None,
            encryption,
            verify_peer,
            ca_certificate: None,
            client_certificate: None,
            client_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ConnectionConfig {
    /// Whether a rustls configuration has to be built by hand instead of
    /// relying on the LDAP library's defaults
    pub fn needs_custom_tls(&self) -> bool {
        self.encryption.is_encrypted()
            && (self.ca_certificate.is_some() || self.client_certificate.is_some())
    }
}

/// Validated, immutable probe configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Hosts in configuration order
    pub hosts: Vec<Host>,
    /// Naming context whose contextCSN is compared
    pub base: String,
    pub connection: ConnectionConfig,
    pub retries: u32,
    pub retry_delay: Duration,
    pub output: OutputFormat,
}

// ============================================================================
// Raw options
// ============================================================================

/// One layer of unvalidated options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeOptions {
    pub hosts: Option<Vec<String>>,
    pub base: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub insecure: Option<bool>,
    pub encryption: Option<String>,
    pub ca_certificate: Option<PathBuf>,
    pub certificate: Option<PathBuf>,
    pub certificate_key: Option<PathBuf>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub output: Option<String>,
}

impl ProbeOptions {
    /// Load options from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn merge(self, other: ProbeOptions) -> Self {
        Self {
            hosts: other.hosts.or(self.hosts),
            base: other.base.or(self.base),
            port: other.port.or(self.port),
            user: other.user.or(self.user),
            password: other.password.or(self.password),
            insecure: other.insecure.or(self.insecure),
            encryption: other.encryption.or(self.encryption),
            ca_certificate: other.ca_certificate.or(self.ca_certificate),
            certificate: other.certificate.or(self.certificate),
            certificate_key: other.certificate_key.or(self.certificate_key),
            retries: other.retries.or(self.retries),
            retry_delay_secs: other.retry_delay_secs.or(self.retry_delay_secs),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            output: other.output.or(self.output),
        }
    }

    /// Validate and convert into a [`ProbeConfig`]
    pub fn validate(self) -> Result<ProbeConfig> {
        let hosts: Vec<Host> = self
            .hosts
            .unwrap_or_default()
            .iter()
            .flat_map(|entry| Host::parse_list(entry))
            .collect();
        if hosts.is_empty() {
            return Err(ConfigError::Missing("hosts"));
        }

        let base = self
            .base
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .ok_or(ConfigError::Missing("base"))?;

        let port = self.port.unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                option: "port",
                reason: "must be between 1 and 65535".into(),
            });
        }

        let user = self.user.filter(|u| !u.is_empty());
        if user.is_some() && self.password.is_none() {
            return Err(ConfigError::Missing("password"));
        }

        let explicit = self
            .encryption
            .as_deref()
            .map(EncryptionMode::from_str)
            .transpose()?;
        let (encryption, verify_peer) =
            EncryptionMode::resolve(explicit, self.insecure.unwrap_or(false));

        if let Some(cert) = &self.certificate {
            if self.certificate_key.is_none() {
                return Err(ConfigError::ClientKeyMissing(cert.clone()));
            }
        }

        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                option: "timeout",
                reason: "must be at least one second".into(),
            });
        }

        let output = self
            .output
            .as_deref()
            .map(OutputFormat::from_str)
            .transpose()?
            .unwrap_or_default();

        Ok(ProbeConfig {
            hosts,
            base,
            connection: ConnectionConfig {
                port,
                password: user.as_ref().and(self.password),
                user,
                encryption,
                verify_peer,
                ca_certificate: self.ca_certificate,
                client_certificate: self.certificate,
                client_key: self.certificate_key,
                timeout: Duration::from_secs(timeout_secs),
            },
            retries: self.retries.unwrap_or(0),
            retry_delay: Duration::from_secs(self.retry_delay_secs.unwrap_or(0)),
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal() -> ProbeOptions {
        ProbeOptions {
            hosts: Some(vec!["ldap1,ldap2".to_string()]),
            base: Some("dc=example,dc=com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_encryption_resolution() {
        use EncryptionMode as E;

        assert_eq!(E::resolve(None, false), (E::SimpleTls, true));
        assert_eq!(E::resolve(None, true), (E::None, false));
        assert_eq!(E::resolve(Some(E::None), false), (E::None, false));
        assert_eq!(E::resolve(Some(E::StartTls), false), (E::StartTls, true));
        assert_eq!(E::resolve(Some(E::StartTls), true), (E::StartTls, false));
        assert_eq!(E::resolve(Some(E::SimpleTls), true), (E::SimpleTls, false));
    }

    #[test]
    fn test_encryption_parsing() {
        assert_eq!("start_tls".parse::<EncryptionMode>().unwrap(), EncryptionMode::StartTls);
        assert_eq!("SIMPLE_TLS".parse::<EncryptionMode>().unwrap(), EncryptionMode::SimpleTls);
        assert!(matches!(
            "ssl".parse::<EncryptionMode>(),
            Err(ConfigError::UnknownEncryption(_))
        ));
    }

    #[test]
    fn test_validate_defaults() {
        let config = minimal().validate().unwrap();

        assert_eq!(config.hosts, vec![Host::from("ldap1"), Host::from("ldap2")]);
        assert_eq!(config.base, "dc=example,dc=com");
        assert_eq!(config.retries, 0);
        assert_eq!(config.retry_delay, Duration::ZERO);
        assert_eq!(config.output, OutputFormat::Text);
        assert_eq!(config.connection, ConnectionConfig::default());
        assert_eq!(config.connection.port, 389);
        assert_eq!(config.connection.encryption, EncryptionMode::SimpleTls);
        assert!(config.connection.verify_peer);
        assert!(config.connection.user.is_none());
    }

    #[test]
    fn test_validate_missing_required() {
        let mut options = minimal();
        options.hosts = None;
        assert!(matches!(options.validate(), Err(ConfigError::Missing("hosts"))));

        let mut options = minimal();
        options.base = Some("  ".to_string());
        assert!(matches!(options.validate(), Err(ConfigError::Missing("base"))));

        let mut options = minimal();
        options.user = Some("cn=monitor".to_string());
        assert!(matches!(options.validate(), Err(ConfigError::Missing("password"))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut options = minimal();
        options.encryption = Some("tls".to_string());
        assert!(matches!(options.validate(), Err(ConfigError::UnknownEncryption(_))));

        let mut options = minimal();
        options.timeout_secs = Some(0);
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidValue { option: "timeout", .. })
        ));

        let mut options = minimal();
        options.certificate = Some(PathBuf::from("/etc/ssl/client.pem"));
        assert!(matches!(options.validate(), Err(ConfigError::ClientKeyMissing(_))));
    }

    #[test]
    fn test_password_dropped_without_user() {
        let mut options = minimal();
        options.password = Some("secret".to_string());

        let config = options.validate().unwrap();
        assert!(config.connection.password.is_none());
    }

    #[test]
    fn test_merge_prefers_later_layer() {
        let file = ProbeOptions {
            port: Some(636),
            retries: Some(2),
            encryption: Some("simple_tls".to_string()),
            ..minimal()
        };
        let cli = ProbeOptions {
            retries: Some(5),
            hosts: Some(vec!["a".to_string(), "b".to_string()]),
            ..Default::default()
        };

        let merged = file.merge(cli);
        assert_eq!(merged.port, Some(636));
        assert_eq!(merged.retries, Some(5));
        assert_eq!(merged.hosts, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(merged.base.as_deref(), Some("dc=example,dc=com"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
hosts = ["ldap1.example.com", "ldap2.example.com"]
base = "dc=example,dc=com"
encryption = "start_tls"
retries = 3
retry_delay_secs = 5
"#
        )
        .unwrap();

        let config = ProbeOptions::from_file(file.path()).unwrap().validate().unwrap();
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.connection.encryption, EncryptionMode::StartTls);
        assert_eq!(config.retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hostz = [\"a\"]").unwrap();

        assert!(matches!(
            ProbeOptions::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_needs_custom_tls() {
        let mut conn = ConnectionConfig::default();
        assert!(!conn.needs_custom_tls());

        conn.ca_certificate = Some(PathBuf::from("/etc/ssl/ca.pem"));
        assert!(conn.needs_custom_tls());

        conn.encryption = EncryptionMode::None;
        assert!(!conn.needs_custom_tls());
    }
}
