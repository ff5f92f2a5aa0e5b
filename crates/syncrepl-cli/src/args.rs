//! Command-line arguments
//!
//! Every flag can also come from the environment (`SYNCREPL_*`) or from a
//! TOML file given with `--config`. Flags and environment win over the file.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use syncrepl_core::{OutputFormat, ProbeConfig, ProbeOptions};

#[derive(Parser, Debug)]
#[command(name = "check-syncrepl")]
#[command(version = syncrepl_core::VERSION)]
#[command(about = "Checks that OpenLDAP sync replication is working by comparing the contextCSN of a list of servers", long_about = None)]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Comma separated list of hosts to compare
    #[arg(short = 'h', long, env = "SYNCREPL_HOSTS")]
    pub hosts: Option<String>,

    /// Base to fetch the contextCSN for
    #[arg(short, long, env = "SYNCREPL_BASE")]
    pub base: Option<String>,

    /// Port to connect to OpenLDAP on [default: 389]
    #[arg(short = 't', long, env = "SYNCREPL_PORT")]
    pub port: Option<u16>,

    /// User (bind DN) to bind as; anonymous bind when omitted
    #[arg(short, long, env = "SYNCREPL_USER")]
    pub user: Option<String>,

    /// Password used to bind
    #[arg(short, long, env = "SYNCREPL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Do not use encryption (or, with --encryption, do not verify certificates)
    #[arg(short, long, env = "SYNCREPL_INSECURE")]
    pub insecure: bool,

    /// Encryption method: none, simple_tls or start_tls [default: simple_tls]
    #[arg(short, long, env = "SYNCREPL_ENCRYPTION")]
    pub encryption: Option<String>,

    /// Trusted CA certificate for checking the endpoint validity
    #[arg(long = "ca-certificate", env = "SYNCREPL_CA_CERT")]
    pub ca_certificate: Option<PathBuf>,

    /// Client certificate
    #[arg(long = "certificate", env = "SYNCREPL_CLIENT_CERT")]
    pub certificate: Option<PathBuf>,

    /// Private key of the client certificate
    #[arg(long = "certificate-key", env = "SYNCREPL_CLIENT_KEY")]
    pub certificate_key: Option<PathBuf>,

    /// Number of times to retry (useful for environments with larger number of writes)
    #[arg(short, long, env = "SYNCREPL_RETRIES")]
    pub retries: Option<u32>,

    /// Seconds to wait between retries [default: 0]
    #[arg(long = "retry-delay", env = "SYNCREPL_RETRY_DELAY")]
    pub retry_delay: Option<u64>,

    /// Connect and operation timeout in seconds [default: 10]
    #[arg(long, env = "SYNCREPL_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Configuration file path
    #[arg(short, long, env = "SYNCREPL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format: text or json [default: text]
    #[arg(short, long, env = "SYNCREPL_OUTPUT")]
    pub output: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SYNCREPL_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    #[allow(dead_code)]
    help: Option<bool>,
}

impl Cli {
    /// Options given on the command line or in the environment
    pub fn options(&self) -> ProbeOptions {
        ProbeOptions {
            hosts: self.hosts.clone().map(|h| vec![h]),
            base: self.base.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            insecure: self.insecure.then_some(true),
            encryption: self.encryption.clone(),
            ca_certificate: self.ca_certificate.clone(),
            certificate: self.certificate.clone(),
            certificate_key: self.certificate_key.clone(),
            retries: self.retries,
            retry_delay_secs: self.retry_delay,
            timeout_secs: self.timeout,
            output: self.output.clone(),
        }
    }

    /// Merge the optional config file with the command line and validate
    pub fn resolve(&self) -> Result<ProbeConfig> {
        let file = match &self.config {
            Some(path) => ProbeOptions::from_file(path)?,
            None => ProbeOptions::default(),
        };

        file.merge(self.options())
            .validate()
            .context("Invalid configuration")
    }

    /// Output format to use when the configuration itself is broken
    pub fn fallback_output(&self) -> OutputFormat {
        self.output
            .as_deref()
            .and_then(|o| o.parse().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use syncrepl_core::{EncryptionMode, Host};

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["check-syncrepl"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_short_flags_match_plugin() {
        let cli = parse(&[
            "-h", "ldap1,ldap2", "-b", "dc=example,dc=com", "-t", "636", "-u", "cn=monitor",
            "-p", "secret", "-e", "start_tls", "-r", "3",
        ]);

        let config = cli.resolve().unwrap();
        assert_eq!(config.hosts, vec![Host::from("ldap1"), Host::from("ldap2")]);
        assert_eq!(config.base, "dc=example,dc=com");
        assert_eq!(config.connection.port, 636);
        assert_eq!(config.connection.user.as_deref(), Some("cn=monitor"));
        assert_eq!(config.connection.password.as_deref(), Some("secret"));
        assert_eq!(config.connection.encryption, EncryptionMode::StartTls);
        assert!(config.connection.verify_peer);
        assert_eq!(config.retries, 3);
    }

    #[test]
    fn test_insecure_disables_encryption() {
        let cli = parse(&["-h", "a,b", "-b", "dc=example", "-i"]);

        let config = cli.resolve().unwrap();
        assert_eq!(config.connection.encryption, EncryptionMode::None);
        assert!(!config.connection.verify_peer);
    }

    #[test]
    fn test_missing_hosts_is_config_error() {
        let cli = parse(&["-b", "dc=example"]);

        let err = cli.resolve().unwrap_err();
        assert!(format!("{:#}", err).contains("hosts"));
    }

    #[test]
    fn test_help_is_long_only() {
        let err = Cli::try_parse_from(["check-syncrepl", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);

        let err = Cli::try_parse_from(["check-syncrepl", "-h"]).unwrap_err();
        assert_ne!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
hosts = ["ldap1", "ldap2", "ldap3"]
base = "dc=example,dc=com"
retries = 1
retry_delay_secs = 10
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let cli = parse(&["--config", path, "-r", "4", "-o", "json"]);

        let config = cli.resolve().unwrap();
        assert_eq!(config.hosts.len(), 3);
        assert_eq!(config.retries, 4);
        assert_eq!(config.retry_delay, Duration::from_secs(10));
        assert_eq!(config.output, OutputFormat::Json);
    }

    #[test]
    fn test_fallback_output() {
        assert_eq!(parse(&["-o", "json"]).fallback_output(), OutputFormat::Json);
        assert_eq!(parse(&["-o", "yaml"]).fallback_output(), OutputFormat::Text);
        assert_eq!(parse(&[]).fallback_output(), OutputFormat::Text);
    }
}
