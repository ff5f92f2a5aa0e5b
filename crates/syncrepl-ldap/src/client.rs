//! LDAP directory client
//!
//! Opens one connection per fetch, binds, reads the `contextCSN` of the
//! base entry with a base-scope search and unbinds again.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, ResultEntry, Scope, SearchEntry};
use rustls::ClientConfig;
use std::io;
use std::sync::Arc;
use syncrepl_core::{
    ConnectionConfig, CsnSet, DirectoryClient, EncryptionMode, FetchError, Host, CONTEXT_CSN_ATTR,
};
use tracing::{debug, warn};

/// RC 49 = Invalid credentials
const RC_INVALID_CREDENTIALS: u32 = 49;
/// RC 32 = No such object
const RC_NO_SUCH_OBJECT: u32 = 32;

/// [`DirectoryClient`] backed by `ldap3`
pub struct LdapDirectoryClient {
    config: ConnectionConfig,
    tls_config: Option<Arc<ClientConfig>>,
}

impl LdapDirectoryClient {
    /// Create a new client. Certificate files are read here, once, so a
    /// bad path fails before any host is contacted.
    pub fn new(config: ConnectionConfig) -> Result<Self, FetchError> {
        let tls_config = crate::tls::build_client_config(&config)?;
        Ok(Self { config, tls_config })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn settings(&self) -> LdapConnSettings {
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.timeout)
            .set_starttls(self.config.encryption == EncryptionMode::StartTls)
            .set_no_tls_verify(!self.config.verify_peer);

        if let Some(tls) = &self.tls_config {
            settings = settings.set_config(tls.clone());
        }

        settings
    }

    /// Create LDAP connection with proper TLS settings
    async fn create_connection(&self, host: &Host) -> Result<(LdapConnAsync, Ldap), FetchError> {
        let url = ldap_url(host, &self.config);
        debug!("Connecting to LDAP server: {}", url);

        LdapConnAsync::with_settings(self.settings(), &url)
            .await
            .map_err(|e| self.connect_error(e))
    }

    async fn bind(&self, ldap: &mut Ldap) -> Result<(), FetchError> {
        let (dn, password) = match (&self.config.user, &self.config.password) {
            (Some(user), Some(password)) => (user.as_str(), password.as_str()),
            (Some(user), None) => (user.as_str(), ""),
            _ => ("", ""),
        };

        let result = ldap
            .with_timeout(self.config.timeout)
            .simple_bind(dn, password)
            .await
            .map_err(|e| self.connect_error(e))?;

        match result.rc {
            0 => Ok(()),
            RC_INVALID_CREDENTIALS => Err(FetchError::Auth(format!(
                "invalid credentials (rc={})",
                result.rc
            ))),
            rc => Err(FetchError::Auth(format!("rc={} {}", rc, result.text).trim().to_string())),
        }
    }

    async fn search_csns(&self, ldap: &mut Ldap, base: &str) -> Result<CsnSet, FetchError> {
        let (entries, _res) = ldap
            .with_timeout(self.config.timeout)
            .search(base, Scope::Base, "(objectClass=*)", vec![CONTEXT_CSN_ATTR])
            .await
            .map_err(|e| self.connect_error(e))?
            .success()
            .map_err(|e| match e {
                LdapError::LdapResult { result } if result.rc == RC_NO_SUCH_OBJECT => {
                    FetchError::Search(format!("no such object: {}", base))
                }
                e => FetchError::Search(e.to_string()),
            })?;

        debug!("Base search returned {} entries", entries.len());
        Ok(first_csn_set(entries).unwrap_or_default())
    }

    /// Sort a connection level failure into TLS or plain connect errors.
    ///
    /// TLS handshake and certificate failures surface from the transport
    /// as `InvalidData` I/O errors.
    fn connect_error(&self, err: LdapError) -> FetchError {
        if self.config.encryption.is_encrypted() && is_tls_failure(&err) {
            FetchError::Tls(err.to_string())
        } else {
            FetchError::Connect(err.to_string())
        }
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectoryClient {
    async fn fetch_csns(&self, host: &Host, base: &str) -> Result<CsnSet, FetchError> {
        let (conn, mut ldap) = self.create_connection(host).await?;
        ldap3::drive!(conn);

        let result = match self.bind(&mut ldap).await {
            Ok(()) => self.search_csns(&mut ldap, base).await,
            Err(e) => Err(e),
        };

        if let Err(e) = ldap.unbind().await {
            warn!("Unbind from {} failed: {}", host, e);
        }

        result
    }
}

fn is_tls_failure(err: &LdapError) -> bool {
    if let LdapError::Io { source } = err {
        if source.kind() == io::ErrorKind::InvalidData {
            return true;
        }
    }

    let text = err.to_string().to_ascii_lowercase();
    text.contains("certificate") || text.contains("tls") || text.contains("handshake")
}

/// contextCSN values of the first returned entry carrying the attribute
fn first_csn_set(entries: Vec<ResultEntry>) -> Option<CsnSet> {
    entries
        .into_iter()
        .map(SearchEntry::construct)
        .find_map(|entry| {
            entry
                .attrs
                .into_iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(CONTEXT_CSN_ATTR))
                .map(|(_, values)| values.into_iter().collect())
        })
}

/// Connection URL for `host`; IPv6 literals are bracketed
pub fn ldap_url(host: &Host, config: &ConnectionConfig) -> String {
    let name = host.as_str();
    let name = if name.contains(':') && !name.starts_with('[') {
        format!("[{}]", name)
    } else {
        name.to_string()
    };

    format!("{}://{}:{}", config.encryption.url_scheme(), name, config.port)
}
