//! TLS client configuration for LDAPS / StartTLS
//!
//! Only built when a CA file or a client certificate is configured. In
//! every other case the LDAP library's own rustls defaults are used.

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerName};
use rustls_pemfile::Item;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use syncrepl_core::{ConnectionConfig, FetchError};
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, FetchError>;

/// Build a rustls client configuration for `config`, or `None` when the
/// library defaults are enough
pub fn build_client_config(config: &ConnectionConfig) -> Result<Option<Arc<ClientConfig>>> {
    if !config.needs_custom_tls() {
        return Ok(None);
    }

    let identity = match (&config.client_certificate, &config.client_key) {
        (Some(cert), Some(key)) => Some((load_certs(cert)?, load_private_key(key)?)),
        (Some(cert), None) => {
            return Err(FetchError::Tls(format!(
                "client certificate {:?} has no private key",
                cert
            )))
        }
        _ => None,
    };

    let client_config = if config.verify_peer {
        let roots = match &config.ca_certificate {
            Some(ca) => load_root_store(ca)?,
            None => native_root_store()?,
        };
        let builder = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots);

        match identity {
            Some((certs, key)) => builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| FetchError::Tls(format!("Invalid client certificate: {}", e)))?,
            None => builder.with_no_client_auth(),
        }
    } else {
        warn!("TLS peer verification disabled");
        let builder = ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(NoVerification));

        match identity {
            Some((certs, key)) => builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| FetchError::Tls(format!("Invalid client certificate: {}", e)))?,
            None => builder.with_no_client_auth(),
        }
    };

    Ok(Some(Arc::new(client_config)))
}

/// Accepts any server certificate (insecure mode)
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .map_err(|e| FetchError::Tls(format!("Failed to open {:?}: {}", path, e)))?;
    Ok(BufReader::new(file))
}

/// Load certificates from PEM file
fn load_certs(path: &Path) -> Result<Vec<Certificate>> {
    let mut reader = open(path)?;

    let certs: Vec<Certificate> = rustls_pemfile::certs(&mut reader)
        .map_err(|e| FetchError::Tls(format!("Failed to parse certificates in {:?}: {}", path, e)))?
        .into_iter()
        .map(Certificate)
        .collect();

    if certs.is_empty() {
        return Err(FetchError::Tls(format!("No certificates found in {:?}", path)));
    }

    debug!("Loaded {} certificate(s) from {:?}", certs.len(), path);
    Ok(certs)
}

/// Load the first private key (PKCS#8, RSA or SEC1) from PEM file
fn load_private_key(path: &Path) -> Result<PrivateKey> {
    let mut reader = open(path)?;

    rustls_pemfile::read_all(&mut reader)
        .map_err(|e| FetchError::Tls(format!("Failed to parse private key in {:?}: {}", path, e)))?
        .into_iter()
        .find_map(|item| match item {
            Item::PKCS8Key(key) | Item::RSAKey(key) | Item::ECKey(key) => Some(PrivateKey(key)),
            _ => None,
        })
        .ok_or_else(|| FetchError::Tls(format!("No private key found in {:?}", path)))
}

fn load_root_store(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(&cert)
            .map_err(|e| FetchError::Tls(format!("Failed to add CA cert: {}", e)))?;
    }
    Ok(roots)
}

fn native_root_store() -> Result<RootCertStore> {
    let certs = rustls_native_certs::load_native_certs()
        .map_err(|e| FetchError::Tls(format!("Failed to load system CA certificates: {}", e)))?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) =
        roots.add_parsable_certificates(&certs.into_iter().map(|c| c.0).collect::<Vec<_>>());
    debug!("Loaded {} system CA certificate(s), ignored {}", added, ignored);
    Ok(roots)
}
