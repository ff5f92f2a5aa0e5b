//! LDAP access for the syncrepl probe
//!
//! Provides the production [`DirectoryClient`](syncrepl_core::DirectoryClient):
//! - plain LDAP, LDAPS and StartTLS connections
//! - anonymous or simple bind
//! - base-scope read of the `contextCSN` attribute
//! - custom CA / client certificate TLS setup

mod client;
mod tls;

pub use client::{ldap_url, LdapDirectoryClient};
pub use tls::build_client_config;
