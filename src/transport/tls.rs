//! TLS support
//!
//! Connections to a TCPS listener are wrapped in TLS using rustls. Server
//! verification uses either the platform root store or PEM files supplied by
//! the caller. Oracle wallet containers are not supported; extract the PEM
//! material instead.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::error::{Error, Result};

/// TLS configuration for TCPS connections
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// PEM-encoded CA certificates to trust; when unset, the webpki root
    /// store is used
    pub ca_pem: Option<Vec<u8>>,
}

impl TlsConfig {
    /// Create a TLS configuration trusting the bundled webpki roots
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust the CA certificates in the given PEM bytes instead of the
    /// default root store
    pub fn with_ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_pem = Some(pem.into());
        self
    }

    /// Build the rustls client configuration
    pub fn build_client_config(&self) -> Result<ClientConfig> {
        let mut roots = RootCertStore::empty();
        match &self.ca_pem {
            Some(pem) => {
                let mut reader = std::io::Cursor::new(pem);
                for cert in rustls_pemfile::certs(&mut reader) {
                    let cert = cert.map_err(|e| {
                        Error::InvalidParameter(format!("invalid CA certificate: {}", e))
                    })?;
                    roots.add(cert).map_err(|e| {
                        Error::InvalidParameter(format!("unusable CA certificate: {}", e))
                    })?;
                }
                if roots.is_empty() {
                    return Err(Error::InvalidParameter(
                        "no CA certificates found in PEM data".into(),
                    ));
                }
            }
            None => {
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
        }

        Ok(ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth())
    }

    /// Wrap an established TCP stream in TLS
    pub(crate) async fn wrap(&self, stream: TcpStream, host: &str) -> Result<TlsStream<TcpStream>> {
        let config = self.build_client_config()?;
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| Error::InvalidParameter(format!("invalid TLS server name: {}", host)))?;
        connector
            .connect(server_name, stream)
            .await
            .map_err(Error::Io)
    }
}
