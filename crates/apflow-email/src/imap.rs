// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! IMAP sessions over TLS.

use std::sync::Arc;
use std::time::Duration;

use apflow_config::model::ImapConfig;
use apflow_core::ApflowError;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub type ImapSession = async_imap::Session<TlsStream<TcpStream>>;

/// Connection settings for one IMAP account.
#[derive(Clone)]
pub struct ImapSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    password: String,
    pub folder: String,
}

impl std::fmt::Debug for ImapSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("folder", &self.folder)
            .finish()
    }
}

impl ImapSettings {
    pub fn from_config(config: &ImapConfig) -> Result<Self, ApflowError> {
        let required = |value: &Option<String>, key: &str| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| ApflowError::Config(format!("imap.{key} is not configured")))
        };
        Ok(Self {
            host: required(&config.host, "host")?,
            port: config.port,
            username: required(&config.username, "username")?,
            password: required(&config.password, "password")?,
            folder: config.folder.clone(),
        })
    }

    /// Connect, log in, and select the configured folder.
    pub async fn open(&self) -> Result<ImapSession, ApflowError> {
        let tcp = tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| ApflowError::Timeout {
            duration: CONNECT_TIMEOUT,
        })?
        .map_err(|e| imap_error("connect", e))?;

        let server_name = ServerName::try_from(self.host.clone()).map_err(|e| {
            ApflowError::Config(format!("invalid IMAP host `{}`: {e}", self.host))
        })?;
        let tls = tls_connector()
            .connect(server_name, tcp)
            .await
            .map_err(|e| imap_error("TLS handshake", e))?;

        let mut client = async_imap::Client::new(tls);
        let _ = client.read_response().await;

        let mut session = client
            .login(&self.username, &self.password)
            .await
            .map_err(|(e, _)| ApflowError::Dependency {
                dependency: "mail".to_string(),
                message: format!("IMAP login failed: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })?;
        session
            .select(&self.folder)
            .await
            .map_err(|e| imap_error("select", e))?;
        Ok(session)
    }
}

fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Network-level IMAP failures are transient.
pub fn imap_error<E>(operation: &str, e: E) -> ApflowError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ApflowError::Dependency {
        dependency: "mail".to_string(),
        message: format!("IMAP {operation} failed: {e}"),
        transient: true,
        source: Some(Box::new(e)),
    }
}

/// Close a session, logging rather than failing.
pub async fn close(mut session: ImapSession) {
    if let Err(e) = session.logout().await {
        tracing::debug!(error = %e, "IMAP logout failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_require_credentials() {
        let mut config = ImapConfig::default();
        assert!(ImapSettings::from_config(&config).is_err());

        config.host = Some("imap.example.com".to_string());
        config.username = Some("invoices@example.com".to_string());
        config.password = Some("hunter2".to_string());
        let settings = ImapSettings::from_config(&config).unwrap();
        assert_eq!(settings.port, 993);
        assert_eq!(settings.folder, "INBOX");
        assert!(!format!("{settings:?}").contains("hunter2"));
    }
}
