use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while establishing either side of a pairing.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("connection refused: {addr} (check your firewall settings)")]
    RemoteRefused { addr: String },

    #[error("failed to connect to relay {addr}: {source}")]
    RemoteConnect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to local service {addr}: {source}")]
    LocalConnect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read TLS material {}: {source}", path.display())]
    TlsMaterial {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TLS material: {0}")]
    InvalidTlsMaterial(String),

    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),
}

impl TunnelError {
    /// Local failures worth retrying: the service is not up yet, or dropped
    /// the connection while starting.
    pub fn is_retryable(&self) -> bool {
        match self {
            TunnelError::LocalConnect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }
}
