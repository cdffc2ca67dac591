use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::PairerConfig;
use crate::error::TunnelError;
use crate::tunnel::socket::enable_keepalive;
use crate::tunnel::tls;

/// Byte stream to the local service, plain or TLS.
pub trait LocalStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> LocalStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// One connection attempt to the local service.
pub async fn connect(config: &PairerConfig) -> Result<Box<dyn LocalStream>, TunnelError> {
    let (host, port) = config.local_addr();
    let addr = format!("{}:{}", host, port);

    // Read TLS material before dialing so a bad file never opens a socket.
    let tls = if config.local_https {
        Some((tls::client_config(config).await?, tls::server_name(host)?))
    } else {
        None
    };

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|source| TunnelError::LocalConnect {
            addr: addr.clone(),
            source,
        })?;

    let Some((tls_config, server_name)) = tls else {
        enable_keepalive(&stream);
        return Ok(Box::new(stream));
    };

    let stream = TlsConnector::from(Arc::new(tls_config))
        .connect(server_name, stream)
        .await
        .map_err(|source| TunnelError::LocalConnect { addr, source })?;

    Ok(Box::new(stream))
}
