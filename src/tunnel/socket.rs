use socket2::SockRef;
use tokio::net::TcpStream;

/// Turns on TCP keep-alive. Failure is logged and otherwise ignored.
pub(crate) fn enable_keepalive(stream: &TcpStream) {
    if let Err(e) = SockRef::from(stream).set_keepalive(true) {
        tracing::debug!(error = %e, "Failed to enable keep-alive");
    }
}

/// Non-blocking liveness probe. Pending bytes or no news both count as
/// alive; end-of-stream or a socket error means the peer is gone.
pub(crate) async fn is_alive(stream: &TcpStream) -> bool {
    let mut probe = [0u8; 1];
    tokio::select! {
        biased;
        res = stream.peek(&mut probe) => matches!(res, Ok(n) if n > 0),
        _ = std::future::ready(()) => true,
    }
}
