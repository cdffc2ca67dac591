use std::fmt;
use std::net::SocketAddr;

use crate::error::TunnelError;
use crate::http::RequestLine;

/// Addresses of a connected relay socket, for observation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Our end of the relay connection.
    pub local_addr: SocketAddr,
    /// The relay's end.
    pub peer_addr: SocketAddr,
}

/// Notifications a pairer sends to whoever created it.
///
/// `Dead` and `Error` are both terminal and mutually exclusive: a pairing
/// reports exactly one of them, after which its event channel closes.
#[derive(Debug)]
pub enum PairerEvent {
    /// The relay connection is up.
    Open(RemoteInfo),
    /// A chunk from the relay started with an HTTP request line.
    Request(RequestLine),
    /// Either socket ended. The pairing may be replaced.
    Dead,
    /// The relay refused the connection. The pairing should not be replaced.
    Error(TunnelError),
}

impl PairerEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PairerEvent::Dead | PairerEvent::Error(_))
    }
}

/// Lifecycle of a pairer, as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairerState {
    /// Created, not opened yet.
    Idle,
    RemoteConnecting,
    RemoteOpen,
    /// Relay is up and paused while the local side is dialed.
    LocalConnecting,
    Spliced,
    /// Terminal.
    Closed,
}

impl fmt::Display for PairerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PairerState::Idle => "idle",
            PairerState::RemoteConnecting => "remote-connecting",
            PairerState::RemoteOpen => "remote-open",
            PairerState::LocalConnecting => "local-connecting",
            PairerState::Spliced => "spliced",
            PairerState::Closed => "closed",
        };
        f.write_str(name)
    }
}
