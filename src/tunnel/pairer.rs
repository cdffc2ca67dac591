use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace, warn};

use crate::config::PairerConfig;
use crate::error::TunnelError;
use crate::http::{HeaderRewriter, sniff_request_line};
use crate::tunnel::event::{PairerEvent, PairerState, RemoteInfo};
use crate::tunnel::local::{self, LocalStream};
use crate::tunnel::socket::{enable_keepalive, is_alive};
use crate::tunnel::splice::splice;

/// Delay between local connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How much of a waiting relay chunk is inspected for a request line.
const PEEK_SIZE: usize = 2048;

/// Pairs one relay connection with one local connection.
///
/// Created in [`PairerState::Idle`]; [`open`](Self::open) starts the
/// pairing on the current tokio runtime. Notifications arrive on the
/// receiver returned by [`new`](Self::new), which closes once the pairing
/// is over.
///
/// The pairing lives only as long as its pairer: dropping the pairer aborts
/// the task and closes both sockets.
pub struct ConnectionPairer {
    config: Arc<PairerConfig>,
    /// Wait between local connection attempts after a refused or reset connect.
    retry_delay: Duration,
    state: watch::Receiver<PairerState>,
    /// Channel ends handed to the task; taken by the first `open`.
    start: Option<(mpsc::UnboundedSender<PairerEvent>, watch::Sender<PairerState>)>,
    /// Set once the task is spawned.
    task: Option<AbortHandle>,
}

impl ConnectionPairer {
    /// Creates an idle pairer for `config` and the receiver its
    /// notifications are delivered on. Nothing connects until
    /// [`open`](Self::open).
    pub fn new(config: PairerConfig) -> (Self, mpsc::UnboundedReceiver<PairerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PairerState::Idle);

        let pairer = Self {
            config: Arc::new(config),
            retry_delay: DEFAULT_RETRY_DELAY,
            state: state_rx,
            start: Some((events_tx, state_tx)),
            task: None,
        };
        (pairer, events_rx)
    }

    /// Overrides [`DEFAULT_RETRY_DELAY`]. Has no effect once opened.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Current state of the pairing.
    pub fn state(&self) -> PairerState {
        *self.state.borrow()
    }

    /// Starts the pairing. Returns `None` if it was already started.
    ///
    /// The returned handle only observes the task; it is still aborted when
    /// the pairer is dropped.
    pub fn open(&mut self) -> Option<JoinHandle<()>> {
        let (events, state) = self.start.take()?;

        let pairing = Pairing {
            config: self.config.clone(),
            retry_delay: self.retry_delay,
            events,
            state,
            pending_scanned: false,
            terminated: false,
        };
        let handle = tokio::spawn(pairing.run());
        self.task = Some(handle.abort_handle());
        Some(handle)
    }
}

impl Drop for ConnectionPairer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Internal stages. Each carries the sockets it owns, so leaving a stage
/// drops whatever it no longer needs.
enum Stage {
    RemoteConnecting,
    RemoteOpen(TcpStream),
    LocalConnecting { remote: TcpStream, attempt: u32 },
    Spliced { remote: TcpStream, local: Box<dyn LocalStream> },
    Closed,
}

impl Stage {
    fn state(&self) -> PairerState {
        match self {
            Stage::RemoteConnecting => PairerState::RemoteConnecting,
            Stage::RemoteOpen(_) => PairerState::RemoteOpen,
            Stage::LocalConnecting { .. } => PairerState::LocalConnecting,
            Stage::Spliced { .. } => PairerState::Spliced,
            Stage::Closed => PairerState::Closed,
        }
    }
}

/// The running side of a [`ConnectionPairer`], owned by its task.
struct Pairing {
    config: Arc<PairerConfig>,
    retry_delay: Duration,
    events: mpsc::UnboundedSender<PairerEvent>,
    state: watch::Sender<PairerState>,
    /// The chunk waiting on the relay socket has already been inspected.
    pending_scanned: bool,
    /// A terminal event was sent.
    terminated: bool,
}

impl Pairing {
    async fn run(mut self) {
        let (remote_host, remote_port) = self.config.remote_addr();
        let (local_host, local_port) = self.config.local_addr();
        debug!(
            "Establishing tunnel {}://{}:{} <> {}:{}",
            self.config.local_scheme(),
            local_host,
            local_port,
            remote_host,
            remote_port
        );

        let mut stage = Stage::RemoteConnecting;
        loop {
            let state = stage.state();
            trace!(%state, "Pairer state");
            self.state.send_replace(state);

            stage = match stage {
                Stage::RemoteConnecting => self.connect_remote().await,
                Stage::RemoteOpen(remote) => self.remote_open(remote),
                Stage::LocalConnecting { remote, attempt } => {
                    self.connect_local(remote, attempt).await
                }
                Stage::Spliced { remote, local } => self.run_splice(remote, local).await,
                Stage::Closed => break,
            };
        }
    }

    async fn connect_remote(&mut self) -> Stage {
        let (host, port) = self.config.remote_addr();
        let addr = format!("{}:{}", host, port);

        match TcpStream::connect((host, port)).await {
            Ok(remote) => {
                enable_keepalive(&remote);
                Stage::RemoteOpen(remote)
            }
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                debug!(remote = %addr, "Relay refused connection");
                self.terminate(PairerEvent::Error(TunnelError::RemoteRefused { addr }));
                Stage::Closed
            }
            Err(source) => {
                let err = TunnelError::RemoteConnect { addr, source };
                debug!(error = %err, "Relay connection failed");
                self.terminate(PairerEvent::Dead);
                Stage::Closed
            }
        }
    }

    fn remote_open(&mut self, remote: TcpStream) -> Stage {
        match (remote.local_addr(), remote.peer_addr()) {
            (Ok(local_addr), Ok(peer_addr)) => {
                self.emit(PairerEvent::Open(RemoteInfo { local_addr, peer_addr }));
                Stage::LocalConnecting { remote, attempt: 1 }
            }
            // Reset between connect and here.
            _ => {
                debug!("Relay connection lost before open");
                self.terminate(PairerEvent::Dead);
                Stage::Closed
            }
        }
    }

    async fn connect_local(&mut self, remote: TcpStream, attempt: u32) -> Stage {
        if !is_alive(&remote).await {
            debug!("Relay closed before local connect");
            self.terminate(PairerEvent::Dead);
            return Stage::Closed;
        }

        let (host, port) = self.config.local_addr();
        debug!(
            attempt,
            "Connecting locally to {}://{}:{}",
            self.config.local_scheme(),
            host,
            port
        );

        // The relay socket is not read from here on until the splice exists;
        // it is only watched for closure.
        let connected = tokio::select! {
            res = local::connect(&self.config) => Some(res),
            _ = watch_remote(&remote, &mut self.pending_scanned, &self.events) => None,
        };

        match connected {
            None => {
                debug!("Relay closed while connecting locally");
                self.terminate(PairerEvent::Dead);
                Stage::Closed
            }
            Some(Ok(local)) => {
                if !is_alive(&remote).await {
                    debug!("Relay closed before splice");
                    self.terminate(PairerEvent::Dead);
                    return Stage::Closed;
                }
                debug!("Connected locally");
                Stage::Spliced { remote, local }
            }
            Some(Err(err)) if err.is_retryable() => {
                debug!(error = %err, attempt, "Local connect failed, retrying");
                let closed = tokio::select! {
                    _ = tokio::time::sleep(self.retry_delay) => false,
                    _ = watch_remote(&remote, &mut self.pending_scanned, &self.events) => true,
                };
                if closed {
                    debug!("Relay closed while waiting to retry");
                    self.terminate(PairerEvent::Dead);
                    return Stage::Closed;
                }
                Stage::LocalConnecting { remote, attempt: attempt + 1 }
            }
            Some(Err(err)) => {
                warn!(error = %err, "Local connect failed, closing tunnel");
                drop(remote);
                self.terminate(PairerEvent::Dead);
                Stage::Closed
            }
        }
    }

    async fn run_splice(&mut self, remote: TcpStream, local: Box<dyn LocalStream>) -> Stage {
        let rewriter = self.config.host_override().map(|host| {
            let rewriter = HeaderRewriter::new(host);
            debug!(host = rewriter.target_host(), "Transforming Host header");
            rewriter
        });

        let events = &self.events;
        let mut skip_scan = self.pending_scanned;
        let inspect = |chunk: &[u8]| {
            if std::mem::take(&mut skip_scan) {
                return;
            }
            if let Some(line) = sniff_request_line(chunk) {
                let _ = events.send(PairerEvent::Request(line));
            }
        };

        match splice(remote, local, rewriter, inspect).await {
            Ok(stats) => debug!(
                to_local = stats.to_local,
                to_remote = stats.to_remote,
                "Tunnel closed"
            ),
            Err(e) => debug!(error = %e, "Tunnel closed with error"),
        }

        self.terminate(PairerEvent::Dead);
        Stage::Closed
    }

    fn emit(&self, event: PairerEvent) {
        // Nobody listening is not an error; the pairing runs to completion.
        let _ = self.events.send(event);
    }

    /// Sends the single terminal notification of this pairing.
    fn terminate(&mut self, event: PairerEvent) {
        debug_assert!(event.is_terminal());
        if std::mem::replace(&mut self.terminated, true) {
            return;
        }
        self.emit(event);
    }
}

/// Resolves once the relay socket is closed, without consuming any bytes.
///
/// The first chunk found waiting is inspected for a request line once;
/// after that the pending bytes are left for the splice.
async fn watch_remote(
    remote: &TcpStream,
    scanned: &mut bool,
    events: &mpsc::UnboundedSender<PairerEvent>,
) {
    let mut buf = [0u8; PEEK_SIZE];
    match remote.peek(&mut buf).await {
        Ok(0) | Err(_) => {}
        Ok(n) => {
            if !std::mem::replace(scanned, true) {
                if let Some(line) = sniff_request_line(&buf[..n]) {
                    let _ = events.send(PairerEvent::Request(line));
                }
            }
            std::future::pending::<()>().await;
        }
    }
}
