//! Keeps a fixed number of pairings alive for a static assignment.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::TunnelError;
use crate::tunnel::{ConnectionPairer, PairerEvent};

/// How a single pairing ended.
#[derive(Debug)]
pub enum Termination {
    /// Either socket closed; `opened` tells whether the relay ever accepted.
    Dead { opened: bool },
    /// The relay refused; the whole tunnel stops.
    Failed(TunnelError),
}

/// Runs `max_connections` pairings until one of them fails.
///
/// Dropping the returned future tears every pairing down.
pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let (remote_host, remote_port) = cfg.tunnel.remote_addr();
    info!(
        remote = %format!("{}:{}", remote_host, remote_port),
        connections = cfg.max_connections,
        "Starting tunnel"
    );

    let mut pairings = JoinSet::new();
    for slot in 0..cfg.max_connections {
        spawn_pairing(&mut pairings, cfg, slot, Duration::ZERO);
    }

    while let Some(joined) = pairings.join_next().await {
        let (slot, termination) = joined?;

        match termination {
            Termination::Dead { opened } => {
                debug!(slot, opened, "Pairing ended, replacing");
                // Back off when the relay never accepted, so an unreachable
                // relay is not dialed in a tight loop.
                let delay = if opened { Duration::ZERO } else { cfg.retry_delay() };
                spawn_pairing(&mut pairings, cfg, slot, delay);
            }
            Termination::Failed(e) => {
                error!(slot, error = %e, "Tunnel failed");
                pairings.shutdown().await;
                return Err(e.into());
            }
        }
    }

    Ok(())
}

fn spawn_pairing(
    pairings: &mut JoinSet<(usize, Termination)>,
    cfg: &Config,
    slot: usize,
    delay: Duration,
) {
    let config = cfg.tunnel.clone();
    let retry_delay = cfg.retry_delay();

    pairings.spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (pairer, events) = ConnectionPairer::new(config);
        let mut pairer = pairer.with_retry_delay(retry_delay);
        pairer.open();

        // The pairer is held until its events end; aborting this task drops
        // it and with it the pairing.
        let termination = watch_pairing(slot, events).await;
        drop(pairer);
        (slot, termination)
    });
}

/// Logs a pairing's notifications until it terminates.
pub async fn watch_pairing(
    slot: usize,
    mut events: mpsc::UnboundedReceiver<PairerEvent>,
) -> Termination {
    let mut opened = false;

    while let Some(event) = events.recv().await {
        match event {
            PairerEvent::Open(remote) => {
                opened = true;
                info!(slot, relay = %remote.peer_addr, "Tunnel open");
            }
            PairerEvent::Request(line) => {
                info!(method = %line.method, path = %line.path, "Request");
            }
            PairerEvent::Dead => return Termination::Dead { opened },
            PairerEvent::Error(e) => return Termination::Failed(e),
        }
    }

    // Channel closed without a terminal event: the pairing task went away.
    Termination::Dead { opened }
}
