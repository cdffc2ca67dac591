//! Connection pairing.
//!
//! A [`ConnectionPairer`] owns one connection to the relay and, once that is
//! up, one connection to the local service. The two are spliced together
//! until either side goes away, at which point the pairer reports `Dead` and
//! is done. Whoever created it decides whether to make a new one.
//!
//! # State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │       Idle       │ ← constructed, open() not yet called
//!        └────────┬─────────┘
//!                 │ open()
//!                 ▼
//!        ┌──────────────────┐   refused → Error
//!        │ RemoteConnecting │ ─────────────────────┐
//!        └────────┬─────────┘   other   → Dead     │
//!                 │ connected, emit Open           │
//!                 ▼                                │
//!        ┌──────────────────┐                      │
//!        │    RemoteOpen    │                      │
//!        └────────┬─────────┘                      │
//!                 ▼                                │
//!        ┌──────────────────┐ ◄─┐ refused/reset    │
//!        │ LocalConnecting  │ ──┘ after retry delay│
//!        └────────┬─────────┘ ─────────────────────┤ relay closed,
//!                 │ connected                      │ other local error → Dead
//!                 ▼                                │
//!        ┌──────────────────┐                      │
//!        │     Spliced      │ ─────────────────────┤ relay closed → Dead
//!        └──────────────────┘                      │
//!                                                  ▼
//!                                        ┌──────────────────┐
//!                                        │      Closed      │
//!                                        └──────────────────┘
//! ```
//!
//! While local-connecting the relay socket is never read, only peeked, so
//! no relay bytes are taken off the socket before there is somewhere to
//! put them. The first waiting chunk is still inspected for a request line.
//!
//! # Example
//!
//! ```no_run
//! use porthole::config::PairerConfig;
//! use porthole::tunnel::{ConnectionPairer, PairerEvent};
//!
//! # async fn run() {
//! let config = PairerConfig {
//!     remote_host: "relay.example.com".to_string(),
//!     remote_port: 40123,
//!     local_port: 8080,
//!     ..Default::default()
//! };
//!
//! let (mut pairer, mut events) = ConnectionPairer::new(config);
//! pairer.open();
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         PairerEvent::Request(line) => println!("{} {}", line.method, line.path),
//!         PairerEvent::Dead => break,
//!         _ => {}
//!     }
//! }
//! # }
//! ```

pub mod event;
pub mod local;
pub mod pairer;
pub mod splice;
pub mod tls;

mod socket;

pub use event::{PairerEvent, PairerState, RemoteInfo};
pub use pairer::{ConnectionPairer, DEFAULT_RETRY_DELAY};
pub use splice::SpliceStats;
