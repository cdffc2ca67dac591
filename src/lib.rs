//! Porthole - expose a local service through a relay
//!
//! Core library for pairing relay connections with local connections.

pub mod config;
pub mod error;
pub mod http;
pub mod supervisor;
pub mod tunnel;
