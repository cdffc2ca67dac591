//! HTTP awareness for the tunnel.
//!
//! The tunnel treats both sockets as opaque byte streams. This module holds
//! the two places where it looks at HTTP anyway:
//!
//! - **`host_rewrite`**: rewrites the first `Host` header flowing from the
//!   relay to the local service, for services that route on virtual hosts
//! - **`request_line`**: sniffs `METHOD path` from the start of a chunk so
//!   the caller can log incoming requests
//!
//! Neither is a parser. A chunk that does not look like HTTP is forwarded
//! untouched, and a header split across two reads is not reassembled:
//!
//! ```text
//!   chunk 1: "GET / HTTP/1.1\r\nHo"
//!   chunk 2: "st: public.example\r\n\r\n"    -> forwarded as-is
//! ```

pub mod host_rewrite;
pub mod request_line;

pub use host_rewrite::HeaderRewriter;
pub use request_line::{RequestLine, sniff_request_line};
