use bytes::{BufMut, Bytes, BytesMut};

const HOST_TAIL: &[u8] = b"ost: ";

/// Rewrites the first `Host` header seen on a connection.
///
/// Matching is done per chunk: a header line split across two chunks is
/// left untouched. Once a header has been replaced every later chunk,
/// including further pipelined requests, passes through unchanged.
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    target_host: String,
    replaced: bool,
}

impl HeaderRewriter {
    /// A rewriter that puts `target_host` into the first `Host` header.
    pub fn new(target_host: impl Into<String>) -> Self {
        Self {
            target_host: target_host.into(),
            replaced: false,
        }
    }

    pub fn target_host(&self) -> &str {
        &self.target_host
    }

    /// Whether a header has been replaced yet.
    pub fn is_replaced(&self) -> bool {
        self.replaced
    }

    pub fn transform(&mut self, chunk: Bytes) -> Bytes {
        if self.replaced {
            return chunk;
        }

        let Some((start, end)) = find_host_value(&chunk) else {
            return chunk;
        };

        let mut out = BytesMut::with_capacity(chunk.len() - (end - start) + self.target_host.len());
        out.put_slice(&chunk[..start]);
        out.put_slice(self.target_host.as_bytes());
        out.put_slice(&chunk[end..]);

        self.replaced = true;
        tracing::trace!(host = %self.target_host, "Rewrote Host header");
        out.freeze()
    }
}

/// Byte range of the value in the first `\r\nHost: <value>` line.
fn find_host_value(chunk: &[u8]) -> Option<(usize, usize)> {
    let mut from = 0;

    while let Some(pos) = chunk[from..].windows(2).position(|w| w == b"\r\n") {
        let line = from + pos + 2;
        from = line;

        let rest = &chunk[line..];
        if rest.len() <= HOST_TAIL.len() || !matches!(rest[0], b'H' | b'h') {
            continue;
        }
        if &rest[1..=HOST_TAIL.len()] != HOST_TAIL {
            continue;
        }

        let start = line + 1 + HOST_TAIL.len();
        let len = chunk[start..].iter().take_while(|b| !is_space(**b)).count();
        if len > 0 {
            return Some((start, start + len));
        }
    }

    None
}

pub(crate) fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}
