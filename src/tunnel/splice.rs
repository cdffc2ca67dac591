use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::HeaderRewriter;
use crate::tunnel::local::LocalStream;

/// Read buffer size for the relay side.
const BUFFER_SIZE: usize = 16 * 1024;

/// Bytes moved in each direction before the splice ended.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpliceStats {
    /// Relay to local, counted after any rewrite.
    pub to_local: u64,
    pub to_remote: u64,
}

/// Couples the relay socket with the local socket until the relay side
/// ends.
///
/// Every chunk read from the relay is handed to `inspect` before it is
/// (optionally) rewritten and written to the local side. The local side is
/// copied back raw. When the local side finishes first, the relay write
/// half is shut down and the splice keeps forwarding until the relay
/// closes. Any I/O error ends the splice.
pub async fn splice<F>(
    remote: TcpStream,
    local: Box<dyn LocalStream>,
    mut rewriter: Option<HeaderRewriter>,
    mut inspect: F,
) -> std::io::Result<SpliceStats>
where
    F: FnMut(&[u8]),
{
    let (mut remote_rd, mut remote_wr) = remote.into_split();
    let (mut local_rd, mut local_wr) = tokio::io::split(local);

    let upstream = async {
        let mut buf = BytesMut::with_capacity(BUFFER_SIZE);
        let mut forwarded = 0u64;

        loop {
            buf.reserve(BUFFER_SIZE);
            let n = remote_rd.read_buf(&mut buf).await?;
            if n == 0 {
                let _ = local_wr.shutdown().await;
                return Ok::<u64, std::io::Error>(forwarded);
            }

            let chunk = buf.split().freeze();
            inspect(&chunk);

            let chunk = match rewriter.as_mut() {
                Some(rw) => rw.transform(chunk),
                None => chunk,
            };
            local_wr.write_all(&chunk).await?;
            forwarded += chunk.len() as u64;
        }
    };

    let downstream = async {
        let n = tokio::io::copy(&mut local_rd, &mut remote_wr).await?;
        remote_wr.shutdown().await?;
        Ok::<u64, std::io::Error>(n)
    };

    tokio::pin!(upstream, downstream);

    let mut stats = SpliceStats::default();
    let mut local_done = false;

    loop {
        tokio::select! {
            res = &mut upstream => {
                stats.to_local = res?;
                return Ok(stats);
            }
            res = &mut downstream, if !local_done => {
                stats.to_remote = res?;
                local_done = true;
                tracing::debug!(bytes = stats.to_remote, "Local side finished");
            }
        }
    }
}
