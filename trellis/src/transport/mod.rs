//! Synchronous block-get RPC between nodes.
//!
//! Each node runs one server and keeps one persistent client connection
//! per peer. The protocol is three request/response methods over 4-byte
//! big-endian length-prefixed frames:
//!
//! - `Get { start, end, proc_id }` → a [`Slice`](wire::Slice) of exactly
//!   `end - start` values, or a [`RemoteError`](wire::RemoteError).
//! - `Ready` → whether the serving node has finished connecting to its
//!   peers.
//! - `Shutdown` → acknowledges, then asynchronously initiates local
//!   termination.
//!
//! Frame payloads are encoded with the configured
//! [`Serializer`](crate::serializer::Serializer). Calls are synchronous:
//! one request is in flight per connection at a time.
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub mod client;
pub(crate) mod server;
pub mod wire;

pub use client::Client;

/// Upper bound on a single frame. A frame carries at most one block of
/// values; anything larger indicates a corrupt stream.
pub(crate) const MAX_FRAME_LEN: usize = 64 << 20;

pub(crate) async fn write_frame<S>(stream: &mut S, payload: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

pub(crate) async fn read_frame<S>(stream: &mut S) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}
