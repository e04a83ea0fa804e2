//! Client side of the block-get protocol.
//!
//! One client per peer, holding a persistent connection. Calls are
//! synchronous request/response exchanges serialized behind a lock, so a
//! client can be shared freely across tasks.
use std::io;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use super::wire::{GetReply, Request, Slice, SliceArgs};
use super::{read_frame, write_frame};
use crate::error::{Error, Result};
use crate::serializer::{Serializer, Value};

/// Pause between polls of a peer's `Ready` method.
pub(crate) const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A persistent connection to one peer.
#[derive(Debug)]
pub struct Client {
    stream: Mutex<TcpStream>,
    serializer: Serializer,
    deadline: Option<Duration>,
}

impl Client {
    /// Dials `addr`. A `deadline`, when set, bounds every subsequent call
    /// on this client.
    pub async fn connect(
        addr: &str,
        serializer: Serializer,
        deadline: Option<Duration>,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: Mutex::new(stream),
            serializer,
            deadline,
        })
    }

    /// Fetches the values of processor `proc_id` for keys `[start, end)`.
    ///
    /// On success the slice holds exactly `end - start` values at
    /// `offset == start`. Any per-key failure on the serving node fails
    /// the whole call.
    pub async fn get_slice<V: Value>(&self, start: u64, end: u64, proc_id: u32) -> Result<Slice<V>> {
        let reply: GetReply<V> = self
            .call(&Request::Get(SliceArgs {
                start,
                end,
                proc_id,
            }))
            .await?;
        let slice = reply.map_err(Error::from)?;
        debug!(start, end, proc_id, len = slice.len(), "fetched remote slice");
        Ok(slice)
    }

    /// Whether the peer has finished connecting to its own peers.
    pub async fn ready(&self) -> Result<bool> {
        self.call(&Request::Ready).await
    }

    /// Polls the peer until it reports ready. Transport errors during the
    /// poll are logged and retried; the mesh is still forming.
    pub async fn wait_ready(&self) -> Result<()> {
        loop {
            match self.ready().await {
                Ok(true) => return Ok(()),
                Ok(false) => debug!("peer not ready yet"),
                Err(e) => debug!(error = %e, "ready poll failed"),
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Asks the peer to terminate.
    pub async fn shutdown(&self) -> Result<()> {
        let _acknowledged: bool = self.call(&Request::Shutdown).await?;
        Ok(())
    }

    async fn call<Reply: DeserializeOwned>(&self, request: &Request) -> Result<Reply> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.exchange(request))
                .await
                .map_err(|_| {
                    Error::Transport(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("call exceeded deadline of {deadline:?}"),
                    ))
                })?,
            None => self.exchange(request).await,
        }
    }

    async fn exchange<Reply: DeserializeOwned>(&self, request: &Request) -> Result<Reply> {
        let payload = self
            .serializer
            .to_bytes(request)
            .map_err(|e| Error::Transport(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, &payload).await?;
        let reply = read_frame(&mut *stream).await?;
        self.serializer
            .from_bytes(&reply)
            .map_err(|e| Error::Transport(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))
    }
}
