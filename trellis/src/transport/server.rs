//! Server side of the block-get protocol.
//!
//! The accept loop runs for the lifetime of the app; each connection gets
//! its own task that decodes one request frame at a time and writes one
//! reply frame back. `Get` materializes a block by calling the local
//! handle sequentially over the requested range, so a remote fetch goes
//! through exactly the same cache-and-compute path as a local one.
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

use super::wire::{GetReply, RemoteError, Request, Slice, SliceArgs};
use super::{read_frame, write_frame};
use crate::runtime::{AppShared, Handle};
use crate::serializer::Value;

pub(crate) async fn serve<V: Value>(
    listener: TcpListener,
    registry: Arc<[Handle<V>]>,
    shared: Arc<AppShared>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                let registry = Arc::clone(&registry);
                let shared = Arc::clone(&shared);
                tokio::spawn(handle_connection(stream, registry, shared));
            }
            Err(e) => {
                error!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_connection<V: Value>(
    mut stream: TcpStream,
    registry: Arc<[Handle<V>]>,
    shared: Arc<AppShared>,
) {
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    debug!(error = %e, "connection closed");
                }
                return;
            }
        };
        let request: Request = match shared.serializer.from_bytes(&frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "undecodable request, dropping connection");
                return;
            }
        };

        let reply = match request {
            Request::Get(args) => {
                let reply = get_slice(&args, &registry).await;
                shared.serializer.to_bytes(&reply)
            }
            Request::Ready => shared
                .serializer
                .to_bytes(&shared.ready.load(Ordering::SeqCst)),
            Request::Shutdown => shared.serializer.to_bytes(&true),
        };
        let payload = match reply {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "cannot encode reply, dropping connection");
                return;
            }
        };
        if let Err(e) = write_frame(&mut stream, &payload).await {
            debug!(error = %e, "write failed");
            return;
        }
        // Terminate only after the acknowledgement is on the wire.
        if matches!(request, Request::Shutdown) {
            debug!("shutdown requested by peer");
            shared.terminate.notify_one();
        }
    }
}

async fn get_slice<V: Value>(args: &SliceArgs, registry: &Arc<[Handle<V>]>) -> GetReply<V> {
    let Some(handle) = registry.get(args.proc_id as usize) else {
        return Err(RemoteError::Other(format!(
            "unknown processor {}",
            args.proc_id
        )));
    };
    let mut data = Vec::with_capacity(args.end.saturating_sub(args.start) as usize);
    for key in args.start..args.end {
        match handle.get(key).await {
            Ok(value) => data.push(value),
            // Any per-key failure fails the whole call; no partial slice.
            Err(e) => return Err(RemoteError::from_error(&e)),
        }
    }
    Ok(Slice::new(args.start, data))
}
