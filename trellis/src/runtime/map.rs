//! Parallel map driver.
//!
//! A shared counter hands out key-blocks to a pool of workers; each worker
//! walks its block sequentially and pushes values into a bounded channel,
//! so a slow consumer naturally throttles upstream work. When a worker
//! observes an error from the handle (typically end-of-array) it sends a
//! retirement sentinel and exits; a coordinator counts sentinels and
//! closes the output once the whole pool has retired. Workers are not
//! cancelled on the first error: each runs until it observes one at its
//! own keys.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::runtime::Handle;
use crate::serializer::Value;

/// Capacity of the output channel and of the internal worker channel.
const CHANNEL_CAPACITY: usize = 1024;

/// Hands out disjoint key-blocks to workers.
struct BlockCounter {
    next: AtomicU64,
    size: u64,
}

impl BlockCounter {
    fn new(size: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            size,
        }
    }

    /// The start of the next unclaimed block.
    fn next_block(&self) -> u64 {
        self.next.fetch_add(self.size, Ordering::Relaxed)
    }
}

pub(crate) fn map_all<V: Value>(
    handle: Handle<V>,
    num_workers: usize,
    block_size: u64,
) -> ReceiverStream<V> {
    let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (value_tx, value_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let counter = Arc::new(BlockCounter::new(block_size));

    for worker_id in 0..num_workers {
        tokio::spawn(worker(
            worker_id,
            handle.clone(),
            Arc::clone(&counter),
            value_tx.clone(),
        ));
    }
    drop(value_tx);
    tokio::spawn(coordinate(value_rx, out_tx, num_workers));

    ReceiverStream::new(out_rx)
}

/// Pulls blocks from the counter until an error retires it. `None` is the
/// retirement sentinel.
async fn worker<V: Value>(
    worker_id: usize,
    handle: Handle<V>,
    counter: Arc<BlockCounter>,
    values: mpsc::Sender<Option<V>>,
) {
    loop {
        let start = counter.next_block();
        for key in start..start + counter.size {
            match handle.get(key).await {
                Ok(value) => {
                    if values.send(Some(value)).await.is_err() {
                        // Consumer went away; nothing left to do.
                        return;
                    }
                }
                Err(e) => {
                    debug!(worker_id, key, error = %e, "worker retiring");
                    let _ = values.send(None).await;
                    return;
                }
            }
        }
    }
}

/// Forwards values to the output and closes it once every worker has
/// retired.
async fn coordinate<V: Value>(
    mut values: mpsc::Receiver<Option<V>>,
    out: mpsc::Sender<V>,
    num_workers: usize,
) {
    let mut retired = 0;
    while let Some(item) = values.recv().await {
        match item {
            Some(value) => {
                if out.send(value).await.is_err() {
                    // The stream was dropped; dropping `values` aborts the
                    // workers on their next send.
                    return;
                }
            }
            None => {
                retired += 1;
                debug!(retired, num_workers, "worker retired");
                if retired == num_workers {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_hands_out_disjoint_blocks() {
        let counter = BlockCounter::new(10);
        let starts: Vec<u64> = (0..5).map(|_| counter.next_block()).collect();
        assert_eq!(starts, vec![0, 10, 20, 30, 40]);
    }
}
