//! Processor graph runtime.
//!
//! An [`App`] owns the processor graph, the cluster directory, the router
//! and the block server. Applications add processors during setup (single
//! threaded, by convention), call [`App::run`] exactly once, and then use
//! the returned [`Handle`]s to pull elements.
//!
//! Every element request follows the same path: probe the processor's
//! cache, ask the router whether the key is owned elsewhere, fetch a whole
//! block over RPC if so, and otherwise run the processor function locally.
//! Processor functions reach their upstream dependencies through the same
//! handle mechanism, so dependency fetches recurse through the identical
//! pipeline of cache probe, routing decision, and fetch or compute.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::cache::{Cache, CacheStats};
use crate::cluster::{Cluster, Node, NodeId};
use crate::config::{AppConfig, Config, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAP, DEFAULT_NUM_WORKERS};
use crate::error::{Error, Result};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::router::{block_index, block_start, BlockRouter, Router, SingleNode};
use crate::serializer::{Serializer, Value};
use crate::transport::server;

mod map;

/// A processor function: a pure, deterministic producer of the element at
/// `key`, given its upstream inputs.
///
/// Implementations carry their own parameters as fields and read upstream
/// values through [`Context::input`]. Determinism matters: the engine
/// treats any previously computed value at a key as authoritative and may
/// recompute concurrently, so a non-deterministic function would produce
/// divergent caches.
#[async_trait]
pub trait Processor<V: Value>: Send + Sync + 'static {
    async fn compute(&self, key: u64, ctx: &Context<'_, V>) -> Result<V>;
}

/// What a processor function sees while computing one element: its wired
/// inputs, in declaration order.
pub struct Context<'a, V: Value> {
    inputs: &'a [Handle<V>],
}

impl<'a, V: Value> Context<'a, V> {
    /// The upstream handle at position `i`.
    ///
    /// # Panics
    /// Panics if the processor was wired with fewer than `i + 1` inputs.
    pub fn input(&self, i: usize) -> &Handle<V> {
        &self.inputs[i]
    }

    pub fn inputs(&self) -> &[Handle<V>] {
        self.inputs
    }
}

/// Shared per-app state reachable from every handle and from the server.
pub(crate) struct AppShared {
    pub(crate) config: AppConfig,
    pub(crate) cluster: Option<Cluster>,
    pub(crate) router: Box<dyn Router>,
    pub(crate) serializer: Serializer,
    pub(crate) ready: AtomicBool,
    pub(crate) terminate: Notify,
}

struct Proc<V: Value> {
    id: u32,
    func: Box<dyn Processor<V>>,
    inputs: Vec<Handle<V>>,
    is_source: bool,
    cache: Cache<V>,
    metrics: Metrics,
    shared: Arc<AppShared>,
}

/// A callable reference to a processor, bound to its app and node.
///
/// Handles are cheap to clone and safe to share across tasks.
pub struct Handle<V: Value> {
    inner: Arc<Proc<V>>,
}

impl<V: Value> Clone for Handle<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Value> Handle<V> {
    /// The processor's id: assigned sequentially from 0 in declaration
    /// order, identical on every node that declares the same graph.
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Whether this processor was declared with
    /// [`App::add_source`].
    pub fn is_source(&self) -> bool {
        self.inner.is_source
    }

    /// The element at `key`.
    ///
    /// Served from cache when possible; otherwise either a block fetch
    /// from the owning node (populating the cache with the whole block)
    /// or a local computation. Errors are propagated to the caller and
    /// never cached.
    pub async fn get(&self, key: u64) -> Result<V> {
        let proc = &*self.inner;
        proc.metrics.add_request();

        if let Some(value) = proc.cache.get(key) {
            proc.metrics.add_cache_hit();
            return Ok(value);
        }

        if let Some(cluster) = proc.shared.cluster.as_ref() {
            let target = proc.shared.router.route(key, proc.id);
            if !cluster.is_local(target) {
                let node = cluster
                    .node(target)
                    .ok_or_else(|| Error::Config(format!("router chose unknown node {target}")))?;
                return self.fetch_remote(key, node).await;
            }
            debug!(key, proc_id = proc.id, "computing on local node");
        }

        let ctx = Context {
            inputs: &proc.inputs,
        };
        let value = proc.func.compute(key, &ctx).await?;
        proc.cache.set(key, value.clone());
        Ok(value)
    }

    /// Fills the block containing `key` from its owning node and returns
    /// the one requested element.
    async fn fetch_remote(&self, key: u64, node: &Node) -> Result<V> {
        let proc = &*self.inner;
        let block = proc.shared.config.block_size;
        let start = block_start(key, block);
        debug!(key, proc_id = proc.id, node = node.id, start, "fetching remote block");

        let slice = node
            .client()?
            .get_slice::<V>(start, start + block, proc.id)
            .await?;
        proc.cache.set_slice(slice.offset, &slice.data);
        slice
            .data
            .get(block_index(key, block))
            .cloned()
            .ok_or_else(|| {
                Error::Remote(format!("node {} returned a short slice for key {key}", node.id))
            })
    }

    /// Sequentially computes the values for keys `[start, end)`, stopping
    /// at the first error. Values computed before the error stay cached.
    pub async fn map(&self, start: u64, end: u64) -> Result<Vec<V>> {
        let mut values = Vec::with_capacity(end.saturating_sub(start) as usize);
        for key in start..end {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Produces the values of this processor at keys 0, 1, 2, … on a pool
    /// of concurrent workers, in no particular order.
    ///
    /// Each worker retires when it observes an error at one of its keys
    /// (typically end-of-array); the stream closes once every worker has
    /// retired. Errors are not surfaced through the stream; use
    /// [`map`](Self::map) when diagnostics are needed. Dropping the
    /// stream aborts the workers.
    pub fn map_all(&self) -> ReceiverStream<V> {
        map::map_all(
            self.clone(),
            self.inner.shared.config.num_workers,
            self.inner.shared.config.block_size,
        )
    }

    /// Occupancy of this processor's cache on this node.
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Request counters for this processor on this node.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

/// Coordinates the execution of a set of processors.
///
/// See the [crate documentation](crate) for an end-to-end example.
pub struct App<V: Value> {
    shared: Arc<AppShared>,
    procs: Vec<Handle<V>>,
    is_server: bool,
}

impl<V: Value> App<V> {
    /// Creates an app for `local_node`. When the configuration has no
    /// `cluster` section the app is single-node and `local_node` is
    /// ignored.
    pub fn new(config: Config, local_node: NodeId) -> Result<Self> {
        let mut app_config = config.app;
        normalize(&mut app_config);

        let cluster = config
            .cluster
            .as_ref()
            .map(|c| Cluster::from_config(c, local_node))
            .transpose()?;
        let router: Box<dyn Router> = match &cluster {
            Some(cluster) => Box::new(BlockRouter::new(
                cluster.num_nodes() as u32,
                app_config.block_size,
            )),
            None => Box::new(SingleNode),
        };
        let serializer = app_config.serializer;

        Ok(Self {
            shared: Arc::new(AppShared {
                config: app_config,
                cluster,
                router,
                serializer,
                ready: AtomicBool::new(false),
                terminate: Notify::new(),
            }),
            procs: Vec::new(),
            is_server: false,
        })
    }

    /// An app over a default single-node configuration.
    pub fn single_node(name: &str) -> Self {
        Self::new(Config::single_node(name), 0).expect("single-node config is valid")
    }

    /// Marks this node as a server: `run` will block until a peer calls
    /// `Shutdown` instead of returning once the mesh is ready.
    pub fn set_server(&mut self, is_server: bool) {
        self.is_server = is_server;
    }

    /// Adds a processor wired to `inputs`. Inputs must already exist,
    /// which keeps the graph acyclic by construction.
    pub fn add(&mut self, func: impl Processor<V>, inputs: &[Handle<V>]) -> Handle<V> {
        self.insert(Box::new(func), inputs.to_vec(), false)
    }

    /// Adds a source processor: one that produces elements from outside
    /// the graph (typically a persistent store) rather than from inputs.
    /// The flag is advisory routing information; sources are otherwise
    /// ordinary processors.
    pub fn add_source(&mut self, func: impl Processor<V>) -> Handle<V> {
        self.insert(Box::new(func), Vec::new(), true)
    }

    fn insert(
        &mut self,
        func: Box<dyn Processor<V>>,
        inputs: Vec<Handle<V>>,
        is_source: bool,
    ) -> Handle<V> {
        let id = self.procs.len() as u32;
        let handle = Handle {
            inner: Arc::new(Proc {
                id,
                func,
                inputs,
                is_source,
                cache: Cache::new(self.shared.config.cache_cap),
                metrics: Metrics::default(),
                shared: Arc::clone(&self.shared),
            }),
        };
        self.procs.push(handle.clone());
        handle
    }

    /// The handle with processor id `id`, if declared.
    pub fn handle(&self, id: u32) -> Option<&Handle<V>> {
        self.procs.get(id as usize)
    }

    /// Starts the node. Must be called after the graph is built; the
    /// processor registry is frozen from here on.
    ///
    /// With no cluster configured this is a no-op. Otherwise it starts
    /// the local block server, dials every peer with bounded retries,
    /// marks this node ready, and waits until every peer reports ready in
    /// turn, so when `run` returns the full mesh is up. Server nodes
    /// then block until a peer requests shutdown.
    pub async fn run(&self) -> Result<()> {
        let Some(cluster) = self.shared.cluster.as_ref() else {
            return Ok(());
        };

        let addr = cluster.local_node().addr.as_str();
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "server listening");
        let registry: Arc<[Handle<V>]> = self.procs.clone().into();
        tokio::spawn(server::serve(
            listener,
            registry,
            Arc::clone(&self.shared),
        ));

        let deadline = self
            .shared
            .config
            .rpc_timeout_secs
            .map(std::time::Duration::from_secs);
        for node in cluster.peers() {
            node.connect_with_retry(self.shared.config.num_retries, self.shared.serializer, deadline)
                .await?;
        }

        // Requests from peers are answered from here on.
        self.shared.ready.store(true, Ordering::SeqCst);

        for node in cluster.peers() {
            info!(node = node.id, addr = %node.addr, "waiting for peer to be ready");
            node.client()?.wait_ready().await?;
        }
        info!("all remote nodes are ready");

        if self.is_server {
            info!("server running until shutdown");
            self.shared.terminate.notified().await;
            info!("terminating");
        }
        Ok(())
    }

    /// Asks every peer to terminate. The local node is unaffected; a
    /// driver typically exits right after.
    pub async fn shutdown(&self) {
        let Some(cluster) = self.shared.cluster.as_ref() else {
            return;
        };
        info!("shutting down the cluster");
        for node in cluster.peers() {
            match node.client() {
                Ok(client) => {
                    if let Err(e) = client.shutdown().await {
                        warn!(node = node.id, error = %e, "shutdown call failed");
                    }
                }
                Err(e) => warn!(node = node.id, error = %e, "no connection for shutdown"),
            }
        }
        info!("shutdown complete");
    }
}

fn normalize(config: &mut AppConfig) {
    if config.cache_cap == 0 {
        warn!("cache_cap 0 is invalid, using default {DEFAULT_CACHE_CAP}");
        config.cache_cap = DEFAULT_CACHE_CAP;
    }
    if config.num_workers == 0 {
        warn!("num_workers 0 is invalid, using default {DEFAULT_NUM_WORKERS}");
        config.num_workers = DEFAULT_NUM_WORKERS;
    }
    if config.block_size == 0 {
        warn!("block_size 0 is invalid, using default {DEFAULT_BLOCK_SIZE}");
        config.block_size = DEFAULT_BLOCK_SIZE;
    }
}
