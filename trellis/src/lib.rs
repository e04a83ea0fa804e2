//! Cache-oriented distributed array-processing platform.
//!
//! Trellis lets an application written against a single host transparently
//! execute over a cluster of worker nodes. An application is expressed as a
//! directed acyclic graph of [`Processor`](crate::runtime::Processor)s; each
//! processor conceptually defines an infinite indexed array whose element at
//! key `k` is produced by applying the processor's function to values pulled,
//! on demand, from upstream processors at keys of its choosing.
//!
//! Every computed element is cached in a per-processor, per-node bounded LRU
//! cache. When a cluster is configured, a [`Router`](crate::router::Router)
//! maps each key to an owning node; requests for keys owned elsewhere are
//! filled by a single block-granular RPC whose results land in the local
//! cache, so neighboring keys are served without further network traffic.
//!
//! # Building a graph
//!
//! Processors are added to an [`App`](crate::runtime::App) in declaration
//! order; inputs must already exist, which keeps the graph acyclic by
//! construction. The same declarations must run on every node so processor
//! ids agree across the cluster.
//!
//! ```
//! use trellis::{async_trait, App, Context, Error, Processor, Result};
//!
//! struct Naturals {
//!     len: u64,
//! }
//!
//! #[async_trait]
//! impl Processor<u64> for Naturals {
//!     async fn compute(&self, key: u64, _ctx: &Context<'_, u64>) -> Result<u64> {
//!         if key >= self.len {
//!             return Err(Error::EndOfArray);
//!         }
//!         Ok(key)
//!     }
//! }
//!
//! struct Double;
//!
//! #[async_trait]
//! impl Processor<u64> for Double {
//!     async fn compute(&self, key: u64, ctx: &Context<'_, u64>) -> Result<u64> {
//!         Ok(ctx.input(0).get(key).await? * 2)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut app = App::single_node("doubler");
//!     let naturals = app.add_source(Naturals { len: 10 });
//!     let doubled = app.add(Double, &[naturals]);
//!     app.run().await?;
//!
//!     assert_eq!(doubled.get(3).await?, 6);
//!     assert!(matches!(doubled.get(10).await, Err(Error::EndOfArray)));
//!     Ok(())
//! }
//! ```
//!
//! # Running on a cluster
//!
//! Each node loads the same [`Config`](crate::config::Config), constructs the
//! same graph, and calls [`App::run`](crate::runtime::App::run). `run`
//! starts the local block server, dials every peer with bounded retries, and
//! returns only once the full mesh reports ready. Nodes flagged as servers
//! block inside `run` until a peer calls
//! [`App::shutdown`](crate::runtime::App::shutdown).
//!
//! # End of the array
//!
//! Logical arrays are infinite; a source signals the end of its data by
//! returning [`Error::EndOfArray`](crate::error::Error::EndOfArray). The
//! condition flows unchanged through dependent processors and is the
//! canonical termination signal for
//! [`Handle::map_all`](crate::runtime::Handle::map_all).
pub mod cache;
pub mod cluster;
pub mod config;
pub mod error;
mod metrics;
pub mod router;
pub mod runtime;
pub mod serializer;
pub mod store;
pub mod transport;

pub use cache::{Cache, CacheStats};
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::MetricsSnapshot;
pub use runtime::{App, Context, Handle, Processor};
pub use serializer::{Serializer, Value};
pub use transport::wire::Slice;

pub use async_trait::async_trait;
pub use futures;
pub use tracing;
