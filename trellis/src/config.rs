//! Runtime configuration.
//!
//! Configuration is loaded from a YAML file shared by every node in a
//! deployment:
//!
//! ```yaml
//! app:
//!   name: "myapp"
//!   cache_cap: 1000
//!   num_workers: 4
//!   block_size: 10
//! cluster:
//!   name: "mycluster"
//!   nodes:
//!     - id: 0
//!       addr: "10.0.0.1:33330"
//!     - id: 1
//!       addr: "10.0.0.2:33330"
//! ```
//!
//! A single-node deployment omits the `cluster` block entirely; the router
//! then degenerates to the single-node variant and no sockets are opened.
//! Which entry of `cluster.nodes` is the local node is not part of the file
//! (the same file ships to every node); it is supplied out of band, usually
//! by a `--node` command-line flag.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::serializer::Serializer;

pub const DEFAULT_CACHE_CAP: u64 = 2000;
pub const DEFAULT_NUM_WORKERS: usize = 2;
pub const DEFAULT_BLOCK_SIZE: u64 = 10;
pub const DEFAULT_NUM_RETRIES: u32 = 20;
pub const DEFAULT_MAX_THREADS: usize = 2;

/// Top-level configuration: the application section plus an optional
/// cluster section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub cluster: Option<ClusterConfig>,
}

/// Application-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    /// Per-processor LRU capacity, in elements.
    #[serde(default = "default_cache_cap")]
    pub cache_cap: u64,
    /// Number of concurrent workers driving `map_all`.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Key-block granularity for routing, remote fetches and `map_all`
    /// work distribution.
    #[serde(default = "default_block_size")]
    pub block_size: u64,
    /// Dial attempts per peer before startup fails.
    #[serde(default = "default_num_retries")]
    pub num_retries: u32,
    /// OS-thread parallelism hint for driver binaries.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// Wire encoding for RPC payloads.
    #[serde(default)]
    pub serializer: Serializer,
    /// Optional per-RPC deadline. Unset means calls wait indefinitely.
    #[serde(default)]
    pub rpc_timeout_secs: Option<u64>,
}

/// Static description of the cluster. Membership does not change at
/// runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Stable node id.
    pub id: u32,
    /// RPC listen / dial address, `host:port`.
    pub addr: String,
}

fn default_cache_cap() -> u64 {
    DEFAULT_CACHE_CAP
}
fn default_num_workers() -> usize {
    DEFAULT_NUM_WORKERS
}
fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}
fn default_num_retries() -> u32 {
    DEFAULT_NUM_RETRIES
}
fn default_max_threads() -> usize {
    DEFAULT_MAX_THREADS
}

impl Config {
    /// Read a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// A default single-node configuration, useful for tests and local
    /// evaluation.
    pub fn single_node(name: &str) -> Self {
        Self {
            app: AppConfig {
                name: name.to_string(),
                cache_cap: DEFAULT_CACHE_CAP,
                num_workers: DEFAULT_NUM_WORKERS,
                block_size: DEFAULT_BLOCK_SIZE,
                num_retries: DEFAULT_NUM_RETRIES,
                max_threads: DEFAULT_MAX_THREADS,
                serializer: Serializer::default(),
                rpc_timeout_secs: None,
            },
            cluster: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
app:
  name: "myapp"
  cache_cap: 1000
  num_workers: 4
  block_size: 20
  serializer: cbor
cluster:
  name: "test cluster"
  nodes:
    - id: 0
      addr: "127.0.0.1:33330"
    - id: 1
      addr: "127.0.0.1:33331"
"#;

    #[test]
    fn parses_full_config() {
        let config: Config = serde_yaml::from_str(FULL).unwrap();
        assert_eq!(config.app.name, "myapp");
        assert_eq!(config.app.cache_cap, 1000);
        assert_eq!(config.app.num_workers, 4);
        assert_eq!(config.app.block_size, 20);
        assert_eq!(config.app.serializer, Serializer::Cbor);
        // Omitted keys fall back to defaults.
        assert_eq!(config.app.num_retries, DEFAULT_NUM_RETRIES);
        assert_eq!(config.app.max_threads, DEFAULT_MAX_THREADS);
        assert_eq!(config.app.rpc_timeout_secs, None);

        let cluster = config.cluster.unwrap();
        assert_eq!(cluster.name, "test cluster");
        assert_eq!(cluster.nodes.len(), 2);
        assert_eq!(cluster.nodes[1].id, 1);
        assert_eq!(cluster.nodes[1].addr, "127.0.0.1:33331");
    }

    #[test]
    fn omitted_cluster_is_single_node() {
        let config: Config = serde_yaml::from_str("app:\n  name: solo\n").unwrap();
        assert!(config.cluster.is_none());
        assert_eq!(config.app.cache_cap, DEFAULT_CACHE_CAP);
        assert_eq!(config.app.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.app.serializer, Serializer::Postcard);
    }
}
