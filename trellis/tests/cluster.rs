//! Multi-node behavior over loopback TCP: block routing, block-granular
//! cache fills, the startup mesh barrier, and shutdown fan-out.
//!
//! Each test runs every node of its cluster inside one process, which
//! keeps the registries observable from the test body.
use trellis::config::{AppConfig, ClusterConfig, NodeConfig};
use trellis::{async_trait, App, Config, Context, Error, Processor, Result, Serializer};

/// A deterministic source: the same declaration runs on every node.
struct TimesTen {
    len: u64,
}

#[async_trait]
impl Processor<i64> for TimesTen {
    async fn compute(&self, key: u64, _ctx: &Context<'_, i64>) -> Result<i64> {
        if key >= self.len {
            return Err(Error::EndOfArray);
        }
        Ok(key as i64 * 10)
    }
}

fn cluster_config(name: &str, block_size: u64, ports: &[u16]) -> Config {
    Config {
        app: AppConfig {
            name: name.to_string(),
            cache_cap: 2000,
            num_workers: 2,
            block_size,
            num_retries: 3,
            max_threads: 2,
            serializer: Serializer::default(),
            rpc_timeout_secs: Some(30),
        },
        cluster: Some(ClusterConfig {
            name: format!("{name}-cluster"),
            nodes: ports
                .iter()
                .enumerate()
                .map(|(id, port)| NodeConfig {
                    id: id as u32,
                    addr: format!("127.0.0.1:{port}"),
                })
                .collect(),
        }),
    }
}

fn build_graph(app: &mut App<i64>) -> (trellis::Handle<i64>, trellis::Handle<i64>) {
    let large = app.add_source(TimesTen { len: 1000 });
    let small = app.add_source(TimesTen { len: 6 });
    (large, small)
}

#[tokio::test(flavor = "multi_thread")]
async fn two_node_block_routing() {
    let config = cluster_config("routing", 4, &[39311, 39312]);

    let mut app0: App<i64> = App::new(config.clone(), 0).unwrap();
    let (large0, small0) = build_graph(&mut app0);

    let mut app1: App<i64> = App::new(config, 1).unwrap();
    app1.set_server(true);
    let (large1, _small1) = build_graph(&mut app1);

    let server = tokio::spawn(async move { app1.run().await });
    app0.run().await.unwrap();

    // Block 0 (keys 0..4) is owned by node 0: served locally.
    assert_eq!(large0.get(0).await.unwrap(), 0);
    assert_eq!(large1.metrics().requests, 0);

    // Block 1 (keys 4..8) is owned by node 1: one RPC fills the whole
    // block into node 0's cache.
    assert_eq!(large0.get(4).await.unwrap(), 40);
    assert_eq!(large1.metrics().requests, 4);

    // The neighboring key is a cache hit; no further RPC reaches node 1.
    assert_eq!(large0.get(5).await.unwrap(), 50);
    assert_eq!(large1.metrics().requests, 4);
    assert_eq!(large0.metrics().cache_hits, 1);

    // A remote block that fails mid-range fails whole: keys 4 and 5 exist
    // in the short array but 6 does not, so nothing is returned or cached.
    let before = small0.cache_stats().len;
    assert!(matches!(small0.get(4).await, Err(Error::EndOfArray)));
    assert_eq!(small0.cache_stats().len, before);

    app0.shutdown().await;
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn three_node_mesh_and_shutdown_fan_out() {
    let config = cluster_config("mesh", 10, &[39321, 39322, 39323]);

    let mut servers = Vec::new();
    for id in [1u32, 2] {
        let mut app: App<i64> = App::new(config.clone(), id).unwrap();
        app.set_server(true);
        build_graph(&mut app);
        servers.push(tokio::spawn(async move { app.run().await }));
    }

    let mut app0: App<i64> = App::new(config, 0).unwrap();
    let (large0, _) = build_graph(&mut app0);
    // run() returns only after all three nodes report ready.
    app0.run().await.unwrap();

    // Keys from blocks owned by each node resolve across the mesh.
    assert_eq!(large0.get(0).await.unwrap(), 0); // block 0 → node 0
    assert_eq!(large0.get(10).await.unwrap(), 100); // block 1 → node 1
    assert_eq!(large0.get(20).await.unwrap(), 200); // block 2 → node 2

    // One shutdown call terminates every server cleanly.
    app0.shutdown().await;
    for server in servers {
        server.await.unwrap().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_peer_is_fatal_after_retries() {
    // Node 1 is never started; node 0 must give up after its attempts.
    let mut config = cluster_config("unreachable", 10, &[39331, 39332]);
    config.app.num_retries = 0;

    let mut app0: App<i64> = App::new(config, 0).unwrap();
    build_graph(&mut app0);
    let err = app0.run().await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
