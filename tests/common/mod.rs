//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use wsgate::config::{parse_config, WsgateConfig};
use wsgate::endpoint::handlers::register_builtin_handlers;
use wsgate::endpoint::Operation;
use wsgate::{ChainRegistry, HttpServer, Shutdown};

/// A running server and the handle that stops it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to end.
    #[allow(dead_code)]
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

/// Parse `toml`, prepare a registry with the built-in handlers plus
/// `extra`, and serve on an ephemeral port.
pub async fn start_server(
    toml: &str,
    operation: Arc<dyn Operation>,
    extra: impl FnOnce(&mut ChainRegistry),
) -> TestServer {
    let mut config: WsgateConfig = parse_config(toml).unwrap();
    config.observability.metrics_enabled = false;

    let mut registry = ChainRegistry::new();
    register_builtin_handlers(&mut registry);
    extra(&mut registry);
    registry.add_rules(&config.handler_chains).unwrap();

    let server = HttpServer::from_config(config, &registry, operation).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let task = tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestServer {
        addr,
        shutdown,
        task,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
