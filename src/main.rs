#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Valhalla node entrypoint (systemd-friendly).
//! Starts the overlay node and keeps the process alive.

use tracing::{info, warn};
use valhalla::core::types::NodeConfig;
use valhalla::node::Node;

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn load_config() -> NodeConfig {
    let path = env("VALHALLA_CONFIG", "valhalla.toml");
    let mut config = match std::fs::read_to_string(&path) {
        Ok(raw) => match NodeConfig::from_toml_str(&raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path, err = %e, "bad config file; using defaults");
                NodeConfig::default()
            }
        },
        Err(_) => NodeConfig::default(),
    };

    if let Ok(dir) = std::env::var("VALHALLA_DATA_DIR") {
        config.node.data_dir = dir;
    }
    if let Ok(addr) = std::env::var("VALHALLA_LISTEN") {
        config.transport.listen_addr = addr;
    }
    config
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let config = load_config();

    let (node, mut events) = match Node::new(config) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("node init failed: {e}");
            std::process::exit(1);
        }
    };

    let (addr, accept_handle) = match node.start().await {
        Ok(v) => v,
        Err(e) => {
            eprintln!("listen failed: {e}");
            std::process::exit(1);
        }
    };

    info!(node_id = %node.node_id(), %addr, "valhalla node running");

    // keep alive + log events
    let ev_task = tokio::spawn(async move {
        while let Some(ev) = events.recv().await {
            info!(?ev, "stack event");
        }
        warn!("event stream closed");
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            node.stop();
        }
        _ = accept_handle => {
            warn!("accept loop exited");
        }
    }

    ev_task.abort();
}
