//! Serve command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use bigdrop_core::store::ChunkStore;
use bigdrop_core::web::{run_server, WebServerConfig};

use super::ServeArgs;

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let global_config = super::load_config();

    let port = args.port.unwrap_or(global_config.server.port);
    let localhost_only = args.localhost_only || global_config.server.localhost_only;
    let storage = args
        .storage
        .or(global_config.server.storage_dir)
        .unwrap_or_else(|| PathBuf::from("uploads"));

    std::fs::create_dir_all(&storage)?;
    tracing::debug!(port, localhost_only, storage = %storage.display(), "resolved serve options");

    println!();
    println!("Bigdrop store");
    println!("{}", "─".repeat(40));
    println!();
    println!("  Storage:  {}", storage.display());
    println!("  Endpoint: http://localhost:{port}");
    if !localhost_only {
        println!("            (reachable from other devices on this network)");
    }
    println!();
    println!("Press Ctrl+C to stop the server.");

    let store = Arc::new(ChunkStore::new(storage));
    let config = WebServerConfig {
        port,
        localhost_only,
        max_body_bytes: global_config.server.body_limit_bytes,
    };

    run_server(config, store).await?;
    Ok(())
}
