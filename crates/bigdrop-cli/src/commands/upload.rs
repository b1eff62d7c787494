//! Upload command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};

use bigdrop_core::client::HttpStoreClient;
use bigdrop_core::upload::{SessionState, UploadConfig, Uploader, UploadStatus};

use super::UploadArgs;

/// Run the upload command.
pub async fn run(args: UploadArgs) -> Result<()> {
    let global_config = super::load_config();

    let server_url = args.server.unwrap_or(global_config.client.server_url);
    let config = UploadConfig {
        chunk_size: args.chunk_size.unwrap_or(global_config.transfer.chunk_size),
        parallel_chunks: args.parallel.unwrap_or(global_config.transfer.parallel_chunks),
        max_retries: global_config.transfer.max_retries,
        chunk_timeout: global_config.transfer.chunk_timeout,
    };

    let file = args
        .file
        .canonicalize()
        .with_context(|| format!("cannot access {}", args.file.display()))?;

    println!();
    println!("Uploading {}", file.display());
    println!("  to {server_url}");
    println!();

    let client = Arc::new(HttpStoreClient::new(&server_url)?);
    let uploader = Uploader::new(client, config);
    uploader.select_file(&file);

    let mut rx = uploader.subscribe();
    let printer = tokio::spawn(async move {
        let mut last_line = String::new();
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            let line = format_status(&status);
            if line != last_line {
                println!("  {line}");
                last_line = line;
            }
        }
    });

    let result = uploader.upload().await;
    let final_status = uploader.subscribe().borrow().clone();
    drop(uploader);
    let _ = printer.await;

    result.context("upload failed")?;

    println!();
    if let Some(url) = final_status.download_url {
        println!("Done. Download: {server_url}{url}");
    } else {
        println!("Done.");
    }
    Ok(())
}

fn format_status(status: &UploadStatus) -> String {
    match status.state {
        SessionState::Hashing => format!("hashing {: >3}%", status.hash_progress),
        SessionState::Uploading => {
            let mut line = format!("uploading {: >3}%", status.progress);
            if let Some(speed) = status.speed_bps {
                line.push_str(&format!(" ({}/s", human_bytes(speed)));
                match status.eta_secs {
                    Some(eta) => line.push_str(&format!(", eta {eta}s)")),
                    None => line.push(')'),
                }
            }
            line
        }
        _ => status.message.clone(),
    }
}

fn human_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
