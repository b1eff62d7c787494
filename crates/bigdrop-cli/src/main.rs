//! Bigdrop CLI - resumable chunked file uploads
//!
//! Bigdrop moves large files to a store server in fixed-size chunks, with
//! dedup, resumption after interruption, and bounded parallelism.
//!
//! ## Quick Start
//!
//! ```bash
//! # Start a store server
//! bigdrop serve
//!
//! # Upload a file (from another terminal or machine)
//! bigdrop upload ./video.mp4
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod commands;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Upload(args) => commands::upload::run(args).await,
        Command::Config(args) => commands::config::run(args),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,bigdrop=info,bigdrop_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
