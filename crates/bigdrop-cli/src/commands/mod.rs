//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Load configuration with graceful fallback to defaults.
///
/// If the config file doesn't exist or can't be parsed, commands run with
/// defaults rather than failing.
pub fn load_config() -> bigdrop_core::config::Config {
    bigdrop_core::config::Config::load().unwrap_or_default()
}

pub mod config;
pub mod serve;
pub mod upload;

/// Bigdrop - resumable chunked file uploads
#[derive(Parser)]
#[command(name = "bigdrop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Start the store server
    Serve(ServeArgs),

    /// Upload a file to the store
    Upload(UploadArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind to localhost only
    #[arg(long)]
    pub localhost_only: bool,

    /// Directory for artifacts and in-flight chunks
    #[arg(short, long)]
    pub storage: Option<PathBuf>,
}

/// Arguments for the upload command
#[derive(Parser)]
pub struct UploadArgs {
    /// File to upload
    pub file: PathBuf,

    /// Store server base URL (e.g. http://localhost:3000)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Number of parallel chunk uploads
    #[arg(long)]
    pub parallel: Option<usize>,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// The config action to perform
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init,
}
