use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "vproc", about = "Provider-side HPC job orchestrator for a decentralized compute marketplace", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the provider process: wires every component in start order
    /// and serves the admin/status HTTP API until interrupted.
    Serve {
        /// Path to the provider's YAML configuration file.
        #[arg(long)]
        config: PathBuf,

        /// Address to bind the HTTP API on.
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Port to bind the HTTP API on.
        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Bearer token the HTTP API requires. Generated and printed if omitted.
        #[arg(long, env = "VPROC_API_TOKEN")]
        token: Option<String>,

        /// Raw 32-byte Ed25519 seed file for signing status reports and
        /// usage records. An ephemeral keypair is generated if omitted —
        /// fine for `--simulation-mode`, unsuitable for production.
        #[arg(long, env = "VPROC_SIGNING_KEY_PATH")]
        signing_key_path: Option<PathBuf>,

        /// Base URL of the marketplace chain's ingestion endpoint. Uses
        /// an in-memory stub chain client if omitted.
        #[arg(long, env = "VPROC_CHAIN_URL")]
        chain_url: Option<String>,

        /// Root directory the Credential Store reads cluster credentials
        /// from (one file per cluster-id/credential-type). An in-memory,
        /// empty store is used if omitted.
        #[arg(long, env = "VPROC_CREDENTIALS_DIR")]
        credentials_dir: Option<PathBuf>,

        /// Path to the Reporter Queue's crash-safe recovery log file.
        #[arg(long, default_value = "./data/reporter.log")]
        reporter_log_path: PathBuf,
    },
}
