// CLI module - command-line argument parsing
//
// The server is configured by flags plus a couple of environment variables
// (see config.rs). There are no subcommands: running the binary starts the
// server.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// ClickNook - self-hosted product analytics with AI-named events
#[derive(Parser, Debug)]
#[command(name = "clicknook")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Self-hosted product analytics server", long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8090")]
    pub listen: SocketAddr,

    /// Directory for the event and metadata databases
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Development mode: skip dashboard session auth
    #[arg(long)]
    pub dev: bool,
}
