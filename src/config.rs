//! Runtime configuration
//!
//! Configuration comes from CLI flags (listen address, data directory, dev
//! mode) and environment variables:
//!
//! - `CLICKNOOK_ENCRYPTION_KEY` — hex-encoded 32-byte key for at-rest field
//!   encryption. When unset a key file is generated under the data directory.
//! - `RUST_LOG` — tracing filter, defaults to `clicknook=info`.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub listen: SocketAddr,

    /// Directory holding the two database files and the key file
    pub data_dir: PathBuf,

    /// Dev mode: dashboard endpoints skip session auth
    pub dev_mode: bool,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            listen: cli.listen,
            data_dir: cli.data_dir.clone(),
            dev_mode: cli.dev,
        }
    }

    /// Path of the columnar event database.
    pub fn events_db_path(&self) -> PathBuf {
        self.data_dir.join("events.duckdb")
    }

    /// Path of the relational metadata database.
    pub fn meta_db_path(&self) -> PathBuf {
        self.data_dir.join("clicknook.db")
    }
}
