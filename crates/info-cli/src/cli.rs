use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "info-service",
    about = "Information Service: TLS JSON document store with credential pairing",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Configuration file (TOML). Defaults are used when omitted.
    #[arg(long = "conf", global = true, value_name = "FILE")]
    pub conf: Option<PathBuf>,

    /// Log at DEBUG level
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Log at INFO level
    #[arg(short = 'v', long = "info", global = true)]
    pub info: bool,

    /// Write logs to FILE instead of stdout
    #[arg(long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else if self.info {
            Level::INFO
        } else {
            Level::WARN
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the service (default)
    Serve(ServeArgs),
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Args, Default)]
pub struct ServeArgs {
    /// Override `bind_addr` from the configuration
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}
