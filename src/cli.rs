use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::config::SimulatorConfig;

#[derive(Parser, Debug)]
#[command(name = "nodesim")]
#[command(about = "Register simulated nodes and their device metadata into a cluster store")]
#[command(version)]
pub struct Args {
    /// Path to the simulator config file (YAML)
    #[arg(short, long, env = "NODESIM_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Override the API bind address
    #[arg(long, value_name = "ADDR")]
    pub bind_addr: Option<String>,

    /// Override the API port
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Per-request deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub request_timeout: Option<u64>,

    /// Path to a .env file; it may supply NODESIM_CONFIG and RUST_LOG
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,
}

impl Args {
    /// Parse arguments, loading `--env-file` first so it can supply
    /// env-backed flags. Clap errors exit the process as `parse` does.
    pub fn parse_with_env_file<I, T>(argv: I) -> Result<Self, dotenvy::Error>
    where
        I: IntoIterator<Item = T> + Clone,
        T: Into<OsString> + Clone,
    {
        let args = Self::parse_from(argv.clone());
        match args.env_file {
            Some(ref path) => {
                dotenvy::from_path(path)?;
                Ok(Self::parse_from(argv))
            }
            None => Ok(args),
        }
    }

    /// Apply command-line overrides on top of the loaded config
    pub fn apply_overrides(&self, config: &mut SimulatorConfig) {
        if let Some(ref addr) = self.bind_addr {
            config.server.bind_addr = addr.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(secs) = self.request_timeout {
            config.server.request_timeout_secs = secs;
        }
    }

    /// Default log filter for the requested verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "nodesim=debug,tower_http=info",
            2 => "debug",
            _ => "trace",
        }
    }
}
