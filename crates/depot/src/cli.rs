use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "depot", version, about, long_about = None, propagate_version = true)]
pub struct App {
    /// Registry configuration (TOML). `DEPOT_*` variables override it.
    #[arg(short, long, env = "DEPOT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// More output; repeat for more. `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install one resource and print where it was stored.
    #[command(alias = "f")]
    Fetch { identifier: String, version: String },

    /// Fetch a resource into memory and write it to stdout.
    Data { path: String },

    /// Fetch a resource index and print it.
    #[command(alias = "i")]
    Index { path: String },

    /// Install every index entry that is not installed at its listed version.
    #[command(alias = "up")]
    Update { index: String },

    /// List versioned files in the storage root.
    #[command(alias = "ls")]
    List,

    /// Remove leftover temp files from the scratch directory.
    Clean,
}

impl App {
    /// Filter used when `RUST_LOG` is unset.
    pub fn default_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
