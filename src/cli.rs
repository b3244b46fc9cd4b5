//! Command-line entry point: subcommands and argument parsing.
//!
//! `Cli`/`Commands` shape grounded on
//! `swedishembedded-sven/src/cli.rs`'s clap-derive structure (top-level
//! flags plus a `Commands` enum, one variant per subcommand).

use clap::{Parser, Subcommand};

use crate::config::ConfigArgs;

#[derive(Debug, Parser)]
#[command(name = "agentbus", version, about = "A persistent multi-agent communication bus")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the bus: HTTP/SSE server, and optionally MCP over stdio.
    Serve {
        #[command(flatten)]
        config: ConfigArgs,
        /// Also serve MCP over stdio on this process's stdin/stdout.
        #[arg(long)]
        stdio: bool,
    },
    /// Validate a catalog TOML file without starting the bus.
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommands {
    Validate {
        /// Path to the catalog TOML file.
        path: std::path::PathBuf,
    },
}
