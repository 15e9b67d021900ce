//! Command-line interface for the local store tool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use vertex_swarm_localstore::{ChunkAddress, LocalStoreArgs, ModeSet};

/// Default data directory, relative to the working directory.
pub(crate) const DEFAULT_DATADIR: &str = "vertex-data";

/// Vertex local store - inspect and drive chunk state transitions
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Logging configuration
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    /// Path to a TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    /// Database configuration
    #[command(flatten)]
    pub(crate) database: DatabaseArgs,

    /// Local store configuration
    #[command(flatten)]
    pub(crate) localstore: LocalStoreArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Logging configuration
#[derive(Debug, Args, Clone)]
#[command(next_help_heading = "Logging")]
pub(crate) struct LogArgs {
    /// Silence all output
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbosity: u8,

    /// Emit logs as JSON
    #[arg(long = "log.json", global = true)]
    pub(crate) json: bool,

    /// Log filter
    #[arg(long = "log.filter", global = true, value_name = "DIRECTIVE")]
    pub(crate) filter: Option<String>,
}

/// Database configuration
#[derive(Debug, Default, Args, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[command(next_help_heading = "Database")]
#[serde(default)]
pub(crate) struct DatabaseArgs {
    /// Directory holding the store file
    #[arg(long = "datadir", global = true, value_name = "DIR")]
    pub(crate) datadir: Option<PathBuf>,

    /// Use in-memory database (no persistence).
    #[arg(long = "db.memory", global = true)]
    pub(crate) memory_only: bool,
}

impl DatabaseArgs {
    /// Path of the redb file.
    pub(crate) fn database_path(&self) -> PathBuf {
        self.datadir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATADIR))
            .join("localstore.redb")
    }
}

/// Local store commands
#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Store a chunk so it can be pulled and pushed
    Put {
        /// Chunk address (hex)
        address: ChunkAddress,

        /// Chunk payload as UTF-8 text
        #[arg(long, default_value = "")]
        data: String,
    },

    /// Apply a mode-set transition to one or more chunks
    Set {
        /// Transition: access, sync or remove
        mode: ModeSet,

        /// Chunk addresses (hex)
        #[arg(required = true)]
        addresses: Vec<ChunkAddress>,
    },

    /// Show the stored record of a chunk
    Get {
        /// Chunk address (hex)
        address: ChunkAddress,
    },

    /// Print the GC size counter
    GcSize,

    /// List eviction candidates, least recently accessed first
    GcList {
        /// Maximum number of entries to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Verify that the GC size counter matches the GC index
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        let address = "11".repeat(32);
        let cli = Cli::parse_from([
            "vertex-localstore",
            "--localstore.composite-index",
            "set",
            "sync",
            address.as_str(),
            "--datadir",
            "/tmp/store",
        ]);

        assert!(cli.localstore.composite_index);
        assert_eq!(cli.database.datadir, Some(PathBuf::from("/tmp/store")));
        match cli.command {
            Commands::Set { mode, addresses } => {
                assert_eq!(mode, ModeSet::Sync);
                assert_eq!(addresses, vec![ChunkAddress::new([0x11; 32])]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let address = "11".repeat(32);
        assert!(Cli::try_parse_from(["vertex-localstore", "set", "evict", address.as_str()]).is_err());
    }

    #[test]
    fn test_database_path() {
        assert_eq!(
            DatabaseArgs::default().database_path(),
            PathBuf::from("vertex-data/localstore.redb")
        );
    }
}
