//! Local store CLI arguments.

use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{LayoutMode, locks::DEFAULT_ADDRESS_LOCK_TIMEOUT};

/// Local store settings, independent of where they come from.
pub trait LocalStoreConfig {
    /// Layout of the canonical retrieval record.
    fn layout(&self) -> LayoutMode;

    /// How long a transition waits for an address held by another one.
    fn address_lock_timeout(&self) -> Duration;
}

/// Local store configuration arguments.
#[derive(Debug, Args, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[command(next_help_heading = "Local Store")]
#[serde(default)]
pub struct LocalStoreArgs {
    /// Keep payload and timestamps in a single composite index instead of
    /// separate data and access indexes.
    #[arg(long = "localstore.composite-index")]
    pub composite_index: bool,

    /// Milliseconds to wait for a chunk locked by another transition.
    #[arg(
        long = "localstore.lock-timeout-ms",
        default_value_t = DEFAULT_ADDRESS_LOCK_TIMEOUT.as_millis() as u64
    )]
    pub lock_timeout_ms: u64,
}

impl Default for LocalStoreArgs {
    fn default() -> Self {
        Self {
            composite_index: false,
            lock_timeout_ms: DEFAULT_ADDRESS_LOCK_TIMEOUT.as_millis() as u64,
        }
    }
}

impl LocalStoreConfig for LocalStoreArgs {
    fn layout(&self) -> LayoutMode {
        if self.composite_index {
            LayoutMode::Composite
        } else {
            LayoutMode::Split
        }
    }

    fn address_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        localstore: LocalStoreArgs,
    }

    #[test]
    fn test_defaults_match_cli() {
        let cli = Cli::parse_from(["test"]);
        assert_eq!(cli.localstore, LocalStoreArgs::default());
        assert_eq!(cli.localstore.layout(), LayoutMode::Split);
        assert_eq!(cli.localstore.address_lock_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "test",
            "--localstore.composite-index",
            "--localstore.lock-timeout-ms",
            "250",
        ]);
        assert_eq!(cli.localstore.layout(), LayoutMode::Composite);
        assert_eq!(cli.localstore.address_lock_timeout(), Duration::from_millis(250));
    }
}
