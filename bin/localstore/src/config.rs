//! Figment-based configuration loading.
//!
//! Configuration priority (highest wins):
//! 1. CLI arguments given explicitly (applied after Figment load)
//! 2. Config file (TOML)
//! 3. Environment variables (`VERTEX_` prefix, `__` between sections)
//! 4. Defaults

use std::path::Path;

use clap::ArgMatches;
use clap::parser::ValueSource;
use eyre::{Result, WrapErr};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use vertex_swarm_localstore::LocalStoreArgs;

use crate::cli::{Cli, DatabaseArgs};

/// Complete tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    /// Database configuration.
    pub(crate) database: DatabaseArgs,

    /// Local store configuration.
    pub(crate) localstore: LocalStoreArgs,
}

impl Config {
    /// Load configuration from defaults, environment, and config file.
    pub(crate) fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("VERTEX_").split("__"));

        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment.extract().wrap_err("Failed to load configuration")
    }

    /// Override loaded values with arguments set on the command line.
    pub(crate) fn apply_cli(&mut self, cli: &Cli, matches: &ArgMatches) {
        let explicit = |id: &str| {
            matches
                .value_source(id)
                .is_some_and(|source| source != ValueSource::DefaultValue)
        };

        if explicit("datadir") {
            self.database.datadir.clone_from(&cli.database.datadir);
        }
        if explicit("memory_only") {
            self.database.memory_only = cli.database.memory_only;
        }
        if explicit("composite_index") {
            self.localstore.composite_index = cli.localstore.composite_index;
        }
        if explicit("lock_timeout_ms") {
            self.localstore.lock_timeout_ms = cli.localstore.lock_timeout_ms;
        }
    }
}
