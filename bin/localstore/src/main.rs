//! Vertex local store operator tool.

mod cli;
mod config;
mod logging;

use std::fs;
use std::ops::ControlFlow;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use eyre::{WrapErr, bail};
use tracing::info;
use vertex_storage::{KvStore, MemoryStore};
use vertex_storage_redb::RedbStore;
use vertex_swarm_localstore::{ChunkItem, LocalStore};

use crate::cli::{Cli, Commands};
use crate::config::Config;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    logging::init_logging(&cli.logs)?;

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(&cli, &matches);

    if config.database.memory_only {
        info!("using in-memory database");
        run(Arc::new(MemoryStore::new()), &config, cli.command)
    } else {
        let path = config.database.database_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .wrap_err_with(|| format!("Failed to create data directory {}", dir.display()))?;
        }
        let store = RedbStore::open(&path)
            .wrap_err_with(|| format!("Failed to open database {}", path.display()))?;
        info!(path = %path.display(), "opened database");
        run(Arc::new(store), &config, cli.command)
    }
}

fn run<S: KvStore + 'static>(store: Arc<S>, config: &Config, command: Commands) -> eyre::Result<()> {
    let store = LocalStore::open(store, &config.localstore)?;

    match command {
        Commands::Put { address, data } => {
            store.put(&ChunkItem::new(address).with_data(data.into_bytes()))?;
            println!("stored {address}");
        }
        Commands::Set { mode, addresses } => {
            let setter = store.new_setter(mode);
            for address in &addresses {
                setter
                    .set(address)
                    .wrap_err_with(|| format!("{mode} {address}"))?;
                println!("{mode} {address}");
            }
        }
        Commands::Get { address } => {
            let item = store.get(&address)?;
            println!("address:          {}", item.address);
            println!("store timestamp:  {}", item.store_timestamp);
            println!("access timestamp: {}", item.access_timestamp);
            println!("size:             {}", item.data.len());
        }
        Commands::GcSize => {
            println!("{}", store.gc_size());
        }
        Commands::GcList { limit } => {
            let mut remaining = limit;
            store.gc_index().iterate(None, |item| {
                if remaining == 0 {
                    return ControlFlow::Break(());
                }
                remaining -= 1;
                println!("{} {}", item.access_timestamp, item.address);
                ControlFlow::Continue(())
            })?;
        }
        Commands::Check => {
            let check = store.check_gc_size()?;
            if !check.is_consistent() {
                bail!(
                    "gc size counter is {} but the gc index holds {} entries",
                    check.counter,
                    check.indexed
                );
            }
            println!("ok: {} gc entries", check.indexed);
        }
    }

    Ok(())
}
