//! Birthday Daemon - serves `GET /{name}` from an LRU-cached birthday store

mod handler;
mod http;
mod server;

use anyhow::{Context, Result};
use birthdaystore::{Birthday, BirthdayStore, Name};
use chrono::NaiveDate;
use clap::Parser;
use lancslru::Cache;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::handler::BirthdayHandler;

/// Birthdays written to the store on every start
const INITIAL_BIRTHDAYS: &[(&str, (i32, u32, u32))] = &[
    ("lewis", (2002, 1, 22)),
    ("noah", (1999, 10, 13)),
    ("finn", (2000, 8, 11)),
    ("sabrina", (2002, 6, 6)),
    ("leanne", (1995, 9, 19)),
];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Data directory
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    /// Cache capacity (number of names)
    #[arg(short, long, default_value_t = 2)]
    capacity: usize,

    /// Seconds open connections get to finish after shutdown starts
    #[arg(long, default_value_t = 5)]
    grace_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("Starting Birthday Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", args.data.display());
    info!("Cache capacity: {}", args.capacity);

    let store = BirthdayStore::open(&args.data)
        .with_context(|| format!("opening birthday store in {}", args.data.display()))?;
    let store = Arc::new(store);

    store
        .upsert_all(initial_birthdays()?)
        .context("inserting birthday set")?;
    info!(count = store.len(), "Birthday store ready");

    let cache = Arc::new(Cache::new(args.capacity).context("creating cache")?);
    let handler = BirthdayHandler::new(cache, Arc::clone(&store));

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!("Server listening on {}", listener.local_addr()?);

    let served = server::serve(
        listener,
        handler,
        shutdown_signal(),
        Duration::from_secs(args.grace_secs),
    )
    .await;

    store.close().context("closing birthday store")?;
    info!("Shutdown complete");

    served
}

fn initial_birthdays() -> Result<Vec<(Name, Birthday)>> {
    INITIAL_BIRTHDAYS
        .iter()
        .map(|&(name, (y, m, d))| {
            let date = NaiveDate::from_ymd_opt(y, m, d)
                .with_context(|| format!("invalid seed date for {}", name))?;
            Ok((Name::from(name), Birthday::new(date)))
        })
        .collect()
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
