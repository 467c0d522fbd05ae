//! Umbra: a blocking DNS resolver.
//!
//! Wires the pieces together: storage, blacklist (warmed from storage),
//! answer cache with its sweeper, the history flusher, the racing
//! upstream resolver, source subscriptions, the HTTP control surface,
//! and the UDP/TCP listeners.
//!
//! Shutdown order matters: the DNS listeners drain first so that
//! history for in-flight queries is still accepted, then the background
//! tasks (sweeper, flusher, trim, control) are stopped.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use umbra_blacklist::Blacklist;
use umbra_cache::AnswerCache;
use umbra_history::HistoryLogger;
use umbra_resolver::{default_upstreams, Lookup, RacingResolver};
use umbra_server::{ControlServer, ControlState, DnsServer, Pipeline, ServerStats};
use umbra_source::{Downloader, SourceProvider};
use umbra_store::Store;

/// Umbra - DNS resolver that blackholes unwanted domains
#[derive(Parser, Debug)]
#[command(name = "umbra", version, about)]
struct Cli {
    /// DNS listen address (UDP and TCP).
    #[arg(long, default_value = "0.0.0.0:53")]
    dns_addr: SocketAddr,

    /// Control/debug HTTP listen address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    control_addr: SocketAddr,

    /// SQLite database path.
    #[arg(long, default_value = "./umbra.sqlite3")]
    database: String,

    /// History rows kept by the periodic trim.
    #[arg(long, default_value_t = 100)]
    history_size: u32,

    /// Blacklist shard count, rounded up to a power of two.
    #[arg(long, default_value_t = 256)]
    shards: usize,

    /// TTL in seconds stamped onto blocked replies.
    #[arg(long, default_value_t = 10)]
    block_ttl: u32,

    /// Upstream resolver address, host:port. Repeatable; the default
    /// public set is used when none are given.
    #[arg(long = "upstream")]
    upstreams: Vec<SocketAddr>,

    /// Log filter (tracing EnvFilter syntax).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON logs.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    debug!(path = %cli.database, "opening the database");
    let store = Arc::new(
        Store::open(&cli.database, cli.history_size)
            .await
            .context("unable to open the database")?,
    );
    store
        .migrate()
        .await
        .context("unable to migrate the database")?;
    debug!("database schema is up to date");

    // Listeners drain on this one; background tasks stop on the second,
    // after the listeners are gone.
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (background_tx, _) = broadcast::channel::<()>(1);

    let blacklist = Arc::new(Blacklist::new(cli.shards));
    let cache = Arc::new(AnswerCache::new());
    let stats = Arc::new(ServerStats::new());

    let sweeper_task = cache.run_sweeper(background_tx.subscribe());
    let cleanup_task = store.run_periodic_cleanup(background_tx.subscribe());
    let (history, history_task) = HistoryLogger::spawn(store.clone(), background_tx.subscribe());

    let resolver: Arc<dyn Lookup> = Arc::new(RacingResolver::new(if cli.upstreams.is_empty() {
        default_upstreams()
    } else {
        cli.upstreams.clone()
    }));

    // Refreshed chunks go to storage and straight into the live
    // blacklist; restarts rebuild the blacklist from storage below.
    let sink_target = blacklist.clone();
    let provider = Arc::new(
        SourceProvider::new(store.clone(), Downloader::new()).with_domain_sink(Arc::new(
            move |chunk| {
                sink_target.add(chunk);
            },
        )),
    );

    let refresh_target = Arc::downgrade(&provider);
    provider.on_refresh_source(Arc::new(move |url| {
        let Some(provider) = refresh_target.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = provider.refresh_from_source(&url).await {
                error!(url, error = %err, "source refresh failed");
            }
        });
    }));

    // Warm the blacklist from storage without delaying startup.
    {
        let store = store.clone();
        let blacklist = blacklist.clone();
        tokio::spawn(async move {
            debug!("populating blacklist from the database");
            match store
                .for_each_domain(|domain| {
                    blacklist.add([domain]);
                })
                .await
            {
                Ok(()) => debug!(domains = blacklist.stats().domains, "blacklist is warm"),
                Err(err) => error!(error = %err, "unable to populate blacklist"),
            }
        });
    }

    let control = ControlServer::new(Arc::new(ControlState {
        blacklist: blacklist.clone(),
        cache: cache.clone(),
        stats: stats.clone(),
        sources: provider.clone(),
    }));
    let control_addr = cli.control_addr;
    let control_shutdown = background_tx.subscribe();
    let control_task = tokio::spawn(async move {
        if let Err(err) = control.run(control_addr, control_shutdown).await {
            error!(error = %err, "control listener failed");
        }
    });

    let pipeline = Arc::new(Pipeline::new(
        cache,
        blacklist,
        resolver,
        history,
        stats,
        cli.block_ttl,
    ));
    let server = DnsServer::bind(cli.dns_addr, pipeline)
        .await
        .context("unable to bind DNS listeners")?;

    let signal_target = shutdown_tx.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => info!("shutdown signal received"),
            Err(err) => error!(error = %err, "unable to listen for signals"),
        }
        let _ = signal_target.send(());
    });

    info!(addr = %cli.dns_addr, "starting DNS server");
    server.run(shutdown_tx.subscribe()).await?;

    // Listeners are drained; stop the background tasks.
    let _ = background_tx.send(());
    let _ = sweeper_task.await;
    let _ = history_task.await;
    let _ = cleanup_task.await;
    let _ = control_task.await;

    info!("shutdown complete");
    Ok(())
}
