//! concent-arbiter: HTTP server for the Force/Ack/Reject arbiter.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use concent_arbiter::codec::Ed25519Codec;
use concent_arbiter::config::ArbiterConfig;
use concent_arbiter::engine::ArbitrationEngine;
use concent_arbiter::http::{self, AppState};
use concent_arbiter::store::InMemoryStore;
use concent_arbiter::SystemClock;

/// Trusted arbiter for the ForceReportComputedTask / Ack / Reject handshake
#[derive(Parser)]
#[command(name = "concent-arbiter")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, env = "CONCENT_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file and CONCENT_BIND
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ArbiterConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ArbiterConfig::default(),
    };
    config.apply_env()?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    config.validate()?;

    let codec = Ed25519Codec::new(config.signing_key()?);
    let engine = ArbitrationEngine::new(Arc::new(InMemoryStore::new()), Arc::new(codec))
        .with_messaging_time(config.concent_messaging_time)
        .with_retry_policy(config.retry.to_policy());
    tracing::info!(
        arbiter_key = %engine.arbiter_key(),
        concent_messaging_time = engine.messaging_time(),
        "arbiter configured"
    );

    let state = Arc::new(AppState::new(engine, Arc::new(SystemClock)));
    let fatal = state.fatal();
    let app = http::router(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Server started on {}", listener.local_addr()?);

    let failed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&failed);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("shutdown requested"),
                _ = fatal.notified() => flag.store(true, Ordering::SeqCst),
            }
        })
        .await?;

    if failed.load(Ordering::SeqCst) {
        anyhow::bail!("stopped after unrecoverable persistence failure");
    }
    Ok(())
}

/// Initialize production logging
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
