use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use adlink::api::{self, AppState};
use adlink::config;
use adlink::db;
use adlink::matching::Matcher;
use adlink::mirror;
use adlink::yodeck::{MediaSource, YodeckClient};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let matcher = Matcher::from_config(&cfg.matching);
    let mut state = AppState::new(pool.clone(), matcher.clone());

    if let Some(yodeck) = &cfg.yodeck {
        let source: Arc<dyn MediaSource> = Arc::new(YodeckClient::from_config(yodeck)?);
        let auto_link = cfg.matching.auto_link_on_sync;
        state = state.with_source(Arc::clone(&source), auto_link);

        // Periodic mirror refresh; a failed run is retried on the next tick.
        let every = Duration::from_secs(yodeck.sync_interval_secs);
        let worker_pool = pool.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(err) =
                    mirror::refresh(&worker_pool, source.as_ref(), &matcher, auto_link).await
                {
                    error!(?err, "mirror refresh failed");
                }
            }
        });
    } else {
        info!("yodeck not configured; mirror sync disabled");
    }

    let addr = cfg.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "starting adlink api");
    axum::serve(listener, api::build_router(state))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(?err, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;
    info!("adlink api stopped");
    Ok(())
}
