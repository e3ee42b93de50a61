use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use adlink::config;
use adlink::db;
use adlink::matching::Matcher;
use adlink::mirror;
use adlink::yodeck::YodeckClient;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Refresh the media mirror from Yodeck once and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Link new items whose best suggestion is high-confidence (overrides config)
    #[arg(long)]
    auto_link: bool,
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
    let yodeck = cfg
        .yodeck
        .as_ref()
        .context("config has no yodeck section; nothing to sync")?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    if let Some(last) = db::last_sync_run(&pool).await? {
        info!(
            run_id = last.id,
            started_at = %last.started_at,
            error = last.error.as_deref().unwrap_or("-"),
            "previous sync run"
        );
    }

    let source = YodeckClient::from_config(yodeck)?;
    let matcher = Matcher::from_config(&cfg.matching);
    let auto_link = args.auto_link || cfg.matching.auto_link_on_sync;
    let report = mirror::refresh(&pool, &source, &matcher, auto_link).await?;

    let summary = db::summary(&pool, true).await?;
    info!(
        seen = report.media_seen,
        new = report.media_new,
        updated = report.media_updated,
        auto_linked = report.auto_linked,
        linked = summary.linked,
        unlinked = summary.unlinked,
        archived = summary.archived,
        "mirror sync completed"
    );
    Ok(())
}
