use anyhow::{Context, Result};
use covid_ingest::{pipeline, Config};
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) load config ──────────────────────────────────────────────
    let config = Config::from_env().context("loading configuration")?;
    info!(
        table = %config.table,
        sources = config.sources.len(),
        "configured"
    );

    // ─── 3) fetch, reshape, merge, write ─────────────────────────────
    let start = Instant::now();
    let summary = pipeline::run(&config)
        .await
        .with_context(|| format!("loading table `{}`", config.table))?;

    info!(
        table = %summary.table,
        rows = summary.rows,
        labels = ?summary.labels,
        elapsed = ?start.elapsed(),
        "all done"
    );
    Ok(())
}
