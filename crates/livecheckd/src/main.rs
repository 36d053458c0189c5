use anyhow::{Context, Result};
use livecheckd::{
    run_feed, spawn_presenter, spawn_session, Config, FeedReader, JsonLinesPresenter, ReplayModel,
};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries checklist updates; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(None).context("failed to load configuration")?;
    tracing::info!(
        fps = config.fps,
        max_blinks = config.tracker.max_blinks,
        blink_delay_ms = config.tracker.blink_delay.as_millis() as u64,
        "livecheckd starting"
    );

    let session = spawn_session(config.tracker.clone());
    let presenter = spawn_presenter(
        session.subscribe(),
        JsonLinesPresenter::new(std::io::stdout()),
    );

    let mut reader = FeedReader::new(BufReader::new(tokio::io::stdin()));
    let mut model = ReplayModel::new(config.detector.clone());

    let summary = tokio::select! {
        summary = run_feed(&mut reader, &mut model, &session, &config) => summary?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            session.shutdown().await?;
            presenter.await??;
            return Ok(());
        }
    };

    session.shutdown().await?;
    presenter.await??;

    tracing::info!(
        frames = summary.frames,
        malformed_lines = summary.malformed_lines,
        blink_count = summary.final_snapshot.blink_count,
        passed = summary.final_snapshot.all_complete(),
        "livecheckd shutting down"
    );

    Ok(())
}
