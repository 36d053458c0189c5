//! `livecheck replay`: run a recorded feed through a session and render it.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use livecheckd::{
    run_feed, spawn_presenter, spawn_session, Config, FeedReader, JsonLinesPresenter,
    ReplayModel, TablePresenter,
};
use tokio::io::BufReader;

use crate::Format;

/// Exit code is success only if every checklist step ended complete.
pub async fn run(
    file: &Path,
    format: Format,
    config_path: Option<&Path>,
    exit_when_complete: bool,
) -> Result<ExitCode> {
    let mut config = Config::load(config_path).context("failed to load configuration")?;
    config.exit_when_complete |= exit_when_complete;

    let feed = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("failed to open {}", file.display()))?;
    let mut reader = FeedReader::new(BufReader::new(feed));
    let mut model = ReplayModel::new(config.detector.clone());

    let session = spawn_session(config.tracker.clone());
    let presenter = match format {
        Format::Table => spawn_presenter(session.subscribe(), TablePresenter::new(std::io::stdout())),
        Format::Json => spawn_presenter(
            session.subscribe(),
            JsonLinesPresenter::new(std::io::stdout()),
        ),
    };

    let summary = run_feed(&mut reader, &mut model, &session, &config)
        .await
        .with_context(|| format!("failed to replay {}", file.display()))?;

    session.shutdown().await?;
    presenter.await??;

    let snapshot = summary.final_snapshot;
    tracing::info!(
        frames = summary.frames,
        malformed_lines = summary.malformed_lines,
        completed_early = summary.completed_early,
        blink_count = snapshot.blink_count,
        "replay finished"
    );

    if snapshot.all_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        let missing: Vec<_> = livecheck_core::Step::ALL
            .into_iter()
            .filter(|s| !snapshot.is_complete(*s))
            .map(|s| s.label())
            .collect();
        eprintln!("liveness check incomplete: {}", missing.join(", "));
        Ok(ExitCode::FAILURE)
    }
}
