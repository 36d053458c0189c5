//! Recorded detection feeds.
//!
//! A feed is JSON lines, one record per camera frame, as written by an
//! external detector process:
//!
//! ```text
//! {"timestamp_ms": 0, "faces": [{"left_eye_open": 0.9, "right_eye_open": 0.9, "smiling": 0.1}]}
//! {"timestamp_ms": 66, "error": "detector busy"}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Records are replayed
//! in real time so that blink confirmations fire between frames exactly as
//! they would against a live camera.

use livecheck_core::{
    DetectionError, DetectionResult, DetectorOptions, FaceModel, FaceObservation, Snapshot,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::Config;
use crate::engine::{EngineError, SessionHandle};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: invalid record: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// One frame's worth of detector output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Milliseconds since the start of the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    #[serde(default)]
    pub faces: Vec<FaceObservation>,
    /// Set when the detector failed on this frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Line-oriented reader over a JSON-lines feed.
pub struct FeedReader<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin> FeedReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }

    /// Next record, `Ok(None)` at end of feed.
    ///
    /// A malformed line yields `FeedError::Parse`; the reader stays usable and
    /// the following call continues with the next line.
    pub async fn next_record(&mut self) -> Result<Option<FrameRecord>, FeedError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return serde_json::from_str(line)
                .map(Some)
                .map_err(|source| FeedError::Parse {
                    line: self.line_no,
                    source,
                });
        }
        Ok(None)
    }
}

/// Face model backed by recorded detector output.
pub struct ReplayModel {
    options: DetectorOptions,
}

impl ReplayModel {
    pub fn new(options: DetectorOptions) -> Self {
        Self { options }
    }
}

impl FaceModel for ReplayModel {
    type Frame = FrameRecord;

    fn detect(&mut self, frame: &FrameRecord) -> DetectionResult {
        if let Some(msg) = &frame.error {
            return Err(DetectionError::Model(msg.clone()));
        }
        Ok(frame
            .faces
            .iter()
            .filter(|f| {
                f.relative_size()
                    .map_or(true, |size| size >= self.options.min_face_size)
            })
            .cloned()
            .collect())
    }
}

/// Outcome of running a whole feed through a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSummary {
    pub frames: u64,
    pub malformed_lines: u64,
    /// Reading stopped because every step completed.
    pub completed_early: bool,
    pub final_snapshot: Snapshot,
}

/// Replay a feed through `session`, paced in real time.
///
/// Records with `timestamp_ms` are observed at that offset from the start;
/// records without one follow at `config.frame_interval()` spacing. At end of
/// feed any pending blink confirmation is awaited before returning.
pub async fn run_feed<R, M>(
    reader: &mut FeedReader<R>,
    model: &mut M,
    session: &SessionHandle,
    config: &Config,
) -> Result<FeedSummary, FeedError>
where
    R: AsyncBufRead + Unpin,
    M: FaceModel<Frame = FrameRecord>,
{
    let start = Instant::now();
    let interval = config.frame_interval();
    let mut frames = 0u64;
    let mut malformed_lines = 0u64;

    loop {
        let record = match reader.next_record().await {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(FeedError::Parse { line, source }) => {
                malformed_lines += 1;
                tracing::warn!(line, error = %source, "skipping malformed feed line");
                continue;
            }
            Err(e) => return Err(e),
        };

        let offset = match record.timestamp_ms {
            Some(ms) => std::time::Duration::from_millis(ms),
            None => interval * frames as u32,
        };
        tokio::time::sleep_until(start + offset).await;

        let result = model.detect(&record);
        let snapshot = session.observe(result).await?;
        frames += 1;

        if config.exit_when_complete && snapshot.all_complete() {
            tracing::info!(frames, "all steps complete, stopping feed");
            return Ok(FeedSummary {
                frames,
                malformed_lines,
                completed_early: true,
                final_snapshot: snapshot,
            });
        }
    }

    let final_snapshot = settle(session.subscribe()).await?;
    tracing::info!(frames, malformed_lines, "feed finished");

    Ok(FeedSummary {
        frames,
        malformed_lines,
        completed_early: false,
        final_snapshot,
    })
}

/// Wait until no blink confirmation is outstanding.
async fn settle(mut updates: watch::Receiver<Snapshot>) -> Result<Snapshot, EngineError> {
    loop {
        let snapshot = *updates.borrow_and_update();
        let Some(ticket) = snapshot.pending_blink() else {
            return Ok(snapshot);
        };
        match tokio::time::timeout(ticket.delay * 2, updates.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => return Err(EngineError::ChannelClosed),
            Err(_) => {
                tracing::warn!(ticket = ticket.id(), "blink confirmation did not arrive");
                return Ok(snapshot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_session;
    use livecheck_core::Step;

    fn reader(text: &'static str) -> FeedReader<&'static [u8]> {
        FeedReader::new(text.as_bytes())
    }

    #[tokio::test]
    async fn test_reader_skips_blank_and_comment_lines() {
        let mut r = reader(
            "# recorded at 15 fps\n\n{\"timestamp_ms\": 5, \"faces\": []}\n",
        );
        let record = r.next_record().await.unwrap().unwrap();
        assert_eq!(record.timestamp_ms, Some(5));
        assert!(record.faces.is_empty());
        assert!(r.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_reports_line_and_continues() {
        let mut r = reader("{\"faces\": []}\nnot json\n{\"error\": \"busy\"}\n");
        assert!(r.next_record().await.unwrap().is_some());
        let err = r.next_record().await.unwrap_err();
        assert!(matches!(err, FeedError::Parse { line: 2, .. }));
        let record = r.next_record().await.unwrap().unwrap();
        assert_eq!(record.error.as_deref(), Some("busy"));
    }

    #[test]
    fn test_replay_model_error_record() {
        let mut model = ReplayModel::new(DetectorOptions::default());
        let record = FrameRecord {
            error: Some("camera stalled".into()),
            ..Default::default()
        };
        assert_eq!(
            model.detect(&record),
            Err(DetectionError::Model("camera stalled".into()))
        );
    }

    #[test]
    fn test_replay_model_drops_small_faces() {
        let mut model = ReplayModel::new(DetectorOptions { min_face_size: 0.1 });
        let record = FrameRecord {
            faces: vec![
                FaceObservation::new(0.9, 0.9, 0.5).with_bounds(0.3, 0.4),
                FaceObservation::new(0.9, 0.9, 0.5).with_bounds(0.05, 0.06),
                FaceObservation::new(0.9, 0.9, 0.5),
            ],
            ..Default::default()
        };
        let faces = model.detect(&record).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].bounds.unwrap().width, 0.3);
        assert!(faces[1].bounds.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_feed_counts_blink_after_last_frame() {
        let config = Config::default();
        let session = spawn_session(config.tracker.clone());
        let mut model = ReplayModel::new(config.detector.clone());
        let mut r = reader(concat!(
            "{\"faces\": [{\"left_eye_open\": 0.9, \"right_eye_open\": 0.9, \"smiling\": 0.8}]}\n",
            "garbage\n",
            "{\"faces\": [{\"left_eye_open\": 0.0, \"right_eye_open\": 0.0, \"smiling\": 0.8}]}\n",
        ));

        let summary = run_feed(&mut r, &mut model, &session, &config).await.unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.malformed_lines, 1);
        assert!(!summary.completed_early);
        assert_eq!(summary.final_snapshot.blink_count, 1);
        assert!(summary.final_snapshot.all_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_feed_paces_by_timestamp() {
        let config = Config::default();
        let session = spawn_session(config.tracker.clone());
        let mut model = ReplayModel::new(config.detector.clone());
        let mut r = reader(concat!(
            "{\"timestamp_ms\": 0, \"faces\": [{\"left_eye_open\": 0.0, \"right_eye_open\": 0.0, \"smiling\": 0.0}]}\n",
            "{\"timestamp_ms\": 500, \"faces\": [{\"left_eye_open\": 0.0, \"right_eye_open\": 0.0, \"smiling\": 0.0}]}\n",
            "{\"timestamp_ms\": 1200, \"faces\": [{\"left_eye_open\": 0.0, \"right_eye_open\": 0.0, \"smiling\": 0.0}]}\n",
        ));

        let start = Instant::now();
        let summary = run_feed(&mut r, &mut model, &session, &config).await.unwrap();
        // Blinks at 0ms and 1200ms; the 500ms frame falls in the first window
        assert_eq!(summary.final_snapshot.blink_count, 2);
        assert!(start.elapsed() >= std::time::Duration::from_millis(2200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_feed_exits_when_complete() {
        let config = Config {
            exit_when_complete: true,
            ..Default::default()
        };
        let session = spawn_session(config.tracker.clone());
        let mut model = ReplayModel::new(config.detector.clone());
        let mut r = reader(concat!(
            "{\"timestamp_ms\": 0, \"faces\": [{\"left_eye_open\": 0.0, \"right_eye_open\": 0.0, \"smiling\": 0.9}]}\n",
            "{\"timestamp_ms\": 1100, \"faces\": [{\"left_eye_open\": 0.9, \"right_eye_open\": 0.9, \"smiling\": 0.9}]}\n",
            "{\"timestamp_ms\": 1200, \"faces\": []}\n",
        ));

        let summary = run_feed(&mut r, &mut model, &session, &config).await.unwrap();
        assert!(summary.completed_early);
        assert_eq!(summary.frames, 2);
        assert!(summary.final_snapshot.is_complete(Step::FacePresence));
    }
}
