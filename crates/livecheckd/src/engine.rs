use livecheck_core::{BlinkTicket, DetectionResult, LivenessTracker, Snapshot, TrackerConfig};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("session task exited")]
    ChannelClosed,
}

/// Messages sent from handles to the session task.
enum SessionRequest {
    Observe {
        result: DetectionResult,
        reply: oneshot::Sender<Snapshot>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    Reset {
        reply: oneshot::Sender<Snapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to a liveness session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
    updates: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    /// Feed one frame's detection result to the tracker.
    pub async fn observe(&self, result: DetectionResult) -> Result<Snapshot, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionRequest::Observe {
            result,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn snapshot(&self) -> Result<Snapshot, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionRequest::Snapshot { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Clear all steps and cancel any pending blink confirmation.
    pub async fn reset(&self) -> Result<Snapshot, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionRequest::Reset { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Stop the session. Pending blink confirmations are dropped.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionRequest::Shutdown { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Receive every state change, including timer-driven blink confirmations.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.updates.clone()
    }

    async fn send(&self, req: SessionRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// The one outstanding blink timer, aborted when replaced or dropped.
struct PendingBlink {
    ticket: BlinkTicket,
    task: JoinHandle<()>,
}

impl Drop for PendingBlink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a liveness session on the current tokio runtime.
///
/// The session task owns the tracker. Frame observations, blink timer
/// firings and resets are all applied on that task, one at a time. The task
/// exits on `shutdown` or when every handle has been dropped.
pub fn spawn_session(config: TrackerConfig) -> SessionHandle {
    let mut tracker = LivenessTracker::new(config);
    let (tx, mut rx) = mpsc::channel::<SessionRequest>(16);
    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel::<BlinkTicket>();
    let (updates_tx, updates_rx) = watch::channel(tracker.snapshot());

    tokio::spawn(async move {
        tracing::info!("session started");
        let mut pending: Option<PendingBlink> = None;

        loop {
            tokio::select! {
                biased;

                Some(ticket) = timer_rx.recv() => {
                    if pending.as_ref().is_some_and(|p| p.ticket == ticket) {
                        pending = None;
                    }
                    if let Some(snapshot) = tracker.confirm_blink(ticket) {
                        updates_tx.send_replace(snapshot);
                    }
                }
                req = rx.recv() => {
                    let Some(req) = req else { break };
                    match req {
                        SessionRequest::Observe { result, reply } => {
                            let snapshot = tracker.observe(&result);
                            schedule_blink(&mut pending, &snapshot, &timer_tx);
                            updates_tx.send_replace(snapshot);
                            let _ = reply.send(snapshot);
                        }
                        SessionRequest::Snapshot { reply } => {
                            let _ = reply.send(tracker.snapshot());
                        }
                        SessionRequest::Reset { reply } => {
                            pending = None;
                            let snapshot = tracker.reset();
                            updates_tx.send_replace(snapshot);
                            let _ = reply.send(snapshot);
                        }
                        SessionRequest::Shutdown { reply } => {
                            drop(pending.take());
                            let _ = reply.send(());
                            break;
                        }
                    }
                }
            }
        }

        let stats = tracker.stats();
        tracing::info!(
            frames = stats.frames_observed,
            skipped = stats.frames_skipped,
            ambiguous = stats.frames_ambiguous,
            blink_count = tracker.state().blink_count,
            "session ended"
        );
    });

    SessionHandle {
        tx,
        updates: updates_rx,
    }
}

/// Start a timer for a newly issued ticket. Re-observing an already
/// scheduled ticket leaves the running timer alone.
fn schedule_blink(
    pending: &mut Option<PendingBlink>,
    snapshot: &Snapshot,
    timer_tx: &mpsc::UnboundedSender<BlinkTicket>,
) {
    let Some(ticket) = snapshot.pending_blink() else {
        return;
    };
    if pending.as_ref().is_some_and(|p| p.ticket == ticket) {
        return;
    }

    let timer_tx = timer_tx.clone();
    let task = tokio::spawn(async move {
        tokio::time::sleep(ticket.delay).await;
        // Receiver is gone once the session ends; nothing to confirm then.
        let _ = timer_tx.send(ticket);
    });
    *pending = Some(PendingBlink { ticket, task });
}

#[cfg(test)]
mod tests {
    use super::*;
    use livecheck_core::{BlinkPhase, DetectionError, FaceObservation, Step};
    use std::time::Duration;

    fn one_face(left: f32, right: f32, smile: f32) -> DetectionResult {
        Ok(vec![FaceObservation::new(left, right, smile)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_blink_confirmed_after_delay() {
        let session = spawn_session(TrackerConfig::default());

        let snap = session.observe(one_face(0.0, 0.0, 0.1)).await.unwrap();
        assert!(matches!(snap.blink_phase, BlinkPhase::Debouncing(_)));
        assert_eq!(snap.blink_count, 0);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(session.snapshot().await.unwrap().blink_count, 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        let snap = session.snapshot().await.unwrap();
        assert_eq!(snap.blink_count, 1);
        assert!(snap.is_complete(Step::Blink));
        assert_eq!(snap.blink_phase, BlinkPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_closure_counts_once_per_window() {
        let session = spawn_session(TrackerConfig::default());

        // 15 fps of closed eyes for 2.5 seconds
        for _ in 0..38 {
            session.observe(one_face(0.0, 0.0, 0.1)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(66)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Debounce windows open at 0ms, 1056ms and 2112ms
        let snap = session.snapshot().await.unwrap();
        assert_eq!(snap.blink_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_sees_timer_update() {
        let session = spawn_session(TrackerConfig::default());
        let mut updates = session.subscribe();

        session.observe(one_face(0.0, 0.0, 0.9)).await.unwrap();
        updates.borrow_and_update();

        updates.changed().await.unwrap();
        let snap = *updates.borrow();
        assert_eq!(snap.blink_count, 1);
        assert!(snap.all_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_blink() {
        let session = spawn_session(TrackerConfig::default());
        session.observe(one_face(0.0, 0.0, 0.9)).await.unwrap();

        let snap = session.reset().await.unwrap();
        assert!(snap.completed.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let snap = session.snapshot().await.unwrap();
        assert_eq!(snap.blink_count, 0);
        assert!(!snap.is_complete(Step::Blink));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_with_pending_blink() {
        let session = spawn_session(TrackerConfig::default());
        session.observe(one_face(0.0, 0.0, 0.1)).await.unwrap();
        session.shutdown().await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(
            session.snapshot().await,
            Err(EngineError::ChannelClosed)
        ));
        // Last published state is still the pre-shutdown one
        assert_eq!(session.subscribe().borrow().blink_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_discards_pending_blink() {
        let session = spawn_session(TrackerConfig::default());
        let mut updates = session.subscribe();
        let snap = session.observe(one_face(0.0, 0.0, 0.1)).await.unwrap();
        assert!(matches!(snap.blink_phase, BlinkPhase::Debouncing(_)));
        drop(session);

        tokio::time::sleep(Duration::from_secs(2)).await;
        // Drain everything published before the session task exited
        loop {
            assert_eq!(updates.borrow_and_update().blink_count, 0);
            if updates.changed().await.is_err() {
                break;
            }
        }
        assert_eq!(updates.borrow().blink_count, 0);
        assert!(!updates.borrow().is_complete(Step::Blink));
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_failure_leaves_state() {
        let session = spawn_session(TrackerConfig::default());
        let before = session.observe(one_face(0.5, 0.5, 0.9)).await.unwrap();
        let after = session
            .observe(Err(DetectionError::Model("no frame".into())))
            .await
            .unwrap();
        assert_eq!(before, after);
    }
}
