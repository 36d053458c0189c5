//! Liveness step tracking from per-frame face detections.
//!
//! The tracker consumes one [`DetectionResult`] per frame and maintains three
//! checklist steps:
//!
//! - **Face presence** is level-triggered: complete iff the frame holds
//!   exactly one face. Frames with zero or several faces stop evaluation
//!   there, leaving the other steps as they were.
//! - **Blink** is edge-triggered: both eyes closed starts a debounce and
//!   hands out a [`BlinkTicket`]. The host waits `blink_delay` and returns the
//!   ticket through [`LivenessTracker::confirm_blink`], which counts the
//!   blink. While a ticket is outstanding no new blink can start, so one
//!   sustained closure counts once. The count saturates at `max_blinks`.
//! - **Smile** is level-triggered on frames with exactly one face.
//!
//! The tracker itself never sleeps or spawns. Timers belong to the host; a
//! ticket that arrives after [`LivenessTracker::reset`] or for a debounce that
//! no longer exists is ignored.

use std::time::Duration;

use crate::config::TrackerConfig;
use crate::face::{DetectionError, DetectionResult, FaceObservation};
use crate::step::{Step, StepSet};

/// Handle for one scheduled blink confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlinkTicket {
    id: u64,
    /// How long the host should wait before confirming.
    pub delay: Duration,
}

impl BlinkTicket {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Blink debounce state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlinkPhase {
    #[default]
    Idle,
    Debouncing(BlinkTicket),
}

/// Mutable state owned by the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessState {
    pub blink_count: u32,
    pub blink_phase: BlinkPhase,
    pub completed: StepSet,
}

/// Immutable view of the state after a frame or timer firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub completed: StepSet,
    pub blink_count: u32,
    pub blink_phase: BlinkPhase,
}

impl Snapshot {
    pub fn is_complete(&self, step: Step) -> bool {
        self.completed.contains(step)
    }

    pub fn all_complete(&self) -> bool {
        self.completed.is_full()
    }

    /// Ticket the host must schedule, if a blink is being debounced.
    pub fn pending_blink(&self) -> Option<BlinkTicket> {
        match self.blink_phase {
            BlinkPhase::Idle => None,
            BlinkPhase::Debouncing(ticket) => Some(ticket),
        }
    }
}

/// Frame counters, reset together with the state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Frames passed to `observe`.
    pub frames_observed: u64,
    /// Frames dropped because the model failed or reported garbage.
    pub frames_skipped: u64,
    /// Frames with zero or more than one face.
    pub frames_ambiguous: u64,
}

pub struct LivenessTracker {
    config: TrackerConfig,
    state: LivenessState,
    stats: TrackerStats,
    next_ticket: u64,
}

impl LivenessTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: LivenessState::default(),
            stats: TrackerStats::default(),
            next_ticket: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> &LivenessState {
        &self.state
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            completed: self.state.completed,
            blink_count: self.state.blink_count,
            blink_phase: self.state.blink_phase,
        }
    }

    /// Update the steps from one frame's detection result.
    pub fn observe(&mut self, result: &DetectionResult) -> Snapshot {
        self.stats.frames_observed += 1;

        let faces = match result {
            Ok(faces) => faces,
            Err(e) => {
                self.stats.frames_skipped += 1;
                tracing::debug!(error = %e, "skipping frame: detection failed");
                return self.snapshot();
            }
        };

        let [face] = faces.as_slice() else {
            self.stats.frames_ambiguous += 1;
            tracing::debug!(faces = faces.len(), "face presence incomplete");
            self.state.completed.remove(Step::FacePresence);
            if self.config.reset_on_face_loss {
                self.state.completed.remove(Step::Smile);
            }
            return self.snapshot();
        };

        if let Err(e) = face.validate() {
            self.stats.frames_skipped += 1;
            let e = DetectionError::from(e);
            tracing::warn!(error = %e, "skipping frame: malformed observation");
            return self.snapshot();
        }

        self.state.completed.insert(Step::FacePresence);
        self.evaluate_blink(face);
        self.state
            .completed
            .set(Step::Smile, face.smiling > self.config.smile_threshold);

        self.snapshot()
    }

    fn evaluate_blink(&mut self, face: &FaceObservation) {
        if !face.eyes_closed(self.config.eye_closed_threshold)
            || self.state.blink_count >= self.config.max_blinks
            || self.state.blink_phase != BlinkPhase::Idle
        {
            return;
        }

        self.next_ticket += 1;
        let ticket = BlinkTicket {
            id: self.next_ticket,
            delay: self.config.blink_delay,
        };
        self.state.blink_phase = BlinkPhase::Debouncing(ticket);
        tracing::debug!(
            ticket = ticket.id,
            delay_ms = ticket.delay.as_millis() as u64,
            "eyes closed: blink debounce started"
        );
    }

    /// Count the blink for `ticket` once its delay has elapsed.
    ///
    /// Returns `None` without touching the state if the ticket is not the one
    /// currently being debounced (stale, already confirmed, or issued before a
    /// reset).
    pub fn confirm_blink(&mut self, ticket: BlinkTicket) -> Option<Snapshot> {
        if self.state.blink_phase != BlinkPhase::Debouncing(ticket) {
            tracing::debug!(ticket = ticket.id, "ignoring stale blink ticket");
            return None;
        }

        self.state.blink_count = (self.state.blink_count + 1).min(self.config.max_blinks);
        self.state.completed.insert(Step::Blink);
        self.state.blink_phase = BlinkPhase::Idle;
        tracing::info!(
            ticket = ticket.id,
            blink_count = self.state.blink_count,
            max = self.config.max_blinks,
            "blink counted"
        );

        Some(self.snapshot())
    }

    /// Start over: clear steps, blink count and any outstanding ticket.
    pub fn reset(&mut self) -> Snapshot {
        self.state = LivenessState::default();
        self.stats = TrackerStats::default();
        tracing::info!("liveness state reset");
        self.snapshot()
    }
}
