//! Playback clock for one opened timeline.
//!
//! Pure state: every method takes `now`, nothing here sleeps or spawns.
//! The viewer loop feeds it frame ticks and UI input and arms or disarms
//! the frame timer from [`Playback::is_running`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::pause::{PauseReason, PauseReasons};

/// Coarse viewer phase shown to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// No timeline open.
    Closed,
    /// Fetching a timeline from the store.
    Loading,
    /// Fetch failed; waiting for a manual retry.
    LoadFailed,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Result of a frame tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Still inside the current item.
    Progress(f32),
    /// The current item just reached its full duration. Reported once.
    Completed,
    /// Not running; nothing to publish.
    Idle,
}

/// Result of moving the current-item pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Moved(usize),
    /// Already at the first/last item; the pointer did not move.
    Boundary(Direction),
}

#[derive(Debug, Clone)]
pub struct Playback {
    duration: Duration,
    index: usize,
    accumulated: Vec<Duration>,
    /// Set while time is accumulating for the current item.
    started_at: Option<Instant>,
    reasons: PauseReasons,
    completed: bool,
    closed: bool,
}

impl Playback {
    /// Start playing `len` items at `start` (clamped). `None` for an empty
    /// timeline or a zero item duration.
    pub fn new(len: usize, start: usize, duration: Duration, now: Instant) -> Option<Self> {
        if len == 0 || duration.is_zero() {
            return None;
        }
        Some(Self {
            duration,
            index: start.min(len - 1),
            accumulated: vec![Duration::ZERO; len],
            started_at: Some(now),
            reasons: PauseReasons::new(),
            completed: false,
            closed: false,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.len()
    }

    pub fn phase(&self) -> Phase {
        if self.closed {
            Phase::Closed
        } else if self.reasons.is_empty() {
            Phase::Playing
        } else {
            Phase::Paused
        }
    }

    pub fn is_paused(&self) -> bool {
        !self.reasons.is_empty()
    }

    /// True while the frame timer should be armed.
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn reasons(&self) -> &PauseReasons {
        &self.reasons
    }

    /// Time shown for the current item, capped at the item duration.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .started_at
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default();
        (self.accumulated[self.index] + running).min(self.duration)
    }

    pub fn progress(&self, now: Instant) -> f32 {
        let ratio = self.elapsed(now).as_secs_f32() / self.duration.as_secs_f32();
        ratio.clamp(0.0, 1.0)
    }

    pub fn tick(&mut self, now: Instant) -> Tick {
        if !self.is_running() || self.completed {
            return Tick::Idle;
        }
        let progress = self.progress(now);
        if progress >= 1.0 {
            self.freeze(now);
            self.completed = true;
            Tick::Completed
        } else {
            Tick::Progress(progress)
        }
    }

    /// Add a pause hold. Returns true if this froze the clock.
    pub fn pause(&mut self, reason: PauseReason, now: Instant) -> bool {
        if self.closed {
            return false;
        }
        let paused = self.reasons.insert(reason);
        if paused {
            self.freeze(now);
        }
        paused
    }

    /// Release a pause hold. Returns true if the clock runs again.
    pub fn resume(&mut self, reason: PauseReason, now: Instant) -> bool {
        if self.closed || !self.reasons.remove(reason) {
            return false;
        }
        self.run(now)
    }

    /// Release every hold of one kind (gesture end).
    pub fn release(&mut self, reason: PauseReason, now: Instant) -> bool {
        if self.closed || !self.reasons.remove_all(reason) {
            return false;
        }
        self.run(now)
    }

    /// Drop all holds. Returns true if the clock runs again.
    pub fn clear_pauses(&mut self, now: Instant) -> bool {
        if self.closed || self.reasons.is_empty() {
            return false;
        }
        self.reasons.clear();
        self.run(now)
    }

    /// Move the pointer. The newly current item always starts from zero;
    /// pause holds are kept.
    pub fn step(&mut self, direction: Direction, now: Instant) -> Step {
        let target = match direction {
            Direction::Forward if !self.is_last() => self.index + 1,
            Direction::Backward if self.index > 0 => self.index - 1,
            _ => return Step::Boundary(direction),
        };
        self.started_at = None;
        self.index = target;
        self.accumulated[target] = Duration::ZERO;
        self.completed = false;
        self.run(now);
        Step::Moved(target)
    }

    pub fn close(&mut self, now: Instant) {
        self.freeze(now);
        self.closed = true;
    }

    fn freeze(&mut self, now: Instant) {
        if let Some(started) = self.started_at.take() {
            let total = self.accumulated[self.index] + now.saturating_duration_since(started);
            self.accumulated[self.index] = total.min(self.duration);
        }
    }

    fn run(&mut self, now: Instant) -> bool {
        if self.closed || self.completed || !self.reasons.is_empty() {
            return false;
        }
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        true
    }
}
