//! Change coalescer: decides when mutation events turn into captures.
//!
//! Discrete edits request a capture on the next poll. Continuous gestures
//! (drag, scale, rotate) and add/remove bursts share one debounce lane that
//! is cancelled and rescheduled on every event, so a whole gesture costs a
//! single snapshot. A separate settle lane fires after an interaction ends
//! with nothing selected, to get a clean post-drag baseline.
//!
//! The coalescer owns no timers. The host passes `now` in and asks for
//! `next_deadline()` to arm its own single timer.

use serde::{Deserialize, Serialize};
use sk_core::engine::MutationEvent;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalescerConfig {
    /// Quiet period after the last high-frequency event.
    pub debounce_ms: u64,
    /// Delay after pointer-up with an empty selection.
    pub settle_ms: u64,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            settle_ms: 150,
        }
    }
}

impl CoalescerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Timer lane an event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Immediate,
    Debounced,
    Settle,
}

/// Route an event. `None` means the event never causes a capture.
pub fn classify(event: MutationEvent) -> Option<Lane> {
    match event {
        MutationEvent::Modified | MutationEvent::PathFinished | MutationEvent::SelectionCleared => {
            Some(Lane::Immediate)
        }
        MutationEvent::Added
        | MutationEvent::Removed
        | MutationEvent::Moving
        | MutationEvent::Scaling
        | MutationEvent::Rotating => Some(Lane::Debounced),
        MutationEvent::PointerUp {
            has_selection: false,
        } => Some(Lane::Settle),
        MutationEvent::PointerUp {
            has_selection: true,
        }
        | MutationEvent::SelectionCreated
        | MutationEvent::SelectionUpdated => None,
    }
}

#[derive(Debug, Default)]
pub struct Coalescer {
    config: CoalescerConfig,
    immediate: bool,
    debounce_at: Option<Instant>,
    settle_at: Option<Instant>,
}

impl Coalescer {
    pub fn new(config: CoalescerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.config
    }

    /// Record an event. Returns the lane it landed in.
    pub fn on_event(&mut self, event: MutationEvent, now: Instant) -> Option<Lane> {
        let lane = classify(event)?;
        match lane {
            Lane::Immediate => self.immediate = true,
            // Rescheduling replaces the previous deadline outright.
            Lane::Debounced => self.debounce_at = Some(now + self.config.debounce()),
            Lane::Settle => self.settle_at = Some(now + self.config.settle()),
        }
        log::trace!("{event:?} -> {lane:?}");
        Some(lane)
    }

    /// True when a capture is due at `now`. Fired lanes are cleared.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut due = std::mem::take(&mut self.immediate);
        for slot in [&mut self.debounce_at, &mut self.settle_at] {
            if slot.is_some_and(|deadline| deadline <= now) {
                *slot = None;
                due = true;
            }
        }
        due
    }

    /// Earliest moment `poll` can return true, if anything is pending.
    /// An immediate request is due right away and reports `now`.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        if self.immediate {
            return Some(now);
        }
        match (self.debounce_at, self.settle_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.immediate || self.debounce_at.is_some() || self.settle_at.is_some()
    }

    /// Drop every pending request.
    pub fn cancel_all(&mut self) {
        self.immediate = false;
        self.debounce_at = None;
        self.settle_at = None;
    }
}
