//! Change gate: decides whether the expensive matching stage runs this cycle.

use std::time::{Duration, Instant};

use crate::{Frame, GateConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// No previous frame yet.
    First,
    /// The frame differs enough from the previous one (or changed size).
    Changed,
    /// Nothing changed, but the last match is older than the force-rescan interval.
    ForceRescan,
    /// Nothing changed; skip matching.
    Unchanged,
}

impl GateDecision {
    pub fn proceeds(self) -> bool {
        !matches!(self, GateDecision::Unchanged)
    }
}

pub struct ChangeGate {
    config: GateConfig,
    previous: Option<Frame>,
    last_match: Option<Instant>,
}

impl ChangeGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            previous: None,
            last_match: None,
        }
    }

    /// Compare `frame` with the retained one and decide.
    ///
    /// When the decision proceeds, `frame` becomes the new reference and `now`
    /// the new last-match time. An `Unchanged` decision leaves both untouched,
    /// so slow drift still accumulates against the last matched frame.
    pub fn check(&mut self, frame: &Frame, now: Instant) -> GateDecision {
        let decision = match &self.previous {
            None => GateDecision::First,
            Some(previous) => {
                let changed = match frame.mean_abs_diff(previous) {
                    None => true,
                    Some(diff) => diff > self.config.change_threshold,
                };
                if changed {
                    GateDecision::Changed
                } else if self.stale(now) {
                    GateDecision::ForceRescan
                } else {
                    GateDecision::Unchanged
                }
            }
        };

        if decision.proceeds() {
            self.previous = Some(frame.clone());
            self.last_match = Some(now);
        }
        log::trace!("change gate: {decision:?}");
        decision
    }

    fn stale(&self, now: Instant) -> bool {
        let limit = Duration::from_millis(self.config.force_rescan_ms);
        match self.last_match {
            None => true,
            Some(last) => now.saturating_duration_since(last) > limit,
        }
    }

    /// Forget the retained frame, e.g. after the capture region moved.
    pub fn reset(&mut self) {
        self.previous = None;
        self.last_match = None;
    }
}
