//! PositionEstimator: a local virtual clock for playback position, so the
//! UI can tick smoothly between coarse HTTP polls (spec §4.6).
//!
//! Grounded on `pmocontrol::music_renderer::musicrenderer::MusicRenderer`'s
//! `position_at(Instant)` extrapolation from a last-known `(position,
//! observed_at)` pair; generalized here with the settling window and
//! drift-correction threshold spec §4.6 adds on top of plain extrapolation.

use std::time::{Duration, Instant};

/// A fresh authoritative position is trusted immediately unless it arrived
/// within this window of the last one — avoids visible jumps from two
/// almost-simultaneous updates disagreeing by a second of polling jitter
/// (spec §4.6, scenario 2 in §8).
const SETTLING_WINDOW: Duration = Duration::from_millis(100);

/// Beyond this much disagreement between the estimate and a new
/// authoritative reading, snap to the authoritative value instead of
/// smoothing toward it (spec §4.6).
const DRIFT_CORRECTION_THRESHOLD_SECS: i64 = 3;

#[derive(Clone, Copy, Debug)]
struct Anchor {
    position_secs: u32,
    observed_at: Instant,
}

/// Maintains a virtual 1Hz tick of playback position while playing, reset
/// whenever an authoritative source disagrees by more than the drift
/// threshold, or whenever play state leaves `Playing`, or on seek/track
/// change (spec §4.6).
pub struct PositionEstimator {
    anchor: Option<Anchor>,
    playing: bool,
}

impl PositionEstimator {
    pub fn new() -> Self {
        PositionEstimator {
            anchor: None,
            playing: false,
        }
    }

    /// Called whenever playback starts, resumes, or the estimator should
    /// start ticking from a known-good position.
    pub fn set_playing(&mut self, position_secs: u32, now: Instant) {
        self.playing = true;
        self.anchor = Some(Anchor {
            position_secs,
            observed_at: now,
        });
    }

    /// Called on pause, stop, idle, or buffering: the virtual tick stops
    /// advancing until `set_playing` is called again.
    pub fn set_not_playing(&mut self) {
        self.playing = false;
    }

    /// Hard reset on seek or track change: the next tick starts fresh from
    /// this position with no settling-window suppression.
    pub fn reset_to(&mut self, position_secs: u32, now: Instant) {
        self.anchor = Some(Anchor {
            position_secs,
            observed_at: now,
        });
    }

    /// The current virtual position, extrapolated from the last anchor.
    /// Returns `None` if nothing has been observed yet.
    pub fn estimate(&self, now: Instant) -> Option<u32> {
        let anchor = self.anchor?;
        if !self.playing {
            return Some(anchor.position_secs);
        }
        let elapsed = now.saturating_duration_since(anchor.observed_at).as_secs() as u32;
        Some(anchor.position_secs.saturating_add(elapsed))
    }

    /// Reconciles a new authoritative reading (from HTTP or UPnP) against
    /// the current estimate: within the settling window of the last
    /// anchor, the new reading is ignored so two near-simultaneous polls
    /// don't produce a visible backward jump; beyond the drift threshold,
    /// the estimator snaps to the authoritative value; in between, it also
    /// snaps (there is no smoothing range — only suppress-or-snap).
    pub fn reconcile(&mut self, authoritative_secs: u32, now: Instant) {
        if let Some(anchor) = self.anchor {
            if now.saturating_duration_since(anchor.observed_at) < SETTLING_WINDOW {
                return;
            }
            let estimated = self.estimate(now).unwrap_or(authoritative_secs);
            let drift = (estimated as i64 - authoritative_secs as i64).abs();
            if drift <= DRIFT_CORRECTION_THRESHOLD_SECS {
                return;
            }
        }
        self.anchor = Some(Anchor {
            position_secs: authoritative_secs,
            observed_at: now,
        });
    }
}

impl Default for PositionEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_forward_while_playing() {
        let mut est = PositionEstimator::new();
        let t0 = Instant::now();
        est.set_playing(100, t0);
        assert_eq!(est.estimate(t0 + Duration::from_secs(5)), Some(105));
    }

    #[test]
    fn frozen_while_not_playing() {
        let mut est = PositionEstimator::new();
        let t0 = Instant::now();
        est.set_playing(100, t0);
        est.set_not_playing();
        assert_eq!(est.estimate(t0 + Duration::from_secs(5)), Some(100));
    }

    #[test]
    fn ignores_reading_within_settling_window() {
        // Spec §8 scenario 2: two polls 50ms apart reporting positions that
        // differ by normal polling jitter should not cause a visible jump.
        let mut est = PositionEstimator::new();
        let t0 = Instant::now();
        est.set_playing(100, t0);
        let t1 = t0 + Duration::from_millis(50);
        est.reconcile(99, t1);
        assert_eq!(est.estimate(t1), Some(100));
    }

    #[test]
    fn snaps_on_large_drift() {
        let mut est = PositionEstimator::new();
        let t0 = Instant::now();
        est.set_playing(100, t0);
        let t1 = t0 + Duration::from_secs(1);
        est.reconcile(200, t1);
        assert_eq!(est.estimate(t1), Some(200));
    }

    #[test]
    fn reset_on_seek_is_immediate() {
        let mut est = PositionEstimator::new();
        let t0 = Instant::now();
        est.set_playing(100, t0);
        let t1 = t0 + Duration::from_millis(10);
        est.reset_to(50, t1);
        assert_eq!(est.estimate(t1), Some(50));
    }
}
