//! StateSynchronizer: merges HTTP polling, UPnP eventing, local position
//! estimation, and optimistic writes into one authoritative `Status`,
//! tracking per-field provenance (spec §4.5).
//!
//! Grounded on `pmocontrol::music_renderer::musicrenderer::MusicRenderer`'s
//! merge of polled state with event-pushed state behind a single mutex;
//! generalized here into an explicit per-field priority/freshness table
//! instead of "whichever update arrived last wins" since HTTP and UPnP can
//! race and disagree (spec §3's `FieldProvenance`, §4.5).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::model::{SourceKind, Status, StatusField, StatusPatch};

/// Per-field freshness window (spec §4.5's table): how long a source's
/// value remains authoritative before the field is considered stale and
/// open to being overwritten regardless of priority. Position/Duration are
/// not part of the spec's named table; they keep the short window the
/// position estimator already relies on.
fn freshness_window(field: StatusField) -> Duration {
    match field {
        StatusField::PlayState | StatusField::Volume | StatusField::Muted => Duration::from_secs(10),
        StatusField::Title | StatusField::Artist | StatusField::Album | StatusField::ImageUrl => {
            Duration::from_secs(30)
        }
        StatusField::Source | StatusField::RawSource => Duration::from_secs(10),
        StatusField::Shuffle | StatusField::Repeat => Duration::from_secs(10),
        StatusField::Codec | StatusField::SampleRate | StatusField::BitDepth | StatusField::BitRate => {
            Duration::from_secs(60)
        }
        StatusField::Position | StatusField::Duration => Duration::from_secs(3),
    }
}

/// Base priority when two sources are both fresh (spec §4.5): "Optimistic
/// writes ... have a provenance weight just below HTTP, so any real
/// HTTP/UPnP observation overrides them" immediately, not after a timeout.
/// Position/Duration favor `Estimated` over both while playing, and
/// metadata fields flip Http/Upnp for Spotify sources (see `priority_rank`);
/// everywhere else this fixed order applies.
fn base_priority(kind: SourceKind) -> u8 {
    match kind {
        SourceKind::Upnp => 3,
        SourceKind::Http => 2,
        SourceKind::Optimistic => 1,
        SourceKind::Estimated => 0,
    }
}

/// Title/artist/album/image normally trust HTTP polling over UPnP's
/// event-only metadata (`upnp::apply_element` never decodes
/// `CurrentTrackMetaData`), but Spotify Connect exposes richer metadata over
/// its UPnP events than the generic "Spotify" string HTTP polling reports,
/// so the priority flips for that one source (spec §4.5).
fn metadata_priority(kind: SourceKind, is_spotify_source: bool) -> u8 {
    match kind {
        SourceKind::Optimistic => 1,
        SourceKind::Estimated => 0,
        SourceKind::Http => if is_spotify_source { 2 } else { 3 },
        SourceKind::Upnp => if is_spotify_source { 3 } else { 2 },
    }
}

/// Field-specific priority override (spec §4.5): position/duration prefer
/// the local estimator over HTTP/UPnP while playing, since HTTP polling is
/// coarser than a 1Hz local tick. Optimistic still ranks below both real
/// observations, consistent with `base_priority`.
fn priority_rank(field: StatusField, kind: SourceKind, is_playing: bool, is_spotify_source: bool) -> u8 {
    if matches!(field, StatusField::Position | StatusField::Duration) && is_playing {
        match kind {
            SourceKind::Estimated => 3,
            SourceKind::Upnp => 2,
            SourceKind::Http => 2,
            SourceKind::Optimistic => 1,
        }
    } else if matches!(
        field,
        StatusField::Title | StatusField::Artist | StatusField::Album | StatusField::ImageUrl
    ) {
        metadata_priority(kind, is_spotify_source)
    } else {
        base_priority(kind)
    }
}

#[derive(Clone, Copy, Debug)]
struct Provenance {
    kind: SourceKind,
    applied_at: Instant,
}

/// Tracks, for each mergeable field, which source last won and when —
/// plus a rolling count of HTTP-vs-UPnP wins for `http_first_ratio`
/// diagnostics.
pub struct StateSynchronizer {
    status: Status,
    provenance: HashMap<StatusField, Provenance>,
    http_wins: u64,
    upnp_wins: u64,
}

impl StateSynchronizer {
    pub fn new() -> Self {
        StateSynchronizer {
            status: Status::initial(),
            provenance: HashMap::new(),
            http_wins: 0,
            upnp_wins: 0,
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    fn is_stale(&self, field: StatusField, now: Instant) -> bool {
        match self.provenance.get(&field) {
            Some(p) => now.duration_since(p.applied_at) > freshness_window(field),
            None => true,
        }
    }

    fn is_spotify_source(&self) -> bool {
        self.status
            .source
            .as_deref()
            .map(|s| s.starts_with("Spotify"))
            .unwrap_or(false)
    }

    /// Returns true if `incoming` should win over whatever currently holds
    /// `field`. A real HTTP/UPnP observation always wins against a
    /// still-fresh Optimistic value, since `priority_rank` ranks Optimistic
    /// below both — staleness only matters for deciding whether a
    /// lower-priority source may overwrite an equal-or-higher one.
    fn should_apply(&self, field: StatusField, incoming: SourceKind, now: Instant) -> bool {
        if self.is_stale(field, now) {
            return true;
        }
        let current = self.provenance.get(&field).map(|p| p.kind);
        let is_playing = self.status.is_playing();
        let is_spotify = self.is_spotify_source();
        match current {
            None => true,
            Some(current_kind) => {
                priority_rank(field, incoming, is_playing, is_spotify)
                    >= priority_rank(field, current_kind, is_playing, is_spotify)
            }
        }
    }

    fn record(&mut self, field: StatusField, kind: SourceKind, now: Instant) {
        self.provenance.insert(field, Provenance { kind, applied_at: now });
        match kind {
            SourceKind::Http => self.http_wins += 1,
            SourceKind::Upnp => self.upnp_wins += 1,
            _ => {}
        }
    }

    /// Applies a patch from one source, field by field, honoring merge
    /// priority. `now` is passed in rather than read internally so tests
    /// can drive time deterministically.
    pub fn apply(&mut self, patch: &StatusPatch, kind: SourceKind, now: Instant) {
        macro_rules! merge_simple {
            ($field:ident, $status_field:expr) => {
                if let Some(value) = patch.$field {
                    if self.should_apply($status_field, kind, now) {
                        self.status.$field = value;
                        self.record($status_field, kind, now);
                    }
                }
            };
        }
        macro_rules! merge_opt {
            ($field:ident, $status_field:expr) => {
                if let Some(ref value) = patch.$field {
                    if self.should_apply($status_field, kind, now) {
                        self.status.$field = value.clone();
                        self.record($status_field, kind, now);
                    }
                }
            };
        }

        if let Some(play_state) = patch.play_state {
            if self.should_apply(StatusField::PlayState, kind, now) {
                self.status.play_state = play_state;
                self.record(StatusField::PlayState, kind, now);
            }
        }
        merge_simple!(volume, StatusField::Volume);
        merge_simple!(muted, StatusField::Muted);
        merge_opt!(title, StatusField::Title);
        merge_opt!(artist, StatusField::Artist);
        merge_opt!(album, StatusField::Album);
        merge_opt!(image_url, StatusField::ImageUrl);
        merge_opt!(source, StatusField::Source);
        merge_opt!(raw_source, StatusField::RawSource);
        merge_simple!(shuffle, StatusField::Shuffle);
        merge_simple!(repeat, StatusField::Repeat);
        merge_opt!(codec, StatusField::Codec);
        merge_opt!(sample_rate, StatusField::SampleRate);
        merge_opt!(bit_depth, StatusField::BitDepth);
        merge_opt!(bit_rate, StatusField::BitRate);

        if let Some(position) = patch.position {
            if self.should_apply(StatusField::Position, kind, now) {
                self.status.position = position;
                self.status.position_updated_at = now;
                self.record(StatusField::Position, kind, now);
            }
        }
        if let Some(duration) = patch.duration {
            if self.should_apply(StatusField::Duration, kind, now) {
                self.status.duration = duration;
                self.record(StatusField::Duration, kind, now);
            }
        }

        if let Some(ref value) = patch.eq_preset {
            self.status.eq_preset = value.clone();
        }
        if let Some(ref value) = patch.audio_output_mode {
            self.status.audio_output_mode = value.clone();
        }
        if let Some(value) = patch.channel_balance {
            self.status.channel_balance = value;
        }

        if let Some(role) = patch.role {
            self.status.role = role;
        }
        if let Some(ref master_host) = patch.master_host {
            self.status.master_host = master_host.clone();
        }
        if let Some(ref presets) = patch.presets {
            self.status.presets = presets.clone();
        }
    }

    /// Advances `position` by one virtual tick without disturbing any other
    /// field's provenance; used by `PositionEstimator` (spec §4.6).
    pub fn apply_estimated_position(&mut self, position: u32, now: Instant) {
        if self.should_apply(StatusField::Position, SourceKind::Estimated, now) {
            self.status.position = Some(position);
            self.status.position_updated_at = now;
            self.record(StatusField::Position, SourceKind::Estimated, now);
        }
    }

    /// Ratio of fields last won by HTTP vs. (HTTP + UPnP), for diagnostics
    /// (SPEC_FULL's supplementary health-tracker addition). Returns `None`
    /// until at least one of either source has won a field.
    pub fn http_first_ratio(&self) -> Option<f64> {
        let total = self.http_wins + self.upnp_wins;
        if total == 0 {
            None
        } else {
            Some(self.http_wins as f64 / total as f64)
        }
    }
}

impl Default for StateSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}
