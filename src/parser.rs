//! Parser: raw device JSON → `StatusPatch` (spec §4.4).
//!
//! Grounded on `pmocontrol::linkplay_client::parse_player_status`'s
//! field-aliasing table (the same logical field appears under different
//! keys across firmware revisions) and sentinel-cleanup logic, generalized
//! to the wider vendor family and extended with the ms/µs autodetection
//! `time_utils::autodetect_to_seconds` provides.

use serde_json::Value;

use crate::dialect::is_self_transporting_source;
use crate::model::{PlayState, Repeat, Shuffle, StatusPatch};
use crate::time_utils::autodetect_to_seconds;

/// Raw string values firmwares use in place of a real field; treated as
/// absent everywhere they appear (spec §4.4).
const SENTINELS: &[&str] = &["unknow", "un_known", "unknown", "null", "none", "n/a", ""];

fn is_sentinel(s: &str) -> bool {
    SENTINELS.iter().any(|sentinel| s.eq_ignore_ascii_case(sentinel))
}

fn clean_str(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !is_sentinel(s)).map(str::to_string)
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(*k)).and_then(Value::as_str)
}

fn first_u64(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| value.get(*k)).and_then(|v| {
        v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    })
}

fn first_i64(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| value.get(*k)).and_then(|v| {
        v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    })
}

fn parse_play_state(raw: &str) -> Option<PlayState> {
    match raw.to_ascii_lowercase().as_str() {
        "play" | "playing" => Some(PlayState::Playing),
        "pause" | "paused" => Some(PlayState::Paused),
        "stop" | "stopped" | "none" => Some(PlayState::Idle),
        "load" | "loading" | "buffering" => Some(PlayState::Buffering),
        _ => None,
    }
}

/// Title-cases a raw `mode`/`source` token ("wifi" -> "WiFi" is a special
/// case firmwares get wrong often enough to special-case; everything else
/// gets ordinary title-casing).
fn normalize_source(raw: &str) -> String {
    if raw.eq_ignore_ascii_case("wifi") {
        return "WiFi".to_string();
    }
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Spotify firmwares reuse the "Spotify" source string for both music and
/// podcast playback; the sub-classification comes from a separate field
/// some firmwares expose (spec's supplementary "Spotify podcast
/// sub-classification"). Falls back to plain "Spotify" when absent.
fn classify_spotify_subtype(value: &Value) -> String {
    let is_podcast = value
        .get("contentType")
        .and_then(Value::as_str)
        .map(|s| s.eq_ignore_ascii_case("podcast"))
        .unwrap_or(false);
    if is_podcast {
        "Spotify Podcast".to_string()
    } else {
        "Spotify".to_string()
    }
}

/// Parses a `getPlayerStatus`/`getPlayerStatusEx` JSON body into a
/// `StatusPatch`. Unknown/malformed top-level JSON yields `None` rather
/// than a partially-populated patch, so callers can distinguish "nothing
/// changed" from "this wasn't JSON at all".
pub fn parse_player_status(body: &str) -> Option<StatusPatch> {
    let value: Value = serde_json::from_str(body).ok()?;
    let mut patch = StatusPatch::default();

    if let Some(raw) = first_str(&value, &["status", "playStatus"]) {
        patch.play_state = parse_play_state(raw);
    }

    if let Some(vol) = first_u64(&value, &["vol", "volume"]) {
        patch.volume = Some((vol.min(100) as f32) / 100.0);
    }
    if let Some(mute) = first_u64(&value, &["mute", "muted"]) {
        patch.muted = Some(mute != 0);
    }

    let raw_source = first_str(&value, &["mode", "source", "curSource"]).map(str::to_string);
    if let Some(raw) = raw_source {
        patch.raw_source = Some(clean_str(Some(&raw)));
        let normalized = normalize_source(&raw);
        let source = if normalized.eq_ignore_ascii_case("spotify") {
            classify_spotify_subtype(&value)
        } else {
            normalized
        };
        patch.source = Some(Some(source));
    }

    if let Some(title) = first_str(&value, &["Title", "title", "track"]) {
        patch.title = Some(clean_str(Some(title)));
    }
    if let Some(artist) = first_str(&value, &["Artist", "artist"]) {
        patch.artist = Some(clean_str(Some(artist)));
    }
    if let Some(album) = first_str(&value, &["Album", "album"]) {
        patch.album = Some(clean_str(Some(album)));
    }
    if let Some(image) = first_str(&value, &["albumArtURI", "cover", "albumArt"]) {
        patch.image_url = Some(clean_str(Some(image)));
    }

    if let Some(raw_duration) = first_u64(&value, &["totlen", "duration", "TrackDuration"]) {
        let seconds = autodetect_to_seconds(raw_duration);
        patch.duration = Some(if seconds == 0 { None } else { Some(seconds) });
    }
    if let Some(raw_position) = first_i64(&value, &["curpos", "position", "RelTime"]) {
        if raw_position < 0 {
            patch.position = Some(None);
        } else {
            let seconds = autodetect_to_seconds(raw_position as u64);
            match patch.duration.flatten() {
                // Position past a reported duration means one of the two
                // readings is wrong (spec §4.4). A very short reported
                // duration is itself implausible (likely a stale/garbled
                // field) and is dropped; otherwise trust the duration and
                // treat the overshoot as a stale position carried over from
                // the previous track, resetting it to the start.
                Some(duration) if seconds > duration && duration < 120 => {
                    patch.duration = Some(None);
                    patch.position = Some(Some(seconds));
                }
                Some(duration) if seconds > duration => {
                    patch.position = Some(Some(0));
                }
                _ => {
                    patch.position = Some(Some(seconds));
                }
            }
        }
    }

    let live_source = patch
        .source
        .as_ref()
        .and_then(|s| s.as_deref())
        .map(is_self_transporting_source)
        .unwrap_or(false);

    if let Some(loop_mode) = first_u64(&value, &["loop", "loopmode"]) {
        if live_source {
            patch.shuffle = Some(Shuffle::Unknown);
            patch.repeat = Some(Repeat::Unknown);
        } else {
            // Decoding is delegated to the vendor's `LoopModeMap`; Parser
            // only forwards the raw integer via the caller, which has the
            // vendor context Parser itself does not.
            let _ = loop_mode;
        }
    }

    if let Some(codec) = first_str(&value, &["Type", "type", "codec"]) {
        patch.codec = Some(clean_str(Some(codec)));
    }
    if let Some(rate) = first_u64(&value, &["sampleRate", "SampleRate"]) {
        patch.sample_rate = Some(if rate == 0 { None } else { Some(rate as u32) });
    }
    if let Some(depth) = first_u64(&value, &["bitDepth", "BitDepth"]) {
        patch.bit_depth = Some(if depth == 0 { None } else { Some(depth as u32) });
    }
    if let Some(rate) = first_u64(&value, &["bitRate", "BitRate"]) {
        patch.bit_rate = Some(if rate == 0 { None } else { Some(rate as u32) });
    }

    Some(patch)
}

/// Raw `loopMode` integer extracted separately from the JSON, for callers
/// (`Player`/`StateSynchronizer`) that have vendor context to decode it
/// through `CapabilityRegistry::loop_mode_map`.
pub fn extract_raw_loop_mode(body: &str) -> Option<u8> {
    let value: Value = serde_json::from_str(body).ok()?;
    first_u64(&value, &["loop", "loopmode"]).map(|n| n as u8)
}

/// Parses a `getPresetInfo` JSON array into `Preset`s (spec §4.7's
/// track-change supplemental fetch). Entries missing a `number` fall back to
/// their 1-based position in the array.
pub fn parse_presets(body: &str) -> Option<Vec<crate::model::Preset>> {
    let value: Value = serde_json::from_str(body).ok()?;
    let array = value.as_array()?;
    Some(
        array
            .iter()
            .enumerate()
            .map(|(i, item)| crate::model::Preset {
                number: first_u64(item, &["number", "preset"]).map(|n| n as u32).unwrap_or(i as u32 + 1),
                name: first_str(item, &["name"]).map(str::to_string),
                url: first_str(item, &["url"]).map(str::to_string),
                image_url: first_str(item, &["picurl", "picUrl"]).map(str::to_string),
            })
            .collect(),
    )
}

/// Parses a `getNewAudioOutputHardwareMode` JSON body into the raw mode
/// string (spec §4.7's track-change supplemental fetch); `Player` owns the
/// mapping from this string to `AudioOutputMode`.
pub fn parse_audio_output_mode(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    first_str(&value, &["hardware", "mode", "source"]).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_status() {
        let body = r#"{"status":"play","vol":"45","mute":"0","mode":"wifi","Title":"Song","Artist":"Band","curpos":"123456","totlen":"240000"}"#;
        let patch = parse_player_status(body).unwrap();
        assert_eq!(patch.play_state, Some(PlayState::Playing));
        assert_eq!(patch.volume, Some(0.45));
        assert_eq!(patch.muted, Some(false));
        assert_eq!(patch.source, Some(Some("WiFi".to_string())));
        assert_eq!(patch.title, Some(Some("Song".to_string())));
        assert_eq!(patch.duration, Some(Some(240)));
        assert_eq!(patch.position, Some(Some(123)));
    }

    #[test]
    fn sentinel_strings_become_none() {
        let body = r#"{"status":"play","Title":"unknow","Artist":"un_known"}"#;
        let patch = parse_player_status(body).unwrap();
        assert_eq!(patch.title, Some(None));
        assert_eq!(patch.artist, Some(None));
    }

    #[test]
    fn zero_duration_is_none() {
        let body = r#"{"status":"stop","totlen":"0"}"#;
        let patch = parse_player_status(body).unwrap();
        assert_eq!(patch.duration, Some(None));
    }

    #[test]
    fn negative_position_is_none() {
        let body = r#"{"status":"play","curpos":"-1"}"#;
        let patch = parse_player_status(body).unwrap();
        assert_eq!(patch.position, Some(None));
    }

    #[test]
    fn position_past_plausible_duration_resets_to_zero() {
        let body = r#"{"status":"play","curpos":"250000","totlen":"240000"}"#;
        let patch = parse_player_status(body).unwrap();
        assert_eq!(patch.duration, Some(Some(240)));
        assert_eq!(patch.position, Some(Some(0)));
    }

    #[test]
    fn position_past_implausibly_short_duration_drops_duration() {
        let body = r#"{"status":"play","curpos":"80000","totlen":"60000"}"#;
        let patch = parse_player_status(body).unwrap();
        assert_eq!(patch.duration, Some(None));
        assert_eq!(patch.position, Some(Some(80)));
    }

    #[test]
    fn live_stream_source_forces_shuffle_repeat_unknown() {
        let body = r#"{"status":"play","mode":"TuneIn","loop":"0"}"#;
        let patch = parse_player_status(body).unwrap();
        assert_eq!(patch.shuffle, Some(Shuffle::Unknown));
        assert_eq!(patch.repeat, Some(Repeat::Unknown));
    }

    #[test]
    fn spotify_podcast_subclassified() {
        let body = r#"{"status":"play","mode":"Spotify","contentType":"podcast"}"#;
        let patch = parse_player_status(body).unwrap();
        assert_eq!(patch.source, Some(Some("Spotify Podcast".to_string())));
    }

    #[test]
    fn ms_us_autodetect_scenario() {
        // Spec §8 scenario 1: USB reports ms, Spotify reports us.
        let usb = r#"{"status":"play","mode":"USB","curpos":"123456","totlen":"240000"}"#;
        let patch = parse_player_status(usb).unwrap();
        assert_eq!(patch.position, Some(Some(123)));

        let spotify = r#"{"status":"play","mode":"Spotify","curpos":"123456789","totlen":"240000000"}"#;
        let patch = parse_player_status(spotify).unwrap();
        assert_eq!(patch.position, Some(Some(123)));
        assert_eq!(patch.duration, Some(Some(240)));
    }
}
