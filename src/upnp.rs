//! UpnpEventer: the UPnP eventing boundary (spec §4.9).
//!
//! This crate does not itself own SSDP discovery or GENA subscriptions —
//! spec §1's Non-goals explicitly exclude "a UPnP subscription client" —
//! but it must still be able to merge events a caller-supplied subscriber
//! delivers. Grounded on `pmoupnp`'s separation between transport (its own
//! crate) and the XML event bodies `pmocontrol` decodes; here that boundary
//! is made an explicit trait so any UPnP client can be plugged in.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::warn;

use crate::model::{PlayState, Repeat, Shuffle, StatusPatch};
use crate::time_utils::parse_time_flexible;

/// How long a GENA subscription is renewed before it lapses (spec §4.9):
/// most AVTransport services grant ~1800s and expect a renewal well before
/// that, so this keeps a comfortable margin.
const SUBSCRIPTION_RENEWAL_INTERVAL: Duration = Duration::from_secs(600);

/// One decoded AVTransport/RenderingControl event. Implementations supply
/// these however they obtain them (GENA callback server, polling
/// subscription library, or a test double).
#[async_trait]
pub trait UpnpEventer: Send + Sync {
    /// Awaits the next `LastChange` event body for the subscribed device.
    /// Returns `None` when the subscription ends and will not be renewed.
    async fn next_event(&self) -> Option<String>;

    /// Attempts to re-establish a lapsed or about-to-lapse subscription
    /// (spec §4.9's subscription lifecycle). Returns whether it succeeded.
    /// Default implementation reports failure; eventers backed by a real
    /// GENA client override this with an actual (re-)SUBSCRIBE call.
    async fn resubscribe(&self) -> bool {
        false
    }
}

/// Tracks one subscription's renewal deadline and missed-event count (spec
/// §4.9: "subscription renewal, resubscribe-on-failure, and missed-event
/// health tracking live here"). Pure bookkeeping; `run_eventing_loop` is the
/// only thing that mutates it in response to real eventer behavior.
#[derive(Debug)]
pub struct SubscriptionHealth {
    subscribed_at: Instant,
    last_renewed_at: Instant,
    missed_events: u64,
    resubscribe_attempts: u64,
}

impl SubscriptionHealth {
    pub fn new(now: Instant) -> Self {
        SubscriptionHealth {
            subscribed_at: now,
            last_renewed_at: now,
            missed_events: 0,
            resubscribe_attempts: 0,
        }
    }

    /// Whether it is time to renew, based on `SUBSCRIPTION_RENEWAL_INTERVAL`.
    pub fn needs_renewal(&self, now: Instant) -> bool {
        now.duration_since(self.last_renewed_at) >= SUBSCRIPTION_RENEWAL_INTERVAL
    }

    pub fn mark_renewed(&mut self, now: Instant) {
        self.last_renewed_at = now;
    }

    pub fn mark_resubscribe_attempt(&mut self) {
        self.resubscribe_attempts += 1;
    }

    pub fn mark_subscribed(&mut self, now: Instant) {
        self.subscribed_at = now;
        self.last_renewed_at = now;
        self.resubscribe_attempts = 0;
    }

    pub fn record_missed_event(&mut self) {
        self.missed_events += 1;
    }

    pub fn missed_event_count(&self) -> u64 {
        self.missed_events
    }

    pub fn resubscribe_attempts(&self) -> u64 {
        self.resubscribe_attempts
    }

    pub fn subscribed_at(&self) -> Instant {
        self.subscribed_at
    }
}

/// Drives one `UpnpEventer` until it stops yielding events, applying each
/// decoded patch via `on_patch` and tracking subscription health. A `None`
/// from `next_event` is treated as a dropped subscription: one missed event
/// is recorded and `resubscribe` is attempted before continuing to await
/// further events on the (hopefully renewed) subscription.
pub async fn run_eventing_loop<E, F>(eventer: &E, mut on_patch: F)
where
    E: UpnpEventer + ?Sized,
    F: FnMut(StatusPatch),
{
    let mut health = SubscriptionHealth::new(Instant::now());

    loop {
        match eventer.next_event().await {
            Some(xml) => {
                if let Some(patch) = parse_last_change(&xml) {
                    on_patch(patch);
                }
                if health.needs_renewal(Instant::now()) {
                    health.mark_renewed(Instant::now());
                }
            }
            None => {
                health.record_missed_event();
                health.mark_resubscribe_attempt();
                warn!(missed_events = health.missed_event_count(), "UPnP subscription ended, resubscribing");
                if eventer.resubscribe().await {
                    health.mark_subscribed(Instant::now());
                } else {
                    break;
                }
            }
        }
    }
}

/// Decodes a UPnP `LastChange` XML body into a `StatusPatch` (spec §4.9).
/// Unknown elements are ignored rather than rejected, since vendors differ
/// in which optional elements they emit.
pub fn parse_last_change(xml: &str) -> Option<StatusPatch> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut patch = StatusPatch::default();
    let mut saw_any = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                let name = e.name();
                let tag = String::from_utf8_lossy(name.as_ref()).to_string();
                let val_attr = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"val")
                    .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));

                if let Some(val) = val_attr {
                    apply_element(&mut patch, &tag, &val);
                    saw_any = true;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    if saw_any {
        Some(patch)
    } else {
        None
    }
}

fn apply_element(patch: &mut StatusPatch, tag: &str, val: &str) {
    match tag {
        "TransportState" => {
            patch.play_state = match val.to_ascii_uppercase().as_str() {
                "PLAYING" => Some(PlayState::Playing),
                "PAUSED_PLAYBACK" | "PAUSED" => Some(PlayState::Paused),
                "STOPPED" => Some(PlayState::Idle),
                "TRANSITIONING" => Some(PlayState::Buffering),
                _ => None,
            };
        }
        "CurrentTrackMetaData" => {
            // Full DIDL-Lite parsing is out of scope for the event path;
            // HTTP polling is the primary source for title/artist/album
            // (spec §4.5's priority table), so this is left for Parser.
        }
        "Volume" => {
            if let Ok(raw) = val.parse::<u32>() {
                patch.volume = Some((raw.min(100) as f32) / 100.0);
            }
        }
        "Mute" => {
            patch.muted = Some(val == "1" || val.eq_ignore_ascii_case("true"));
        }
        "RelativeTimePosition" | "AbsoluteTimePosition" => {
            // Initial position on track start (spec §4.9): most renderers
            // emit this as HH:MM:SS rather than a raw integer, unlike the
            // HTTP `curpos` field Parser handles.
            if let Some(seconds) = parse_time_flexible(val) {
                patch.position = Some(Some(seconds));
            }
        }
        "CurrentTrackDuration" | "CurrentMediaDuration" => {
            if let Some(seconds) = parse_time_flexible(val) {
                patch.duration = Some(if seconds == 0 { None } else { Some(seconds) });
            }
        }
        "CurrentPlayMode" => {
            let (shuffle, repeat) = match val.to_ascii_uppercase().as_str() {
                "NORMAL" => (Shuffle::Off, Repeat::Off),
                "REPEAT_ONE" => (Shuffle::Off, Repeat::One),
                "REPEAT_ALL" => (Shuffle::Off, Repeat::All),
                "SHUFFLE" | "RANDOM" => (Shuffle::On, Repeat::Off),
                "SHUFFLE_REPEAT_ONE" => (Shuffle::On, Repeat::One),
                "SHUFFLE_REPEAT_ALL" => (Shuffle::On, Repeat::All),
                _ => (Shuffle::Unknown, Repeat::Unknown),
            };
            patch.shuffle = Some(shuffle);
            patch.repeat = Some(repeat);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/">
        <InstanceID val="0">
            <TransportState val="PLAYING"/>
            <CurrentPlayMode val="SHUFFLE_REPEAT_ALL"/>
        </InstanceID>
    </Event>"#;

    #[test]
    fn decodes_transport_state_and_play_mode() {
        let patch = parse_last_change(SAMPLE).unwrap();
        assert_eq!(patch.play_state, Some(PlayState::Playing));
        assert_eq!(patch.shuffle, Some(Shuffle::On));
        assert_eq!(patch.repeat, Some(Repeat::All));
    }

    #[test]
    fn ignores_unknown_elements() {
        let xml = r#"<Event><InstanceID val="0"><SomeVendorField val="x"/></InstanceID></Event>"#;
        assert!(parse_last_change(xml).is_none());
    }

    #[test]
    fn mute_parsed_as_boolean() {
        let xml = r#"<Event><InstanceID val="0"><Mute val="1" channel="Master"/></InstanceID></Event>"#;
        let patch = parse_last_change(xml).unwrap();
        assert_eq!(patch.muted, Some(true));
    }

    #[test]
    fn decodes_initial_position_and_duration_on_track_start() {
        let xml = r#"<Event><InstanceID val="0">
            <RelativeTimePosition val="00:00:05"/>
            <CurrentTrackDuration val="00:03:45"/>
        </InstanceID></Event>"#;
        let patch = parse_last_change(xml).unwrap();
        assert_eq!(patch.position, Some(Some(5)));
        assert_eq!(patch.duration, Some(Some(225)));
    }

    #[test]
    fn zero_duration_element_becomes_none() {
        let xml = r#"<Event><InstanceID val="0"><CurrentTrackDuration val="00:00:00"/></InstanceID></Event>"#;
        let patch = parse_last_change(xml).unwrap();
        assert_eq!(patch.duration, Some(None));
    }

    struct ScriptedEventer {
        events: std::sync::Mutex<Vec<Option<String>>>,
        resubscribe_result: bool,
    }

    #[async_trait]
    impl UpnpEventer for ScriptedEventer {
        async fn next_event(&self) -> Option<String> {
            self.events.lock().unwrap().pop()
        }

        async fn resubscribe(&self) -> bool {
            self.resubscribe_result
        }
    }

    #[tokio::test]
    async fn eventing_loop_applies_patches_and_stops_when_resubscribe_fails() {
        let eventer = ScriptedEventer {
            events: std::sync::Mutex::new(vec![
                None,
                Some(r#"<Event><InstanceID val="0"><Mute val="1"/></InstanceID></Event>"#.to_string()),
            ]),
            resubscribe_result: true,
        };
        let mut applied = Vec::new();
        run_eventing_loop(&eventer, |patch| applied.push(patch)).await;
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].muted, Some(true));
    }

    #[tokio::test]
    async fn eventing_loop_stops_immediately_when_resubscribe_fails() {
        let eventer = ScriptedEventer {
            events: std::sync::Mutex::new(vec![None]),
            resubscribe_result: false,
        };
        let mut applied = Vec::new();
        run_eventing_loop(&eventer, |patch| applied.push(patch)).await;
        assert!(applied.is_empty());
    }
}
