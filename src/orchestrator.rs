//! Orchestrator: the per-Player refresh-loop scheduler (spec §4.10).
//!
//! Grounded on `pmocontrol::music_renderer::watcher`'s background polling
//! thread; converted from a `std::thread` + `crossbeam_channel` cancel
//! signal into a tokio task + `tokio::sync::watch` cancel channel, since the
//! rest of the crate is async (see `transport.rs`'s module doc for why).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use crate::model::{AudioProGeneration, PlayState, Role, Vendor};
use crate::player::Player;

/// Only original-generation Audio Pro units run the older firmware that
/// polls more conservatively (spec §4.7's polling-strategy table); every
/// other vendor/generation combination is "modern" for scheduling purposes.
fn is_legacy_firmware(vendor: Vendor, generation: Option<AudioProGeneration>) -> bool {
    matches!((vendor, generation), (Vendor::AudioPro, Some(AudioProGeneration::Original)))
}

/// How often `refresh` is called, varying by role, play state, and
/// firmware generation (spec §4.7's polling-strategy table): a playing
/// device is always polled at a flat 5s since HTTP is not the source of
/// truth for position while playing (the local estimator is); idle and
/// slave devices poll less often still, and legacy firmware backs off
/// further since it is slower to answer and changes state less often.
fn interval_for(role: Role, play_state: PlayState, vendor: Vendor, generation: Option<AudioProGeneration>) -> Duration {
    let legacy = is_legacy_firmware(vendor, generation);
    match (role, play_state) {
        (Role::Slave, _) => Duration::from_secs(if legacy { 10 } else { 5 }),
        (_, PlayState::Playing) => Duration::from_secs(5),
        (_, PlayState::Paused | PlayState::Idle | PlayState::Buffering) => {
            Duration::from_secs(if legacy { 15 } else { 5 })
        }
    }
}

/// A single refresh-loop handle. Dropping it does not stop the loop;
/// call `stop` explicitly, matching the teacher's explicit-shutdown watcher.
pub struct RefreshHandle {
    cancel_tx: watch::Sender<bool>,
}

impl RefreshHandle {
    pub fn stop(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

/// Spawns a refresh loop for one `Player`. Transport/parse errors are
/// swallowed into a warning log (spec §7: polling failures are not
/// propagated to callers, since the next tick will simply try again) rather
/// than terminating the loop.
pub fn spawn_refresh_loop(player: Arc<Player>) -> RefreshHandle {
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        loop {
            if *cancel_rx.borrow() {
                break;
            }

            if let Err(err) = player.refresh().await {
                warn!(device = %player.identity.uuid, error = %err, "refresh failed, will retry next tick");
            }

            let status = player.status().await;
            let delay = interval_for(status.role, status.play_state, player.vendor(), player.generation());

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = cancel_rx.changed() => {
                    if changed.is_ok() && *cancel_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    RefreshHandle { cancel_tx }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test_logging() {
        let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
    }

    #[test]
    fn playing_and_idle_poll_at_the_same_flat_rate_on_modern_firmware() {
        init_test_logging();
        assert_eq!(
            interval_for(Role::Solo, PlayState::Playing, Vendor::WiiM, None),
            interval_for(Role::Solo, PlayState::Idle, Vendor::WiiM, None)
        );
    }

    #[test]
    fn slave_polls_slower_regardless_of_play_state() {
        assert_eq!(
            interval_for(Role::Slave, PlayState::Playing, Vendor::WiiM, None),
            interval_for(Role::Slave, PlayState::Paused, Vendor::WiiM, None)
        );
    }

    #[test]
    fn legacy_audio_pro_firmware_polls_idle_slower_than_modern() {
        let legacy = interval_for(
            Role::Solo,
            PlayState::Idle,
            Vendor::AudioPro,
            Some(AudioProGeneration::Original),
        );
        let modern = interval_for(Role::Solo, PlayState::Idle, Vendor::AudioPro, Some(AudioProGeneration::MkII));
        assert!(legacy > modern);
    }

    #[test]
    fn legacy_audio_pro_firmware_polls_slave_slower_than_modern() {
        let legacy = interval_for(
            Role::Slave,
            PlayState::Playing,
            Vendor::AudioPro,
            Some(AudioProGeneration::Original),
        );
        let modern = interval_for(Role::Slave, PlayState::Playing, Vendor::AudioPro, Some(AudioProGeneration::MkII));
        assert!(legacy > modern);
    }
}
