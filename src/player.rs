//! Player: the per-device façade (spec §4.7).
//!
//! Grounded on `pmocontrol::music_renderer::musicrenderer::MusicRenderer`'s
//! read/write split (a cheap, lock-guarded status read plus a handful of
//! command methods that mutate then notify) — generalized from one UPnP
//! renderer to any vendor via `Transport` + `Dialect`, and converted to
//! `tokio::sync` locks since commands are now async I/O instead of
//! synchronous UPnP SOAP calls.

use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};
use tracing::{instrument, warn};

use crate::capability::CapabilityRegistry;
use crate::dialect::{is_self_transporting_source, Dialect, Operation};
use crate::errors::{ControlError, Result};
use crate::model::{
    AudioProGeneration, CapabilityFlag, DeviceIdentity, PlayState, Repeat, Shuffle, SourceKind, Status,
    StatusPatch, Tri, Vendor,
};
use crate::parser;
use crate::sync::StateSynchronizer;
use crate::transport::CommandTransport;

/// Notified exactly once per mutating command and once per `refresh` that
/// actually changes the merged `Status` (spec §4.7: "a single nullary
/// state-changed callback").
pub type ChangeCallback = Box<dyn Fn() + Send + Sync>;

pub struct Player {
    pub identity: DeviceIdentity,
    vendor: Vendor,
    generation: Option<AudioProGeneration>,
    transport: Arc<dyn CommandTransport>,
    dialect: Dialect,
    capabilities: Arc<CapabilityRegistry>,
    sync: RwLock<StateSynchronizer>,
    on_change: Mutex<Option<ChangeCallback>>,
    /// Set when this Player joins a group as a slave (spec §4.8); cleared on
    /// leave/kick. Weak so a group never keeps its members alive past the
    /// owner's `Arc<Player>`s.
    group_master: Mutex<Option<Weak<Player>>>,
}

impl Player {
    pub fn new(
        identity: DeviceIdentity,
        vendor: Vendor,
        generation: Option<AudioProGeneration>,
        transport: Arc<dyn CommandTransport>,
        capabilities: Arc<CapabilityRegistry>,
    ) -> Self {
        Player {
            identity,
            vendor,
            generation,
            transport,
            dialect: Dialect::for_vendor(vendor),
            capabilities,
            sync: RwLock::new(StateSynchronizer::new()),
            on_change: Mutex::new(None),
            group_master: Mutex::new(None),
        }
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn generation(&self) -> Option<AudioProGeneration> {
        self.generation
    }

    pub fn set_on_change(&self, callback: ChangeCallback) {
        // Locking a tokio Mutex from sync code is safe here: the lock is
        // never held across an await and contention is negligible.
        if let Ok(mut guard) = self.on_change.try_lock() {
            *guard = Some(callback);
        }
    }

    async fn notify_changed(&self) {
        let guard = self.on_change.lock().await;
        if let Some(cb) = guard.as_ref() {
            cb();
        }
    }

    /// Current merged state (spec §3/§4.7's read surface). Cheap: a clone
    /// of the synchronizer's cached `Status`.
    pub async fn status(&self) -> Status {
        self.sync.read().await.status().clone()
    }

    pub async fn http_first_ratio(&self) -> Option<f64> {
        self.sync.read().await.http_first_ratio()
    }

    fn loop_mode_map(&self) -> Box<dyn crate::dialect::LoopModeMap> {
        self.capabilities.loop_mode_map(self.vendor)
    }

    /// This Player's group master, if it currently belongs to one as a
    /// slave (spec §4.8). `None` once the owning `Group` has been dropped or
    /// this Player has left/been kicked.
    async fn master_ref(&self) -> Option<Arc<Player>> {
        self.group_master.lock().await.as_ref().and_then(Weak::upgrade)
    }

    /// Sets or clears this Player's group master reference; called by
    /// `Group::join`/`leave`/`kick`.
    pub async fn set_group_master(&self, master: Option<Weak<Player>>) {
        *self.group_master.lock().await = master;
    }

    /// Polls the device over HTTP and merges the result (spec §4.7: state
    /// only changes via `Refresh`, never implicitly as a side effect of a
    /// command). Fires the change callback whenever the merge alters any
    /// visible field, and on a track change additionally fetches metadata,
    /// presets, and audio-output status, since those are only meaningful
    /// once the new track is known.
    #[instrument(skip(self), fields(device = %self.identity.uuid))]
    pub async fn refresh(&self) -> Result<()> {
        let raw = self.transport.execute(&self.dialect.wire_command(&Operation::GetStatus)).await?;
        let mut patch = parser::parse_player_status(&raw.body)
            .ok_or_else(|| ControlError::ResponseInvalid(
                crate::errors::RequestContext {
                    device: self.identity.uuid.clone(),
                    endpoint: "getPlayerStatus".to_string(),
                    attempt: 1,
                },
                "not valid JSON".to_string(),
            ))?;

        if let Some(raw_loop) = parser::extract_raw_loop_mode(&raw.body) {
            let source_is_live = patch
                .source
                .as_ref()
                .and_then(|s| s.as_deref())
                .map(is_self_transporting_source)
                .unwrap_or(false);
            if !source_is_live {
                let (shuffle, repeat) = self.loop_mode_map().decode(raw_loop);
                patch.shuffle = Some(shuffle);
                patch.repeat = Some(repeat);
            }
        }

        let before = self.status().await;
        {
            let mut sync = self.sync.write().await;
            sync.apply(&patch, SourceKind::Http, Instant::now());
        }

        let track_changed = {
            let mid = self.status().await;
            mid.title != before.title || mid.artist != before.artist || mid.album != before.album
        };
        if track_changed {
            self.refresh_track_dependent_state().await;
        }

        let after = self.status().await;
        if after != before {
            self.notify_changed().await;
        }
        Ok(())
    }

    /// On a track change, fetches the state that is only meaningful once the
    /// new track is known (spec §4.7). Each fetch is best-effort: a failure
    /// is logged and swallowed rather than failing the whole refresh, since
    /// the primary `GetStatus` merge above already succeeded.
    async fn refresh_track_dependent_state(&self) {
        match self.transport.execute(&self.dialect.wire_command(&Operation::GetMetadata)).await {
            Ok(raw) => {
                if let Some(patch) = parser::parse_player_status(&raw.body) {
                    self.sync.write().await.apply(&patch, SourceKind::Http, Instant::now());
                }
            }
            Err(err) => warn!(device = %self.identity.uuid, error = %err, "GetMetadata failed after track change"),
        }

        match self.transport.execute(&self.dialect.wire_command(&Operation::GetPresets)).await {
            Ok(raw) => {
                if let Some(presets) = parser::parse_presets(&raw.body) {
                    self.sync
                        .write()
                        .await
                        .apply(&StatusPatch { presets: Some(Some(presets)), ..Default::default() }, SourceKind::Http, Instant::now());
                }
            }
            Err(err) => warn!(device = %self.identity.uuid, error = %err, "GetPresets failed after track change"),
        }

        match self.transport.execute(&self.dialect.wire_command(&Operation::GetAudioOutput)).await {
            Ok(raw) => {
                if let Some(mode) = parser::parse_audio_output_mode(&raw.body) {
                    self.sync.write().await.apply(
                        &StatusPatch { audio_output_mode: Some(Some(mode)), ..Default::default() },
                        SourceKind::Http,
                        Instant::now(),
                    );
                }
            }
            Err(err) => warn!(device = %self.identity.uuid, error = %err, "GetAudioOutput failed after track change"),
        }
    }

    async fn apply_optimistic(&self, patch: StatusPatch) {
        let mut sync = self.sync.write().await;
        sync.apply(&patch, SourceKind::Optimistic, Instant::now());
        drop(sync);
        self.notify_changed().await;
    }

    async fn issue(&self, op: Operation) -> Result<()> {
        self.transport.execute(&self.dialect.wire_command(&op)).await?;
        Ok(())
    }

    pub async fn play(&self) -> Result<()> {
        if let Some(master) = self.master_ref().await {
            return Box::pin(master.play()).await;
        }
        self.issue(Operation::Play).await?;
        self.apply_optimistic(StatusPatch {
            play_state: Some(PlayState::Playing),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        if let Some(master) = self.master_ref().await {
            return Box::pin(master.pause()).await;
        }
        self.issue(Operation::Pause).await?;
        self.apply_optimistic(StatusPatch {
            play_state: Some(PlayState::Paused),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        if let Some(master) = self.master_ref().await {
            return Box::pin(master.resume()).await;
        }
        self.issue(Operation::Resume).await?;
        self.apply_optimistic(StatusPatch {
            play_state: Some(PlayState::Playing),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// `Stop` on a live-stream source is rewritten to `Pause` (spec §4.7):
    /// most firmwares drop the live connection entirely on `stop`, which
    /// for radio/line-in means "disconnected" rather than "paused and
    /// resumable", so the façade prefers the resumable verb when it can
    /// tell the source is self-transporting. A slave reroutes to the
    /// master before any of this, same as every other transport command
    /// (spec §4.8).
    pub async fn stop(&self) -> Result<()> {
        if let Some(master) = self.master_ref().await {
            return Box::pin(master.stop()).await;
        }
        let is_live = self
            .status()
            .await
            .source
            .as_deref()
            .map(is_self_transporting_source)
            .unwrap_or(false);
        if is_live {
            return self.pause().await;
        }
        self.issue(Operation::Stop).await?;
        self.apply_optimistic(StatusPatch {
            play_state: Some(PlayState::Idle),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// Compound `MediaPlayPause` (spec §4.7): toggles based on the current
    /// merged play state rather than requiring the caller to track it.
    pub async fn toggle_play_pause(&self) -> Result<()> {
        match self.status().await.play_state {
            PlayState::Playing => self.pause().await,
            PlayState::Paused => self.resume().await,
            PlayState::Idle | PlayState::Buffering => self.play().await,
        }
    }

    pub async fn next(&self) -> Result<()> {
        if let Some(master) = self.master_ref().await {
            return Box::pin(master.next()).await;
        }
        self.issue(Operation::Next).await
    }

    pub async fn previous(&self) -> Result<()> {
        if let Some(master) = self.master_ref().await {
            return Box::pin(master.previous()).await;
        }
        self.issue(Operation::Previous).await
    }

    pub async fn seek(&self, position_secs: u32) -> Result<()> {
        self.issue(Operation::Seek(position_secs)).await?;
        self.apply_optimistic(StatusPatch {
            position: Some(Some(position_secs)),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// Volume/mute are per-device, not rerouted to the master (spec §4.8);
    /// a slave's change additionally wakes the master's callback, since
    /// `Group::aggregate_volume`/`aggregate_muted` depend on every member.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        let clamped = volume.clamp(0.0, 1.0);
        let wire = (clamped * 100.0).round() as u8;
        self.issue(Operation::SetVolume(wire)).await?;
        self.apply_optimistic(StatusPatch {
            volume: Some(clamped),
            ..Default::default()
        })
        .await;
        if let Some(master) = self.master_ref().await {
            master.notify_changed().await;
        }
        Ok(())
    }

    pub async fn set_mute(&self, muted: bool) -> Result<()> {
        self.issue(Operation::SetMute(muted)).await?;
        self.apply_optimistic(StatusPatch {
            muted: Some(muted),
            ..Default::default()
        })
        .await;
        if let Some(master) = self.master_ref().await {
            master.notify_changed().await;
        }
        Ok(())
    }

    /// Sets shuffle while preserving the current repeat mode (spec §4.7 and
    /// §8 scenario 6): reads the current `Repeat` before encoding, so a
    /// caller changing one field never silently resets the other.
    pub async fn set_shuffle(&self, shuffle_on: bool) -> Result<()> {
        let current_repeat = self.status().await.repeat;
        let shuffle = if shuffle_on { Shuffle::On } else { Shuffle::Off };
        self.set_loop_mode(shuffle, current_repeat).await
    }

    pub async fn set_repeat(&self, repeat: Repeat) -> Result<()> {
        let current_shuffle = self.status().await.shuffle;
        self.set_loop_mode(current_shuffle, repeat).await
    }

    async fn set_loop_mode(&self, shuffle: Shuffle, repeat: Repeat) -> Result<()> {
        let resolved_shuffle = if shuffle == Shuffle::Unknown { Shuffle::Off } else { shuffle };
        let resolved_repeat = if repeat == Repeat::Unknown { Repeat::Off } else { repeat };
        let wire = self.loop_mode_map().encode(resolved_shuffle, resolved_repeat);
        self.issue(Operation::SetLoopMode(wire)).await?;
        self.apply_optimistic(StatusPatch {
            shuffle: Some(resolved_shuffle),
            repeat: Some(resolved_repeat),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    pub async fn set_source(&self, source: String) -> Result<()> {
        self.issue(Operation::SetSource(source.clone())).await?;
        self.apply_optimistic(StatusPatch {
            raw_source: Some(Some(source)),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// Audio output switching (spec §4.7, §9 Open Question): the numeric
    /// hardware-mode wire values are only documented for WiiM Ultra's
    /// headphone jack and the generic Bluetooth toggle. For every other
    /// device this returns `Unsupported` rather than guessing a mode
    /// number that might silently select the wrong output — see DESIGN.md.
    pub async fn set_audio_output(&self, mode: AudioOutputMode) -> Result<()> {
        let wire = match mode {
            AudioOutputMode::Speaker => 0,
            AudioOutputMode::Bluetooth => 1,
            AudioOutputMode::HeadphoneJack => {
                let flag = self
                    .capabilities
                    .get(&self.identity.uuid, self.vendor, self.generation, CapabilityFlag::AudioOutputSwitching);
                if !flag.is_yes() {
                    return Err(ControlError::unsupported(
                        "SetAudioOutput(HeadphoneJack)",
                        "not confirmed supported on this device; probe before using",
                    ));
                }
                2
            }
        };
        self.issue(Operation::SetAudioOutput(wire)).await?;
        self.apply_optimistic(StatusPatch {
            audio_output_mode: Some(Some(format!("{:?}", mode))),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// Channel-balance trim (spec §4.7's write surface): `balance` is a
    /// signed percentage, negative toward the left channel.
    pub async fn set_channel_balance(&self, balance: i8) -> Result<()> {
        let clamped = balance.clamp(-100, 100);
        self.issue(Operation::SetChannelBalance(clamped)).await?;
        self.apply_optimistic(StatusPatch {
            channel_balance: Some(Some(clamped as f32 / 100.0)),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    pub async fn set_eq_preset(&self, preset: String) -> Result<()> {
        let flag = self.capabilities.get(&self.identity.uuid, self.vendor, self.generation, CapabilityFlag::Eq);
        if flag == Tri::No {
            return Err(ControlError::unsupported("SetEQPreset", "device has no EQ"));
        }
        self.issue(Operation::SetEqPreset(preset.clone())).await?;
        self.apply_optimistic(StatusPatch {
            eq_preset: Some(Some(preset)),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    pub async fn set_sleep_timer(&self, seconds: u32) -> Result<()> {
        let flag = self.capabilities.get(&self.identity.uuid, self.vendor, self.generation, CapabilityFlag::SleepTimer);
        if flag == Tri::No {
            return Err(ControlError::unsupported("SetSleepTimer", "device has no sleep timer"));
        }
        self.issue(Operation::SetSleepTimer(seconds)).await
    }

    /// Sets or updates an alarm clock slot (spec §4.7's write surface).
    pub async fn set_alarm(&self, index: u32, hour: u8, minute: u8, enabled: bool) -> Result<()> {
        let flag = self.capabilities.get(&self.identity.uuid, self.vendor, self.generation, CapabilityFlag::Alarms);
        if flag == Tri::No {
            return Err(ControlError::unsupported("SetAlarm", "device has no alarm clock"));
        }
        self.issue(Operation::SetAlarm { index, hour, minute, enabled }).await
    }

    /// Toggles the front-panel LED (spec §4.7's write surface).
    pub async fn set_led(&self, on: bool) -> Result<()> {
        let flag = self.capabilities.get(&self.identity.uuid, self.vendor, self.generation, CapabilityFlag::LedControl);
        if flag == Tri::No {
            return Err(ControlError::unsupported("SetLED", "device has no LED control"));
        }
        self.issue(Operation::SetLed(on)).await
    }

    pub async fn reboot(&self) -> Result<()> {
        self.issue(Operation::Reboot).await
    }

    /// Begins installing a firmware update already reported as available
    /// (spec §4.7's write surface); the device itself tracks progress and
    /// reboots when done.
    pub async fn install_firmware_update(&self) -> Result<()> {
        let flag = self
            .capabilities
            .get(&self.identity.uuid, self.vendor, self.generation, CapabilityFlag::FirmwareInstall);
        if flag == Tri::No {
            return Err(ControlError::unsupported("InstallFirmwareUpdate", "device has no firmware-install capability"));
        }
        self.issue(Operation::InstallFirmwareUpdate).await
    }

    /// Plays an arbitrary URL (spec §4.7's write surface).
    pub async fn play_url(&self, url: String) -> Result<()> {
        self.issue(Operation::PlayUrl(url)).await?;
        self.apply_optimistic(StatusPatch {
            play_state: Some(PlayState::Playing),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// Plays a saved preset slot (spec §4.7's write surface).
    pub async fn play_preset(&self, number: u32) -> Result<()> {
        self.issue(Operation::PlayPreset(number)).await?;
        self.apply_optimistic(StatusPatch {
            play_state: Some(PlayState::Playing),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// Plays a transient notification/prompt sound (spec §4.7's write
    /// surface); the device resumes whatever it was doing beforehand, so no
    /// optimistic play-state change is applied here.
    pub async fn play_notification(&self, url: String) -> Result<()> {
        self.issue(Operation::PlayNotification(url)).await
    }

    pub async fn record_unsupported(&self, flag: CapabilityFlag) {
        self.capabilities.record_probe_result(&self.identity.uuid, flag, Tri::No);
        warn!(device = %self.identity.uuid, ?flag, "device rejected operation, marking capability unsupported");
    }

    /// Issues the slave-side `JoinGroupMaster` wire command (spec §6);
    /// called by `Group::join` on the device being added.
    pub async fn transport_issue_join(&self, master_host: &str) -> Result<()> {
        self.issue(Operation::JoinSlave(master_host.to_string())).await?;
        self.apply_optimistic(StatusPatch {
            role: Some(crate::model::Role::Slave),
            master_host: Some(Some(master_host.to_string())),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// Issues the `Ungroup` wire command; called by `Group::leave` on the
    /// device being removed.
    pub async fn transport_issue_leave(&self) -> Result<()> {
        self.issue(Operation::LeaveGroup).await?;
        self.apply_optimistic(StatusPatch {
            role: Some(crate::model::Role::Solo),
            master_host: Some(None),
            ..Default::default()
        })
        .await;
        Ok(())
    }

    /// Issues the master-side `SlaveKickout` wire command; called by
    /// `Group::kick` on the master.
    pub async fn transport_issue_kick(&self, slave_host: &str) -> Result<()> {
        self.issue(Operation::KickSlave(slave_host.to_string())).await
    }

    /// Updates this player's cached role without a wire call, then fires
    /// the change callback (spec §4.8's cross-notification fan-out).
    pub async fn refresh_role(&self, role: crate::model::Role, master_host: Option<String>) {
        let mut sync = self.sync.write().await;
        sync.apply(
            &StatusPatch {
                role: Some(role),
                master_host: Some(master_host),
                ..Default::default()
            },
            SourceKind::Optimistic,
            Instant::now(),
        );
        drop(sync);
        self.notify_changed().await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioOutputMode {
    Speaker,
    Bluetooth,
    HeadphoneJack,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{identity, FakeTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_player(id: &str, host: &str, vendor: Vendor, fake: Arc<FakeTransport>) -> Arc<Player> {
        let registry = Arc::new(CapabilityRegistry::new());
        Arc::new(Player::new(identity(id, host), vendor, None, fake as Arc<dyn CommandTransport>, registry))
    }

    #[tokio::test]
    async fn scenario_play_pause_toggle_on_streaming_source() {
        // Spec §8 scenario 3: toggling play/pause on a normal streaming
        // source behaves as a plain toggle, no Stop->Pause rewrite.
        let fake = Arc::new(FakeTransport::new());
        let player = make_player("dev1", "10.0.0.11", Vendor::WiiM, fake.clone());
        fake.push_ok(r#"{"status":"play","mode":"Spotify","vol":"50"}"#);
        player.refresh().await.unwrap();
        assert_eq!(player.status().await.play_state, PlayState::Playing);

        player.toggle_play_pause().await.unwrap();
        assert_eq!(player.status().await.play_state, PlayState::Paused);
        assert!(fake.issued_commands().iter().any(|c| c.contains("setPlayerCmd:pause")));
    }

    #[tokio::test]
    async fn scenario_stop_on_live_radio_rewrites_to_pause() {
        // Spec §8 scenario 4: Stop on a live radio source becomes Pause.
        let fake = Arc::new(FakeTransport::new());
        let player = make_player("dev2", "10.0.0.12", Vendor::WiiM, fake.clone());
        fake.push_ok(r#"{"status":"play","mode":"TuneIn"}"#);
        player.refresh().await.unwrap();

        player.stop().await.unwrap();
        assert_eq!(player.status().await.play_state, PlayState::Paused);
        assert!(fake.issued_commands().iter().any(|c| c.contains("setPlayerCmd:pause")));
        assert!(!fake.issued_commands().iter().any(|c| c.contains("setPlayerCmd:stop")));
    }

    #[tokio::test]
    async fn refresh_notifies_on_non_play_state_change() {
        let fake = Arc::new(FakeTransport::new());
        let player = make_player("dev3", "10.0.0.13", Vendor::WiiM, fake.clone());
        let notified = Arc::new(AtomicUsize::new(0));
        let notified2 = notified.clone();
        player.set_on_change(Box::new(move || {
            notified2.fetch_add(1, Ordering::SeqCst);
        }));

        fake.push_ok(r#"{"status":"play","vol":"50"}"#);
        player.refresh().await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        fake.push_ok(r#"{"status":"play","vol":"80"}"#);
        player.refresh().await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 2, "volume-only change must still notify");
    }

    #[tokio::test]
    async fn refresh_fetches_track_dependent_state_on_track_change() {
        let fake = Arc::new(FakeTransport::new());
        let player = make_player("dev4", "10.0.0.14", Vendor::WiiM, fake.clone());
        fake.push_ok(r#"{"status":"play","Title":"Song A","vol":"50"}"#);
        fake.push_ok(r#"{"Title":"Song A"}"#);
        fake.push_ok(r#"[]"#);
        fake.push_ok(r#"{"mode":"0"}"#);
        player.refresh().await.unwrap();

        let issued = fake.issued_commands();
        assert!(issued.iter().any(|c| c == "getPlayerStatus"));
        assert!(issued.iter().any(|c| c == "getMetaInfo"));
        assert!(issued.iter().any(|c| c == "getPresetInfo"));
        assert!(issued.iter().any(|c| c == "getNewAudioOutputHardwareMode"));
    }

    #[tokio::test]
    async fn refresh_does_not_fetch_track_dependent_state_without_track_change() {
        // The very first refresh always looks like a track change (there is
        // no prior title to compare against), so it legitimately issues the
        // supplemental fetches once; what must NOT happen is a second,
        // same-track refresh issuing them again.
        let fake = Arc::new(FakeTransport::new());
        let player = make_player("dev5", "10.0.0.15", Vendor::WiiM, fake.clone());
        fake.push_ok(r#"{"status":"play","Title":"Song A"}"#);
        player.refresh().await.unwrap();
        let metadata_calls_after_first_refresh =
            fake.issued_commands().iter().filter(|c| c.as_str() == "getMetaInfo").count();

        fake.push_ok(r#"{"status":"play","Title":"Song A","vol":"70"}"#);
        player.refresh().await.unwrap();

        let issued = fake.issued_commands();
        assert_eq!(issued.iter().filter(|c| c.as_str() == "getPlayerStatus").count(), 2);
        assert_eq!(
            issued.iter().filter(|c| c.as_str() == "getMetaInfo").count(),
            metadata_calls_after_first_refresh,
            "same-track refresh must not repeat the supplemental fetches"
        );
    }
}
