//! EndpointCatalog + Dialect: abstract operation → wire command, and the
//! per-vendor loop-mode bijection (spec §4.2, §4.3, §6).
//!
//! Grounded on `pmocontrol::linkplay_client` (the `httpapi.asp?command=...`
//! verb shape) and `pmocontrol::arylic_client` (vendor-specific wire quirks
//! kept in their own small module rather than leaked into the façade) — here
//! generalized into one table-driven `Dialect` per vendor instead of one
//! Rust module per vendor, since the wire verbs themselves (§6) are shared
//! across the LinkPlay-firmware family and only the loop-mode table and a
//! handful of quirks vary.

use crate::model::{Repeat, Shuffle, Vendor};

/// Abstract operations the rest of the crate issues (spec §4.2).
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    GetStatus,
    GetDeviceInfo,
    GetMetadata,
    GetMultiroomStatus,
    GetPresets,
    GetEq,
    GetAudioOutput,
    SetVolume(u8),
    SetMute(bool),
    SetSource(String),
    SetLoopMode(u8),
    Play,
    Pause,
    Resume,
    Stop,
    Next,
    Previous,
    Seek(u32),
    SetAudioOutput(u8),
    SetLed(bool),
    SetChannelBalance(i8),
    SetEqPreset(String),
    CreateGroup,
    JoinSlave(String),
    KickSlave(String),
    LeaveGroup,
    Reboot,
    InstallFirmwareUpdate,
    SetSleepTimer(u32),
    SetAlarm { index: u32, hour: u8, minute: u8, enabled: bool },
    SubwooferGet,
    SubwooferSet(u8),
    PlayUrl(String),
    PlayPreset(u32),
    PlayNotification(String),
}

impl Operation {
    /// Name used in error messages and the capability/support lookup — not
    /// the wire verb itself.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetStatus => "GetStatus",
            Operation::GetDeviceInfo => "GetDeviceInfo",
            Operation::GetMetadata => "GetMetadata",
            Operation::GetMultiroomStatus => "GetMultiroomStatus",
            Operation::GetPresets => "GetPresets",
            Operation::GetEq => "GetEQ",
            Operation::GetAudioOutput => "GetAudioOutput",
            Operation::SetVolume(_) => "SetVolume",
            Operation::SetMute(_) => "SetMute",
            Operation::SetSource(_) => "SetSource",
            Operation::SetLoopMode(_) => "SetLoopMode",
            Operation::Play => "Play",
            Operation::Pause => "Pause",
            Operation::Resume => "Resume",
            Operation::Stop => "Stop",
            Operation::Next => "Next",
            Operation::Previous => "Previous",
            Operation::Seek(_) => "Seek",
            Operation::SetAudioOutput(_) => "SetAudioOutput",
            Operation::SetLed(_) => "SetLED",
            Operation::SetChannelBalance(_) => "SetChannelBalance",
            Operation::SetEqPreset(_) => "SetEQPreset",
            Operation::CreateGroup => "CreateGroup",
            Operation::JoinSlave(_) => "JoinSlave",
            Operation::KickSlave(_) => "KickSlave",
            Operation::LeaveGroup => "LeaveGroup",
            Operation::Reboot => "Reboot",
            Operation::InstallFirmwareUpdate => "InstallFirmwareUpdate",
            Operation::SetSleepTimer(_) => "SetSleepTimer",
            Operation::SetAlarm { .. } => "SetAlarm",
            Operation::SubwooferGet => "SubwooferGet",
            Operation::SubwooferSet(_) => "SubwooferSet",
            Operation::PlayUrl(_) => "PlayURL",
            Operation::PlayPreset(_) => "PlayPreset",
            Operation::PlayNotification(_) => "PlayNotification",
        }
    }

    /// Whether a documented JSON reply is expected (spec §4.2): setters
    /// without one are treated as succeeding on a bare HTTP 200.
    pub fn expects_json_reply(&self) -> bool {
        matches!(
            self,
            Operation::GetStatus
                | Operation::GetDeviceInfo
                | Operation::GetMetadata
                | Operation::GetMultiroomStatus
                | Operation::GetPresets
                | Operation::GetEq
                | Operation::GetAudioOutput
        )
    }
}

/// Per-vendor routing from abstract `Operation` to wire command string, and
/// response-shape interpretation. One `Dialect` instance per `Vendor`.
#[derive(Clone, Copy, Debug)]
pub struct Dialect {
    vendor: Vendor,
}

impl Dialect {
    pub fn for_vendor(vendor: Vendor) -> Self {
        Dialect { vendor }
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Vendor-specific pre-command: for firmwares where "set shuffle" is
    /// really "set loop mode to f(current repeat, shuffle)" (spec §4.2),
    /// this is folded into `wire_command` directly via `SetLoopMode`, so
    /// there is nothing left for callers to special-case here — the
    /// indirection is absorbed by always routing shuffle/repeat writes
    /// through `LoopModeMap::encode` before reaching the dialect.
    pub fn wire_command(&self, op: &Operation) -> String {
        match op {
            Operation::GetStatus => "getPlayerStatus".to_string(),
            Operation::GetDeviceInfo => "getStatusEx".to_string(),
            Operation::GetMetadata => "getMetaInfo".to_string(),
            Operation::GetMultiroomStatus => "multiroom:getSlaveList".to_string(),
            Operation::GetPresets => "getPresetInfo".to_string(),
            Operation::GetEq => "EQGet".to_string(),
            Operation::GetAudioOutput => "getNewAudioOutputHardwareMode".to_string(),
            Operation::SetVolume(v) => format!("setPlayerCmd:vol:{}", v),
            Operation::SetMute(m) => format!("setPlayerCmd:mute:{}", if *m { 1 } else { 0 }),
            Operation::SetSource(s) => format!("setPlayerCmd:switchmode:{}", s),
            Operation::SetLoopMode(n) => format!("setPlayerCmd:loopmode:{}", n),
            Operation::Play => "setPlayerCmd:play".to_string(),
            Operation::Pause => "setPlayerCmd:pause".to_string(),
            Operation::Resume => "setPlayerCmd:resume".to_string(),
            Operation::Stop => "setPlayerCmd:stop".to_string(),
            Operation::Next => "setPlayerCmd:next".to_string(),
            Operation::Previous => "setPlayerCmd:prev".to_string(),
            Operation::Seek(s) => format!("setPlayerCmd:seek:{}", s),
            Operation::SetAudioOutput(mode) => format!("setAudioOutputHardwareMode:{}", mode),
            Operation::SetLed(on) => format!("setLED:{}", if *on { 1 } else { 0 }),
            Operation::SetChannelBalance(balance) => format!("setPlayerCmd:balance:{}", balance),
            Operation::SetEqPreset(name) => format!("setPlayerCmd:equalizer:{}", name),
            Operation::CreateGroup => "multiroom:CreateGroup".to_string(),
            Operation::JoinSlave(ip) => format!("multiroom:JoinGroupMaster:{}", ip),
            Operation::KickSlave(ip) => format!("multiroom:SlaveKickout:{}", ip),
            Operation::LeaveGroup => "multiroom:Ungroup".to_string(),
            Operation::Reboot => "reboot".to_string(),
            Operation::InstallFirmwareUpdate => "getMvRemoteUpdateStart".to_string(),
            Operation::SetSleepTimer(secs) => format!("setShutdown:{}", secs),
            Operation::SetAlarm {
                index,
                hour,
                minute,
                enabled,
            } => format!(
                "setAlarmClock:{}:{:02}:{:02}:{}",
                index,
                hour,
                minute,
                if *enabled { 1 } else { 0 }
            ),
            Operation::SubwooferGet => "getSubwooferVol".to_string(),
            Operation::SubwooferSet(v) => format!("setSubwooferVol:{}", v),
            Operation::PlayUrl(url) => format!("setPlayerCmd:play:{}", url),
            Operation::PlayPreset(n) => format!("setPresetCmd:{}", n),
            Operation::PlayNotification(url) => format!("playPromptUrl:{}", url),
        }
    }
}

/// Sources that control their own transport: physical inputs and live
/// broadcast streams, for which shuffle/repeat are meaningless (spec §4.4,
/// §4.7's `Stop`→`Pause` rule). Centralized here per SPEC_FULL's
/// supplementary-features note rather than duplicated at each call site.
const SELF_TRANSPORTING_SOURCES: &[&str] = &[
    "wifi",
    "webradio",
    "iheartradio",
    "pandora",
    "tunein",
    "line in",
    "line-in",
    "optical",
    "coaxial",
    "bluetooth",
    "usb",
    "phono",
    "hdmi",
];

pub fn is_self_transporting_source(normalized_source: &str) -> bool {
    let lower = normalized_source.to_ascii_lowercase();
    SELF_TRANSPORTING_SOURCES.iter().any(|s| lower == *s)
}

/// The single authority for loop-mode encoding/decoding (spec §4.3).
/// `CapabilityRegistry::loop_mode_map` hands out the vendor-correct instance;
/// nothing else is allowed to interpret a raw `loopMode` integer.
pub trait LoopModeMap: Send + Sync {
    fn decode(&self, loop_mode: u8) -> (Shuffle, Repeat);
    fn encode(&self, shuffle: Shuffle, repeat: Repeat) -> u8;
}

/// WiiM's mapping (spec §6): the example table given verbatim. `3` and `4`
/// both decode to (shuffle on, repeat off); `4` is kept for defensive
/// decoding of devices that emit it but is never produced by `encode` — see
/// DESIGN.md's Open Question resolution for why this collision means the
/// `encode(decode(n)) == n` property only holds over the canonical range.
#[derive(Clone, Copy, Debug, Default)]
pub struct WiimLoopModeMap;

impl LoopModeMap for WiimLoopModeMap {
    fn decode(&self, loop_mode: u8) -> (Shuffle, Repeat) {
        match loop_mode {
            0 => (Shuffle::Off, Repeat::Off),
            1 => (Shuffle::Off, Repeat::One),
            2 => (Shuffle::Off, Repeat::All),
            3 | 4 => (Shuffle::On, Repeat::Off),
            5 => (Shuffle::On, Repeat::One),
            6 => (Shuffle::On, Repeat::All),
            _ => (Shuffle::Unknown, Repeat::Unknown),
        }
    }

    fn encode(&self, shuffle: Shuffle, repeat: Repeat) -> u8 {
        match (shuffle, repeat) {
            (Shuffle::Off, Repeat::Off) => 0,
            (Shuffle::Off, Repeat::One) => 1,
            (Shuffle::Off, Repeat::All) => 2,
            (Shuffle::On, Repeat::Off) => 3,
            (Shuffle::On, Repeat::One) => 5,
            (Shuffle::On, Repeat::All) => 6,
            // Unknown collapses to the unshuffled/non-repeating default;
            // callers should never encode an Unknown half deliberately.
            _ => 0,
        }
    }
}

/// Arylic devices use the same LinkPlay-derived firmware loop-mode table;
/// kept as a distinct type so a future firmware generation can diverge
/// without touching `WiimLoopModeMap` (spec §4.3: "others differ and must
/// be looked up in Dialect").
pub type ArylicLoopModeMap = WiimLoopModeMap;
pub type GenericLinkPlayLoopModeMap = WiimLoopModeMap;

/// Audio Pro firmwares reorder the repeat-all/repeat-one slots relative to
/// WiiM's table. Values beyond what Audio Pro documents fall back to
/// `Unknown` on decode rather than guessing.
#[derive(Clone, Copy, Debug, Default)]
pub struct AudioProLoopModeMap;

impl LoopModeMap for AudioProLoopModeMap {
    fn decode(&self, loop_mode: u8) -> (Shuffle, Repeat) {
        match loop_mode {
            0 => (Shuffle::Off, Repeat::Off),
            1 => (Shuffle::Off, Repeat::All),
            2 => (Shuffle::Off, Repeat::One),
            3 => (Shuffle::On, Repeat::Off),
            4 => (Shuffle::On, Repeat::All),
            5 => (Shuffle::On, Repeat::One),
            _ => (Shuffle::Unknown, Repeat::Unknown),
        }
    }

    fn encode(&self, shuffle: Shuffle, repeat: Repeat) -> u8 {
        match (shuffle, repeat) {
            (Shuffle::Off, Repeat::Off) => 0,
            (Shuffle::Off, Repeat::All) => 1,
            (Shuffle::Off, Repeat::One) => 2,
            (Shuffle::On, Repeat::Off) => 3,
            (Shuffle::On, Repeat::All) => 4,
            (Shuffle::On, Repeat::One) => 5,
            _ => 0,
        }
    }
}

pub fn loop_mode_map_for(vendor: Vendor) -> Box<dyn LoopModeMap> {
    match vendor {
        Vendor::WiiM => Box::new(WiimLoopModeMap),
        Vendor::Arylic => Box::new(ArylicLoopModeMap::default()),
        Vendor::AudioPro => Box::new(AudioProLoopModeMap),
        Vendor::GenericLinkPlay => Box::new(GenericLinkPlayLoopModeMap::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiim_wire_commands_match_spec_verbs() {
        let d = Dialect::for_vendor(Vendor::WiiM);
        assert_eq!(d.wire_command(&Operation::GetStatus), "getPlayerStatus");
        assert_eq!(d.wire_command(&Operation::Resume), "setPlayerCmd:resume");
        assert_eq!(d.wire_command(&Operation::SetLoopMode(6)), "setPlayerCmd:loopmode:6");
        assert_eq!(d.wire_command(&Operation::Previous), "setPlayerCmd:prev");
    }

    #[test]
    fn scenario_shuffle_repeat_preservation() {
        // Spec §8 scenario 6: shuffle=false, repeat=all, loopMode=2.
        // SetShuffle(true) must issue loopmode:6.
        let map = WiimLoopModeMap;
        let encoded = map.encode(Shuffle::On, Repeat::All);
        assert_eq!(encoded, 6);
        assert_eq!(map.decode(6), (Shuffle::On, Repeat::All));
    }

    #[test]
    fn decode_alternate_shuffle_code_collapses() {
        let map = WiimLoopModeMap;
        assert_eq!(map.decode(3), map.decode(4));
    }

    #[test]
    fn self_transporting_sources_detected() {
        assert!(is_self_transporting_source("TuneIn"));
        assert!(is_self_transporting_source("Bluetooth"));
        assert!(!is_self_transporting_source("Spotify"));
    }

    fn canonical_wiim_codes() -> Vec<u8> {
        // 4 is a documented alias of 3 and intentionally excluded: encode
        // never produces it, so encode(decode(4)) != 4 by design.
        vec![0, 1, 2, 3, 5, 6]
    }

    #[test]
    fn wiim_bijection_over_canonical_range() {
        let map = WiimLoopModeMap;
        for n in canonical_wiim_codes() {
            let (s, r) = map.decode(n);
            assert_eq!(map.encode(s, r), n);
        }
    }

    proptest::proptest! {
        #[test]
        fn wiim_decode_encode_roundtrip(n in proptest::sample::select(vec![0u8, 1, 2, 3, 5, 6])) {
            let map = WiimLoopModeMap;
            let (s, r) = map.decode(n);
            proptest::prop_assert_eq!(map.encode(s, r), n);
        }
    }
}
