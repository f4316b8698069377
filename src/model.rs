//! Core data model: device identity, capability flags, and the merged
//! playback `Status` that `StateSynchronizer` produces and `Player` exposes.
//!
//! Grounded on `pmocontrol::model` (RendererInfo / RendererCapabilities /
//! RendererId) — the same shape, generalized from "one UPnP/LinkPlay
//! renderer" to the vendor-spanning device family this crate targets.

use std::time::Instant;

use serde::Serialize;

/// Stable identifier for one attached device.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceId(pub String);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// Immutable-after-first-populated device identity (spec §3).
#[derive(Clone, Debug)]
pub struct DeviceIdentity {
    pub uuid: DeviceId,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub mac: Option<String>,
    pub friendly_name: String,
    pub model: String,
    pub firmware_version: Option<String>,
    pub latest_firmware_version: Option<String>,
    pub update_available: bool,
}

impl DeviceIdentity {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Vendor {
    WiiM,
    Arylic,
    AudioPro,
    GenericLinkPlay,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioProGeneration {
    Original,
    WGen,
    MkII,
}

/// Ternary capability fact (spec §3, Glossary: "Capability flag").
///
/// A resolved `No` is sticky for the process lifetime (§4.3); only
/// `CapabilityRegistry` is allowed to transition a flag, never the Player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum Tri {
    #[default]
    Unknown,
    Yes,
    No,
}

impl Tri {
    pub fn is_yes(self) -> bool {
        matches!(self, Tri::Yes)
    }

    pub fn is_resolved(self) -> bool {
        !matches!(self, Tri::Unknown)
    }
}

/// Every capability flag the registry tracks (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CapabilityFlag {
    Metadata,
    Eq,
    PresetsWithMetadata,
    AudioOutputSwitching,
    LedControl,
    SleepTimer,
    Alarms,
    FirmwareInstall,
    QueueBrowse,
    QueueMutate,
    Upnp,
}

impl CapabilityFlag {
    pub const ALL: [CapabilityFlag; 11] = [
        CapabilityFlag::Metadata,
        CapabilityFlag::Eq,
        CapabilityFlag::PresetsWithMetadata,
        CapabilityFlag::AudioOutputSwitching,
        CapabilityFlag::LedControl,
        CapabilityFlag::SleepTimer,
        CapabilityFlag::Alarms,
        CapabilityFlag::FirmwareInstall,
        CapabilityFlag::QueueBrowse,
        CapabilityFlag::QueueMutate,
        CapabilityFlag::Upnp,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PlayState {
    Playing,
    Paused,
    Idle,
    Buffering,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Shuffle {
    On,
    Off,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Repeat {
    Off,
    One,
    All,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Solo,
    Master,
    Slave,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Preset {
    pub number: u32,
    pub name: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

/// Source of a single observed value, ranked for merge priority in
/// `StateSynchronizer` (spec §4.5, §3 "FieldProvenance").
///
/// Ranking (low to high) is context-dependent per field (see
/// `sync::priority_rank`); this enum only carries identity, not rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Http,
    Upnp,
    Estimated,
    Optimistic,
}

/// Every mergeable field of `Status`, used as the key into the provenance map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusField {
    PlayState,
    Volume,
    Muted,
    Title,
    Artist,
    Album,
    ImageUrl,
    Source,
    RawSource,
    Shuffle,
    Repeat,
    Codec,
    SampleRate,
    BitDepth,
    BitRate,
    Position,
    Duration,
}

/// The merged, authoritative view of one device (spec §3).
#[derive(Clone, Debug, Serialize)]
pub struct Status {
    pub play_state: PlayState,

    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub content_id: Option<String>,
    pub image_url: Option<String>,
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u32>,
    pub bit_rate: Option<u32>,

    pub position: Option<u32>,
    pub duration: Option<u32>,
    #[serde(skip)]
    pub position_updated_at: Instant,

    pub volume: f32,
    pub muted: bool,
    pub eq_preset: Option<String>,
    pub audio_output_mode: Option<String>,
    pub channel_balance: Option<f32>,

    pub source: Option<String>,
    pub raw_source: Option<String>,
    pub raw_vendor_uri: Option<String>,

    pub shuffle: Shuffle,
    pub repeat: Repeat,

    pub role: Role,
    pub master_host: Option<String>,

    pub presets: Option<Vec<Preset>>,
}

/// Equality ignores `position_updated_at`: two merges that land on the same
/// visible values are "unchanged" even if the position tick's timestamp
/// moved, which is what `Player::refresh` needs to decide whether to fire
/// its change callback (spec §4.7).
impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.play_state == other.play_state
            && self.title == other.title
            && self.artist == other.artist
            && self.album == other.album
            && self.content_id == other.content_id
            && self.image_url == other.image_url
            && self.codec == other.codec
            && self.sample_rate == other.sample_rate
            && self.bit_depth == other.bit_depth
            && self.bit_rate == other.bit_rate
            && self.position == other.position
            && self.duration == other.duration
            && self.volume == other.volume
            && self.muted == other.muted
            && self.eq_preset == other.eq_preset
            && self.audio_output_mode == other.audio_output_mode
            && self.channel_balance == other.channel_balance
            && self.source == other.source
            && self.raw_source == other.raw_source
            && self.raw_vendor_uri == other.raw_vendor_uri
            && self.shuffle == other.shuffle
            && self.repeat == other.repeat
            && self.role == other.role
            && self.master_host == other.master_host
            && self.presets == other.presets
    }
}

impl Status {
    pub fn initial() -> Self {
        Status {
            play_state: PlayState::Idle,
            title: None,
            artist: None,
            album: None,
            content_id: None,
            image_url: None,
            codec: None,
            sample_rate: None,
            bit_depth: None,
            bit_rate: None,
            position: None,
            duration: None,
            position_updated_at: Instant::now(),
            volume: 0.0,
            muted: false,
            eq_preset: None,
            audio_output_mode: None,
            channel_balance: None,
            source: None,
            raw_source: None,
            raw_vendor_uri: None,
            shuffle: Shuffle::Unknown,
            repeat: Repeat::Unknown,
            role: Role::Solo,
            master_host: None,
            presets: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.play_state == PlayState::Playing
    }
    pub fn is_paused(&self) -> bool {
        self.play_state == PlayState::Paused
    }
    pub fn is_idle(&self) -> bool {
        self.play_state == PlayState::Idle
    }
    pub fn is_buffering(&self) -> bool {
        self.play_state == PlayState::Buffering
    }
    pub fn is_master(&self) -> bool {
        self.role == Role::Master
    }
    pub fn is_slave(&self) -> bool {
        self.role == Role::Slave
    }
    pub fn is_solo(&self) -> bool {
        self.role == Role::Solo
    }
}

/// A partial update to `Status`: only the fields present are touched.
///
/// Produced by `Parser` (from HTTP), `UpnpEventer` (from `LastChange`), and
/// `Player` (optimistic writes after a command).
#[derive(Clone, Debug, Default)]
pub struct StatusPatch {
    pub play_state: Option<PlayState>,
    pub title: Option<Option<String>>,
    pub artist: Option<Option<String>>,
    pub album: Option<Option<String>>,
    pub content_id: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub codec: Option<Option<String>>,
    pub sample_rate: Option<Option<u32>>,
    pub bit_depth: Option<Option<u32>>,
    pub bit_rate: Option<Option<u32>>,
    pub position: Option<Option<u32>>,
    pub duration: Option<Option<u32>>,
    pub volume: Option<f32>,
    pub muted: Option<bool>,
    pub eq_preset: Option<Option<String>>,
    pub audio_output_mode: Option<Option<String>>,
    pub channel_balance: Option<Option<f32>>,
    pub source: Option<Option<String>>,
    pub raw_source: Option<Option<String>>,
    pub raw_vendor_uri: Option<Option<String>>,
    pub shuffle: Option<Shuffle>,
    pub repeat: Option<Repeat>,
    pub role: Option<Role>,
    pub master_host: Option<Option<String>>,
    pub presets: Option<Option<Vec<Preset>>>,
}
