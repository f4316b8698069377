//! Per-device control runtime for networked audio-streamer devices
//! (WiiM/LinkPlay/Arylic/Audio Pro family): HTTP polling merged with UPnP
//! eventing and local position estimation behind one `Player` façade, plus
//! master/slave multiroom `Group` aggregation.
//!
//! Module layout follows `pmocontrol`'s: one file per concern, a thin
//! `lib.rs` that only declares modules and re-exports the public surface.

pub mod capability;
pub mod dialect;
pub mod errors;
pub mod estimator;
pub mod group;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod player;
pub mod sync;
#[cfg(test)]
pub mod testutil;
pub mod time_utils;
pub mod transport;
pub mod upnp;

pub use capability::CapabilityRegistry;
pub use dialect::{Dialect, LoopModeMap, Operation};
pub use errors::{ControlError, Result};
pub use estimator::PositionEstimator;
pub use group::Group;
pub use model::{
    AudioProGeneration, CapabilityFlag, DeviceId, DeviceIdentity, PlayState, Preset, Protocol, Repeat, Role,
    Shuffle, SourceKind, Status, StatusField, StatusPatch, Tri, Vendor,
};
pub use orchestrator::{spawn_refresh_loop, RefreshHandle};
pub use player::{AudioOutputMode, Player};
pub use sync::StateSynchronizer;
pub use transport::{CommandTransport, Transport, TransportConfig};
pub use upnp::{parse_last_change, run_eventing_loop, SubscriptionHealth, UpnpEventer};
