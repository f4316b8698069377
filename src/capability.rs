//! CapabilityRegistry: resolves ternary capability flags from static
//! vendor/firmware rules, falling back to sticky runtime probes (spec §4.3).
//!
//! Grounded on `pmocontrol::discovery::arylic`'s `OnceLock<Mutex<HashMap<...>>>`
//! pattern for caching a fact discovered once per process; generalized here
//! from "one cache of discovered Arylic addresses" to "one cache per
//! (device, capability) pair, seeded by static rules and refined by probes."

use std::collections::HashMap;
use std::sync::RwLock;

use crate::dialect::{loop_mode_map_for, LoopModeMap};
use crate::model::{AudioProGeneration, CapabilityFlag, DeviceId, Tri, Vendor};

/// Static, zero-cost knowledge of what a vendor/firmware combination
/// supports, before any device has been probed (spec §4.3).
fn static_rule(vendor: Vendor, generation: Option<AudioProGeneration>, flag: CapabilityFlag) -> Tri {
    match (vendor, flag) {
        (Vendor::WiiM, CapabilityFlag::Eq) => Tri::Yes,
        (Vendor::WiiM, CapabilityFlag::Metadata) => Tri::Yes,
        (Vendor::WiiM, CapabilityFlag::PresetsWithMetadata) => Tri::Yes,
        (Vendor::WiiM, CapabilityFlag::LedControl) => Tri::Yes,
        (Vendor::WiiM, CapabilityFlag::Upnp) => Tri::Yes,
        (Vendor::WiiM, CapabilityFlag::FirmwareInstall) => Tri::Yes,

        (Vendor::Arylic, CapabilityFlag::Eq) => Tri::Yes,
        (Vendor::Arylic, CapabilityFlag::LedControl) => Tri::No,
        (Vendor::Arylic, CapabilityFlag::Upnp) => Tri::Yes,

        // Original-generation Audio Pro units never got LED/alarm firmware.
        (Vendor::AudioPro, CapabilityFlag::LedControl) => match generation {
            Some(AudioProGeneration::Original) => Tri::No,
            Some(_) => Tri::Yes,
            None => Tri::Unknown,
        },
        (Vendor::AudioPro, CapabilityFlag::Alarms) => match generation {
            Some(AudioProGeneration::Original) => Tri::No,
            Some(_) => Tri::Unknown,
            None => Tri::Unknown,
        },
        (Vendor::AudioPro, CapabilityFlag::Upnp) => Tri::Yes,

        (Vendor::GenericLinkPlay, CapabilityFlag::Upnp) => Tri::Yes,

        // Everything else starts unresolved and must be probed.
        _ => Tri::Unknown,
    }
}

/// Per-process cache of resolved capability flags, keyed by device. A
/// resolved `No` is sticky for the process lifetime (spec §4.3); a `Yes`
/// discovered by probe is equally sticky so a flaky single failure can't
/// undo it.
pub struct CapabilityRegistry {
    cache: RwLock<HashMap<(DeviceId, CapabilityFlag), Tri>>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        CapabilityRegistry {
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the currently-known flag, seeding from the static rule table
    /// on first access for this device.
    pub fn get(
        &self,
        device: &DeviceId,
        vendor: Vendor,
        generation: Option<AudioProGeneration>,
        flag: CapabilityFlag,
    ) -> Tri {
        if let Some(existing) = self.cache.read().unwrap().get(&(device.clone(), flag)) {
            return *existing;
        }
        let seeded = static_rule(vendor, generation, flag);
        self.cache.write().unwrap().insert((device.clone(), flag), seeded);
        seeded
    }

    /// Records the outcome of a runtime probe (e.g. an operation that
    /// returned `Unsupported` or succeeded where the static table said
    /// `Unknown`). Once a flag resolves to `No` it never moves again.
    pub fn record_probe_result(&self, device: &DeviceId, flag: CapabilityFlag, resolved: Tri) {
        let mut cache = self.cache.write().unwrap();
        let key = (device.clone(), flag);
        match cache.get(&key) {
            Some(Tri::No) => {}
            _ => {
                cache.insert(key, resolved);
            }
        }
    }

    /// A read-only snapshot of everything resolved so far for one device,
    /// useful for diagnostics and tests.
    pub fn snapshot(&self, device: &DeviceId) -> HashMap<CapabilityFlag, Tri> {
        self.cache
            .read()
            .unwrap()
            .iter()
            .filter(|((d, _), _)| d == device)
            .map(|((_, flag), tri)| (*flag, *tri))
            .collect()
    }

    /// The single authority for loop-mode encode/decode for a vendor (spec
    /// §4.3): delegates to the `Dialect` module's per-vendor table so there
    /// is exactly one place that interprets a raw `loopMode` integer.
    pub fn loop_mode_map(&self, vendor: Vendor) -> Box<dyn LoopModeMap> {
        loop_mode_map_for(vendor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(id: &str) -> DeviceId {
        DeviceId(id.to_string())
    }

    #[test]
    fn static_rule_seeds_wiim_eq_as_yes() {
        let reg = CapabilityRegistry::new();
        assert_eq!(
            reg.get(&dev("d1"), Vendor::WiiM, None, CapabilityFlag::Eq),
            Tri::Yes
        );
    }

    #[test]
    fn original_audio_pro_led_is_sticky_no() {
        let reg = CapabilityRegistry::new();
        let d = dev("d2");
        assert_eq!(
            reg.get(&d, Vendor::AudioPro, Some(AudioProGeneration::Original), CapabilityFlag::LedControl),
            Tri::No
        );
        // A later probe attempting to flip it to Yes is ignored.
        reg.record_probe_result(&d, CapabilityFlag::LedControl, Tri::Yes);
        assert_eq!(reg.snapshot(&d)[&CapabilityFlag::LedControl], Tri::No);
    }

    #[test]
    fn unresolved_flag_can_be_probed_up() {
        let reg = CapabilityRegistry::new();
        let d = dev("d3");
        assert_eq!(reg.get(&d, Vendor::Arylic, None, CapabilityFlag::Alarms), Tri::Unknown);
        reg.record_probe_result(&d, CapabilityFlag::Alarms, Tri::Yes);
        assert_eq!(reg.snapshot(&d)[&CapabilityFlag::Alarms], Tri::Yes);
    }
}
