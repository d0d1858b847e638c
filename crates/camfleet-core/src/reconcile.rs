//! Build complete act patches from stored tiers and operator edits
//!
//! The registry replaces `device_specific_settings` wholesale, so a save
//! must carry every key the device already has plus the edits, plus the keys
//! the device application refuses to start without.

use serde::{Deserialize, Serialize};

use crate::codec::encode_geometry;
use crate::device::Act;
use crate::geometry::{GeometryError, GeometrySet};
use crate::kind::ApplicationKind;
use crate::settings::{ActSettings, SettingsMap};

/// Body of `PATCH .../act`. Both shapes are accepted by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActPatch {
    /// Used when saving operator-edited settings
    DeviceSpecific {
        act_id: u64,
        device_specific_settings: SettingsMap,
    },
    /// Used when saving detection geometry
    Settings { settings: SettingsMap },
}

impl ActPatch {
    /// The reconciled device-specific map carried by either shape
    pub fn settings(&self) -> &SettingsMap {
        match self {
            Self::DeviceSpecific {
                device_specific_settings,
                ..
            } => device_specific_settings,
            Self::Settings { settings } => settings,
        }
    }
}

/// Copy `existing`, overlay `edits` key by key, then fill required defaults
pub fn reconcile(kind: ApplicationKind, existing: &SettingsMap, edits: SettingsMap) -> SettingsMap {
    let mut merged = existing.clone();
    merged.extend(edits);

    let mut typed = ActSettings::from_map(kind, merged);
    typed.apply_required_defaults();
    typed.into_map()
}

pub fn settings_patch(act: &Act, kind: ApplicationKind, edits: SettingsMap) -> ActPatch {
    ActPatch::DeviceSpecific {
        act_id: act.id,
        device_specific_settings: reconcile(kind, &act.device_specific_settings, edits),
    }
}

/// Validate and encode `geometry`, then reconcile it like any other edit
pub fn geometry_patch(
    act: &Act,
    kind: ApplicationKind,
    geometry: &GeometrySet,
) -> Result<ActPatch, GeometryError> {
    let encoded = encode_geometry(kind, geometry)?;
    Ok(ActPatch::Settings {
        settings: reconcile(kind, &act.device_specific_settings, encoded),
    })
}
