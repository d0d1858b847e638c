//! Application settings: three-tier resolution and typed per-kind views
//!
//! The registry stores settings as open JSON objects on three tiers
//! (`device_specific_settings`, `settings`, `base_settings`). Reads always
//! resolve device-specific first, then application, then base template, then
//! the code-level default for the application kind.
//!
//! Writes go through [`ActSettings`], a typed view per application kind.
//! Known keys are lifted into named fields when their stored value has the
//! expected type; anything else (unknown keys, legacy or wrongly-typed
//! values) stays in the `extra` bucket and is written back untouched.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::kind::ApplicationKind;

/// Raw settings object as stored by the registry
pub type SettingsMap = Map<String, Value>;

/// Which tier a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingSource {
    DeviceSpecific,
    Settings,
    BaseSettings,
    Default,
}

/// Borrowed view over the three settings tiers of one application
#[derive(Debug, Clone, Copy)]
pub struct SettingsTiers<'a> {
    pub device_specific: &'a SettingsMap,
    pub settings: &'a SettingsMap,
    pub base_settings: &'a SettingsMap,
}

impl<'a> SettingsTiers<'a> {
    /// First tier that has the key, with the tier it came from.
    /// Presence counts, not truthiness: `0` and `false` are honored.
    pub fn lookup(&self, key: &str) -> Option<(&'a Value, SettingSource)> {
        [
            (self.device_specific, SettingSource::DeviceSpecific),
            (self.settings, SettingSource::Settings),
            (self.base_settings, SettingSource::BaseSettings),
        ]
        .into_iter()
        .find_map(|(map, source)| map.get(key).map(|v| (v, source)))
    }

    pub fn resolve(&self, key: &str) -> Option<&'a Value> {
        self.lookup(key).map(|(value, _)| value)
    }

    /// Resolved value, falling back to the code-level default for `kind`
    pub fn effective(&self, kind: ApplicationKind, key: &str) -> Option<(Value, SettingSource)> {
        match self.lookup(key) {
            Some((value, source)) => Some((value.clone(), source)),
            None => code_defaults(kind)
                .remove(key)
                .map(|value| (value, SettingSource::Default)),
        }
    }
}

/// Detection model selector used by the counting applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionModel {
    Head,
    Body,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficSettings {
    pub display: Option<bool>,
    pub model: Option<DetectionModel>,
    pub rotation: Option<i64>,
    /// Encoded polylines, see [`crate::codec`]
    pub detection_lines: Option<String>,
    pub extra: SettingsMap,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntrySettings {
    pub display: Option<bool>,
    pub camera_rotation: Option<i64>,
    pub use_usb_camera: Option<bool>,
    /// Encoded single polyline
    pub detection_line: Option<String>,
    pub extra: SettingsMap,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DwellSettings {
    pub display: Option<bool>,
    pub model: Option<DetectionModel>,
    pub rotation: Option<i64>,
    pub use_usb_camera: Option<bool>,
    /// Kept as stored so an integer threshold is written back as one
    pub threshold: Option<Number>,
    /// JSON-encoded polygon list; older devices hold a raw array here
    pub area_list: Option<Value>,
    pub extra: SettingsMap,
}

/// Head-pose limits in signed degrees
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AngleRanges {
    pub minimum_pitch: Option<i64>,
    pub maximum_pitch: Option<i64>,
    pub minimum_yaw: Option<i64>,
    pub maximum_yaw: Option<i64>,
    pub minimum_roll: Option<i64>,
    pub maximum_roll: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewerSettings {
    pub display: Option<bool>,
    pub rotation: Option<i64>,
    pub use_usb_camera: Option<bool>,
    pub angles: AngleRanges,
    pub extra: SettingsMap,
}

/// Typed settings for one application kind
#[derive(Debug, Clone, PartialEq)]
pub enum ActSettings {
    Traffic(TrafficSettings),
    Entry(EntrySettings),
    Dwell(DwellSettings),
    Viewer(ViewerSettings),
    Unknown(SettingsMap),
}

impl ActSettings {
    /// Lift a raw map into the typed view for `kind`
    pub fn from_map(kind: ApplicationKind, mut map: SettingsMap) -> Self {
        let m = &mut map;
        match kind {
            ApplicationKind::Traffic => {
                let mut s = TrafficSettings {
                    display: take(m, "display"),
                    model: take(m, "model"),
                    rotation: take(m, "rotation"),
                    detection_lines: take(m, "detection_lines"),
                    extra: SettingsMap::new(),
                };
                s.extra = map;
                Self::Traffic(s)
            }
            ApplicationKind::Entry => {
                let mut s = EntrySettings {
                    display: take(m, "display"),
                    camera_rotation: take(m, "camera_rotation"),
                    use_usb_camera: take(m, "use_usb_camera"),
                    detection_line: take(m, "detection_line"),
                    extra: SettingsMap::new(),
                };
                s.extra = map;
                Self::Entry(s)
            }
            ApplicationKind::Dwell => {
                let mut s = DwellSettings {
                    display: take(m, "display"),
                    model: take(m, "model"),
                    rotation: take(m, "rotation"),
                    use_usb_camera: take(m, "use_usb_camera"),
                    threshold: take(m, "threshold"),
                    area_list: take(m, "area_list"),
                    extra: SettingsMap::new(),
                };
                s.extra = map;
                Self::Dwell(s)
            }
            ApplicationKind::Viewer => {
                let mut s = ViewerSettings {
                    display: take(m, "display"),
                    rotation: take(m, "rotation"),
                    use_usb_camera: take(m, "use_usb_camera"),
                    angles: AngleRanges {
                        minimum_pitch: take(m, "minimum_pitch"),
                        maximum_pitch: take(m, "maximum_pitch"),
                        minimum_yaw: take(m, "minimum_yaw"),
                        maximum_yaw: take(m, "maximum_yaw"),
                        minimum_roll: take(m, "minimum_roll"),
                        maximum_roll: take(m, "maximum_roll"),
                    },
                    extra: SettingsMap::new(),
                };
                s.extra = map;
                Self::Viewer(s)
            }
            ApplicationKind::Unknown(_) => Self::Unknown(map),
        }
    }

    /// Flatten back into the registry's open map
    pub fn into_map(self) -> SettingsMap {
        match self {
            Self::Traffic(s) => {
                let mut m = s.extra;
                put(&mut m, "display", s.display);
                put(&mut m, "model", s.model);
                put(&mut m, "rotation", s.rotation);
                put(&mut m, "detection_lines", s.detection_lines);
                m
            }
            Self::Entry(s) => {
                let mut m = s.extra;
                put(&mut m, "display", s.display);
                put(&mut m, "camera_rotation", s.camera_rotation);
                put(&mut m, "use_usb_camera", s.use_usb_camera);
                put(&mut m, "detection_line", s.detection_line);
                m
            }
            Self::Dwell(s) => {
                let mut m = s.extra;
                put(&mut m, "display", s.display);
                put(&mut m, "model", s.model);
                put(&mut m, "rotation", s.rotation);
                put(&mut m, "use_usb_camera", s.use_usb_camera);
                put(&mut m, "threshold", s.threshold);
                put(&mut m, "area_list", s.area_list);
                m
            }
            Self::Viewer(s) => {
                let mut m = s.extra;
                put(&mut m, "display", s.display);
                put(&mut m, "rotation", s.rotation);
                put(&mut m, "use_usb_camera", s.use_usb_camera);
                put(&mut m, "minimum_pitch", s.angles.minimum_pitch);
                put(&mut m, "maximum_pitch", s.angles.maximum_pitch);
                put(&mut m, "minimum_yaw", s.angles.minimum_yaw);
                put(&mut m, "maximum_yaw", s.angles.maximum_yaw);
                put(&mut m, "minimum_roll", s.angles.minimum_roll);
                put(&mut m, "maximum_roll", s.angles.maximum_roll);
                m
            }
            Self::Unknown(m) => m,
        }
    }

    /// Fill keys the device application requires but operators often leave
    /// unset. Only absent keys are filled; a present key is never replaced,
    /// even when its value is legacy or mistyped. Idempotent.
    pub fn apply_required_defaults(&mut self) {
        match self {
            Self::Traffic(s) => {
                fill(&mut s.model, &s.extra, "model", DetectionModel::Body);
                fill(&mut s.display, &s.extra, "display", true);
                fill(&mut s.rotation, &s.extra, "rotation", 0);
            }
            Self::Entry(s) => {
                fill(&mut s.camera_rotation, &s.extra, "camera_rotation", 0);
                fill(&mut s.display, &s.extra, "display", true);
            }
            Self::Dwell(s) => {
                fill(&mut s.model, &s.extra, "model", DetectionModel::Head);
                fill(&mut s.rotation, &s.extra, "rotation", 0);
                fill(&mut s.display, &s.extra, "display", true);
                if let Some(default) = Number::from_f64(0.3) {
                    fill(&mut s.threshold, &s.extra, "threshold", default);
                }
            }
            Self::Viewer(s) => {
                let a = &mut s.angles;
                fill(&mut a.maximum_pitch, &s.extra, "maximum_pitch", 90);
                fill(&mut a.minimum_pitch, &s.extra, "minimum_pitch", -90);
                fill(&mut a.maximum_yaw, &s.extra, "maximum_yaw", 90);
                fill(&mut a.minimum_yaw, &s.extra, "minimum_yaw", -90);
                fill(&mut a.maximum_roll, &s.extra, "maximum_roll", 45);
                fill(&mut a.minimum_roll, &s.extra, "minimum_roll", -45);
            }
            Self::Unknown(_) => {}
        }
    }
}

/// Values shown when no tier has a key. Superset of the required defaults.
pub fn code_defaults(kind: ApplicationKind) -> SettingsMap {
    let mut typed = ActSettings::from_map(kind, SettingsMap::new());
    typed.apply_required_defaults();
    if let ActSettings::Viewer(s) = &mut typed {
        s.display = Some(true);
        s.rotation = Some(0);
        s.use_usb_camera = Some(false);
    }
    typed.into_map()
}

/// Operator-editable keys with display labels. Geometry keys are edited
/// through the geometry endpoints and are not listed.
pub fn editable_keys(kind: ApplicationKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        ApplicationKind::Traffic => &[
            ("display", "Display output"),
            ("model", "Detection model"),
            ("rotation", "Image rotation"),
        ],
        ApplicationKind::Entry => &[
            ("display", "Display output"),
            ("camera_rotation", "Image rotation"),
            ("use_usb_camera", "Use USB camera"),
        ],
        ApplicationKind::Dwell => &[
            ("display", "Display output"),
            ("model", "Detection model"),
            ("rotation", "Image rotation"),
            ("use_usb_camera", "Use USB camera"),
        ],
        ApplicationKind::Viewer => &[
            ("display", "Display output"),
            ("rotation", "Image rotation"),
            ("use_usb_camera", "Use USB camera"),
            ("maximum_pitch", "Maximum pitch"),
            ("minimum_pitch", "Minimum pitch"),
            ("maximum_yaw", "Maximum yaw"),
            ("minimum_yaw", "Minimum yaw"),
            ("maximum_roll", "Maximum roll"),
            ("minimum_roll", "Minimum roll"),
        ],
        ApplicationKind::Unknown(_) => &[],
    }
}

/// One row of the effective settings view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingView {
    pub key: &'static str,
    pub label: &'static str,
    pub value: Option<Value>,
    pub source: Option<SettingSource>,
}

/// Resolved value and origin of every editable key for `kind`
pub fn settings_view(kind: ApplicationKind, tiers: &SettingsTiers<'_>) -> Vec<SettingView> {
    editable_keys(kind)
        .iter()
        .map(|&(key, label)| {
            let resolved = tiers.effective(kind, key);
            SettingView {
                key,
                label,
                source: resolved.as_ref().map(|(_, source)| *source),
                value: resolved.map(|(value, _)| value),
            }
        })
        .collect()
}

fn take<T: DeserializeOwned>(map: &mut SettingsMap, key: &str) -> Option<T> {
    let parsed = T::deserialize(map.get(key)?).ok()?;
    map.remove(key);
    Some(parsed)
}

fn put<T: Serialize>(map: &mut SettingsMap, key: &str, value: Option<T>) {
    if let Some(v) = value.and_then(|v| serde_json::to_value(v).ok()) {
        map.insert(key.to_string(), v);
    }
}

fn fill<T>(field: &mut Option<T>, extra: &SettingsMap, key: &str, default: T) {
    if field.is_none() && !extra.contains_key(key) {
        *field = Some(default);
    }
}
