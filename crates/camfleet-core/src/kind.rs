//! Application classification
//!
//! The registry does not tag applications with a behavioural type, and its
//! naming differs between deployments. Classification therefore runs an
//! ordered rule list: exact id rules first, then display-name substring
//! rules. Several ids may map to the same kind.

use serde::{Deserialize, Serialize};

use crate::device::Act;

/// Behavioural category of an installed application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationKind {
    /// Traffic counting over one or more polylines
    Traffic,
    /// Store-entry counting over exactly one polyline
    Entry,
    /// Dwell counting inside polygons
    Dwell,
    /// Viewer/gaze analysis, angle ranges only
    Viewer,
    /// No rule matched; carries the raw application id
    Unknown(u64),
}

impl ApplicationKind {
    /// Short operator-facing label
    pub fn label(&self) -> String {
        match self {
            Self::Traffic => "Traffic count".to_string(),
            Self::Entry => "Entry count".to_string(),
            Self::Dwell => "Dwell count".to_string(),
            Self::Viewer => "Viewer count".to_string(),
            Self::Unknown(id) => format!("Act ID: {}", id),
        }
    }

    /// Whether this kind stores operator-drawn geometry
    pub fn has_geometry(&self) -> bool {
        matches!(self, Self::Traffic | Self::Entry | Self::Dwell)
    }
}

/// Exact application id rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdRule {
    pub id: u64,
    pub kind: ApplicationKind,
}

/// Display-name substring rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRule {
    pub contains: String,
    pub kind: ApplicationKind,
}

/// Ordered classification rules
#[derive(Debug, Clone, PartialEq)]
pub struct KindRules {
    ids: Vec<IdRule>,
    names: Vec<NameRule>,
}

impl Default for KindRules {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KindRules {
    /// Rules known to match the deployed fleet
    pub fn builtin() -> Self {
        use ApplicationKind::*;

        let ids = [
            (9917, Traffic),
            (9918, Entry),
            (9919, Entry),
            (9916, Dwell),
            (9960, Viewer),
        ]
        .into_iter()
        .map(|(id, kind)| IdRule { id, kind })
        .collect();

        let names = [
            ("WalkerInsight", Traffic),
            ("通行量計測", Traffic),
            ("入店計測", Entry),
            ("滞在計測", Dwell),
            ("Viewer Analysis", Viewer),
            ("視認計測", Viewer),
        ]
        .into_iter()
        .map(|(contains, kind)| NameRule {
            contains: contains.to_string(),
            kind,
        })
        .collect();

        Self { ids, names }
    }

    /// Add an id rule ahead of the existing id rules
    pub fn with_id(mut self, id: u64, kind: ApplicationKind) -> Self {
        self.ids.insert(0, IdRule { id, kind });
        self
    }

    /// Add a name rule ahead of the existing name rules
    pub fn with_name(mut self, contains: impl Into<String>, kind: ApplicationKind) -> Self {
        self.names.insert(
            0,
            NameRule {
                contains: contains.into(),
                kind,
            },
        );
        self
    }

    /// Classify an application by id, falling back to its display name
    pub fn classify(&self, id: u64, name: &str) -> ApplicationKind {
        if let Some(rule) = self.ids.iter().find(|r| r.id == id) {
            return rule.kind;
        }
        self.names
            .iter()
            .find(|r| !r.contains.is_empty() && name.contains(&r.contains))
            .map(|r| r.kind)
            .unwrap_or(ApplicationKind::Unknown(id))
    }

    pub fn classify_act(&self, act: &Act) -> ApplicationKind {
        self.classify(act.id, &act.name)
    }
}
