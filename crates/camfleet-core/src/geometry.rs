//! Operator-drawn detection geometry

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum distinct points for a line
pub const MIN_LINE_POINTS: usize = 2;

/// Minimum distinct points for an area
pub const MIN_AREA_POINTS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("A line needs at least 2 distinct points, got {0}")]
    TooFewLinePoints(usize),
    #[error("An area needs at least 3 distinct points, got {0}")]
    TooFewAreaPoints(usize),
    #[error("Entry counting accepts exactly one line, got {0}")]
    TooManyEntryLines(usize),
    #[error("Geometry of type {found} cannot be stored for this application")]
    Unsupported { found: &'static str },
}

/// Image-space coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Integer coordinates as stored on the device
    pub fn rounded(&self) -> (i64, i64) {
        (self.x.round() as i64, self.y.round() as i64)
    }
}

/// Semantic kind of a detection line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    /// Any number of named lines
    Traffic,
    /// A single line; a new one replaces the old
    Entry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DetectionGeometry {
    Line {
        name: String,
        kind: LineKind,
        points: Vec<Point>,
    },
    Area {
        name: String,
        points: Vec<Point>,
    },
}

impl DetectionGeometry {
    pub fn name(&self) -> &str {
        match self {
            Self::Line { name, .. } | Self::Area { name, .. } => name,
        }
    }

    pub fn points(&self) -> &[Point] {
        match self {
            Self::Line { points, .. } | Self::Area { points, .. } => points,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Line { .. } => "line",
            Self::Area { .. } => "area",
        }
    }

    /// Check the minimum point count after rounding and collapsing
    pub fn validate(&self) -> Result<(), GeometryError> {
        let distinct = collapse_rounded(self.points()).len();
        match self {
            Self::Line { .. } if distinct < MIN_LINE_POINTS => {
                Err(GeometryError::TooFewLinePoints(distinct))
            }
            Self::Area { .. } if distinct < MIN_AREA_POINTS => {
                Err(GeometryError::TooFewAreaPoints(distinct))
            }
            _ => Ok(()),
        }
    }
}

/// Round every point and drop consecutive duplicates
pub fn collapse_rounded(points: &[Point]) -> Vec<(i64, i64)> {
    let mut out: Vec<(i64, i64)> = points.iter().map(Point::rounded).collect();
    out.dedup();
    out
}

/// The geometry being edited for one device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeometrySet {
    items: Vec<DetectionGeometry>,
}

impl GeometrySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<DetectionGeometry>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[DetectionGeometry] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &DetectionGeometry> {
        self.items
            .iter()
            .filter(|g| matches!(g, DetectionGeometry::Line { .. }))
    }

    pub fn areas(&self) -> impl Iterator<Item = &DetectionGeometry> {
        self.items
            .iter()
            .filter(|g| matches!(g, DetectionGeometry::Area { .. }))
    }

    /// Add a completed line. Traffic lines accumulate as `LINE0`, `LINE1`, ...;
    /// an entry line replaces every existing line.
    pub fn add_line(
        &mut self,
        kind: LineKind,
        points: Vec<Point>,
    ) -> Result<&DetectionGeometry, GeometryError> {
        let name = match kind {
            LineKind::Traffic => format!("LINE{}", self.lines().count()),
            LineKind::Entry => "LINE0".to_string(),
        };
        let line = DetectionGeometry::Line { name, kind, points };
        line.validate()?;

        if kind == LineKind::Entry {
            self.items
                .retain(|g| !matches!(g, DetectionGeometry::Line { .. }));
        }
        self.items.push(line);
        Ok(&self.items[self.items.len() - 1])
    }

    /// Add a completed polygon, named `Area 1`, `Area 2`, ...
    pub fn add_area(&mut self, points: Vec<Point>) -> Result<&DetectionGeometry, GeometryError> {
        let area = DetectionGeometry::Area {
            name: format!("Area {}", self.areas().count() + 1),
            points,
        };
        area.validate()?;
        self.items.push(area);
        Ok(&self.items[self.items.len() - 1])
    }

    pub fn remove(&mut self, index: usize) -> Option<DetectionGeometry> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }
}
