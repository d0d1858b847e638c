//! Geometry codec for device-specific settings
//!
//! Encodings, per application kind:
//! - Traffic: `detection_lines = "x1,y1,x2,y2[,...]:x1,y1,..."`, polylines joined by `:`
//! - Entry: `detection_line = "x1,y1,x2,y2[,...]"`, a single polyline
//! - Dwell: `area_list` = JSON string of `[[x1,y1,...], ...]`; devices configured
//!   by older tooling may hold a flat `[x1,y1,...]` (one polygon), single-quoted
//!   JSON, a bare comma list, or a raw array instead of a string
//! - Viewer: no geometry
//!
//! Decoding never fails the caller: malformed remote data is logged and
//! treated as "no geometry". Encoding rounds to integers and collapses
//! consecutive duplicate points.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::geometry::{
    collapse_rounded, DetectionGeometry, GeometryError, GeometrySet, LineKind, Point,
    MIN_AREA_POINTS, MIN_LINE_POINTS,
};
use crate::kind::ApplicationKind;
use crate::settings::SettingsMap;

pub const TRAFFIC_LINES_KEY: &str = "detection_lines";
pub const ENTRY_LINE_KEY: &str = "detection_line";
pub const AREA_LIST_KEY: &str = "area_list";

/// Written when an area set is saved empty; the dwell app rejects `[]`
const EMPTY_AREA_PLACEHOLDER: &str = "[[0,0,0,0]]";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Invalid coordinate {0:?}")]
    InvalidCoordinate(String),
    #[error("Unparseable area list: {0}")]
    AreaList(String),
    #[error("Unexpected value type for {0}")]
    UnexpectedType(&'static str),
}

/// Parse `x1,y1,x2,y2,...` into points. A trailing odd coordinate is ignored.
pub fn decode_polyline(encoded: &str) -> Result<Vec<Point>, CodecError> {
    let coords = encoded
        .split(',')
        .map(|c| {
            let c = c.trim();
            c.parse::<f64>()
                .map_err(|_| CodecError::InvalidCoordinate(c.to_string()))
        })
        .collect::<Result<Vec<f64>, _>>()?;
    Ok(pairs(&coords))
}

/// Decode colon-separated traffic polylines. Empty segments and segments
/// with fewer than two points are skipped.
pub fn decode_traffic_lines(encoded: &str) -> Result<Vec<DetectionGeometry>, CodecError> {
    let mut lines = Vec::new();
    for segment in encoded.split(':').filter(|s| !s.trim().is_empty()) {
        let points = decode_polyline(segment)?;
        if points.len() < MIN_LINE_POINTS {
            continue;
        }
        lines.push(DetectionGeometry::Line {
            name: format!("LINE{}", lines.len()),
            kind: LineKind::Traffic,
            points,
        });
    }
    Ok(lines)
}

pub fn decode_entry_line(encoded: &str) -> Result<Option<DetectionGeometry>, CodecError> {
    if encoded.trim().is_empty() {
        return Ok(None);
    }
    let points = decode_polyline(encoded)?;
    if points.len() < MIN_LINE_POINTS {
        return Ok(None);
    }
    Ok(Some(DetectionGeometry::Line {
        name: "LINE0".to_string(),
        kind: LineKind::Entry,
        points,
    }))
}

/// Decode a dwell `area_list` in any of the accepted shapes
pub fn decode_area_list(value: &Value) -> Result<Vec<DetectionGeometry>, CodecError> {
    let parsed = match value {
        Value::String(s) => parse_area_string(s)?,
        Value::Array(_) => value.clone(),
        _ => return Err(CodecError::UnexpectedType(AREA_LIST_KEY)),
    };
    let items = match parsed {
        Value::Array(items) => items,
        other => return Err(CodecError::AreaList(other.to_string())),
    };

    let polygons: Vec<Vec<f64>> = if items.first().is_some_and(Value::is_array) {
        items
            .iter()
            .map(numbers)
            .collect::<Result<Vec<_>, _>>()?
    } else if items.is_empty() {
        Vec::new()
    } else {
        vec![numbers(&Value::Array(items))?]
    };

    Ok(polygons
        .iter()
        .map(|coords| pairs(coords))
        .filter(|points| points.len() >= MIN_AREA_POINTS)
        .enumerate()
        .map(|(i, points)| DetectionGeometry::Area {
            name: format!("Area {}", i + 1),
            points,
        })
        .collect())
}

/// `x1,y1,x2,y2,...` with rounding and consecutive-duplicate collapse
pub fn encode_polyline(points: &[Point]) -> String {
    collapse_rounded(points)
        .iter()
        .map(|(x, y)| format!("{},{}", x, y))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn encode_traffic_lines<'a>(lines: impl IntoIterator<Item = &'a DetectionGeometry>) -> String {
    lines
        .into_iter()
        .map(|line| encode_polyline(line.points()))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn encode_area_list<'a>(areas: impl IntoIterator<Item = &'a DetectionGeometry>) -> String {
    let polygons: Vec<Vec<i64>> = areas
        .into_iter()
        .map(|area| {
            collapse_rounded(area.points())
                .into_iter()
                .flat_map(|(x, y)| [x, y])
                .collect()
        })
        .collect();
    if polygons.is_empty() {
        return EMPTY_AREA_PLACEHOLDER.to_string();
    }
    Value::from(polygons).to_string()
}

/// Decode whatever geometry `settings` holds for `kind`. Malformed data is
/// logged and yields an empty set.
pub fn decode_geometry(kind: ApplicationKind, settings: &SettingsMap) -> GeometrySet {
    let result = match kind {
        ApplicationKind::Traffic => match settings.get(TRAFFIC_LINES_KEY) {
            Some(v) => scalar_text(v, TRAFFIC_LINES_KEY).and_then(|s| decode_traffic_lines(&s)),
            None => Ok(Vec::new()),
        },
        ApplicationKind::Entry => match settings.get(ENTRY_LINE_KEY) {
            Some(v) => scalar_text(v, ENTRY_LINE_KEY)
                .and_then(|s| decode_entry_line(&s))
                .map(|line| line.into_iter().collect()),
            None => Ok(Vec::new()),
        },
        ApplicationKind::Dwell => match settings.get(AREA_LIST_KEY) {
            Some(v) => decode_area_list(v),
            None => Ok(Vec::new()),
        },
        ApplicationKind::Viewer | ApplicationKind::Unknown(_) => Ok(Vec::new()),
    };

    match result {
        Ok(items) => GeometrySet::from_vec(items),
        Err(e) => {
            warn!(kind = ?kind, error = %e, "Ignoring malformed geometry in device settings");
            GeometrySet::new()
        }
    }
}

/// Encode `geometry` into the settings keys for `kind`. The returned map is
/// merged over the existing device-specific settings by the reconciler.
///
/// An entry application with no line emits nothing, leaving any stored line
/// in place.
pub fn encode_geometry(
    kind: ApplicationKind,
    geometry: &GeometrySet,
) -> Result<SettingsMap, GeometryError> {
    for item in geometry.items() {
        item.validate()?;
    }

    let mut out = SettingsMap::new();
    match kind {
        ApplicationKind::Traffic => {
            reject_areas(geometry)?;
            out.insert(
                TRAFFIC_LINES_KEY.to_string(),
                Value::String(encode_traffic_lines(geometry.lines())),
            );
        }
        ApplicationKind::Entry => {
            reject_areas(geometry)?;
            let lines: Vec<_> = geometry.lines().collect();
            match lines.as_slice() {
                [] => {}
                [line] => {
                    out.insert(
                        ENTRY_LINE_KEY.to_string(),
                        Value::String(encode_polyline(line.points())),
                    );
                }
                more => return Err(GeometryError::TooManyEntryLines(more.len())),
            }
        }
        ApplicationKind::Dwell => {
            if geometry.lines().next().is_some() {
                return Err(GeometryError::Unsupported { found: "line" });
            }
            out.insert(
                AREA_LIST_KEY.to_string(),
                Value::String(encode_area_list(geometry.areas())),
            );
        }
        ApplicationKind::Viewer | ApplicationKind::Unknown(_) => {
            if let Some(item) = geometry.items().first() {
                return Err(GeometryError::Unsupported {
                    found: item.type_name(),
                });
            }
        }
    }
    Ok(out)
}

fn reject_areas(geometry: &GeometrySet) -> Result<(), GeometryError> {
    match geometry.areas().next() {
        Some(_) => Err(GeometryError::Unsupported { found: "area" }),
        None => Ok(()),
    }
}

fn pairs(coords: &[f64]) -> Vec<Point> {
    coords
        .chunks_exact(2)
        .map(|c| Point::new(c[0], c[1]))
        .collect()
}

fn scalar_text(value: &Value, key: &'static str) -> Result<String, CodecError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(CodecError::UnexpectedType(key)),
    }
}

fn parse_area_string(raw: &str) -> Result<Value, CodecError> {
    serde_json::from_str(&raw.replace('\'', "\""))
        .or_else(|_| serde_json::from_str(&format!("[{}]", raw)))
        .map_err(|_| CodecError::AreaList(raw.to_string()))
}

fn numbers(value: &Value) -> Result<Vec<f64>, CodecError> {
    let Value::Array(items) = value else {
        return Err(CodecError::AreaList(value.to_string()));
    };
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| CodecError::InvalidCoordinate(v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    fn settings(value: Value) -> SettingsMap {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_traffic_scenario() {
        let raw = settings(json!({"detection_lines": "10,10,50,50:5,5,100,100,150,150"}));
        let set = decode_geometry(ApplicationKind::Traffic, &raw);
        assert_eq!(set.len(), 2);
        assert_eq!(set.items()[0].points(), pts(&[(10.0, 10.0), (50.0, 50.0)]));
        assert_eq!(
            set.items()[1].points(),
            pts(&[(5.0, 5.0), (100.0, 100.0), (150.0, 150.0)])
        );
    }

    #[test]
    fn test_traffic_round_trip() {
        let mut set = GeometrySet::new();
        set.add_line(LineKind::Traffic, pts(&[(10.4, 20.6), (30.0, 40.0)]))
            .unwrap();
        set.add_line(
            LineKind::Traffic,
            pts(&[(1.0, 1.0), (2.0, 2.0), (2.0, 2.0), (3.0, 3.0)]),
        )
        .unwrap();

        let encoded = encode_geometry(ApplicationKind::Traffic, &set).unwrap();
        assert_eq!(encoded["detection_lines"], json!("10,21,30,40:1,1,2,2,3,3"));

        let decoded = decode_geometry(ApplicationKind::Traffic, &encoded);
        assert_eq!(decoded.len(), 2);
        for (original, round_tripped) in set.items().iter().zip(decoded.items()) {
            let expected: Vec<Point> = collapse_rounded(original.points())
                .into_iter()
                .map(|(x, y)| Point::new(x as f64, y as f64))
                .collect();
            assert_eq!(round_tripped.points(), expected.as_slice());
        }
    }

    #[test]
    fn test_traffic_skips_short_and_empty_segments() {
        let lines = decode_traffic_lines("1,2::3,4,5,6:7,8").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].name(), "LINE0");
    }

    #[test]
    fn test_malformed_traffic_yields_empty() {
        let raw = settings(json!({"detection_lines": "10,10,abc,50"}));
        assert!(decode_geometry(ApplicationKind::Traffic, &raw).is_empty());
    }

    #[test]
    fn test_entry_line_decode() {
        let raw = settings(json!({"detection_line": "0,0,100,0,100,100,7"}));
        let set = decode_geometry(ApplicationKind::Entry, &raw);
        assert_eq!(set.len(), 1);
        assert_eq!(set.items()[0].points().len(), 3);
    }

    #[test]
    fn test_entry_encode_single_line() {
        let mut set = GeometrySet::new();
        set.add_line(LineKind::Entry, pts(&[(0.0, 0.0), (10.0, 10.0)]))
            .unwrap();
        set.add_line(LineKind::Entry, pts(&[(5.0, 5.0), (6.0, 6.0)]))
            .unwrap();
        let encoded = encode_geometry(ApplicationKind::Entry, &set).unwrap();
        assert_eq!(encoded["detection_line"], json!("5,5,6,6"));
    }

    #[test]
    fn test_entry_rejects_multiple_lines() {
        let line = |x| DetectionGeometry::Line {
            name: "LINE0".into(),
            kind: LineKind::Entry,
            points: pts(&[(x, 0.0), (x, 10.0)]),
        };
        let set = GeometrySet::from_vec(vec![line(1.0), line(2.0)]);
        assert_eq!(
            encode_geometry(ApplicationKind::Entry, &set),
            Err(GeometryError::TooManyEntryLines(2))
        );
    }

    #[test]
    fn test_entry_without_line_emits_nothing() {
        let encoded = encode_geometry(ApplicationKind::Entry, &GeometrySet::new()).unwrap();
        assert!(encoded.is_empty());
    }

    #[test]
    fn test_area_list_nested() {
        let v = json!("[[0,0,10,0,10,10],[20,20,30,20,30,30,20,30]]");
        let areas = decode_area_list(&v).unwrap();
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[1].points().len(), 4);
        assert_eq!(areas[1].name(), "Area 2");
    }

    #[test]
    fn test_area_list_flat_legacy() {
        let v = json!("[0,0,10,0,10,10]");
        let areas = decode_area_list(&v).unwrap();
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].points().len(), 3);
    }

    #[test]
    fn test_area_list_other_legacy_shapes() {
        assert_eq!(decode_area_list(&json!("0,0,5,0,5,5")).unwrap().len(), 1);
        assert_eq!(decode_area_list(&json!([[0, 0, 5, 0, 5, 5]])).unwrap().len(), 1);
    }

    #[test]
    fn test_area_list_placeholder_and_small_polygons_skipped() {
        assert!(decode_area_list(&json!("[[0,0,0,0]]")).unwrap().is_empty());
        assert!(decode_area_list(&json!("[]")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_area_list_yields_empty() {
        for raw in [json!("[[0,0,"), json!("{\"a\":1}"), json!(12), json!("[[0,\"x\",1,1,2,2]]")] {
            let s = settings(json!({ "area_list": raw }));
            assert!(decode_geometry(ApplicationKind::Dwell, &s).is_empty());
        }
    }

    #[test]
    fn test_area_encode() {
        let mut set = GeometrySet::new();
        set.add_area(pts(&[(0.2, 0.0), (10.0, 0.0), (10.0, 0.0), (10.0, 10.0)]))
            .unwrap();
        let encoded = encode_geometry(ApplicationKind::Dwell, &set).unwrap();
        assert_eq!(encoded["area_list"], json!("[[0,0,10,0,10,10]]"));

        let empty = encode_geometry(ApplicationKind::Dwell, &GeometrySet::new()).unwrap();
        assert_eq!(empty["area_list"], json!("[[0,0,0,0]]"));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut set = GeometrySet::new();
        set.add_area(pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]))
            .unwrap();
        assert_eq!(
            encode_geometry(ApplicationKind::Traffic, &set),
            Err(GeometryError::Unsupported { found: "area" })
        );
        assert_eq!(
            encode_geometry(ApplicationKind::Viewer, &set),
            Err(GeometryError::Unsupported { found: "area" })
        );
    }

    #[test]
    fn test_viewer_has_no_geometry() {
        let raw = settings(json!({"detection_lines": "1,1,2,2"}));
        assert!(decode_geometry(ApplicationKind::Viewer, &raw).is_empty());
    }
}
