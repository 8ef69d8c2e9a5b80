//! Spatial zone filtering for detections.
//!
//! A zone is either a directed line with a named side, or a closed polygon.
//! Coordinates are in the zone reference frame (see `SessionConfig`).

use crate::camera::CameraKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while loading zones.
#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("Failed to read zones file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse zones file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid zone key {0:?}; expected \"(camera_id, 'recorder_guid')\"")]
    InvalidKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    Top,
    Bottom,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ZoneConfig {
    Side { line: [Point; 2], side: Side },
    Area { polygon: Vec<Point> },
    #[serde(other)]
    Unknown,
}

/// Which half-plane of the directed line `start -> end` the point lies in.
///
/// `Left` is a positive cross product, `Right` negative. `Top`/`Bottom` compare
/// against the line's y at the point's x (image coordinates, y grows downward).
/// Returns `None` when the side label cannot be evaluated for this line.
pub fn side_test(center: Point, start: Point, end: Point, side: Side) -> Option<bool> {
    let dx = end.x - start.x;
    let dy = end.y - start.y;

    match side {
        Side::Left | Side::Right => {
            let cross = dx * (center.y - start.y) - dy * (center.x - start.x);
            Some(if side == Side::Left {
                cross > 0.0
            } else {
                cross < 0.0
            })
        }
        Side::Top | Side::Bottom => {
            let line_y = if dy == 0.0 {
                start.y
            } else if dx == 0.0 {
                // Vertical line has no top or bottom.
                return None;
            } else {
                start.y + (center.x - start.x) * dy / dx
            };
            Some(if side == Side::Top {
                center.y < line_y
            } else {
                center.y > line_y
            })
        }
        Side::Unknown => None,
    }
}

/// Point-in-polygon containment; points on an edge or vertex count as inside.
pub fn area_test(center: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let n = polygon.len();
    for i in 0..n {
        if on_segment(center, polygon[i], polygon[(i + 1) % n]) {
            return true;
        }
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > center.y) != (pj.y > center.y) {
            let x_at = pi.x + (center.y - pi.y) * (pj.x - pi.x) / (pj.y - pi.y);
            if center.x < x_at {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    const EPS: f64 = 1e-9;
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EPS {
        return false;
    }
    p.x >= a.x.min(b.x) - EPS
        && p.x <= a.x.max(b.x) + EPS
        && p.y >= a.y.min(b.y) - EPS
        && p.y <= a.y.max(b.y) + EPS
}

/// A session's zone, with one-time warnings for unusable configurations.
#[derive(Debug)]
pub struct ZoneFilter {
    zone: ZoneConfig,
    warned: AtomicBool,
}

impl ZoneFilter {
    pub fn new(zone: ZoneConfig) -> Self {
        Self {
            zone,
            warned: AtomicBool::new(false),
        }
    }

    pub fn zone(&self) -> &ZoneConfig {
        &self.zone
    }

    /// Whether a detection centered at `center` is inside the zone.
    pub fn contains(&self, center: Point) -> bool {
        let verdict = match &self.zone {
            ZoneConfig::Side { line, side } => side_test(center, line[0], line[1], *side),
            ZoneConfig::Area { polygon } => Some(area_test(center, polygon)),
            ZoneConfig::Unknown => None,
        };

        verdict.unwrap_or_else(|| {
            if !self.warned.swap(true, Ordering::Relaxed) {
                warn!(zone = ?self.zone, "Unusable zone configuration; discarding detections");
            }
            false
        })
    }
}

#[derive(Debug, Deserialize)]
struct ZoneEntry {
    camera_id: i64,
    recorder_id: String,
    #[serde(flatten)]
    zone: ZoneConfig,
}

/// Read-only map of zones keyed by camera.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: HashMap<CameraKey, ZoneConfig>,
}

impl ZoneRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ZoneError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let registry = Self::from_json(&raw)?;
        info!(path = %path.as_ref().display(), zones = registry.len(), "Zones loaded");
        Ok(registry)
    }

    /// Parse zones from JSON.
    ///
    /// Two layouts are accepted: an array of `{camera_id, recorder_id, type, ...}`
    /// entries, or an object keyed by `"(camera_id, 'recorder_guid')"` whose
    /// values are `{type, ...}` zones.
    pub fn from_json(raw: &str) -> Result<Self, ZoneError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let zones = match value {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(key, zone)| Ok((parse_tuple_key(&key)?, serde_json::from_value::<ZoneConfig>(zone)?)))
                .collect::<Result<HashMap<_, _>, ZoneError>>()?,
            other => serde_json::from_value::<Vec<ZoneEntry>>(other)?
                .into_iter()
                .map(|e| (CameraKey::new(e.camera_id, e.recorder_id), e.zone))
                .collect(),
        };
        Ok(Self { zones })
    }

    pub fn insert(&mut self, key: CameraKey, zone: ZoneConfig) {
        self.zones.insert(key, zone);
    }

    /// Snapshot of the zone for a camera, if one is configured.
    pub fn filter_for(&self, key: &CameraKey) -> Option<ZoneFilter> {
        self.zones.get(key).cloned().map(ZoneFilter::new)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Parse a `"(7, 'guid')"` key into a [`CameraKey`].
fn parse_tuple_key(key: &str) -> Result<CameraKey, ZoneError> {
    let invalid = || ZoneError::InvalidKey(key.to_string());
    let inner = key
        .trim()
        .strip_prefix('(')
        .and_then(|k| k.strip_suffix(')'))
        .ok_or_else(invalid)?;
    let (id, guid) = inner.split_once(',').ok_or_else(invalid)?;

    let camera_id = id.trim().parse::<i64>().map_err(|_| invalid())?;
    let guid = guid.trim();
    let guid = guid
        .strip_prefix('\'')
        .and_then(|g| g.strip_suffix('\''))
        .or_else(|| guid.strip_prefix('"').and_then(|g| g.strip_suffix('"')))
        .ok_or_else(invalid)?;
    if guid.is_empty() {
        return Err(invalid());
    }
    Ok(CameraKey::new(camera_id, guid))
}
