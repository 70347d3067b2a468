//! `sand-types` – shared vocabulary of the sand safety subsystem.
//!
//! Every crate in the workspace speaks in these types: pixel and ground-plane
//! coordinates, calibration correspondences, LiDAR placement records, the
//! events routed over the bus, and the global [`SandError`].
//!
//! # Modules
//!
//! - [`config`] – serde-backed configuration records ([`SandConfig`][config::SandConfig]
//!   and its children) read at process start and hot-swapped by the
//!   ConfigTransformer.

pub mod config;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A 2-D coordinate, either in raw camera pixels or in the ground-plane frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

/// A four-corner detection box.
///
/// In raw-pixel space it is usually axis-aligned; after projection into the
/// ground plane it is an arbitrary quadrilateral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub upper_left: Point,
    pub upper_right: Point,
    pub lower_right: Point,
    pub lower_left: Point,
}

impl Quad {
    pub fn new(upper_left: Point, upper_right: Point, lower_right: Point, lower_left: Point) -> Self {
        Self {
            upper_left,
            upper_right,
            lower_right,
            lower_left,
        }
    }

    /// Build an axis-aligned box from its `(x1, y1)` / `(x2, y2)` extremes.
    pub fn from_extents(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(
            Point::new(x1, y1),
            Point::new(x2, y1),
            Point::new(x2, y2),
            Point::new(x1, y2),
        )
    }

    /// Corners in clockwise order starting at the upper left.
    pub fn corners(&self) -> [Point; 4] {
        [self.upper_left, self.upper_right, self.lower_right, self.lower_left]
    }

    pub fn map(&self, f: impl Fn(Point) -> Point) -> Self {
        Self::new(
            f(self.upper_left),
            f(self.upper_right),
            f(self.lower_right),
            f(self.lower_left),
        )
    }

    /// Mean of the four corners.
    pub fn center(&self) -> Point {
        let corners = self.corners();
        let x = corners.iter().map(|p| p.x).sum::<f64>() / 4.0;
        let y = corners.iter().map(|p| p.y).sum::<f64>() / 4.0;
        Point::new(x, y)
    }
}

/// A rectangular pixel space, written as `"WIDTHxHEIGHT"` in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Dimensions {
    type Err = SandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SandError::InvalidResolution(s.to_string());
        let (width, height) = s.trim().split_once('x').ok_or_else(invalid)?;
        Ok(Self::new(
            width.trim().parse().map_err(|_| invalid())?,
            height.trim().parse().map_err(|_| invalid())?,
        ))
    }
}

impl TryFrom<String> for Dimensions {
    type Error = SandError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dimensions> for String {
    fn from(value: Dimensions) -> Self {
        value.to_string()
    }
}

/// The calibration correspondence for one camera.
///
/// `source_points` are raw camera pixels, `target_points` the matching
/// ground-plane coordinates.  A projective solve is only well posed for
/// exactly four pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalPoints {
    pub source_points: Vec<Point>,
    pub target_points: Vec<Point>,
}

impl CalPoints {
    /// Pair up source and target points.
    ///
    /// # Errors
    ///
    /// [`SandError::CalibrationMismatch`] when the two lists differ in length.
    pub fn new(source_points: Vec<Point>, target_points: Vec<Point>) -> Result<Self, SandError> {
        if source_points.len() != target_points.len() {
            return Err(SandError::CalibrationMismatch {
                sources: source_points.len(),
                targets: target_points.len(),
            });
        }
        Ok(Self {
            source_points,
            target_points,
        })
    }

    pub fn len(&self) -> usize {
        self.source_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_points.is_empty()
    }

    /// True for exactly four equal-length correspondences.
    pub fn is_well_posed(&self) -> bool {
        self.source_points.len() == 4 && self.target_points.len() == 4
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LiDAR
// ────────────────────────────────────────────────────────────────────────────

/// Rigid placement of one LiDAR unit in the shared ground frame.
///
/// `x`, `y`, `z` are metres, `angle` is the yaw in degrees added to every
/// azimuth reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LidarTransformation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub angle: f64,
}

impl LidarTransformation {
    pub fn new(x: f64, y: f64, z: f64, angle: f64) -> Self {
        Self { x, y, z, angle }
    }
}

/// Untransformed polar sample for one laser channel.
///
/// `distance` is in decoder units, `angle` in hundredths of a degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LidarRawPoint {
    pub distance: u16,
    pub angle: u16,
    pub row: u8,
    pub reflectivity: u8,
}

// ────────────────────────────────────────────────────────────────────────────
// Telemetry
// ────────────────────────────────────────────────────────────────────────────

/// Position telemetry of a tracked group (e.g. a crane), unscaled.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionData {
    pub x_position: f64,
    pub y_position: f64,
    pub z_position: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Bus events
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the pub/sub bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Slash-separated topic, e.g. `"crane_a/gantry/data/position"`.
    pub topic: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp a payload with a fresh id and the current time.
    pub fn new(topic: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: topic.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Position(PositionData),
    /// New ground-plane calibration targets for one camera.
    TargetPoints(Vec<Point>),
    CollisionStatus(bool),
    /// Row-major collision grid, `true` where a tracked entity is in a zone.
    CollisionMap(Vec<Vec<bool>>),
    /// New ground-frame placement for one LiDAR.
    LidarTransformation(LidarTransformation),
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type spanning configuration, decoding, bus and isolation
/// failures.
#[derive(Error, Debug)]
pub enum SandError {
    #[error("Invalid dimensions {width}x{height}: width and height must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Invalid resolution string: {0:?}")]
    InvalidResolution(String),

    #[error("Calibration mismatch: {sources} source points vs {targets} target points")]
    CalibrationMismatch { sources: usize, targets: usize },

    #[error("LiDAR packet has {actual} bytes, expected {expected}")]
    PacketLength { expected: usize, actual: usize },

    #[error("LiDAR data block {block} has flag {flag:#06x}")]
    BadBlockFlag { block: usize, flag: u16 },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    #[error("Unknown LiDAR: {0}")]
    UnknownLidar(String),

    #[error("Failed to spawn worker {name}: {details}")]
    Spawn { name: String, details: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
