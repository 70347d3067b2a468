//! Configuration records for cameras, LiDARs, tracked groups and the fusion
//! stage.
//!
//! All records deserialize from TOML with per-field defaults, so a config file
//! only needs to spell out what differs from the deployed defaults.

use serde::{Deserialize, Serialize};

use crate::{CalPoints, Dimensions, LidarTransformation, Point};

/// Placeholder calibration shipped with unconfigured cameras.  Source points
/// equal to it are not rescaled into stream space.
pub const UNIT_CALIBRATION: [(f64, f64); 4] = [(1.0, 1.0), (1.0, 2.0), (2.0, 2.0), (2.0, 1.0)];

fn unit_points() -> Vec<Point> {
    UNIT_CALIBRATION.iter().copied().map(Point::from).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Cameras
// ────────────────────────────────────────────────────────────────────────────

/// One camera's static configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_name")]
    pub name: String,

    /// Tracked group the camera is mounted on (e.g. a crane).
    #[serde(default = "default_group")]
    pub group: String,

    /// Lens focal value in transformation-source pixels.
    #[serde(default = "default_focal")]
    pub focal: f64,

    /// Resolution frames arrive in.
    #[serde(default = "default_stream_resolution")]
    pub stream_resolution: Dimensions,

    /// Resolution the calibration source points were picked in.
    #[serde(default = "default_source_resolution")]
    pub transformation_source_resolution: Dimensions,

    /// Ground-plane resolution the calibration target points live in.
    #[serde(default = "default_target_resolution")]
    pub transformation_target_resolution: Dimensions,

    /// Focal-corrected working resolution frames are downsampled to before
    /// warping.
    #[serde(default = "default_working_resolution")]
    pub working_resolution: Dimensions,

    #[serde(default = "default_calibration")]
    pub transformation: CalPoints,
}

fn default_camera_name() -> String {
    "webcam".to_string()
}
fn default_group() -> String {
    "default".to_string()
}
fn default_focal() -> f64 {
    1500.0
}
fn default_stream_resolution() -> Dimensions {
    Dimensions::new(2560, 1440)
}
fn default_source_resolution() -> Dimensions {
    Dimensions::new(3840, 2160)
}
fn default_target_resolution() -> Dimensions {
    Dimensions::new(7000, 8000)
}
fn default_working_resolution() -> Dimensions {
    Dimensions::new(1280, 720)
}
fn default_calibration() -> CalPoints {
    CalPoints {
        source_points: unit_points(),
        target_points: unit_points(),
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            name: default_camera_name(),
            group: default_group(),
            focal: default_focal(),
            stream_resolution: default_stream_resolution(),
            transformation_source_resolution: default_source_resolution(),
            transformation_target_resolution: default_target_resolution(),
            working_resolution: default_working_resolution(),
            transformation: default_calibration(),
        }
    }
}

impl CameraConfig {
    /// The calibration with source points converted into stream pixels.
    ///
    /// The unit placeholder is passed through untouched.
    pub fn cal_points(&self) -> CalPoints {
        if self.transformation.source_points == unit_points() {
            return self.transformation.clone();
        }
        let from = self.transformation_source_resolution;
        let to = self.stream_resolution;
        let source_points = self
            .transformation
            .source_points
            .iter()
            .map(|p| {
                Point::new(
                    p.x / f64::from(from.width) * f64::from(to.width),
                    p.y / f64::from(from.height) * f64::from(to.height),
                )
            })
            .collect();
        CalPoints {
            source_points,
            target_points: self.transformation.target_points.clone(),
        }
    }

    /// Replace the ground-plane target points, keeping the source points.
    pub fn set_target_points(&mut self, target_points: Vec<Point>) {
        self.transformation.target_points = target_points;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LiDARs
// ────────────────────────────────────────────────────────────────────────────

/// Placement of one LiDAR in the ground frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LidarConfig {
    #[serde(default = "default_lidar_name")]
    pub name: String,
    #[serde(default)]
    pub transformation: LidarTransformation,
}

fn default_lidar_name() -> String {
    "lidar".to_string()
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            name: default_lidar_name(),
            transformation: LidarTransformation::default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Groups & live recalibration
// ────────────────────────────────────────────────────────────────────────────

/// A tracked group of cameras moving together, with per-axis offsets and
/// flags gating which axes follow position telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(default)]
    pub offset_z: f64,
    #[serde(default = "default_true")]
    pub transform_x: bool,
    #[serde(default = "default_true")]
    pub transform_y: bool,
    #[serde(default = "default_true")]
    pub transform_z: bool,
}

fn default_true() -> bool {
    true
}

impl GroupConfig {
    /// A group with zero offsets that follows telemetry on every axis.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            offset_x: 0.0,
            offset_y: 0.0,
            offset_z: 0.0,
            transform_x: true,
            transform_y: true,
            transform_z: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigTransformerConfig {
    #[serde(default)]
    pub active: bool,
    /// Multiplier applied to raw position telemetry.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for ConfigTransformerConfig {
    fn default() -> Self {
        Self {
            active: false,
            scale: default_scale(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensor fusion
// ────────────────────────────────────────────────────────────────────────────

/// Danger-zone polygons in ground-plane coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DangerZoneConfig {
    #[serde(default)]
    pub object_polygons: Vec<Vec<Point>>,
    #[serde(default)]
    pub person_polygons: Vec<Vec<Point>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFusionConfig {
    #[serde(default)]
    pub active: bool,
    #[serde(default = "default_fusion_width")]
    pub output_width: u32,
    #[serde(default = "default_fusion_height")]
    pub output_height: u32,
    /// Ground-plane resolution LiDAR returns are expressed in, one unit per
    /// centimetre.  Rescaled into the output resolution like detections.
    #[serde(default = "default_ground_resolution")]
    pub ground_resolution: Dimensions,
    #[serde(default = "default_calc_per_seconds")]
    pub calc_per_seconds: u32,
    /// Edge length, in output pixels, of one heat-map / collision cell.
    #[serde(default = "default_cluster_size")]
    pub heat_map_cluster_size: u32,
    #[serde(default = "default_heat_up")]
    pub heat_up_factor: u32,
    #[serde(default = "default_cool_down")]
    pub cool_down_factor: u32,
    #[serde(default)]
    pub danger_zones: DangerZoneConfig,
}

fn default_fusion_width() -> u32 {
    7000
}
fn default_fusion_height() -> u32 {
    8000
}
fn default_ground_resolution() -> Dimensions {
    Dimensions::new(7000, 8000)
}
fn default_calc_per_seconds() -> u32 {
    5
}
fn default_cluster_size() -> u32 {
    10
}
fn default_heat_up() -> u32 {
    1
}
fn default_cool_down() -> u32 {
    2
}

impl Default for SensorFusionConfig {
    fn default() -> Self {
        Self {
            active: false,
            output_width: default_fusion_width(),
            output_height: default_fusion_height(),
            ground_resolution: default_ground_resolution(),
            calc_per_seconds: default_calc_per_seconds(),
            heat_map_cluster_size: default_cluster_size(),
            heat_up_factor: default_heat_up(),
            cool_down_factor: default_cool_down(),
            danger_zones: DangerZoneConfig::default(),
        }
    }
}

impl SensorFusionConfig {
    pub fn output_dimensions(&self) -> Dimensions {
        Dimensions::new(self.output_width, self.output_height)
    }

    pub fn ground_dimensions(&self) -> Dimensions {
        self.ground_resolution
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Isolation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolatorConfig {
    /// Bounded wait for an isolated process before it is killed.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_max_wait_secs() -> u64 {
    30
}

impl Default for IsolatorConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Root
// ────────────────────────────────────────────────────────────────────────────

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SandConfig {
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub lidars: Vec<LidarConfig>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub config_transformer: ConfigTransformerConfig,
    #[serde(default)]
    pub sensor_fusion: SensorFusionConfig,
    #[serde(default)]
    pub isolator: IsolatorConfig,
}

impl SandConfig {
    pub fn camera(&self, name: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn camera_mut(&mut self, name: &str) -> Option<&mut CameraConfig> {
        self.cameras.iter_mut().find(|c| c.name == name)
    }

    pub fn lidar(&self, name: &str) -> Option<&LidarConfig> {
        self.lidars.iter().find(|l| l.name == name)
    }

    pub fn lidar_mut(&mut self, name: &str) -> Option<&mut LidarConfig> {
        self.lidars.iter_mut().find(|l| l.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Names of every camera mounted on `group`.
    pub fn cameras_in_group(&self, group: &str) -> Vec<String> {
        self.cameras
            .iter()
            .filter(|c| c.group == group)
            .map(|c| c.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_calibration_is_not_rescaled() {
        let cam = CameraConfig::default();
        assert_eq!(cam.cal_points().source_points, unit_points());
    }

    #[test]
    fn source_points_scaled_into_stream_space() {
        let mut cam = CameraConfig::default();
        cam.transformation.source_points = vec![
            Point::new(3840.0, 2160.0),
            Point::new(0.0, 0.0),
            Point::new(1920.0, 1080.0),
            Point::new(384.0, 216.0),
        ];
        let cal = cam.cal_points();
        assert_eq!(cal.source_points[0], Point::new(2560.0, 1440.0));
        assert_eq!(cal.source_points[2], Point::new(1280.0, 720.0));
        assert_eq!(cal.target_points, cam.transformation.target_points);
    }

    #[test]
    fn toml_defaults_fill_missing_fields() {
        let raw = r#"
            [[cameras]]
            name = "f1_c1"
            group = "crane_a"
            stream_resolution = "1920x1080"

            [[groups]]
            name = "crane_a"
            offset_x = 10.0
            transform_y = false
        "#;
        let cfg: SandConfig = toml::from_str(raw).unwrap();
        let cam = cfg.camera("f1_c1").unwrap();
        assert_eq!(cam.stream_resolution, Dimensions::new(1920, 1080));
        assert_eq!(cam.focal, 1500.0);
        let group = cfg.group("crane_a").unwrap();
        assert!(group.transform_x);
        assert!(!group.transform_y);
        assert_eq!(cfg.sensor_fusion.output_dimensions(), Dimensions::new(7000, 8000));
        assert_eq!(cfg.isolator.max_wait_secs, 30);
        assert_eq!(cfg.cameras_in_group("crane_a"), vec!["f1_c1".to_string()]);
    }

    #[test]
    fn lidars_are_found_by_name() {
        let raw = r#"
            [[lidars]]
            name = "l1"
            transformation = { x = 1.0, y = 2.0, z = 3.0, angle = 90.0 }

            [sensor_fusion]
            ground_resolution = "3500x4000"
        "#;
        let mut cfg: SandConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.lidar("l1").unwrap().transformation.angle, 90.0);
        assert!(cfg.lidar("l2").is_none());
        cfg.lidar_mut("l1").unwrap().transformation.x = 5.0;
        assert_eq!(cfg.lidar("l1").unwrap().transformation.x, 5.0);
        assert_eq!(cfg.sensor_fusion.ground_dimensions(), Dimensions::new(3500, 4000));
    }
}
