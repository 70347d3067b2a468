//! Detection and point adapters plus the [`Checker`] composition root.

use sand_types::config::SensorFusionConfig;
use sand_types::{Dimensions, Point, Quad, SandError};
use tracing::{debug, info};

use super::collision::Collision;
use super::danger_zone::DangerZone;
use super::heat_map::HeatMap;
use crate::lidar::LidarPoint;
use crate::scale::Scale;

/// Ground-frame units per LiDAR metre.
pub const LIDAR_UNITS_PER_METRE: f64 = 100.0;

fn heat_map_for(config: &SensorFusionConfig) -> HeatMap {
    HeatMap::new(
        config.output_dimensions(),
        config.heat_map_cluster_size,
        config.heat_up_factor,
        config.cool_down_factor,
    )
}

fn zone_from(polygons: &[Vec<Point>]) -> DangerZone {
    DangerZone::new(polygons.to_vec())
}

/// Object detections against object zones.
#[derive(Debug, Clone)]
pub struct BoxChecker {
    scale: Scale,
    heat_map: HeatMap,
    zone: DangerZone,
}

impl BoxChecker {
    pub fn new(scale: Scale, heat_map: HeatMap, zone: DangerZone) -> Self {
        Self {
            scale,
            heat_map,
            zone,
        }
    }

    /// A box is dangerous when its centre or any corner is in a zone.
    pub fn test(&mut self, quad: &Quad, collision: &mut Collision) -> bool {
        let quad = self.scale.quad(quad);
        let center = quad.center();
        self.heat_map.add(center);

        let hit = std::iter::once(center)
            .chain(quad.corners())
            .find(|&p| self.zone.contains(p));
        match hit {
            Some(p) => {
                collision.mark(p);
                true
            }
            None => false,
        }
    }

    pub fn heat_map(&self) -> &HeatMap {
        &self.heat_map
    }
}

/// Person detections against person zones, with a heat map of their own.
#[derive(Debug, Clone)]
pub struct PersonChecker {
    scale: Scale,
    heat_map: HeatMap,
    zone: DangerZone,
}

impl PersonChecker {
    pub fn new(scale: Scale, heat_map: HeatMap, zone: DangerZone) -> Self {
        Self {
            scale,
            heat_map,
            zone,
        }
    }

    /// A person is dangerous when the centre of their box is in a zone.
    pub fn test(&mut self, quad: &Quad, collision: &mut Collision) -> bool {
        let center = self.scale.quad(quad).center();
        self.heat_map.add(center);
        if self.zone.contains(center) {
            collision.mark(center);
            true
        } else {
            false
        }
    }

    pub fn heat_map(&self) -> &HeatMap {
        &self.heat_map
    }
}

/// LiDAR returns against object zones.
///
/// Metres become ground units, which `scale` then maps into the output
/// resolution the zones live in.
#[derive(Debug, Clone)]
pub struct PointChecker {
    scale: Scale,
    heat_map: HeatMap,
    zone: DangerZone,
}

impl PointChecker {
    /// `scale` maps ground units into output pixels.
    pub fn new(scale: Scale, heat_map: HeatMap, zone: DangerZone) -> Self {
        Self {
            scale,
            heat_map,
            zone,
        }
    }

    pub fn test(&mut self, point: &LidarPoint, collision: &mut Collision) -> bool {
        let ground = Point::new(point.x * LIDAR_UNITS_PER_METRE, point.y * LIDAR_UNITS_PER_METRE);
        let p = self.scale.point(ground);
        self.heat_map.add(p);
        if self.zone.contains(p) {
            collision.mark(p);
            true
        } else {
            false
        }
    }

    pub fn heat_map(&self) -> &HeatMap {
        &self.heat_map
    }
}

/// Owns every accumulator of one fusion stage.
///
/// Detections arrive in `input` pixels (the transformation output) and LiDAR
/// returns in ground units.  Both are scaled into the configured fusion
/// output resolution, in which the danger zones are expressed.
#[derive(Debug, Clone)]
pub struct Checker {
    input: Dimensions,
    output: Dimensions,
    collision: Collision,
    box_checker: BoxChecker,
    person_checker: PersonChecker,
    point_checker: PointChecker,
}

impl Checker {
    /// # Errors
    ///
    /// [`SandError::InvalidDimensions`] when `input` or the configured output
    /// has a zero side.
    pub fn new(config: &SensorFusionConfig, input: Dimensions) -> Result<Self, SandError> {
        let output = config.output_dimensions();
        let scale = Scale::new(input, output)?;
        let ground_scale = Scale::new(config.ground_dimensions(), output)?;
        let zones = &config.danger_zones;
        debug!(
            %input,
            %output,
            ground = %config.ground_dimensions(),
            object_zones = zones.object_polygons.len(),
            person_zones = zones.person_polygons.len(),
            "checker built"
        );
        Ok(Self {
            input,
            output,
            collision: Collision::new(output, config.heat_map_cluster_size),
            box_checker: BoxChecker::new(scale, heat_map_for(config), zone_from(&zones.object_polygons)),
            person_checker: PersonChecker::new(scale, heat_map_for(config), zone_from(&zones.person_polygons)),
            point_checker: PointChecker::new(ground_scale, heat_map_for(config), zone_from(&zones.object_polygons)),
        })
    }

    /// Rebuild every accumulator, scale and zone from `config`.
    ///
    /// The replacement is built completely before it is swapped in, so on
    /// error the checker is left as it was.
    pub fn reinit_data(&mut self, config: &SensorFusionConfig, input: Dimensions) -> Result<(), SandError> {
        let fresh = Self::new(config, input)?;
        *self = fresh;
        info!(%input, output = %self.output, "checker reinitialised");
        Ok(())
    }

    pub fn input(&self) -> Dimensions {
        self.input
    }

    pub fn output(&self) -> Dimensions {
        self.output
    }

    pub fn test_box(&mut self, quad: &Quad) -> bool {
        self.box_checker.test(quad, &mut self.collision)
    }

    pub fn test_person(&mut self, quad: &Quad) -> bool {
        self.person_checker.test(quad, &mut self.collision)
    }

    pub fn test_point(&mut self, point: &LidarPoint) -> bool {
        self.point_checker.test(point, &mut self.collision)
    }

    pub fn reset_collision(&mut self) {
        self.collision.reset();
    }

    pub fn get_collision_map(&self) -> &Vec<Vec<bool>> {
        self.collision.collision_map()
    }

    pub fn is_collision(&self) -> bool {
        self.collision.is_collision()
    }

    pub fn object_heat_map(&self) -> &HeatMap {
        self.box_checker.heat_map()
    }

    pub fn person_heat_map(&self) -> &HeatMap {
        self.person_checker.heat_map()
    }

    pub fn point_heat_map(&self) -> &HeatMap {
        self.point_checker.heat_map()
    }

    /// Apply one explicit cool-down step to every heat map.
    pub fn cool_down(&mut self) {
        self.box_checker.heat_map.cool_down();
        self.person_checker.heat_map.cool_down();
        self.point_checker.heat_map.cool_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sand_types::config::DangerZoneConfig;

    fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Vec<Point> {
        Quad::from_extents(x1, y1, x2, y2).corners().to_vec()
    }

    fn config() -> SensorFusionConfig {
        SensorFusionConfig {
            output_width: 1000,
            output_height: 1000,
            ground_resolution: Dimensions::new(1000, 1000),
            heat_map_cluster_size: 10,
            danger_zones: DangerZoneConfig {
                object_polygons: vec![rect(0.0, 0.0, 200.0, 200.0)],
                person_polygons: vec![rect(500.0, 500.0, 700.0, 700.0)],
            },
            ..SensorFusionConfig::default()
        }
    }

    /// Detections in 100x100 input pixels, i.e. ×10 into output.
    fn checker() -> Checker {
        Checker::new(&config(), Dimensions::new(100, 100)).unwrap()
    }

    #[test]
    fn box_is_scaled_before_zone_test() {
        let mut checker = checker();
        assert!(checker.test_box(&Quad::from_extents(5.0, 5.0, 10.0, 10.0)));
        assert!(!checker.test_box(&Quad::from_extents(50.0, 50.0, 60.0, 60.0)));
        assert!(checker.is_collision());
    }

    #[test]
    fn box_corner_in_zone_is_dangerous() {
        let mut checker = checker();
        // Centre at (270, 270) output, upper-left corner at (190, 190).
        assert!(checker.test_box(&Quad::from_extents(19.0, 19.0, 35.0, 35.0)));
    }

    #[test]
    fn person_uses_person_zones_only() {
        let mut checker = checker();
        assert!(!checker.test_person(&Quad::from_extents(5.0, 5.0, 10.0, 10.0)));
        assert!(checker.test_person(&Quad::from_extents(55.0, 55.0, 65.0, 65.0)));
    }

    #[test]
    fn heat_maps_are_separate() {
        let mut checker = checker();
        checker.test_box(&Quad::from_extents(5.0, 5.0, 10.0, 10.0));
        assert_eq!(checker.object_heat_map().total(), 1);
        assert_eq!(checker.person_heat_map().total(), 0);
        checker.test_person(&Quad::from_extents(55.0, 55.0, 65.0, 65.0));
        assert_eq!(checker.object_heat_map().total(), 1);
        assert_eq!(checker.person_heat_map().total(), 1);
        assert_eq!(checker.point_heat_map().total(), 0);
    }

    #[test]
    fn lidar_metres_are_mapped_to_ground_units() {
        let mut checker = checker();
        let near = LidarPoint {
            x: 1.5,
            y: 1.0,
            ..LidarPoint::default()
        };
        let far = LidarPoint {
            x: 8.0,
            y: 8.0,
            ..LidarPoint::default()
        };
        assert!(checker.test_point(&near));
        assert!(!checker.test_point(&far));
        assert_eq!(checker.point_heat_map().total(), 2);
    }

    /// Deployed shape: 7000x8000 ground units shown at 700x800.
    fn deployed_config() -> SensorFusionConfig {
        SensorFusionConfig {
            output_width: 700,
            output_height: 800,
            ground_resolution: Dimensions::new(7000, 8000),
            danger_zones: DangerZoneConfig {
                object_polygons: vec![rect(400.0, 400.0, 600.0, 600.0)],
                person_polygons: Vec::new(),
            },
            ..SensorFusionConfig::default()
        }
    }

    #[test]
    fn lidar_and_boxes_share_the_output_frame() {
        let mut checker = Checker::new(&deployed_config(), Dimensions::new(7000, 8000)).unwrap();

        assert!(checker.test_box(&Quad::from_extents(4900.0, 4900.0, 5100.0, 5100.0)));
        let inside = LidarPoint {
            x: 50.0,
            y: 50.0,
            ..LidarPoint::default()
        };
        assert!(checker.test_point(&inside));

        // 500 ground units, but only 50 output pixels.
        let outside = LidarPoint {
            x: 5.0,
            y: 5.0,
            ..LidarPoint::default()
        };
        assert!(!checker.test_point(&outside));
    }

    #[test]
    fn reinit_rescales_lidar_points() {
        let mut checker = checker();
        let point = LidarPoint {
            x: 1.5,
            y: 1.0,
            ..LidarPoint::default()
        };
        assert!(checker.test_point(&point));

        // 150x100 ground units: 75x50 px, then 600x400 px.
        let mut coarse = config();
        coarse.ground_resolution = Dimensions::new(2000, 2000);
        checker.reinit_data(&coarse, Dimensions::new(100, 100)).unwrap();
        assert!(checker.test_point(&point));

        let mut fine = config();
        fine.ground_resolution = Dimensions::new(250, 250);
        checker.reinit_data(&fine, Dimensions::new(100, 100)).unwrap();
        assert!(!checker.test_point(&point));
    }

    #[test]
    fn zero_ground_resolution_is_rejected() {
        let mut broken = config();
        broken.ground_resolution = Dimensions::new(0, 1000);
        assert!(Checker::new(&broken, Dimensions::new(100, 100)).is_err());
    }

    #[test]
    fn double_reset_is_all_clear() {
        let mut checker = checker();
        checker.test_box(&Quad::from_extents(5.0, 5.0, 10.0, 10.0));
        checker.reset_collision();
        assert!(checker.get_collision_map().iter().flatten().all(|c| !c));
        checker.reset_collision();
        assert!(checker.get_collision_map().iter().flatten().all(|c| !c));
    }

    #[test]
    fn reinit_replaces_zones_and_scale_together() {
        let mut checker = checker();
        checker.test_box(&Quad::from_extents(5.0, 5.0, 10.0, 10.0));

        let mut moved = config();
        moved.danger_zones.object_polygons = vec![rect(800.0, 800.0, 1000.0, 1000.0)];
        checker.reinit_data(&moved, Dimensions::new(1000, 1000)).unwrap();

        assert_eq!(checker.input(), Dimensions::new(1000, 1000));
        assert_eq!(checker.object_heat_map().total(), 0);
        assert!(!checker.is_collision());
        // Old zone with old scale would have matched; new zone with new
        // scale (×1) matches only in output coordinates.
        assert!(!checker.test_box(&Quad::from_extents(5.0, 5.0, 10.0, 10.0)));
        assert!(!checker.test_box(&Quad::from_extents(85.0, 85.0, 90.0, 90.0)));
        assert!(checker.test_box(&Quad::from_extents(850.0, 850.0, 900.0, 900.0)));
    }

    #[test]
    fn failed_reinit_keeps_previous_state() {
        let mut checker = checker();
        let mut broken = config();
        broken.output_width = 0;
        assert!(checker.reinit_data(&broken, Dimensions::new(100, 100)).is_err());
        assert_eq!(checker.output(), Dimensions::new(1000, 1000));
        assert!(checker.test_box(&Quad::from_extents(5.0, 5.0, 10.0, 10.0)));
    }

    #[test]
    fn cool_down_touches_every_heat_map() {
        let mut checker = checker();
        checker.test_box(&Quad::from_extents(5.0, 5.0, 10.0, 10.0));
        checker.test_person(&Quad::from_extents(55.0, 55.0, 65.0, 65.0));
        checker.cool_down();
        assert_eq!(checker.object_heat_map().total(), 0);
        assert_eq!(checker.person_heat_map().total(), 0);
    }
}
