//! One sensor-fusion cycle: reset, test every input, publish.

use std::time::Duration;

use sand_middleware::EventBus;
use sand_perception::fusion::Checker;
use sand_perception::lidar::LidarPoint;
use sand_types::config::SensorFusionConfig;
use sand_types::{Dimensions, EventPayload, Quad, SandError};
use tracing::{debug, warn};

pub const COLLISION_TOPIC: &str = "SensorFusion/all/data/collision";
pub const COLLISION_MAP_TOPIC: &str = "SensorFusion/all/data/collision_map";

/// Outcome of one [`FusionCycle::run`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FusionReport {
    pub collision: bool,
    pub dangerous_boxes: usize,
    pub dangerous_persons: usize,
    pub dangerous_points: usize,
    pub flagged_cells: usize,
}

/// Drives a [`Checker`] once per fusion tick.
pub struct FusionCycle {
    checker: Checker,
    bus: EventBus,
    interval: Duration,
}

impl FusionCycle {
    pub fn new(config: &SensorFusionConfig, input: Dimensions, bus: EventBus) -> Result<Self, SandError> {
        Ok(Self {
            checker: Checker::new(config, input)?,
            bus,
            interval: interval(config),
        })
    }

    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    /// Time between two cycles at the configured rate.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Swap in a new configuration; the old checker stays on error.
    pub fn reconfigure(&mut self, config: &SensorFusionConfig, input: Dimensions) -> Result<(), SandError> {
        self.checker.reinit_data(config, input)?;
        self.interval = interval(config);
        Ok(())
    }

    /// Clear the collision grid, test every input and publish the result.
    pub fn run(&mut self, boxes: &[Quad], persons: &[Quad], points: &[LidarPoint]) -> FusionReport {
        self.checker.reset_collision();

        let dangerous_boxes = boxes.iter().filter(|b| self.checker.test_box(b)).count();
        let dangerous_persons = persons.iter().filter(|p| self.checker.test_person(p)).count();
        let dangerous_points = points.iter().filter(|p| self.checker.test_point(p)).count();

        let map = self.checker.get_collision_map().clone();
        let report = FusionReport {
            collision: self.checker.is_collision(),
            dangerous_boxes,
            dangerous_persons,
            dangerous_points,
            flagged_cells: map.iter().flatten().filter(|&&c| c).count(),
        };
        debug!(?report, "fusion cycle");

        for (topic, payload) in [
            (COLLISION_TOPIC, EventPayload::CollisionStatus(report.collision)),
            (COLLISION_MAP_TOPIC, EventPayload::CollisionMap(map)),
        ] {
            if let Err(e) = self.bus.publish_to(topic, payload) {
                warn!(topic, error = %e, "failed to publish fusion result");
            }
        }
        report
    }
}

fn interval(config: &SensorFusionConfig) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(config.calc_per_seconds.max(1)))
}
