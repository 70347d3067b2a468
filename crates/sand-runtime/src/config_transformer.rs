//! Live recalibration from position telemetry.
//!
//! Cameras mounted on a moving group (e.g. a crane) keep their ground-plane
//! calibration in step with the group's position:
//!
//! ```text
//! target = original_target + (x·scale + offset_x, y·scale + offset_y)
//! ```
//!
//! with each axis gated by the group's `transform_x` / `transform_y` flag.
//! `original_target` is captured the first time a camera is seen and never
//! overwritten, so repeated messages cannot accumulate drift.  Forgetting a
//! camera writes its original back before the memo is dropped.
//!
//! Position telemetry arrives on any topic ending in `/data/position`; the
//! group is the first topic level, however deep the topic is.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sand_kernel::{Node, SandNode, ShutdownEvent};
use sand_middleware::{BlockingSubscriber, EventBus};
use sand_types::{Event, EventPayload, Point, PositionData, SandError};
use tracing::{debug, info, warn};

use crate::config::SharedConfig;

/// Component name used as the first topic level of published updates.
pub const COMPONENT: &str = "ConfigTransformer";

/// Subscription for position telemetry of every group, at any depth.
pub const POSITION_TOPIC: &str = "+/#";

/// Trailing levels that mark a topic as position telemetry.
pub const POSITION_SUFFIX: &str = "/data/position";

pub fn is_position_topic(topic: &str) -> bool {
    topic.ends_with(POSITION_SUFFIX)
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Topic on which new target points for `camera` are published.
pub fn target_points_topic(camera: &str) -> String {
    format!("{COMPONENT}/{camera}/data/cameras/transformation_target_points")
}

/// Recomputes per-camera calibration targets from position messages.
pub struct ConfigTransformer {
    config: SharedConfig,
    bus: EventBus,
    originals: HashMap<String, Vec<Point>>,
}

impl ConfigTransformer {
    pub fn new(config: SharedConfig, bus: EventBus) -> Self {
        Self {
            config,
            bus,
            originals: HashMap::new(),
        }
    }

    /// Memoized original targets of `camera`, if it has been seen.
    pub fn original_target_points(&self, camera: &str) -> Option<&[Point]> {
        self.originals.get(camera).map(Vec::as_slice)
    }

    /// Restore the original targets of one camera and drop its memo.
    ///
    /// The original is written to the shared config and published, so the
    /// next position message starts from it again.  Returns the restored
    /// targets, or `None` if the camera was never seen.
    pub fn forget_camera(&mut self, camera: &str) -> Option<Vec<Point>> {
        let original = self.originals.remove(camera)?;
        self.restore(vec![(camera.to_string(), original.clone())]);
        Some(original)
    }

    /// [`forget_camera`][Self::forget_camera] for every memoized camera.
    pub fn clear(&mut self) -> usize {
        let restored: Vec<(String, Vec<Point>)> = self.originals.drain().collect();
        let count = restored.len();
        self.restore(restored);
        count
    }

    fn restore(&self, originals: Vec<(String, Vec<Point>)>) {
        {
            let mut cfg = self.config.write().unwrap_or_else(PoisonError::into_inner);
            for (camera, targets) in &originals {
                match cfg.camera_mut(camera) {
                    Some(cam) => cam.set_target_points(targets.clone()),
                    None => warn!(camera = %camera, "camera left the config, not restoring"),
                }
            }
        }
        for (camera, targets) in &originals {
            debug!(camera = %camera, "original target points restored");
            self.publish(camera, targets);
        }
    }

    fn publish(&self, camera: &str, targets: &[Point]) {
        if let Err(e) = self
            .bus
            .publish_to(&target_points_topic(camera), EventPayload::TargetPoints(targets.to_vec()))
        {
            warn!(camera = %camera, error = %e, "failed to publish target points");
        }
    }

    /// Apply one position update of `group` to every camera mounted on it.
    ///
    /// Returns the new target points per camera, which are also written to
    /// the shared config and published on the bus.
    ///
    /// # Errors
    ///
    /// [`SandError::UnknownGroup`] when `group` has no configuration.
    pub fn handle_position(
        &mut self,
        group: &str,
        position: &PositionData,
    ) -> Result<Vec<(String, Vec<Point>)>, SandError> {
        let mut updates = Vec::new();
        {
            let mut cfg = self.config.write().unwrap_or_else(PoisonError::into_inner);
            let group_cfg = cfg
                .group(group)
                .cloned()
                .ok_or_else(|| SandError::UnknownGroup(group.to_string()))?;
            let scale = cfg.config_transformer.scale;

            let dx = if group_cfg.transform_x {
                position.x_position * scale + group_cfg.offset_x
            } else {
                0.0
            };
            let dy = if group_cfg.transform_y {
                position.y_position * scale + group_cfg.offset_y
            } else {
                0.0
            };
            // Calibration targets are 2-D; z only shows up in the logs.
            let dz = if group_cfg.transform_z {
                position.z_position * scale + group_cfg.offset_z
            } else {
                0.0
            };
            debug!(group, dx, dy, dz, "position update");

            for camera in cfg.cameras.iter_mut().filter(|c| c.group == group) {
                let original = self
                    .originals
                    .entry(camera.name.clone())
                    .or_insert_with(|| camera.transformation.target_points.clone());
                let targets: Vec<Point> = original.iter().map(|p| Point::new(p.x + dx, p.y + dy)).collect();
                camera.set_target_points(targets.clone());
                updates.push((camera.name.clone(), targets));
            }
        }

        for (camera, targets) in &updates {
            self.publish(camera, targets);
        }
        Ok(updates)
    }

    /// Handle a bus event; anything but a position payload on a position
    /// topic is ignored.
    ///
    /// The group is the first level of the topic.  Unknown groups are logged
    /// and the update is dropped.
    pub fn handle_event(&mut self, event: &Event) -> usize {
        if !is_position_topic(&event.topic) {
            return 0;
        }
        let EventPayload::Position(position) = &event.payload else {
            return 0;
        };
        let Some(group) = event.topic.split('/').next().filter(|g| !g.is_empty()) else {
            return 0;
        };
        match self.handle_position(group, position) {
            Ok(updates) => updates.len(),
            Err(e) => {
                warn!(topic = %event.topic, error = %e, "dropping position update");
                0
            }
        }
    }
}

/// Runs a [`ConfigTransformer`] on its own worker thread.
pub struct ConfigTransformerNode {
    node: SandNode,
    transformer: Arc<Mutex<ConfigTransformer>>,
}

impl ConfigTransformerNode {
    /// Subscribe to position telemetry and start the worker.
    pub fn start(transformer: ConfigTransformer, bus: &EventBus) -> Result<Self, SandError> {
        let subscriber = bus.subscribe_blocking(POSITION_TOPIC)?;
        let transformer = Arc::new(Mutex::new(transformer));
        let mut node = SandNode::new(COMPONENT);

        let worker = transformer.clone();
        node.create_thread(
            move |shutdown| receive_positions(worker, subscriber, shutdown),
            "positions",
            false,
            true,
        )?;
        info!(topic = POSITION_TOPIC, "config transformer started");
        Ok(Self { node, transformer })
    }

    pub fn forget_camera(&self, camera: &str) -> Option<Vec<Point>> {
        self.transformer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .forget_camera(camera)
    }

    pub fn clear(&self) -> usize {
        self.transformer.lock().unwrap_or_else(PoisonError::into_inner).clear()
    }
}

impl Node for ConfigTransformerNode {
    fn sand_node(&mut self) -> &mut SandNode {
        &mut self.node
    }
}

fn receive_positions(
    transformer: Arc<Mutex<ConfigTransformer>>,
    mut subscriber: BlockingSubscriber,
    shutdown: ShutdownEvent,
) {
    while !shutdown.is_set() {
        match subscriber.recv_timeout(POLL_INTERVAL) {
            Ok(Some(event)) => {
                transformer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .handle_event(&event);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "position subscription ended");
                break;
            }
        }
    }
    debug!("config transformer worker stopped");
}
