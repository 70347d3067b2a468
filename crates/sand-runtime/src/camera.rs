//! Keeps a camera's [`Transformation`] in step with published calibration
//! updates.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use sand_kernel::{Node, SandNode, ShutdownEvent};
use sand_middleware::{BlockingSubscriber, EventBus};
use sand_perception::transform::Transformation;
use sand_types::config::SandConfig;
use sand_types::{Dimensions, Event, EventPayload, SandError};
use tracing::{debug, info, warn};

/// A transformation shared between the frame loop and its updater.
pub type SharedTransformation = Arc<RwLock<Transformation>>;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Subscription for target-point updates of `camera` from any component.
pub fn target_points_pattern(camera: &str) -> String {
    format!("+/{camera}/data/cameras/transformation_target_points")
}

/// Build the shared transformation of the camera named `camera`.
///
/// # Errors
///
/// - [`SandError::UnknownCamera`] if no camera of that name is configured.
/// - [`SandError::InvalidDimensions`] from [`Transformation::new`].
pub fn shared_transformation(
    config: &SandConfig,
    camera: &str,
    output: Dimensions,
) -> Result<SharedTransformation, SandError> {
    let camera_cfg = config
        .camera(camera)
        .ok_or_else(|| SandError::UnknownCamera(camera.to_string()))?;
    Ok(Arc::new(RwLock::new(Transformation::new(camera_cfg, output)?)))
}

/// Apply a target-point event under the write lock.
///
/// Returns `false` for any other payload.
pub fn apply_target_points(transformation: &RwLock<Transformation>, event: &Event) -> bool {
    let EventPayload::TargetPoints(points) = &event.payload else {
        return false;
    };
    let mut transformation = transformation.write().unwrap_or_else(PoisonError::into_inner);
    transformation.set_target_points(points.clone());
    debug!(camera = %transformation.camera_name(), topic = %event.topic, "target points applied");
    true
}

/// Worker that listens for new target points of one camera.
pub struct TransformerNode {
    node: SandNode,
    transformation: SharedTransformation,
}

impl TransformerNode {
    pub fn start(transformation: SharedTransformation, bus: &EventBus) -> Result<Self, SandError> {
        let camera = transformation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .camera_name()
            .to_string();
        let pattern = target_points_pattern(&camera);
        let subscriber = bus.subscribe_blocking(pattern.as_str())?;

        let mut node = SandNode::new(format!("Transformer-{camera}"));
        let worker = transformation.clone();
        node.create_thread(
            move |shutdown| receive_target_points(worker, subscriber, shutdown),
            "target-points",
            false,
            true,
        )?;
        info!(camera = %camera, topic = %pattern, "transformer node started");
        Ok(Self { node, transformation })
    }

    pub fn transformation(&self) -> SharedTransformation {
        self.transformation.clone()
    }
}

impl Node for TransformerNode {
    fn sand_node(&mut self) -> &mut SandNode {
        &mut self.node
    }
}

fn receive_target_points(
    transformation: SharedTransformation,
    mut subscriber: BlockingSubscriber,
    shutdown: ShutdownEvent,
) {
    while !shutdown.is_set() {
        match subscriber.recv_timeout(POLL_INTERVAL) {
            Ok(Some(event)) => {
                apply_target_points(&transformation, &event);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "target point subscription ended");
                break;
            }
        }
    }
}
