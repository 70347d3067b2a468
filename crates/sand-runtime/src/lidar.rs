//! Keeps a LiDAR's [`LidarCloud`] placed where the config says it is.
//!
//! A configured [`LidarConfig`][sand_types::config::LidarConfig] seeds the
//! cloud.  Placement updates published on the bus are written back to the
//! shared config and replayed onto the cloud, so both stay in agreement.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use sand_kernel::{Node, SandNode, ShutdownEvent};
use sand_middleware::{BlockingSubscriber, EventBus};
use sand_perception::lidar::LidarCloud;
use sand_types::config::SandConfig;
use sand_types::{Event, EventPayload, SandError};
use tracing::{debug, info, warn};

use crate::config::SharedConfig;

/// A cloud shared between the packet reader, the fusion cycle and its
/// updater.
pub type SharedLidarCloud = Arc<RwLock<LidarCloud>>;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Subscription for placement updates of `lidar` from any component.
pub fn lidar_transformation_pattern(lidar: &str) -> String {
    format!("+/{lidar}/data/lidars/transformation")
}

/// An empty cloud placed as configured for `lidar`.
///
/// # Errors
///
/// [`SandError::UnknownLidar`] if no LiDAR of that name is configured.
pub fn shared_cloud(config: &SandConfig, lidar: &str) -> Result<SharedLidarCloud, SandError> {
    let lidar_cfg = config
        .lidar(lidar)
        .ok_or_else(|| SandError::UnknownLidar(lidar.to_string()))?;
    Ok(Arc::new(RwLock::new(LidarCloud::new(lidar_cfg.transformation))))
}

/// Apply a placement event to the config entry of `lidar` and to `cloud`.
///
/// Returns `false` for any other payload.  A LiDAR missing from the config
/// still has its cloud re-anchored.
pub fn apply_lidar_transformation(
    config: &SharedConfig,
    cloud: &RwLock<LidarCloud>,
    lidar: &str,
    event: &Event,
) -> bool {
    let EventPayload::LidarTransformation(transformation) = &event.payload else {
        return false;
    };
    {
        let mut cfg = config.write().unwrap_or_else(PoisonError::into_inner);
        match cfg.lidar_mut(lidar) {
            Some(lidar_cfg) => lidar_cfg.transformation = *transformation,
            None => warn!(lidar, "lidar missing from config, updating cloud only"),
        }
    }
    cloud
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .set_transformation(*transformation);
    debug!(lidar, topic = %event.topic, "lidar transformation applied");
    true
}

/// Worker that listens for new placements of one LiDAR.
pub struct LidarTransformerNode {
    node: SandNode,
    cloud: SharedLidarCloud,
}

impl LidarTransformerNode {
    pub fn start(lidar: &str, config: SharedConfig, cloud: SharedLidarCloud, bus: &EventBus) -> Result<Self, SandError> {
        let pattern = lidar_transformation_pattern(lidar);
        let subscriber = bus.subscribe_blocking(pattern.as_str())?;

        let mut node = SandNode::new(format!("LidarTransformer-{lidar}"));
        let worker = cloud.clone();
        let name = lidar.to_string();
        node.create_thread(
            move |shutdown| receive_transformations(name, config, worker, subscriber, shutdown),
            "transformation",
            false,
            true,
        )?;
        info!(lidar, topic = %pattern, "lidar transformer node started");
        Ok(Self { node, cloud })
    }

    pub fn cloud(&self) -> SharedLidarCloud {
        self.cloud.clone()
    }
}

impl Node for LidarTransformerNode {
    fn sand_node(&mut self) -> &mut SandNode {
        &mut self.node
    }
}

fn receive_transformations(
    lidar: String,
    config: SharedConfig,
    cloud: SharedLidarCloud,
    mut subscriber: BlockingSubscriber,
    shutdown: ShutdownEvent,
) {
    while !shutdown.is_set() {
        match subscriber.recv_timeout(POLL_INTERVAL) {
            Ok(Some(event)) => {
                apply_lidar_transformation(&config, &cloud, &lidar, &event);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(lidar = %lidar, error = %e, "lidar transformation subscription ended");
                break;
            }
        }
    }
}
