//! `sand-runtime` – wiring of the sand pipeline stages.
//!
//! # Modules
//!
//! - [`config`] – TOML loading with `SAND_*` overrides and the
//!   [`SharedConfig`][config::SharedConfig] lock.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: `tracing`
//!   subscriber with optional OTLP export.
//! - [`config_transformer`] – [`ConfigTransformer`][config_transformer::ConfigTransformer]:
//!   recomputes camera calibration targets from group position telemetry and
//!   publishes them.
//! - [`camera`] – [`TransformerNode`][camera::TransformerNode]: applies
//!   published target points to a shared
//!   [`Transformation`][sand_perception::transform::Transformation].
//! - [`lidar`] – [`LidarTransformerNode`][lidar::LidarTransformerNode]:
//!   applies published placements to the config and a shared
//!   [`LidarCloud`][sand_perception::lidar::LidarCloud].
//! - [`fusion_cycle`] – [`FusionCycle`][fusion_cycle::FusionCycle]: one
//!   reset → test → publish pass of the
//!   [`Checker`][sand_perception::fusion::Checker].

pub mod camera;
pub mod config;
pub mod config_transformer;
pub mod fusion_cycle;
pub mod lidar;
pub mod telemetry;

pub use camera::{SharedTransformation, TransformerNode, shared_transformation};
pub use config::{ConfigError, SharedConfig};
pub use config_transformer::{ConfigTransformer, ConfigTransformerNode};
pub use fusion_cycle::{FusionCycle, FusionReport};
pub use lidar::{LidarTransformerNode, SharedLidarCloud, shared_cloud};
