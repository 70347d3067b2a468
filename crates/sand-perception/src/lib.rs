//! `sand-perception` – geometry and fusion for the sand safety subsystem.
//!
//! Maps camera pixels and LiDAR ranges into one top-down ground plane and
//! decides whether tracked entities are inside configured danger zones.
//!
//! # Modules
//!
//! - [`scale`] – [`Scale`][scale::Scale]: linear mapping between two pixel
//!   spaces with independent axes.
//! - [`homography`] – four-point projective solve.
//! - [`focal`] – [`FocalNormalizer`][focal::FocalNormalizer]: radial lens
//!   correction tuned by one focal value.
//! - [`transform`] – [`Transformation`][transform::Transformation]: per-camera
//!   focal → resize → warp pipeline into the ground plane.
//! - [`lidar`] – [`LidarCloud`][lidar::LidarCloud]: VLP-16 packet decoder with
//!   an in-place updated, re-anchorable point cloud.
//! - [`fusion`] – heat maps, danger zones, the collision grid and the
//!   [`Checker`][fusion::Checker].

pub mod focal;
pub mod fusion;
pub mod homography;
pub mod lidar;
pub mod scale;
pub mod transform;
