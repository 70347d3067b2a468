//! Danger-zone checks over the shared ground plane.
//!
//! - [`heat_map`] – [`HeatMap`]: cumulative occupancy counts.
//! - [`danger_zone`] – [`DangerZone`]: edge-inclusive polygon membership.
//! - [`collision`] – [`Collision`]: the per-cycle collision grid.
//! - [`checker`] – the box, person and point adapters and the
//!   [`Checker`] that owns them.
//!
//! The adapters are single-writer per category, so none of these types lock
//! internally.  Callers serialise reconfiguration against in-flight tests.

pub mod checker;
pub mod collision;
pub mod danger_zone;
pub mod heat_map;

pub use checker::{BoxChecker, Checker, PersonChecker, PointChecker};
pub use collision::Collision;
pub use danger_zone::DangerZone;
pub use heat_map::HeatMap;
