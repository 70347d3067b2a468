//! `sand-kernel` – concurrency substrate of the sand pipeline.
//!
//! Geometry and fusion are synchronous; the only blocking points are worker
//! joins, isolated-process waits and bus receives.  Cancellation is
//! cooperative through a shared [`ShutdownEvent`].
//!
//! # Modules
//!
//! - [`shutdown`] – [`ShutdownEvent`][shutdown::ShutdownEvent]: a clonable,
//!   waitable latch.
//! - [`node`] – [`SandNode`][node::SandNode] and the [`Node`][node::Node]
//!   trait: named worker threads joined on shutdown.
//! - [`isolator`] – [`Isolator`][isolator::Isolator]: a child process with
//!   bounded-wait-then-kill shutdown, reporting an
//!   [`IsolationOutcome`][isolator::IsolationOutcome].

pub mod isolator;
pub mod node;
pub mod shutdown;

pub use isolator::{IsolationOutcome, Isolator, wait_for_parent_shutdown};
pub use node::{Node, SandNode};
pub use shutdown::ShutdownEvent;
