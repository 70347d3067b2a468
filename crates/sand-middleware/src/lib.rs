//! `sand-middleware` – in-process pub/sub plumbing.
//!
//! Routes events between pipeline stages without caring about their meaning.
//! Topics are slash-separated strings in the MQTT style used by the external
//! broker (`"<component>/<device>/data/<name>"`), and subscriptions accept the
//! `+` (one level) and `#` (all remaining levels) wildcards.
//!
//! # Modules
//!
//! - [`bus`] – [`EventBus`], a broadcast channel with wildcard topic filtering,
//!   async receivers for Tokio tasks and bounded-wait receivers for worker
//!   threads.

pub mod bus;

pub use bus::{BlockingSubscriber, EventBus, TopicSubscriber, topic_matches};
