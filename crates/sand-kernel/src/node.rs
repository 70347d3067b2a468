//! [`SandNode`] – named worker threads sharing one [`ShutdownEvent`], and the
//! [`Node`] trait every pipeline stage implements.

use std::thread::{self, JoinHandle};

use sand_types::SandError;
use tracing::{debug, warn};

use crate::shutdown::ShutdownEvent;

type Target = Box<dyn FnOnce(ShutdownEvent) + Send + 'static>;

enum WorkerState {
    Pending(Target),
    Running(JoinHandle<()>),
    Joined,
}

struct Worker {
    name: String,
    daemon: bool,
    state: WorkerState,
}

/// Registry of the threads owned by one pipeline stage.
///
/// Every worker receives a clone of the node's [`ShutdownEvent`] and is
/// expected to return soon after it is set.
pub struct SandNode {
    name: String,
    shutdown_event: ShutdownEvent,
    workers: Vec<Worker>,
}

impl SandNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_shutdown_event(name, ShutdownEvent::new())
    }

    /// A node driven by an externally owned event, e.g. one shared by the
    /// whole process.
    pub fn with_shutdown_event(name: impl Into<String>, shutdown_event: ShutdownEvent) -> Self {
        Self {
            name: name.into(),
            shutdown_event,
            workers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shutdown_event(&self) -> &ShutdownEvent {
        &self.shutdown_event
    }

    /// Register a worker named `name`.
    ///
    /// With `start == false` the worker stays pending until
    /// [`start_all`][Self::start_all].  [`join_all`][Self::join_all] waits
    /// for every started worker.  `daemon` only matters when the node is
    /// dropped without a shutdown: daemon workers are then detached and die
    /// with the process, the others are signalled and joined.
    ///
    /// # Errors
    ///
    /// [`SandError::Spawn`] if the OS refuses to create the thread.
    pub fn create_thread<F>(&mut self, target: F, name: &str, daemon: bool, start: bool) -> Result<(), SandError>
    where
        F: FnOnce(ShutdownEvent) + Send + 'static,
    {
        let thread_name = format!("{}-{}", self.name, name);
        let target: Target = Box::new(target);
        let state = if start {
            WorkerState::Running(spawn(&thread_name, target, self.shutdown_event.clone())?)
        } else {
            WorkerState::Pending(target)
        };
        debug!(node = %self.name, worker = %thread_name, daemon, start, "worker registered");
        self.workers.push(Worker {
            name: thread_name,
            daemon,
            state,
        });
        Ok(())
    }

    /// Start every pending worker.
    pub fn start_all(&mut self) -> Result<(), SandError> {
        for worker in &mut self.workers {
            if matches!(worker.state, WorkerState::Pending(_)) {
                let WorkerState::Pending(target) = std::mem::replace(&mut worker.state, WorkerState::Joined) else {
                    continue;
                };
                worker.state = WorkerState::Running(spawn(&worker.name, target, self.shutdown_event.clone())?);
            }
        }
        Ok(())
    }

    /// Number of workers whose thread is still running.
    pub fn alive_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| matches!(&w.state, WorkerState::Running(handle) if !handle.is_finished()))
            .count()
    }

    /// Join every started worker, daemon or not.
    ///
    /// Workers that already exited, panicked or never started are skipped
    /// without error.
    pub fn join_all(&mut self) {
        for worker in &mut self.workers {
            worker.join();
        }
    }
}

impl Worker {
    fn join(&mut self) {
        if let WorkerState::Running(handle) = std::mem::replace(&mut self.state, WorkerState::Joined) {
            if handle.join().is_err() {
                warn!(worker = %self.name, "worker panicked");
            } else {
                debug!(worker = %self.name, "worker joined");
            }
        }
    }
}

impl Drop for SandNode {
    fn drop(&mut self) {
        if !self.workers.iter().any(|w| matches!(w.state, WorkerState::Running(_))) {
            return;
        }
        debug!(node = %self.name, "dropped without shutdown");
        self.shutdown_event.set();
        for worker in &mut self.workers {
            if worker.daemon {
                if matches!(worker.state, WorkerState::Running(_)) {
                    debug!(worker = %worker.name, "detaching daemon worker");
                }
                worker.state = WorkerState::Joined;
            } else {
                worker.join();
            }
        }
    }
}

fn spawn(name: &str, target: Target, shutdown_event: ShutdownEvent) -> Result<JoinHandle<()>, SandError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || target(shutdown_event))
        .map_err(|e| SandError::Spawn {
            name: name.to_string(),
            details: e.to_string(),
        })
}

/// A pipeline stage built on a [`SandNode`].
///
/// Implementors override [`shutdown_before_join`][Node::shutdown_before_join]
/// to release anything their workers may be blocked on.
pub trait Node {
    fn sand_node(&mut self) -> &mut SandNode;

    fn shutdown_before_join(&mut self) {}

    /// Signal, run the hook, then join every worker.
    fn shutdown(&mut self) {
        let node = self.sand_node();
        debug!(node = %node.name, "shutting down");
        node.shutdown_event.set();
        self.shutdown_before_join();
        self.sand_node().join_all();
    }
}

impl Node for SandNode {
    fn sand_node(&mut self) -> &mut SandNode {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn looping_worker(counter: Arc<AtomicUsize>) -> impl FnOnce(ShutdownEvent) + Send + 'static {
        move |shutdown: ShutdownEvent| {
            while !shutdown.wait_timeout(Duration::from_millis(5)) {}
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn shutdown_signals_and_joins_every_worker() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut node = SandNode::new("test");
        node.create_thread(looping_worker(counter.clone()), "a", false, true).unwrap();
        node.create_thread(looping_worker(counter.clone()), "b", false, true).unwrap();
        assert_eq!(node.alive_count(), 2);

        node.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(node.alive_count(), 0);
    }

    #[test]
    fn pending_worker_starts_on_demand() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut node = SandNode::new("test");
        node.create_thread(looping_worker(counter.clone()), "late", false, false).unwrap();
        assert_eq!(node.alive_count(), 0);
        node.start_all().unwrap();
        assert_eq!(node.alive_count(), 1);
        node.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dead_and_unstarted_workers_are_tolerated() {
        let mut node = SandNode::new("test");
        node.create_thread(|_| {}, "quick", false, true).unwrap();
        node.create_thread(|_| panic!("boom"), "panics", false, true).unwrap();
        node.create_thread(|_| {}, "never", false, false).unwrap();
        thread::sleep(Duration::from_millis(20));
        node.shutdown();
        node.shutdown();
    }

    /// Exits only some time after the signal, then raises `done`.
    fn slow_exit_worker(done: Arc<AtomicBool>) -> impl FnOnce(ShutdownEvent) + Send + 'static {
        move |shutdown: ShutdownEvent| {
            while !shutdown.wait_timeout(Duration::from_millis(5)) {}
            thread::sleep(Duration::from_millis(50));
            done.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn shutdown_waits_for_daemon_workers() {
        let done = Arc::new(AtomicBool::new(false));
        let mut node = SandNode::new("test");
        node.create_thread(slow_exit_worker(done.clone()), "daemon", true, true).unwrap();

        node.shutdown();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(node.alive_count(), 0);
    }

    #[test]
    fn drop_without_shutdown_joins_non_daemon_workers() {
        let done = Arc::new(AtomicBool::new(false));
        let event = ShutdownEvent::new();
        let mut node = SandNode::with_shutdown_event("test", event.clone());
        node.create_thread(slow_exit_worker(done.clone()), "worker", false, true).unwrap();

        drop(node);
        assert!(event.is_set());
        assert!(done.load(Ordering::SeqCst));
    }

    struct HookNode {
        node: SandNode,
        hook_saw_signal: bool,
    }

    impl Node for HookNode {
        fn sand_node(&mut self) -> &mut SandNode {
            &mut self.node
        }

        fn shutdown_before_join(&mut self) {
            self.hook_saw_signal = self.node.shutdown_event().is_set();
        }
    }

    #[test]
    fn hook_runs_after_signal() {
        let mut node = HookNode {
            node: SandNode::new("hooked"),
            hook_saw_signal: false,
        };
        node.shutdown();
        assert!(node.hook_saw_signal);
    }
}
