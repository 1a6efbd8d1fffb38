//! Fire-and-forget background dispatch.
//!
//! Checkpoint creation, cross-root notification inserts and advisory counter
//! decrements are side effects of a write, never part of it: they must not
//! block or fail the triggering request. Jobs run at most once; failures are
//! logged inside the job and never retried.

use std::thread;

/// Executor for best-effort background jobs.
pub trait Dispatcher: Send + Sync + 'static {
    /// Schedules `job` to run once, detached from the caller.
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>);
}

/// Spawns each job on its own thread. The production default: side effects
/// are rare and short-lived.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDispatcher;

impl Dispatcher for ThreadDispatcher {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        thread::Builder::new()
            .name("tideline-task".into())
            .spawn(job)
            .map(drop)
            .unwrap_or_else(|e| tracing::warn!("background task not spawned: {e}"));
    }
}

/// Runs each job in the calling thread before returning. Deterministic
/// ordering for tests; callers must not hold a stripe lock the job needs.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}
