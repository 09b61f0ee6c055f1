//! Scheduling strategies for the [`TestingRuntime`](../struct.TestingRuntime.html).
//!
//! A strategy is consulted before every operation of an execution and picks
//! which enabled thread advances next. Between executions it is asked to
//! prepare a fresh schedule, which is where systematic strategies keep track
//! of what they already explored.

use crate::id::ActorId;
use crate::testing::OpKind;

mod pct;
mod random;

pub use self::pct::PctStrategy;
pub use self::random::RandomStrategy;

/// What a strategy gets to see of one thread (one actor of the testing runtime)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ThreadView {
    /// The actor behind the thread
    pub actor: ActorId,
    /// Whether the thread has a runnable next operation
    pub enabled: bool,
    /// The operation the thread performs when chosen.
    /// `None` while the actor's creation has not been executed yet.
    pub next_op: Option<OpKind>,
}

/// Picks which thread runs next.
pub trait SchedulingStrategy {
    /// Index into `threads` of an enabled thread, or `None` when none is enabled
    fn choose_next_thread(&mut self, threads: &[ThreadView]) -> Option<usize>;

    /// Called before each execution. Returns `false` when there are no more
    /// schedules to explore.
    fn prepare_for_next_schedule(&mut self) -> bool;
}

impl<'a, S: SchedulingStrategy + ?Sized> SchedulingStrategy for &'a mut S {
    fn choose_next_thread(&mut self, threads: &[ThreadView]) -> Option<usize> {
        (**self).choose_next_thread(threads)
    }

    fn prepare_for_next_schedule(&mut self) -> bool {
        (**self).prepare_for_next_schedule()
    }
}

impl<S: SchedulingStrategy + ?Sized> SchedulingStrategy for Box<S> {
    fn choose_next_thread(&mut self, threads: &[ThreadView]) -> Option<usize> {
        (**self).choose_next_thread(threads)
    }

    fn prepare_for_next_schedule(&mut self) -> bool {
        (**self).prepare_for_next_schedule()
    }
}

pub(crate) fn enabled_indices(threads: &[ThreadView]) -> Vec<usize> {
    threads
        .iter()
        .enumerate()
        .filter(|(_, thread)| thread.enabled)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
pub(crate) fn views(enabled: &[bool]) -> Vec<ThreadView> {
    enabled
        .iter()
        .enumerate()
        .map(|(i, &enabled)| ThreadView {
            actor: ActorId::new(i),
            enabled,
            next_op: Some(OpKind::Receive),
        })
        .collect()
}
