//! Wake-ups that cross the boundary between the actor system and the outside world.
//!
//! Handler tasks are polled by their selective actor while it is active.
//! When a task is woken while its actor is *not* driving it (a timer fired,
//! another thread completed a channel, ...), the wake-up is posted here and
//! the runtime turns it into a `Wakeup` message for that actor.

use crate::id::ActorId;
use futures::task::ArcWake;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Pending {
    woken: Vec<ActorId>,
    poked: bool,
}

pub struct WakeupHub {
    pending: Mutex<Pending>,
    signal: Condvar,
    parked: AtomicUsize,
}

impl WakeupHub {
    pub fn new() -> Arc<Self> {
        Arc::new(WakeupHub {
            pending: Mutex::new(Pending::default()),
            signal: Condvar::new(),
            parked: AtomicUsize::new(0),
        })
    }

    /// Ask the runtime to wake `actor` up
    pub fn notify(&self, actor: ActorId) {
        self.pending.lock().woken.push(actor);
        self.signal.notify_all();
    }

    /// Wake whoever waits in `wait_for`, without addressing an actor
    pub fn poke(&self) {
        self.pending.lock().poked = true;
        self.signal.notify_all();
    }

    /// Take all actors that asked to be woken, oldest first
    pub fn drain(&self) -> Vec<ActorId> {
        ::std::mem::take(&mut self.pending.lock().woken)
    }

    /// Block until something is notified or poked, or the timeout passes.
    /// Returns `false` on timeout.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock();
        if pending.woken.is_empty() && !pending.poked {
            self.signal.wait_for(&mut pending, timeout);
        }
        let signalled = !pending.woken.is_empty() || pending.poked;
        pending.poked = false;
        signalled
    }

    /// Count a suspended handler task until the returned guard is dropped
    pub fn park(self: &Arc<Self>) -> ParkGuard {
        self.parked.fetch_add(1, Ordering::SeqCst);
        ParkGuard {
            hub: Arc::clone(self),
        }
    }

    /// Number of handler tasks that are currently suspended
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }
}

pub struct ParkGuard {
    hub: Arc<WakeupHub>,
}

impl Drop for ParkGuard {
    fn drop(&mut self) {
        self.hub.parked.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Waker of one handler task, or of a top-level future driven by `block_on`.
pub struct TaskWaker {
    woken: AtomicBool,
    owner: Option<ActorId>,
    driving: Arc<AtomicBool>,
    hub: Arc<WakeupHub>,
}

impl TaskWaker {
    /// Waker for a task of `owner`. Starts out woken so the first poll happens
    /// right away. While `driving` is set, wake-ups are picked up by the
    /// driving loop and never reach the hub.
    pub fn for_task(owner: ActorId, driving: Arc<AtomicBool>, hub: Arc<WakeupHub>) -> Arc<Self> {
        Arc::new(TaskWaker {
            woken: AtomicBool::new(true),
            owner: Some(owner),
            driving,
            hub,
        })
    }

    /// Waker for a future driven from outside the actor system
    pub fn for_caller(hub: Arc<WakeupHub>) -> Arc<Self> {
        Arc::new(TaskWaker {
            woken: AtomicBool::new(true),
            owner: None,
            driving: Arc::new(AtomicBool::new(false)),
            hub,
        })
    }

    pub fn take_woken(&self) -> bool {
        self.woken.swap(false, Ordering::SeqCst)
    }

    pub fn is_woken(&self) -> bool {
        self.woken.load(Ordering::SeqCst)
    }
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::SeqCst);
        match arc_self.owner {
            Some(owner) => {
                if !arc_self.driving.load(Ordering::SeqCst) {
                    arc_self.hub.notify(owner);
                }
            }
            None => arc_self.hub.poke(),
        }
    }
}
