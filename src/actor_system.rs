use crate::actor::{Actor, Plain};
use crate::class::Class;
use crate::error::{RuntimeError, RuntimeResult};
use crate::id::{ActorId, ActorRef};
use crate::messaging::{Fate, Handler, Message, Wakeup};
use crate::tuning::Tuning;
use crate::wakeup::{TaskWaker, WakeupHub};

use futures::task::waker;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, error, trace};

/// The operations both runtimes offer to actors and to the typed layer.
pub(crate) trait Kernel {
    fn create(&self, name: &str, handler: Box<dyn Handler>) -> ActorId;
    fn send(&self, recipient: ActorId, message: Box<dyn Any>);
    fn current_actor(&self) -> RuntimeResult<ActorId>;
    fn custom_data(&self, key: &'static str) -> RuntimeResult<Option<Rc<dyn Any>>>;
    fn replace_custom_data(
        &self,
        key: &'static str,
        value: Option<Rc<dyn Any>>,
    ) -> RuntimeResult<Option<Rc<dyn Any>>>;
    fn is_testing(&self) -> bool;
    fn wakeups(&self) -> Arc<WakeupHub>;
    fn actor_name(&self, id: ActorId) -> Option<String>;
    fn next_call_id(&self) -> u64;
    fn fail(&self, reason: String);
}

/// Gives access to a runtime, from inside a handler or from outside,
/// to create actors, send messages and inspect the current activation.
///
/// A `World` is a cheap handle; clones refer to the same runtime.
#[derive(Clone)]
pub struct World(Rc<dyn Kernel>);

impl World {
    pub(crate) fn new(kernel: Rc<dyn Kernel>) -> Self {
        World(kernel)
    }

    /// Create an actor from a plain handler.
    ///
    /// ```ignore
    /// let echo = world.create("Echo", from_fn(|text: String, _: &World| {
    ///     println!("{}", text);
    ///     Fate::Live
    /// }));
    /// echo.send("hello".to_owned());
    /// ```
    pub fn create<M: Message, A: Actor<M>>(&self, name: &str, actor: A) -> ActorRef<M> {
        let id = self.create_handler(name, Box::new(Plain::new(actor)));
        ActorRef::new(id, self.clone())
    }

    /// Create an actor from an untyped handler
    pub fn create_handler(&self, name: &str, handler: Box<dyn Handler>) -> ActorId {
        self.0.create(name, handler)
    }

    /// Send a message to an actor by id, see [`ActorRef::send`](struct.ActorRef.html#method.send)
    pub fn send<M: Message>(&self, recipient: ActorId, message: M) {
        self.send_boxed(recipient, Box::new(message));
    }

    pub(crate) fn send_boxed(&self, recipient: ActorId, message: Box<dyn Any>) {
        self.0.send(recipient, message);
    }

    /// The actor whose handler is executing right now
    pub fn current_actor(&self) -> RuntimeResult<ActorId> {
        self.0.current_actor()
    }

    /// A reference to the actor whose handler is executing right now
    pub fn current_ref<M: Message>(&self) -> RuntimeResult<ActorRef<M>> {
        Ok(ActorRef::new(self.current_actor()?, self.clone()))
    }

    /// Read a slot of the current actor's custom data.
    /// Returns `None` if the slot is empty or holds a value of another type.
    pub fn custom_data<T: Any>(&self, key: &'static str) -> RuntimeResult<Option<Rc<T>>> {
        Ok(self
            .0
            .custom_data(key)?
            .and_then(|value| value.downcast::<T>().ok()))
    }

    /// Write a slot of the current actor's custom data
    pub fn set_custom_data<T: Any>(&self, key: &'static str, value: T) -> RuntimeResult<()> {
        self.0.replace_custom_data(key, Some(Rc::new(value)))?;
        Ok(())
    }

    /// Clear a slot of the current actor's custom data
    pub fn remove_custom_data(&self, key: &'static str) -> RuntimeResult<Option<Rc<dyn Any>>> {
        self.0.replace_custom_data(key, None)
    }

    pub(crate) fn replace_custom_data(
        &self,
        key: &'static str,
        value: Option<Rc<dyn Any>>,
    ) -> RuntimeResult<Option<Rc<dyn Any>>> {
        self.0.replace_custom_data(key, value)
    }

    /// Whether this world belongs to a [`TestingRuntime`](struct.TestingRuntime.html)
    pub fn is_testing(&self) -> bool {
        self.0.is_testing()
    }

    /// The name an actor was created with
    pub fn actor_name(&self, id: ActorId) -> Option<String> {
        self.0.actor_name(id)
    }

    /// Report a broken interleaving.
    ///
    /// In the testing runtime this halts the current execution and records
    /// the reason. In the production runtime there is nobody to report to,
    /// so this panics and the current activation is aborted.
    pub fn fail<R: ::std::fmt::Display>(&self, reason: R) {
        self.0.fail(reason.to_string());
    }

    pub(crate) fn wakeups(&self) -> Arc<WakeupHub> {
        self.0.wakeups()
    }

    pub(crate) fn next_call_id(&self) -> u64 {
        self.0.next_call_id()
    }

    pub(crate) fn same_runtime(&self, other: &World) -> bool {
        Rc::as_ptr(&self.0) as *const () == Rc::as_ptr(&other.0) as *const ()
    }
}

struct SystemState {
    actors: Vec<Class>,
    active: Vec<ActorId>,
    is_active: Vec<bool>,
    processed: Vec<usize>,
    current: Option<ActorId>,
    rng: ChaCha8Rng,
    panic_happened: bool,
    shut_down: bool,
}

struct SystemCore {
    state: RefCell<SystemState>,
    wakeups: Arc<WakeupHub>,
    next_call_id: Cell<u64>,
    tuning: Tuning,
}

/// The production runtime.
///
/// An `ActorSystem` owns all actors with their mailboxes and delivers one
/// message at a time: on each tick it picks one actor with a non-empty
/// mailbox uniformly at random, pops its oldest message and runs its
/// handler to completion (or to a genuine external suspension point).
///
/// It is driven from the outside with [`process_one`](#method.process_one),
/// [`run_until_idle`](#method.run_until_idle), [`run`](#method.run) or
/// [`block_on`](#method.block_on).
pub struct ActorSystem {
    core: Rc<SystemCore>,
}

impl ActorSystem {
    /// Create a new ActorSystem (usually only one per application is needed).
    pub fn new(tuning: Tuning) -> ActorSystem {
        let rng = match tuning.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        ActorSystem {
            core: Rc::new(SystemCore {
                state: RefCell::new(SystemState {
                    actors: Vec::new(),
                    active: Vec::new(),
                    is_active: Vec::new(),
                    processed: Vec::new(),
                    current: None,
                    rng,
                    panic_happened: false,
                    shut_down: false,
                }),
                wakeups: WakeupHub::new(),
                next_call_id: Cell::new(0),
                tuning,
            }),
        }
    }

    /// Get a world handle, typically to create the first actors and send
    /// messages into the system from outside
    pub fn world(&self) -> World {
        World::new(Rc::clone(&self.core) as Rc<dyn Kernel>)
    }

    /// Deliver exactly one message, if any actor has one waiting.
    /// Returns whether a message was delivered.
    pub fn process_one(&self) -> bool {
        self.pull_wakeups();

        let (slot, recipient, message, handler) = {
            let mut guard = self.core.state.borrow_mut();
            let state = &mut *guard;
            if state.active.is_empty() {
                return false;
            }
            let slot = state.rng.gen_range(0..state.active.len());
            let recipient = state.active[slot];
            let class = &mut state.actors[recipient.as_usize()];
            let (message, handler) = match (class.inbox.take(), class.handler.clone()) {
                (Some(message), Some(handler)) => (message, handler),
                _ => {
                    // terminated or drained in the meantime
                    state.active.swap_remove(slot);
                    state.is_active[recipient.as_usize()] = false;
                    return true;
                }
            };
            state.current = Some(recipient);
            (slot, recipient, message, handler)
        };

        trace!(actor = %recipient, "Delivering message");
        let world = self.world();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            handler.borrow_mut().handle(message, &world)
        }));

        let garbage = {
            let mut state = self.core.state.borrow_mut();
            state.current = None;
            state.processed[recipient.as_usize()] += 1;
            let garbage = match outcome {
                Ok(Fate::Live) => None,
                Ok(Fate::Die) => {
                    debug!(actor = %recipient, "Actor terminated");
                    Some(state.actors[recipient.as_usize()].terminate())
                }
                Err(panic) => {
                    error!(
                        actor = %recipient,
                        name = %state.actors[recipient.as_usize()].name,
                        panic = %panic_message(&*panic),
                        "Actor panicked while handling a message, terminating it"
                    );
                    state.panic_happened = true;
                    Some(state.actors[recipient.as_usize()].terminate())
                }
            };
            if state.actors[recipient.as_usize()].inbox.is_empty() {
                debug_assert_eq!(state.active[slot], recipient);
                state.active.swap_remove(slot);
                state.is_active[recipient.as_usize()] = false;
            }
            garbage
        };
        drop(garbage);
        true
    }

    /// Deliver messages until no actor has one waiting.
    /// Returns the number of delivered messages.
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0;
        while self.process_one() {
            delivered += 1;
        }
        delivered
    }

    /// Like [`run_until_idle`](#method.run_until_idle), but as long as handler
    /// tasks are suspended on external events, wait for them to wake up.
    pub fn run(&self) -> RuntimeResult<usize> {
        let mut delivered = 0;
        loop {
            delivered += self.run_until_idle();
            let wakeups = &self.core.wakeups;
            if wakeups.parked() == 0 {
                return Ok(delivered);
            }
            if !wakeups.wait_for(self.core.tuning.external_wait) {
                return Err(RuntimeError::Stalled {
                    parked: wakeups.parked(),
                });
            }
        }
    }

    /// Drive the system until `future` resolves.
    ///
    /// This is how code outside of any actor awaits replies of typed actors:
    ///
    /// ```ignore
    /// let greeting = system.block_on(greeter.hello("you".to_owned()))??;
    /// ```
    pub fn block_on<F: Future>(&self, future: F) -> RuntimeResult<F::Output> {
        futures::pin_mut!(future);
        let caller = TaskWaker::for_caller(Arc::clone(&self.core.wakeups));
        let caller_waker = waker(Arc::clone(&caller));
        let mut cx = Context::from_waker(&caller_waker);

        loop {
            if caller.take_woken() {
                if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                    return Ok(output);
                }
            }
            if self.process_one() || caller.is_woken() {
                continue;
            }
            if !self.core.wakeups.wait_for(self.core.tuning.external_wait) {
                return Err(RuntimeError::Stalled {
                    parked: self.core.wakeups.parked(),
                });
            }
        }
    }

    /// Whether any actor panicked while handling a message
    pub fn panic_happened(&self) -> bool {
        self.core.state.borrow().panic_happened
    }

    /// The name an actor was created with
    pub fn actor_name(&self, id: ActorId) -> Option<String> {
        self.core.actor_name(id)
    }

    /// Current mailbox lengths, keyed by actor name and id
    pub fn queue_lengths(&self) -> HashMap<String, usize> {
        let state = self.core.state.borrow();
        state
            .actors
            .iter()
            .enumerate()
            .map(|(i, class)| (label(class, i), class.inbox.len()))
            .collect()
    }

    /// Number of handled messages per actor since the system was created
    pub fn processed_messages(&self) -> HashMap<String, usize> {
        let state = self.core.state.borrow();
        state
            .actors
            .iter()
            .enumerate()
            .map(|(i, class)| (label(class, i), state.processed[i]))
            .collect()
    }

    fn pull_wakeups(&self) {
        for actor in self.core.wakeups.drain() {
            trace!(actor = %actor, "External wake-up");
            self.core.send(actor, Box::new(Wakeup));
        }
    }
}

impl Drop for ActorSystem {
    fn drop(&mut self) {
        // handlers hold worlds, which hold the core: break the cycle
        let actors = {
            let mut state = self.core.state.borrow_mut();
            state.shut_down = true;
            state.active.clear();
            ::std::mem::take(&mut state.actors)
        };
        drop(actors);
    }
}

fn label(class: &Class, index: usize) -> String {
    format!("{}{}", class.name, ActorId::new(index))
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

impl Kernel for SystemCore {
    fn create(&self, name: &str, handler: Box<dyn Handler>) -> ActorId {
        let mut state = self.state.borrow_mut();
        let id = ActorId::new(state.actors.len());
        state
            .actors
            .push(Class::new(name, handler, self.tuning.inbox_capacity));
        state.is_active.push(false);
        state.processed.push(0);
        debug!(actor = %id, name, "Created actor");
        id
    }

    fn send(&self, recipient: ActorId, message: Box<dyn Any>) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if state.shut_down {
            return;
        }
        let index = recipient.as_usize();
        let class = match state.actors.get_mut(index) {
            Some(class) => class,
            None => panic!("{}", RuntimeError::UnknownActor(recipient)),
        };
        if class.terminated {
            debug!(actor = %recipient, "Discarding message to terminated actor");
            drop(guard);
            drop(message);
            return;
        }
        class.inbox.put(message);
        if !state.is_active[index] {
            state.is_active[index] = true;
            state.active.push(recipient);
        }
    }

    fn current_actor(&self) -> RuntimeResult<ActorId> {
        self.state.borrow().current.ok_or(RuntimeError::NoActiveActor)
    }

    fn custom_data(&self, key: &'static str) -> RuntimeResult<Option<Rc<dyn Any>>> {
        let state = self.state.borrow();
        let current = state.current.ok_or(RuntimeError::NoActiveActor)?;
        Ok(state.actors[current.as_usize()].custom_data(key))
    }

    fn replace_custom_data(
        &self,
        key: &'static str,
        value: Option<Rc<dyn Any>>,
    ) -> RuntimeResult<Option<Rc<dyn Any>>> {
        let mut state = self.state.borrow_mut();
        let current = state.current.ok_or(RuntimeError::NoActiveActor)?;
        Ok(state.actors[current.as_usize()].set_custom_data(key, value))
    }

    fn is_testing(&self) -> bool {
        false
    }

    fn wakeups(&self) -> Arc<WakeupHub> {
        Arc::clone(&self.wakeups)
    }

    fn actor_name(&self, id: ActorId) -> Option<String> {
        self.state
            .borrow()
            .actors
            .get(id.as_usize())
            .map(|class| class.name.clone())
    }

    fn next_call_id(&self) -> u64 {
        let id = self.next_call_id.get();
        self.next_call_id.set(id + 1);
        id
    }

    fn fail(&self, reason: String) {
        panic!("{}", RuntimeError::Failed(reason));
    }
}
