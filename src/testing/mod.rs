//! The testing runtime: a drop-in replacement for the
//! [`ActorSystem`](../struct.ActorSystem.html) that makes interleavings
//! explicit, reproducible and explorable.
//!
//! Every operation an actor performs (creating an actor, sending a message,
//! starting, terminating, taking the next message) is buffered as a
//! [`ScheduledOp`] of the issuing actor instead of taking effect right away.
//! A [`SchedulingStrategy`](../strategy/trait.SchedulingStrategy.html)
//! repeatedly picks one enabled actor, whose next operation is executed.
//! An execution ends when the strategy finds no enabled actor, when someone
//! calls [`fail`](struct.TestingRuntime.html#method.fail), or when the step
//! bound of the [`Tuning`](../struct.Tuning.html) is reached.

use crate::actor_system::{panic_message, Kernel, World};
use crate::class::{Class, SharedHandler};
use crate::error::{RuntimeError, RuntimeResult};
use crate::id::ActorId;
use crate::messaging::{Fate, Handler, Start};
use crate::strategy::{SchedulingStrategy, ThreadView};
use crate::tuning::Tuning;
use crate::wakeup::WakeupHub;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, trace};

mod explore;
mod op;

pub use self::explore::{explore, Exploration};
pub use self::op::{OpKind, Step};
use self::op::{OpArena, OpId};

/// How an execution ended
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ExecutionOutcome {
    /// No thread was enabled anymore. With `parked_tasks > 0` some handlers
    /// were still waiting for messages that never came: a deadlock.
    NoEnabledThread {
        /// Handler tasks suspended when the execution stopped
        parked_tasks: usize,
    },
    /// `fail` was called, or an activation panicked
    Failed(String),
    /// The execution ran into `Tuning::max_steps`
    StepBoundReached,
}

impl ExecutionOutcome {
    /// Whether the execution stopped with handlers waiting for each other
    pub fn is_deadlock(&self) -> bool {
        matches!(self, ExecutionOutcome::NoEnabledThread { parked_tasks } if *parked_tasks > 0)
    }

    /// Whether the execution was failed by a check, a panic or a stray wake-up
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionOutcome::Failed(_))
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum NextOp {
    /// The `Create` op of this actor was not executed yet
    Unreleased,
    Buffered(OpId),
    Receive,
}

struct Thread {
    class: Class,
    buffered: VecDeque<OpId>,
    next_op: NextOp,
    enabled: bool,
}

struct TestingState {
    threads: Vec<Thread>,
    ops: OpArena,
    current: Option<ActorId>,
    failure: Option<String>,
    trace: Vec<Step>,
    wakeups: Arc<WakeupHub>,
}

struct TestingCore {
    state: RefCell<TestingState>,
    next_call_id: Cell<u64>,
    tuning: Tuning,
}

/// Runtime for systematic testing, see the [module docs](index.html)
pub struct TestingRuntime {
    core: Rc<TestingCore>,
}

impl TestingRuntime {
    /// A runtime without actors. Executions are run with
    /// [`do_execution`](#method.do_execution) or [`explore`](#method.explore).
    pub fn new(tuning: Tuning) -> Self {
        TestingRuntime {
            core: Rc::new(TestingCore {
                state: RefCell::new(TestingState {
                    threads: Vec::new(),
                    ops: OpArena::default(),
                    current: None,
                    failure: None,
                    trace: Vec::new(),
                    wakeups: WakeupHub::new(),
                }),
                next_call_id: Cell::new(0),
                tuning,
            }),
        }
    }

    /// Get a world handle that creates and sends through this runtime
    pub fn world(&self) -> World {
        World::new(Rc::clone(&self.core) as Rc<dyn Kernel>)
    }

    /// The tuning this runtime was created with
    pub fn tuning(&self) -> &Tuning {
        &self.core.tuning
    }

    /// Run one execution: discard all actors of the previous one, create a
    /// "Main" actor with `initial` as its handler, deliver it a
    /// [`Start`](struct.Start.html) message and let `strategy` schedule
    /// until the execution ends.
    pub fn do_execution<S>(&self, strategy: &mut S, initial: Box<dyn Handler>) -> ExecutionOutcome
    where
        S: SchedulingStrategy + ?Sized,
    {
        self.reset();
        let main = self.core.spawn("Main", initial);
        {
            let mut guard = self.core.state.borrow_mut();
            let state = &mut *guard;
            let thread = &mut state.threads[main.as_usize()];
            thread.class.inbox.put(Box::new(Start));
            if let Some(start) = thread.buffered.pop_front() {
                thread.next_op = NextOp::Buffered(start);
                thread.enabled = true;
            }
        }
        debug!("Starting execution");

        let max_steps = self.core.tuning.max_steps.unwrap_or(usize::MAX);
        let mut steps = 0;
        let outcome = loop {
            if let Some(reason) = self.failure() {
                break ExecutionOutcome::Failed(reason);
            }
            if steps >= max_steps {
                break ExecutionOutcome::StepBoundReached;
            }
            let woken = self.core.wakeups().drain();
            if !woken.is_empty() {
                self.core.fail(format!(
                    "{:?} woken by an event outside the scheduler",
                    woken
                ));
                continue;
            }

            let views = self.thread_views();
            let chosen = match strategy.choose_next_thread(&views) {
                Some(chosen) => chosen,
                None => {
                    break ExecutionOutcome::NoEnabledThread {
                        parked_tasks: self.core.wakeups().parked(),
                    }
                }
            };
            assert!(
                views.get(chosen).map_or(false, |view| view.enabled),
                "strategy chose thread {} which is not enabled",
                chosen
            );
            self.execute(ActorId::new(chosen));
            steps += 1;
        };

        debug!(steps, outcome = ?outcome, "Execution done");
        outcome
    }

    /// Record a failure and halt the current execution after the running operation
    pub fn fail<R: ::std::fmt::Display>(&self, reason: R) {
        self.core.fail(reason.to_string());
    }

    /// Whether the current or last execution failed
    pub fn has_failed(&self) -> bool {
        self.core.state.borrow().failure.is_some()
    }

    /// The reason of the first failure of the current execution
    pub fn failure(&self) -> Option<String> {
        self.core.state.borrow().failure.clone()
    }

    /// Operations executed so far in the current execution, in order
    pub fn trace(&self) -> Vec<Step> {
        self.core.state.borrow().trace.clone()
    }

    /// Explore `Tuning::max_executions` executions, see [`explore`](fn.explore.html)
    pub fn explore<S, H, F>(&self, strategy: &mut S, harness: H) -> Exploration
    where
        S: SchedulingStrategy + ?Sized,
        H: Fn(World, crate::receive::Receiver<Start>) -> F + 'static,
        F: ::std::future::Future<Output = anyhow::Result<()>> + 'static,
    {
        explore(self, strategy, self.core.tuning.max_executions, harness)
    }

    fn thread_views(&self) -> Vec<ThreadView> {
        let state = self.core.state.borrow();
        state
            .threads
            .iter()
            .enumerate()
            .map(|(i, thread)| ThreadView {
                actor: ActorId::new(i),
                enabled: thread.enabled,
                next_op: match thread.next_op {
                    NextOp::Unreleased => None,
                    NextOp::Buffered(op) => Some(state.ops.kind(op)),
                    NextOp::Receive => Some(OpKind::Receive),
                },
            })
            .collect()
    }

    fn execute(&self, actor: ActorId) {
        let (kind, target, message) = {
            let mut state = self.core.state.borrow_mut();
            let next_op = state.threads[actor.as_usize()].next_op;
            match next_op {
                NextOp::Buffered(id) => {
                    let op = state.ops.get_mut(id);
                    (op.kind, op.target, op.message.take())
                }
                NextOp::Receive => (OpKind::Receive, actor, None),
                NextOp::Unreleased => unreachable!("{} enabled before its creation", actor),
            }
        };
        trace!(actor = %actor, op = ?kind, target = %target, "Executing");
        self.core.state.borrow_mut().trace.push(Step {
            actor,
            op: kind,
            target,
        });

        let mut garbage = None;
        match kind {
            OpKind::Create => {
                let mut state = self.core.state.borrow_mut();
                let created = &mut state.threads[target.as_usize()];
                if let Some(start) = created.buffered.pop_front() {
                    created.next_op = NextOp::Buffered(start);
                    created.enabled = true;
                }
            }
            OpKind::Start => {}
            OpKind::End => {
                let mut state = self.core.state.borrow_mut();
                debug!(actor = %actor, "Actor terminated");
                garbage = Some(state.threads[actor.as_usize()].class.terminate());
            }
            OpKind::Send => {
                let mut state = self.core.state.borrow_mut();
                let recipient = &mut state.threads[target.as_usize()];
                match message {
                    Some(message) if !recipient.class.terminated => {
                        recipient.class.inbox.put(message);
                        if recipient.next_op != NextOp::Unreleased {
                            recipient.enabled = true;
                        }
                    }
                    message => {
                        debug!(actor = %target, "Discarding message to terminated actor");
                        garbage = Some((None, message.into_iter().collect()));
                    }
                }
            }
            OpKind::Receive => self.receive(actor),
        }
        drop(garbage);

        let mut state = self.core.state.borrow_mut();
        let thread = &mut state.threads[actor.as_usize()];
        match thread.buffered.pop_front() {
            Some(next) => thread.next_op = NextOp::Buffered(next),
            None => {
                thread.next_op = NextOp::Receive;
                if thread.class.inbox.is_empty() {
                    thread.enabled = false;
                }
            }
        }
    }

    fn receive(&self, actor: ActorId) {
        let (message, handler) = {
            let mut state = self.core.state.borrow_mut();
            let class = &mut state.threads[actor.as_usize()].class;
            let message = class.inbox.take();
            let handler: Option<SharedHandler> = class.handler.clone();
            match (message, handler) {
                (Some(message), Some(handler)) => {
                    state.current = Some(actor);
                    (message, handler)
                }
                _ => unreachable!("{} chosen to receive without a message", actor),
            }
        };

        let world = self.world();
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.borrow_mut().handle(message, &world)));

        let mut state = self.core.state.borrow_mut();
        state.current = None;
        match outcome {
            Ok(Fate::Live) => {}
            Ok(Fate::Die) => {
                let end = state.ops.push(OpKind::End, actor, None);
                state.threads[actor.as_usize()].buffered.push_back(end);
            }
            Err(panic) => {
                let name = state.threads[actor.as_usize()].class.name.clone();
                drop(state);
                self.core
                    .fail(format!("{}{} panicked: {}", name, actor, panic_message(&*panic)));
            }
        }
    }

    fn reset(&self) {
        let (threads, ops) = {
            let mut state = self.core.state.borrow_mut();
            state.current = None;
            state.failure = None;
            state.trace.clear();
            state.wakeups = WakeupHub::new();
            (
                ::std::mem::take(&mut state.threads),
                state.ops.take_all(),
            )
        };
        // handlers and buffered messages may own worlds and references
        drop(threads);
        drop(ops);
    }
}

impl Drop for TestingRuntime {
    fn drop(&mut self) {
        self.reset();
    }
}

impl TestingCore {
    fn spawn(&self, name: &str, handler: Box<dyn Handler>) -> ActorId {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let id = ActorId::new(state.threads.len());
        let start = state.ops.push(OpKind::Start, id, None);
        state.threads.push(Thread {
            class: Class::new(name, handler, self.tuning.inbox_capacity),
            buffered: VecDeque::from(vec![start]),
            next_op: NextOp::Unreleased,
            enabled: false,
        });
        debug!(actor = %id, name, "Created actor");
        id
    }

    fn issuer(&self) -> ActorId {
        match self.state.borrow().current {
            Some(current) => current,
            None => panic!(
                "testing runtime operations must be issued by an actor: {}",
                RuntimeError::NoActiveActor
            ),
        }
    }
}

impl Kernel for TestingCore {
    fn create(&self, name: &str, handler: Box<dyn Handler>) -> ActorId {
        let issuer = self.issuer();
        let id = self.spawn(name, handler);
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let create = state.ops.push(OpKind::Create, id, None);
        state.threads[issuer.as_usize()].buffered.push_back(create);
        id
    }

    fn send(&self, recipient: ActorId, message: Box<dyn Any>) {
        let issuer = self.issuer();
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if recipient.as_usize() >= state.threads.len() {
            panic!("{}", RuntimeError::UnknownActor(recipient));
        }
        let send = state.ops.push(OpKind::Send, recipient, Some(message));
        state.threads[issuer.as_usize()].buffered.push_back(send);
    }

    fn current_actor(&self) -> RuntimeResult<ActorId> {
        self.state.borrow().current.ok_or(RuntimeError::NoActiveActor)
    }

    fn custom_data(&self, key: &'static str) -> RuntimeResult<Option<Rc<dyn Any>>> {
        let state = self.state.borrow();
        let current = state.current.ok_or(RuntimeError::NoActiveActor)?;
        Ok(state.threads[current.as_usize()].class.custom_data(key))
    }

    fn replace_custom_data(
        &self,
        key: &'static str,
        value: Option<Rc<dyn Any>>,
    ) -> RuntimeResult<Option<Rc<dyn Any>>> {
        let mut state = self.state.borrow_mut();
        let current = state.current.ok_or(RuntimeError::NoActiveActor)?;
        Ok(state.threads[current.as_usize()]
            .class
            .set_custom_data(key, value))
    }

    fn is_testing(&self) -> bool {
        true
    }

    fn wakeups(&self) -> Arc<WakeupHub> {
        Arc::clone(&self.state.borrow().wakeups)
    }

    fn actor_name(&self, id: ActorId) -> Option<String> {
        self.state
            .borrow()
            .threads
            .get(id.as_usize())
            .map(|thread| thread.class.name.clone())
    }

    fn next_call_id(&self) -> u64 {
        let id = self.next_call_id.get();
        self.next_call_id.set(id + 1);
        id
    }

    fn fail(&self, reason: String) {
        let mut state = self.state.borrow_mut();
        error!(reason = %reason, ops = state.ops.len(), "Execution failed");
        if state.failure.is_none() {
            state.failure = Some(reason);
        }
    }
}
