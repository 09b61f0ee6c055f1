//! Selective receive: a handler that can wait, in the middle of handling a
//! message, for the next message matching a predicate.
//!
//! A [`Selective`](struct.Selective.html) wraps a
//! [`SelectiveActor`](trait.SelectiveActor.html) and keeps every message that
//! was not consumed yet in a buffer. Whenever a message arrives, the buffer is
//! scanned from the front: a message matching a pending receive resolves it,
//! and the suspended handler continues *right away*, inside the current
//! activation. While a handler is suspended, messages that match nothing are
//! skipped and revisited later. In interleaved mode handlers never block the
//! mailbox, so several of them can be suspended at the same time.

use crate::actor_system::World;
use crate::id::{ActorId, ActorRef};
use crate::messaging::{Fate, Handler, Message, Wakeup};
use crate::wakeup::{ParkGuard, TaskWaker};

use futures::future::LocalBoxFuture;
use futures::task::waker_ref;
use std::any::Any;
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use tracing::{error, trace};

mod buffer;
pub use self::buffer::MessageBuffer;

/// Custom-data slot under which a selective actor publishes its receiver
/// while its handlers run. The typed layer reads it to await replies.
pub const RECEIVER_KEY: &str = "parley.receiver";

/// A handler that may wait for further messages while handling one.
///
/// The returned future is polled by the actor's [`Selective`](struct.Selective.html)
/// wrapper. State shared between concurrently suspended handlers lives behind
/// interior mutability in `Self`; never hold a `RefCell` borrow across an `.await`.
pub trait SelectiveActor<M: Message>: 'static {
    /// Handle one message; `receiver` can be used to wait for more
    fn handle(self: Rc<Self>, message: M, receiver: Receiver<M>) -> LocalBoxFuture<'static, ()>;
}

/// A selective actor built from a closure, see [`selective_fn`](fn.selective_fn.html)
pub struct FnSelective<M, F> {
    function: F,
    marker: PhantomData<fn(M)>,
}

/// Build a selective actor from a closure returning a future.
///
/// ```ignore
/// let actor = world.create_selective("Waiter", selective_fn(|msg: Msg, receiver: Receiver<Msg>| async move {
///     if let Msg::Start = msg {
///         let reply = receiver.receive(|m| matches!(m, Msg::Reply(_))).await;
///     }
/// }));
/// ```
pub fn selective_fn<M, F, Fut>(function: F) -> FnSelective<M, F>
where
    M: Message,
    F: Fn(M, Receiver<M>) -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
{
    FnSelective {
        function,
        marker: PhantomData,
    }
}

impl<M, F, Fut> SelectiveActor<M> for FnSelective<M, F>
where
    M: Message,
    F: Fn(M, Receiver<M>) -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
{
    fn handle(self: Rc<Self>, message: M, receiver: Receiver<M>) -> LocalBoxFuture<'static, ()> {
        Box::pin((self.function)(message, receiver))
    }
}

struct ReceiveSlot {
    value: Option<Box<dyn Any>>,
    waker: Option<Waker>,
}

struct PendingReceive {
    predicate: Box<dyn Fn(&dyn Any) -> bool>,
    slot: Rc<RefCell<ReceiveSlot>>,
    // set once the activation that registered it returned
    ignore: bool,
}

impl PendingReceive {
    fn resolve(self, message: Box<dyn Any>) {
        let waker = {
            let mut slot = self.slot.borrow_mut();
            slot.value = Some(message);
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

#[derive(Default)]
struct ReceiveQueue {
    pending: Vec<PendingReceive>,
}

impl ReceiveQueue {
    fn all_ignored(&self) -> bool {
        self.pending.iter().all(|pending| pending.ignore)
    }

    fn ignore_all(&mut self) {
        for pending in &mut self.pending {
            pending.ignore = true;
        }
    }
}

/// Handed to a [`SelectiveActor`](trait.SelectiveActor.html) to wait for messages.
pub struct Receiver<M> {
    queue: Rc<RefCell<ReceiveQueue>>,
    marker: PhantomData<fn() -> M>,
}

impl<M: Message> Receiver<M> {
    fn new() -> Self {
        Receiver {
            queue: Rc::new(RefCell::new(ReceiveQueue::default())),
            marker: PhantomData,
        }
    }

    /// Wait for the oldest not yet consumed message satisfying `predicate`
    pub fn receive<F>(&self, predicate: F) -> ReceiveFuture<M>
    where
        F: Fn(&M) -> bool + 'static,
    {
        self.receive_as(predicate)
    }

    /// Like [`receive`](#method.receive), for messages of another type that
    /// land in the same mailbox (replies of typed actors, for example)
    pub fn receive_as<T, F>(&self, predicate: F) -> ReceiveFuture<T>
    where
        T: Message,
        F: Fn(&T) -> bool + 'static,
    {
        let slot = Rc::new(RefCell::new(ReceiveSlot {
            value: None,
            waker: None,
        }));
        self.queue.borrow_mut().pending.push(PendingReceive {
            predicate: Box::new(move |message: &dyn Any| {
                message.downcast_ref::<T>().map_or(false, &predicate)
            }),
            slot: Rc::clone(&slot),
            ignore: false,
        });
        ReceiveFuture {
            slot,
            marker: PhantomData,
        }
    }

    /// Number of registered receives that did not match yet
    pub fn pending(&self) -> usize {
        self.queue.borrow().pending.len()
    }

    fn erase(&self) -> Receiver<()> {
        Receiver {
            queue: Rc::clone(&self.queue),
            marker: PhantomData,
        }
    }

    fn take_match(&self, message: &dyn Any) -> Option<PendingReceive> {
        let index = self
            .queue
            .borrow()
            .pending
            .iter()
            .position(|pending| (pending.predicate)(message))?;
        Some(self.queue.borrow_mut().pending.remove(index))
    }
}

impl<M> Clone for Receiver<M> {
    fn clone(&self) -> Self {
        Receiver {
            queue: Rc::clone(&self.queue),
            marker: PhantomData,
        }
    }
}

/// The receiver of the selective actor currently activated, if any
pub(crate) fn current_receiver(world: &World) -> Option<Rc<Receiver<()>>> {
    world.custom_data::<Receiver<()>>(RECEIVER_KEY).ok().flatten()
}

/// Resolves to the message a [`Receiver`](struct.Receiver.html) matched.
///
/// Dropping it does not unregister the receive: a matching message is still
/// consumed when it arrives.
pub struct ReceiveFuture<T> {
    slot: Rc<RefCell<ReceiveSlot>>,
    marker: PhantomData<fn() -> T>,
}

impl<T: Message> Future for ReceiveFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut slot = self.slot.borrow_mut();
        match slot.value.take() {
            Some(value) => match value.downcast::<T>() {
                Ok(value) => Poll::Ready(*value),
                Err(_) => unreachable!("receive predicate accepted a message of another type"),
            },
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

struct Task {
    future: LocalBoxFuture<'static, ()>,
    waker: Arc<TaskWaker>,
    _parked: ParkGuard,
}

/// Adapts a [`SelectiveActor`](trait.SelectiveActor.html) to the untyped mailbox,
/// implementing selective receive on top of one-message-at-a-time delivery.
pub struct Selective<M: Message, A> {
    actor: Rc<A>,
    receiver: Receiver<M>,
    buffer: MessageBuffer,
    tasks: Vec<Task>,
    interleaved: bool,
    awaiting: bool,
    driving: Arc<AtomicBool>,
    me: Option<ActorId>,
}

impl<M: Message, A: SelectiveActor<M>> Selective<M, A> {
    /// While a handler is suspended, messages that match no pending receive
    /// are deferred until it finished.
    pub fn new(actor: A) -> Self {
        Selective::with_mode(Rc::new(actor), false)
    }

    /// Handlers never block the mailbox: a new message is handled even while
    /// earlier handlers are suspended, and their receives stay live.
    pub fn interleaved(actor: A) -> Self {
        Selective::with_mode(Rc::new(actor), true)
    }

    pub(crate) fn with_mode(actor: Rc<A>, interleaved: bool) -> Self {
        Selective {
            actor,
            receiver: Receiver::new(),
            buffer: MessageBuffer::new(),
            tasks: Vec::new(),
            interleaved,
            awaiting: false,
            driving: Arc::new(AtomicBool::new(false)),
            me: None,
        }
    }

    fn scan(&mut self, world: &World, me: ActorId) {
        while let Some(message) = self.buffer.current() {
            assert!(
                self.awaiting || self.interleaved || self.receiver.queue.borrow().all_ignored(),
                "{}: live receive while no handler is suspended",
                me
            );

            if let Some(pending) = self.receiver.take_match(message) {
                let message = self.buffer.remove();
                if pending.ignore && !self.interleaved {
                    trace!(actor = %me, "Message consumed by an abandoned receive");
                    continue;
                }
                self.driving.store(true, Ordering::SeqCst);
                pending.resolve(message);
                self.drive(world, me);
                self.buffer.reset();
                continue;
            }

            if self.awaiting {
                self.buffer.advance();
                continue;
            }

            let message = match self.buffer.remove().downcast::<M>() {
                Ok(message) => *message,
                Err(_) => {
                    error!(
                        actor = %me,
                        expected = ::std::any::type_name::<M>(),
                        "Dropping message of unexpected type"
                    );
                    continue;
                }
            };
            let future = Rc::clone(&self.actor).handle(message, self.receiver.clone());
            self.spawn(world, me, future);
        }
    }

    fn spawn(&mut self, world: &World, me: ActorId, future: LocalBoxFuture<'static, ()>) {
        let wakeups = world.wakeups();
        self.tasks.push(Task {
            future,
            waker: TaskWaker::for_task(me, Arc::clone(&self.driving), Arc::clone(&wakeups)),
            _parked: wakeups.park(),
        });
        self.drive(world, me);

        if !self.interleaved && !self.tasks.is_empty() {
            assert!(!self.awaiting, "{}: second handler suspended", me);
            self.awaiting = true;
            trace!(actor = %me, "Handler suspended, deferring unmatched messages");
        }
    }

    /// Poll every woken task until none is woken anymore. Continuations thus
    /// run inside the current activation, before control returns to the runtime.
    fn drive(&mut self, world: &World, me: ActorId) {
        self.driving.store(true, Ordering::SeqCst);

        while let Some(index) = self.tasks.iter().position(|task| task.waker.take_woken()) {
            let ready = {
                let task = &mut self.tasks[index];
                let waker = waker_ref(&task.waker);
                let mut cx = Context::from_waker(&waker);
                task.future.as_mut().poll(&mut cx).is_ready()
            };
            if ready {
                self.tasks.remove(index);
                if !self.interleaved {
                    self.awaiting = false;
                    self.receiver.queue.borrow_mut().ignore_all();
                }
            }
        }

        self.driving.store(false, Ordering::SeqCst);

        // woken from elsewhere between the last poll and clearing `driving`
        if self.tasks.iter().any(|task| task.waker.is_woken()) {
            world.wakeups().notify(me);
        }
    }
}

/// Keeps the receiver under `RECEIVER_KEY` for one activation, so calls issued
/// synchronously by `handle` as well as from continuations find it
struct PublishedReceiver<'a> {
    world: &'a World,
}

impl<'a> PublishedReceiver<'a> {
    fn new<M: Message>(world: &'a World, me: ActorId, receiver: &Receiver<M>) -> Self {
        let published = Rc::new(receiver.erase()) as Rc<dyn Any>;
        let previous = world
            .replace_custom_data(RECEIVER_KEY, Some(published))
            .unwrap_or_else(|err| panic!("selective receive outside of an activation: {}", err));
        assert!(previous.is_none(), "{}: handlers driven re-entrantly", me);
        PublishedReceiver { world }
    }
}

impl<'a> Drop for PublishedReceiver<'a> {
    fn drop(&mut self) {
        // the published receiver is ours, nothing to hand back
        let _ = self.world.replace_custom_data(RECEIVER_KEY, None);
    }
}

impl<M: Message, A: SelectiveActor<M>> Handler for Selective<M, A> {
    fn handle(&mut self, message: Box<dyn Any>, world: &World) -> Fate {
        let me = match self.me {
            Some(me) => me,
            None => {
                let me = world
                    .current_actor()
                    .unwrap_or_else(|err| panic!("selective actor handled a message outside of an activation: {}", err));
                self.me = Some(me);
                me
            }
        };

        let _published = PublishedReceiver::new(world, me, &self.receiver);
        if message.is::<Wakeup>() {
            assert!(!world.is_testing(), "{}: external wake-up in testing mode", me);
            self.drive(world, me);
        } else {
            self.buffer.push_back(message);
        }
        self.buffer.reset();
        self.scan(world, me);
        Fate::Live
    }
}

impl World {
    /// Create an actor with selective receive
    pub fn create_selective<M: Message, A: SelectiveActor<M>>(
        &self,
        name: &str,
        actor: A,
    ) -> ActorRef<M> {
        let id = self.create_handler(name, Box::new(Selective::<M, A>::new(actor)));
        ActorRef::new(id, self.clone())
    }

    /// Create an actor with selective receive in interleaved mode,
    /// see [`Selective::interleaved`](struct.Selective.html#method.interleaved)
    pub fn create_interleaved<M: Message, A: SelectiveActor<M>>(
        &self,
        name: &str,
        actor: A,
    ) -> ActorRef<M> {
        let id = self.create_handler(name, Box::new(Selective::<M, A>::interleaved(actor)));
        ActorRef::new(id, self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::from_fn;
    use crate::actor_system::ActorSystem;
    use crate::tuning::Tuning;
    use futures::channel::oneshot;
    use futures::task::noop_waker;
    use std::cell::Cell;

    #[derive(Debug)]
    enum Msg {
        Start,
        Tagged(u32),
        Other(u32),
    }

    fn system() -> ActorSystem {
        ActorSystem::new(Tuning {
            seed: Some(1),
            ..Tuning::default()
        })
    }

    type Log = Rc<RefCell<Vec<String>>>;

    #[test]
    fn receive_takes_oldest_match_and_defers_the_rest() {
        let system = system();
        let world = system.world();
        let log: Log = Rc::default();
        let sink = Rc::clone(&log);

        let actor = world.create_selective(
            "Waiter",
            selective_fn(move |msg: Msg, receiver: Receiver<Msg>| {
                let sink = Rc::clone(&sink);
                async move {
                    match msg {
                        Msg::Start => {
                            let first = receiver.receive(|m| matches!(m, Msg::Tagged(_))).await;
                            sink.borrow_mut().push(format!("got {:?}", first));
                        }
                        other => sink.borrow_mut().push(format!("plain {:?}", other)),
                    }
                }
            }),
        );

        actor.send(Msg::Start);
        actor.send(Msg::Other(1));
        actor.send(Msg::Tagged(1));
        actor.send(Msg::Tagged(2));
        actor.send(Msg::Other(2));
        system.run_until_idle();

        assert_eq!(
            *log.borrow(),
            vec![
                "got Tagged(1)",
                "plain Other(1)",
                "plain Tagged(2)",
                "plain Other(2)",
            ]
        );
    }

    #[test]
    fn abandoned_receives_swallow_their_match_without_resolving() {
        let system = system();
        let world = system.world();
        let log: Log = Rc::default();
        let sink = Rc::clone(&log);
        let parked: Rc<RefCell<Option<ReceiveFuture<Msg>>>> = Rc::default();
        let stash = Rc::clone(&parked);

        let actor = world.create_selective(
            "Forgetful",
            selective_fn(move |msg: Msg, receiver: Receiver<Msg>| {
                let sink = Rc::clone(&sink);
                let stash = Rc::clone(&stash);
                async move {
                    match msg {
                        Msg::Start => {
                            // registered but never awaited by this activation
                            *stash.borrow_mut() =
                                Some(receiver.receive(|m| matches!(m, Msg::Tagged(_))));
                        }
                        other => sink.borrow_mut().push(format!("plain {:?}", other)),
                    }
                }
            }),
        );

        actor.send(Msg::Start);
        actor.send(Msg::Tagged(7));
        actor.send(Msg::Other(8));
        system.run_until_idle();

        assert_eq!(*log.borrow(), vec!["plain Other(8)"]);
        let mut future = parked.borrow_mut().take().unwrap();
        let noop = noop_waker();
        let mut cx = Context::from_waker(&noop);
        assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
    }

    #[test]
    fn interleaved_handlers_overlap() {
        let system = system();
        let world = system.world();
        let log: Log = Rc::default();
        let sink = Rc::clone(&log);

        let actor = world.create_interleaved(
            "Juggler",
            selective_fn(move |msg: Msg, receiver: Receiver<Msg>| {
                let sink = Rc::clone(&sink);
                async move {
                    if let Msg::Other(n) = msg {
                        sink.borrow_mut().push(format!("waiting {}", n));
                        let reply = receiver
                            .receive(move |m| matches!(m, Msg::Tagged(t) if *t == n))
                            .await;
                        sink.borrow_mut().push(format!("{} -> {:?}", n, reply));
                    }
                }
            }),
        );

        actor.send(Msg::Other(1));
        actor.send(Msg::Other(2));
        actor.send(Msg::Tagged(2));
        actor.send(Msg::Tagged(1));
        system.run_until_idle();

        assert_eq!(
            *log.borrow(),
            vec![
                "waiting 1",
                "waiting 2",
                "2 -> Tagged(2)",
                "1 -> Tagged(1)",
            ]
        );
    }

    #[test]
    fn external_completion_wakes_the_actor_up() {
        let system = system();
        let world = system.world();
        let (sender, completion) = oneshot::channel::<u32>();
        let completion = Rc::new(RefCell::new(Some(completion)));
        let log: Log = Rc::default();
        let sink = Rc::clone(&log);

        let actor = world.create_selective(
            "Io",
            selective_fn(move |msg: Msg, _: Receiver<Msg>| {
                let sink = Rc::clone(&sink);
                let completion = completion.borrow_mut().take();
                async move {
                    match (msg, completion) {
                        (Msg::Start, Some(completion)) => {
                            let n = completion.await.unwrap_or_default();
                            sink.borrow_mut().push(format!("io {}", n));
                        }
                        (other, _) => sink.borrow_mut().push(format!("plain {:?}", other)),
                    }
                }
            }),
        );

        actor.send(Msg::Start);
        actor.send(Msg::Other(1));
        system.run_until_idle();
        assert!(log.borrow().is_empty());

        sender.send(42).unwrap();
        system.run().unwrap();
        assert_eq!(*log.borrow(), vec!["io 42", "plain Other(1)"]);
    }

    #[test]
    fn ping_is_observed_before_later_messages() {
        enum PingMsg {
            Start,
            Ping(ActorRef<PingMsg>),
            Other,
        }

        let system = system();
        let world = system.world();
        let order: Log = Rc::default();
        let sink = Rc::clone(&order);

        let responder = world.create(
            "Responder",
            from_fn(|msg: PingMsg, _: &World| {
                if let PingMsg::Ping(reply_to) = msg {
                    reply_to.send(PingMsg::Ping(reply_to.clone()));
                }
                Fate::Live
            }),
        );
        let pinger = world.create_selective(
            "Pinger",
            selective_fn(move |msg: PingMsg, receiver: Receiver<PingMsg>| {
                let sink = Rc::clone(&sink);
                let responder = responder.clone();
                async move {
                    match msg {
                        PingMsg::Start => {
                            let me = responder.world().current_ref::<PingMsg>().unwrap();
                            responder.send(PingMsg::Ping(me));
                            receiver.receive(|m| matches!(m, PingMsg::Ping(_))).await;
                            sink.borrow_mut().push("ping".to_owned());
                        }
                        PingMsg::Ping(_) => sink.borrow_mut().push("unexpected ping".to_owned()),
                        PingMsg::Other => sink.borrow_mut().push("other".to_owned()),
                    }
                }
            }),
        );

        pinger.send(PingMsg::Start);
        pinger.send(PingMsg::Other);
        pinger.send(PingMsg::Other);
        system.run_until_idle();

        assert_eq!(*order.borrow(), vec!["ping", "other", "other"]);
    }

    #[test]
    fn receiver_is_published_for_the_whole_activation() {
        let system = system();
        let world = system.world();
        let seen: Rc<RefCell<Vec<bool>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let inner_world = world.clone();

        let actor = world.create_selective(
            "Publisher",
            selective_fn(move |_: Msg, _: Receiver<Msg>| {
                sink.borrow_mut().push(current_receiver(&inner_world).is_some());
                let sink = Rc::clone(&sink);
                let world = inner_world.clone();
                async move { sink.borrow_mut().push(current_receiver(&world).is_some()) }
            }),
        );
        actor.send(Msg::Start);
        system.run_until_idle();
        assert_eq!(*seen.borrow(), vec![true, true]);

        let outside = world.create("Outside", from_fn(|_: u32, _: &World| Fate::Live));
        outside.send(1);
        system.run_until_idle();
        assert!(current_receiver(&world).is_none());
    }

    #[test]
    fn interleaved_receives_outlive_their_activation() {
        let system = system();
        let world = system.world();
        let log: Log = Rc::default();
        let sink = Rc::clone(&log);
        let parked: Rc<RefCell<Option<ReceiveFuture<Msg>>>> = Rc::default();
        let stash = Rc::clone(&parked);

        let actor = world.create_interleaved(
            "Relay",
            selective_fn(move |msg: Msg, receiver: Receiver<Msg>| {
                let sink = Rc::clone(&sink);
                let stash = Rc::clone(&stash);
                async move {
                    match msg {
                        // registers the receive and returns without awaiting it
                        Msg::Start => {
                            *stash.borrow_mut() =
                                Some(receiver.receive(|m| matches!(m, Msg::Tagged(_))));
                        }
                        Msg::Other(_) => {
                            let earlier = stash.borrow_mut().take();
                            if let Some(earlier) = earlier {
                                let got = earlier.await;
                                sink.borrow_mut().push(format!("{:?}", got));
                            }
                        }
                        Msg::Tagged(n) => sink.borrow_mut().push(format!("plain {}", n)),
                    }
                }
            }),
        );

        actor.send(Msg::Start);
        actor.send(Msg::Other(0));
        actor.send(Msg::Tagged(3));
        system.run_until_idle();

        assert_eq!(*log.borrow(), vec!["Tagged(3)"]);
    }
}
