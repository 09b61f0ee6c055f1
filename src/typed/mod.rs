//! Typed actors: method-call interfaces on top of message passing.
//!
//! An interface is declared with [`typed_actor!`](../macro.typed_actor.html),
//! which generates the implementation trait, a request enum and a proxy.
//! Calling a proxy method sends a [`Call`](struct.Call.html) correlation
//! message to the target actor. Methods named `send*` are fire-and-forget,
//! every other method returns a [`Reply`](struct.Reply.html) that resolves
//! once the implementation produced a value or an error.
//!
//! Inside an actor activation the reply is awaited through the caller's
//! selective receive, outside of any activation through a one-shot channel
//! (see [`ActorSystem::block_on`](../struct.ActorSystem.html#method.block_on)).

use crate::actor_system::World;
use crate::error::{CallError, RuntimeError};
use crate::id::{ActorId, ActorRef};
use crate::receive::{current_receiver, ReceiveFuture, Receiver, Selective, SelectiveActor};

use futures::channel::oneshot;
use futures::future::{try_join_all, LocalBoxFuture};
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

#[macro_use]
mod macros;

/// Where the reply to a [`Call`](struct.Call.html) goes.
///
/// Replying consumes the target, so a call is answered at most once.
pub enum ReplyTarget {
    /// The calling actor, which awaits the reply through its selective receive
    Actor(ActorRef<Call>),
    /// A caller outside of any actor activation
    Slot(oneshot::Sender<Call>),
}

impl ReplyTarget {
    fn reply(self, call: Call) {
        match self {
            ReplyTarget::Actor(caller) => caller.send(call),
            ReplyTarget::Slot(slot) => {
                if let Err(call) = slot.send(call) {
                    debug!(call = call.id, method = call.method, "Caller gave up before the reply");
                }
            }
        }
    }
}

/// The correlation message of one typed-actor method invocation.
///
/// A request carries the arguments and, for value-returning methods, where
/// to reply to. The target fills in the outcome and sends the same object
/// back as the reply.
pub struct Call {
    id: u64,
    method: &'static str,
    args: Option<Box<dyn Any>>,
    reply_to: Option<ReplyTarget>,
    outcome: Option<Result<Box<dyn Any>, CallError>>,
}

impl Call {
    /// Identifies the call within its runtime
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the invoked method
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Whether this is a reply carrying an outcome
    pub fn is_reply(&self) -> bool {
        self.outcome.is_some()
    }

    /// Whether the caller expects a reply
    pub fn expects_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    fn into_result<R: 'static>(self) -> Result<R, CallError> {
        match self.outcome {
            Some(Ok(value)) => match value.downcast::<R>() {
                Ok(value) => Ok(*value),
                Err(_) => Err(CallError::WrongInterface(self.method)),
            },
            Some(Err(err)) => Err(err),
            None => Err(CallError::Dropped),
        }
    }
}

impl ::std::fmt::Debug for Call {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("expects_reply", &self.expects_reply())
            .field("is_reply", &self.is_reply())
            .finish()
    }
}

enum Pending {
    Receive(ReceiveFuture<Call>),
    Slot(oneshot::Receiver<Call>),
}

/// The eventual outcome of a value-returning typed-actor call
pub struct Reply<R> {
    pending: Pending,
    marker: PhantomData<fn() -> R>,
}

impl<R: 'static> Future for Reply<R> {
    type Output = Result<R, CallError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let call = match &mut self.get_mut().pending {
            Pending::Receive(reply) => match Pin::new(reply).poll(cx) {
                Poll::Ready(call) => call,
                Poll::Pending => return Poll::Pending,
            },
            Pending::Slot(slot) => match Pin::new(slot).poll(cx) {
                Poll::Ready(Ok(call)) => call,
                Poll::Ready(Err(oneshot::Canceled)) => return Poll::Ready(Err(CallError::Dropped)),
                Poll::Pending => return Poll::Pending,
            },
        };
        Poll::Ready(call.into_result())
    }
}

/// Send a value-returning call. Used by the proxies `typed_actor!` generates.
///
/// # Panics
///
/// When called from an actor without selective receive, and in the testing
/// runtime when called outside of any actor activation.
pub fn call<R: 'static, A: 'static>(target: &ActorRef<Call>, method: &'static str, args: A) -> Reply<R> {
    let world = target.world();
    let id = world.next_call_id();

    let (reply_to, pending) = match world.current_ref::<Call>() {
        Ok(caller) => {
            let receiver = current_receiver(world).unwrap_or_else(|| {
                panic!(
                    "{}: `{}` called from an actor that cannot receive replies",
                    caller.id(),
                    method
                )
            });
            let reply = receiver.receive_as(move |call: &Call| call.id == id && call.is_reply());
            (ReplyTarget::Actor(caller), Pending::Receive(reply))
        }
        Err(_) if world.is_testing() => panic!(
            "`{}` called outside of any actor activation: {}",
            method,
            RuntimeError::NoActiveActor
        ),
        Err(_) => {
            let (slot, reply) = oneshot::channel();
            (ReplyTarget::Slot(slot), Pending::Slot(reply))
        }
    };

    trace!(call = id, method, target = %target.id(), "Call");
    target.send(Call {
        id,
        method,
        args: Some(Box::new(args)),
        reply_to: Some(reply_to),
        outcome: None,
    });
    Reply {
        pending,
        marker: PhantomData,
    }
}

/// Send a fire-and-forget call. Used by the proxies `typed_actor!` generates.
pub fn fire<A: 'static>(target: &ActorRef<Call>, method: &'static str, args: A) {
    let id = target.world().next_call_id();
    trace!(call = id, method, target = %target.id(), "Fire");
    target.send(Call {
        id,
        method,
        args: Some(Box::new(args)),
        reply_to: None,
        outcome: None,
    });
}

/// Await several replies at once.
///
/// Resolves to all values in the order of `replies`, or to the first error.
/// On an error the remaining calls are not cancelled: their targets still
/// run them, and their replies are consumed without being observed.
pub async fn call_all<R, I>(replies: I) -> Result<Vec<R>, CallError>
where
    R: 'static,
    I: IntoIterator<Item = Reply<R>>,
{
    try_join_all(replies).await
}

/// Whether a method name marks a fire-and-forget method
pub const fn is_fire_and_forget(method: &str) -> bool {
    let bytes = method.as_bytes();
    bytes.len() >= 4 && bytes[0] == b's' && bytes[1] == b'e' && bytes[2] == b'n' && bytes[3] == b'd'
}

/// Routes a request enum generated by `typed_actor!` to the methods of an
/// implementation `T`.
pub trait Dispatch<T: ?Sized>: Sized + 'static {
    /// Invoke the requested method
    fn dispatch(self, implementation: Rc<T>) -> LocalBoxFuture<'static, anyhow::Result<Box<dyn Any>>>;
}

/// A proxy generated by `typed_actor!`
pub trait Proxy: Clone + 'static {
    /// The request enum of the interface
    type Request: 'static;

    /// Wrap a reference to an actor implementing the interface
    fn from_target(target: ActorRef<Call>) -> Self;

    /// The actor behind the proxy
    fn target(&self) -> &ActorRef<Call>;

    /// Id of the actor behind the proxy
    fn id(&self) -> ActorId {
        self.target().id()
    }
}

/// Runs the methods of one implementation of a typed interface
struct Typed<Req, T> {
    implementation: Rc<T>,
    marker: PhantomData<fn(Req)>,
}

impl<Req: Dispatch<T>, T: 'static> SelectiveActor<Call> for Typed<Req, T> {
    fn handle(self: Rc<Self>, mut call: Call, _: Receiver<Call>) -> LocalBoxFuture<'static, ()> {
        Box::pin(async move {
            if call.is_reply() {
                warn!(call = call.id, method = call.method, "Dropping reply nobody waits for");
                return;
            }

            let request = call.args.take().map(|args| args.downcast::<Req>());
            let outcome = match request {
                Some(Ok(request)) => Req::dispatch(*request, Rc::clone(&self.implementation))
                    .await
                    .map_err(CallError::Application),
                _ => Err(CallError::WrongInterface(call.method)),
            };

            match call.reply_to.take() {
                Some(reply_to) => {
                    call.outcome = Some(outcome);
                    reply_to.reply(call);
                }
                None => {
                    if let Err(err) = outcome {
                        warn!(call = call.id, method = call.method, error = %err, "Fire-and-forget call failed");
                    }
                }
            }
        })
    }
}

impl World {
    /// Create a typed actor and get a proxy to it.
    ///
    /// Usually called through the `create`/`create_interleaved` functions
    /// `typed_actor!` generates on the proxy.
    pub fn create_typed<P, T>(&self, name: &str, implementation: T, interleaved: bool) -> P
    where
        P: Proxy,
        P::Request: Dispatch<T>,
        T: 'static,
    {
        let actor = Rc::new(Typed::<P::Request, T> {
            implementation: Rc::new(implementation),
            marker: PhantomData,
        });
        let id = self.create_handler(name, Box::new(Selective::<Call, _>::with_mode(actor, interleaved)));
        P::from_target(ActorRef::new(id, self.clone()))
    }
}
