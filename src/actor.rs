use crate::actor_system::World;
use crate::messaging::{Fate, Handler, Message};
use std::any::Any;
use std::marker::PhantomData;
use tracing::error;

/// A plain actor: state that handles one message of type `M` at a time.
///
/// Handling runs to completion; an actor that needs to wait for a reply
/// in the middle of a message should be a
/// [`SelectiveActor`](trait.SelectiveActor.html) instead.
pub trait Actor<M: Message>: 'static {
    /// Handle one message
    fn handle(&mut self, message: M, world: &World) -> Fate;
}

/// An actor built from a closure, see [`from_fn`](fn.from_fn.html)
pub struct FnActor<M, F> {
    function: F,
    marker: PhantomData<fn(M)>,
}

/// Build an actor from a closure.
///
/// ```ignore
/// let echo = world.create("Echo", from_fn(|msg: String, _: &World| {
///     println!("{}", msg);
///     Fate::Live
/// }));
/// ```
pub fn from_fn<M, F>(function: F) -> FnActor<M, F>
where
    M: Message,
    F: FnMut(M, &World) -> Fate + 'static,
{
    FnActor {
        function,
        marker: PhantomData,
    }
}

impl<M, F> Actor<M> for FnActor<M, F>
where
    M: Message,
    F: FnMut(M, &World) -> Fate + 'static,
{
    fn handle(&mut self, message: M, world: &World) -> Fate {
        (self.function)(message, world)
    }
}

/// Adapts a typed actor to the untyped mailbox
pub(crate) struct Plain<M, A> {
    actor: A,
    marker: PhantomData<fn(M)>,
}

impl<M: Message, A: Actor<M>> Plain<M, A> {
    pub fn new(actor: A) -> Self {
        Plain {
            actor,
            marker: PhantomData,
        }
    }
}

impl<M: Message, A: Actor<M>> Handler for Plain<M, A> {
    fn handle(&mut self, message: Box<dyn Any>, world: &World) -> Fate {
        match message.downcast::<M>() {
            Ok(message) => self.actor.handle(*message, world),
            Err(_) => {
                error!(
                    actor = ?world.current_actor().ok(),
                    expected = ::std::any::type_name::<M>(),
                    "Dropping message of unexpected type"
                );
                Fate::Live
            }
        }
    }
}
