use crate::actor_system::World;
use std::any::Any;

/// What happens to an actor after it handled a message
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Fate {
    /// Keep the actor around for further messages
    Live,
    /// Terminate the actor; its mailbox is dropped and later sends are discarded
    Die,
}

/// Any value that can travel through a mailbox.
pub trait Message: 'static {}
impl<T: 'static> Message for T {}

/// An untyped message handler, as stored by the runtimes.
///
/// Typed handlers ([`Actor`](trait.Actor.html),
/// [`Selective`](struct.Selective.html)) are adapted into this shape.
pub trait Handler: 'static {
    /// Handle one message, to completion or to its first genuine suspension point
    fn handle(&mut self, message: Box<dyn Any>, world: &World) -> Fate;
}

/// The first message delivered to the "Main" actor of a harness execution
#[derive(Copy, Clone, Debug, Default)]
pub struct Start;

/// Sent by the runtime to a selective actor whose suspended handler was woken
/// by an event outside the actor system. Carries no data.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct Wakeup;
