//! `parley` is a single-threaded actor runtime with selective receive,
//! typed RPC actors and a harness for systematically testing interleavings.
//!
//! Actors only communicate through asynchronous messages and handle exactly
//! one message at a time. On top of that:
//!
//! * a [`SelectiveActor`](trait.SelectiveActor.html) can wait, in the middle of
//!   handling a message, for the next message matching a predicate,
//! * [`typed_actor!`](macro.typed_actor.html) turns a method-call interface into
//!   request and reply messages,
//! * the [`TestingRuntime`](struct.TestingRuntime.html) replaces the production
//!   [`ActorSystem`](struct.ActorSystem.html) and lets a
//!   [`SchedulingStrategy`](trait.SchedulingStrategy.html) decide the order of
//!   every create, send and receive.
//!
//! Have a look at [`ActorSystem`](struct.ActorSystem.html) and
//! [`World`](struct.World.html) to understand the main abstractions.
//!
//! Current Shortcomings:
//!
//! * Actors never leave the actor table; terminated actors keep their slot
//! * No cancellation of in-flight calls

#![warn(missing_docs)]
#[cfg(feature = "serde-serialization")]
#[macro_use]
extern crate serde_derive;
#[cfg(feature = "serde-serialization")]
extern crate serde;

mod actor;
mod actor_system;
mod class;
mod error;
mod id;
mod messaging;
mod receive;
pub mod strategy;
pub mod testing;
mod tuning;
pub mod typed;
mod wakeup;

pub use self::actor::{from_fn, Actor, FnActor};
pub use self::actor_system::{ActorSystem, World};
pub use self::error::{CallError, RuntimeError, RuntimeResult};
pub use self::id::{ActorId, ActorRef, ParseActorIdError};
pub use self::messaging::{Fate, Handler, Message, Start};
pub use self::receive::{
    selective_fn, FnSelective, MessageBuffer, ReceiveFuture, Receiver, Selective,
    SelectiveActor, RECEIVER_KEY,
};
pub use self::strategy::{PctStrategy, RandomStrategy, SchedulingStrategy, ThreadView};
pub use self::testing::{explore, Exploration, ExecutionOutcome, OpKind, Step, TestingRuntime};
pub use self::tuning::Tuning;
pub use self::typed::{call_all, Call, Proxy, Reply};

#[doc(hidden)]
pub mod __private {
    pub use anyhow;
    pub use futures::future::LocalBoxFuture;
}
