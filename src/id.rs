use crate::actor_system::World;
use std::marker::PhantomData;

/// Identifies one actor within one runtime.
///
/// Ids are handed out in creation order, so in the testing runtime the same
/// schedule always produces the same ids.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId {
    pub(crate) index: u32,
}

impl ActorId {
    pub(crate) fn new(index: usize) -> Self {
        ActorId {
            index: index as u32,
        }
    }

    /// Position of this actor in its runtime's actor table
    pub fn as_usize(self) -> usize {
        self.index as usize
    }
}

impl ::std::fmt::Debug for ActorId {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        write!(f, "#{:X}", self.index)
    }
}

impl ::std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        ::std::fmt::Debug::fmt(self, f)
    }
}

/// Why a string is not an `ActorId`
#[derive(Debug)]
pub enum ParseActorIdError {
    /// Missing the leading `#`
    Format,
    /// The index is not hexadecimal
    ParseIntError(::std::num::ParseIntError),
}

impl ::std::fmt::Display for ParseActorIdError {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        ::std::fmt::Debug::fmt(self, f)
    }
}

impl ::std::error::Error for ParseActorIdError {}

impl ::std::str::FromStr for ActorId {
    type Err = ParseActorIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').ok_or(ParseActorIdError::Format)?;
        let index = u32::from_str_radix(hex, 16).map_err(ParseActorIdError::ParseIntError)?;
        Ok(ActorId { index })
    }
}

#[cfg(feature = "serde-serialization")]
impl ::serde::ser::Serialize for ActorId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ::serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde-serialization")]
struct ActorIdVisitor;

#[cfg(feature = "serde-serialization")]
impl<'de> ::serde::de::Visitor<'de> for ActorIdVisitor {
    type Value = ActorId;

    fn expecting(&self, formatter: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        formatter.write_str("an actor id like #1F")
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: ::serde::de::Error,
    {
        s.parse().map_err(::serde::de::Error::custom)
    }
}

#[cfg(feature = "serde-serialization")]
impl<'de> ::serde::de::Deserialize<'de> for ActorId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: ::serde::de::Deserializer<'de>,
    {
        deserializer.deserialize_str(ActorIdVisitor)
    }
}

/// A capability to send messages of type `M` to exactly one actor.
///
/// References are cheap to clone and can be freely passed around,
/// including inside messages.
pub struct ActorRef<M> {
    id: ActorId,
    world: World,
    marker: PhantomData<fn(M)>,
}

impl<M: 'static> ActorRef<M> {
    pub(crate) fn new(id: ActorId, world: World) -> Self {
        ActorRef {
            id,
            world,
            marker: PhantomData,
        }
    }

    /// Enqueue a message for the referenced actor.
    ///
    /// In the production runtime the message lands in the mailbox right away.
    /// In the testing runtime the send is buffered as an operation of the
    /// currently executing actor until the scheduling strategy releases it.
    ///
    /// # Panics
    ///
    /// In the testing runtime, when called outside of any actor activation.
    pub fn send(&self, message: M) {
        self.world.send_boxed(self.id, Box::new(message));
    }

    /// The id of the referenced actor
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// The runtime this reference sends through
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Reinterpret the reference as accepting a different message type.
    ///
    /// Mailboxes are untyped, so this is always possible; the receiving
    /// handler decides what to do with a message it does not expect.
    pub fn cast<N: 'static>(&self) -> ActorRef<N> {
        ActorRef::new(self.id, self.world.clone())
    }
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        ActorRef {
            id: self.id,
            world: self.world.clone(),
            marker: PhantomData,
        }
    }
}

impl<M> PartialEq for ActorRef<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.world.same_runtime(&other.world)
    }
}

impl<M> Eq for ActorRef<M> {}

impl<M> ::std::fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        write!(f, "ActorRef({})", self.id)
    }
}
