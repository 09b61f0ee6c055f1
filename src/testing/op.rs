use crate::id::ActorId;
use std::any::Any;

/// The kinds of operations the testing runtime schedules
#[cfg_attr(feature = "serde-serialization", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum OpKind {
    /// Make a freshly created actor schedulable
    Create,
    /// First operation of every actor
    Start,
    /// Last operation of an actor whose handler returned `Fate::Die`
    End,
    /// Append a message to the target's mailbox
    Send,
    /// Deliver the oldest message of the actor's own mailbox
    Receive,
}

/// Index of a [`ScheduledOp`](struct.ScheduledOp.html) in the op arena of one execution
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) struct OpId(pub usize);

/// An operation an actor attempted, held back until the strategy releases it
pub(crate) struct ScheduledOp {
    pub kind: OpKind,
    pub target: ActorId,
    pub message: Option<Box<dyn Any>>,
}

/// Arena of all operations issued during one execution
#[derive(Default)]
pub(crate) struct OpArena {
    ops: Vec<ScheduledOp>,
}

impl OpArena {
    pub fn push(&mut self, kind: OpKind, target: ActorId, message: Option<Box<dyn Any>>) -> OpId {
        self.ops.push(ScheduledOp {
            kind,
            target,
            message,
        });
        OpId(self.ops.len() - 1)
    }

    pub fn get_mut(&mut self, id: OpId) -> &mut ScheduledOp {
        &mut self.ops[id.0]
    }

    pub fn kind(&self, id: OpId) -> OpKind {
        self.ops[id.0].kind
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn take_all(&mut self) -> Vec<ScheduledOp> {
        ::std::mem::take(&mut self.ops)
    }
}

/// One executed operation, as recorded in the trace of an execution
#[cfg_attr(feature = "serde-serialization", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Step {
    /// The actor that performed the operation
    pub actor: ActorId,
    /// What was performed
    pub op: OpKind,
    /// The actor the operation affected: the created actor, the recipient,
    /// or `actor` itself
    pub target: ActorId,
}
