use crate::id::ActorId;
use thiserror::Error;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced by the runtimes themselves.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An activation-scoped operation was used outside of any actor activation.
    #[error("no actor is currently active")]
    NoActiveActor,
    /// The id does not name an actor of this runtime.
    #[error("unknown actor {0}")]
    UnknownActor(ActorId),
    /// Nothing was runnable and no external wake-up arrived in time.
    #[error("runtime stalled with {parked} parked task(s)")]
    Stalled {
        /// Handler tasks still suspended when the runtime gave up waiting.
        parked: usize,
    },
    /// An explicit harness failure.
    #[error("execution failed: {0}")]
    Failed(String),
}

/// Why a value-returning call on a typed actor did not produce a value.
#[derive(Debug, Error)]
pub enum CallError {
    /// The implementation returned an error.
    #[error(transparent)]
    Application(#[from] anyhow::Error),
    /// The reply slot was dropped before a reply was sent.
    #[error("the call was dropped without a reply")]
    Dropped,
    /// The correlation message was delivered to an actor implementing a different interface.
    #[error("method `{0}` was sent to an actor of a different interface")]
    WrongInterface(&'static str),
}

impl CallError {
    /// The application error, if this is one.
    pub fn application(&self) -> Option<&anyhow::Error> {
        match self {
            CallError::Application(err) => Some(err),
            _ => None,
        }
    }
}
