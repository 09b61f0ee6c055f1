use std::time::Duration;

/// Knobs shared by the production and the testing runtime.
#[cfg_attr(
    feature = "serde-serialization",
    derive(Serialize, Deserialize),
    serde(default)
)]
#[derive(Clone, Debug)]
pub struct Tuning {
    /// Seed for the production runtime's pick of the next active actor.
    /// Drawn from entropy when `None`.
    pub seed: Option<u64>,
    /// Upper bound on executed operations per harness execution.
    pub max_steps: Option<usize>,
    /// Number of executions `explore` runs when not told otherwise
    pub max_executions: usize,
    /// How long `run` and `block_on` wait for an external wake-up
    /// before giving up with `RuntimeError::Stalled`
    pub external_wait: Duration,
    /// Initial capacity of each mailbox
    pub inbox_capacity: usize,
    /// Whether `explore` keeps running executions after one failed
    pub continue_after_failure: bool,
}

impl ::std::default::Default for Tuning {
    fn default() -> Self {
        Tuning {
            seed: None,
            max_steps: None,
            max_executions: 100,
            external_wait: Duration::from_secs(30),
            inbox_capacity: 16,
            continue_after_failure: false,
        }
    }
}
