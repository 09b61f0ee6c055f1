use super::{ExecutionOutcome, TestingRuntime};
use crate::actor_system::World;
use crate::messaging::Start;
use crate::receive::{selective_fn, Receiver, Selective};
use crate::strategy::SchedulingStrategy;

use std::future::Future;
use std::rc::Rc;
use tracing::{debug, info};

/// Summary of an [`explore`](fn.explore.html) run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Exploration {
    /// Number of executions that ran
    pub executions: usize,
    /// Executions that ended with handlers waiting for each other
    pub deadlocks: usize,
    /// Executions cut off by `Tuning::max_steps`
    pub bounded: usize,
    /// Index and reason of the first failed execution, if any
    pub failure: Option<(usize, String)>,
    /// Number of failed executions
    pub failed: usize,
}

impl Exploration {
    /// Whether no execution failed
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Run up to `executions` executions of `harness` under `strategy`.
///
/// For every execution a fresh "Main" actor with selective receive runs the
/// future `harness` returns; an `Err` fails the execution. Exploration stops
/// at the first failed execution unless `Tuning::continue_after_failure` is
/// set, and when the strategy has no more schedules.
///
/// ```ignore
/// let runtime = TestingRuntime::new(Tuning::default());
/// let exploration = explore(&runtime, &mut RandomStrategy::new(42), 100, |world, _| async move {
///     let account = AccountRef::create(&world, "Account", Account::default());
///     account.send_deposit(10);
///     anyhow::ensure!(account.balance().await? == 10, "deposit lost");
///     Ok(())
/// });
/// assert!(exploration.passed());
/// ```
pub fn explore<S, H, F>(
    runtime: &TestingRuntime,
    strategy: &mut S,
    executions: usize,
    harness: H,
) -> Exploration
where
    S: SchedulingStrategy + ?Sized,
    H: Fn(World, Receiver<Start>) -> F + 'static,
    F: Future<Output = anyhow::Result<()>> + 'static,
{
    let keep_going = runtime.tuning().continue_after_failure;
    let harness = Rc::new(harness);
    let mut exploration = Exploration::default();

    for index in 0..executions {
        if !strategy.prepare_for_next_schedule() {
            info!(executions = index, "No more schedules");
            break;
        }
        debug!(execution = index, "Starting execution");

        let world = runtime.world();
        let harness = Rc::clone(&harness);
        let main = selective_fn(move |_: Start, receiver: Receiver<Start>| {
            let world = world.clone();
            let run = harness(world.clone(), receiver);
            async move {
                if let Err(err) = run.await {
                    world.fail(format!("{:#}", err));
                }
            }
        });

        let outcome = runtime.do_execution(strategy, Box::new(Selective::<Start, _>::new(main)));
        exploration.executions += 1;
        match outcome {
            ExecutionOutcome::Failed(reason) => {
                exploration.failed += 1;
                if keep_going {
                    info!(execution = index, reason = %reason, "Execution failed");
                    exploration.failure.get_or_insert((index, reason));
                    continue;
                }
                info!(execution = index, reason = %reason, "Execution failed, stopping");
                exploration.failure = Some((index, reason));
                break;
            }
            ExecutionOutcome::StepBoundReached => exploration.bounded += 1,
            outcome if outcome.is_deadlock() => exploration.deadlocks += 1,
            ExecutionOutcome::NoEnabledThread { .. } => {}
        }
    }
    exploration
}
