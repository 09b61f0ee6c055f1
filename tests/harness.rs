use futures::channel::oneshot;
use parley::{
    call_all, explore, from_fn, selective_fn, typed_actor, ExecutionOutcome, Fate, OpKind,
    PctStrategy, RandomStrategy, Receiver, SchedulingStrategy, Selective, Start, Step,
    TestingRuntime, Tuning, World,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

typed_actor! {
    pub trait Account, proxy AccountRef, request AccountRequest {
        fn balance() -> u64;
        fn set_balance(value: u64) -> ();
        fn add(amount: u64) -> u64;
    }
}

#[derive(Default)]
struct Vault(Cell<u64>);

impl Account for Vault {
    async fn balance(self: Rc<Self>) -> anyhow::Result<u64> {
        Ok(self.0.get())
    }

    async fn set_balance(self: Rc<Self>, value: u64) -> anyhow::Result<()> {
        self.0.set(value);
        Ok(())
    }

    async fn add(self: Rc<Self>, amount: u64) -> anyhow::Result<u64> {
        self.0.set(self.0.get() + amount);
        Ok(self.0.get())
    }
}

typed_actor! {
    pub trait Depositor, proxy DepositorRef, request DepositorRequest {
        fn deposit(account: AccountRef, amount: u64) -> ();
    }
}

/// Reads, then writes: loses updates when two tellers overlap
#[derive(Clone)]
struct RacyTeller;

impl Depositor for RacyTeller {
    async fn deposit(self: Rc<Self>, account: AccountRef, amount: u64) -> anyhow::Result<()> {
        let balance = account.balance().await?;
        account.set_balance(balance + amount).await?;
        Ok(())
    }
}

#[derive(Clone)]
struct Teller;

impl Depositor for Teller {
    async fn deposit(self: Rc<Self>, account: AccountRef, amount: u64) -> anyhow::Result<()> {
        account.add(amount).await?;
        Ok(())
    }
}

async fn two_deposits<D: Depositor + Clone>(world: World, teller: D) -> anyhow::Result<()> {
    let account = AccountRef::create(&world, "Account", Vault::default());
    let first = DepositorRef::create(&world, "First", teller.clone());
    let second = DepositorRef::create(&world, "Second", teller);
    call_all(vec![
        first.deposit(account.clone(), 10),
        second.deposit(account.clone(), 10),
    ])
    .await?;
    let balance = account.balance().await?;
    anyhow::ensure!(balance == 20, "lost update: balance is {}", balance);
    Ok(())
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn exploration_finds_the_lost_update() {
    init_logging();
    let runtime = TestingRuntime::new(Tuning::default());
    let exploration = explore(&runtime, &mut RandomStrategy::new(7), 200, |world, _| {
        two_deposits(world, RacyTeller)
    });

    let (index, reason) = exploration.failure.clone().expect("race not found");
    assert!(reason.contains("lost update"), "{}", reason);
    assert_eq!(exploration.executions, index + 1);
    assert!(runtime.has_failed());
}

#[test]
fn atomic_deposits_pass_every_schedule() {
    init_logging();
    let runtime = TestingRuntime::new(Tuning {
        max_executions: 50,
        ..Tuning::default()
    });

    let exploration = runtime.explore(&mut RandomStrategy::new(7), |world, _| {
        two_deposits(world, Teller)
    });
    assert!(exploration.passed(), "{:?}", exploration);
    assert_eq!(exploration.executions, 50);
    assert_eq!(exploration.deadlocks, 0);

    let exploration = runtime.explore(&mut PctStrategy::new(7, 3, 80), |world, _| {
        two_deposits(world, Teller)
    });
    assert!(exploration.passed(), "{:?}", exploration);
}

#[test]
fn same_seed_same_schedule() {
    fn traces(seed: u64) -> Vec<Vec<Step>> {
        let runtime = TestingRuntime::new(Tuning::default());
        let mut strategy = RandomStrategy::new(seed);
        (0..5)
            .map(|_| {
                assert!(strategy.prepare_for_next_schedule());
                let world = runtime.world();
                let main = selective_fn(move |_: Start, _: Receiver<Start>| {
                    let run = two_deposits(world.clone(), Teller);
                    async move {
                        let _ = run.await;
                    }
                });
                runtime.do_execution(&mut strategy, Box::new(Selective::new(main)));
                runtime.trace()
            })
            .collect()
    }

    let first = traces(99);
    assert_eq!(first, traces(99));
    assert!(first.iter().all(|trace| trace[0].op == OpKind::Start));
    assert!(first.windows(2).any(|pair| pair[0] != pair[1]));
}

#[test]
fn waiting_forever_is_a_deadlock() {
    let runtime = TestingRuntime::new(Tuning::default());
    let exploration = explore(&runtime, &mut RandomStrategy::new(1), 10, |_, receiver| async move {
        // nobody ever sends Main a second Start
        receiver.receive(|_: &Start| true).await;
        Ok(())
    });
    assert!(exploration.passed());
    assert_eq!(exploration.deadlocks, 10);
}

#[test]
fn quiescence_is_not_a_deadlock() {
    let runtime = TestingRuntime::new(Tuning::default());
    let world = runtime.world();
    let main = selective_fn(move |_: Start, _: Receiver<Start>| {
        let echo = world.create("Idle", from_fn(|_: u8, _: &World| Fate::Live));
        echo.send(1);
        async {}
    });
    let outcome = runtime.do_execution(&mut RandomStrategy::new(3), Box::new(Selective::new(main)));
    assert_eq!(outcome, ExecutionOutcome::NoEnabledThread { parked_tasks: 0 });
    assert!(!outcome.is_deadlock());
}

#[test]
fn wakeups_from_outside_the_scheduler_fail_the_execution() {
    let runtime = TestingRuntime::new(Tuning::default());
    let exploration = explore(&runtime, &mut RandomStrategy::new(1), 5, |world, _| async move {
        let (done, finished) = oneshot::channel::<u32>();
        let helper = world.create(
            "Helper",
            from_fn(|done: oneshot::Sender<u32>, _: &World| {
                let _ = done.send(1);
                Fate::Live
            }),
        );
        helper.send(done);
        finished.await?;
        Ok(())
    });

    let (index, reason) = exploration.failure.expect("unscheduled wake-up not detected");
    assert_eq!(index, 0);
    assert!(reason.contains("outside the scheduler"), "{}", reason);
}

#[test]
fn fail_halts_after_the_failing_activation() {
    let runtime = TestingRuntime::new(Tuning::default());
    let world = runtime.world();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let main = selective_fn(move |_: Start, _: Receiver<Start>| {
        let world = world.clone();
        let sink = Rc::clone(&sink);
        async move {
            let probe = world.create(
                "Probe",
                from_fn(move |n: u32, world: &World| {
                    sink.borrow_mut().push(n);
                    if n == 2 {
                        world.fail(format!("saw {}", n));
                    }
                    Fate::Live
                }),
            );
            for n in 0..5 {
                probe.send(n);
            }
        }
    });

    let outcome = runtime.do_execution(&mut RandomStrategy::new(5), Box::new(Selective::new(main)));
    assert_eq!(outcome, ExecutionOutcome::Failed("saw 2".to_owned()));
    assert_eq!(runtime.failure().as_deref(), Some("saw 2"));
    // the execution halted right after the failing activation
    assert_eq!(*seen.borrow(), vec![0, 1, 2]);
}

#[test]
fn harness_may_call_before_its_first_await() {
    let runtime = TestingRuntime::new(Tuning::default());
    let exploration = explore(&runtime, &mut RandomStrategy::new(11), 20, |world, _| {
        let account = AccountRef::create(&world, "Account", Vault(Cell::new(3)));
        let balance = account.balance();
        async move {
            anyhow::ensure!(balance.await? == 3, "wrong balance");
            Ok(())
        }
    });
    assert!(exploration.passed(), "{:?}", exploration);
    assert_eq!(exploration.executions, 20);
}

#[test]
fn exploration_can_continue_after_a_failure() {
    let runtime = TestingRuntime::new(Tuning {
        continue_after_failure: true,
        ..Tuning::default()
    });
    let exploration = explore(&runtime, &mut RandomStrategy::new(4), 12, |_, _| async {
        anyhow::bail!("always broken")
    });

    assert_eq!(exploration.executions, 12);
    assert_eq!(exploration.failed, 12);
    let (index, reason) = exploration.failure.expect("failures not reported");
    assert_eq!(index, 0);
    assert_eq!(reason, "always broken");
}
