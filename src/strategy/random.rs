use super::{enabled_indices, SchedulingStrategy, ThreadView};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Picks uniformly among the enabled threads.
///
/// Every execution gets its own generator, seeded from a root generator, so
/// executions are independent while a whole exploration can be reproduced
/// from the one root seed.
pub struct RandomStrategy {
    seeds: ChaCha8Rng,
    schedule: Option<ChaCha8Rng>,
}

impl RandomStrategy {
    /// Every schedule is derived from `seed`, so the same seed replays the same executions
    pub fn new(seed: u64) -> Self {
        RandomStrategy {
            seeds: ChaCha8Rng::seed_from_u64(seed),
            schedule: None,
        }
    }
}

impl SchedulingStrategy for RandomStrategy {
    fn choose_next_thread(&mut self, threads: &[ThreadView]) -> Option<usize> {
        let enabled = enabled_indices(threads);
        if enabled.is_empty() {
            return None;
        }
        let seeds = &mut self.seeds;
        let schedule = self
            .schedule
            .get_or_insert_with(|| ChaCha8Rng::seed_from_u64(seeds.gen()));
        Some(enabled[schedule.gen_range(0..enabled.len())])
    }

    fn prepare_for_next_schedule(&mut self) -> bool {
        self.schedule = Some(ChaCha8Rng::seed_from_u64(self.seeds.gen()));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::views;

    fn schedule(strategy: &mut RandomStrategy, steps: usize) -> Vec<Option<usize>> {
        let threads = views(&[true, false, true, true]);
        strategy.prepare_for_next_schedule();
        (0..steps).map(|_| strategy.choose_next_thread(&threads)).collect()
    }

    #[test]
    fn only_enabled_threads_are_chosen() {
        let mut strategy = RandomStrategy::new(11);
        let choices = schedule(&mut strategy, 200);
        assert!(choices.iter().all(|choice| matches!(choice, Some(0) | Some(2) | Some(3))));
        assert_eq!(strategy.choose_next_thread(&views(&[false, false])), None);
    }

    #[test]
    fn same_root_seed_same_schedules() {
        let mut first = RandomStrategy::new(5);
        let mut second = RandomStrategy::new(5);
        for _ in 0..3 {
            assert_eq!(schedule(&mut first, 50), schedule(&mut second, 50));
        }
    }

    #[test]
    fn executions_differ() {
        let mut strategy = RandomStrategy::new(5);
        let one = schedule(&mut strategy, 50);
        let other = schedule(&mut strategy, 50);
        assert_ne!(one, other);
    }
}
