use super::{enabled_indices, SchedulingStrategy, ThreadView};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Probabilistic concurrency testing.
///
/// Each thread gets a random priority when it first shows up, and the
/// enabled thread with the highest priority always runs. At `depth - 1`
/// randomly chosen steps the running thread's priority drops below all
/// initial priorities. A bug that needs `depth` ordering constraints to
/// show up is found with probability at least `1 / (n * k^(depth-1))`
/// per execution, for `n` threads and `k` steps.
pub struct PctStrategy {
    seeds: ChaCha8Rng,
    schedule: ChaCha8Rng,
    depth: usize,
    max_steps: usize,
    priorities: Vec<u64>,
    change_points: Vec<usize>,
    step: usize,
}

impl PctStrategy {
    /// `max_steps` is an estimate of the length of an execution; change
    /// points are drawn from `1..=max_steps`
    pub fn new(seed: u64, depth: usize, max_steps: usize) -> Self {
        let mut seeds = ChaCha8Rng::seed_from_u64(seed);
        let schedule = ChaCha8Rng::seed_from_u64(seeds.gen());
        let mut strategy = PctStrategy {
            seeds,
            schedule,
            depth: depth.max(1),
            max_steps: max_steps.max(1),
            priorities: Vec::new(),
            change_points: Vec::new(),
            step: 0,
        };
        strategy.draw_change_points();
        strategy
    }

    fn draw_change_points(&mut self) {
        let amount = (self.depth - 1).min(self.max_steps);
        self.change_points = sample(&mut self.schedule, self.max_steps, amount)
            .into_iter()
            .map(|step| step + 1)
            .collect();
    }

    fn priority(&mut self, thread: usize) -> u64 {
        while self.priorities.len() <= thread {
            // above every priority a change point hands out
            let priority = self.schedule.gen_range(self.depth as u64..u64::MAX);
            self.priorities.push(priority);
        }
        self.priorities[thread]
    }
}

impl SchedulingStrategy for PctStrategy {
    fn choose_next_thread(&mut self, threads: &[ThreadView]) -> Option<usize> {
        let enabled = enabled_indices(threads);
        let mut chosen = None;
        for thread in enabled {
            let priority = self.priority(thread);
            match chosen {
                Some((_, best)) if best >= priority => {}
                _ => chosen = Some((thread, priority)),
            }
        }
        let (thread, _) = chosen?;

        self.step += 1;
        if let Some(point) = self.change_points.iter().position(|&step| step == self.step) {
            self.priorities[thread] = point as u64;
        }
        Some(thread)
    }

    fn prepare_for_next_schedule(&mut self) -> bool {
        self.schedule = ChaCha8Rng::seed_from_u64(self.seeds.gen());
        self.priorities.clear();
        self.step = 0;
        self.draw_change_points();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::views;

    #[test]
    fn depth_one_runs_the_top_priority_thread_until_it_blocks() {
        let mut strategy = PctStrategy::new(9, 1, 100);
        strategy.prepare_for_next_schedule();
        let all = views(&[true, true, true]);
        let first = strategy.choose_next_thread(&all).unwrap();
        for _ in 0..20 {
            assert_eq!(strategy.choose_next_thread(&all), Some(first));
        }

        let mut without_first = all.clone();
        without_first[first].enabled = false;
        let second = strategy.choose_next_thread(&without_first).unwrap();
        assert_ne!(second, first);
    }

    #[test]
    fn change_points_demote_the_running_thread() {
        let mut strategy = PctStrategy::new(4, 2, 1);
        strategy.prepare_for_next_schedule();
        assert_eq!(strategy.change_points, vec![1]);
        let all = views(&[true, true]);
        let first = strategy.choose_next_thread(&all).unwrap();
        let second = strategy.choose_next_thread(&all).unwrap();
        assert_ne!(first, second);
        assert_eq!(strategy.choose_next_thread(&all), Some(second));
    }

    #[test]
    fn nothing_enabled() {
        let mut strategy = PctStrategy::new(0, 3, 10);
        assert_eq!(strategy.choose_next_thread(&views(&[false])), None);
    }
}
