//! Randomized attach / trigger / detach interleavings
//!
//! Workers share one manager and pick actions from a seeded RNG. Every run
//! yields the next value of a counter, and runs are serialized, so a
//! consistent history has strictly increasing Succeeded values and only
//! valid transitions between consecutive outcomes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use herald_core::{Outcome, OutcomeKind, SubscriberId};
use herald_state::{from_fn, Backpressure, StateManager, Subscription};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Simulation parameters
#[derive(Clone, Debug)]
pub struct InterleavingConfig {
    pub seed: u64,
    pub workers: usize,
    pub actions_per_worker: usize,
    /// Upper bound on each run's random duration
    pub max_run_time: Duration,
    pub policy: Backpressure,
}

impl Default for InterleavingConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            workers: 4,
            actions_per_worker: 32,
            max_run_time: Duration::from_millis(2),
            policy: Backpressure::Unbounded,
        }
    }
}

impl InterleavingConfig {
    /// Few short runs for property tests
    pub fn quick(seed: u64) -> Self {
        Self {
            seed,
            workers: 3,
            actions_per_worker: 12,
            max_run_time: Duration::from_micros(500),
            ..Default::default()
        }
    }
}

/// Everything the subscribers saw
#[derive(Debug)]
pub struct InterleavingReport {
    pub policy: Backpressure,
    /// One history per subscriber, detached or still attached
    pub histories: Vec<(SubscriberId, Vec<Outcome<u64>>)>,
    /// Runs the provider performed
    pub runs: u64,
    /// Subscribers the manager held when the workers finished
    pub registered_at_end: usize,
    /// Subscriptions the workers still held when they finished
    pub held_at_end: usize,
    pub final_outcome: Outcome<u64>,
}

impl InterleavingReport {
    /// Check every history for order consistency
    ///
    /// Transitions are only checked for lossless mailboxes; coalescing may
    /// legitimately drop the Pending between two settled outcomes.
    pub fn check(&self) -> Result<(), String> {
        if self.registered_at_end != self.held_at_end {
            return Err(format!(
                "registry holds {} subscribers, workers hold {}",
                self.registered_at_end, self.held_at_end
            ));
        }
        let expected = match self.runs {
            0 => Outcome::Idle,
            runs => Outcome::Succeeded(runs),
        };
        if self.final_outcome != expected {
            return Err(format!(
                "final outcome {:?}, expected {:?}",
                self.final_outcome, expected
            ));
        }

        let lossless = self.policy == Backpressure::Unbounded;
        for (id, history) in &self.histories {
            let mut prev: Option<OutcomeKind> = None;
            let mut last_value = 0u64;
            for outcome in history {
                let kind = outcome.kind();
                if let (true, Some(prev)) = (lossless, prev) {
                    if !kind.may_follow(prev) {
                        return Err(format!("{id:?}: {prev} -> {kind}"));
                    }
                }
                prev = Some(kind);

                if let Outcome::Succeeded(value) = outcome {
                    if *value <= last_value {
                        return Err(format!("{id:?}: value {value} after {last_value}"));
                    }
                    if *value > self.runs {
                        return Err(format!("{id:?}: value {value} beyond {} runs", self.runs));
                    }
                    last_value = *value;
                }
            }
        }
        Ok(())
    }
}

struct Held {
    subscription: Subscription<u64>,
    history: Vec<Outcome<u64>>,
}

impl Held {
    fn drain(mut self) -> (SubscriberId, Vec<Outcome<u64>>) {
        while let Some(outcome) = self.subscription.try_recv() {
            self.history.push(outcome);
        }
        (self.subscription.id(), self.history)
    }
}

/// Drive one randomized interleaving to completion
pub async fn run_interleaving(config: InterleavingConfig) -> InterleavingReport {
    let counter = Arc::new(AtomicU64::new(0));
    let run_rng = Arc::new(Mutex::new(StdRng::seed_from_u64(config.seed)));
    let max_micros = config.max_run_time.as_micros().max(1) as u64;

    let provider = from_fn({
        let counter = Arc::clone(&counter);
        move || {
            let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = Duration::from_micros(run_rng.lock().gen_range(0..max_micros));
            async move {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
        }
    });
    let manager = StateManager::with_backpressure(provider, config.policy);

    let mut workers = Vec::with_capacity(config.workers);
    for worker in 0..config.workers {
        let manager = manager.clone();
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(worker as u64 + 1));
        let actions = config.actions_per_worker;

        workers.push(tokio::spawn(async move {
            let mut held: Vec<Held> = Vec::new();
            let mut finished = Vec::new();

            for _ in 0..actions {
                match rng.gen_range(0..5u8) {
                    0 | 1 => held.push(Held {
                        subscription: manager.attach(),
                        history: Vec::new(),
                    }),
                    2 if !held.is_empty() => {
                        let entry = held.swap_remove(rng.gen_range(0..held.len()));
                        manager.detach(entry.subscription.id());
                        finished.push(entry.drain());
                    }
                    3 if !held.is_empty() => {
                        let idx = rng.gen_range(0..held.len());
                        let entry = &mut held[idx];
                        if let Some(outcome) = entry.subscription.try_recv() {
                            entry.history.push(outcome);
                        }
                    }
                    _ => {
                        manager.trigger().await;
                    }
                }
                tokio::task::yield_now().await;
            }
            (held, finished)
        }));
    }

    let mut held = Vec::new();
    let mut histories = Vec::new();
    for worker in workers {
        if let Ok((live, finished)) = worker.await {
            held.extend(live);
            histories.extend(finished);
        }
    }

    let registered_at_end = manager.subscriber_count();
    let held_at_end = held.len();
    histories.extend(held.into_iter().map(Held::drain));

    InterleavingReport {
        policy: config.policy,
        histories,
        runs: counter.load(Ordering::SeqCst),
        registered_at_end,
        held_at_end,
        final_outcome: manager.current(),
    }
}
