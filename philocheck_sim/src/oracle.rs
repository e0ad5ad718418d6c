//! Ground truth schedule oracle.
//!
//! The oracle writes the logs a *correct* subject could produce for given
//! parameters, so every checker can be exercised without an external binary:
//! - Seat groups with no two neighbours take turns eating
//! - Start times get seeded normal jitter, bounded so turns never overlap
//! - Faults (overlap, early/late death, chatter after death, extra meals)
//!   can be injected to build failing logs on purpose

use philocheck_core::{Event, EventKind, SimulationParams, Timeline};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// A generated log.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Parameters the log was generated for
    pub params: SimulationParams,

    /// Events in output order
    pub events: Vec<Event>,
}

impl Schedule {
    /// Renders the log as subject output lines.
    pub fn lines(&self) -> Vec<String> {
        self.events.iter().map(Event::to_line).collect()
    }

    /// Loads the log into a timeline.
    pub fn timeline(&self) -> Timeline {
        Timeline::from_events(self.events.clone())
    }

    /// Timestamp of the death line, if any.
    pub fn death_ms(&self) -> Option<u64> {
        self.events
            .iter()
            .find(|e| e.kind == EventKind::Died)
            .map(|e| e.timestamp_ms)
    }

    fn sort(&mut self) {
        // Stable: same-millisecond lines keep their per-philosopher order.
        self.events.sort_by_key(|e| e.timestamp_ms);
    }

    fn truncate_after(&mut self, cutoff_ms: u64) {
        self.events.retain(|e| e.timestamp_ms <= cutoff_ms);
    }
}

/// A deliberate defect added to a valid log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Philosopher 2 grabs both forks while philosopher 1 is eating
    NeighbourOverlap,
    /// Someone prints a line after the death
    TalkAfterDeath,
    /// Philosopher 1 starts one more meal after everyone reached the limit
    ExtraMeal,
}

/// The Oracle - generates valid schedules and injects faults.
pub struct ScheduleOracle {
    /// RNG for start-time jitter
    rng: ChaCha8Rng,

    /// Jitter standard deviation (ms)
    jitter_std_ms: f64,
}

impl ScheduleOracle {
    /// Creates an oracle with the given seed and 1ms jitter.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            jitter_std_ms: 1.0,
        }
    }

    /// Sets the jitter standard deviation. Zero disables jitter.
    pub fn with_jitter(mut self, std_ms: f64) -> Self {
        self.jitter_std_ms = std_ms.max(0.0);
        self
    }

    /// Spacing added after each eating turn; jitter never exceeds half of it.
    fn pad_ms(&self) -> u64 {
        2 + (3.0 * self.jitter_std_ms).ceil() as u64 * 2
    }

    /// Seat groups in which nobody sits next to anybody else.
    fn groups(philosophers: u32) -> Vec<Vec<u32>> {
        let odds: Vec<u32> = (1..=philosophers).filter(|i| i % 2 == 1).collect();
        let evens: Vec<u32> = (1..=philosophers).filter(|i| i % 2 == 0).collect();
        if philosophers % 2 == 0 || philosophers == 1 {
            vec![odds, evens].into_iter().filter(|g| !g.is_empty()).collect()
        } else {
            // The last odd seat neighbours seat 1, so it eats on its own.
            let last = philosophers;
            let odds = odds.into_iter().filter(|i| *i != last).collect();
            vec![odds, evens, vec![last]]
        }
    }

    /// Length of one full round, in which every philosopher eats once.
    pub fn round_length(&self, params: &SimulationParams) -> u64 {
        let slot = params.time_to_eat_ms + self.pad_ms();
        let groups = Self::groups(params.philosophers).len() as u64;
        (groups * slot).max(params.time_to_eat_ms + params.time_to_sleep_ms + self.pad_ms())
    }

    fn jitter(&mut self) -> u64 {
        if self.jitter_std_ms <= 0.0 {
            return 0;
        }
        let Ok(normal) = Normal::new(0.0, self.jitter_std_ms) else {
            return 0;
        };
        let limit = (self.pad_ms() / 2) as f64;
        normal.sample(&mut self.rng).abs().min(limit) as u64
    }

    /// Generates `rounds` rounds. `skip` philosophers never eat.
    fn rounds(&mut self, params: &SimulationParams, rounds: u64, skip: Option<u32>) -> Schedule {
        let groups = Self::groups(params.philosophers);
        let slot = params.time_to_eat_ms + self.pad_ms();
        let round = self.round_length(params);
        let mut events = Vec::new();

        for (g, group) in groups.iter().enumerate() {
            if g > 0 {
                for id in group {
                    events.push(Event::new(0, *id, EventKind::StartedThinking));
                }
            }
        }

        for r in 0..rounds {
            for (g, group) in groups.iter().enumerate() {
                let slot_start = r * round + g as u64 * slot;
                for id in group {
                    if Some(*id) == skip {
                        continue;
                    }
                    let eat = slot_start + self.jitter();
                    let sleep = eat + params.time_to_eat_ms;
                    let think = sleep + params.time_to_sleep_ms;
                    events.push(Event::new(eat, *id, EventKind::ForkAcquired));
                    events.push(Event::new(eat, *id, EventKind::ForkAcquired));
                    events.push(Event::new(eat, *id, EventKind::StartedEating));
                    events.push(Event::new(sleep, *id, EventKind::StartedSleeping));
                    events.push(Event::new(think, *id, EventKind::StartedThinking));
                }
            }
        }

        let mut schedule = Schedule {
            params: *params,
            events,
        };
        schedule.sort();
        schedule
    }

    /// A run where nobody dies, covering at least `horizon_ms`.
    pub fn survival(&mut self, params: &SimulationParams, horizon_ms: u64) -> Schedule {
        let round = self.round_length(params).max(1);
        let rounds = horizon_ms / round + 1;
        let mut schedule = self.rounds(params, rounds, None);
        schedule.truncate_after(horizon_ms);
        schedule
    }

    /// A run that stops as soon as everyone ate `max_meals` times.
    pub fn meals(&mut self, params: &SimulationParams) -> Schedule {
        let limit = params.max_meals.unwrap_or(1) as u64;
        let mut schedule = self.rounds(params, limit, None);
        let last_meal = schedule
            .events
            .iter()
            .filter(|e| e.kind == EventKind::StartedEating)
            .map(|e| e.timestamp_ms)
            .max()
            .unwrap_or(0);
        schedule.truncate_after(last_meal);
        schedule
    }

    /// A run where `victim` never gets to eat and dies `time_to_die + offset_ms`
    /// after the start.
    ///
    /// A single philosopher takes its only fork and waits for the second.
    pub fn death(&mut self, params: &SimulationParams, victim: u32, offset_ms: i64) -> Schedule {
        let death_ms = (params.time_to_die_ms as i64 + offset_ms).max(0) as u64;

        let mut schedule = if params.philosophers == 1 {
            Schedule {
                params: *params,
                events: vec![Event::new(0, 1, EventKind::ForkAcquired)],
            }
        } else {
            let round = self.round_length(params).max(1);
            let mut schedule = self.rounds(params, death_ms / round + 1, Some(victim));
            schedule.truncate_after(death_ms);
            schedule
        };

        schedule.events.push(Event::new(death_ms, victim, EventKind::Died));
        schedule
    }

    /// Returns a copy of `schedule` with the fault applied.
    pub fn inject(&mut self, schedule: &Schedule, fault: Fault) -> Schedule {
        let mut faulty = schedule.clone();
        match fault {
            Fault::NeighbourOverlap => {
                let at = faulty
                    .events
                    .iter()
                    .find(|e| e.philosopher.get() == 1 && e.kind == EventKind::StartedEating)
                    .map(|e| e.timestamp_ms)
                    .unwrap_or(0);
                let neighbour = if faulty.params.philosophers >= 2 { 2 } else { 1 };
                faulty.events.extend([
                    Event::new(at + 1, neighbour, EventKind::ForkAcquired),
                    Event::new(at + 1, neighbour, EventKind::ForkAcquired),
                    Event::new(at + 1, neighbour, EventKind::StartedEating),
                    Event::new(at + 2, neighbour, EventKind::StartedSleeping),
                ]);
                faulty.sort();
            }
            Fault::TalkAfterDeath => {
                let at = faulty.death_ms().unwrap_or(0);
                let talker = if faulty.params.philosophers >= 2 { 2 } else { 1 };
                faulty
                    .events
                    .push(Event::new(at + 1, talker, EventKind::StartedThinking));
            }
            Fault::ExtraMeal => {
                let at = faulty.events.last().map(|e| e.timestamp_ms).unwrap_or(0);
                faulty.events.extend([
                    Event::new(at + 1, 1, EventKind::ForkAcquired),
                    Event::new(at + 1, 1, EventKind::ForkAcquired),
                    Event::new(at + 1, 1, EventKind::StartedEating),
                ]);
            }
        }
        faulty
    }
}
