//! Invariant Checkers
//! ==================
//!
//! Independent rules evaluated against a finished [`Timeline`]:
//!
//! - **Format**: every line decoded, timestamps monotonic, ids in `[1, N]`
//! - **Exclusivity**: neighbours never hold both forks at the same time
//! - **Death timing**: a death is reported within `[ttd, ttd + 10]` ms of
//!   the last meal and nothing is printed afterwards
//! - **Meal count**: the meal limit is reached by everyone, then the run stops
//! - **Fairness**: no philosopher waits more than `2 * ttd` between meals (soft)
//! - **Progress**: everyone eats at least once, meals are not wildly uneven
//!
//! Every checker is a pure function of the timeline and the scenario. They
//! never panic on malformed input; a broken timeline yields a failing
//! [`Verdict`] with the evidence attached.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{Event, EventKind, PhilosopherId};
use crate::scenario::{MealPolicy, ScenarioSpec, SimulationParams};
use crate::timeline::Timeline;
use crate::verdict::{Outcome, Verdict, MAX_OFFENDERS};

/// Identifies a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckerKind {
    Format,
    Exclusivity,
    DeathTiming,
    MealCount,
    Fairness,
    Progress,
}

impl CheckerKind {
    /// Every rule, in evaluation order.
    pub fn all() -> Vec<CheckerKind> {
        vec![
            CheckerKind::Format,
            CheckerKind::Exclusivity,
            CheckerKind::DeathTiming,
            CheckerKind::MealCount,
            CheckerKind::Fairness,
            CheckerKind::Progress,
        ]
    }

    /// Rules that must hold for every run, whatever its outcome.
    pub fn safety() -> Vec<CheckerKind> {
        vec![
            CheckerKind::Format,
            CheckerKind::Exclusivity,
            CheckerKind::DeathTiming,
        ]
    }

    /// Returns the rule name.
    pub fn name(&self) -> &'static str {
        match self {
            CheckerKind::Format => "format",
            CheckerKind::Exclusivity => "exclusivity",
            CheckerKind::DeathTiming => "death_timing",
            CheckerKind::MealCount => "meal_count",
            CheckerKind::Fairness => "fairness",
            CheckerKind::Progress => "progress",
        }
    }

    /// Evaluates the rule.
    pub fn run(&self, timeline: &Timeline, spec: &ScenarioSpec) -> Verdict {
        match self {
            CheckerKind::Format => check_format(timeline, spec),
            CheckerKind::Exclusivity => check_exclusivity(timeline, spec),
            CheckerKind::DeathTiming => check_death_timing(timeline, spec),
            CheckerKind::MealCount => check_meal_count(timeline, spec),
            CheckerKind::Fairness => check_fairness(timeline, spec),
            CheckerKind::Progress => check_progress(timeline, spec),
        }
    }
}

impl std::fmt::Display for CheckerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Runs every rule configured on the scenario.
pub fn run_checkers(timeline: &Timeline, spec: &ScenarioSpec) -> Vec<Verdict> {
    spec.checkers
        .iter()
        .map(|checker| {
            let verdict = checker.run(timeline, spec);
            debug!("  {} -> {}", checker, verdict.outcome);
            verdict
        })
        .collect()
}

fn not_applicable(kind: CheckerKind, why: &str) -> Verdict {
    Verdict::pass(kind.name(), format!("not applicable: {}", why))
}

fn philosophers(params: &SimulationParams) -> impl Iterator<Item = PhilosopherId> {
    (1..=params.philosophers).map(PhilosopherId)
}

// =============================================================================
// FORMAT
// =============================================================================

/// Every line decoded, timestamps never decrease, ids within `[1, N]`.
pub fn check_format(timeline: &Timeline, spec: &ScenarioSpec) -> Verdict {
    let kind = CheckerKind::Format;
    let mut problems = Vec::new();
    let mut offending = Vec::new();

    let failures = timeline.parse_failures();
    if let Some(first) = failures.first() {
        problems.push(format!("{} malformed line(s), first: {}", failures.len(), first));
    }

    let violations = timeline.ordering_violations();
    if let Some(first) = violations.first() {
        problems.push(format!("{} out-of-order line(s), first: {}", violations.len(), first));
        offending.extend(violations.iter().map(|v| v.event.clone()));
    }

    if let Some(params) = spec.params() {
        let out_of_range: Vec<&Event> = timeline
            .events()
            .iter()
            .filter(|e| !e.philosopher.in_range(params.philosophers))
            .collect();
        if let Some(first) = out_of_range.first() {
            problems.push(format!(
                "{} line(s) name a philosopher outside [1, {}], first: {}",
                out_of_range.len(),
                params.philosophers,
                first
            ));
            offending.extend(out_of_range.into_iter().cloned());
        }
    }

    if problems.is_empty() {
        Verdict::pass(kind.name(), format!("{} well-formed line(s)", timeline.len()))
    } else {
        Verdict::fail(kind.name(), problems.join("; "), offending)
    }
}

// =============================================================================
// EXCLUSIVITY
// =============================================================================

/// Interval during which a philosopher is observed holding both forks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalSection {
    pub philosopher: PhilosopherId,
    pub start_ms: u64,
    /// Exclusive end; the release line's timestamp
    pub end_ms: u64,
    /// Line that opened the section (the second fork)
    pub opened_by: Event,
}

impl CriticalSection {
    fn overlaps(&self, other: &CriticalSection) -> bool {
        self.start_ms < other.end_ms && other.start_ms < self.end_ms
    }
}

/// Derives critical sections and over-acquisitions for one philosopher.
///
/// A section opens on the second consecutive fork and closes on the next
/// sleep (or death). A thinking line between two forks resets the count. A section still open at the end of the stream runs to
/// the last observed timestamp.
fn critical_sections(
    timeline: &Timeline,
    philosopher: PhilosopherId,
    forks_available: u32,
) -> (Vec<CriticalSection>, Vec<Event>) {
    let mut sections = Vec::new();
    let mut excess = Vec::new();
    let mut held = 0u32;
    let mut open: Option<&Event> = None;

    for event in timeline.events_for(philosopher) {
        match event.kind {
            EventKind::ForkAcquired => {
                held += 1;
                if held > forks_available {
                    excess.push(event.clone());
                }
                if held == 2 && open.is_none() {
                    open = Some(event);
                }
            }
            EventKind::StartedSleeping | EventKind::Died => {
                if let Some(start) = open.take() {
                    sections.push(CriticalSection {
                        philosopher,
                        start_ms: start.timestamp_ms,
                        end_ms: event.timestamp_ms,
                        opened_by: start.clone(),
                    });
                }
                held = 0;
            }
            EventKind::StartedThinking => {
                // Forks around a thinking line are not consecutive.
                if open.is_none() {
                    held = 0;
                }
            }
            EventKind::StartedEating => {}
        }
    }

    if let Some(start) = open {
        sections.push(CriticalSection {
            philosopher,
            start_ms: start.timestamp_ms,
            end_ms: timeline.span_ms(),
            opened_by: start.clone(),
        });
    }

    (sections, excess)
}

/// Adjacent seat pairs sharing a fork, each listed once.
fn adjacent_pairs(count: u32) -> Vec<(PhilosopherId, PhilosopherId)> {
    match count {
        0 | 1 => Vec::new(),
        2 => vec![(PhilosopherId(1), PhilosopherId(2))],
        n => (1..=n).map(|i| (PhilosopherId(i), PhilosopherId(i % n + 1))).collect(),
    }
}

/// Sweeps two sorted, internally disjoint section lists for overlaps.
fn overlapping<'a>(
    a: &'a [CriticalSection],
    b: &'a [CriticalSection],
) -> Vec<(&'a CriticalSection, &'a CriticalSection)> {
    let mut hits = Vec::new();
    let (mut x, mut y) = (0, 0);
    while x < a.len() && y < b.len() {
        if a[x].overlaps(&b[y]) {
            hits.push((&a[x], &b[y]));
        }
        if a[x].end_ms <= b[y].end_ms {
            x += 1;
        } else {
            y += 1;
        }
    }
    hits
}

/// Neighbours never hold both forks at once; nobody holds more forks than exist.
pub fn check_exclusivity(timeline: &Timeline, spec: &ScenarioSpec) -> Verdict {
    let kind = CheckerKind::Exclusivity;
    let Some(params) = spec.params() else {
        return not_applicable(kind, "no simulation parameters");
    };

    // A lone philosopher has a single fork to reach for.
    let forks_available = if params.philosophers == 1 { 1 } else { 2 };

    let mut sections: Vec<Vec<CriticalSection>> = Vec::new();
    let mut excess: Vec<Event> = Vec::new();
    for id in philosophers(params) {
        let (own, over) = critical_sections(timeline, id, forks_available);
        sections.push(own);
        excess.extend(over);
    }

    let mut problems = Vec::new();
    let mut offending = Vec::new();

    if let Some(first) = excess.first() {
        problems.push(format!(
            "{} fork acquisition(s) beyond the {} fork(s) a philosopher can reach, first: {}",
            excess.len(),
            forks_available,
            first
        ));
        excess.sort_by_key(|e| e.sequence);
        offending.extend(excess.iter().take(MAX_OFFENDERS).cloned());
    }

    let mut overlaps = Vec::new();
    for (left, right) in adjacent_pairs(params.philosophers) {
        let a = &sections[(left.get() - 1) as usize];
        let b = &sections[(right.get() - 1) as usize];
        overlaps.extend(overlapping(a, b));
    }
    overlaps.sort_by_key(|(a, b)| a.start_ms.max(b.start_ms));

    if let Some((a, b)) = overlaps.first() {
        problems.push(format!(
            "{} overlapping critical section(s); first: philosophers {} and {} both held their forks during [{}, {})ms",
            overlaps.len(),
            a.philosopher,
            b.philosopher,
            a.start_ms.max(b.start_ms),
            a.end_ms.min(b.end_ms)
        ));
        for (a, b) in overlaps.iter().take(2) {
            offending.push(a.opened_by.clone());
            offending.push(b.opened_by.clone());
        }
    }

    if problems.is_empty() {
        let total: usize = sections.iter().map(Vec::len).sum();
        Verdict::pass(
            kind.name(),
            format!("{} critical section(s), no neighbours overlapped", total),
        )
    } else {
        Verdict::fail(kind.name(), problems.join("; "), offending)
    }
}

// =============================================================================
// DEATH TIMING
// =============================================================================

/// A death lands in `[ttd, ttd + tolerance]` after the last meal and ends the output.
pub fn check_death_timing(timeline: &Timeline, spec: &ScenarioSpec) -> Verdict {
    let kind = CheckerKind::DeathTiming;
    let Some(params) = spec.params() else {
        return not_applicable(kind, "no simulation parameters");
    };

    let deaths = timeline.death_events();
    let Some(death) = deaths.first().copied() else {
        return Verdict::pass(kind.name(), "no death reported");
    };

    let mut problems = Vec::new();
    let mut offending = vec![death.clone()];

    if deaths.len() > 1 {
        problems.push(format!("{} deaths reported, expected exactly one", deaths.len()));
        offending.extend(deaths.iter().skip(1).map(|e| (*e).clone()));
    }

    let trailing: Vec<&Event> = timeline
        .events()
        .iter()
        .filter(|e| e.sequence > death.sequence && e.kind != EventKind::Died)
        .collect();
    if let Some(first) = trailing.first() {
        problems.push(format!(
            "{} line(s) printed after the death, first: {}",
            trailing.len(),
            first
        ));
        offending.extend(trailing.iter().map(|e| (*e).clone()));
    }

    let last_meal_ms = timeline
        .events_for(death.philosopher)
        .filter(|e| e.kind == EventKind::StartedEating && e.sequence < death.sequence)
        .last()
        .map(|e| e.timestamp_ms)
        .unwrap_or(0);
    let starved_for = death.timestamp_ms.saturating_sub(last_meal_ms);
    let earliest = params.time_to_die_ms;
    let latest = params.time_to_die_ms + spec.death_tolerance_ms;

    if starved_for < earliest {
        problems.push(format!(
            "philosopher {} reported dead {}ms after its last meal at {}ms, before time_to_die {}ms",
            death.philosopher, starved_for, last_meal_ms, earliest
        ));
    } else if starved_for > latest {
        problems.push(format!(
            "philosopher {} reported dead {}ms after its last meal at {}ms, later than {}ms",
            death.philosopher, starved_for, last_meal_ms, latest
        ));
    }

    if problems.is_empty() {
        Verdict::pass(
            kind.name(),
            format!(
                "philosopher {} died at {}ms, {}ms after its last meal (window [{}, {}])",
                death.philosopher, death.timestamp_ms, starved_for, earliest, latest
            ),
        )
    } else {
        Verdict::fail(kind.name(), problems.join("; "), offending)
    }
}

// =============================================================================
// MEAL COUNT
// =============================================================================

/// Everyone reaches the meal limit, nobody dies, no meal starts afterwards.
pub fn check_meal_count(timeline: &Timeline, spec: &ScenarioSpec) -> Verdict {
    let kind = CheckerKind::MealCount;
    let Some(params) = spec.params() else {
        return not_applicable(kind, "no simulation parameters");
    };
    let Some(limit) = params.max_meals else {
        return not_applicable(kind, "no meal limit configured");
    };

    let deaths = timeline.death_events();
    if !deaths.is_empty() {
        return Verdict::fail(
            kind.name(),
            format!("a philosopher died before everyone ate {} meal(s)", limit),
            deaths.into_iter().cloned().collect(),
        );
    }

    let mut problems = Vec::new();
    let mut offending = Vec::new();

    let short: Vec<String> = philosophers(params)
        .filter_map(|id| {
            let meals = timeline.meals_eaten(id);
            (meals < limit).then(|| format!("{}:{}", id, meals))
        })
        .collect();
    if !short.is_empty() {
        problems.push(format!(
            "{} philosopher(s) below the limit of {} (id:meals {})",
            short.len(),
            limit,
            short.join(", ")
        ));
    }

    if spec.meal_policy == MealPolicy::Exact {
        let extra: Vec<&Event> = timeline
            .events_of_kind(EventKind::StartedEating)
            .filter(|e| e.meal_count.map_or(false, |n| n > limit))
            .collect();
        if let Some(first) = extra.first() {
            problems.push(format!(
                "{} meal(s) beyond the limit of {}, first: {}",
                extra.len(),
                limit,
                first
            ));
            offending.extend(extra.into_iter().cloned());
        }
    }

    // Instant the last philosopher reached the limit.
    let satisfied_at = if short.is_empty() {
        philosophers(params)
            .filter_map(|id| {
                timeline
                    .events_for(id)
                    .find(|e| e.meal_count == Some(limit))
                    .map(|e| e.timestamp_ms)
            })
            .max()
    } else {
        None
    };

    if let Some(done_ms) = satisfied_at {
        let late: Vec<&Event> = timeline
            .events_of_kind(EventKind::StartedEating)
            .filter(|e| e.timestamp_ms > done_ms)
            .collect();
        if let Some(first) = late.first() {
            problems.push(format!(
                "{} meal(s) started after everyone reached the limit at {}ms, first: {}",
                late.len(),
                done_ms,
                first
            ));
            offending.extend(late.into_iter().cloned());
        }

        let wind_down_end = meals_wind_down_end(done_ms, params);
        let trailing: Vec<&Event> = timeline
            .events()
            .iter()
            .filter(|e| e.timestamp_ms > wind_down_end && e.kind != EventKind::StartedEating)
            .collect();
        if let Some(first) = trailing.first() {
            problems.push(format!(
                "{} line(s) after the run should have stopped at {}ms, first: {}",
                trailing.len(),
                wind_down_end,
                first
            ));
            offending.extend(trailing.into_iter().cloned());
        }
    }

    if problems.is_empty() {
        Verdict::pass(
            kind.name(),
            format!(
                "all {} philosopher(s) reached {} meal(s) by {}ms",
                params.philosophers,
                limit,
                satisfied_at.unwrap_or(0)
            ),
        )
    } else {
        offending.sort_by_key(|e| e.sequence);
        offending.dedup_by_key(|e| e.sequence);
        Verdict::fail(kind.name(), problems.join("; "), offending)
    }
}

/// Last instant a line may still appear once everyone reached the meal limit.
///
/// The meals in progress at `done_ms` run for `time_to_eat` and end with a
/// sleeping line; one more `time_to_eat` covers the subject noticing.
fn meals_wind_down_end(done_ms: u64, params: &SimulationParams) -> u64 {
    done_ms.saturating_add(params.time_to_eat_ms.saturating_mul(2))
}

// =============================================================================
// FAIRNESS
// =============================================================================

/// Longest wait between meals for one philosopher within the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealGap {
    pub philosopher: PhilosopherId,
    pub gap_ms: u64,
    pub from_ms: u64,
    /// Meal that ended the gap; `None` if it ran to the end of the window
    pub ended_by: Option<Event>,
}

/// Computes the longest wait per philosopher over `[0, window_end_ms]`.
pub fn longest_meal_gaps(
    timeline: &Timeline,
    params: &SimulationParams,
    window_end_ms: u64,
) -> Vec<MealGap> {
    philosophers(params)
        .map(|id| {
            let mut worst = MealGap {
                philosopher: id,
                gap_ms: 0,
                from_ms: 0,
                ended_by: None,
            };
            let mut previous = 0u64;
            for meal in timeline
                .events_for(id)
                .filter(|e| e.kind == EventKind::StartedEating && e.timestamp_ms <= window_end_ms)
            {
                let gap = meal.timestamp_ms - previous.min(meal.timestamp_ms);
                if gap > worst.gap_ms {
                    worst = MealGap {
                        philosopher: id,
                        gap_ms: gap,
                        from_ms: previous,
                        ended_by: Some(meal.clone()),
                    };
                }
                previous = meal.timestamp_ms;
            }
            let tail = window_end_ms.saturating_sub(previous);
            if tail > worst.gap_ms {
                worst = MealGap {
                    philosopher: id,
                    gap_ms: tail,
                    from_ms: previous,
                    ended_by: None,
                };
            }
            worst
        })
        .collect()
}

/// No philosopher waits longer than `gap_factor * ttd` between meals.
///
/// Starvation cannot be told apart from slow scheduling without ground
/// truth, so a violation is a warning.
pub fn check_fairness(timeline: &Timeline, spec: &ScenarioSpec) -> Verdict {
    let kind = CheckerKind::Fairness;
    let Some(params) = spec.params() else {
        return not_applicable(kind, "no simulation parameters");
    };
    if timeline.first_death().is_some() {
        return not_applicable(kind, "run ended in a death");
    }

    let window_cap = (spec.fairness_window_factor * params.time_to_die_ms as f64) as u64;
    let window_end = window_cap.min(timeline.span_ms());
    let threshold = (spec.fairness_gap_factor * params.time_to_die_ms as f64).round() as u64;

    let gaps = longest_meal_gaps(timeline, params, window_end);
    let mut starved: Vec<&MealGap> = gaps.iter().filter(|g| g.gap_ms > threshold).collect();
    starved.sort_by(|a, b| b.gap_ms.cmp(&a.gap_ms));

    match starved.first() {
        None => {
            let longest = gaps.iter().map(|g| g.gap_ms).max().unwrap_or(0);
            Verdict::pass(
                kind.name(),
                format!(
                    "longest wait between meals {}ms within {}ms (bound {}ms)",
                    longest, window_end, threshold
                ),
            )
        }
        Some(worst) => Verdict::warn(
            kind.name(),
            format!(
                "{} philosopher(s) waited longer than {}ms between meals; worst: philosopher {} waited {}ms from {}ms",
                starved.len(),
                threshold,
                worst.philosopher,
                worst.gap_ms,
                worst.from_ms
            ),
            starved.iter().filter_map(|g| g.ended_by.clone()).collect(),
        ),
    }
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Share of the average below which a philosopher counts as under-fed.
const UNEVEN_SHARE: f64 = 0.5;

/// Everyone eats at least once; nobody gets less than half the average.
pub fn check_progress(timeline: &Timeline, spec: &ScenarioSpec) -> Verdict {
    let kind = CheckerKind::Progress;
    let Some(params) = spec.params() else {
        return not_applicable(kind, "no simulation parameters");
    };
    if timeline.first_death().is_some() {
        return not_applicable(kind, "run ended in a death");
    }

    let counts: Vec<(PhilosopherId, u32)> = philosophers(params)
        .map(|id| (id, timeline.meals_eaten(id)))
        .collect();
    let never_ate: Vec<String> = counts
        .iter()
        .filter(|(_, meals)| *meals == 0)
        .map(|(id, _)| id.to_string())
        .collect();
    let span = timeline.span_ms();

    if !never_ate.is_empty() {
        if span < params.time_to_die_ms {
            return Verdict::pass(
                kind.name(),
                format!("run too short to judge progress ({}ms observed)", span),
            );
        }
        return Verdict::fail(
            kind.name(),
            format!(
                "possible deadlock: {} of {} philosopher(s) never ate in {}ms (ids {})",
                never_ate.len(),
                params.philosophers,
                span,
                never_ate.join(", ")
            ),
            Vec::new(),
        );
    }

    let total: u64 = counts.iter().map(|(_, meals)| *meals as u64).sum();
    if total >= params.philosophers as u64 {
        let average = total as f64 / params.philosophers as f64;
        let underfed: Vec<String> = counts
            .iter()
            .filter(|(_, meals)| (*meals as f64) < average * UNEVEN_SHARE)
            .map(|(id, meals)| format!("{}:{}", id, meals))
            .collect();
        if !underfed.is_empty() {
            return Verdict::warn(
                kind.name(),
                format!(
                    "uneven meals: {} philosopher(s) below half the average of {:.1} (id:meals {})",
                    underfed.len(),
                    average,
                    underfed.join(", ")
                ),
                Vec::new(),
            );
        }
    }

    Verdict::pass(
        kind.name(),
        format!("all {} philosopher(s) ate; {} meal(s) in total", params.philosophers, total),
    )
}

/// Worst outcome among a set of verdicts.
pub fn worst_outcome<'a, I: IntoIterator<Item = &'a Verdict>>(verdicts: I) -> Outcome {
    verdicts
        .into_iter()
        .map(|v| v.outcome)
        .max()
        .unwrap_or(Outcome::Pass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LineParser;
    use crate::scenario::Expectation;

    fn timeline(lines: &[&str]) -> Timeline {
        let parser = LineParser::new();
        let mut timeline = Timeline::new();
        for (n, line) in lines.iter().enumerate() {
            timeline.ingest(parser.parse(n + 1, line));
        }
        timeline
    }

    fn spec(n: u32, ttd: u64, tte: u64, tts: u64) -> ScenarioSpec {
        ScenarioSpec::new(
            "test",
            SimulationParams::new(n, ttd, tte, tts),
            Expectation::Survive,
        )
    }

    fn meal_spec(n: u32, meals: u32) -> ScenarioSpec {
        ScenarioSpec::new(
            "meals",
            SimulationParams::new(n, 800, 200, 200).with_meals(meals),
            Expectation::SatisfyMeals,
        )
    }

    /// Three philosophers taking turns one at a time, two rounds.
    fn valid_three() -> Vec<&'static str> {
        vec![
            "0 1 has taken a fork",
            "0 1 has taken a fork",
            "0 1 is eating",
            "0 2 is thinking",
            "0 3 is thinking",
            "100 1 is sleeping",
            "100 2 has taken a fork",
            "100 2 has taken a fork",
            "100 2 is eating",
            "200 1 is thinking",
            "200 2 is sleeping",
            "200 3 has taken a fork",
            "200 3 has taken a fork",
            "200 3 is eating",
            "300 2 is thinking",
            "300 3 is sleeping",
            "300 1 has taken a fork",
            "300 1 has taken a fork",
            "300 1 is eating",
        ]
    }

    #[test]
    fn test_format_passes_on_valid_log() {
        let t = timeline(&valid_three());
        assert!(check_format(&t, &spec(3, 800, 100, 100)).is_pass());
    }

    #[test]
    fn test_format_flags_all_evidence() {
        let t = timeline(&["0 1 is thinking", "0 1 is dancing", "5 4 is thinking", "3 1 is eating"]);
        let verdict = check_format(&t, &spec(3, 800, 100, 100));
        assert!(verdict.is_failure());
        assert!(verdict.explanation.contains("malformed"));
        assert!(verdict.explanation.contains("out-of-order"));
        assert!(verdict.explanation.contains("outside [1, 3]"));
    }

    #[test]
    fn test_format_is_idempotent() {
        let t = timeline(&["0 1 is thinking", "garbage", "0 9 died"]);
        let s = spec(3, 800, 100, 100);
        assert_eq!(check_format(&t, &s), check_format(&t, &s));
    }

    #[test]
    fn test_exclusivity_passes_on_turn_taking() {
        let t = timeline(&valid_three());
        let verdict = check_exclusivity(&t, &spec(3, 800, 100, 100));
        assert!(verdict.is_pass(), "{}", verdict);
    }

    #[test]
    fn test_exclusivity_detects_neighbour_overlap() {
        let t = timeline(&[
            "0 1 has taken a fork",
            "0 1 has taken a fork",
            "0 1 is eating",
            "50 2 has taken a fork",
            "50 2 has taken a fork",
            "50 2 is eating",
            "100 1 is sleeping",
            "150 2 is sleeping",
        ]);
        let verdict = check_exclusivity(&t, &spec(3, 800, 100, 100));
        assert!(verdict.is_failure());
        assert!(verdict.explanation.contains("[50, 100)"), "{}", verdict.explanation);
        assert_eq!(verdict.offending.len(), 2);
    }

    #[test]
    fn test_exclusivity_allows_same_millisecond_handoff() {
        let t = timeline(&[
            "0 1 has taken a fork",
            "0 1 has taken a fork",
            "0 1 is eating",
            "100 2 has taken a fork",
            "100 2 has taken a fork",
            "100 1 is sleeping",
            "100 2 is eating",
            "200 2 is sleeping",
        ]);
        assert!(check_exclusivity(&t, &spec(2, 800, 100, 100)).is_pass());
    }

    #[test]
    fn test_exclusivity_ignores_non_neighbours() {
        // 1 and 3 are not adjacent at a table of four.
        let t = timeline(&[
            "0 1 has taken a fork",
            "0 1 has taken a fork",
            "0 3 has taken a fork",
            "0 3 has taken a fork",
            "0 1 is eating",
            "0 3 is eating",
            "100 1 is sleeping",
            "100 3 is sleeping",
        ]);
        assert!(check_exclusivity(&t, &spec(4, 800, 100, 100)).is_pass());
    }

    #[test]
    fn test_exclusivity_wraps_around_the_table() {
        let t = timeline(&[
            "0 1 has taken a fork",
            "0 1 has taken a fork",
            "0 4 has taken a fork",
            "0 4 has taken a fork",
            "100 1 is sleeping",
            "100 4 is sleeping",
        ]);
        assert!(check_exclusivity(&t, &spec(4, 800, 100, 100)).is_failure());
    }

    #[test]
    fn test_exclusivity_open_section_runs_to_end() {
        let t = timeline(&[
            "0 1 has taken a fork",
            "0 1 has taken a fork",
            "0 1 is eating",
            "50 2 has taken a fork",
            "60 2 has taken a fork",
            "70 3 is thinking",
        ]);
        assert!(check_exclusivity(&t, &spec(3, 800, 100, 100)).is_failure());
    }

    #[test]
    fn test_exclusivity_single_philosopher() {
        let ok = timeline(&["0 1 has taken a fork", "800 1 died"]);
        assert!(check_exclusivity(&ok, &spec(1, 800, 200, 200)).is_pass());

        let two_forks = timeline(&["0 1 has taken a fork", "0 1 has taken a fork", "0 1 is eating"]);
        let verdict = check_exclusivity(&two_forks, &spec(1, 800, 200, 200));
        assert!(verdict.is_failure());
        assert!(verdict.explanation.contains("beyond the 1 fork"));
    }

    #[test]
    fn test_exclusivity_third_fork() {
        let t = timeline(&[
            "0 2 has taken a fork",
            "0 2 has taken a fork",
            "0 2 has taken a fork",
        ]);
        assert!(check_exclusivity(&t, &spec(5, 800, 200, 200)).is_failure());
    }

    #[test]
    fn test_death_timing_boundaries() {
        let s = spec(4, 310, 200, 100);
        let at = |ts: u64| {
            let line = format!("{} 2 died", ts);
            timeline(&["0 1 has taken a fork", "0 1 has taken a fork", "0 1 is eating", &line])
        };

        assert!(check_death_timing(&at(310), &s).is_pass());
        assert!(check_death_timing(&at(320), &s).is_pass());
        assert!(check_death_timing(&at(309), &s).is_failure());
        assert!(check_death_timing(&at(321), &s).is_failure());
    }

    #[test]
    fn test_death_timing_measures_from_last_meal() {
        let s = spec(2, 310, 100, 100);
        let t = timeline(&[
            "0 1 is eating",
            "100 1 is sleeping",
            "200 1 is thinking",
            "200 1 is eating",
            "300 1 is sleeping",
            "515 1 died",
        ]);
        let verdict = check_death_timing(&t, &s);
        assert!(verdict.is_pass(), "{}", verdict);
        assert!(verdict.explanation.contains("315ms after its last meal"));

        let early = timeline(&["0 1 is eating", "200 1 is eating", "320 1 died"]);
        let verdict = check_death_timing(&early, &s);
        assert!(verdict.is_failure());
        assert!(verdict.explanation.contains("before time_to_die"));
    }

    #[test]
    fn test_death_timing_rejects_output_after_death() {
        let t = timeline(&["0 1 is thinking", "800 1 died", "805 2 is eating"]);
        let verdict = check_death_timing(&t, &spec(2, 800, 200, 200));
        assert!(verdict.is_failure());
        assert!(verdict.explanation.contains("after the death"));
        assert_eq!(verdict.offending.len(), 2);
    }

    #[test]
    fn test_death_timing_rejects_second_death() {
        let t = timeline(&["800 1 died", "800 2 died"]);
        let verdict = check_death_timing(&t, &spec(2, 800, 200, 200));
        assert!(verdict.is_failure());
        assert!(verdict.explanation.contains("2 deaths"));
    }

    #[test]
    fn test_death_timing_without_death() {
        let t = timeline(&valid_three());
        assert!(check_death_timing(&t, &spec(3, 800, 100, 100)).is_pass());
    }

    fn meal_log(n: u32, meals: u32) -> Vec<String> {
        let mut lines = Vec::new();
        let mut ts = 0;
        for _ in 0..meals {
            for id in 1..=n {
                lines.push(format!("{} {} has taken a fork", ts, id));
                lines.push(format!("{} {} has taken a fork", ts, id));
                lines.push(format!("{} {} is eating", ts, id));
                ts += 10;
                lines.push(format!("{} {} is sleeping", ts, id));
            }
        }
        lines
    }

    fn owned(lines: &[String]) -> Timeline {
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        timeline(&refs)
    }

    #[test]
    fn test_meal_count_passes_exactly() {
        let t = owned(&meal_log(3, 2));
        let verdict = check_meal_count(&t, &meal_spec(3, 2));
        assert!(verdict.is_pass(), "{}", verdict);
    }

    #[test]
    fn test_meal_count_short_and_extra() {
        let t = owned(&meal_log(3, 2));
        let short = check_meal_count(&t, &meal_spec(3, 3));
        assert!(short.is_failure());
        assert!(short.explanation.contains("below the limit"));

        let extra = check_meal_count(&t, &meal_spec(3, 1));
        assert!(extra.is_failure());
        assert!(extra.explanation.contains("beyond the limit"));

        let lenient = check_meal_count(&t, &meal_spec(3, 1).with_meal_policy(MealPolicy::AtLeast));
        // Second round starts after everyone already ate once.
        assert!(lenient.is_failure());
        assert!(lenient.explanation.contains("started after everyone"));
    }

    #[test]
    fn test_meal_count_fails_on_death() {
        let mut lines = meal_log(2, 1);
        lines.push("900 1 died".to_string());
        let verdict = check_meal_count(&owned(&lines), &meal_spec(2, 1));
        assert!(verdict.is_failure());
    }

    #[test]
    fn test_meal_count_not_applicable_without_limit() {
        let t = timeline(&valid_three());
        let verdict = check_meal_count(&t, &spec(3, 800, 100, 100));
        assert!(verdict.is_pass());
        assert!(verdict.explanation.starts_with("not applicable"));
    }

    #[test]
    fn test_meal_count_rejects_output_after_the_limit() {
        let mut lines = meal_log(3, 1);
        lines.push("950 2 has taken a fork".to_string());
        lines.push("5000 3 is thinking".to_string());

        let verdict = check_meal_count(&owned(&lines), &meal_spec(3, 1));
        assert!(verdict.is_failure());
        assert!(verdict.explanation.contains("should have stopped at 420ms"), "{}", verdict);
        assert_eq!(verdict.offending.len(), 2);
        assert_eq!(verdict.offending[0].timestamp_ms, 950);
    }

    #[test]
    fn test_meal_count_allows_wind_down_lines() {
        // Everyone reached one meal at 20ms; the last sleep and a late
        // thinking line land inside 20 + 2 * 200.
        let mut lines = meal_log(3, 1);
        lines.push("220 3 is thinking".to_string());
        lines.push("420 1 is thinking".to_string());

        let verdict = check_meal_count(&owned(&lines), &meal_spec(3, 1));
        assert!(verdict.is_pass(), "{}", verdict);
    }

    #[test]
    fn test_exclusivity_thinking_breaks_fork_pair() {
        // 1 takes a fork, gives up and thinks, then takes one more: it
        // never held two at once, so 2 eating meanwhile is fine.
        let t = timeline(&[
            "0 1 has taken a fork",
            "10 1 is thinking",
            "20 1 has taken a fork",
            "20 2 has taken a fork",
            "20 2 has taken a fork",
            "20 2 is eating",
            "120 2 is sleeping",
        ]);
        let verdict = check_exclusivity(&t, &spec(3, 800, 100, 100));
        assert!(verdict.is_pass(), "{}", verdict);

        let without_thinking = timeline(&[
            "0 1 has taken a fork",
            "20 1 has taken a fork",
            "20 2 has taken a fork",
            "20 2 has taken a fork",
            "20 2 is eating",
            "120 2 is sleeping",
        ]);
        assert!(check_exclusivity(&without_thinking, &spec(3, 800, 100, 100)).is_failure());
    }

    #[test]
    fn test_fairness_warns_on_long_gap() {
        // Philosopher 2 eats at 0 and then not again until 500 with ttd 200.
        let t = timeline(&[
            "0 1 is eating",
            "0 2 is eating",
            "150 1 is eating",
            "300 1 is eating",
            "450 1 is eating",
            "500 2 is eating",
        ]);
        let verdict = check_fairness(&t, &spec(2, 200, 50, 50));
        assert_eq!(verdict.outcome, Outcome::Warn);
        assert!(verdict.explanation.contains("philosopher 2 waited 500ms"));
    }

    #[test]
    fn test_fairness_counts_the_tail() {
        let t = timeline(&["0 1 is eating", "0 2 is eating", "100 1 is eating", "900 1 is eating"]);
        let verdict = check_fairness(&t, &spec(2, 400, 50, 50));
        assert!(verdict.is_warning());
        assert!(verdict.explanation.contains("philosopher 2"));
    }

    #[test]
    fn test_fairness_respects_configured_factor() {
        let t = timeline(&["0 1 is eating", "500 1 is eating"]);
        let strict = spec(1, 200, 50, 50);
        assert!(check_fairness(&t, &strict).is_warning());
        assert!(check_fairness(&t, &strict.with_fairness_gap_factor(3.0)).is_pass());
    }

    #[test]
    fn test_fairness_skipped_on_death() {
        let t = timeline(&["0 1 is thinking", "5000 1 died"]);
        assert!(check_fairness(&t, &spec(2, 200, 50, 50)).is_pass());
    }

    #[test]
    fn test_progress_deadlock_and_uneven() {
        let deadlock = timeline(&["0 1 is eating", "900 1 is eating"]);
        let verdict = check_progress(&deadlock, &spec(2, 800, 100, 100));
        assert!(verdict.is_failure());
        assert!(verdict.explanation.contains("never ate"));

        let too_short = timeline(&["0 1 is eating", "100 1 is sleeping"]);
        assert!(check_progress(&too_short, &spec(2, 800, 100, 100)).is_pass());

        let uneven = timeline(&[
            "0 1 is eating",
            "0 3 is eating",
            "100 1 is eating",
            "100 3 is eating",
            "200 1 is eating",
            "200 2 is eating",
            "300 1 is eating",
            "300 3 is eating",
        ]);
        let verdict = check_progress(&uneven, &spec(3, 800, 100, 100));
        assert!(verdict.is_warning(), "{}", verdict);
    }

    #[test]
    fn test_run_checkers_follows_spec() {
        let t = timeline(&valid_three());
        let s = spec(3, 800, 100, 100).with_checkers(CheckerKind::safety());
        let verdicts = run_checkers(&t, &s);
        assert_eq!(verdicts.len(), 3);
        assert_eq!(worst_outcome(&verdicts), Outcome::Pass);
    }
}
