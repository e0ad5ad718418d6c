//! Timeline Store
//! ==============
//!
//! Append-only, timestamp-ordered record of one scenario run.
//!
//! The timeline has a single writer: the reader task that consumes the
//! subject's stdout owns it while the run is live and hands it back to the
//! driver once the run reaches a terminal state. Checkers only ever see a
//! `&Timeline` after that hand-over, so there is no concurrent read/append.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{Event, EventKind, PhilosopherId};
use crate::parser::{ParseFailure, ParsedLine};

/// An event whose timestamp went backwards.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("timestamp went backwards: {} after {previous_ms}ms", event.to_line())]
pub struct OrderingViolation {
    /// Rejected event
    pub event: Event,
    /// Timestamp of the last accepted event
    pub previous_ms: u64,
}

/// Ordered record of a single run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "TimelineRecord")]
pub struct Timeline {
    /// Accepted events in arrival order
    events: Vec<Event>,

    /// Lines that failed to decode
    parse_failures: Vec<ParseFailure>,

    /// Events rejected for going back in time
    ordering_violations: Vec<OrderingViolation>,

    /// Tolerated non-event lines
    banners: Vec<String>,

    /// Running meal counter per philosopher, rebuilt from `events`
    #[serde(skip)]
    meals: HashMap<PhilosopherId, u32>,
}

/// Serialized form of a [`Timeline`]; meal counters are derived, not stored.
#[derive(Deserialize)]
struct TimelineRecord {
    events: Vec<Event>,
    #[serde(default)]
    parse_failures: Vec<ParseFailure>,
    #[serde(default)]
    ordering_violations: Vec<OrderingViolation>,
    #[serde(default)]
    banners: Vec<String>,
}

impl From<TimelineRecord> for Timeline {
    fn from(record: TimelineRecord) -> Self {
        let mut meals = HashMap::new();
        for event in &record.events {
            if event.kind == EventKind::StartedEating {
                *meals.entry(event.philosopher).or_insert(0) += 1;
            }
        }
        Self {
            events: record.events,
            parse_failures: record.parse_failures,
            ordering_violations: record.ordering_violations,
            banners: record.banners,
            meals,
        }
    }
}

impl Timeline {
    /// Creates an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a timeline from already-decoded events, recording any
    /// ordering violations along the way.
    pub fn from_events<I: IntoIterator<Item = Event>>(events: I) -> Self {
        let mut timeline = Self::new();
        for event in events {
            if let Err(violation) = timeline.append(event) {
                timeline.ordering_violations.push(violation);
            }
        }
        timeline
    }

    /// Appends an event in arrival order.
    ///
    /// Fails if the event's timestamp is strictly lower than the previous
    /// accepted one. Equal timestamps are allowed. A rejected event is not
    /// stored; use [`Timeline::ingest`] to keep it as evidence.
    pub fn append(&mut self, mut event: Event) -> Result<&Event, OrderingViolation> {
        if let Some(last) = self.events.last() {
            if event.timestamp_ms < last.timestamp_ms {
                return Err(OrderingViolation {
                    event,
                    previous_ms: last.timestamp_ms,
                });
            }
        }

        event.sequence = self.events.len();
        event.meal_count = None;
        if event.kind == EventKind::StartedEating {
            let meals = self.meals.entry(event.philosopher).or_insert(0);
            *meals += 1;
            event.meal_count = Some(*meals);
        }

        self.events.push(event);
        Ok(&self.events[self.events.len() - 1])
    }

    /// Records one parsed stdout line. Returns the accepted event, if any.
    pub fn ingest(&mut self, parsed: ParsedLine) -> Option<&Event> {
        match parsed {
            ParsedLine::Event(event) => match self.append(event).map(|_| ()) {
                Ok(()) => self.events.last(),
                Err(violation) => {
                    self.ordering_violations.push(violation);
                    None
                }
            },
            ParsedLine::Banner(text) => {
                self.banners.push(text);
                None
            }
            ParsedLine::Failure(failure) => {
                self.parse_failures.push(failure);
                None
            }
        }
    }

    /// Lazy, restartable sequence of one philosopher's events.
    pub fn events_for(
        &self,
        philosopher: PhilosopherId,
    ) -> impl Iterator<Item = &Event> + Clone + '_ {
        self.events.iter().filter(move |e| e.philosopher == philosopher)
    }

    /// All events of the given kind, in arrival order.
    pub fn events_of_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + Clone + '_ {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Most recent accepted event.
    pub fn last_event_overall(&self) -> Option<&Event> {
        self.events.last()
    }

    /// All accepted events.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events reporting a death.
    pub fn death_events(&self) -> Vec<&Event> {
        self.events_of_kind(EventKind::Died).collect()
    }

    /// First death, if any.
    pub fn first_death(&self) -> Option<&Event> {
        self.events_of_kind(EventKind::Died).next()
    }

    /// Number of `StartedEating` events seen for a philosopher.
    pub fn meals_eaten(&self, philosopher: PhilosopherId) -> u32 {
        self.meals.get(&philosopher).copied().unwrap_or(0)
    }

    /// Distinct philosopher ids that appear in the stream, sorted.
    pub fn philosopher_ids(&self) -> Vec<PhilosopherId> {
        let mut ids: Vec<PhilosopherId> = self.events.iter().map(|e| e.philosopher).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Lines that failed to decode.
    pub fn parse_failures(&self) -> &[ParseFailure] {
        &self.parse_failures
    }

    /// Events rejected for going back in time.
    pub fn ordering_violations(&self) -> &[OrderingViolation] {
        &self.ordering_violations
    }

    /// Tolerated banner lines.
    pub fn banners(&self) -> &[String] {
        &self.banners
    }

    /// Timestamp of the last accepted event (0 when empty).
    pub fn span_ms(&self) -> u64 {
        self.last_event_overall().map(|e| e.timestamp_ms).unwrap_or(0)
    }

    /// Number of accepted events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if no event was accepted.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LineParser;
    use proptest::prelude::*;

    fn ev(ts: u64, id: u32, kind: EventKind) -> Event {
        Event::new(ts, id, kind)
    }

    #[test]
    fn test_append_assigns_sequence_and_meals() {
        let mut timeline = Timeline::new();
        timeline.append(ev(0, 1, EventKind::ForkAcquired)).unwrap();
        timeline.append(ev(0, 1, EventKind::StartedEating)).unwrap();
        timeline.append(ev(200, 1, EventKind::StartedSleeping)).unwrap();
        let second = timeline.append(ev(400, 1, EventKind::StartedEating)).unwrap();

        assert_eq!(second.sequence, 3);
        assert_eq!(second.meal_count, Some(2));
        assert_eq!(timeline.meals_eaten(PhilosopherId(1)), 2);
        assert_eq!(timeline.meals_eaten(PhilosopherId(2)), 0);
    }

    #[test]
    fn test_append_rejects_backwards_timestamp() {
        let mut timeline = Timeline::new();
        timeline.append(ev(100, 1, EventKind::StartedThinking)).unwrap();
        timeline.append(ev(100, 2, EventKind::StartedThinking)).unwrap();

        let violation = timeline.append(ev(99, 3, EventKind::StartedThinking)).unwrap_err();
        assert_eq!(violation.previous_ms, 100);
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn test_ingest_keeps_evidence() {
        let parser = LineParser::new();
        let mut timeline = Timeline::new();

        for (n, line) in ["10 1 is thinking", "oops", "5 2 is thinking"].iter().enumerate() {
            timeline.ingest(parser.parse(n + 1, line));
        }

        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.parse_failures().len(), 1);
        assert_eq!(timeline.parse_failures()[0].line_number, 2);
        assert_eq!(timeline.ordering_violations().len(), 1);
    }

    #[test]
    fn test_events_for_is_restartable() {
        let timeline = Timeline::from_events(vec![
            ev(0, 1, EventKind::ForkAcquired),
            ev(0, 2, EventKind::StartedThinking),
            ev(0, 1, EventKind::ForkAcquired),
        ]);

        let iter = timeline.events_for(PhilosopherId(1));
        assert_eq!(iter.clone().count(), 2);
        assert_eq!(iter.count(), 2);
        assert_eq!(timeline.last_event_overall().unwrap().philosopher, PhilosopherId(1));
        assert_eq!(timeline.philosopher_ids(), vec![PhilosopherId(1), PhilosopherId(2)]);
    }

    #[test]
    fn test_empty_timeline() {
        let timeline = Timeline::new();
        assert!(timeline.is_empty());
        assert!(timeline.last_event_overall().is_none());
        assert_eq!(timeline.span_ms(), 0);
    }

    #[test]
    fn test_json_round_trip_rebuilds_meal_counts() {
        let parser = LineParser::new();
        let mut timeline = Timeline::new();
        for (n, line) in ["0 1 is eating", "200 1 is sleeping", "400 1 is eating", "bad"]
            .iter()
            .enumerate()
        {
            timeline.ingest(parser.parse(n + 1, line));
        }

        let json = serde_json::to_string(&timeline).unwrap();
        let back: Timeline = serde_json::from_str(&json).unwrap();

        assert_eq!(back.events(), timeline.events());
        assert_eq!(back.parse_failures().len(), 1);
        assert_eq!(back.meals_eaten(PhilosopherId(1)), 2);
        assert_eq!(back.meals_eaten(PhilosopherId(2)), 0);
    }

    proptest! {
        #[test]
        fn prop_accepted_timestamps_never_decrease(
            stamps in proptest::collection::vec(0u64..1_000, 0..200)
        ) {
            let events = stamps.iter().map(|ts| ev(*ts, 1, EventKind::StartedThinking));
            let timeline = Timeline::from_events(events);

            for pair in timeline.events().windows(2) {
                prop_assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
            }
            prop_assert_eq!(
                timeline.len() + timeline.ordering_violations().len(),
                stamps.len()
            );
        }
    }
}
