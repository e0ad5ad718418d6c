//! Event model for observed simulation output.
//!
//! One [`Event`] corresponds to one well-formed output line of the subject:
//!
//! ```text
//! <timestamp_ms> <philosopher_id> <action_phrase>
//! ```

use serde::{Deserialize, Serialize};

/// Identifier of a philosopher as printed by the subject (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhilosopherId(pub u32);

impl PhilosopherId {
    /// Returns the raw numeric id.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Returns true if the id lies in `[1, count]`.
    pub fn in_range(&self, count: u32) -> bool {
        self.0 >= 1 && self.0 <= count
    }

    /// Returns the two seat neighbours of this philosopher at a table of `count`.
    ///
    /// Seats wrap around, so philosopher 1 sits next to philosopher `count`.
    /// With fewer than two philosophers there is nobody to share a fork with.
    pub fn neighbours(&self, count: u32) -> Vec<PhilosopherId> {
        if count < 2 || !self.in_range(count) {
            return Vec::new();
        }
        let left = if self.0 == 1 { count } else { self.0 - 1 };
        let right = if self.0 == count { 1 } else { self.0 + 1 };
        if left == right {
            vec![PhilosopherId(left)]
        } else {
            vec![PhilosopherId(left), PhilosopherId(right)]
        }
    }
}

impl std::fmt::Display for PhilosopherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of action reported on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `has taken a fork`
    ForkAcquired,

    /// `is eating`
    StartedEating,

    /// `is sleeping`
    StartedSleeping,

    /// `is thinking`
    StartedThinking,

    /// `died`
    Died,
}

impl EventKind {
    /// All kinds, in the order the subject cycles through them.
    pub const ALL: [EventKind; 5] = [
        EventKind::ForkAcquired,
        EventKind::StartedEating,
        EventKind::StartedSleeping,
        EventKind::StartedThinking,
        EventKind::Died,
    ];

    /// Returns the exact action phrase the subject prints for this kind.
    pub fn phrase(&self) -> &'static str {
        match self {
            EventKind::ForkAcquired => "has taken a fork",
            EventKind::StartedEating => "is eating",
            EventKind::StartedSleeping => "is sleeping",
            EventKind::StartedThinking => "is thinking",
            EventKind::Died => "died",
        }
    }

    /// Maps an action phrase back to its kind. Matching is exact.
    pub fn from_phrase(phrase: &str) -> Option<EventKind> {
        Self::ALL.iter().copied().find(|kind| kind.phrase() == phrase)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.phrase())
    }
}

/// One observed, successfully decoded output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Milliseconds since the subject's simulation start
    pub timestamp_ms: u64,

    /// Philosopher the line is about
    pub philosopher: PhilosopherId,

    /// Reported action
    pub kind: EventKind,

    /// Meal number for `StartedEating` events (derived by the timeline)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_count: Option<u32>,

    /// Arrival index in the accepted stream (assigned by the timeline)
    pub sequence: usize,
}

impl Event {
    /// Creates an event as decoded from a line, before it is appended.
    pub fn new(timestamp_ms: u64, philosopher: u32, kind: EventKind) -> Self {
        Self {
            timestamp_ms,
            philosopher: PhilosopherId(philosopher),
            kind,
            meal_count: None,
            sequence: 0,
        }
    }

    /// Renders the event back into the subject's line format.
    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.timestamp_ms, self.philosopher, self.kind.phrase())
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} [{}]", self.sequence + 1, self.to_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_mapping_is_bijective() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_phrase(kind.phrase()), Some(kind));
        }
        assert_eq!(EventKind::from_phrase("is  eating"), None);
        assert_eq!(EventKind::from_phrase("Died"), None);
    }

    #[test]
    fn test_neighbours_wrap_around() {
        assert_eq!(
            PhilosopherId(1).neighbours(5),
            vec![PhilosopherId(5), PhilosopherId(2)]
        );
        assert_eq!(
            PhilosopherId(5).neighbours(5),
            vec![PhilosopherId(4), PhilosopherId(1)]
        );
    }

    #[test]
    fn test_neighbours_small_tables() {
        assert!(PhilosopherId(1).neighbours(1).is_empty());
        assert_eq!(PhilosopherId(1).neighbours(2), vec![PhilosopherId(2)]);
        assert_eq!(PhilosopherId(2).neighbours(2), vec![PhilosopherId(1)]);
    }

    #[test]
    fn test_event_line_rendering() {
        let event = Event::new(200, 3, EventKind::StartedSleeping);
        assert_eq!(event.to_line(), "200 3 is sleeping");
    }
}
