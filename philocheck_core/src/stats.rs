//! Per-philosopher meal statistics for reports.

use serde::{Deserialize, Serialize};

use crate::event::{EventKind, PhilosopherId};
use crate::timeline::Timeline;

/// What one philosopher did during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhilosopherStats {
    pub philosopher: PhilosopherId,
    pub meals: u32,
    /// Share of all meals, in percent
    pub share_percent: f64,
    /// Mean time between consecutive meal starts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_interval_ms: Option<f64>,
    /// Last reported action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_state: Option<EventKind>,
}

/// Meal statistics for a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealStatistics {
    pub span_ms: u64,
    pub total_meals: u64,
    pub average_meals: f64,
    pub philosophers: Vec<PhilosopherStats>,
}

impl MealStatistics {
    /// Computes statistics for philosophers `1..=count`.
    pub fn from_timeline(timeline: &Timeline, count: u32) -> Self {
        let total_meals: u64 = (1..=count)
            .map(|id| timeline.meals_eaten(PhilosopherId(id)) as u64)
            .sum();

        let philosophers = (1..=count)
            .map(PhilosopherId)
            .map(|id| {
                let meals = timeline.meals_eaten(id);
                let starts: Vec<u64> = timeline
                    .events_for(id)
                    .filter(|e| e.kind == EventKind::StartedEating)
                    .map(|e| e.timestamp_ms)
                    .collect();
                let average_interval_ms = if starts.len() > 1 {
                    let intervals: u64 = starts.windows(2).map(|w| w[1] - w[0]).sum();
                    Some(intervals as f64 / (starts.len() - 1) as f64)
                } else {
                    None
                };
                PhilosopherStats {
                    philosopher: id,
                    meals,
                    share_percent: if total_meals > 0 {
                        meals as f64 * 100.0 / total_meals as f64
                    } else {
                        0.0
                    },
                    average_interval_ms,
                    last_state: timeline.events_for(id).last().map(|e| e.kind),
                }
            })
            .collect();

        Self {
            span_ms: timeline.span_ms(),
            total_meals,
            average_meals: if count > 0 {
                total_meals as f64 / count as f64
            } else {
                0.0
            },
            philosophers,
        }
    }

    /// Renders a fixed-width table.
    pub fn render(&self) -> String {
        let mut out = format!(
            "  span {}ms, {} meal(s), {:.2} per philosopher\n",
            self.span_ms, self.total_meals, self.average_meals
        );
        out.push_str(&format!(
            "  {:<5} {:<7} {:<9} {:<14} {}\n",
            "ID", "Meals", "% total", "Avg gap (ms)", "Last state"
        ));
        for p in &self.philosophers {
            let interval = p
                .average_interval_ms
                .map(|ms| format!("{:.2}", ms))
                .unwrap_or_else(|| "n/a".to_string());
            let state = p.last_state.map(|k| k.phrase()).unwrap_or("-");
            out.push_str(&format!(
                "  {:<5} {:<7} {:<9.2} {:<14} {}\n",
                p.philosopher, p.meals, p.share_percent, interval, state
            ));
        }
        out
    }
}
