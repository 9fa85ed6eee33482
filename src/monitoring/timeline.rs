//! Execution Timeline
//!
//! Records step start/retry/end events during a run for
//! reports and Gantt charts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Width of the Gantt chart bar area in characters.
const CHART_WIDTH: f64 = 50.0;

/// Type of timeline event.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Step was dispatched
    Started,
    /// An attempt failed and another one follows
    Retrying,
    /// Step completed successfully
    Completed,
    /// Step failed
    Failed,
    /// Step was never dispatched
    Skipped,
}

impl EventType {
    fn ends_step(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A single event in the execution timeline.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimelineEvent {
    /// Name of the step
    pub step: String,
    /// Type of event
    pub event_type: EventType,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Attempt number, for events tied to an attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

/// Tracks the execution timeline of one workflow run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: DateTime<Utc>,
}

impl ExecutionTimeline {
    /// Creates a timeline anchored at `start_time`.
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            events: Vec::new(),
            start_time,
        }
    }

    /// Records an event for a step.
    pub fn add_event(
        &mut self,
        step: impl Into<String>,
        event_type: EventType,
        timestamp: DateTime<Utc>,
    ) {
        self.events.push(TimelineEvent {
            step: step.into(),
            event_type,
            timestamp,
            attempt: None,
        });
    }

    /// Records an event tied to a specific attempt.
    pub fn add_attempt_event(
        &mut self,
        step: impl Into<String>,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        attempt: u32,
    ) {
        self.events.push(TimelineEvent {
            step: step.into(),
            event_type,
            timestamp,
            attempt: Some(attempt),
        });
    }

    /// Appends events recorded elsewhere, keeping chronological order.
    pub fn extend(&mut self, events: impl IntoIterator<Item = TimelineEvent>) {
        self.events.extend(events);
        self.events.sort_by_key(|e| e.timestamp);
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Returns the events recorded for one step.
    pub fn events_for<'a>(&'a self, step: &'a str) -> impl Iterator<Item = &'a TimelineEvent> + 'a {
        self.events.iter().filter(move |e| e.step == step)
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Milliseconds between the timeline start and `at`.
    fn offset_ms(&self, at: DateTime<Utc>) -> i64 {
        (at - self.start_time).num_milliseconds().max(0)
    }

    /// Generates an ASCII Gantt chart representation.
    ///
    /// Each step is shown as a bar indicating when it ran
    /// relative to the span ending at `end_time`.
    pub fn gantt_chart(&self, end_time: DateTime<Utc>) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self.offset_ms(end_time);
        if total_time == 0 {
            return output;
        }

        let scale = CHART_WIDTH / total_time as f64;

        let mut step_times: HashMap<&str, (i64, i64)> = HashMap::new();
        for event in &self.events {
            let elapsed = self.offset_ms(event.timestamp);
            match event.event_type {
                EventType::Started => {
                    step_times.entry(event.step.as_str()).or_insert((elapsed, 0)).0 = elapsed;
                }
                t if t.ends_step() => {
                    if let Some(times) = step_times.get_mut(event.step.as_str()) {
                        times.1 = elapsed;
                    }
                }
                _ => {}
            }
        }

        let mut sorted_steps: Vec<_> = step_times.into_iter().collect();
        sorted_steps.sort_by_key(|(name, (start, _))| (*start, *name));

        for (step, (start, end)) in sorted_steps {
            if end >= start {
                let start_pos = (start as f64 * scale) as usize;
                let duration = ((end - start) as f64 * scale).max(1.0) as usize;

                let mut bar = " ".repeat(start_pos);
                bar.push_str(&"#".repeat(duration));

                output.push_str(&format!(
                    "{:12} |{}| ({} ms)\n",
                    truncate(step, 12),
                    bar,
                    end - start
                ));
            }
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }

    /// Returns step durations in milliseconds, from dispatch to final outcome.
    pub fn get_durations(&self) -> HashMap<String, i64> {
        let mut starts: HashMap<&str, DateTime<Utc>> = HashMap::new();
        let mut durations = HashMap::new();

        for event in &self.events {
            match event.event_type {
                EventType::Started => {
                    starts.insert(event.step.as_str(), event.timestamp);
                }
                t if t.ends_step() => {
                    if let Some(start) = starts.get(event.step.as_str()) {
                        durations.insert(
                            event.step.clone(),
                            (event.timestamp - *start).num_milliseconds(),
                        );
                    }
                }
                _ => {}
            }
        }

        durations
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Pads or truncates a step name to a fixed width.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(start: DateTime<Utc>, ms: i64) -> DateTime<Utc> {
        start + Duration::milliseconds(ms)
    }

    #[test]
    fn test_timeline_creation() {
        let timeline = ExecutionTimeline::new(Utc::now());
        assert!(timeline.get_events().is_empty());
    }

    #[test]
    fn test_get_durations() {
        let start = Utc::now();
        let mut timeline = ExecutionTimeline::new(start);
        timeline.add_event("step1", EventType::Started, at(start, 0));
        timeline.add_attempt_event("step1", EventType::Retrying, at(start, 20), 1);
        timeline.add_event("step1", EventType::Completed, at(start, 50));

        let durations = timeline.get_durations();
        assert_eq!(durations.get("step1"), Some(&50));
    }

    #[test]
    fn test_get_durations_only_started() {
        let start = Utc::now();
        let mut timeline = ExecutionTimeline::new(start);
        timeline.add_event("step1", EventType::Started, start);

        assert!(!timeline.get_durations().contains_key("step1"));
    }

    #[test]
    fn test_gantt_chart_generation() {
        let start = Utc::now();
        let mut timeline = ExecutionTimeline::new(start);
        timeline.add_event("step1", EventType::Started, at(start, 0));
        timeline.add_event("step1", EventType::Completed, at(start, 50));
        timeline.add_event("step2", EventType::Started, at(start, 50));
        timeline.add_event("step2", EventType::Failed, at(start, 100));
        timeline.add_event("step3", EventType::Skipped, at(start, 100));

        let chart = timeline.gantt_chart(at(start, 100));
        assert!(chart.contains("step1"));
        assert!(chart.contains("step2"));
        assert!(!chart.contains("step3"));
        assert!(chart.contains("Total: 100 ms"));
    }

    #[test]
    fn test_gantt_chart_empty() {
        let start = Utc::now();
        let timeline = ExecutionTimeline::new(start);
        let chart = timeline.gantt_chart(start);
        assert!(chart.contains("Timeline"));
        assert!(!chart.contains("Total"));
    }

    #[test]
    fn test_extend_keeps_order() {
        let start = Utc::now();
        let mut timeline = ExecutionTimeline::new(start);
        timeline.add_event("a", EventType::Started, at(start, 10));

        let mut other = ExecutionTimeline::new(start);
        other.add_event("b", EventType::Started, at(start, 5));
        timeline.extend(other.get_events().to_vec());

        let names: Vec<_> = timeline.get_events().iter().map(|e| e.step.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(timeline.events_for("a").count(), 1);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 8), "short   ");
        assert_eq!(truncate("a_very_long_step_name", 12), "a_very_lo...");
    }
}
