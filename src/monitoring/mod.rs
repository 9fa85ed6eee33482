//! Run Monitoring Module
//!
//! Provides the per-run execution timeline used for reports
//! and Gantt charts.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Step start/retry/end events

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
