use crate::selector::Candidate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub position: usize,
    pub candidate: Candidate,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl TimelineEntry {
    pub fn start_formatted(&self) -> String {
        format_hms(self.start_seconds)
    }

    pub fn end_formatted(&self) -> String {
        format_hms(self.end_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
    pub gap_seconds: f64,
}

impl Timeline {
    /// End offset of the last entry, i.e. the full runtime including gaps.
    pub fn total_seconds(&self) -> f64 {
        self.entries.last().map(|e| e.end_seconds).unwrap_or(0.0)
    }
}

/// Lays the selection out back to back with `gap_seconds` of silence between
/// neighbours. `selection` must already be in logical order.
pub fn build_timeline(selection: &[Candidate], gap_seconds: f64) -> Timeline {
    let mut entries = Vec::with_capacity(selection.len());
    let mut cursor = 0.0;

    for (i, candidate) in selection.iter().enumerate() {
        let start = cursor;
        let end = start + candidate.duration_seconds;
        entries.push(TimelineEntry {
            position: i + 1,
            candidate: candidate.clone(),
            start_seconds: start,
            end_seconds: end,
        });
        cursor = end + gap_seconds;
    }

    Timeline {
        entries,
        gap_seconds,
    }
}

/// `HH:MM:SS`, truncating fractional seconds. Hours are not wrapped at 24 and
/// simply widen past two digits.
pub fn format_hms(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0).floor() as u64;
    let minutes = ((seconds % 3600.0) / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
