//! Multi-track timeline model with invariant-checked edits and undo history.

pub mod command;
mod edit;
pub mod effects;
pub mod error;
pub mod history;
pub mod ids;
pub mod invariants;
pub mod ripple;
pub mod types;

pub use command::TimelineCommand;
pub use effects::{Corner, Filter, FilterKind, Transition, TransitionKind, WipeDirection};
pub use error::TimelineError;
pub use history::{CommandHistory, HistoryEntry, DEFAULT_HISTORY_DEPTH};
pub use ids::{ClipId, FilterId, ProjectId, TrackId};
pub use invariants::{check_project, clips_needing_remediation};
pub use ripple::plan_ripple_move;
pub use types::{AudioCodec, Clip, Container, OutputSettings, Project, Track, TrackFlags, TrackKind, VideoCodec, TIME_EPSILON};

/// Round `t` to the nearest multiple of `grid`. A non-positive grid disables snapping.
pub fn snap_to_grid(t: f64, grid: f64) -> f64 {
    if grid > 0.0 && grid.is_finite() { (t / grid).round() * grid } else { t }
}

/// `m:ss` below an hour, `h:mm:ss` from there on. Fractions are truncated.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds as u64 } else { 0 };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 { format!("{h}:{m:02}:{s:02}") } else { format!("{m}:{s:02}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapping() {
        assert!((snap_to_grid(1.26, 0.1) - 1.3).abs() < 1e-9);
        assert_eq!(snap_to_grid(1.26, 0.0), 1.26);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(65.9), "1:05");
        assert_eq!(format_duration(3725.0), "1:02:05");
        assert_eq!(format_duration(f64::NAN), "0:00");
    }
}
