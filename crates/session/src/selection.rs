use std::collections::BTreeSet;

use renderer::TimeRange;
use timeline::{ClipId, Project, TrackId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub clips: BTreeSet<ClipId>,
    pub track: Option<TrackId>,
    pub range: Option<TimeRange>,
}

impl Selection {
    /// Select `clip`; with `additive` the clip toggles in the existing set.
    pub fn select_clip(&mut self, clip: ClipId, additive: bool) {
        if !additive {
            self.clips.clear();
            self.clips.insert(clip);
        } else if !self.clips.remove(&clip) {
            self.clips.insert(clip);
        }
    }

    pub fn is_empty(&self) -> bool { self.clips.is_empty() && self.track.is_none() && self.range.is_none() }

    pub fn clear(&mut self) { *self = Self::default(); }

    /// Forget ids the project no longer has.
    pub fn prune(&mut self, project: &Project) {
        self.clips.retain(|id| project.clip(*id).is_some());
        if self.track.is_some_and(|t| project.track(t).is_none()) {
            self.track = None;
        }
    }

    /// The explicit time range, else the span of the selected clips.
    pub fn span(&self, project: &Project) -> Option<TimeRange> {
        if let Some(range) = self.range {
            return Some(range);
        }
        let clips: Vec<_> = self.clips.iter().filter_map(|id| project.clip(*id)).collect();
        let start = clips.iter().map(|c| c.start).reduce(f64::min)?;
        let end = clips.iter().map(|c| c.end()).reduce(f64::max)?;
        Some(TimeRange::new(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_selection_toggles() {
        let (a, b) = (ClipId::new(), ClipId::new());
        let mut s = Selection::default();
        s.select_clip(a, false);
        s.select_clip(b, true);
        assert_eq!(s.clips.len(), 2);
        s.select_clip(a, true);
        assert_eq!(s.clips.iter().copied().collect::<Vec<_>>(), vec![b]);
        s.select_clip(a, false);
        assert_eq!(s.clips.len(), 1);
        s.clear();
        assert!(s.is_empty());
    }
}
