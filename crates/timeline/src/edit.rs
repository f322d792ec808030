//! Invariant-checked mutators on [`Project`].
//!
//! Each mutator edits a copy of the affected track(s), validates the copy and
//! only then swaps it in, so a rejected call leaves the project untouched.

use media_io::MediaRegistry;
use tracing::debug;

use crate::effects::{Filter, FilterKind, Transition};
use crate::error::TimelineError;
use crate::ids::{ClipId, FilterId, TrackId};
use crate::invariants::{check_clip_fields, validate_track};
use crate::types::{Clip, OutputSettings, Project, Track, TrackFlags, TrackKind, TIME_EPSILON};

fn sort_clips(track: &mut Track) { track.clips.sort_by(|a, b| a.start.total_cmp(&b.start)); }

/// Reject `[start, end)` if it intersects any clip on `track` other than `moving`.
fn check_free(track: &Track, moving: ClipId, start: f64, end: f64) -> Result<(), TimelineError> {
    for other in track.clips.iter().filter(|c| c.id != moving) {
        if start < other.end() - TIME_EPSILON && other.start < end - TIME_EPSILON {
            return Err(TimelineError::Overlap { track: track.id, clip: moving, other: other.id });
        }
    }
    Ok(())
}

/// The asset must be probed, fit the track, and cover the trim window.
fn check_asset(assets: &MediaRegistry, clip: &Clip, track: TrackKind) -> Result<(), TimelineError> {
    let asset = assets.get(clip.asset_id).filter(|a| a.is_ready()).ok_or(TimelineError::AssetUnavailable(clip.asset_id))?;
    if !track.accepts(asset.kind) {
        return Err(TimelineError::KindMismatch { track, asset: asset.kind });
    }
    let limit = asset.duration().unwrap_or(0.0);
    if clip.trim_out > limit + TIME_EPSILON {
        return Err(TimelineError::InvalidTrim {
            clip: clip.id,
            trim_in: clip.trim_in,
            trim_out: clip.trim_out,
            reason: format!("asset is only {limit}s long"),
        });
    }
    Ok(())
}

impl Project {
    fn track_mut_index(&self, id: TrackId) -> Result<usize, TimelineError> { self.track_index(id).ok_or(TimelineError::TrackNotFound(id)) }

    fn clip_location(&self, id: ClipId) -> Result<(usize, usize), TimelineError> { self.locate_clip(id).ok_or(TimelineError::ClipNotFound(id)) }

    fn ensure_unused_clip_id(&self, id: ClipId) -> Result<(), TimelineError> {
        if self.locate_clip(id).is_some() { Err(TimelineError::DuplicateId(id.to_string())) } else { Ok(()) }
    }

    /// Run `edit` on a copy of an unlocked track, validate, then commit.
    fn edit_track<R>(&mut self, idx: usize, edit: impl FnOnce(&mut Track) -> Result<R, TimelineError>) -> Result<R, TimelineError> {
        let track = &self.tracks[idx];
        if track.flags.locked {
            return Err(TimelineError::TrackLocked(track.id));
        }
        let mut next = track.clone();
        let out = edit(&mut next)?;
        sort_clips(&mut next);
        validate_track(&next)?;
        self.tracks[idx] = next;
        Ok(out)
    }

    /// Run `edit` on the copy of a clip's track, handing it the clip's index.
    fn edit_clip<R>(&mut self, id: ClipId, edit: impl FnOnce(&mut Track, usize) -> Result<R, TimelineError>) -> Result<R, TimelineError> {
        let (ti, ci) = self.clip_location(id)?;
        self.edit_track(ti, |t| edit(t, ci))
    }

    pub fn insert_track(&mut self, track: Track, index: usize) -> Result<(), TimelineError> {
        if index > self.tracks.len() {
            return Err(TimelineError::InvalidOrder(format!("track index {index} out of range")));
        }
        if self.track_index(track.id).is_some() {
            return Err(TimelineError::DuplicateId(track.id.to_string()));
        }
        // insertable tracks start unlocked; lock them afterwards with SetTrackFlags
        if track.flags.locked {
            return Err(TimelineError::TrackLocked(track.id));
        }
        if !track.volume.is_finite() || track.volume < 0.0 {
            return Err(TimelineError::InvalidVolume(track.volume));
        }
        for clip in &track.clips {
            self.ensure_unused_clip_id(clip.id)?;
        }
        validate_track(&track)?;
        debug!(track_id = %track.id, index, "track inserted");
        self.tracks.insert(index, track);
        Ok(())
    }

    /// Remove a track with everything on it, returning its old index.
    pub fn remove_track(&mut self, id: TrackId) -> Result<(usize, Track), TimelineError> {
        let idx = self.track_mut_index(id)?;
        if self.tracks[idx].flags.locked {
            return Err(TimelineError::TrackLocked(id));
        }
        Ok((idx, self.tracks.remove(idx)))
    }

    /// Reorder tracks to `order` (a permutation of current ids); returns the old order.
    pub fn reorder_tracks(&mut self, order: &[TrackId]) -> Result<Vec<TrackId>, TimelineError> {
        let old: Vec<TrackId> = self.tracks.iter().map(|t| t.id).collect();
        let mut sorted_new = order.to_vec();
        let mut sorted_old = old.clone();
        sorted_new.sort();
        sorted_old.sort();
        if sorted_new != sorted_old {
            return Err(TimelineError::InvalidOrder("track order must name every track exactly once".into()));
        }
        let mut tracks = std::mem::take(&mut self.tracks);
        for id in order {
            let pos = tracks.iter().position(|t| t.id == *id).ok_or(TimelineError::TrackNotFound(*id))?;
            self.tracks.push(tracks.swap_remove(pos));
        }
        Ok(old)
    }

    pub fn set_track_flags(&mut self, id: TrackId, flags: TrackFlags) -> Result<TrackFlags, TimelineError> {
        let idx = self.track_mut_index(id)?;
        Ok(std::mem::replace(&mut self.tracks[idx].flags, flags))
    }

    pub fn set_track_volume(&mut self, id: TrackId, volume: f32) -> Result<f32, TimelineError> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(TimelineError::InvalidVolume(volume));
        }
        let idx = self.track_mut_index(id)?;
        Ok(std::mem::replace(&mut self.tracks[idx].volume, volume))
    }

    pub fn set_output_settings(&mut self, settings: OutputSettings) -> Result<OutputSettings, TimelineError> {
        settings.validate().map_err(TimelineError::InvalidSettings)?;
        Ok(std::mem::replace(&mut self.settings, settings))
    }

    pub fn add_clip(&mut self, assets: &MediaRegistry, clip: Clip) -> Result<(), TimelineError> {
        self.ensure_unused_clip_id(clip.id)?;
        let ti = self.track_mut_index(clip.track_id)?;
        check_clip_fields(&clip)?;
        check_asset(assets, &clip, self.tracks[ti].kind)?;
        check_free(&self.tracks[ti], clip.id, clip.start, clip.end())?;
        debug!(clip_id = %clip.id, track_id = %clip.track_id, start = clip.start, "clip added");
        self.edit_track(ti, |t| {
            t.clips.push(clip);
            Ok(())
        })
    }

    /// Move a clip to `start` on `track_id` (same or another track).
    /// Overlaps are rejected, never resolved by pushing neighbours.
    pub fn move_clip(&mut self, assets: &MediaRegistry, id: ClipId, track_id: TrackId, start: f64) -> Result<(), TimelineError> {
        if !start.is_finite() || start < 0.0 {
            return Err(TimelineError::InvalidStart(start));
        }
        let (from, ci) = self.clip_location(id)?;
        let to = self.track_mut_index(track_id)?;
        let mut moved = self.tracks[from].clips[ci].clone();
        moved.start = start;
        moved.track_id = track_id;
        check_free(&self.tracks[to], id, start, moved.end())?;

        if from == to {
            return self.edit_track(from, |t| {
                t.clips[ci].start = start;
                Ok(())
            });
        }

        if self.tracks[from].flags.locked {
            return Err(TimelineError::TrackLocked(self.tracks[from].id));
        }
        if self.tracks[to].flags.locked {
            return Err(TimelineError::TrackLocked(track_id));
        }
        check_asset(assets, &moved, self.tracks[to].kind)?;
        let mut src = self.tracks[from].clone();
        let mut dst = self.tracks[to].clone();
        src.clips.remove(ci);
        dst.clips.push(moved);
        sort_clips(&mut dst);
        validate_track(&src)?;
        validate_track(&dst)?;
        self.tracks[from] = src;
        self.tracks[to] = dst;
        debug!(clip_id = %id, %track_id, start, "clip moved across tracks");
        Ok(())
    }

    /// Change the source window; the start stays put and the duration follows.
    pub fn trim_clip(&mut self, assets: &MediaRegistry, id: ClipId, trim_in: f64, trim_out: f64) -> Result<(), TimelineError> {
        let (ti, ci) = self.clip_location(id)?;
        let mut trimmed = self.tracks[ti].clips[ci].clone();
        trimmed.trim_in = trim_in;
        trimmed.trim_out = trim_out;
        check_clip_fields(&trimmed)?;
        check_asset(assets, &trimmed, self.tracks[ti].kind)?;
        check_free(&self.tracks[ti], id, trimmed.start, trimmed.end())?;
        self.edit_track(ti, |t| {
            t.clips[ci] = trimmed;
            Ok(())
        })
    }

    /// Split at timeline time `at`. The left half keeps the id, filters and
    /// incoming transition; the right half (`right_id`) starts bare. The
    /// outgoing transition is dropped and must be re-attached explicitly.
    pub fn split_clip(&mut self, id: ClipId, at: f64, right_id: ClipId) -> Result<(), TimelineError> {
        self.ensure_unused_clip_id(right_id)?;
        let (ti, ci) = self.clip_location(id)?;
        let original = &self.tracks[ti].clips[ci];
        if !(at > original.start && at < original.end()) {
            return Err(TimelineError::SplitOutOfRange { clip: id, at });
        }
        let split_point = original.source_time(at);
        if !(split_point > original.trim_in && split_point < original.trim_out) {
            return Err(TimelineError::SplitOutOfRange { clip: id, at });
        }
        let mut left = original.clone();
        left.trim_out = split_point;
        left.transition = None;
        let right = Clip {
            id: right_id,
            start: at,
            trim_in: split_point,
            filters: Vec::new(),
            transition: None,
            ..original.clone()
        };
        debug!(clip_id = %id, %right_id, at, split_point, "clip split");
        self.edit_track(ti, |t| {
            t.clips[ci] = left;
            t.clips.push(right);
            Ok(())
        })
    }

    /// Delete a clip along with any transition into or out of it.
    pub fn delete_clip(&mut self, id: ClipId) -> Result<Clip, TimelineError> {
        self.edit_clip(id, |t, ci| {
            let removed = t.clips.remove(ci);
            for clip in t.clips.iter_mut() {
                if clip.transition.as_ref().is_some_and(|tr| tr.to == id) {
                    clip.transition = None;
                }
            }
            Ok(removed)
        })
    }

    /// Copy a clip to sit immediately after the original.
    pub fn duplicate_clip(&mut self, id: ClipId, new_id: ClipId) -> Result<(), TimelineError> {
        self.ensure_unused_clip_id(new_id)?;
        let (ti, ci) = self.clip_location(id)?;
        let original = &self.tracks[ti].clips[ci];
        let copy = Clip { id: new_id, start: original.end(), transition: None, ..original.clone() };
        check_free(&self.tracks[ti], new_id, copy.start, copy.end())?;
        self.edit_track(ti, |t| {
            t.clips.push(copy);
            Ok(())
        })
    }

    pub fn set_speed(&mut self, id: ClipId, speed: f64) -> Result<(), TimelineError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(TimelineError::InvalidSpeed(speed));
        }
        let (ti, ci) = self.clip_location(id)?;
        let clip = &self.tracks[ti].clips[ci];
        let end = clip.start + (clip.trim_out - clip.trim_in) / speed;
        if !end.is_finite() {
            return Err(TimelineError::InvalidSpeed(speed));
        }
        check_free(&self.tracks[ti], id, clip.start, end)?;
        self.edit_track(ti, |t| {
            t.clips[ci].speed = speed;
            Ok(())
        })
    }

    pub fn set_clip_volume(&mut self, id: ClipId, volume: f32) -> Result<(), TimelineError> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(TimelineError::InvalidVolume(volume));
        }
        self.edit_clip(id, |t, ci| {
            t.clips[ci].volume = volume;
            Ok(())
        })
    }

    /// Insert a filter at `index` (appended when `None`).
    pub fn add_filter(&mut self, id: ClipId, filter: Filter, index: Option<usize>) -> Result<(), TimelineError> {
        self.edit_clip(id, |t, ci| {
            let filters = &mut t.clips[ci].filters;
            let at = index.unwrap_or(filters.len());
            if at > filters.len() {
                return Err(TimelineError::InvalidOrder(format!("filter index {at} out of range")));
            }
            filters.insert(at, filter);
            Ok(())
        })
    }

    pub fn remove_filter(&mut self, id: ClipId, filter_id: FilterId) -> Result<Filter, TimelineError> {
        self.edit_clip(id, |t, ci| {
            let filters = &mut t.clips[ci].filters;
            let pos = filters.iter().position(|f| f.id == filter_id).ok_or(TimelineError::FilterNotFound { clip: id, filter: filter_id })?;
            Ok(filters.remove(pos))
        })
    }

    /// Reorder filters to `order`, which must name each filter exactly once.
    pub fn reorder_filters(&mut self, id: ClipId, order: &[FilterId]) -> Result<(), TimelineError> {
        self.edit_clip(id, |t, ci| {
            let filters = &mut t.clips[ci].filters;
            if order.len() != filters.len() {
                return Err(TimelineError::InvalidOrder("filter order must name every filter exactly once".into()));
            }
            let mut pool = std::mem::take(filters);
            for fid in order {
                let pos = pool.iter().position(|f| f.id == *fid).ok_or(TimelineError::FilterNotFound { clip: id, filter: *fid })?;
                filters.push(pool.swap_remove(pos));
            }
            Ok(())
        })
    }

    /// Replace a filter's parameters. The filter kind itself cannot change.
    pub fn update_filter(&mut self, id: ClipId, filter_id: FilterId, kind: FilterKind) -> Result<(), TimelineError> {
        self.edit_clip(id, |t, ci| {
            let filter = t.clips[ci]
                .filters
                .iter_mut()
                .find(|f| f.id == filter_id)
                .ok_or(TimelineError::FilterNotFound { clip: id, filter: filter_id })?;
            if std::mem::discriminant(&filter.kind) != std::mem::discriminant(&kind) {
                return Err(TimelineError::InvalidFilter(format!("cannot turn a {} filter into {}", filter.kind.name(), kind.name())));
            }
            filter.kind = kind;
            Ok(())
        })
    }

    pub fn set_filter_enabled(&mut self, id: ClipId, filter_id: FilterId, enabled: bool) -> Result<(), TimelineError> {
        self.edit_clip(id, |t, ci| {
            let filter = t.clips[ci]
                .filters
                .iter_mut()
                .find(|f| f.id == filter_id)
                .ok_or(TimelineError::FilterNotFound { clip: id, filter: filter_id })?;
            filter.enabled = enabled;
            Ok(())
        })
    }

    /// Attach (or replace) the transition from `id` into its successor.
    pub fn set_transition(&mut self, id: ClipId, transition: Transition) -> Result<(), TimelineError> {
        self.edit_clip(id, |t, ci| {
            t.clips[ci].transition = Some(transition);
            Ok(())
        })
    }

    pub fn remove_transition(&mut self, id: ClipId) -> Result<Transition, TimelineError> {
        self.edit_clip(id, |t, ci| t.clips[ci].transition.take().ok_or(TimelineError::TransitionNotFound(id)))
    }

    /// Swap a set of clips on one track for another set. Used to restore
    /// snapshots; only structural invariants are checked.
    pub fn replace_clips(&mut self, track_id: TrackId, remove: &[ClipId], insert: Vec<Clip>) -> Result<Vec<Clip>, TimelineError> {
        let ti = self.track_mut_index(track_id)?;
        for clip in &insert {
            if !remove.contains(&clip.id) {
                self.ensure_unused_clip_id(clip.id)?;
            }
        }
        self.edit_track(ti, |t| {
            let mut removed = Vec::with_capacity(remove.len());
            for id in remove {
                let pos = t.clip_index(*id).ok_or(TimelineError::ClipNotFound(*id))?;
                removed.push(t.clips.remove(pos));
            }
            t.clips.extend(insert);
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::TransitionKind;
    use media_io::{AssetId, MediaKind, ProbeError, ProbedMetadata};

    fn registry_with(duration: f64, source: &str) -> (MediaRegistry, AssetId) {
        let mut reg = MediaRegistry::new();
        let prober = move |_: &str, _: MediaKind| -> Result<ProbedMetadata, ProbeError> {
            Ok(ProbedMetadata { duration, width: Some(1280), height: Some(720), frame_rate: Some(25.0), codec: None, sample_rate: Some(48_000), byte_size: 10 })
        };
        let id = reg.import(source, &prober).unwrap().id;
        (reg, id)
    }

    fn project_with_track() -> (Project, TrackId) {
        let mut p = Project::new("edit", OutputSettings::default());
        let track = Track::new(TrackKind::Video, "V1");
        let id = track.id;
        p.insert_track(track, 0).unwrap();
        (p, id)
    }

    #[test]
    fn scenario_overlap_rejected_and_timeline_unchanged() {
        let (reg, asset) = registry_with(20.0, "a.mp4");
        let (mut p, v1) = project_with_track();
        let a = Clip::new(v1, asset, 0.0, 0.0, 10.0);
        let b = Clip::new(v1, asset, 12.0, 2.0, 7.0);
        let b_id = b.id;
        p.add_clip(&reg, a).unwrap();
        p.add_clip(&reg, b).unwrap();
        let before = p.clone();
        let err = p.move_clip(&reg, b_id, v1, 5.0).unwrap_err();
        assert!(matches!(err, TimelineError::Overlap { .. }));
        assert_eq!(p, before);
    }

    #[test]
    fn trim_beyond_asset_is_rejected() {
        let (reg, asset) = registry_with(8.0, "a.mp4");
        let (mut p, v1) = project_with_track();
        let clip = Clip::new(v1, asset, 0.0, 0.0, 8.0);
        let id = clip.id;
        p.add_clip(&reg, clip).unwrap();
        assert!(matches!(p.trim_clip(&reg, id, 1.0, 9.0), Err(TimelineError::InvalidTrim { .. })));
        p.trim_clip(&reg, id, 1.0, 5.0).unwrap();
        assert_eq!(p.clip(id).unwrap().duration(), 4.0);
    }

    #[test]
    fn audio_asset_on_video_track_is_rejected() {
        let (reg, asset) = registry_with(8.0, "voice.wav");
        let (mut p, v1) = project_with_track();
        let err = p.add_clip(&reg, Clip::new(v1, asset, 0.0, 0.0, 1.0)).unwrap_err();
        assert!(matches!(err, TimelineError::KindMismatch { .. }));
    }

    #[test]
    fn split_reconstructs_source_range() {
        let (reg, asset) = registry_with(20.0, "a.mp4");
        let (mut p, v1) = project_with_track();
        let mut clip = Clip::new(v1, asset, 4.0, 2.0, 14.0);
        clip.speed = 2.0;
        let id = clip.id;
        p.add_clip(&reg, clip.clone()).unwrap();
        let right = ClipId::new();
        p.split_clip(id, 7.0, right).unwrap();
        let (l, r) = (p.clip(id).unwrap(), p.clip(right).unwrap());
        assert_eq!(l.trim_in, clip.trim_in);
        assert_eq!(l.trim_out, r.trim_in);
        assert_eq!(r.trim_out, clip.trim_out);
        assert_eq!(r.start, 7.0);
        assert!((l.duration() + r.duration() - clip.duration()).abs() < 1e-9);
        assert!(matches!(p.split_clip(id, 4.0, ClipId::new()), Err(TimelineError::SplitOutOfRange { .. })));
    }

    #[test]
    fn locked_track_rejects_clip_edits() {
        let (reg, asset) = registry_with(20.0, "a.mp4");
        let (mut p, v1) = project_with_track();
        let clip = Clip::new(v1, asset, 0.0, 0.0, 5.0);
        let id = clip.id;
        p.add_clip(&reg, clip).unwrap();
        p.set_track_flags(v1, TrackFlags { locked: true, ..Default::default() }).unwrap();
        assert!(matches!(p.set_speed(id, 2.0), Err(TimelineError::TrackLocked(_))));
        assert!(matches!(p.remove_track(v1), Err(TimelineError::TrackLocked(_))));
    }

    #[test]
    fn delete_clears_incoming_transition() {
        let (reg, asset) = registry_with(20.0, "a.mp4");
        let (mut p, v1) = project_with_track();
        let a = Clip::new(v1, asset, 0.0, 0.0, 4.0);
        let b = Clip::new(v1, asset, 4.0, 0.0, 4.0);
        let (a_id, b_id) = (a.id, b.id);
        p.add_clip(&reg, a).unwrap();
        p.add_clip(&reg, b).unwrap();
        p.set_transition(a_id, Transition::new(TransitionKind::Crossfade, 1.0, b_id)).unwrap();
        p.delete_clip(b_id).unwrap();
        assert!(p.clip(a_id).unwrap().transition.is_none());
    }

    #[test]
    fn reorder_filters_requires_permutation() {
        let (reg, asset) = registry_with(20.0, "a.mp4");
        let (mut p, v1) = project_with_track();
        let clip = Clip::new(v1, asset, 0.0, 0.0, 5.0);
        let id = clip.id;
        p.add_clip(&reg, clip).unwrap();
        let f1 = Filter::new(FilterKind::Reverse);
        let f2 = Filter::new(FilterKind::Rotate { degrees: 90.0 });
        let (i1, i2) = (f1.id, f2.id);
        p.add_filter(id, f1, None).unwrap();
        p.add_filter(id, f2, None).unwrap();
        assert!(p.reorder_filters(id, &[i1]).is_err());
        p.reorder_filters(id, &[i2, i1]).unwrap();
        let order: Vec<FilterId> = p.clip(id).unwrap().filters.iter().map(|f| f.id).collect();
        assert_eq!(order, vec![i2, i1]);
    }

    #[test]
    fn update_filter_keeps_kind() {
        let (reg, asset) = registry_with(20.0, "a.mp4");
        let (mut p, v1) = project_with_track();
        let clip = Clip::new(v1, asset, 0.0, 0.0, 5.0);
        let id = clip.id;
        p.add_clip(&reg, clip).unwrap();
        let f = Filter::new(FilterKind::Rotate { degrees: 90.0 });
        let fid = f.id;
        p.add_filter(id, f, None).unwrap();
        p.update_filter(id, fid, FilterKind::Rotate { degrees: 180.0 }).unwrap();
        assert!(p.update_filter(id, fid, FilterKind::Reverse).is_err());
    }

    #[test]
    fn speed_that_overflows_duration_is_rejected() {
        let (reg, asset) = registry_with(20.0, "a.mp4");
        let (mut p, v1) = project_with_track();
        let clip = Clip::new(v1, asset, 0.0, 0.0, 10.0);
        let id = clip.id;
        p.add_clip(&reg, clip).unwrap();
        let before = p.clone();
        assert!(matches!(p.set_speed(id, 1e-320), Err(TimelineError::InvalidSpeed(_))));
        assert_eq!(p, before);
    }
}
