//! Structural invariants of the timeline.
//!
//! Every mutator runs [`validate_track`] on its candidate track before
//! committing, and loaders run [`check_project`] on whole documents.

use std::collections::HashSet;

use media_io::MediaRegistry;

use crate::error::TimelineError;
use crate::ids::ClipId;
use crate::types::{Clip, Project, Track, TIME_EPSILON};

pub(crate) fn check_clip_fields(clip: &Clip) -> Result<(), TimelineError> {
    if !clip.start.is_finite() || clip.start < 0.0 {
        return Err(TimelineError::InvalidStart(clip.start));
    }
    if !clip.speed.is_finite() || clip.speed <= 0.0 {
        return Err(TimelineError::InvalidSpeed(clip.speed));
    }
    if !clip.volume.is_finite() || clip.volume < 0.0 {
        return Err(TimelineError::InvalidVolume(clip.volume));
    }
    if !(clip.trim_in.is_finite() && clip.trim_out.is_finite()) || clip.trim_in < 0.0 || clip.trim_in >= clip.trim_out {
        return Err(TimelineError::InvalidTrim {
            clip: clip.id,
            trim_in: clip.trim_in,
            trim_out: clip.trim_out,
            reason: "need 0 <= trimIn < trimOut".into(),
        });
    }
    // a vanishing speed can still overflow the derived duration
    if !clip.end().is_finite() {
        return Err(TimelineError::InvalidSpeed(clip.speed));
    }
    Ok(())
}

/// Structural validity of one track: clip fields, filters, ordering,
/// no overlap, and transitions bridging true neighbours.
pub(crate) fn validate_track(track: &Track) -> Result<(), TimelineError> {
    let mut filter_ids = HashSet::new();
    for clip in &track.clips {
        if clip.track_id != track.id {
            return Err(TimelineError::InvalidOrder(format!("clip {} claims track {} but sits on {}", clip.id, clip.track_id, track.id)));
        }
        check_clip_fields(clip)?;
        filter_ids.clear();
        for f in &clip.filters {
            if !filter_ids.insert(f.id) {
                return Err(TimelineError::DuplicateId(f.id.to_string()));
            }
            if !f.kind.applies_to(track.kind) {
                return Err(TimelineError::FilterNotApplicable { filter: f.kind.name(), track: track.kind });
            }
            f.kind.validate().map_err(TimelineError::InvalidFilter)?;
        }
    }
    for pair in track.clips.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.start < a.start {
            return Err(TimelineError::InvalidOrder(format!("clips on track {} are not sorted by start", track.id)));
        }
        if a.end() > b.start + TIME_EPSILON {
            return Err(TimelineError::Overlap { track: track.id, clip: b.id, other: a.id });
        }
    }
    for (i, clip) in track.clips.iter().enumerate() {
        let Some(t) = &clip.transition else { continue };
        t.validate(track.kind).map_err(TimelineError::InvalidTransition)?;
        let next = match track.clips.get(i + 1) {
            Some(next) if next.id == t.to => next,
            _ => return Err(TimelineError::TransitionTarget { from: clip.id, to: t.to }),
        };
        let limit = clip.duration().min(next.duration());
        if t.duration > limit + TIME_EPSILON {
            return Err(TimelineError::TransitionTooLong { duration: t.duration, limit });
        }
    }
    Ok(())
}

/// Whole-project check: unique ids plus [`validate_track`] on every track.
pub fn check_project(project: &Project) -> Result<(), TimelineError> {
    project.settings.validate().map_err(TimelineError::InvalidSettings)?;
    let mut tracks = HashSet::new();
    let mut clips = HashSet::new();
    for track in &project.tracks {
        if !tracks.insert(track.id) {
            return Err(TimelineError::DuplicateId(track.id.to_string()));
        }
        if !track.volume.is_finite() || track.volume < 0.0 {
            return Err(TimelineError::InvalidVolume(track.volume));
        }
        for clip in &track.clips {
            if !clips.insert(clip.id) {
                return Err(TimelineError::DuplicateId(clip.id.to_string()));
            }
        }
        validate_track(track)?;
    }
    Ok(())
}

/// Clips whose asset is missing, invalid or too short for the trim window.
/// They stay on the timeline and are surfaced for remediation.
pub fn clips_needing_remediation(project: &Project, assets: &MediaRegistry) -> Vec<ClipId> {
    project
        .clips()
        .filter(|clip| match assets.get(clip.asset_id) {
            Some(asset) if asset.is_ready() => asset.duration().map_or(true, |d| clip.trim_out > d + TIME_EPSILON),
            _ => true,
        })
        .map(|clip| clip.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{Transition, TransitionKind};
    use crate::types::{OutputSettings, TrackKind};
    use media_io::AssetId;

    fn track_with(clips: &[(f64, f64, f64)]) -> Track {
        let mut t = Track::new(TrackKind::Video, "V1");
        let asset = AssetId::new();
        for &(start, tin, tout) in clips {
            t.clips.push(Clip::new(t.id, asset, start, tin, tout));
        }
        t
    }

    #[test]
    fn adjacent_clips_are_not_overlapping() {
        assert!(validate_track(&track_with(&[(0.0, 0.0, 10.0), (10.0, 0.0, 5.0)])).is_ok());
    }

    #[test]
    fn overlap_is_detected() {
        let err = validate_track(&track_with(&[(0.0, 0.0, 10.0), (5.0, 2.0, 7.0)])).unwrap_err();
        assert!(matches!(err, TimelineError::Overlap { .. }));
    }

    #[test]
    fn transition_must_target_next_clip() {
        let mut t = track_with(&[(0.0, 0.0, 2.0), (2.0, 0.0, 5.0)]);
        let next = t.clips[1].id;
        t.clips[0].transition = Some(Transition::new(TransitionKind::Crossfade, 1.0, next));
        assert!(validate_track(&t).is_ok());
        t.clips[0].transition = Some(Transition::new(TransitionKind::Crossfade, 3.0, next));
        assert!(matches!(validate_track(&t), Err(TimelineError::TransitionTooLong { .. })));
        t.clips[0].transition = Some(Transition::new(TransitionKind::Crossfade, 1.0, ClipId::new()));
        assert!(matches!(validate_track(&t), Err(TimelineError::TransitionTarget { .. })));
    }

    #[test]
    fn project_check_rejects_duplicate_clip_ids() {
        let mut p = Project::new("dup", OutputSettings::default());
        let mut a = track_with(&[(0.0, 0.0, 1.0)]);
        let mut b = track_with(&[(0.0, 0.0, 1.0)]);
        b.clips[0].id = a.clips[0].id;
        b.clips[0].track_id = b.id;
        a.name = "A".into();
        p.tracks = vec![a, b];
        assert!(matches!(check_project(&p), Err(TimelineError::DuplicateId(_))));
    }

    #[test]
    fn vanishing_speed_is_rejected() {
        let mut t = track_with(&[(0.0, 0.0, 10.0)]);
        t.clips[0].speed = 1e-320;
        assert!(t.clips[0].duration().is_infinite());
        assert!(matches!(check_clip_fields(&t.clips[0]), Err(TimelineError::InvalidSpeed(_))));
    }
}
