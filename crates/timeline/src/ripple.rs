//! Ripple move: push later clips out of the way as explicit primitive moves.

use media_io::MediaRegistry;

use crate::command::TimelineCommand;
use crate::error::TimelineError;
use crate::ids::{ClipId, TrackId};
use crate::types::{Project, TIME_EPSILON};

/// Plan moving `clip_id` to `start` on `track_id`, shifting every clip that
/// would collide (and any they in turn collide with) to the right.
///
/// Returns plain `MoveClip` commands in an order where each one is valid on
/// its own, the requested move last. When a pushed clip would land on the
/// moving clip's current slot, the moving clip is first parked past the
/// track end. The plan is dry-run on a copy of the
/// project; a clip straddling `start` cannot be rippled and yields `Overlap`.
pub fn plan_ripple_move(project: &Project, assets: &MediaRegistry, clip_id: ClipId, track_id: TrackId, start: f64) -> Result<Vec<TimelineCommand>, TimelineError> {
    let moving = project.clip(clip_id).ok_or(TimelineError::ClipNotFound(clip_id))?;
    let track = project.track(track_id).ok_or(TimelineError::TrackNotFound(track_id))?;
    let end = start + moving.duration();

    let mut pushes = Vec::new();
    let mut cursor = end;
    for other in track.clips.iter().filter(|c| c.id != clip_id) {
        if other.end() <= start + TIME_EPSILON {
            continue;
        }
        if other.start < start - TIME_EPSILON {
            return Err(TimelineError::Overlap { track: track_id, clip: clip_id, other: other.id });
        }
        if other.start >= cursor - TIME_EPSILON {
            break;
        }
        pushes.push(TimelineCommand::MoveClip { clip_id: other.id, track_id, start: cursor });
        cursor += other.duration();
    }

    // a pushed clip may need the slot the moving clip still occupies
    let mut plan = Vec::with_capacity(pushes.len() + 2);
    let (old_start, old_end) = (moving.start, moving.end());
    let blocks_push = moving.track_id == track_id
        && pushes.iter().any(|push| match push {
            TimelineCommand::MoveClip { clip_id: pushed, start: to, .. } => {
                let len = project.clip(*pushed).map_or(0.0, |c| c.duration());
                *to < old_end - TIME_EPSILON && to + len > old_start + TIME_EPSILON
            }
            _ => false,
        });
    if blocks_push {
        plan.push(TimelineCommand::MoveClip { clip_id, track_id, start: track.end().max(cursor) });
    }
    plan.extend(pushes.into_iter().rev());
    plan.push(TimelineCommand::MoveClip { clip_id, track_id, start });

    let mut scratch = project.clone();
    for step in &plan {
        step.apply(&mut scratch, assets)?;
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Clip, OutputSettings, Track, TrackKind};
    use media_io::{MediaKind, ProbeError, ProbedMetadata};

    fn setup(layout: &[(f64, f64)]) -> (Project, MediaRegistry, TrackId, Vec<ClipId>) {
        let mut reg = MediaRegistry::new();
        let prober = |_: &str, _: MediaKind| -> Result<ProbedMetadata, ProbeError> {
            Ok(ProbedMetadata { duration: 100.0, width: Some(320), height: Some(240), frame_rate: Some(24.0), codec: None, sample_rate: None, byte_size: 1 })
        };
        let asset = reg.import("roll.mp4", &prober).unwrap().id;
        let mut p = Project::new("ripple", OutputSettings::default());
        let track = Track::new(TrackKind::Video, "V1");
        let tid = track.id;
        p.insert_track(track, 0).unwrap();
        let mut ids = Vec::new();
        for &(start, len) in layout {
            let clip = Clip::new(tid, asset, start, 0.0, len);
            ids.push(clip.id);
            p.add_clip(&reg, clip).unwrap();
        }
        (p, reg, tid, ids)
    }

    #[test]
    fn pushes_colliding_clips_in_cascade() {
        let (mut p, reg, v1, ids) = setup(&[(0.0, 4.0), (10.0, 3.0), (13.0, 2.0), (30.0, 1.0)]);
        let plan = plan_ripple_move(&p, &reg, ids[0], v1, 9.0).unwrap();
        assert_eq!(plan.len(), 3);
        for step in &plan {
            step.apply(&mut p, &reg).unwrap();
        }
        assert_eq!(p.clip(ids[0]).unwrap().start, 9.0);
        assert_eq!(p.clip(ids[1]).unwrap().start, 13.0);
        assert_eq!(p.clip(ids[2]).unwrap().start, 16.0);
        assert_eq!(p.clip(ids[3]).unwrap().start, 30.0);
    }

    #[test]
    fn free_target_needs_no_pushes() {
        let (p, reg, v1, ids) = setup(&[(0.0, 4.0), (10.0, 3.0)]);
        let plan = plan_ripple_move(&p, &reg, ids[0], v1, 5.0).unwrap();
        assert_eq!(plan, vec![TimelineCommand::MoveClip { clip_id: ids[0], track_id: v1, start: 5.0 }]);
    }

    #[test]
    fn straddling_clip_is_rejected() {
        let (p, reg, v1, ids) = setup(&[(0.0, 4.0), (10.0, 6.0)]);
        assert!(matches!(plan_ripple_move(&p, &reg, ids[0], v1, 12.0), Err(TimelineError::Overlap { .. })));
    }

    #[test]
    fn leftward_ripple_parks_the_moving_clip_first() {
        let (mut p, reg, v1, ids) = setup(&[(0.0, 5.0), (6.0, 5.0), (12.0, 5.0)]);
        let plan = plan_ripple_move(&p, &reg, ids[2], v1, 5.0).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0], TimelineCommand::MoveClip { clip_id: ids[2], track_id: v1, start: 17.0 });
        for step in &plan {
            step.apply(&mut p, &reg).unwrap();
        }
        assert_eq!(p.clip(ids[0]).unwrap().start, 0.0);
        assert_eq!(p.clip(ids[1]).unwrap().start, 10.0);
        assert_eq!(p.clip(ids[2]).unwrap().start, 5.0);
    }
}
