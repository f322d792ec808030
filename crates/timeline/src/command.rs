//! Serializable timeline edits.
//!
//! [`TimelineCommand::apply`] mutates the project and hands back the command
//! that undoes it, so history never has to capture whole-project snapshots.

use std::collections::BTreeSet;

use media_io::{AssetId, MediaRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::effects::{Filter, FilterKind, Transition};
use crate::error::TimelineError;
use crate::ids::{ClipId, FilterId, TrackId};
use crate::types::{Clip, OutputSettings, Project, Track, TrackFlags};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TimelineCommand {
    AddTrack { track: Track, index: usize },
    RemoveTrack { track_id: TrackId },
    ReorderTracks { order: Vec<TrackId> },
    SetTrackFlags { track_id: TrackId, flags: TrackFlags },
    SetTrackVolume { track_id: TrackId, volume: f32 },
    SetOutputSettings { settings: OutputSettings },
    AddClip { clip: Clip },
    MoveClip { clip_id: ClipId, track_id: TrackId, start: f64 },
    TrimClip { clip_id: ClipId, trim_in: f64, trim_out: f64 },
    SplitClip { clip_id: ClipId, at: f64, right_id: ClipId },
    DeleteClip { clip_id: ClipId },
    DuplicateClip { clip_id: ClipId, new_id: ClipId },
    SetSpeed { clip_id: ClipId, speed: f64 },
    SetVolume { clip_id: ClipId, volume: f32 },
    AddFilter { clip_id: ClipId, filter: Filter, index: Option<usize> },
    RemoveFilter { clip_id: ClipId, filter_id: FilterId },
    ReorderFilters { clip_id: ClipId, order: Vec<FilterId> },
    UpdateFilter { clip_id: ClipId, filter_id: FilterId, kind: FilterKind },
    SetFilterEnabled { clip_id: ClipId, filter_id: FilterId, enabled: bool },
    AddTransition { clip_id: ClipId, transition: Transition },
    RemoveTransition { clip_id: ClipId },
    /// Swap clips on one track wholesale. Produced as the inverse of edits
    /// that touch several clips at once (split, delete).
    ReplaceClips { track_id: TrackId, remove: Vec<ClipId>, insert: Vec<Clip> },
    /// Several commands applied as one atomic step.
    Batch { label: String, commands: Vec<TimelineCommand> },
}

/// Clips that differ between two versions of the same track, expressed as
/// the `ReplaceClips` that turns `after` back into `before`.
fn restore_track(before: &Track, after: &Track) -> TimelineCommand {
    let remove = after.clips.iter().filter(|c| before.clip(c.id) != Some(*c)).map(|c| c.id).collect();
    let insert = before.clips.iter().filter(|c| after.clip(c.id) != Some(*c)).cloned().collect();
    TimelineCommand::ReplaceClips { track_id: before.id, remove, insert }
}

fn owning_track(project: &Project, clip_id: ClipId) -> Result<Track, TimelineError> {
    let (ti, _) = project.locate_clip(clip_id).ok_or(TimelineError::ClipNotFound(clip_id))?;
    Ok(project.tracks[ti].clone())
}

fn existing_clip(project: &Project, clip_id: ClipId) -> Result<&Clip, TimelineError> {
    project.clip(clip_id).ok_or(TimelineError::ClipNotFound(clip_id))
}

fn existing_filter(project: &Project, clip_id: ClipId, filter_id: FilterId) -> Result<(usize, &Filter), TimelineError> {
    existing_clip(project, clip_id)?
        .filters
        .iter()
        .enumerate()
        .find(|(_, f)| f.id == filter_id)
        .ok_or(TimelineError::FilterNotFound { clip: clip_id, filter: filter_id })
}

impl TimelineCommand {
    /// Apply to `project`, returning the inverse. On error nothing changed.
    pub fn apply(&self, project: &mut Project, assets: &MediaRegistry) -> Result<TimelineCommand, TimelineError> {
        use TimelineCommand as C;
        let inverse = match self {
            C::AddTrack { track, index } => {
                project.insert_track(track.clone(), *index)?;
                C::RemoveTrack { track_id: track.id }
            }
            C::RemoveTrack { track_id } => {
                let (index, track) = project.remove_track(*track_id)?;
                C::AddTrack { track, index }
            }
            C::ReorderTracks { order } => C::ReorderTracks { order: project.reorder_tracks(order)? },
            C::SetTrackFlags { track_id, flags } => C::SetTrackFlags { track_id: *track_id, flags: project.set_track_flags(*track_id, *flags)? },
            C::SetTrackVolume { track_id, volume } => C::SetTrackVolume { track_id: *track_id, volume: project.set_track_volume(*track_id, *volume)? },
            C::SetOutputSettings { settings } => C::SetOutputSettings { settings: project.set_output_settings(settings.clone())? },
            C::AddClip { clip } => {
                project.add_clip(assets, clip.clone())?;
                C::DeleteClip { clip_id: clip.id }
            }
            C::MoveClip { clip_id, track_id, start } => {
                let old = existing_clip(project, *clip_id)?;
                let (old_track, old_start) = (old.track_id, old.start);
                project.move_clip(assets, *clip_id, *track_id, *start)?;
                C::MoveClip { clip_id: *clip_id, track_id: old_track, start: old_start }
            }
            C::TrimClip { clip_id, trim_in, trim_out } => {
                let old = existing_clip(project, *clip_id)?;
                let (old_in, old_out) = (old.trim_in, old.trim_out);
                project.trim_clip(assets, *clip_id, *trim_in, *trim_out)?;
                C::TrimClip { clip_id: *clip_id, trim_in: old_in, trim_out: old_out }
            }
            C::SplitClip { clip_id, at, right_id } => {
                let before = owning_track(project, *clip_id)?;
                project.split_clip(*clip_id, *at, *right_id)?;
                restore_track(&before, &owning_track(project, *clip_id)?)
            }
            C::DeleteClip { clip_id } => {
                let before = owning_track(project, *clip_id)?;
                project.delete_clip(*clip_id)?;
                let after = project.track(before.id).cloned().ok_or(TimelineError::TrackNotFound(before.id))?;
                restore_track(&before, &after)
            }
            C::DuplicateClip { clip_id, new_id } => {
                project.duplicate_clip(*clip_id, *new_id)?;
                C::DeleteClip { clip_id: *new_id }
            }
            C::SetSpeed { clip_id, speed } => {
                let old = existing_clip(project, *clip_id)?.speed;
                project.set_speed(*clip_id, *speed)?;
                C::SetSpeed { clip_id: *clip_id, speed: old }
            }
            C::SetVolume { clip_id, volume } => {
                let old = existing_clip(project, *clip_id)?.volume;
                project.set_clip_volume(*clip_id, *volume)?;
                C::SetVolume { clip_id: *clip_id, volume: old }
            }
            C::AddFilter { clip_id, filter, index } => {
                project.add_filter(*clip_id, filter.clone(), *index)?;
                C::RemoveFilter { clip_id: *clip_id, filter_id: filter.id }
            }
            C::RemoveFilter { clip_id, filter_id } => {
                let (index, _) = existing_filter(project, *clip_id, *filter_id)?;
                let filter = project.remove_filter(*clip_id, *filter_id)?;
                C::AddFilter { clip_id: *clip_id, filter, index: Some(index) }
            }
            C::ReorderFilters { clip_id, order } => {
                let old = existing_clip(project, *clip_id)?.filters.iter().map(|f| f.id).collect();
                project.reorder_filters(*clip_id, order)?;
                C::ReorderFilters { clip_id: *clip_id, order: old }
            }
            C::UpdateFilter { clip_id, filter_id, kind } => {
                let old = existing_filter(project, *clip_id, *filter_id)?.1.kind.clone();
                project.update_filter(*clip_id, *filter_id, kind.clone())?;
                C::UpdateFilter { clip_id: *clip_id, filter_id: *filter_id, kind: old }
            }
            C::SetFilterEnabled { clip_id, filter_id, enabled } => {
                let old = existing_filter(project, *clip_id, *filter_id)?.1.enabled;
                project.set_filter_enabled(*clip_id, *filter_id, *enabled)?;
                C::SetFilterEnabled { clip_id: *clip_id, filter_id: *filter_id, enabled: old }
            }
            C::AddTransition { clip_id, transition } => {
                let old = existing_clip(project, *clip_id)?.transition.clone();
                project.set_transition(*clip_id, transition.clone())?;
                match old {
                    Some(transition) => C::AddTransition { clip_id: *clip_id, transition },
                    None => C::RemoveTransition { clip_id: *clip_id },
                }
            }
            C::RemoveTransition { clip_id } => C::AddTransition { clip_id: *clip_id, transition: project.remove_transition(*clip_id)? },
            C::ReplaceClips { track_id, remove, insert } => {
                let removed = project.replace_clips(*track_id, remove, insert.clone())?;
                C::ReplaceClips { track_id: *track_id, remove: insert.iter().map(|c| c.id).collect(), insert: removed }
            }
            C::Batch { label, commands } => {
                let mut undo = Vec::with_capacity(commands.len());
                for (i, cmd) in commands.iter().enumerate() {
                    match cmd.apply(project, assets) {
                        Ok(inv) => undo.push(inv),
                        Err(err) => {
                            debug!(%label, failed_at = i, "batch rejected, rolling back");
                            for inv in undo.iter().rev() {
                                if let Err(rollback) = inv.apply(project, assets) {
                                    warn!(%label, error = %rollback, "batch rollback step failed");
                                }
                            }
                            return Err(err);
                        }
                    }
                }
                undo.reverse();
                C::Batch { label: label.clone(), commands: undo }
            }
        };
        debug!(op = self.label(), "timeline command applied");
        Ok(inverse)
    }

    /// Human-readable label for undo/redo menus.
    pub fn label(&self) -> &str {
        use TimelineCommand as C;
        match self {
            C::AddTrack { .. } => "Add track",
            C::RemoveTrack { .. } => "Remove track",
            C::ReorderTracks { .. } => "Reorder tracks",
            C::SetTrackFlags { .. } => "Change track flags",
            C::SetTrackVolume { .. } => "Change track volume",
            C::SetOutputSettings { .. } => "Change output settings",
            C::AddClip { .. } => "Add clip",
            C::MoveClip { .. } => "Move clip",
            C::TrimClip { .. } => "Trim clip",
            C::SplitClip { .. } => "Split clip",
            C::DeleteClip { .. } => "Delete clip",
            C::DuplicateClip { .. } => "Duplicate clip",
            C::SetSpeed { .. } => "Change speed",
            C::SetVolume { .. } => "Change volume",
            C::AddFilter { .. } => "Add filter",
            C::RemoveFilter { .. } => "Remove filter",
            C::ReorderFilters { .. } => "Reorder filters",
            C::UpdateFilter { .. } => "Edit filter",
            C::SetFilterEnabled { .. } => "Toggle filter",
            C::AddTransition { .. } => "Add transition",
            C::RemoveTransition { .. } => "Remove transition",
            C::ReplaceClips { .. } => "Replace clips",
            C::Batch { label, .. } => label.as_str(),
        }
    }

    /// Assets mentioned by clips carried inside this command.
    pub fn assets(&self) -> BTreeSet<AssetId> {
        let mut out = BTreeSet::new();
        self.collect_assets(&mut out);
        out
    }

    fn collect_assets(&self, out: &mut BTreeSet<AssetId>) {
        match self {
            TimelineCommand::AddTrack { track, .. } => out.extend(track.clips.iter().map(|c| c.asset_id)),
            TimelineCommand::AddClip { clip } => {
                out.insert(clip.asset_id);
            }
            TimelineCommand::ReplaceClips { insert, .. } => out.extend(insert.iter().map(|c| c.asset_id)),
            TimelineCommand::Batch { commands, .. } => commands.iter().for_each(|c| c.collect_assets(out)),
            _ => {}
        }
    }
}
