use std::collections::{BTreeSet, VecDeque};

use media_io::{AssetId, MediaRegistry};
use tracing::debug;

use crate::command::TimelineCommand;
use crate::error::TimelineError;
use crate::types::Project;

pub const DEFAULT_HISTORY_DEPTH: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub label: String,
    pub forward: TimelineCommand,
    pub inverse: TimelineCommand,
}

/// Bounded undo/redo stacks of applied commands.
///
/// Eviction past `max_depth` only forgets the oldest entry; the project is
/// never touched by it.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    max_depth: usize,
}

impl Default for CommandHistory {
    fn default() -> Self { Self::new(DEFAULT_HISTORY_DEPTH) }
}

impl CommandHistory {
    pub fn new(max_depth: usize) -> Self { Self { undo: VecDeque::new(), redo: Vec::new(), max_depth: max_depth.max(1) } }

    pub fn max_depth(&self) -> usize { self.max_depth }

    /// Apply `command` and record it. A new edit discards the redo branch.
    pub fn execute(&mut self, project: &mut Project, assets: &MediaRegistry, command: TimelineCommand) -> Result<(), TimelineError> {
        let inverse = command.apply(project, assets)?;
        self.redo.clear();
        self.undo.push_back(HistoryEntry { label: command.label().to_string(), forward: command, inverse });
        while self.undo.len() > self.max_depth {
            if let Some(evicted) = self.undo.pop_front() {
                debug!(label = %evicted.label, "oldest history entry evicted");
            }
        }
        Ok(())
    }

    /// Undo the latest entry, returning its label, or `None` with nothing to undo.
    /// A failed inverse leaves the entry on the undo stack.
    pub fn undo(&mut self, project: &mut Project, assets: &MediaRegistry) -> Result<Option<String>, TimelineError> {
        let Some(mut entry) = self.undo.pop_back() else { return Ok(None) };
        match entry.inverse.apply(project, assets) {
            Ok(forward) => {
                entry.forward = forward;
                let label = entry.label.clone();
                self.redo.push(entry);
                Ok(Some(label))
            }
            Err(err) => {
                self.undo.push_back(entry);
                Err(err)
            }
        }
    }

    pub fn redo(&mut self, project: &mut Project, assets: &MediaRegistry) -> Result<Option<String>, TimelineError> {
        let Some(mut entry) = self.redo.pop() else { return Ok(None) };
        match entry.forward.apply(project, assets) {
            Ok(inverse) => {
                entry.inverse = inverse;
                let label = entry.label.clone();
                self.undo.push_back(entry);
                Ok(Some(label))
            }
            Err(err) => {
                self.redo.push(entry);
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool { !self.undo.is_empty() }

    pub fn can_redo(&self) -> bool { !self.redo.is_empty() }

    pub fn undo_label(&self) -> Option<&str> { self.undo.back().map(|e| e.label.as_str()) }

    pub fn redo_label(&self) -> Option<&str> { self.redo.last().map(|e| e.label.as_str()) }

    pub fn undo_len(&self) -> usize { self.undo.len() }

    pub fn redo_len(&self) -> usize { self.redo.len() }

    /// Undo the latest `count` entries and forget them entirely, leaving the
    /// redo stack as it was. Stops at the first inverse that fails.
    pub fn rollback(&mut self, project: &mut Project, assets: &MediaRegistry, count: usize) -> Result<(), TimelineError> {
        for _ in 0..count {
            let Some(entry) = self.undo.pop_back() else { return Ok(()) };
            if let Err(e) = entry.inverse.apply(project, assets) {
                self.undo.push_back(entry);
                return Err(e);
            }
            debug!(label = %entry.label, "history entry rolled back");
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Assets that some retained entry could bring back onto the timeline.
    pub fn referenced_assets(&self) -> BTreeSet<AssetId> {
        self.undo
            .iter()
            .chain(self.redo.iter())
            .flat_map(|e| e.forward.assets().into_iter().chain(e.inverse.assets()))
            .collect()
    }
}
