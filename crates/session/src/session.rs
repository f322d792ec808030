//! The editor session: one open project plus everything orbiting it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use jobs::{EngineError, EngineErrorKind, EngineTaskQueue, Lane, Submission, TaskEvent, TaskHandle};
use media_io::{AssetError, AssetId, AssetStatus, MediaAsset, MediaRegistry, Prober};
use project::{ProjectDocument, ProjectStore, SchemaVersion};
use renderer::{compile, RenderPlan, RenderRequest, TimeRange};
use timeline::{
    clips_needing_remediation, plan_ripple_move, snap_to_grid, ClipId, CommandHistory, Project, TimelineCommand, TimelineError, Track,
    TrackId, TrackKind,
};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::playback::{Playback, MAX_RATE, MIN_RATE};
use crate::selection::Selection;

const PREVIEW_PURPOSE: &str = "frame";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Export,
    Render,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Ready,
    Busy(JobKind),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobTicket(pub u64);

impl fmt::Display for JobTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "job-{}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Finished export or render: the final buffer and what it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub bytes: Arc<[u8]>,
    pub mime: String,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    pub time: f64,
    pub bytes: Arc<[u8]>,
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    JobStarted { ticket: JobTicket, kind: JobKind },
    JobProgress { ticket: JobTicket, completed: usize, total: usize },
    JobFinished { ticket: JobTicket, kind: JobKind, result: Result<RenderOutput, EngineError> },
    PreviewReady { time: f64 },
    PreviewUnavailable { time: f64 },
}

struct PendingJob {
    ticket: JobTicket,
    kind: JobKind,
    plan: RenderPlan,
}

struct ActiveJob {
    ticket: JobTicket,
    kind: JobKind,
    mime: String,
    duration: f64,
    handle: TaskHandle,
}

struct PendingPreview {
    time: f64,
    mime: String,
    handle: TaskHandle,
}

/// Owns one project, its assets and history, and drives the shared engine
/// queue on its behalf.
pub struct EditorSession {
    config: SessionConfig,
    engine: Arc<EngineTaskQueue>,
    prober: Box<dyn Prober>,
    state: SessionState,
    project: Option<Project>,
    assets: MediaRegistry,
    history: CommandHistory,
    selection: Selection,
    playback: Playback,
    dirty: bool,
    diagnostics: Vec<Diagnostic>,
    preview: Option<PendingPreview>,
    latest_frame: Option<PreviewFrame>,
    active: Option<ActiveJob>,
    queued: VecDeque<PendingJob>,
    deferred: Vec<SessionEvent>,
    next_ticket: u64,
}

impl EditorSession {
    pub fn new(config: SessionConfig, engine: Arc<EngineTaskQueue>, prober: impl Prober + 'static) -> Self {
        let history = CommandHistory::new(config.history_depth);
        Self {
            config,
            engine,
            prober: Box::new(prober),
            state: SessionState::Idle,
            project: None,
            assets: MediaRegistry::new(),
            history,
            selection: Selection::default(),
            playback: Playback::default(),
            dirty: false,
            diagnostics: Vec::new(),
            preview: None,
            latest_frame: None,
            active: None,
            queued: VecDeque::new(),
            deferred: Vec::new(),
            next_ticket: 1,
        }
    }

    pub fn state(&self) -> SessionState { self.state }

    pub fn config(&self) -> &SessionConfig { &self.config }

    pub fn project(&self) -> Option<&Project> { self.project.as_ref() }

    pub fn assets(&self) -> &MediaRegistry { &self.assets }

    pub fn history(&self) -> &CommandHistory { &self.history }

    pub fn selection(&self) -> &Selection { &self.selection }

    pub fn playback(&self) -> &Playback { &self.playback }

    pub fn is_dirty(&self) -> bool { self.dirty }

    pub fn diagnostics(&self) -> &[Diagnostic] { &self.diagnostics }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> { std::mem::take(&mut self.diagnostics) }

    pub fn latest_frame(&self) -> Option<&PreviewFrame> { self.latest_frame.as_ref() }

    /// Jobs waiting behind the running one.
    pub fn queued_jobs(&self) -> usize { self.queued.len() }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed { Err(SessionError::Closed) } else { Ok(()) }
    }

    fn project_ref(&self) -> Result<&Project, SessionError> {
        self.ensure_open()?;
        self.project.as_ref().ok_or(SessionError::NoProject)
    }

    fn edit_parts(&mut self) -> Result<(&mut Project, &MediaRegistry, &mut CommandHistory), SessionError> {
        self.ensure_open()?;
        let project = self.project.as_mut().ok_or(SessionError::NoProject)?;
        Ok((project, &self.assets, &mut self.history))
    }

    fn diagnose(&mut self, severity: Severity, message: String) { self.diagnostics.push(Diagnostic { severity, message }); }

    // ---- project lifecycle ----

    /// Start a fresh project with one video and one audio track.
    pub fn new_project(&mut self, name: &str) -> Result<(), SessionError> {
        self.ensure_replaceable("create a project")?;
        let mut project = Project::new(name, self.config.output.clone());
        project.tracks.push(Track::new(TrackKind::Video, "V1"));
        project.tracks.push(Track::new(TrackKind::Audio, "A1"));
        info!(project_id = %project.id, name, "project created");
        self.install(project, MediaRegistry::new());
        Ok(())
    }

    fn ensure_replaceable(&self, action: &'static str) -> Result<(), SessionError> {
        self.ensure_open()?;
        match self.state {
            SessionState::Busy(_) | SessionState::Loading => Err(SessionError::InvalidState { action, state: self.state }),
            _ => Ok(()),
        }
    }

    fn install(&mut self, project: Project, assets: MediaRegistry) {
        if let Some(p) = self.preview.take() {
            p.handle.cancel();
        }
        self.project = Some(project);
        self.assets = assets;
        self.history = CommandHistory::new(self.config.history_depth);
        self.selection.clear();
        self.playback = Playback::default();
        self.latest_frame = None;
        self.dirty = false;
        self.reconcile_assets();
        self.state = SessionState::Ready;
    }

    /// Load a serialized document. On failure the session keeps whatever it
    /// had open before.
    pub fn load_document(&mut self, json: &str) -> Result<(), SessionError> {
        self.ensure_replaceable("load a project")?;
        let previous = self.state;
        self.state = SessionState::Loading;
        match project::load(json) {
            Ok(doc) => {
                self.install_document(doc);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "project load rejected");
                self.state = previous;
                Err(e.into())
            }
        }
    }

    pub fn open(&mut self, store: &dyn ProjectStore, id: &str) -> Result<(), SessionError> {
        self.ensure_replaceable("open a project")?;
        let json = store.load(id).map_err(SessionError::Store)?.ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        self.load_document(&json)
    }

    fn install_document(&mut self, doc: ProjectDocument) {
        let mut assets = doc.registry();
        let pending: Vec<MediaAsset> = assets.list().into_iter().filter(|a| a.status == AssetStatus::Pending).cloned().collect();
        for asset in pending {
            let result = self.prober.probe(&asset.source, asset.kind);
            if let Err(e) = assets.finish_probe(asset.id, result) {
                self.diagnose(Severity::Warning, format!("asset {} could not be probed: {e}", asset.name));
            }
        }
        self.install(doc.project, assets);
        self.flag_invalid_clips();
    }

    fn flag_invalid_clips(&mut self) {
        let Some(project) = self.project.as_ref() else { return };
        let invalid = clips_needing_remediation(project, &self.assets);
        for clip in invalid {
            self.diagnose(Severity::Warning, format!("clip {clip} references missing or invalid media"));
        }
    }

    pub fn save_document(&mut self) -> Result<String, SessionError> {
        let json = project::save(self.project_ref()?, &self.assets)?;
        self.dirty = false;
        Ok(json)
    }

    pub fn save_to(&mut self, store: &mut dyn ProjectStore) -> Result<String, SessionError> {
        let current = self.project_ref()?;
        let id = current.id.to_string();
        let json = project::save(current, &self.assets)?;
        store.save(&id, &current.name, &SchemaVersion::CURRENT.to_string(), &json).map_err(SessionError::Store)?;
        self.dirty = false;
        Ok(id)
    }

    /// Cancel outstanding engine work and release the project. Terminal.
    /// Every unfinished job still gets a cancelled `JobFinished` from the
    /// next `poll`.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(p) = self.preview.take() {
            p.handle.cancel();
        }
        let shutdown = || Err(EngineError::new(EngineErrorKind::Cancelled(jobs::CancelReason::Shutdown)));
        let mut dropped = 0;
        if let Some(job) = self.active.take() {
            job.handle.cancel();
            self.deferred.push(SessionEvent::JobFinished { ticket: job.ticket, kind: job.kind, result: shutdown() });
            dropped += 1;
        }
        for job in self.queued.drain(..) {
            self.deferred.push(SessionEvent::JobFinished { ticket: job.ticket, kind: job.kind, result: shutdown() });
            dropped += 1;
        }
        self.history.clear();
        self.project = None;
        self.assets = MediaRegistry::new();
        self.latest_frame = None;
        self.state = SessionState::Closed;
        info!(dropped_jobs = dropped, "session closed");
    }

    // ---- media ----

    /// Import and probe a source. A failed probe leaves the asset in the
    /// registry, flagged invalid, and is reported both here and as a
    /// diagnostic.
    pub fn import(&mut self, source: &str) -> Result<AssetId, SessionError> {
        self.project_ref()?;
        match self.assets.import(source, &*self.prober) {
            Ok(asset) => {
                self.dirty = true;
                Ok(asset.id)
            }
            Err(e @ (AssetError::ProbeFailed { .. } | AssetError::Timeout { .. })) => {
                self.dirty = true;
                self.diagnose(Severity::Warning, e.to_string());
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove_asset(&mut self, id: AssetId) -> Result<(), SessionError> {
        self.project_ref()?;
        self.assets.remove(id)?;
        self.dirty = true;
        Ok(())
    }

    /// Clips whose media is missing or failed to probe.
    pub fn invalid_clips(&self) -> Vec<ClipId> {
        self.project.as_ref().map(|p| clips_needing_remediation(p, &self.assets)).unwrap_or_default()
    }

    // ---- editing ----

    pub fn execute(&mut self, command: TimelineCommand) -> Result<(), SessionError> {
        let (project, assets, history) = self.edit_parts()?;
        history.execute(project, assets, command)?;
        self.after_edit();
        Ok(())
    }

    pub fn undo(&mut self) -> Result<Option<String>, SessionError> {
        let (project, assets, history) = self.edit_parts()?;
        let label = history.undo(project, assets)?;
        if label.is_some() {
            self.after_edit();
        }
        Ok(label)
    }

    pub fn redo(&mut self) -> Result<Option<String>, SessionError> {
        let (project, assets, history) = self.edit_parts()?;
        let label = history.redo(project, assets)?;
        if label.is_some() {
            self.after_edit();
        }
        Ok(label)
    }

    /// Move a clip, shifting whatever it lands on to the right. Each
    /// primitive move becomes its own history entry. Returns how many.
    pub fn ripple_move(&mut self, clip_id: ClipId, track_id: TrackId, start: f64) -> Result<usize, SessionError> {
        let (project, assets, history) = self.edit_parts()?;
        let plan = plan_ripple_move(project, assets, clip_id, track_id, start)?;
        let total = plan.len();
        let mut applied = 0;
        let mut failure: Option<TimelineError> = None;
        for command in plan {
            if let Err(e) = history.execute(project, assets, command) {
                failure = Some(e);
                break;
            }
            applied += 1;
        }
        if let Some(e) = failure {
            if let Err(undo_err) = history.rollback(project, assets, applied) {
                error!(error = %undo_err, "could not roll back partial ripple move");
            }
            if applied > 0 {
                self.after_edit();
            }
            return Err(e.into());
        }
        debug!(clip_id = %clip_id, moves = total, "ripple move applied");
        self.after_edit();
        Ok(total)
    }

    /// Delete every selected clip as one undoable step.
    pub fn delete_selection(&mut self) -> Result<usize, SessionError> {
        let commands: Vec<TimelineCommand> = self.selection.clips.iter().map(|&clip_id| TimelineCommand::DeleteClip { clip_id }).collect();
        if commands.is_empty() {
            return Err(SessionError::NothingSelected);
        }
        let count = commands.len();
        self.execute(TimelineCommand::Batch { label: "delete selection".into(), commands })?;
        Ok(count)
    }

    /// Round a time to the configured grid.
    pub fn snap(&self, t: f64) -> f64 { snap_to_grid(t, self.config.snap_grid) }

    fn after_edit(&mut self) {
        self.dirty = true;
        self.reconcile_assets();
        if let Some(project) = self.project.as_ref() {
            self.selection.prune(project);
            let duration = project.duration();
            if self.playback.position > duration {
                self.playback.seek(duration, duration);
            }
        }
    }

    /// Reference counts: live clips plus one pin per asset that retained
    /// history could bring back.
    fn reconcile_assets(&mut self) {
        let mut usage = self.project.as_ref().map(Project::asset_usage).unwrap_or_default();
        for id in self.history.referenced_assets() {
            *usage.entry(id).or_insert(0) += 1;
        }
        self.assets.reconcile(&usage);
    }

    // ---- selection ----

    pub fn select_clip(&mut self, clip_id: ClipId, additive: bool) -> Result<(), SessionError> {
        if self.project_ref()?.clip(clip_id).is_none() {
            return Err(SessionError::ClipNotFound(clip_id));
        }
        self.selection.select_clip(clip_id, additive);
        Ok(())
    }

    pub fn select_track(&mut self, track_id: TrackId) -> Result<(), SessionError> {
        if self.project_ref()?.track(track_id).is_none() {
            return Err(TimelineError::TrackNotFound(track_id).into());
        }
        self.selection.track = Some(track_id);
        Ok(())
    }

    pub fn select_range(&mut self, start: f64, end: f64) -> Result<(), SessionError> {
        self.project_ref()?;
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(SessionError::InvalidRange { start, end });
        }
        self.selection.range = Some(TimeRange::new(start, end));
        Ok(())
    }

    pub fn clear_selection(&mut self) { self.selection.clear(); }

    // ---- playback ----

    fn duration(&self) -> Result<f64, SessionError> { Ok(self.project_ref()?.duration()) }

    pub fn play(&mut self) -> Result<(), SessionError> {
        let duration = self.duration()?;
        self.playback.play(duration);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.playback.pause();
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.playback.stop();
        Ok(())
    }

    /// Move the playhead, clamped to `[0, duration]`. Returns where it landed.
    pub fn seek(&mut self, t: f64) -> Result<f64, SessionError> {
        let duration = self.duration()?;
        Ok(self.playback.seek(t, duration))
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<f32, SessionError> {
        self.ensure_open()?;
        Ok(self.playback.set_volume(volume))
    }

    pub fn set_muted(&mut self, muted: bool) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.playback.muted = muted;
        Ok(())
    }

    pub fn set_rate(&mut self, rate: f64) -> Result<(), SessionError> {
        self.ensure_open()?;
        if !(MIN_RATE..=MAX_RATE).contains(&rate) {
            return Err(SessionError::InvalidRate(rate));
        }
        self.playback.rate = rate;
        Ok(())
    }

    /// Advance playback by `elapsed` seconds of wall time.
    pub fn tick(&mut self, elapsed: f64) -> Result<f64, SessionError> {
        let duration = self.duration()?;
        Ok(self.playback.advance(elapsed, duration))
    }

    // ---- preview ----

    /// Ask for the frame at `time`. Returns whether engine work was queued;
    /// when nothing can be shown the latest frame is cleared and the reason,
    /// if any, lands in the diagnostics.
    pub fn request_preview(&mut self, time: f64) -> Result<bool, SessionError> {
        let project = self.project_ref()?;
        let plan = compile(project, &self.assets, &RenderRequest::PreviewFrame { time });
        if let Some(previous) = self.preview.take() {
            previous.handle.cancel();
        }
        match plan {
            Ok(plan) if !plan.is_empty() => {
                let submission = Submission::new(Lane::preview(PREVIEW_PURPOSE), plan.operations).with_timeout(self.config.preview_timeout());
                let handle = self.engine.submit(submission);
                debug!(time, task = ?handle.id(), "preview submitted");
                self.preview = Some(PendingPreview { time, mime: plan.mime, handle });
                Ok(true)
            }
            Ok(_) => {
                self.latest_frame = None;
                Ok(false)
            }
            Err(e) => {
                warn!(time, error = %e, "preview could not be compiled");
                self.latest_frame = None;
                self.diagnose(Severity::Warning, format!("no preview at {time:.3}s: {e}"));
                Ok(false)
            }
        }
    }

    // ---- exports and renders ----

    /// Export the whole timeline, or `range` of it. While another job runs
    /// the export waits its turn.
    pub fn export(&mut self, range: Option<TimeRange>) -> Result<JobTicket, SessionError> {
        self.enqueue_job(JobKind::Export, RenderRequest::Export { range })
    }

    pub fn export_clip(&mut self, clip_id: ClipId) -> Result<JobTicket, SessionError> {
        let clip = self.project_ref()?.clip(clip_id).ok_or(SessionError::ClipNotFound(clip_id))?;
        let range = TimeRange::new(clip.start, clip.end());
        self.export(Some(range))
    }

    pub fn export_selection(&mut self) -> Result<JobTicket, SessionError> {
        let range = self.selection.span(self.project_ref()?).ok_or(SessionError::NothingSelected)?;
        self.export(Some(range))
    }

    pub fn render_thumbnail(&mut self, time: f64) -> Result<JobTicket, SessionError> {
        let (width, height) = (self.config.thumbnail_width, self.config.thumbnail_height);
        self.enqueue_job(JobKind::Render, RenderRequest::Thumbnail { time, width, height })
    }

    pub fn render_waveform(&mut self, clip_id: ClipId) -> Result<JobTicket, SessionError> {
        let samples = self.config.waveform_samples;
        self.enqueue_job(JobKind::Render, RenderRequest::Waveform { clip_id, samples })
    }

    fn enqueue_job(&mut self, kind: JobKind, request: RenderRequest) -> Result<JobTicket, SessionError> {
        let plan = compile(self.project_ref()?, &self.assets, &request)?;
        let ticket = JobTicket(self.next_ticket);
        self.next_ticket += 1;
        let job = PendingJob { ticket, kind, plan };
        if self.active.is_none() {
            self.start_job(job);
        } else {
            debug!(%ticket, request = request.name(), waiting = self.queued.len() + 1, "job queued behind running job");
            self.queued.push_back(job);
        }
        Ok(ticket)
    }

    fn start_job(&mut self, job: PendingJob) {
        let (lane, timeout) = match job.kind {
            JobKind::Export => (Lane::Export, self.config.export_timeout()),
            JobKind::Render => (Lane::Render, Some(self.config.preview_timeout())),
        };
        let ops = job.plan.operations.len();
        let mut submission = Submission::new(lane, job.plan.operations);
        if let Some(timeout) = timeout {
            submission = submission.with_timeout(timeout);
        }
        let handle = self.engine.submit(submission);
        info!(ticket = %job.ticket, kind = ?job.kind, ops, "job submitted");
        self.state = SessionState::Busy(job.kind);
        self.active = Some(ActiveJob { ticket: job.ticket, kind: job.kind, mime: job.plan.mime, duration: job.plan.duration, handle });
    }

    /// Cancel a job whether it is running or still waiting. Its
    /// `JobFinished` event reports the cancellation.
    pub fn cancel_job(&mut self, ticket: JobTicket) -> bool {
        if let Some(active) = self.active.as_ref().filter(|a| a.ticket == ticket) {
            return active.handle.cancel();
        }
        let Some(pos) = self.queued.iter().position(|j| j.ticket == ticket) else { return false };
        if let Some(job) = self.queued.remove(pos) {
            let cancelled = EngineError::new(EngineErrorKind::Cancelled(jobs::CancelReason::Requested));
            self.deferred.push(SessionEvent::JobFinished { ticket, kind: job.kind, result: Err(cancelled) });
        }
        true
    }

    /// Collect engine progress and outcomes. Call from the editing thread.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = std::mem::take(&mut self.deferred);
        if self.state == SessionState::Closed {
            return events;
        }
        self.poll_preview(&mut events);
        while let Some(active) = self.active.as_ref() {
            let mut outcome = None;
            for event in active.handle.drain() {
                match event {
                    TaskEvent::Started => events.push(SessionEvent::JobStarted { ticket: active.ticket, kind: active.kind }),
                    TaskEvent::Progress { completed, total } => events.push(SessionEvent::JobProgress { ticket: active.ticket, completed, total }),
                    TaskEvent::Completed(bytes) => outcome = Some(Ok(bytes)),
                    TaskEvent::Failed(e) => outcome = Some(Err(e)),
                    TaskEvent::Cancelled(reason) => outcome = Some(Err(EngineError::new(EngineErrorKind::Cancelled(reason)))),
                }
            }
            let Some(outcome) = outcome else { break };
            let Some(job) = self.active.take() else { break };
            events.push(self.finish_job(job, outcome));
            match self.queued.pop_front() {
                Some(next) => self.start_job(next),
                None => self.state = SessionState::Ready,
            }
        }
        events
    }

    fn poll_preview(&mut self, events: &mut Vec<SessionEvent>) {
        let Some(outcome) = self.preview.as_ref().and_then(|p| p.handle.try_outcome()) else { return };
        let Some(preview) = self.preview.take() else { return };
        match outcome {
            Ok(bytes) => {
                self.latest_frame = Some(PreviewFrame { time: preview.time, bytes, mime: preview.mime });
                events.push(SessionEvent::PreviewReady { time: preview.time });
            }
            Err(e) if e.is_cancelled() => debug!(time = preview.time, "preview cancelled"),
            Err(e) => {
                warn!(time = preview.time, error = %e, "preview failed, no frame available");
                self.latest_frame = None;
                self.diagnose(Severity::Warning, format!("no preview at {:.3}s: {e}", preview.time));
                events.push(SessionEvent::PreviewUnavailable { time: preview.time });
            }
        }
    }

    fn finish_job(&mut self, job: ActiveJob, outcome: Result<Arc<[u8]>, EngineError>) -> SessionEvent {
        let result = match outcome {
            Ok(bytes) => {
                info!(ticket = %job.ticket, kind = ?job.kind, bytes = bytes.len(), mime = %job.mime, "job finished");
                Ok(RenderOutput { bytes, mime: job.mime, duration: job.duration })
            }
            Err(e) if e.is_cancelled() => {
                info!(ticket = %job.ticket, "job cancelled");
                Err(e)
            }
            Err(e) => {
                error!(ticket = %job.ticket, kind = ?job.kind, error = %e, "job failed");
                self.diagnose(Severity::Error, format!("{:?} {} failed: {e}", job.kind, job.ticket));
                Err(e)
            }
        };
        SessionEvent::JobFinished { ticket: job.ticket, kind: job.kind, result }
    }

    /// Poll until no job or preview is outstanding, or `timeout` passes.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<SessionEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        loop {
            events.extend(self.poll());
            let idle = self.active.is_none() && self.queued.is_empty() && self.preview.is_none();
            if idle || Instant::now() >= deadline {
                return events;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) { self.close(); }
}
