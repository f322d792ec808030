use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{CancelReason, CodecEngine, EngineError, EngineErrorKind, ExecutionControl, Input};
use crate::operation::{check_references, BufferRef, EngineOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Logical lane a submission belongs to. Lanes share the one engine worker
/// but are cancelled independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "lane", rename_all = "snake_case")]
pub enum Lane {
    /// Newer previews with the same purpose supersede older ones.
    Preview { purpose: String },
    /// Non-export renders such as waveforms.
    Render,
    Export,
}

impl Lane {
    pub fn preview(purpose: impl Into<String>) -> Self { Lane::Preview { purpose: purpose.into() } }

    pub fn is_preview(&self) -> bool { matches!(self, Lane::Preview { .. }) }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub lane: Lane,
    pub operations: Vec<EngineOperation>,
    pub timeout: Option<Duration>,
}

impl Submission {
    pub fn new(lane: Lane, operations: Vec<EngineOperation>) -> Self { Self { lane, operations, timeout: None } }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub enum TaskEvent {
    Started,
    /// `completed` of `total` operations are done.
    Progress { completed: usize, total: usize },
    Completed(Arc<[u8]>),
    Failed(EngineError),
    Cancelled(CancelReason),
}

impl TaskEvent {
    pub fn is_terminal(&self) -> bool { matches!(self, TaskEvent::Completed(_) | TaskEvent::Failed(_) | TaskEvent::Cancelled(_)) }
}

#[derive(Debug, Default)]
struct TaskControl {
    /// Ask the engine to stop mid-operation.
    abort: Arc<AtomicBool>,
    cancelled: Mutex<Option<CancelReason>>,
}

impl TaskControl {
    fn cancel(&self, reason: CancelReason, abort: bool) {
        let mut slot = self.cancelled.lock();
        if slot.is_none() {
            *slot = Some(reason);
        }
        if abort {
            self.abort.store(true, Ordering::Release);
        }
    }

    fn cancelled(&self) -> Option<CancelReason> { *self.cancelled.lock() }
}

struct Task {
    id: TaskId,
    lane: Lane,
    operations: Vec<EngineOperation>,
    timeout: Option<Duration>,
    events: Sender<TaskEvent>,
    control: Arc<TaskControl>,
}

struct Running {
    id: TaskId,
    lane: Lane,
    control: Arc<TaskControl>,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<VecDeque<Task>>,
    running: Mutex<Option<Running>>,
    stopped: AtomicBool,
}

impl Shared {
    /// Remove a queued task, or flag the running one. Lock order: pending, then running.
    fn cancel(&self, id: TaskId, reason: CancelReason) -> bool {
        let mut pending = self.pending.lock();
        if let Some(pos) = pending.iter().position(|t| t.id == id) {
            if let Some(task) = pending.remove(pos) {
                debug!(task_id = %id, ?reason, "queued task cancelled");
                let _ = task.events.send(TaskEvent::Cancelled(reason));
            }
            return true;
        }
        let running = self.running.lock();
        match running.as_ref() {
            Some(r) if r.id == id => {
                debug!(task_id = %id, ?reason, "in-flight task cancelled");
                r.control.cancel(reason, true);
                true
            }
            _ => false,
        }
    }
}

/// Caller's view of one submission.
pub struct TaskHandle {
    id: TaskId,
    lane: Lane,
    events: Receiver<TaskEvent>,
    shared: Arc<Shared>,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.debug_struct("TaskHandle").field("id", &self.id).field("lane", &self.lane).finish() }
}

impl TaskHandle {
    pub fn id(&self) -> TaskId { self.id }

    pub fn lane(&self) -> &Lane { &self.lane }

    pub fn events(&self) -> &Receiver<TaskEvent> { &self.events }

    /// Cancel before the task starts (it is dropped from the queue) or while
    /// running (the engine is asked to abort and any result is discarded).
    pub fn cancel(&self) -> bool { self.shared.cancel(self.id, CancelReason::Requested) }

    /// Events delivered so far, without blocking.
    pub fn drain(&self) -> Vec<TaskEvent> { self.events.try_iter().collect() }

    /// Block until the task finishes.
    pub fn wait(&self) -> Result<Arc<[u8]>, EngineError> {
        loop {
            match self.events.recv() {
                Ok(event) => {
                    if let Some(outcome) = terminal(event) {
                        return outcome;
                    }
                }
                Err(_) => return Err(EngineError::new(EngineErrorKind::WorkerStopped)),
            }
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<Arc<[u8]>, EngineError>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.events.recv_deadline(deadline) {
                Ok(event) => {
                    if let Some(outcome) = terminal(event) {
                        return Some(outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => return Some(Err(EngineError::new(EngineErrorKind::WorkerStopped))),
            }
        }
    }

    /// Non-blocking check for a finished outcome, discarding progress events.
    pub fn try_outcome(&self) -> Option<Result<Arc<[u8]>, EngineError>> {
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if let Some(outcome) = terminal(event) {
                        return Some(outcome);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return Some(Err(EngineError::new(EngineErrorKind::WorkerStopped))),
            }
        }
    }
}

fn terminal(event: TaskEvent) -> Option<Result<Arc<[u8]>, EngineError>> {
    match event {
        TaskEvent::Completed(buf) => Some(Ok(buf)),
        TaskEvent::Failed(err) => Some(Err(err)),
        TaskEvent::Cancelled(reason) => Some(Err(EngineError::new(EngineErrorKind::Cancelled(reason)))),
        TaskEvent::Started | TaskEvent::Progress { .. } => None,
    }
}

enum Wake {
    Work,
    Stop,
}

/// FIFO queue in front of one codec engine.
///
/// Submissions run strictly one at a time in submission order on a single
/// worker thread that owns the engine.
pub struct EngineTaskQueue {
    shared: Arc<Shared>,
    wake: Sender<Wake>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl EngineTaskQueue {
    pub fn start(engine: impl CodecEngine) -> Self {
        let shared = Arc::new(Shared::default());
        let (wake, rx_wake) = unbounded::<Wake>();
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("codec-engine".into())
            .spawn(move || worker_loop(engine, worker_shared, rx_wake))
            .map_err(|e| warn!(error = %e, "failed to spawn engine worker"))
            .ok();
        if worker.is_none() {
            shared.stopped.store(true, Ordering::Release);
        }
        Self { shared, wake, worker: Mutex::new(worker) }
    }

    pub fn submit(&self, submission: Submission) -> TaskHandle {
        let id = TaskId(Uuid::new_v4());
        let (tx, rx) = unbounded();
        let handle = TaskHandle { id, lane: submission.lane.clone(), events: rx, shared: self.shared.clone() };
        if self.shared.stopped.load(Ordering::Acquire) {
            let _ = tx.send(TaskEvent::Failed(EngineError::new(EngineErrorKind::WorkerStopped)));
            return handle;
        }

        let task = Task { id, lane: submission.lane, operations: submission.operations, timeout: submission.timeout, events: tx, control: Arc::default() };
        {
            let mut pending = self.shared.pending.lock();
            if let Lane::Preview { .. } = &task.lane {
                let stale: Vec<TaskId> = pending.iter().filter(|t| t.lane == task.lane).map(|t| t.id).collect();
                pending.retain(|t| {
                    if t.lane == task.lane {
                        let _ = t.events.send(TaskEvent::Cancelled(CancelReason::Superseded));
                        false
                    } else {
                        true
                    }
                });
                if let Some(r) = self.shared.running.lock().as_ref().filter(|r| r.lane == task.lane) {
                    // Let the current operation finish; drop the rest.
                    r.control.cancel(CancelReason::Superseded, false);
                }
                if !stale.is_empty() {
                    debug!(lane = ?task.lane, superseded = stale.len(), "stale previews dropped");
                }
            }
            debug!(task_id = %id, lane = ?task.lane, ops = task.operations.len(), "task queued");
            pending.push_back(task);
        }
        let _ = self.wake.send(Wake::Work);
        handle
    }

    pub fn cancel(&self, id: TaskId) -> bool { self.shared.cancel(id, CancelReason::Requested) }

    /// Cancel everything queued or running, e.g. when the owning session closes.
    pub fn cancel_all(&self) { self.cancel_matching(|_| true, CancelReason::Requested) }

    /// Cancel every task on one lane, leaving the other lanes alone.
    pub fn cancel_lane(&self, lane: &Lane) { self.cancel_matching(|l| l == lane, CancelReason::Requested) }

    fn cancel_matching(&self, matches: impl Fn(&Lane) -> bool, reason: CancelReason) {
        let mut pending = self.shared.pending.lock();
        pending.retain(|t| {
            if matches(&t.lane) {
                let _ = t.events.send(TaskEvent::Cancelled(reason));
                false
            } else {
                true
            }
        });
        if let Some(r) = self.shared.running.lock().as_ref().filter(|r| matches(&r.lane)) {
            r.control.cancel(reason, true);
        }
    }

    pub fn pending_len(&self) -> usize { self.shared.pending.lock().len() }

    pub fn is_idle(&self) -> bool { self.shared.pending.lock().is_empty() && self.shared.running.lock().is_none() }

    /// Cancel all work and stop the worker. Later submissions fail with
    /// `WorkerStopped`.
    pub fn shutdown(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel_matching(|_| true, CancelReason::Shutdown);
        let _ = self.wake.send(Wake::Stop);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("engine worker panicked");
            }
        }
        info!("engine task queue stopped");
    }
}

impl Drop for EngineTaskQueue {
    fn drop(&mut self) { self.shutdown(); }
}

fn worker_loop(mut engine: impl CodecEngine, shared: Arc<Shared>, wake: Receiver<Wake>) {
    loop {
        let next = {
            let mut pending = shared.pending.lock();
            let task = pending.pop_front();
            if let Some(t) = &task {
                *shared.running.lock() = Some(Running { id: t.id, lane: t.lane.clone(), control: t.control.clone() });
            }
            task
        };
        match next {
            Some(task) => {
                run_task(&mut engine, &task);
                *shared.running.lock() = None;
            }
            None => match wake.recv() {
                Ok(Wake::Work) => {}
                Ok(Wake::Stop) | Err(_) => break,
            },
        }
        if shared.stopped.load(Ordering::Acquire) && shared.pending.lock().is_empty() {
            break;
        }
    }
}

fn run_task(engine: &mut impl CodecEngine, task: &Task) {
    let total = task.operations.len();
    let started = Instant::now();
    let deadline = task.timeout.map(|t| started + t);
    let control = ExecutionControl::new(task.control.abort.clone(), deadline);
    let send = |event: TaskEvent| {
        let _ = task.events.send(event);
    };
    debug!(task_id = %task.id, lane = ?task.lane, ops = total, "task started");
    send(TaskEvent::Started);

    if let Err((at, target)) = check_references(&task.operations) {
        let op = &task.operations[at].op;
        send(TaskEvent::Failed(EngineError::at(EngineErrorKind::InvalidInput(format!("operation {at} reads output {target}")), at, op)));
        return;
    }

    let mut outputs: Vec<Arc<[u8]>> = Vec::with_capacity(total);
    for (i, operation) in task.operations.iter().enumerate() {
        if let Some(reason) = task.control.cancelled() {
            debug!(task_id = %task.id, ?reason, at = i, "remaining operations dropped");
            send(TaskEvent::Cancelled(reason));
            return;
        }
        if control.deadline_passed() {
            task.control.abort.store(true, Ordering::Release);
            warn!(task_id = %task.id, at = i, "task timed out");
            send(TaskEvent::Failed(EngineError::at(EngineErrorKind::Timeout, i, &operation.op)));
            return;
        }

        let inputs: Vec<Input<'_>> = operation
            .inputs
            .iter()
            .map(|r| match r {
                BufferRef::Source { uri } => Input::Source(uri),
                BufferRef::Output { index } => Input::Buffer(&outputs[*index]),
            })
            .collect();
        let result = engine.execute(&operation.op, &inputs, &control);

        if let Some(reason) = task.control.cancelled() {
            debug!(task_id = %task.id, ?reason, at = i, "result discarded after cancellation");
            send(TaskEvent::Cancelled(reason));
            return;
        }
        if control.deadline_passed() {
            warn!(task_id = %task.id, at = i, "task timed out");
            send(TaskEvent::Failed(EngineError::at(EngineErrorKind::Timeout, i, &operation.op)));
            return;
        }
        match result {
            Ok(bytes) => outputs.push(Arc::from(bytes)),
            Err(kind) => {
                let err = EngineError::at(kind, i, &operation.op);
                warn!(task_id = %task.id, lane = ?task.lane, error = %err, "task failed, remaining operations aborted");
                send(TaskEvent::Failed(err));
                return;
            }
        }
        send(TaskEvent::Progress { completed: i + 1, total });
    }

    let output = outputs.pop().unwrap_or_else(|| Arc::from(Vec::new()));
    debug!(task_id = %task.id, bytes = output.len(), elapsed_ms = started.elapsed().as_millis() as u64, "task completed");
    send(TaskEvent::Completed(output));
}
