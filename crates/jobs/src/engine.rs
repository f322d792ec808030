use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::OpKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Requested,
    /// A newer preview for the same purpose replaced this one.
    Superseded,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EngineErrorKind {
    #[error("codec failure: {0}")]
    Codec(String),
    #[error("engine ran out of memory")]
    OutOfMemory,
    #[error("unsupported parameter: {0}")]
    Unsupported(String),
    #[error("invalid input reference: {0}")]
    InvalidInput(String),
    #[error("timed out")]
    Timeout,
    #[error("aborted")]
    Aborted,
    #[error("cancelled ({0:?})")]
    Cancelled(CancelReason),
    #[error("engine worker is not running")]
    WorkerStopped,
}

/// Failure of a submission, pinned to the operation that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}", describe(.kind, .op_index, .stage))]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub op_index: Option<usize>,
    pub stage: Option<String>,
}

fn describe(kind: &EngineErrorKind, op_index: &Option<usize>, stage: &Option<String>) -> String {
    match (op_index, stage) {
        (Some(i), Some(s)) => format!("operation {i} ({s}) failed: {kind}"),
        (Some(i), None) => format!("operation {i} failed: {kind}"),
        _ => kind.to_string(),
    }
}

impl EngineError {
    pub fn new(kind: EngineErrorKind) -> Self { Self { kind, op_index: None, stage: None } }

    pub fn at(kind: EngineErrorKind, op_index: usize, op: &OpKind) -> Self {
        Self { kind, op_index: Some(op_index), stage: Some(op.name().to_string()) }
    }

    pub fn is_timeout(&self) -> bool { self.kind == EngineErrorKind::Timeout }

    pub fn is_cancelled(&self) -> bool { matches!(self.kind, EngineErrorKind::Cancelled(_)) }
}

/// A resolved operation input.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Source(&'a str),
    Buffer(&'a [u8]),
}

/// Abort flag and deadline a running operation may poll between internal
/// steps. Steps that cannot be interrupted simply run to completion.
#[derive(Debug, Clone)]
pub struct ExecutionControl {
    abort: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ExecutionControl {
    pub(crate) fn new(abort: Arc<AtomicBool>, deadline: Option<Instant>) -> Self { Self { abort, deadline } }

    /// Control for driving an engine directly, outside a queue.
    pub fn unbounded() -> Self { Self { abort: Arc::new(AtomicBool::new(false)), deadline: None } }

    pub fn is_aborted(&self) -> bool { self.abort.load(Ordering::Acquire) || self.deadline_passed() }

    pub fn deadline_passed(&self) -> bool { self.deadline.is_some_and(|d| Instant::now() >= d) }
}

/// The single-instance, non-reentrant media engine. The queue owns it on
/// its worker thread and calls it one operation at a time.
pub trait CodecEngine: Send + 'static {
    fn execute(&mut self, op: &OpKind, inputs: &[Input<'_>], control: &ExecutionControl) -> Result<Vec<u8>, EngineErrorKind>;
}

impl CodecEngine for Box<dyn CodecEngine> {
    fn execute(&mut self, op: &OpKind, inputs: &[Input<'_>], control: &ExecutionControl) -> Result<Vec<u8>, EngineErrorKind> {
        (**self).execute(op, inputs, control)
    }
}
