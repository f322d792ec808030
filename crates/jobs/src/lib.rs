//! Serialized execution of engine operation lists against the codec engine.

pub mod engine;
pub mod operation;
pub mod queue;
pub mod scripted;

pub use engine::{CancelReason, CodecEngine, EngineError, EngineErrorKind, ExecutionControl, Input};
pub use operation::{check_references, Anchor, BlendKind, BufferRef, EngineOperation, OpKind, StreamKind, WipeEdge};
pub use queue::{EngineTaskQueue, Lane, Submission, TaskEvent, TaskHandle, TaskId};
pub use scripted::{CallLog, Gate, ScriptedEngine};
