//! Deterministic stand-in for the media engine, used by tests and the CLI's
//! dry runs.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::engine::{CodecEngine, EngineErrorKind, ExecutionControl, Input};
use crate::operation::OpKind;

/// Names of the operations a [`ScriptedEngine`] has executed, in order.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn snapshot(&self) -> Vec<String> { self.0.lock().clone() }

    pub fn len(&self) -> usize { self.0.lock().len() }

    pub fn is_empty(&self) -> bool { self.0.lock().is_empty() }
}

/// Test-side end of a gated engine: observe entry into each operation and
/// release it when ready.
pub struct Gate {
    pub entered: Receiver<String>,
    release: Sender<()>,
}

impl Gate {
    pub fn release(&self) { let _ = self.release.send(()); }

    /// Wait until the engine enters its next operation, returning its name.
    pub fn wait_entered(&self, timeout: Duration) -> Option<String> { self.entered.recv_timeout(timeout).ok() }
}

struct GateSide {
    entered: Sender<String>,
    release: Receiver<()>,
}

pub struct ScriptedEngine {
    log: CallLog,
    delay: Duration,
    failures: Vec<(String, EngineErrorKind)>,
    gate: Option<GateSide>,
}

impl Default for ScriptedEngine {
    fn default() -> Self { Self::new() }
}

impl ScriptedEngine {
    pub fn new() -> Self { Self { log: CallLog::default(), delay: Duration::ZERO, failures: Vec::new(), gate: None } }

    /// Every operation takes at least `delay`, polling the abort flag.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every operation named `op` (see [`OpKind::name`]).
    pub fn fail_on(mut self, op: &str, kind: EngineErrorKind) -> Self {
        self.failures.push((op.to_string(), kind));
        self
    }

    /// Block each operation until the returned [`Gate`] releases it.
    pub fn gated(mut self) -> (Self, Gate) {
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        self.gate = Some(GateSide { entered: entered_tx, release: release_rx });
        (self, Gate { entered: entered_rx, release: release_tx })
    }

    pub fn log(&self) -> CallLog { self.log.clone() }
}

impl CodecEngine for ScriptedEngine {
    fn execute(&mut self, op: &OpKind, inputs: &[Input<'_>], control: &ExecutionControl) -> Result<Vec<u8>, EngineErrorKind> {
        let name = op.name();
        self.log.0.lock().push(name.to_string());
        if let Some(gate) = &self.gate {
            let _ = gate.entered.send(name.to_string());
            let _ = gate.release.recv_timeout(Duration::from_secs(10));
        }
        let step = Duration::from_millis(2);
        let mut waited = Duration::ZERO;
        while waited < self.delay {
            if control.is_aborted() {
                return Err(EngineErrorKind::Aborted);
            }
            std::thread::sleep(step);
            waited += step;
        }
        if let Some((_, kind)) = self.failures.iter().find(|(n, _)| n == name) {
            return Err(kind.clone());
        }
        let mut out = name.as_bytes().to_vec();
        for input in inputs {
            match input {
                Input::Source(uri) => out.extend_from_slice(uri.as_bytes()),
                Input::Buffer(buf) => out.extend_from_slice(&(buf.len() as u32).to_le_bytes()),
            }
        }
        Ok(out)
    }
}
