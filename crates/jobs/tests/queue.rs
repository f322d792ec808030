use std::time::Duration;

use jobs::{
    BufferRef, CancelReason, EngineErrorKind, EngineOperation, EngineTaskQueue, Lane, OpKind, ScriptedEngine, StreamKind, Submission, TaskEvent,
};

const WAIT: Duration = Duration::from_secs(5);

fn decode(uri: &str) -> EngineOperation {
    EngineOperation::new(
        OpKind::DecodeTrim { stream: StreamKind::Video, trim_in: 0.0, trim_out: 1.0, speed: 1.0 },
        vec![BufferRef::Source { uri: uri.into() }],
    )
}

fn gain(input: usize) -> EngineOperation { EngineOperation::new(OpKind::Gain { gain: 0.5 }, vec![BufferRef::Output { index: input }]) }

#[test]
fn submissions_run_in_fifo_order() {
    let engine = ScriptedEngine::new();
    let log = engine.log();
    let queue = EngineTaskQueue::start(engine);
    let a = queue.submit(Submission::new(Lane::Export, vec![decode("a")]));
    let b = queue.submit(Submission::new(Lane::Render, vec![EngineOperation::new(OpKind::Reverse, vec![])]));
    let c = queue.submit(Submission::new(Lane::preview("scrub"), vec![EngineOperation::new(OpKind::Waveform { samples: 4 }, vec![])]));
    for h in [&a, &b, &c] {
        assert!(h.wait_timeout(WAIT).expect("finished").is_ok());
    }
    assert_eq!(log.snapshot(), vec!["decode_trim", "reverse", "waveform"]);
}

#[test]
fn completed_buffer_is_last_operation_output() {
    let queue = EngineTaskQueue::start(ScriptedEngine::new());
    let handle = queue.submit(Submission::new(Lane::Export, vec![decode("clip"), gain(0)]));
    let out = handle.wait().unwrap();
    assert!(out.starts_with(b"gain"));
}

#[test]
fn cancelled_queued_preview_gets_no_progress_or_completion() {
    let (engine, gate) = ScriptedEngine::new().gated();
    let queue = EngineTaskQueue::start(engine);
    let blocker = queue.submit(Submission::new(Lane::Export, vec![decode("long")]));
    assert_eq!(gate.wait_entered(WAIT).as_deref(), Some("decode_trim"));

    let preview = queue.submit(Submission::new(Lane::preview("scrub"), vec![decode("frame")]));
    assert!(preview.cancel());
    gate.release();
    assert!(blocker.wait_timeout(WAIT).expect("finished").is_ok());

    let events = preview.drain();
    assert!(matches!(events.as_slice(), [TaskEvent::Cancelled(CancelReason::Requested)]), "{events:?}");
}

#[test]
fn newer_preview_supersedes_queued_one() {
    let (engine, gate) = ScriptedEngine::new().gated();
    let log = engine.log();
    let queue = EngineTaskQueue::start(engine);
    let export = queue.submit(Submission::new(Lane::Export, vec![decode("export")]));
    gate.wait_entered(WAIT);

    let old = queue.submit(Submission::new(Lane::preview("scrub"), vec![decode("old")]));
    let thumb = queue.submit(Submission::new(Lane::preview("thumb"), vec![decode("thumb")]));
    let new = queue.submit(Submission::new(Lane::preview("scrub"), vec![decode("new")]));
    assert!(matches!(old.wait_timeout(WAIT), Some(Err(e)) if e.kind == EngineErrorKind::Cancelled(CancelReason::Superseded)));

    for _ in 0..3 {
        gate.release();
    }
    assert!(export.wait_timeout(WAIT).expect("export").is_ok());
    assert!(thumb.wait_timeout(WAIT).expect("thumb").is_ok());
    assert!(new.wait_timeout(WAIT).expect("new").is_ok());
    assert_eq!(log.len(), 3);
}

#[test]
fn in_flight_preview_finishes_current_op_then_drops_rest() {
    let (engine, gate) = ScriptedEngine::new().gated();
    let log = engine.log();
    let queue = EngineTaskQueue::start(engine);
    let old = queue.submit(Submission::new(Lane::preview("scrub"), vec![decode("old"), gain(0)]));
    gate.wait_entered(WAIT);

    let new = queue.submit(Submission::new(Lane::preview("scrub"), vec![decode("new")]));
    gate.release();
    assert!(matches!(old.wait_timeout(WAIT), Some(Err(e)) if e.kind == EngineErrorKind::Cancelled(CancelReason::Superseded)));
    gate.release();
    assert!(new.wait_timeout(WAIT).expect("new").is_ok());
    assert_eq!(log.snapshot(), vec!["decode_trim", "decode_trim"]);
}

#[test]
fn export_failure_reports_failing_operation() {
    let engine = ScriptedEngine::new().fail_on("gain", EngineErrorKind::Codec("bad sample format".into()));
    let log = engine.log();
    let queue = EngineTaskQueue::start(engine);
    let ops = vec![decode("a"), gain(0), EngineOperation::new(OpKind::Reverse, vec![BufferRef::Output { index: 1 }])];
    let err = queue.submit(Submission::new(Lane::Export, ops)).wait().unwrap_err();
    assert_eq!(err.op_index, Some(1));
    assert_eq!(err.stage.as_deref(), Some("gain"));
    assert_eq!(log.snapshot(), vec!["decode_trim", "gain"]);
}

#[test]
fn timeout_is_reported_as_engine_error() {
    let queue = EngineTaskQueue::start(ScriptedEngine::new().with_delay(Duration::from_millis(300)));
    let handle = queue.submit(Submission::new(Lane::Export, vec![decode("slow"), gain(0)]).with_timeout(Duration::from_millis(20)));
    let err = handle.wait_timeout(WAIT).expect("finished").unwrap_err();
    assert!(err.is_timeout(), "{err}");
}

#[test]
fn cancelling_preview_lane_leaves_export_alone() {
    let (engine, gate) = ScriptedEngine::new().gated();
    let queue = EngineTaskQueue::start(engine);
    let blocker = queue.submit(Submission::new(Lane::Render, vec![decode("r")]));
    gate.wait_entered(WAIT);
    let export = queue.submit(Submission::new(Lane::Export, vec![decode("e")]));
    let preview = queue.submit(Submission::new(Lane::preview("scrub"), vec![decode("p")]));
    queue.cancel_lane(&Lane::preview("scrub"));
    gate.release();
    gate.release();
    assert!(blocker.wait_timeout(WAIT).expect("render").is_ok());
    assert!(export.wait_timeout(WAIT).expect("export").is_ok());
    assert!(preview.wait_timeout(WAIT).expect("preview").unwrap_err().is_cancelled());
}

#[test]
fn empty_submission_completes_with_empty_buffer() {
    let queue = EngineTaskQueue::start(ScriptedEngine::new());
    let out = queue.submit(Submission::new(Lane::Export, Vec::new())).wait().unwrap();
    assert!(out.is_empty());
}

#[test]
fn forward_reference_is_rejected_before_running() {
    let engine = ScriptedEngine::new();
    let log = engine.log();
    let queue = EngineTaskQueue::start(engine);
    let err = queue.submit(Submission::new(Lane::Export, vec![gain(0)])).wait().unwrap_err();
    assert!(matches!(err.kind, EngineErrorKind::InvalidInput(_)));
    assert!(log.is_empty());
}

#[test]
fn submit_after_shutdown_fails() {
    let queue = EngineTaskQueue::start(ScriptedEngine::new());
    queue.shutdown();
    let err = queue.submit(Submission::new(Lane::Export, vec![decode("a")])).wait().unwrap_err();
    assert_eq!(err.kind, EngineErrorKind::WorkerStopped);
}
