//! Engine operation descriptors.
//!
//! An operation list is self-contained: inputs are either source handles or
//! the output of an earlier operation in the same list, so the engine never
//! needs to know anything about the timeline that produced it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum BufferRef {
    Source { uri: String },
    /// Output of the operation at `index` in the same list.
    Output { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WipeEdge {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlendKind {
    Crossfade,
    Wipe { edge: WipeEdge },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpKind {
    /// Decode `[trim_in, trim_out)` of one stream and retime it by `speed`.
    DecodeTrim { stream: StreamKind, trim_in: f64, trim_out: f64, speed: f64 },
    ColorAdjust { brightness: f32, contrast: f32, saturation: f32, gamma: f32 },
    Crop { x: u32, y: u32, width: u32, height: u32 },
    Rotate { degrees: f32 },
    Scale { width: u32, height: u32 },
    DrawText { text: String, x: i32, y: i32, font_size: u32, color: String },
    /// Second input is laid over the first.
    Overlay { anchor: Anchor, opacity: f32, scale: f32 },
    SpeedRamp { from: f64, to: f64 },
    Reverse,
    Gain { gain: f32 },
    /// Position a segment at `start` on its track's timeline.
    Place { start: f64, duration: f64 },
    /// Blend the tail of the first input into the head of the second over
    /// `duration` seconds ending at `at`.
    Blend { kind: BlendKind, duration: f64, at: f64 },
    /// Join placed segments of one track, padding gaps, to `duration`.
    Concat { stream: StreamKind, duration: f64 },
    /// Stack video tracks, first input at the bottom.
    Composite { width: u32, height: u32, frame_rate: f64 },
    /// Weighted sum of audio tracks, one weight per input.
    Mix { weights: Vec<f32>, sample_rate: u32 },
    ExtractFrame { time: f64, width: u32, height: u32 },
    Waveform { samples: u32 },
    Encode {
        container: String,
        mime: String,
        video_codec: Option<String>,
        audio_codec: Option<String>,
        width: u32,
        height: u32,
        frame_rate: f64,
        sample_rate: u32,
        crf: u8,
        audio_bitrate_kbps: u32,
    },
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::DecodeTrim { .. } => "decode_trim",
            OpKind::ColorAdjust { .. } => "color_adjust",
            OpKind::Crop { .. } => "crop",
            OpKind::Rotate { .. } => "rotate",
            OpKind::Scale { .. } => "scale",
            OpKind::DrawText { .. } => "draw_text",
            OpKind::Overlay { .. } => "overlay",
            OpKind::SpeedRamp { .. } => "speed_ramp",
            OpKind::Reverse => "reverse",
            OpKind::Gain { .. } => "gain",
            OpKind::Place { .. } => "place",
            OpKind::Blend { .. } => "blend",
            OpKind::Concat { .. } => "concat",
            OpKind::Composite { .. } => "composite",
            OpKind::Mix { .. } => "mix",
            OpKind::ExtractFrame { .. } => "extract_frame",
            OpKind::Waveform { .. } => "waveform",
            OpKind::Encode { .. } => "encode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOperation {
    #[serde(flatten)]
    pub op: OpKind,
    pub inputs: Vec<BufferRef>,
}

impl EngineOperation {
    pub fn new(op: OpKind, inputs: Vec<BufferRef>) -> Self { Self { op, inputs } }

    pub fn name(&self) -> &'static str { self.op.name() }
}

/// Checks that every `Output` reference points strictly backwards.
pub fn check_references(ops: &[EngineOperation]) -> Result<(), (usize, usize)> {
    for (i, op) in ops.iter().enumerate() {
        for input in &op.inputs {
            if let BufferRef::Output { index } = input {
                if *index >= i {
                    return Err((i, *index));
                }
            }
        }
    }
    Ok(())
}
