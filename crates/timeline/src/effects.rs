//! Per-clip filters and clip-to-clip transitions.
//!
//! Both are closed sets so every consumer (validation, the render plan
//! compiler) matches them exhaustively.

use serde::{Deserialize, Serialize};

use crate::ids::{ClipId, FilterId};
use crate::types::TrackKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub id: FilterId,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    pub kind: FilterKind,
}

fn enabled_default() -> bool { true }

impl Filter {
    pub fn new(kind: FilterKind) -> Self { Self { id: FilterId::new(), enabled: true, kind } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterKind {
    ColorAdjust { brightness: f32, contrast: f32, saturation: f32, gamma: f32 },
    Crop { x: u32, y: u32, width: u32, height: u32 },
    Rotate { degrees: f32 },
    Resize { width: u32, height: u32 },
    TextOverlay { text: String, x: i32, y: i32, font_size: u32, color: String },
    Watermark { source: String, corner: Corner, opacity: f32, scale: f32 },
    /// Rate ramps linearly from `from` to `to` across the clip; the clip's
    /// timeline duration is unchanged.
    SpeedRamp { from: f64, to: f64 },
    Reverse,
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::ColorAdjust { .. } => "color_adjust",
            FilterKind::Crop { .. } => "crop",
            FilterKind::Rotate { .. } => "rotate",
            FilterKind::Resize { .. } => "resize",
            FilterKind::TextOverlay { .. } => "text_overlay",
            FilterKind::Watermark { .. } => "watermark",
            FilterKind::SpeedRamp { .. } => "speed_ramp",
            FilterKind::Reverse => "reverse",
        }
    }

    pub fn applies_to(&self, track: TrackKind) -> bool {
        match self {
            FilterKind::SpeedRamp { .. } | FilterKind::Reverse => true,
            _ => track == TrackKind::Video,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            FilterKind::ColorAdjust { brightness, contrast, saturation, gamma } => {
                if !(-1.0..=1.0).contains(brightness) { return Err(format!("brightness {brightness} outside -1..=1")); }
                if !(0.0..=4.0).contains(contrast) { return Err(format!("contrast {contrast} outside 0..=4")); }
                if !(0.0..=3.0).contains(saturation) { return Err(format!("saturation {saturation} outside 0..=3")); }
                if !(*gamma > 0.0 && *gamma <= 10.0) { return Err(format!("gamma {gamma} outside (0, 10]")); }
                Ok(())
            }
            FilterKind::Crop { width, height, .. } | FilterKind::Resize { width, height } => {
                if *width == 0 || *height == 0 { Err("zero-sized crop/resize".into()) } else { Ok(()) }
            }
            FilterKind::Rotate { degrees } => {
                if degrees.is_finite() { Ok(()) } else { Err("rotation must be finite".into()) }
            }
            FilterKind::TextOverlay { text, font_size, .. } => {
                if text.is_empty() { return Err("empty overlay text".into()); }
                if *font_size == 0 { return Err("font size must be non-zero".into()); }
                Ok(())
            }
            FilterKind::Watermark { source, opacity, scale, .. } => {
                if source.is_empty() { return Err("watermark source is empty".into()); }
                if !(0.0..=1.0).contains(opacity) { return Err(format!("opacity {opacity} outside 0..=1")); }
                if !(*scale > 0.0 && *scale <= 1.0) { return Err(format!("scale {scale} outside (0, 1]")); }
                Ok(())
            }
            FilterKind::SpeedRamp { from, to } => {
                let ok = |r: f64| r.is_finite() && r > 0.0;
                if ok(*from) && ok(*to) { Ok(()) } else { Err(format!("speed ramp {from} -> {to} must be positive")) }
            }
            FilterKind::Reverse => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WipeDirection {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionKind {
    Cut,
    Crossfade,
    Wipe { direction: WipeDirection },
}

impl TransitionKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransitionKind::Cut => "cut",
            TransitionKind::Crossfade => "crossfade",
            TransitionKind::Wipe { .. } => "wipe",
        }
    }
}

/// Bridge from the owning clip into `to`, the next clip on the same track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    pub duration: f64,
    pub to: ClipId,
}

impl Transition {
    pub fn new(kind: TransitionKind, duration: f64, to: ClipId) -> Self { Self { kind, duration, to } }

    /// Shape checks that do not depend on the neighbouring clips.
    pub fn validate(&self, track: TrackKind) -> Result<(), String> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(format!("transition duration {} must be finite and non-negative", self.duration));
        }
        match (&self.kind, track) {
            (TransitionKind::Cut, _) if self.duration != 0.0 => Err("a cut has no duration".into()),
            (TransitionKind::Cut, _) => Ok(()),
            (_, _) if self.duration == 0.0 => Err(format!("{} needs a positive duration", self.kind.name())),
            (TransitionKind::Wipe { .. }, TrackKind::Audio) => Err("wipe is a video-only transition".into()),
            _ => Ok(()),
        }
    }
}
