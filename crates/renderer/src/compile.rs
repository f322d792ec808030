use std::collections::HashSet;

use jobs::{Anchor, BlendKind, BufferRef, EngineOperation, OpKind, StreamKind, WipeEdge};
use media_io::MediaRegistry;
use timeline::{clips_needing_remediation, AudioCodec, Clip, ClipId, Corner, FilterKind, Project, Track, TrackKind, TransitionKind, VideoCodec, WipeDirection, TIME_EPSILON};
use tracing::debug;

use crate::{CompileError, RenderPlan, RenderRequest, TimeRange};

const FRAME_MIME: &str = "image/png";
const WAVEFORM_MIME: &str = "application/octet-stream";

/// Compile `request` against `project` into an ordered operation list.
pub fn compile(project: &Project, assets: &MediaRegistry, request: &RenderRequest) -> Result<RenderPlan, CompileError> {
    let settings = &project.settings;
    let plan = match request {
        RenderRequest::Export { range } => compile_export(project, assets, *range)?,
        RenderRequest::PreviewFrame { time } => compile_frame(project, assets, *time, settings.width, settings.height)?,
        RenderRequest::Thumbnail { time, width, height } => {
            if *width == 0 || *height == 0 {
                return Err(CompileError::InvalidSize { width: *width, height: *height });
            }
            compile_frame(project, assets, *time, *width, *height)?
        }
        RenderRequest::Waveform { clip_id, samples } => compile_waveform(project, assets, *clip_id, *samples)?,
    };
    debug!(request = request.name(), ops = plan.operations.len(), duration = plan.duration, "render plan compiled");
    Ok(plan)
}

#[derive(Default)]
struct OpList {
    ops: Vec<EngineOperation>,
}

impl OpList {
    fn push(&mut self, op: OpKind, inputs: Vec<BufferRef>) -> BufferRef {
        self.ops.push(EngineOperation::new(op, inputs));
        BufferRef::Output { index: self.ops.len() - 1 }
    }
}

/// Part of `clip` inside `window`, in timeline time.
fn visible(clip: &Clip, window: TimeRange) -> Option<TimeRange> {
    let start = clip.start.max(window.start);
    let end = clip.end().min(window.end);
    (end - start > TIME_EPSILON).then(|| TimeRange::new(start, end))
}

/// Refuse to render clips whose media is missing or unusable, listing them all.
fn check_media(project: &Project, assets: &MediaRegistry, window: TimeRange, rendered: impl Fn(&Track) -> bool) -> Result<(), CompileError> {
    let flagged: HashSet<ClipId> = clips_needing_remediation(project, assets).into_iter().collect();
    if flagged.is_empty() {
        return Ok(());
    }
    let hit: Vec<ClipId> = project
        .tracks
        .iter()
        .filter(|t| rendered(t))
        .flat_map(|t| t.clips.iter())
        .filter(|c| flagged.contains(&c.id) && visible(c, window).is_some())
        .map(|c| c.id)
        .collect();
    if hit.is_empty() { Ok(()) } else { Err(CompileError::InvalidClips(hit)) }
}

fn anchor(corner: Corner) -> Anchor {
    match corner {
        Corner::TopLeft => Anchor::TopLeft,
        Corner::TopRight => Anchor::TopRight,
        Corner::BottomLeft => Anchor::BottomLeft,
        Corner::BottomRight => Anchor::BottomRight,
    }
}

/// Engine op for one filter on one stream, plus any extra inputs it reads.
/// Picture-only filters are skipped on the audio stream.
fn filter_op(kind: &FilterKind, stream: StreamKind) -> Option<(OpKind, Vec<BufferRef>)> {
    let op = match kind {
        FilterKind::SpeedRamp { from, to } => OpKind::SpeedRamp { from: *from, to: *to },
        FilterKind::Reverse => OpKind::Reverse,
        _ if stream == StreamKind::Audio => return None,
        FilterKind::ColorAdjust { brightness, contrast, saturation, gamma } => {
            OpKind::ColorAdjust { brightness: *brightness, contrast: *contrast, saturation: *saturation, gamma: *gamma }
        }
        FilterKind::Crop { x, y, width, height } => OpKind::Crop { x: *x, y: *y, width: *width, height: *height },
        FilterKind::Rotate { degrees } => OpKind::Rotate { degrees: *degrees },
        FilterKind::Resize { width, height } => OpKind::Scale { width: *width, height: *height },
        FilterKind::TextOverlay { text, x, y, font_size, color } => {
            OpKind::DrawText { text: text.clone(), x: *x, y: *y, font_size: *font_size, color: color.clone() }
        }
        FilterKind::Watermark { source, corner, opacity, scale } => {
            let op = OpKind::Overlay { anchor: anchor(*corner), opacity: *opacity, scale: *scale };
            return Some((op, vec![BufferRef::Source { uri: source.clone() }]));
        }
    };
    Some((op, Vec::new()))
}

fn blend_kind(kind: &TransitionKind, stream: StreamKind) -> Option<BlendKind> {
    match (kind, stream) {
        (TransitionKind::Cut, _) => None,
        (TransitionKind::Crossfade, _) | (TransitionKind::Wipe { .. }, StreamKind::Audio) => Some(BlendKind::Crossfade),
        (TransitionKind::Wipe { direction }, StreamKind::Video) => Some(BlendKind::Wipe {
            edge: match direction {
                WipeDirection::Left => WipeEdge::Left,
                WipeDirection::Right => WipeEdge::Right,
                WipeDirection::Up => WipeEdge::Up,
                WipeDirection::Down => WipeEdge::Down,
            },
        }),
    }
}

/// Decode `span` of the clip's source, then its filters in order, then clip gain.
fn decode_chain(ops: &mut OpList, uri: &str, clip: &Clip, stream: StreamKind, span: TimeRange) -> BufferRef {
    let decode = OpKind::DecodeTrim { stream, trim_in: clip.source_time(span.start), trim_out: clip.source_time(span.end), speed: clip.speed };
    let mut out = ops.push(decode, vec![BufferRef::Source { uri: uri.to_string() }]);
    for filter in clip.filters.iter().filter(|f| f.enabled) {
        if let Some((op, extra)) = filter_op(&filter.kind, stream) {
            let mut inputs = vec![out];
            inputs.extend(extra);
            out = ops.push(op, inputs);
        }
    }
    if stream == StreamKind::Audio && clip.volume != 1.0 {
        out = ops.push(OpKind::Gain { gain: clip.volume }, vec![out]);
    }
    out
}

/// One stream of one track over `window`, or `None` if nothing on it is visible.
fn track_chain(ops: &mut OpList, assets: &MediaRegistry, track: &Track, stream: StreamKind, window: TimeRange) -> Result<Option<BufferRef>, CompileError> {
    let mut segments: Vec<BufferRef> = Vec::new();
    let mut last_placed: Option<ClipId> = None;
    for (i, clip) in track.clips.iter().enumerate() {
        let Some(span) = visible(clip, window) else { continue };
        let asset = assets.get(clip.asset_id).ok_or_else(|| CompileError::InvalidClips(vec![clip.id]))?;
        let carries = match stream {
            StreamKind::Video => asset.kind.has_picture(),
            StreamKind::Audio => asset.kind.has_sound(),
        };
        if !carries {
            continue;
        }
        let chain = decode_chain(ops, &asset.source, clip, stream, span);
        let placed = ops.push(OpKind::Place { start: span.start - window.start, duration: span.duration() }, vec![chain]);

        let incoming = i
            .checked_sub(1)
            .map(|p| &track.clips[p])
            .filter(|prev| last_placed == Some(prev.id))
            .and_then(|prev| prev.transition.as_ref())
            .filter(|t| t.to == clip.id)
            .and_then(|t| blend_kind(&t.kind, stream).map(|kind| (kind, t.duration)));
        match (incoming, segments.pop()) {
            (Some((kind, duration)), Some(prev)) => {
                let at = clip.start - window.start;
                segments.push(ops.push(OpKind::Blend { kind, duration, at }, vec![prev, placed]));
            }
            (_, prev) => {
                segments.extend(prev);
                segments.push(placed);
            }
        }
        last_placed = Some(clip.id);
    }
    if segments.is_empty() {
        return Ok(None);
    }
    Ok(Some(ops.push(OpKind::Concat { stream, duration: window.duration() }, segments)))
}

struct Layers {
    video: Vec<BufferRef>,
    audio: Vec<(BufferRef, f32)>,
}

/// Per-track chains, bottom track first. Hidden tracks contribute no picture
/// and muted tracks no sound; video tracks also carry their clips' audio.
fn layers(ops: &mut OpList, project: &Project, assets: &MediaRegistry, window: TimeRange, with_audio: bool) -> Result<Layers, CompileError> {
    let mut out = Layers { video: Vec::new(), audio: Vec::new() };
    for track in &project.tracks {
        if track.kind == TrackKind::Video && !track.flags.hidden {
            if let Some(v) = track_chain(ops, assets, track, StreamKind::Video, window)? {
                out.video.push(v);
            }
        }
        if with_audio && !track.flags.muted {
            if let Some(a) = track_chain(ops, assets, track, StreamKind::Audio, window)? {
                out.audio.push((a, track.volume));
            }
        }
    }
    Ok(out)
}

fn is_rendered(track: &Track, with_audio: bool) -> bool {
    let picture = track.kind == TrackKind::Video && !track.flags.hidden;
    picture || (with_audio && !track.flags.muted)
}

fn video_codec_name(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::H264 => "h264",
        VideoCodec::H265 => "h265",
        VideoCodec::Vp9 => "vp9",
        VideoCodec::Av1 => "av1",
    }
}

fn audio_codec_name(codec: AudioCodec) -> &'static str {
    match codec {
        AudioCodec::Aac => "aac",
        AudioCodec::Opus => "opus",
        AudioCodec::Mp3 => "mp3",
    }
}

fn compile_export(project: &Project, assets: &MediaRegistry, range: Option<TimeRange>) -> Result<RenderPlan, CompileError> {
    let settings = &project.settings;
    let mime = settings.container.mime();
    if project.is_empty() {
        return Ok(RenderPlan::empty(mime));
    }
    let total = project.duration();
    let window = match range {
        None => TimeRange::new(0.0, total),
        Some(r) => {
            if !(r.start.is_finite() && r.end.is_finite()) || r.start < 0.0 || r.end <= r.start {
                return Err(CompileError::InvalidRange { start: r.start, end: r.end });
            }
            TimeRange::new(r.start, r.end.min(total))
        }
    };
    if window.duration() <= TIME_EPSILON {
        return Err(CompileError::InvalidRange { start: window.start, end: window.end });
    }
    check_media(project, assets, window, |t| is_rendered(t, true))?;

    let mut ops = OpList::default();
    let Layers { video, audio } = layers(&mut ops, project, assets, window, true)?;
    let picture = (!video.is_empty()).then(|| ops.push(OpKind::Composite { width: settings.width, height: settings.height, frame_rate: settings.frame_rate }, video));
    let sound = (!audio.is_empty()).then(|| {
        let (inputs, weights): (Vec<BufferRef>, Vec<f32>) = audio.into_iter().unzip();
        ops.push(OpKind::Mix { weights, sample_rate: settings.sample_rate }, inputs)
    });
    if picture.is_none() && sound.is_none() {
        return Err(CompileError::NothingToRender);
    }
    let encode = OpKind::Encode {
        container: settings.container.extension().to_string(),
        mime: mime.to_string(),
        video_codec: picture.as_ref().map(|_| video_codec_name(settings.video_codec).to_string()),
        audio_codec: sound.as_ref().map(|_| audio_codec_name(settings.audio_codec).to_string()),
        width: settings.width,
        height: settings.height,
        frame_rate: settings.frame_rate,
        sample_rate: settings.sample_rate,
        crf: settings.crf,
        audio_bitrate_kbps: settings.audio_bitrate_kbps,
    };
    ops.push(encode, picture.into_iter().chain(sound).collect());
    Ok(RenderPlan { operations: ops.ops, duration: window.duration(), mime: mime.to_string() })
}

/// A single still at `time`. Times past the end or over a gap give an empty
/// plan, meaning "no frame".
fn compile_frame(project: &Project, assets: &MediaRegistry, time: f64, width: u32, height: u32) -> Result<RenderPlan, CompileError> {
    if !time.is_finite() || time < 0.0 {
        return Err(CompileError::InvalidTime(time));
    }
    if project.is_empty() || time >= project.duration() {
        return Ok(RenderPlan::empty(FRAME_MIME));
    }
    let settings = &project.settings;
    let window = TimeRange::new(time, time + 1.0 / settings.frame_rate);
    check_media(project, assets, window, |t| is_rendered(t, false))?;

    let mut ops = OpList::default();
    let Layers { video, .. } = layers(&mut ops, project, assets, window, false)?;
    if video.is_empty() {
        return Ok(RenderPlan::empty(FRAME_MIME));
    }
    let composite = ops.push(OpKind::Composite { width: settings.width, height: settings.height, frame_rate: settings.frame_rate }, video);
    ops.push(OpKind::ExtractFrame { time: 0.0, width, height }, vec![composite]);
    Ok(RenderPlan { operations: ops.ops, duration: 0.0, mime: FRAME_MIME.to_string() })
}

fn compile_waveform(project: &Project, assets: &MediaRegistry, clip_id: ClipId, samples: u32) -> Result<RenderPlan, CompileError> {
    if samples == 0 {
        return Err(CompileError::NoSamples);
    }
    let clip = project.clip(clip_id).ok_or(CompileError::ClipNotFound(clip_id))?;
    let asset = assets.get(clip.asset_id).filter(|a| a.is_ready()).ok_or_else(|| CompileError::InvalidClips(vec![clip_id]))?;
    if !asset.kind.has_sound() {
        return Err(CompileError::NoAudio(asset.id));
    }
    let mut ops = OpList::default();
    let span = TimeRange::new(clip.start, clip.end());
    let chain = decode_chain(&mut ops, &asset.source, clip, StreamKind::Audio, span);
    ops.push(OpKind::Waveform { samples }, vec![chain]);
    Ok(RenderPlan { operations: ops.ops, duration: clip.duration(), mime: WAVEFORM_MIME.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_io::{AssetId, MediaKind, ProbeError, ProbedMetadata};
    use timeline::{Filter, OutputSettings, TrackFlags, Transition};

    struct Fixture {
        project: Project,
        assets: MediaRegistry,
        video: AssetId,
        music: AssetId,
        still: AssetId,
    }

    fn probe(_: &str, kind: MediaKind) -> Result<ProbedMetadata, ProbeError> {
        let picture = kind.has_picture();
        Ok(ProbedMetadata {
            duration: if kind == MediaKind::Image { 0.0 } else { 20.0 },
            width: picture.then_some(1920),
            height: picture.then_some(1080),
            frame_rate: picture.then_some(30.0),
            codec: None,
            sample_rate: kind.has_sound().then_some(48_000),
            byte_size: 1,
        })
    }

    fn fixture() -> Fixture {
        let mut assets = MediaRegistry::new();
        let video = assets.import("media/a.mp4", &probe).unwrap().id;
        let music = assets.import("media/music.mp3", &probe).unwrap().id;
        let still = assets.import("media/logo.png", &probe).unwrap().id;
        Fixture { project: Project::new("render", OutputSettings::default()), assets, video, music, still }
    }

    impl Fixture {
        fn track(&mut self, kind: TrackKind) -> timeline::TrackId {
            let track = Track::new(kind, "T");
            let id = track.id;
            let at = self.project.tracks.len();
            self.project.insert_track(track, at).unwrap();
            id
        }

        fn clip(&mut self, track: timeline::TrackId, asset: AssetId, start: f64, trim_in: f64, trim_out: f64) -> ClipId {
            let clip = Clip::new(track, asset, start, trim_in, trim_out);
            let id = clip.id;
            self.project.add_clip(&self.assets, clip).unwrap();
            id
        }

        fn export(&self, range: Option<TimeRange>) -> Result<RenderPlan, CompileError> { compile(&self.project, &self.assets, &RenderRequest::Export { range }) }
    }

    fn names(plan: &RenderPlan) -> Vec<&'static str> { plan.operations.iter().map(|o| o.name()).collect() }

    #[test]
    fn empty_project_exports_nothing() {
        let f = fixture();
        let plan = f.export(None).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.duration, 0.0);
        assert_eq!(plan.mime, "video/mp4");
    }

    #[test]
    fn single_clip_export_pipeline() {
        let mut f = fixture();
        let v1 = f.track(TrackKind::Video);
        f.clip(v1, f.video, 0.0, 0.0, 10.0);
        let plan = f.export(None).unwrap();
        assert_eq!(
            names(&plan),
            vec!["decode_trim", "place", "concat", "decode_trim", "place", "concat", "composite", "mix", "encode"]
        );
        assert_eq!(plan.duration, 10.0);
        assert!(check_references(&plan));
        let OpKind::Encode { video_codec, audio_codec, crf, .. } = &plan.operations[8].op else { panic!("encode last") };
        assert_eq!(video_codec.as_deref(), Some("h264"));
        assert_eq!(audio_codec.as_deref(), Some("aac"));
        assert_eq!(*crf, 18);
    }

    fn check_references(plan: &RenderPlan) -> bool { jobs::check_references(&plan.operations).is_ok() }

    #[test]
    fn filters_follow_recorded_order_and_skip_disabled() {
        let mut f = fixture();
        let v1 = f.track(TrackKind::Video);
        f.project.set_track_flags(v1, TrackFlags { muted: true, ..Default::default() }).unwrap();
        let clip = f.clip(v1, f.video, 0.0, 0.0, 5.0);
        let mut off = Filter::new(FilterKind::Reverse);
        off.enabled = false;
        f.project.add_filter(clip, Filter::new(FilterKind::Rotate { degrees: 90.0 }), None).unwrap();
        f.project.add_filter(clip, off, None).unwrap();
        f.project
            .add_filter(clip, Filter::new(FilterKind::ColorAdjust { brightness: 0.1, contrast: 1.0, saturation: 1.0, gamma: 1.0 }), None)
            .unwrap();
        let plan = f.export(None).unwrap();
        assert_eq!(names(&plan), vec!["decode_trim", "rotate", "color_adjust", "place", "concat", "composite", "encode"]);
    }

    #[test]
    fn transition_becomes_blend() {
        let mut f = fixture();
        let v1 = f.track(TrackKind::Video);
        f.project.set_track_flags(v1, TrackFlags { muted: true, ..Default::default() }).unwrap();
        let a = f.clip(v1, f.video, 0.0, 0.0, 4.0);
        let b = f.clip(v1, f.video, 4.0, 4.0, 8.0);
        f.project.set_transition(a, Transition::new(TransitionKind::Crossfade, 1.0, b)).unwrap();
        let plan = f.export(None).unwrap();
        assert_eq!(names(&plan), vec!["decode_trim", "place", "decode_trim", "place", "blend", "concat", "composite", "encode"]);
        assert_eq!(plan.operations[4].inputs, vec![BufferRef::Output { index: 1 }, BufferRef::Output { index: 3 }]);
        assert_eq!(plan.operations[5].inputs, vec![BufferRef::Output { index: 4 }]);
    }

    #[test]
    fn range_export_clips_trim_windows() {
        let mut f = fixture();
        let a1 = f.track(TrackKind::Audio);
        f.clip(a1, f.music, 0.0, 0.0, 10.0);
        let plan = f.export(Some(TimeRange::new(2.0, 5.0))).unwrap();
        assert_eq!(names(&plan), vec!["decode_trim", "place", "concat", "mix", "encode"]);
        assert_eq!(plan.duration, 3.0);
        let OpKind::DecodeTrim { trim_in, trim_out, .. } = plan.operations[0].op else { panic!() };
        assert_eq!((trim_in, trim_out), (2.0, 5.0));
        assert_eq!(plan.operations[1].op, OpKind::Place { start: 0.0, duration: 3.0 });
        assert!(matches!(f.export(Some(TimeRange::new(5.0, 2.0))), Err(CompileError::InvalidRange { .. })));
    }

    #[test]
    fn tracks_stack_bottom_first_and_mix_by_volume() {
        let mut f = fixture();
        let v1 = f.track(TrackKind::Video);
        let v2 = f.track(TrackKind::Video);
        let a1 = f.track(TrackKind::Audio);
        f.project.set_track_volume(a1, 0.5).unwrap();
        f.clip(v1, f.video, 0.0, 0.0, 3.0);
        f.clip(v2, f.still, 0.0, 0.0, 3.0);
        f.clip(a1, f.music, 0.0, 0.0, 3.0);
        let plan = f.export(None).unwrap();
        let composite = plan.operations.iter().find(|o| o.name() == "composite").unwrap();
        assert_eq!(composite.inputs.len(), 2);
        let (BufferRef::Output { index: lower }, BufferRef::Output { index: upper }) = (&composite.inputs[0], &composite.inputs[1]) else { panic!() };
        assert!(lower < upper);
        let mix = plan.operations.iter().find(|o| o.name() == "mix").unwrap();
        assert_eq!(mix.op, OpKind::Mix { weights: vec![1.0, 0.5], sample_rate: 48_000 });
    }

    #[test]
    fn muted_and_hidden_tracks_are_skipped() {
        let mut f = fixture();
        let v1 = f.track(TrackKind::Video);
        f.clip(v1, f.video, 0.0, 0.0, 3.0);
        f.project.set_track_flags(v1, TrackFlags { muted: true, hidden: true, locked: false }).unwrap();
        assert_eq!(f.export(None), Err(CompileError::NothingToRender));
    }

    #[test]
    fn invalid_media_is_reported() {
        let mut f = fixture();
        let v1 = f.track(TrackKind::Video);
        let broken = f.assets.begin_import("media/broken.mp4").unwrap();
        let _ = f.assets.finish_probe(broken, Err(ProbeError::ProbeFailed("bad header".into())));
        let clip = Clip::new(v1, broken, 0.0, 0.0, 2.0);
        let id = clip.id;
        f.project.tracks[0].clips.push(clip);
        assert_eq!(f.export(None), Err(CompileError::InvalidClips(vec![id])));
    }

    #[test]
    fn preview_frame_is_video_only() {
        let mut f = fixture();
        let v1 = f.track(TrackKind::Video);
        let a1 = f.track(TrackKind::Audio);
        f.clip(v1, f.video, 0.0, 0.0, 3.0);
        f.clip(v1, f.video, 5.0, 0.0, 3.0);
        f.clip(a1, f.music, 0.0, 0.0, 8.0);
        let plan = compile(&f.project, &f.assets, &RenderRequest::PreviewFrame { time: 1.0 }).unwrap();
        assert_eq!(names(&plan), vec!["decode_trim", "place", "concat", "composite", "extract_frame"]);
        assert_eq!(plan.mime, "image/png");
        let gap = compile(&f.project, &f.assets, &RenderRequest::PreviewFrame { time: 4.0 }).unwrap();
        assert!(gap.is_empty());
        let thumb = compile(&f.project, &f.assets, &RenderRequest::Thumbnail { time: 1.0, width: 160, height: 90 }).unwrap();
        assert_eq!(thumb.operations.last().unwrap().op, OpKind::ExtractFrame { time: 0.0, width: 160, height: 90 });
        assert!(matches!(compile(&f.project, &f.assets, &RenderRequest::PreviewFrame { time: -1.0 }), Err(CompileError::InvalidTime(_))));
    }

    #[test]
    fn waveform_for_audio_clip() {
        let mut f = fixture();
        let a1 = f.track(TrackKind::Audio);
        let v1 = f.track(TrackKind::Video);
        let song = f.clip(a1, f.music, 0.0, 0.0, 6.0);
        f.project.set_clip_volume(song, 0.8).unwrap();
        let logo = f.clip(v1, f.still, 0.0, 0.0, 6.0);
        let plan = compile(&f.project, &f.assets, &RenderRequest::Waveform { clip_id: song, samples: 200 }).unwrap();
        assert_eq!(names(&plan), vec!["decode_trim", "gain", "waveform"]);
        assert_eq!(plan.duration, 6.0);
        assert!(matches!(compile(&f.project, &f.assets, &RenderRequest::Waveform { clip_id: logo, samples: 200 }), Err(CompileError::NoAudio(_))));
    }
}
