//! cutline: inspect, validate and compile saved project documents.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use project::{ProjectDocument, ProjectStore, SchemaVersion, SqliteProjectStore};
use renderer::{compile, RenderRequest, TimeRange};
use serde::Serialize;
use session::SessionConfig;
use timeline::{clips_needing_remediation, format_duration, ClipId};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cutline", version, about = "Project document tooling for the cutline editor core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a document, migrating and checking every timeline invariant.
    Validate { doc: PathBuf },
    /// Summarize tracks, clips and assets.
    Inspect {
        doc: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the engine operation plan for a request as JSON.
    Compile {
        doc: PathBuf,
        #[arg(long, value_enum, default_value_t = RequestKind::Export)]
        request: RequestKind,
        /// Timeline seconds for preview and thumbnail requests.
        #[arg(long, default_value_t = 0.0)]
        time: f64,
        #[arg(long)]
        start: Option<f64>,
        #[arg(long)]
        end: Option<f64>,
        /// Clip id for waveform requests.
        #[arg(long)]
        clip: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Copy a document into the project store.
    Put {
        doc: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List stored projects.
    List {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RequestKind {
    Export,
    Preview,
    Thumbnail,
    Waveform,
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).try_init();
    let cli = Cli::parse();
    match cli.command {
        Command::Validate { doc } => validate(&doc),
        Command::Inspect { doc, json } => inspect(&doc, json),
        Command::Compile { doc, request, time, start, end, clip, config } => {
            let config = match config {
                Some(path) => SessionConfig::from_json_file(&path)?,
                None => SessionConfig::default(),
            };
            compile_plan(&doc, request, time, start.zip(end), clip.as_deref(), &config)
        }
        Command::Put { doc, db } => put(&doc, db),
        Command::List { db } => list(db),
    }
}

fn read_document(path: &Path) -> Result<ProjectDocument> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    project::load(&text).with_context(|| format!("loading {}", path.display()))
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteProjectStore> {
    match db {
        Some(path) => SqliteProjectStore::open_or_create(&path),
        None => SqliteProjectStore::open_default(),
    }
}

fn validate(path: &Path) -> Result<()> {
    let doc = read_document(path)?;
    let registry = doc.registry();
    let flagged = clips_needing_remediation(&doc.project, &registry);
    if !flagged.is_empty() {
        for id in &flagged {
            eprintln!("clip {id}: media missing or invalid");
        }
        bail!("{} clip(s) need remediation", flagged.len());
    }
    println!("ok: {} (schema {})", doc.project.name, SchemaVersion::CURRENT);
    Ok(())
}

#[derive(Serialize)]
struct Summary<'a> {
    id: String,
    name: &'a str,
    duration: f64,
    tracks: Vec<TrackSummary<'a>>,
    assets: usize,
    invalid_clips: Vec<ClipId>,
}

#[derive(Serialize)]
struct TrackSummary<'a> {
    name: &'a str,
    kind: String,
    clips: usize,
    end: f64,
    muted: bool,
    hidden: bool,
    locked: bool,
}

fn inspect(path: &Path, as_json: bool) -> Result<()> {
    let doc = read_document(path)?;
    let registry = doc.registry();
    let p = &doc.project;
    let summary = Summary {
        id: p.id.to_string(),
        name: &p.name,
        duration: p.duration(),
        tracks: p
            .tracks
            .iter()
            .map(|t| TrackSummary {
                name: &t.name,
                kind: format!("{:?}", t.kind).to_lowercase(),
                clips: t.clips.len(),
                end: t.end(),
                muted: t.flags.muted,
                hidden: t.flags.hidden,
                locked: t.flags.locked,
            })
            .collect(),
        assets: registry.len(),
        invalid_clips: clips_needing_remediation(p, &registry),
    };
    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("{} [{}]  {}", summary.name, summary.id, format_duration(summary.duration));
    for t in &summary.tracks {
        let flags: Vec<&str> = [(t.muted, "muted"), (t.hidden, "hidden"), (t.locked, "locked")].into_iter().filter(|(on, _)| *on).map(|(_, f)| f).collect();
        println!("  {:<12} {:<6} {:>3} clips  ends {}  {}", t.name, t.kind, t.clips, format_duration(t.end), flags.join(","));
    }
    for asset in registry.list() {
        println!("  asset {} {:?} {:?}", asset.name, asset.kind, asset.status);
    }
    if !summary.invalid_clips.is_empty() {
        println!("  {} clip(s) need remediation", summary.invalid_clips.len());
    }
    Ok(())
}

fn compile_plan(path: &Path, kind: RequestKind, time: f64, range: Option<(f64, f64)>, clip: Option<&str>, config: &SessionConfig) -> Result<()> {
    let doc = read_document(path)?;
    let registry = doc.registry();
    let request = match kind {
        RequestKind::Export => RenderRequest::Export { range: range.map(|(s, e)| TimeRange::new(s, e)) },
        RequestKind::Preview => RenderRequest::PreviewFrame { time },
        RequestKind::Thumbnail => RenderRequest::Thumbnail { time, width: config.thumbnail_width, height: config.thumbnail_height },
        RequestKind::Waveform => {
            let raw = clip.context("--clip is required for waveform requests")?;
            let clip_id: ClipId = serde_json::from_value(serde_json::Value::String(raw.to_string())).with_context(|| format!("bad clip id {raw}"))?;
            RenderRequest::Waveform { clip_id, samples: config.waveform_samples }
        }
    };
    let plan = compile(&doc.project, &registry, &request)?;
    info!(request = request.name(), ops = plan.operations.len(), "plan compiled");
    println!("{}", plan.to_json()?);
    Ok(())
}

fn put(path: &Path, db: Option<PathBuf>) -> Result<()> {
    let doc = read_document(path)?;
    let mut store = open_store(db)?;
    let id = doc.project.id.to_string();
    store.save(&id, &doc.project.name, &SchemaVersion::CURRENT.to_string(), &doc.to_json()?)?;
    println!("stored {id} in {}", store.path().display());
    Ok(())
}

fn list(db: Option<PathBuf>) -> Result<()> {
    let store = open_store(db)?;
    for row in store.list()? {
        println!("{}  {:<24} schema {}  updated {}", row.id, row.name, row.schema_version, row.updated_at.to_rfc3339());
    }
    Ok(())
}
