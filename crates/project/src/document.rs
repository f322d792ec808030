use chrono::{DateTime, Utc};
use media_io::{MediaAsset, MediaRegistry};
use serde::{Deserialize, Serialize};
use timeline::{check_project, Project};
use tracing::info;

use crate::error::SchemaResult;
use crate::migrate::migrate_document;
use crate::schema::SchemaVersion;

/// The persisted form of one project: the timeline plus every asset the
/// registry knew about when it was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub schema_version: SchemaVersion,
    pub saved_at: DateTime<Utc>,
    pub project: Project,
    #[serde(default)]
    pub assets: Vec<MediaAsset>,
}

impl ProjectDocument {
    pub fn capture(project: &Project, assets: &MediaRegistry) -> Self {
        Self {
            schema_version: SchemaVersion::CURRENT,
            saved_at: Utc::now(),
            project: project.clone(),
            assets: assets.list().into_iter().cloned().collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string_pretty(self) }

    /// A registry holding this document's assets, ids preserved.
    pub fn registry(&self) -> MediaRegistry {
        let mut registry = MediaRegistry::new();
        for asset in &self.assets {
            registry.restore(asset.clone());
        }
        registry
    }
}

/// Serialize the project and its assets as a versioned JSON document.
pub fn save(project: &Project, assets: &MediaRegistry) -> serde_json::Result<String> {
    let doc = ProjectDocument::capture(project, assets);
    let json = doc.to_json()?;
    info!(project_id = %project.id, tracks = project.tracks.len(), assets = doc.assets.len(), bytes = json.len(), "project saved");
    Ok(json)
}

/// Parse, migrate and validate a saved document.
pub fn load(json: &str) -> SchemaResult<ProjectDocument> {
    let mut value: serde_json::Value = serde_json::from_str(json)?;
    let written_with = migrate_document(&mut value)?;
    let mut doc: ProjectDocument = serde_json::from_value(value)?;
    check_project(&doc.project)?;
    doc.schema_version = SchemaVersion::CURRENT;
    info!(project_id = %doc.project.id, version = %written_with, tracks = doc.project.tracks.len(), "project loaded");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use media_io::{MediaKind, ProbeError, ProbedMetadata};
    use timeline::{Clip, Filter, FilterKind, OutputSettings, Track, TrackKind, Transition, TransitionKind};

    fn probe(_: &str, _: MediaKind) -> Result<ProbedMetadata, ProbeError> {
        Ok(ProbedMetadata { duration: 12.345678901234, width: Some(1280), height: Some(720), frame_rate: Some(29.97), codec: Some("h264".into()), sample_rate: Some(44_100), byte_size: 4096 })
    }

    fn sample() -> (Project, MediaRegistry) {
        let mut reg = MediaRegistry::new();
        let asset = reg.import("https://cdn.example/a%20b.mp4", &probe).unwrap().id;
        let mut p = Project::new("Roundtrip", OutputSettings::default());
        let track = Track::new(TrackKind::Video, "V1");
        let tid = track.id;
        p.insert_track(track, 0).unwrap();
        let mut a = Clip::new(tid, asset, 0.1, 0.3, 4.7);
        a.speed = 1.3;
        a.filters.push(Filter::new(FilterKind::TextOverlay { text: "Title".into(), x: 10, y: -4, font_size: 32, color: "#fff".into() }));
        let b = Clip::new(tid, asset, a.end(), 5.0, 9.0);
        a.transition = Some(Transition::new(TransitionKind::Crossfade, 0.5, b.id));
        p.add_clip(&reg, b).unwrap();
        p.add_clip(&reg, a).unwrap();
        (p, reg)
    }

    #[test]
    fn save_then_load_is_structurally_equal() {
        let (p, reg) = sample();
        let json = save(&p, &reg).unwrap();
        let doc = load(&json).unwrap();
        assert_eq!(doc.project, p);
        assert_eq!(doc.assets.len(), 1);
        assert_eq!(doc.registry().get(doc.assets[0].id), reg.get(doc.assets[0].id));
    }

    #[test]
    fn newer_major_is_rejected() {
        let (p, reg) = sample();
        let mut value: serde_json::Value = serde_json::from_str(&save(&p, &reg).unwrap()).unwrap();
        value["schema_version"] = "7.0".into();
        let err = load(&value.to_string()).unwrap_err();
        assert!(matches!(err, SchemaError::NewerMajor { .. }));
    }

    #[test]
    fn overlapping_document_is_rejected() {
        let (mut p, reg) = sample();
        p.tracks[0].clips[1].start = 0.2;
        let json = ProjectDocument::capture(&p, &reg).to_json().unwrap();
        assert!(matches!(load(&json), Err(SchemaError::Invariant(_))));
    }

    #[test]
    fn garbage_is_a_schema_error() {
        assert!(matches!(load("not json"), Err(SchemaError::Json(_))));
        assert!(matches!(load("[1, 2]"), Err(SchemaError::InvalidDocument { .. })));
    }
}
