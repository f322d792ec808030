//! Upgrades older document layouts to the current schema, in place.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{SchemaError, SchemaResult};
use crate::schema::SchemaVersion;

/// Read the document's version, reject newer majors, and migrate older ones.
/// Returns the version the document was written with.
pub fn migrate_document(value: &mut Value) -> SchemaResult<SchemaVersion> {
    let obj = value.as_object_mut().ok_or_else(|| SchemaError::InvalidDocument { reason: "document root must be a JSON object".into() })?;
    let found = extract_version(obj)?;
    if !found.is_readable() {
        return Err(SchemaError::NewerMajor { found, supported: SchemaVersion::CURRENT });
    }
    if found.major == SchemaVersion::CURRENT.major {
        debug!(version = %found, "document at current major, no migration needed");
        return Ok(found);
    }

    let mut major = found.major;
    while major < SchemaVersion::CURRENT.major {
        info!(from = major, to = major + 1, "migrating project document");
        match major {
            0 => migrate_v0(obj).map_err(|reason| SchemaError::MigrationFailed { from: found, reason })?,
            other => {
                return Err(SchemaError::MigrationFailed { from: found, reason: format!("no migration path from major {other}") });
            }
        }
        major += 1;
    }
    obj.insert("schema_version".into(), Value::String(SchemaVersion::CURRENT.to_string()));
    Ok(found)
}

fn extract_version(obj: &Map<String, Value>) -> SchemaResult<SchemaVersion> {
    match obj.get("schema_version").or_else(|| obj.get("version")) {
        Some(Value::String(s)) => s.parse(),
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()).map(|major| SchemaVersion::new(major, 0)).ok_or_else(|| SchemaError::BadVersion(n.to_string())),
        Some(other) => Err(SchemaError::BadVersion(other.to_string())),
        None => {
            warn!("document has no schema version, assuming 0.0");
            Ok(SchemaVersion::new(0, 0))
        }
    }
}

/// Major 0 kept a list of `timelines` (only the first was ever edited) and
/// called the asset list `media`. It had no save timestamp and could omit
/// output settings.
fn migrate_v0(obj: &mut Map<String, Value>) -> Result<(), String> {
    obj.remove("version");
    if !obj.contains_key("project") {
        let timelines = obj.remove("timelines").ok_or("neither `project` nor `timelines` present")?;
        let mut list = match timelines {
            Value::Array(list) => list,
            _ => return Err("`timelines` must be an array".into()),
        };
        if list.len() > 1 {
            warn!(dropped = list.len() - 1, "legacy document had several timelines, keeping the first");
        }
        if list.is_empty() {
            return Err("`timelines` is empty".into());
        }
        obj.insert("project".into(), list.swap_remove(0));
    }
    if !obj.contains_key("assets") {
        let media = obj.remove("media").unwrap_or_else(|| Value::Array(Vec::new()));
        obj.insert("assets".into(), media);
    }
    if !obj.contains_key("saved_at") {
        obj.insert("saved_at".into(), Value::String(chrono::Utc::now().to_rfc3339()));
    }
    if let Some(project) = obj.get_mut("project").and_then(Value::as_object_mut) {
        if !project.contains_key("settings") {
            let defaults = serde_json::to_value(timeline::OutputSettings::default()).map_err(|e| e.to_string())?;
            project.insert("settings".into(), defaults);
        }
        if !project.contains_key("tracks") {
            project.insert("tracks".into(), Value::Array(Vec::new()));
        }
    } else {
        return Err("`project` must be an object".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_documents_are_untouched() {
        let mut doc = json!({ "schema_version": "1.0", "project": {}, "assets": [] });
        let before = doc.clone();
        assert_eq!(migrate_document(&mut doc).unwrap(), SchemaVersion::CURRENT);
        assert_eq!(doc, before);
    }

    #[test]
    fn newer_minor_is_accepted() {
        let mut doc = json!({ "schema_version": "1.7" });
        assert_eq!(migrate_document(&mut doc).unwrap(), SchemaVersion::new(1, 7));
    }

    #[test]
    fn newer_major_is_rejected() {
        let mut doc = json!({ "schema_version": "2.0" });
        assert!(matches!(migrate_document(&mut doc), Err(SchemaError::NewerMajor { .. })));
    }

    #[test]
    fn v0_layout_is_upgraded() {
        let mut doc = json!({
            "version": 0,
            "timelines": [{ "id": "x", "name": "first" }, { "id": "y", "name": "second" }],
            "media": [{ "id": "m" }],
        });
        migrate_document(&mut doc).unwrap();
        assert_eq!(doc["schema_version"], "1.0");
        assert_eq!(doc["project"]["name"], "first");
        assert_eq!(doc["assets"][0]["id"], "m");
        assert!(doc["saved_at"].is_string());
        assert_eq!(doc["project"]["settings"]["width"], 1920);
        assert!(doc.get("media").is_none());
    }

    #[test]
    fn v0_without_timeline_fails() {
        let mut doc = json!({ "media": [] });
        assert!(matches!(migrate_document(&mut doc), Err(SchemaError::MigrationFailed { .. })));
    }
}
