use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::asset::{AssetId, AssetStatus, MediaAsset, ProbedMetadata};
use crate::error::{AssetError, ProbeError};
use crate::probe::{detect_kind, display_name, settle_metadata, Prober};

#[derive(Debug, Clone)]
struct Entry {
    asset: MediaAsset,
    refs: usize,
}

/// Imported assets plus the reference counts the timeline keeps on them.
///
/// Only ever touched from the editing thread.
#[derive(Debug, Default)]
pub struct MediaRegistry {
    entries: HashMap<AssetId, Entry>,
}

impl MediaRegistry {
    pub fn new() -> Self { Self::default() }

    /// Import and probe in one step.
    ///
    /// A probe failure leaves the asset registered and marked invalid; the
    /// returned error carries its id.
    pub fn import(&mut self, source: &str, prober: &dyn Prober) -> Result<MediaAsset, AssetError> {
        let id = self.begin_import(source)?;
        let kind = self.entries[&id].asset.kind;
        let result = prober.probe(source, kind);
        self.finish_probe(id, result).map(|a| a.clone())
    }

    /// Register a source whose probe will complete later.
    pub fn begin_import(&mut self, source: &str) -> Result<AssetId, AssetError> {
        let kind = detect_kind(source).ok_or_else(|| AssetError::UnsupportedFormat { source_ref: source.to_string() })?;
        let id = AssetId::new();
        let asset = MediaAsset { id, source: source.to_string(), name: display_name(source), kind, status: AssetStatus::Pending, metadata: None };
        debug!(asset_id = %id, ?kind, source, "asset registered, probe pending");
        self.entries.insert(id, Entry { asset, refs: 0 });
        Ok(id)
    }

    /// Attach the probe outcome for a pending asset.
    pub fn finish_probe(&mut self, id: AssetId, result: Result<ProbedMetadata, ProbeError>) -> Result<&MediaAsset, AssetError> {
        let entry = self.entries.get_mut(&id).ok_or(AssetError::NotFound(id))?;
        if entry.asset.status != AssetStatus::Pending {
            return Err(AssetError::AlreadyProbed(id));
        }
        let kind = entry.asset.kind;
        match result.map_err(|e| match e {
            ProbeError::UnsupportedFormat(r) | ProbeError::ProbeFailed(r) => Some(r),
            ProbeError::Timeout => None,
        }).and_then(|meta| settle_metadata(kind, meta).map_err(Some)) {
            Ok(meta) => {
                info!(asset_id = %id, duration = meta.duration, "asset probed");
                entry.asset.metadata = Some(meta);
                entry.asset.status = AssetStatus::Ready;
                Ok(&entry.asset)
            }
            Err(Some(reason)) => {
                warn!(asset_id = %id, %reason, "probe failed, asset marked invalid");
                entry.asset.status = AssetStatus::Invalid { reason: reason.clone() };
                Err(AssetError::ProbeFailed { asset_id: id, reason })
            }
            Err(None) => {
                warn!(asset_id = %id, "probe timed out, asset marked invalid");
                entry.asset.status = AssetStatus::Invalid { reason: "probe timed out".into() };
                Err(AssetError::Timeout { asset_id: id })
            }
        }
    }

    /// Re-register an asset restored from a saved document, keeping its id.
    pub fn restore(&mut self, asset: MediaAsset) {
        let refs = self.entries.get(&asset.id).map(|e| e.refs).unwrap_or(0);
        self.entries.insert(asset.id, Entry { asset, refs });
    }

    pub fn get(&self, id: AssetId) -> Option<&MediaAsset> { self.entries.get(&id).map(|e| &e.asset) }

    pub fn contains(&self, id: AssetId) -> bool { self.entries.contains_key(&id) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// All assets ordered by name, then id.
    pub fn list(&self) -> Vec<&MediaAsset> {
        let mut out: Vec<&MediaAsset> = self.entries.values().map(|e| &e.asset).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub fn ref_count(&self, id: AssetId) -> usize { self.entries.get(&id).map(|e| e.refs).unwrap_or(0) }

    pub fn retain(&mut self, id: AssetId) -> Result<usize, AssetError> {
        let entry = self.entries.get_mut(&id).ok_or(AssetError::NotFound(id))?;
        entry.refs += 1;
        Ok(entry.refs)
    }

    /// Drop one reference. At zero the entry and its probed metadata are
    /// evicted; the source bytes live elsewhere and are not touched.
    pub fn release(&mut self, id: AssetId) -> Result<usize, AssetError> {
        let entry = self.entries.get_mut(&id).ok_or(AssetError::NotFound(id))?;
        entry.refs = entry.refs.saturating_sub(1);
        let left = entry.refs;
        if left == 0 {
            debug!(asset_id = %id, "last reference released, evicting asset");
            self.entries.remove(&id);
        }
        Ok(left)
    }

    /// Bring reference counts in line with `usage` by issuing the needed
    /// retains and releases. Assets missing from `usage` are treated as zero,
    /// but only those that previously had references are released.
    pub fn reconcile(&mut self, usage: &HashMap<AssetId, usize>) {
        let ids: Vec<AssetId> = self.entries.keys().copied().collect();
        for id in ids {
            let want = usage.get(&id).copied().unwrap_or(0);
            let have = self.ref_count(id);
            for _ in have..want {
                let _ = self.retain(id);
            }
            for _ in want..have {
                let _ = self.release(id);
            }
        }
        for id in usage.keys() {
            if !self.entries.contains_key(id) {
                warn!(asset_id = %id, "usage references an asset the registry no longer holds");
            }
        }
    }

    /// Remove an asset nobody references (e.g. imported by mistake).
    pub fn remove(&mut self, id: AssetId) -> Result<MediaAsset, AssetError> {
        let refs = self.ref_count(id);
        if !self.entries.contains_key(&id) {
            return Err(AssetError::NotFound(id));
        }
        if refs > 0 {
            return Err(AssetError::InUse { asset_id: id, refs });
        }
        self.entries.remove(&id).map(|e| e.asset).ok_or(AssetError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::MediaKind;

    fn fixed(duration: f64) -> impl Fn(&str, MediaKind) -> Result<ProbedMetadata, ProbeError> {
        move |_, _| Ok(meta(duration))
    }

    fn meta(duration: f64) -> ProbedMetadata {
        ProbedMetadata { duration, width: Some(1920), height: Some(1080), frame_rate: Some(30.0), codec: Some("h264".into()), sample_rate: Some(48_000), byte_size: 1024 }
    }

    #[test]
    fn import_probes_and_registers() {
        let mut reg = MediaRegistry::new();
        let prober = fixed(10.0);
        let asset = reg.import("clips/intro.mp4", &prober).unwrap();
        assert_eq!(asset.kind, MediaKind::Video);
        assert!(asset.is_ready());
        assert_eq!(reg.get(asset.id).unwrap().duration(), Some(10.0));
    }

    #[test]
    fn unsupported_format_is_not_registered() {
        let mut reg = MediaRegistry::new();
        let prober = fixed(1.0);
        let err = reg.import("readme.txt", &prober).unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedFormat { .. }));
        assert!(reg.is_empty());
    }

    #[test]
    fn probe_failure_marks_asset_invalid() {
        let mut reg = MediaRegistry::new();
        let prober = fixed(0.0);
        let err = reg.import("broken.mp4", &prober).unwrap_err();
        let AssetError::ProbeFailed { asset_id, .. } = err else { panic!("expected probe failure") };
        assert!(reg.get(asset_id).unwrap().is_invalid());
    }

    #[test]
    fn probe_timeout_is_typed() {
        let mut reg = MediaRegistry::new();
        let id = reg.begin_import("slow.wav").unwrap();
        assert_eq!(reg.get(id).unwrap().status, AssetStatus::Pending);
        let err = reg.finish_probe(id, Err(ProbeError::Timeout)).unwrap_err();
        assert_eq!(err, AssetError::Timeout { asset_id: id });
        assert!(matches!(reg.finish_probe(id, Ok(meta(1.0))), Err(AssetError::AlreadyProbed(_))));
    }

    #[test]
    fn release_to_zero_evicts() {
        let mut reg = MediaRegistry::new();
        let prober = fixed(5.0);
        let id = reg.import("a.mp3", &prober).unwrap().id;
        reg.retain(id).unwrap();
        reg.retain(id).unwrap();
        assert_eq!(reg.release(id).unwrap(), 1);
        assert!(reg.contains(id));
        assert_eq!(reg.release(id).unwrap(), 0);
        assert!(!reg.contains(id));
    }

    #[test]
    fn reconcile_tracks_usage() {
        let mut reg = MediaRegistry::new();
        let prober = fixed(5.0);
        let a = reg.import("a.mp4", &prober).unwrap().id;
        let b = reg.import("b.mp4", &prober).unwrap().id;
        reg.reconcile(&HashMap::from([(a, 2), (b, 1)]));
        assert_eq!(reg.ref_count(a), 2);
        assert_eq!(reg.ref_count(b), 1);
        reg.reconcile(&HashMap::from([(a, 1)]));
        assert_eq!(reg.ref_count(a), 1);
        assert!(!reg.contains(b));
    }

    #[test]
    fn remove_refuses_referenced_asset() {
        let mut reg = MediaRegistry::new();
        let prober = fixed(5.0);
        let id = reg.import("a.mp4", &prober).unwrap().id;
        reg.retain(id).unwrap();
        assert!(matches!(reg.remove(id), Err(AssetError::InUse { refs: 1, .. })));
        reg.release(id).unwrap();
        assert!(matches!(reg.remove(id), Err(AssetError::NotFound(_))));
    }
}
