//! Media registry for imported source assets.
//!
//! Assets are imported by opaque source reference (URL or in-memory handle),
//! probed through a [`Prober`] and kept with their metadata for as long as the
//! timeline references them.

pub mod asset;
pub mod error;
pub mod probe;
pub mod registry;

pub use asset::{AssetId, AssetStatus, MediaAsset, MediaKind, ProbedMetadata};
pub use error::{AssetError, ProbeError};
pub use probe::{detect_kind, display_name, Prober, IMAGE_HOLD_SECONDS};
pub use registry::MediaRegistry;
