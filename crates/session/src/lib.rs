//! Editor session state machine consumed by the presentation layer.

pub mod config;
pub mod error;
pub mod playback;
pub mod selection;
pub mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use playback::{PlayState, Playback};
pub use selection::Selection;
pub use session::{Diagnostic, EditorSession, JobKind, JobTicket, PreviewFrame, RenderOutput, SessionEvent, SessionState, Severity};
