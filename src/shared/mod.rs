//! Geteilte Typen für layer-übergreifende Verträge.
//!
//! Enthält Typen, die zwischen `app`, `scene` und `tracking` geteilt
//! werden, um direkte Abhängigkeiten zu vermeiden.

pub mod options;
pub mod progress;

pub use options::SceneOptions;
pub use options::{TEXT_UNDO_INTERVAL, TRACK_RADIUS, UNDO_DEPTH, UNDO_INTERVAL};
pub use progress::{CancelToken, Progress, ProgressCallback};
