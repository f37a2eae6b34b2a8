//! Core-Typen: Handles, Werte, Geometrie, Kopier-Strategie und Ereignisse.

pub mod copy_op;
pub mod event;
pub mod handle;
pub mod math;
pub mod names;
pub mod value;

pub use copy_op::CopyOp;
pub use event::{Event, EventKind, NotifyFlags, Sender};
pub use handle::{Handle, ObserverId, ValueId};
pub use math::{BBox, Color, HsvColor, Plane, Point, Quaternion, Ray, Transform, Vector};
pub use names::SortMethod;
pub use value::{FromValue, Referenced, Value, ValueKind, ValueTuple};
