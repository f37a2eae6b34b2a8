//! fluo_scene Library.
//! Objekt-Graph mit typisierten Werten, Ereignis-Bus, Factories und
//! Component-Tracking; als Library exportiert für Tests und Wiederverwendung.

pub mod app;
pub mod core;
pub mod io;
pub mod scene;
pub mod shared;
pub mod tracking;
pub mod xml;

pub use app::{KeyState, UndoTarget, Undoable};
pub use core::{
    BBox, Color, CopyOp, Event, EventKind, Handle, NotifyFlags, Point, Transform, Value, ValueKind,
    Vector,
};
pub use scene::{
    EntityKind, FactoryRegistry, InfoVisitor, NodeVisitor, Observer, Scene, SceneMailbox,
};
pub use shared::{CancelToken, Progress, SceneOptions};
pub use tracking::{
    CacheQueue, Cell, CelpList, ClusterParams, Clusterizer, ComponentEditor, LabelVolume,
    SequenceAnalyzer, TrackMap,
};
pub use xml::{parse_value_set, write_value_set};
