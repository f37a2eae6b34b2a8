//! Objekt-Graph: Arena der Objekte/Nodes, Wert-Slots, Benachrichtigung,
//! Gruppen-Struktur, Klonen, Besucher und Factories.

pub mod clone;
pub mod defaults;
pub mod entity;
pub mod factory;
pub mod graph;
pub mod mailbox;
pub mod notify;
pub mod observer;
pub mod store;
pub mod sync;
pub mod visitor;

pub use entity::{EntityKind, ROOT_SYNC_NAMES};
pub use factory::{FactoryRegistry, IdMinter, ObjectFactory};
pub use mailbox::{PostedValue, SceneMailbox};
pub use observer::{EventRecord, EventRecorder, Observer};
pub use store::{NameOrder, Scene, DEFAULT_MAX_DEPTH};
pub use visitor::{
    collect_value_names, traverse_default, CollectVisitor, InfoVisitor, NodeVisitor, SearchBy,
    SearchVisitor, TraversalMode, ValueUpdateVisitor, VisitorState,
};
