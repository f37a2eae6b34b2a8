//! Arten und interne Datensätze der Szenen-Entitäten.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::names;
use crate::core::{Handle, ObserverId, Value, ValueId};

/// Geschlossene Menge der Entitäts-Arten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Object,
    Node,
    Group,
    Root,
    Volume,
    Mesh,
    Annotation,
    Ruler,
    VolumeGroup,
    MeshGroup,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Object,
        EntityKind::Node,
        EntityKind::Group,
        EntityKind::Root,
        EntityKind::Volume,
        EntityKind::Mesh,
        EntityKind::Annotation,
        EntityKind::Ruler,
        EntityKind::VolumeGroup,
        EntityKind::MeshGroup,
    ];

    /// Alles außer `Object` ist ein Node (hat Eltern und Maske).
    pub fn is_node(self) -> bool {
        self != EntityKind::Object
    }

    /// Arten mit eigener (besitzender) Kindliste.
    pub fn is_group(self) -> bool {
        matches!(
            self,
            EntityKind::Group | EntityKind::Root | EntityKind::VolumeGroup | EntityKind::MeshGroup
        )
    }

    pub fn class_name(self) -> &'static str {
        match self {
            EntityKind::Object => "Object",
            EntityKind::Node => "Node",
            EntityKind::Group => "Group",
            EntityKind::Root => "Root",
            EntityKind::Volume => "VolumeData",
            EntityKind::Mesh => "MeshData",
            EntityKind::Annotation => "Annotations",
            EntityKind::Ruler => "Ruler",
            EntityKind::VolumeGroup => "VolumeGroup",
            EntityKind::MeshGroup => "MeshGroup",
        }
    }

    /// Präfix generierter Namen (`volume3`, `group12`, ...).
    pub fn name_prefix(self) -> &'static str {
        match self {
            EntityKind::Object => "object",
            EntityKind::Node => "node",
            EntityKind::Group => "group",
            EntityKind::Root => "root",
            EntityKind::Volume => "volume",
            EntityKind::Mesh => "mesh",
            EntityKind::Annotation => "annotations",
            EntityKind::Ruler => "ruler",
            EntityKind::VolumeGroup => "volume group",
            EntityKind::MeshGroup => "mesh group",
        }
    }
}

/// Eintrag der Observer-Liste eines Objekts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ObserverRef {
    Entity(Handle),
    External(ObserverId),
}

/// Zusatzzustand einer Root.
#[derive(Debug, Clone)]
pub(crate) struct RootState {
    pub sync_names: Vec<String>,
    pub opt_out: HashSet<(Handle, String)>,
}

impl Default for RootState {
    fn default() -> Self {
        Self {
            sync_names: ROOT_SYNC_NAMES.iter().map(|s| s.to_string()).collect(),
            opt_out: HashSet::new(),
        }
    }
}

/// Werte, die eine Root an alle direkten Kinder überträgt.
pub const ROOT_SYNC_NAMES: [&str; 3] = [names::SORT_VALUE, names::SORT_METHOD, names::SELECTED];

#[derive(Debug, Clone)]
pub(crate) struct Entity {
    pub id: u32,
    pub name: String,
    pub kind: EntityKind,
    pub ref_count: usize,
    pub values: IndexMap<String, ValueId>,
    pub observers: Vec<ObserverRef>,
    /// schwache Rückverweise
    pub parents: Vec<Handle>,
    /// besitzend
    pub children: Vec<Handle>,
    pub node_mask: u32,
    pub root: Option<RootState>,
}

impl Entity {
    pub fn new(kind: EntityKind, id: u32, name: String) -> Self {
        Self {
            id,
            name,
            kind,
            ref_count: 0,
            values: IndexMap::new(),
            observers: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            node_mask: u32::MAX,
            root: (kind == EntityKind::Root).then(RootState::default),
        }
    }
}

/// Ein Wert-Slot. Mehrere Objekte können denselben Slot halten
/// (flache Kopie); `links` sind die Ziele einer stehenden Synchronisation.
#[derive(Debug, Clone)]
pub(crate) struct ValueSlot {
    pub name: String,
    pub value: Value,
    pub holders: Vec<Handle>,
    pub links: Vec<ValueId>,
}
