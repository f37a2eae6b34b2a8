//! Ereignisse des Objekt-Graphen.
//!
//! Ein `Event` wird einmal initialisiert und danach nur noch über die
//! Sender-Kette und die Ebenen-Zähler fortgeschrieben. Die Sender-Kette
//! enthält alle Objekte und Wert-Slots, die in der laufenden Kaskade
//! bereits beteiligt sind; sie verhindert doppelte Benachrichtigung und
//! damit Endlosschleifen bei synchronisierten Werten.

use std::ops::BitOr;

use super::handle::{Handle, ValueId};

/// Art eines Ereignisses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Noch nicht initialisiert
    None,
    Deleting,
    /// Vor der Mutation; wird nicht an Eltern weitergereicht
    ValueChanging,
    ValueChanged,
    ValueAdded,
    /// Einmaliges Übertragen eines Wertes (`prop_value`)
    SyncValue,
    NodeAdded,
    NodeRemoved,
}

/// Empfängerklassen eines Ereignisses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifyFlags(u32);

impl NotifyFlags {
    pub const NONE: NotifyFlags = NotifyFlags(0);
    pub const SELF: NotifyFlags = NotifyFlags(1);
    pub const PARENT: NotifyFlags = NotifyFlags(1 << 1);
    pub const AGENT: NotifyFlags = NotifyFlags(1 << 2);
    pub const FACTORY: NotifyFlags = NotifyFlags(1 << 3);
    pub const ALL: NotifyFlags = NotifyFlags(0b1111);

    pub fn contains(self, other: NotifyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: NotifyFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn without(self, other: NotifyFlags) -> NotifyFlags {
        NotifyFlags(self.0 & !other.0)
    }
}

impl Default for NotifyFlags {
    fn default() -> Self {
        NotifyFlags::ALL
    }
}

impl BitOr for NotifyFlags {
    type Output = NotifyFlags;

    fn bitor(self, rhs: NotifyFlags) -> NotifyFlags {
        NotifyFlags(self.0 | rhs.0)
    }
}

/// Eintrag der Sender-Kette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    Object(Handle),
    Value(ValueId),
}

/// Ein Ereignis mit Herkunft, optionalem Wert und Struktur-Angaben.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    origin: Option<Handle>,
    value: Option<ValueId>,
    value_name: Option<String>,
    parent: Option<Handle>,
    child: Option<Handle>,
    flags: NotifyFlags,
    chain: Vec<Sender>,
    level: u32,
    cumulative: u32,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    pub fn new() -> Self {
        Self {
            kind: EventKind::None,
            origin: None,
            value: None,
            value_name: None,
            parent: None,
            child: None,
            flags: NotifyFlags::ALL,
            chain: Vec::new(),
            level: 0,
            cumulative: 0,
        }
    }

    /// Ereignis mit eingeschränkten Empfängern.
    pub fn with_flags(flags: NotifyFlags) -> Self {
        Self {
            flags,
            ..Self::new()
        }
    }

    /// Allgemeines Ereignis (Löschen, Änderung) eines Senders.
    pub fn init(&mut self, kind: EventKind, origin: Option<Handle>, push: bool) {
        self.kind = kind;
        self.origin = origin;
        self.value = None;
        self.value_name = None;
        if push {
            if let Some(h) = origin {
                self.push(Sender::Object(h));
            }
        }
    }

    /// Wertbezogenes Ereignis. Ohne Herkunft bleiben Wert und Name leer.
    pub fn init_value(
        &mut self,
        kind: EventKind,
        origin: Option<Handle>,
        value: ValueId,
        name: &str,
        push: bool,
    ) {
        self.init(kind, origin, push);
        if origin.is_some() {
            self.value = Some(value);
            self.value_name = Some(name.to_string());
        }
    }

    /// Struktur-Ereignis (Kind hinzugefügt/entfernt).
    pub fn init_node(&mut self, kind: EventKind, parent: Handle, child: Handle) {
        self.init(kind, Some(parent), false);
        self.parent = Some(parent);
        self.child = Some(child);
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_initialized(&self) -> bool {
        self.kind != EventKind::None
    }

    pub fn origin(&self) -> Option<Handle> {
        self.origin
    }

    pub fn value(&self) -> Option<ValueId> {
        self.value
    }

    pub fn value_name(&self) -> Option<&str> {
        self.value_name.as_deref()
    }

    pub fn parent(&self) -> Option<Handle> {
        self.parent
    }

    pub fn child(&self) -> Option<Handle> {
        self.child
    }

    pub fn flags(&self) -> NotifyFlags {
        self.flags
    }

    pub fn chain(&self) -> &[Sender] {
        &self.chain
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Gesamtzahl der Zustellungen dieser Kaskade.
    pub fn cumulative(&self) -> u32 {
        self.cumulative
    }

    pub fn push(&mut self, sender: Sender) {
        self.chain.push(sender);
    }

    pub fn pop(&mut self) -> Option<Sender> {
        self.chain.pop()
    }

    pub fn has_sender(&self, sender: Sender) -> bool {
        self.chain.contains(&sender)
    }

    pub fn has_object(&self, h: Handle) -> bool {
        self.has_sender(Sender::Object(h))
    }

    /// Eine Ebene tiefer; `false`, wenn `max_depth` überschritten würde.
    pub(crate) fn enter(&mut self, max_depth: u32) -> bool {
        if self.level >= max_depth {
            return false;
        }
        self.level += 1;
        self.cumulative += 1;
        true
    }

    pub(crate) fn leave(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// Kopie für eine andere Phase/einen anderen Slot derselben Kaskade.
    pub(crate) fn rekind(&self, kind: EventKind, value: Option<(ValueId, &str)>) -> Event {
        let mut ev = self.clone();
        ev.kind = kind;
        if ev.origin.is_some() {
            if let Some((id, name)) = value {
                ev.value = Some(id);
                ev.value_name = Some(name.to_string());
            }
        }
        ev
    }

    /// Übernimmt Zähler aus einer abgeleiteten Kopie.
    pub(crate) fn absorb(&mut self, derived: &Event) {
        self.cumulative = self.cumulative.max(derived.cumulative);
    }
}
