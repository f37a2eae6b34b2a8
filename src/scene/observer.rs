//! Externe Observer (Agenten, Panels, Factories).

use std::sync::{Arc, Mutex};

use crate::core::{Event, EventKind, Handle, NotifyFlags};

use super::Scene;

/// Empfänger von Szenen-Ereignissen.
///
/// Während `notify` läuft, ist der Observer aus der Szene entnommen;
/// Änderungen an der Szene aus dem Callback heraus sind erlaubt, eine
/// erneute Zustellung an denselben Observer in dieser Zeit entfällt.
pub trait Observer {
    fn notify(&mut self, scene: &mut Scene, event: &Event);

    /// Empfängerklassen, für die dieser Observer Ereignisse annimmt.
    fn accepts(&self) -> NotifyFlags {
        NotifyFlags::ALL
    }
}

/// Protokollierter Auszug eines Ereignisses.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub origin: Option<Handle>,
    pub value_name: Option<String>,
    pub parent: Option<Handle>,
    pub child: Option<Handle>,
}

impl From<&Event> for EventRecord {
    fn from(ev: &Event) -> Self {
        Self {
            kind: ev.kind(),
            origin: ev.origin(),
            value_name: ev.value_name().map(str::to_string),
            parent: ev.parent(),
            child: ev.child(),
        }
    }
}

/// Observer, der alle Ereignisse in eine geteilte Liste schreibt.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    records: Arc<Mutex<Vec<EventRecord>>>,
    flags: Option<NotifyFlags>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nimmt nur Ereignisse für die angegebenen Empfängerklassen an.
    pub fn with_flags(flags: NotifyFlags) -> Self {
        Self {
            records: Arc::default(),
            flags: Some(flags),
        }
    }

    /// Geteilter Zugriff auf die Liste (bleibt nach dem Registrieren gültig).
    pub fn records(&self) -> Arc<Mutex<Vec<EventRecord>>> {
        Arc::clone(&self.records)
    }
}

impl Observer for EventRecorder {
    fn notify(&mut self, _scene: &mut Scene, event: &Event) {
        if let Ok(mut records) = self.records.lock() {
            records.push(EventRecord::from(event));
        }
    }

    fn accepts(&self) -> NotifyFlags {
        self.flags.unwrap_or(NotifyFlags::ALL)
    }
}
