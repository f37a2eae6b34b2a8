//! Thread-sichere Übergabe von Wertänderungen an den besitzenden Thread.
//!
//! Die Szene selbst ist single-threaded. Hintergrund-Aufgaben (Tracking,
//! Clustering) schreiben nie direkt, sondern legen Änderungen im Postfach
//! ab; der Besitzer wendet sie mit `Scene::drain_mailbox` an.

use std::sync::mpsc;

use crate::core::{Handle, Value};

/// Eine abgelegte Wertänderung.
#[derive(Debug, Clone)]
pub struct PostedValue {
    pub target: Handle,
    pub name: String,
    pub value: Value,
}

/// Sende-Seite des Postfachs (klonbar, `Send`).
#[derive(Debug, Clone)]
pub struct SceneMailbox {
    tx: mpsc::Sender<PostedValue>,
}

impl SceneMailbox {
    pub(crate) fn new(tx: mpsc::Sender<PostedValue>) -> Self {
        Self { tx }
    }

    /// Legt eine Änderung ab. `false`, wenn die Szene nicht mehr existiert.
    pub fn post(&self, target: Handle, name: &str, value: impl Into<Value>) -> bool {
        self.tx
            .send(PostedValue {
                target,
                name: name.to_string(),
                value: value.into(),
            })
            .is_ok()
    }
}
