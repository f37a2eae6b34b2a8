//! Die Szene: Arena aller Objekte, Wert-Slots und externen Observer.
//!
//! Alle Mutationen laufen über `Scene`, damit Benachrichtigung,
//! Referenzzählung und Eltern-Rückverweise konsistent bleiben. Verletzte
//! Vorbedingungen (unbekannter Name, falscher Typ, totes Handle) sind
//! No-Ops mit `false`/`None` und werden auf `debug` protokolliert.

use std::cmp::Ordering;
use std::sync::mpsc;

use log::{debug, trace};

use crate::core::handle::Arena;
use crate::core::{
    Event, EventKind, FromValue, Handle, ObserverId, Value, ValueId, ValueKind, ValueTuple,
};

use super::entity::{Entity, EntityKind, ObserverRef, ValueSlot};
use super::mailbox::{PostedValue, SceneMailbox};
use super::observer::Observer;

/// Standard-Obergrenze der Kaskadentiefe.
pub const DEFAULT_MAX_DEPTH: u32 = 64;

/// Sortierung für `value_names`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameOrder {
    /// Einfügereihenfolge
    #[default]
    Unordered,
    Ascending,
    Descending,
    /// Führende Zahl im Namen, Namen ohne Zahl zuletzt
    NumericAscending,
    NumericDescending,
}

/// Objekt-Graph mit typisierten Werten und Ereignis-Bus.
pub struct Scene {
    pub(crate) entities: Arena<Entity>,
    pub(crate) values: Arena<ValueSlot>,
    pub(crate) observers: Arena<Option<Box<dyn Observer>>>,
    pub(crate) precise: bool,
    pub(crate) max_depth: u32,
    mail_tx: mpsc::Sender<PostedValue>,
    mail_rx: mpsc::Receiver<PostedValue>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::with_settings(false, DEFAULT_MAX_DEPTH)
    }

    /// `precise` schaltet die Toleranz beim Wertvergleich ab.
    pub fn with_settings(precise: bool, max_depth: u32) -> Self {
        let (mail_tx, mail_rx) = mpsc::channel();
        Self {
            entities: Arena::default(),
            values: Arena::default(),
            observers: Arena::default(),
            precise,
            max_depth: max_depth.max(1),
            mail_tx,
            mail_rx,
        }
    }

    pub fn is_precise(&self) -> bool {
        self.precise
    }

    pub fn set_precise(&mut self, precise: bool) {
        self.precise = precise;
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    // ── Lebenszyklus ────────────────────────────────────────────────

    /// Legt eine Entität ohne Referenz an (Zähler 0).
    pub(crate) fn spawn(&mut self, kind: EntityKind, id: u32, name: &str) -> Handle {
        let h = Handle(self.entities.insert(Entity::new(kind, id, name.to_string())));
        trace!("{} '{}' angelegt ({})", kind.class_name(), name, h);
        h
    }

    /// Legt eine Entität ohne Factory-ID (0) und ohne Standardwerte an.
    /// Der Aufrufer hält die erste Referenz.
    pub fn create(&mut self, kind: EntityKind, name: &str) -> Handle {
        let h = self.spawn(kind, 0, name);
        self.retain(h);
        h
    }

    pub fn is_alive(&self, h: Handle) -> bool {
        self.entities.contains(h.0)
    }

    pub fn retain(&mut self, h: Handle) -> bool {
        match self.entities.get_mut(h.0) {
            Some(e) => {
                e.ref_count += 1;
                true
            }
            None => false,
        }
    }

    /// Gibt eine Referenz ab; bei Zähler 0 wird die Entität zerstört.
    pub fn release(&mut self, h: Handle) -> bool {
        let Some(e) = self.entities.get_mut(h.0) else {
            debug!("release: totes Handle {}", h);
            return false;
        };
        e.ref_count = e.ref_count.saturating_sub(1);
        if e.ref_count == 0 {
            self.destroy(h);
        }
        true
    }

    pub fn ref_count(&self, h: Handle) -> usize {
        self.entities.get(h.0).map_or(0, |e| e.ref_count)
    }

    pub(crate) fn destroy(&mut self, h: Handle) {
        let mut ev = Event::new();
        ev.init(EventKind::Deleting, Some(h), true);
        self.notify_observers(h, &mut ev);

        // ein Observer kann die Entität wiederbelebt haben
        if self.entities.get(h.0).is_some_and(|e| e.ref_count > 0) {
            return;
        }
        let Some(entity) = self.entities.remove(h.0) else {
            return;
        };
        debug!("{} '{}' zerstört", entity.kind.class_name(), entity.name);

        for vid in entity.values.values() {
            self.drop_holder(*vid, h);
        }
        for child in entity.children {
            if let Some(c) = self.entities.get_mut(child.0) {
                c.parents.retain(|p| *p != h);
                c.observers.retain(|o| *o != ObserverRef::Entity(h));
            }
            self.release(child);
        }
    }

    pub fn kind(&self, h: Handle) -> Option<EntityKind> {
        self.entities.get(h.0).map(|e| e.kind)
    }

    pub fn id(&self, h: Handle) -> Option<u32> {
        self.entities.get(h.0).map(|e| e.id)
    }

    pub(crate) fn set_id(&mut self, h: Handle, id: u32) {
        if let Some(e) = self.entities.get_mut(h.0) {
            e.id = id;
        }
    }

    pub fn name(&self, h: Handle) -> Option<&str> {
        self.entities.get(h.0).map(|e| e.name.as_str())
    }

    pub fn set_name(&mut self, h: Handle, name: &str) -> bool {
        match self.entities.get_mut(h.0) {
            Some(e) => {
                e.name = name.to_string();
                true
            }
            None => false,
        }
    }

    pub fn node_mask(&self, h: Handle) -> Option<u32> {
        self.entities.get(h.0).map(|e| e.node_mask)
    }

    pub fn set_node_mask(&mut self, h: Handle, mask: u32) -> bool {
        match self.entities.get_mut(h.0) {
            Some(e) if e.kind.is_node() => {
                e.node_mask = mask;
                true
            }
            _ => false,
        }
    }

    /// Anzahl lebender Entitäten.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.len() == 0
    }

    /// Anzahl lebender Wert-Slots.
    pub fn value_slot_count(&self) -> usize {
        self.values.len()
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.entities.keys().map(Handle).collect()
    }

    // ── Objektverweise in Werten ────────────────────────────────────

    pub(crate) fn retain_refs(&mut self, value: &Value) {
        let mut refs = Vec::new();
        value.object_refs(&mut refs);
        for h in refs {
            self.retain(h);
        }
    }

    pub(crate) fn release_refs(&mut self, value: &Value) {
        let mut refs = Vec::new();
        value.object_refs(&mut refs);
        for h in refs {
            self.release(h);
        }
    }

    /// Entfernt `h` als Halter eines Slots; der letzte Halter räumt ihn ab.
    pub(crate) fn drop_holder(&mut self, vid: ValueId, h: Handle) {
        let empty = match self.values.get_mut(vid.0) {
            Some(slot) => {
                slot.holders.retain(|x| *x != h);
                slot.holders.is_empty()
            }
            None => return,
        };
        if empty {
            if let Some(slot) = self.values.remove(vid.0) {
                self.release_refs(&slot.value);
            }
        }
    }

    // ── Werte ───────────────────────────────────────────────────────

    /// Legt einen neuen Wert an. Scheitert, wenn der Name schon existiert.
    pub fn add_value(&mut self, h: Handle, name: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let Some(entity) = self.entities.get(h.0) else {
            debug!("add_value('{}'): totes Handle {}", name, h);
            return false;
        };
        if entity.values.contains_key(name) {
            debug!("add_value: '{}' existiert bereits auf '{}'", name, entity.name);
            return false;
        }
        self.retain_refs(&value);
        let vid = ValueId(self.values.insert(ValueSlot {
            name: name.to_string(),
            value,
            holders: vec![h],
            links: Vec::new(),
        }));
        if let Some(entity) = self.entities.get_mut(h.0) {
            entity.values.insert(name.to_string(), vid);
        }

        let mut ev = Event::new();
        ev.init_value(EventKind::ValueAdded, Some(h), vid, name, false);
        self.process_notification(h, &mut ev, false);
        true
    }

    /// Hängt einen bestehenden Slot unter `name` an `h` (flache Kopie).
    pub(crate) fn attach_slot(&mut self, h: Handle, name: &str, vid: ValueId) -> bool {
        let Some(slot) = self.values.get_mut(vid.0) else {
            return false;
        };
        if !slot.holders.contains(&h) {
            slot.holders.push(h);
        }
        match self.entities.get_mut(h.0) {
            Some(e) => {
                e.values.insert(name.to_string(), vid);
                true
            }
            None => false,
        }
    }

    /// Setzt einen bestehenden Wert. `true` nur, wenn sich der Wert geändert hat.
    pub fn set_value(&mut self, h: Handle, name: &str, value: impl Into<Value>) -> bool {
        let mut ev = Event::new();
        self.set_value_with(h, name, value.into(), &mut ev)
    }

    /// Wie `set_value`, setzt aber eine laufende Kaskade fort.
    ///
    /// Ist `h` bereits in der Sender-Kette von `event`, wird nichts gesetzt.
    pub fn set_value_with(&mut self, h: Handle, name: &str, value: Value, event: &mut Event) -> bool {
        let Some(vid) = self.value_id(h, name) else {
            debug!("set_value: '{}' unbekannt auf {}", name, h);
            return false;
        };
        if event.is_initialized() && event.has_object(h) {
            debug!("set_value: {} ist bereits in der Sender-Kette, '{}' übersprungen", h, name);
            return false;
        }
        let Some(slot) = self.values.get(vid.0) else {
            return false;
        };
        if slot.value.kind() != value.kind() {
            debug!(
                "set_value: '{}' ist {}, nicht {}",
                name,
                slot.value.type_name(),
                value.type_name()
            );
            return false;
        }
        if slot.value.same_as(&value, self.precise) {
            return false;
        }
        if !event.is_initialized() {
            event.init_value(EventKind::ValueChanging, Some(h), vid, name, false);
        }
        self.set_slot(vid, value, event)
    }

    /// Legt an oder setzt.
    pub fn add_set_value(&mut self, h: Handle, name: &str, value: impl Into<Value>) -> bool {
        if self.has_value(h, name) {
            self.set_value(h, name, value)
        } else {
            self.add_value(h, name, value)
        }
    }

    /// Schaltet einen `bool`-Wert um und liefert den neuen Zustand.
    pub fn toggle_value(&mut self, h: Handle, name: &str) -> Option<bool> {
        let current = self.get::<bool>(h, name)?;
        self.set_value(h, name, !current);
        Some(!current)
    }

    /// Entfernt den Namen; der Slot lebt weiter, solange andere ihn halten.
    pub fn remove_value(&mut self, h: Handle, name: &str) -> bool {
        let Some(vid) = self
            .entities
            .get_mut(h.0)
            .and_then(|e| e.values.shift_remove(name))
        else {
            debug!("remove_value: '{}' unbekannt auf {}", name, h);
            return false;
        };
        self.drop_holder(vid, h);
        true
    }

    /// Ersetzt einen Wert samt Typ (neue Lebensdauer des Namens).
    pub fn replace_value(&mut self, h: Handle, name: &str, value: impl Into<Value>) -> bool {
        if !self.is_alive(h) {
            return false;
        }
        self.remove_value(h, name);
        self.add_value(h, name, value)
    }

    pub fn value_id(&self, h: Handle, name: &str) -> Option<ValueId> {
        self.entities.get(h.0)?.values.get(name).copied()
    }

    pub fn get_value(&self, h: Handle, name: &str) -> Option<&Value> {
        let vid = self.value_id(h, name)?;
        self.values.get(vid.0).map(|slot| &slot.value)
    }

    /// Typisierte Abfrage; `None` bei unbekanntem Namen oder anderer Art.
    pub fn get<T: FromValue>(&self, h: Handle, name: &str) -> Option<T> {
        self.get_value(h, name).and_then(T::from_value)
    }

    /// Schreibt nach `out`; bei Fehlschlag bleibt `out` unverändert.
    pub fn get_value_into<T: FromValue>(&self, h: Handle, name: &str, out: &mut T) -> bool {
        match self.get::<T>(h, name) {
            Some(v) => {
                *out = v;
                true
            }
            None => false,
        }
    }

    pub fn has_value(&self, h: Handle, name: &str) -> bool {
        self.value_id(h, name).is_some()
    }

    pub fn value_kind(&self, h: Handle, name: &str) -> Option<ValueKind> {
        self.get_value(h, name).map(Value::kind)
    }

    pub fn value_type(&self, h: Handle, name: &str) -> Option<&'static str> {
        self.value_kind(h, name).map(ValueKind::type_name)
    }

    pub fn value_by_id(&self, vid: ValueId) -> Option<&Value> {
        self.values.get(vid.0).map(|slot| &slot.value)
    }

    /// Alle Objekte, die den Slot halten.
    pub fn value_holders(&self, vid: ValueId) -> Vec<Handle> {
        self.values
            .get(vid.0)
            .map(|slot| slot.holders.clone())
            .unwrap_or_default()
    }

    pub fn value_count(&self, h: Handle) -> usize {
        self.entities.get(h.0).map_or(0, |e| e.values.len())
    }

    pub fn value_names(&self, h: Handle, order: NameOrder) -> Vec<String> {
        let mut names: Vec<String> = self
            .entities
            .get(h.0)
            .map(|e| e.values.keys().cloned().collect())
            .unwrap_or_default();
        match order {
            NameOrder::Unordered => {}
            NameOrder::Ascending => names.sort(),
            NameOrder::Descending => names.sort_by(|a, b| b.cmp(a)),
            NameOrder::NumericAscending => names.sort_by(numeric_cmp),
            NameOrder::NumericDescending => names.sort_by(|a, b| numeric_cmp(b, a)),
        }
        names
    }

    /// Vergleicht alle (bzw. die angegebenen) Werte von `a` mit `b`.
    pub fn cmp_values(&self, a: Handle, b: Handle, names: Option<&[&str]>) -> bool {
        let list: Vec<String> = match names {
            Some(list) => list.iter().map(|s| s.to_string()).collect(),
            None => self.value_names(a, NameOrder::Unordered),
        };
        if !self.is_alive(a) || !self.is_alive(b) {
            return false;
        }
        list.iter().all(|name| match (self.get_value(a, name), self.get_value(b, name)) {
            (Some(x), Some(y)) => x.same_as(y, self.precise),
            _ => false,
        })
    }

    // ── Wert-Tupel ──────────────────────────────────────────────────

    pub fn get_value_tuple(&self, h: Handle, name: &str) -> Option<ValueTuple> {
        let value = self.get_value(h, name)?;
        Some(ValueTuple::new(name, value.type_name(), value.to_text()))
    }

    pub fn value_tuples(&self, h: Handle) -> Vec<ValueTuple> {
        self.value_names(h, NameOrder::Unordered)
            .iter()
            .filter_map(|name| self.get_value_tuple(h, name))
            .collect()
    }

    pub fn add_value_tuple(&mut self, h: Handle, tuple: &ValueTuple) -> bool {
        match parse_tuple(tuple) {
            Some(value) => self.add_value(h, &tuple.name, value),
            None => false,
        }
    }

    pub fn set_value_tuple(&mut self, h: Handle, tuple: &ValueTuple) -> bool {
        match parse_tuple(tuple) {
            Some(value) => self.set_value(h, &tuple.name, value),
            None => false,
        }
    }

    // ── Externe Observer ────────────────────────────────────────────

    pub fn register_observer(&mut self, observer: Box<dyn Observer>) -> ObserverId {
        ObserverId(self.observers.insert(Some(observer)))
    }

    /// Entfernt einen Observer aus der Szene und gibt ihn zurück.
    /// Verweise in Observer-Listen werden beim nächsten Zustellen entfernt.
    pub fn unregister_observer(&mut self, id: ObserverId) -> Option<Box<dyn Observer>> {
        self.observers.remove(id.0).flatten()
    }

    /// Registriert und hängt in einem Schritt an `h`.
    pub fn add_observer(&mut self, h: Handle, observer: Box<dyn Observer>) -> Option<ObserverId> {
        if !self.is_alive(h) {
            return None;
        }
        let id = self.register_observer(observer);
        self.observe(h, id);
        Some(id)
    }

    /// Hängt einen registrierten Observer an `h` (Registrierungsreihenfolge zählt).
    pub fn observe(&mut self, h: Handle, id: ObserverId) -> bool {
        if !self.observers.contains(id.0) {
            return false;
        }
        self.push_observer(h, ObserverRef::External(id))
    }

    pub fn unobserve(&mut self, h: Handle, id: ObserverId) -> bool {
        self.remove_observer_ref(h, ObserverRef::External(id))
    }

    /// `observer` bekommt künftig die Ereignisse von `target`.
    pub fn add_entity_observer(&mut self, target: Handle, observer: Handle) -> bool {
        if !self.is_alive(observer) || target == observer {
            return false;
        }
        self.push_observer(target, ObserverRef::Entity(observer))
    }

    pub fn remove_entity_observer(&mut self, target: Handle, observer: Handle) -> bool {
        self.remove_observer_ref(target, ObserverRef::Entity(observer))
    }

    pub fn observer_count(&self, h: Handle) -> usize {
        self.entities.get(h.0).map_or(0, |e| e.observers.len())
    }

    fn push_observer(&mut self, h: Handle, r: ObserverRef) -> bool {
        match self.entities.get_mut(h.0) {
            Some(e) => {
                if !e.observers.contains(&r) {
                    e.observers.push(r);
                }
                true
            }
            None => false,
        }
    }

    fn remove_observer_ref(&mut self, h: Handle, r: ObserverRef) -> bool {
        match self.entities.get_mut(h.0) {
            Some(e) => {
                let before = e.observers.len();
                e.observers.retain(|o| *o != r);
                e.observers.len() != before
            }
            None => false,
        }
    }

    // ── Postfach ────────────────────────────────────────────────────

    /// Sende-Seite für Hintergrund-Threads.
    pub fn mailbox(&self) -> SceneMailbox {
        SceneMailbox::new(self.mail_tx.clone())
    }

    /// Wendet alle abgelegten Änderungen an; liefert die Zahl der
    /// tatsächlich geänderten Werte.
    pub fn drain_mailbox(&mut self) -> usize {
        let posted: Vec<PostedValue> = self.mail_rx.try_iter().collect();
        posted
            .into_iter()
            .filter(|p| self.set_value(p.target, &p.name, p.value.clone()))
            .count()
    }
}

fn parse_tuple(tuple: &ValueTuple) -> Option<Value> {
    let Some(kind) = ValueKind::from_type_name(&tuple.type_name) else {
        debug!("Unbekannter Typname '{}' für '{}'", tuple.type_name, tuple.name);
        return None;
    };
    let value = Value::from_text(kind, &tuple.text);
    if value.is_none() {
        debug!("Text '{}' ist kein gültiger {}", tuple.text, tuple.type_name);
    }
    value
}

fn leading_number(name: &str) -> Option<f64> {
    let digits: String = name
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    digits.parse().ok()
}

fn numeric_cmp(a: &String, b: &String) -> Ordering {
    match (leading_number(a), leading_number(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_is_fixed_after_add() {
        let mut scene = Scene::new();
        let obj = scene.create(EntityKind::Object, "obj");
        assert!(scene.add_value(obj, "x", 5));
        assert!(!scene.set_value(obj, "x", "hello"));
        assert_eq!(scene.get::<i32>(obj, "x"), Some(5));
        assert!(!scene.add_value(obj, "x", 7));
        assert_eq!(scene.get::<i32>(obj, "x"), Some(5));
    }

    #[test]
    fn get_value_into_leaves_target_on_mismatch() {
        let mut scene = Scene::new();
        let obj = scene.create(EntityKind::Object, "obj");
        scene.add_value(obj, "gamma", 1.5f64);
        let mut out = 7i32;
        assert!(!scene.get_value_into(obj, "gamma", &mut out));
        assert!(!scene.get_value_into(obj, "missing", &mut out));
        assert_eq!(out, 7);
        let mut g = 0.0f64;
        assert!(scene.get_value_into(obj, "gamma", &mut g));
        assert_eq!(g, 1.5);
    }

    #[test]
    fn equal_value_is_no_op() {
        let mut scene = Scene::new();
        let obj = scene.create(EntityKind::Object, "obj");
        scene.add_value(obj, "t", 0.5f64);
        assert!(!scene.set_value(obj, "t", 0.5f64 + 1e-13));
        assert!(scene.set_value(obj, "t", 0.75f64));
    }

    #[test]
    fn numeric_name_order() {
        let mut scene = Scene::new();
        let obj = scene.create(EntityKind::Object, "obj");
        for name in ["10", "2", "b", "1", "a"] {
            scene.add_value(obj, name, true);
        }
        assert_eq!(
            scene.value_names(obj, NameOrder::NumericAscending),
            vec!["1", "2", "10", "a", "b"]
        );
        assert_eq!(
            scene.value_names(obj, NameOrder::Descending),
            vec!["b", "a", "2", "10", "1"]
        );
        assert_eq!(
            scene.value_names(obj, NameOrder::Unordered),
            vec!["10", "2", "b", "1", "a"]
        );
    }

    #[test]
    fn toggle_and_tuples() {
        let mut scene = Scene::new();
        let obj = scene.create(EntityKind::Object, "obj");
        scene.add_value(obj, "display", true);
        assert_eq!(scene.toggle_value(obj, "display"), Some(false));
        assert_eq!(scene.get::<bool>(obj, "display"), Some(false));

        let tuple = ValueTuple::new("luminance", "double", "0.5");
        assert!(scene.add_value_tuple(obj, &tuple));
        assert_eq!(scene.get_value_tuple(obj, "luminance"), Some(tuple));
        assert!(!scene.set_value_tuple(obj, &ValueTuple::new("luminance", "int", "3")));
    }

    #[test]
    fn releasing_last_reference_destroys_object_and_slots() {
        let mut scene = Scene::new();
        let obj = scene.create(EntityKind::Object, "obj");
        scene.add_value(obj, "x", 1);
        assert_eq!(scene.value_slot_count(), 1);
        assert!(scene.release(obj));
        assert!(!scene.is_alive(obj));
        assert_eq!(scene.value_slot_count(), 0);
    }

    #[test]
    fn object_values_hold_their_target() {
        let mut scene = Scene::new();
        let holder = scene.create(EntityKind::Object, "holder");
        let target = scene.create(EntityKind::Object, "target");
        scene.add_value(holder, "label", target);
        scene.release(target);
        assert!(scene.is_alive(target));
        scene.remove_value(holder, "label");
        assert!(!scene.is_alive(target));
    }

    #[test]
    fn mailbox_applies_posted_values_on_drain() {
        let mut scene = Scene::new();
        let obj = scene.create(EntityKind::Object, "obj");
        scene.add_value(obj, "progress", 0);
        let mailbox = scene.mailbox();
        let worker = std::thread::spawn(move || {
            mailbox.post(obj, "progress", 50);
            mailbox.post(obj, "unknown", 1);
        });
        worker.join().expect("Worker-Thread abgestürzt");
        assert_eq!(scene.get::<i32>(obj, "progress"), Some(0));
        assert_eq!(scene.drain_mailbox(), 1);
        assert_eq!(scene.get::<i32>(obj, "progress"), Some(50));
    }
}
