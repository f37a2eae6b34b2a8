//! Zustellung von Ereignissen.
//!
//! Ablauf einer Wertänderung (`set_slot`):
//! 1. `ValueChanging` an alle Halter des Slots (nur lokal + externe Observer)
//! 2. Mutation
//! 3. `ValueChanged` an alle Halter, die es an ihre Observer weiterreichen
//! 4. Weitergabe an alle verknüpften Slots (Synchronisation)
//!
//! Die Sender-Kette des Ereignisses stoppt Zyklen: ein Slot wird pro
//! Kaskade höchstens einmal gesetzt, ein Objekt reicht höchstens einmal weiter.

use log::{trace, warn};

use crate::core::{Event, EventKind, Handle, NotifyFlags, ObserverId, Sender, Value, ValueId};

use super::entity::ObserverRef;
use super::Scene;

impl Scene {
    /// Setzt einen Slot mit voller Benachrichtigung und folgt den Links.
    pub(crate) fn set_slot(&mut self, vid: ValueId, value: Value, event: &mut Event) -> bool {
        if event.has_sender(Sender::Value(vid)) {
            trace!("{} ist bereits in dieser Kaskade gesetzt", vid);
            return false;
        }
        let (name, holders) = match self.values.get(vid.0) {
            Some(slot) => {
                if slot.value.kind() != value.kind() || slot.value.same_as(&value, self.precise) {
                    return false;
                }
                (slot.name.clone(), slot.holders.clone())
            }
            None => return false,
        };
        if !event.enter(self.max_depth) {
            warn!(
                "Kaskadentiefe {} überschritten bei '{}', Weitergabe abgebrochen",
                self.max_depth, name
            );
            return false;
        }
        event.push(Sender::Value(vid));

        let mut changing = event.rekind(EventKind::ValueChanging, Some((vid, &name)));
        for holder in &holders {
            self.process_notification(*holder, &mut changing, false);
        }
        event.absorb(&changing);

        self.retain_refs(&value);
        let old = match self.values.get_mut(vid.0) {
            Some(slot) => std::mem::replace(&mut slot.value, value.clone()),
            None => {
                // Slot wurde während ValueChanging abgeräumt
                self.release_refs(&value);
                event.pop();
                event.leave();
                return false;
            }
        };

        let mut changed = event.rekind(EventKind::ValueChanged, Some((vid, &name)));
        for holder in &holders {
            self.process_notification(*holder, &mut changed, false);
        }
        event.absorb(&changed);

        let links = self
            .values
            .get(vid.0)
            .map(|slot| slot.links.clone())
            .unwrap_or_default();
        let mut stale = false;
        for link in links {
            if self.values.contains(link.0) {
                self.set_slot(link, value.clone(), event);
            } else {
                stale = true;
            }
        }
        if stale {
            self.prune_links(vid);
        }

        event.pop();
        event.leave();
        self.release_refs(&old);
        true
    }

    pub(crate) fn prune_links(&mut self, vid: ValueId) {
        let alive: Vec<ValueId> = match self.values.get(vid.0) {
            Some(slot) => slot
                .links
                .iter()
                .copied()
                .filter(|l| self.values.contains(l.0))
                .collect(),
            None => return,
        };
        if let Some(slot) = self.values.get_mut(vid.0) {
            slot.links = alive;
        }
    }

    /// Lokale Verarbeitung und Weitergabe an die eigenen Observer.
    ///
    /// `check_chain` ist bei der Weitergabe an beobachtende Objekte aktiv;
    /// die direkten Halter eines Slots werden immer benachrichtigt.
    pub(crate) fn process_notification(&mut self, o: Handle, event: &mut Event, check_chain: bool) {
        if check_chain && event.has_object(o) {
            trace!("{} ist bereits in der Sender-Kette", o);
            return;
        }
        if !self.is_alive(o) {
            return;
        }
        if !event.enter(self.max_depth) {
            warn!("Kaskadentiefe {} überschritten bei {}", self.max_depth, o);
            return;
        }
        event.push(Sender::Object(o));
        self.handle_event(o, event);
        self.notify_observers(o, event);
        event.pop();
        event.leave();
    }

    /// Zustellung an alle Observer von `o` in Registrierungsreihenfolge.
    ///
    /// `ValueChanging` geht nur an externe Observer. Nodes reichen andere
    /// Ereignisse nur bei gesetztem `NotifyFlags::PARENT` an beobachtende
    /// Objekte (Eltern) weiter.
    pub(crate) fn notify_observers(&mut self, o: Handle, event: &mut Event) {
        let Some((is_node, list)) = self
            .entities
            .get(o.0)
            .map(|e| (e.kind.is_node(), e.observers.clone()))
        else {
            return;
        };
        let bubble = match event.kind() {
            EventKind::ValueChanging => false,
            _ => !is_node || event.flags().contains(NotifyFlags::PARENT),
        };

        let mut stale = false;
        for entry in list {
            match entry {
                ObserverRef::External(id) => {
                    if !self.dispatch_external(id, event) {
                        stale = true;
                    }
                }
                ObserverRef::Entity(p) => {
                    if !self.is_alive(p) {
                        stale = true;
                    } else if bubble {
                        self.process_notification(p, event, true);
                    }
                }
            }
        }
        if stale {
            self.prune_observers(o);
        }
    }

    /// `false`, wenn der Observer nicht mehr registriert ist.
    fn dispatch_external(&mut self, id: ObserverId, event: &Event) -> bool {
        let Some(slot) = self.observers.get_mut(id.0) else {
            return false;
        };
        let Some(mut observer) = slot.take() else {
            warn!("Observer {:?} ist bereits aktiv, Zustellung übersprungen", id);
            return true;
        };
        if observer.accepts().intersects(event.flags()) {
            observer.notify(self, event);
        }
        if let Some(slot) = self.observers.get_mut(id.0) {
            *slot = Some(observer);
        }
        true
    }

    fn prune_observers(&mut self, o: Handle) {
        let alive: Vec<ObserverRef> = match self.entities.get(o.0) {
            Some(e) => e
                .observers
                .iter()
                .copied()
                .filter(|r| match r {
                    ObserverRef::Entity(h) => self.entities.contains(h.0),
                    ObserverRef::External(id) => self.observers.contains(id.0),
                })
                .collect(),
            None => return,
        };
        if let Some(e) = self.entities.get_mut(o.0) {
            e.observers = alive;
        }
    }

    /// Lokale Buchführung eines Objekts.
    fn handle_event(&mut self, o: Handle, event: &Event) {
        if event.kind() == EventKind::ValueAdded && event.origin() == Some(o) {
            let synced = event
                .value_name()
                .filter(|name| self.root_syncs(o, name))
                .map(str::to_string);
            if let Some(name) = synced {
                self.root_sync_name_to_children(o, &name);
            }
        }
        trace!("{} verarbeitet {:?}", o, event.kind());
    }

    /// Feuert ein Struktur-Ereignis über `group`.
    pub(crate) fn fire_node_event(&mut self, kind: EventKind, group: Handle, child: Handle, flags: NotifyFlags) {
        let mut ev = Event::with_flags(flags);
        ev.init_node(kind, group, child);
        self.process_notification(group, &mut ev, false);
    }
}
