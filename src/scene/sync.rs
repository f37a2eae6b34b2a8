//! Stehende Synchronisation (Links) und einmalige Übertragung von Werten.
//!
//! Ein Link ist gerichtet: `sync_value(a, "x", b)` sorgt dafür, dass jede
//! künftige Änderung von `a.x` auch `b.x` setzt, nicht umgekehrt.

use log::debug;

use crate::core::{Event, EventKind, Handle, ValueId};

use super::store::NameOrder;
use super::Scene;

impl Scene {
    fn link_pair(&self, src: Handle, src_name: &str, dst: Handle, dst_name: &str) -> Option<(ValueId, ValueId)> {
        let a = self.value_id(src, src_name)?;
        let b = self.value_id(dst, dst_name)?;
        let kind_a = self.value_by_id(a)?.kind();
        let kind_b = self.value_by_id(b)?.kind();
        if kind_a != kind_b {
            debug!(
                "sync: '{}' ({}) und '{}' ({}) haben verschiedene Typen",
                src_name,
                kind_a.type_name(),
                dst_name,
                kind_b.type_name()
            );
            return None;
        }
        Some((a, b))
    }

    fn link(&mut self, from: ValueId, to: ValueId) -> bool {
        if from == to {
            // geteilter Slot, bereits identisch
            return true;
        }
        match self.values.get_mut(from.0) {
            Some(slot) => {
                if !slot.links.contains(&to) {
                    slot.links.push(to);
                }
                true
            }
            None => false,
        }
    }

    fn unlink(&mut self, from: ValueId, to: ValueId) -> bool {
        match self.values.get_mut(from.0) {
            Some(slot) => {
                let before = slot.links.len();
                slot.links.retain(|l| *l != to);
                slot.links.len() != before
            }
            None => false,
        }
    }

    /// Künftige Änderungen von `src.name` werden nach `dst.name` übertragen.
    pub fn sync_value(&mut self, src: Handle, name: &str, dst: Handle) -> bool {
        match self.link_pair(src, name, dst, name) {
            Some((a, b)) => self.link(a, b),
            None => {
                debug!("sync_value: '{}' fehlt auf {} oder {}", name, src, dst);
                false
            }
        }
    }

    pub fn unsync_value(&mut self, src: Handle, name: &str, dst: Handle) -> bool {
        match (self.value_id(src, name), self.value_id(dst, name)) {
            (Some(a), Some(b)) => self.unlink(a, b),
            _ => false,
        }
    }

    pub fn is_synced(&self, src: Handle, name: &str, dst: Handle) -> bool {
        match (self.value_id(src, name), self.value_id(dst, name)) {
            (Some(a), Some(b)) => {
                a == b || self.values.get(a.0).is_some_and(|s| s.links.contains(&b))
            }
            _ => false,
        }
    }

    /// `true`, wenn alle Namen verknüpft wurden.
    pub fn sync_values(&mut self, src: Handle, names: &[&str], dst: Handle) -> bool {
        names
            .iter()
            .fold(true, |ok, name| self.sync_value(src, name, dst) && ok)
    }

    pub fn unsync_values(&mut self, src: Handle, names: &[&str], dst: Handle) -> bool {
        names
            .iter()
            .fold(true, |ok, name| self.unsync_value(src, name, dst) && ok)
    }

    /// Verknüpft alle Namen, die beide Objekte besitzen.
    pub fn sync_all_values(&mut self, src: Handle, dst: Handle) -> usize {
        let names: Vec<String> = self
            .value_names(src, NameOrder::Unordered)
            .into_iter()
            .filter(|name| self.has_value(dst, name))
            .collect();
        names
            .iter()
            .filter(|name| self.sync_value(src, name, dst))
            .count()
    }

    pub fn unsync_all_values(&mut self, src: Handle, dst: Handle) -> usize {
        let names = self.value_names(src, NameOrder::Unordered);
        names
            .iter()
            .filter(|name| self.unsync_value(src, name, dst))
            .count()
    }

    /// Gegenseitige Verknüpfung von Werten desselben Objekts
    /// (z.B. Gamma der Kanäle r/g/b).
    pub fn sync_values_local(&mut self, h: Handle, names: &[&str]) -> bool {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            match self.value_id(h, name) {
                Some(vid) => ids.push(vid),
                None => {
                    debug!("sync_values_local: '{}' fehlt auf {}", name, h);
                    return false;
                }
            }
        }
        let kinds: Vec<_> = ids.iter().filter_map(|v| self.value_by_id(*v).map(|x| x.kind())).collect();
        if kinds.windows(2).any(|w| w[0] != w[1]) {
            debug!("sync_values_local: unterschiedliche Typen auf {}", h);
            return false;
        }
        for &a in &ids {
            for &b in &ids {
                if a != b {
                    self.link(a, b);
                }
            }
        }
        true
    }

    pub fn unsync_values_local(&mut self, h: Handle, names: &[&str]) -> bool {
        let ids: Vec<ValueId> = names.iter().filter_map(|n| self.value_id(h, n)).collect();
        for &a in &ids {
            for &b in &ids {
                if a != b {
                    self.unlink(a, b);
                }
            }
        }
        ids.len() == names.len()
    }

    /// Einmalige Übertragung von `src.name` nach `dst.name` ohne Link.
    pub fn prop_value(&mut self, src: Handle, name: &str, dst: Handle) -> bool {
        let Some((a, b)) = self.link_pair(src, name, dst, name) else {
            return false;
        };
        if a == b {
            return false;
        }
        let Some(value) = self.value_by_id(a).cloned() else {
            return false;
        };
        let mut ev = Event::new();
        ev.init_value(EventKind::SyncValue, Some(src), a, name, false);
        self.set_slot(b, value, &mut ev)
    }

    pub fn prop_values(&mut self, src: Handle, names: &[&str], dst: Handle) -> usize {
        names
            .iter()
            .filter(|name| self.prop_value(src, name, dst))
            .count()
    }

    /// Überträgt alle Werte, die beide besitzen.
    pub fn prop_all_values(&mut self, src: Handle, dst: Handle) -> usize {
        let names: Vec<String> = self
            .value_names(src, NameOrder::Unordered)
            .into_iter()
            .filter(|name| self.has_value(dst, name))
            .collect();
        names
            .iter()
            .filter(|name| self.prop_value(src, name, dst))
            .count()
    }
}
