//! Klonen von Entitäten nach `CopyOp`.
//!
//! Pro Klon-Durchgang führt eine Zuordnung Original → Kopie Buch, damit
//! geteilte Unterobjekte und Zyklen genau einmal kopiert werden.

use std::collections::HashMap;

use log::trace;

use crate::core::{CopyOp, Handle, Value, ValueId};

use super::entity::Entity;
use super::Scene;

impl Scene {
    /// Klont `h`. Das Ergebnis hat ID 0 und gehört dem Aufrufer (eine Referenz).
    pub fn clone_entity(&mut self, h: Handle, copyop: CopyOp) -> Option<Handle> {
        if !self.is_alive(h) {
            return None;
        }
        let mut map = HashMap::new();
        let copy = self.clone_inner(h, copyop, &mut map);
        self.retain(copy);

        // Kopien, die am Ende niemand hält, wieder abräumen
        let orphans: Vec<Handle> = map
            .values()
            .copied()
            .filter(|c| *c != copy && self.ref_count(*c) == 0)
            .collect();
        for orphan in orphans {
            if self.is_alive(orphan) && self.ref_count(orphan) == 0 {
                self.destroy(orphan);
            }
        }
        Some(copy)
    }

    fn clone_inner(&mut self, h: Handle, copyop: CopyOp, map: &mut HashMap<Handle, Handle>) -> Handle {
        if let Some(done) = map.get(&h) {
            return *done;
        }
        let Some(source) = self.entities.get(h.0) else {
            return h;
        };
        let mut copy = Entity::new(source.kind, 0, source.name.clone());
        copy.node_mask = source.node_mask;
        copy.root = source.root.clone();
        let values: Vec<(String, ValueId)> = source
            .values
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let children = source.children.clone();

        let new = Handle(self.entities.insert(copy));
        map.insert(h, new);
        trace!("Klon {} -> {}", h, new);

        for (name, vid) in values {
            if copyop.deep_values() {
                let Some(value) = self.value_by_id(vid).cloned() else {
                    continue;
                };
                let value = self.copy_value(&value, copyop, map);
                self.add_value(new, &name, value);
            } else {
                self.attach_slot(new, &name, vid);
            }
        }

        let targets: Vec<Handle> = children
            .into_iter()
            .map(|child| {
                if copyop.deep_nodes() {
                    self.clone_inner(child, copyop, map)
                } else {
                    child
                }
            })
            .collect();
        // Opt-outs der Root gelten für die Kopien, bevor diese angehängt werden
        self.remap_root_opt_out(new, map);
        for target in targets {
            self.add_child(new, target);
        }
        new
    }

    fn remap_root_opt_out(&mut self, root: Handle, map: &HashMap<Handle, Handle>) {
        if let Some(r) = self.entities.get_mut(root.0).and_then(|e| e.root.as_mut()) {
            let old = std::mem::take(&mut r.opt_out);
            r.opt_out = old
                .into_iter()
                .map(|(child, name)| (map.get(&child).copied().unwrap_or(child), name))
                .collect();
        }
    }

    /// Kopiert eine Nutzlast; Objektverweise folgen den Flags der Art.
    fn copy_value(&mut self, value: &Value, copyop: CopyOp, map: &mut HashMap<Handle, Handle>) -> Value {
        match value {
            Value::Object(Some(target)) => {
                let is_node = self.kind(*target).is_some_and(|k| k.is_node());
                if copyop.copies_entity(is_node) && self.is_alive(*target) {
                    Value::Object(Some(self.clone_inner(*target, copyop, map)))
                } else {
                    value.clone()
                }
            }
            Value::Referenced(r) => Value::Referenced(copyop.apply_referenced(r)),
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.copy_value(item, copyop, map))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}
