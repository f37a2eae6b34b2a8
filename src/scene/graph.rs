//! Gruppen-Struktur: besitzende Kindlisten, schwache Eltern-Rückverweise
//! und die Wert-Synchronisation der Root.
//!
//! Invariante: die Eltern-Liste eines Nodes enthält genau die Gruppen,
//! die ihn als Kind besitzen. Jede Mutation hält das beidseitig aktuell;
//! tote Eltern (bereits zerstörte Gruppen) werden beim Lesen übersprungen.

use log::debug;

use crate::core::{EventKind, Handle, NotifyFlags};

use super::entity::EntityKind;
use super::Scene;

impl Scene {
    pub fn is_group(&self, h: Handle) -> bool {
        self.kind(h).is_some_and(EntityKind::is_group)
    }

    pub fn is_root(&self, h: Handle) -> bool {
        self.kind(h) == Some(EntityKind::Root)
    }

    // ── Abfragen ────────────────────────────────────────────────────

    pub fn children(&self, g: Handle) -> &[Handle] {
        self.entities
            .get(g.0)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn child_count(&self, g: Handle) -> usize {
        self.children(g).len()
    }

    pub fn child(&self, g: Handle, index: usize) -> Option<Handle> {
        self.children(g).get(index).copied()
    }

    pub fn child_index(&self, g: Handle, child: Handle) -> Option<usize> {
        self.children(g).iter().position(|c| *c == child)
    }

    pub fn contains_child(&self, g: Handle, child: Handle) -> bool {
        self.children(g).contains(&child)
    }

    /// Lebende Eltern eines Nodes.
    pub fn parents(&self, n: Handle) -> Vec<Handle> {
        self.entities
            .get(n.0)
            .map(|e| {
                e.parents
                    .iter()
                    .copied()
                    .filter(|p| self.is_alive(*p))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn parent(&self, n: Handle, index: usize) -> Option<Handle> {
        self.parents(n).get(index).copied()
    }

    pub fn parent_count(&self, n: Handle) -> usize {
        self.parents(n).len()
    }

    /// Entfernt tote Rückverweise sofort.
    pub fn prune_parents(&mut self, n: Handle) -> usize {
        let alive = self.parents(n);
        match self.entities.get_mut(n.0) {
            Some(e) => {
                let removed = e.parents.len() - alive.len();
                e.parents = alive;
                removed
            }
            None => 0,
        }
    }

    /// Entfernt einen Rückverweis, sofern `parent` das Kind nicht mehr besitzt.
    pub fn remove_parent(&mut self, n: Handle, parent: Handle) -> bool {
        if self.contains_child(parent, n) {
            debug!("remove_parent: {} besitzt {} noch", parent, n);
            return false;
        }
        match self.entities.get_mut(n.0) {
            Some(e) => {
                let before = e.parents.len();
                e.parents.retain(|p| *p != parent);
                e.parents.len() != before
            }
            None => false,
        }
    }

    /// `true`, wenn `ancestor` über Eltern-Verweise von `n` erreichbar ist.
    pub fn is_ancestor(&self, ancestor: Handle, n: Handle) -> bool {
        let mut stack = self.parents(n);
        let mut seen = Vec::new();
        while let Some(p) = stack.pop() {
            if p == ancestor {
                return true;
            }
            if !seen.contains(&p) {
                seen.push(p);
                stack.extend(self.parents(p));
            }
        }
        false
    }

    fn can_adopt(&self, g: Handle, child: Handle) -> bool {
        if !self.is_group(g) {
            debug!("{} ist keine Gruppe", g);
            return false;
        }
        match self.kind(child) {
            None => {
                debug!("Kind {} existiert nicht", child);
                false
            }
            Some(kind) if !kind.is_node() => {
                debug!("{} ist kein Node und kann kein Kind sein", child);
                false
            }
            Some(_) if child == g || self.is_ancestor(child, g) => {
                debug!("{} als Kind von {} würde einen Zyklus bilden", child, g);
                false
            }
            Some(_) => true,
        }
    }

    fn attach_back_ref(&mut self, g: Handle, child: Handle) {
        if let Some(c) = self.entities.get_mut(child.0) {
            if !c.parents.contains(&g) {
                c.parents.push(g);
            }
        }
        self.add_entity_observer(child, g);
    }

    // ── Mutationen ──────────────────────────────────────────────────

    pub fn add_child(&mut self, g: Handle, child: Handle) -> bool {
        let n = self.child_count(g);
        self.insert_child(g, n, child)
    }

    /// Fügt bei `index` ein; Indizes hinter dem Ende hängen an.
    pub fn insert_child(&mut self, g: Handle, index: usize, child: Handle) -> bool {
        if !self.can_adopt(g, child) {
            return false;
        }
        self.retain(child);
        if let Some(e) = self.entities.get_mut(g.0) {
            let pos = index.min(e.children.len());
            e.children.insert(pos, child);
        }
        self.attach_back_ref(g, child);
        self.fire_node_event(EventKind::NodeAdded, g, child, NotifyFlags::ALL);
        if self.is_root(g) {
            self.root_sync_child(g, child);
        }
        true
    }

    pub fn remove_child(&mut self, g: Handle, child: Handle) -> bool {
        match self.child_index(g, child) {
            Some(index) => self.remove_children(g, index, 1),
            None => false,
        }
    }

    /// Entfernt `[pos, pos + num)`, wobei `num` auf das Ende begrenzt wird.
    pub fn remove_children(&mut self, g: Handle, pos: usize, num: usize) -> bool {
        let len = self.child_count(g);
        if pos >= len || num == 0 {
            debug!("remove_children({}, {}) außerhalb von 0..{}", pos, num, len);
            return false;
        }
        let end = pos.saturating_add(num).min(len);
        let removed: Vec<Handle> = match self.entities.get_mut(g.0) {
            Some(e) => e.children.drain(pos..end).collect(),
            None => return false,
        };
        for child in removed {
            self.detach_child(g, child);
        }
        true
    }

    /// Ersetzt das Kind an Position `index`.
    pub fn set_child(&mut self, g: Handle, index: usize, node: Handle) -> bool {
        if index >= self.child_count(g) {
            debug!("set_child: Index {} außerhalb", index);
            return false;
        }
        if !self.can_adopt(g, node) {
            return false;
        }
        let Some(old) = self.child(g, index) else {
            return false;
        };
        if old == node {
            return true;
        }
        self.retain(node);
        if let Some(e) = self.entities.get_mut(g.0) {
            e.children[index] = node;
        }
        self.attach_back_ref(g, node);
        self.fire_node_event(EventKind::NodeAdded, g, node, NotifyFlags::ALL);
        if self.is_root(g) {
            self.root_sync_child(g, node);
        }
        self.detach_child(g, old);
        true
    }

    pub fn replace_child(&mut self, g: Handle, old: Handle, new: Handle) -> bool {
        match self.child_index(g, old) {
            Some(index) => self.set_child(g, index, new),
            None => {
                debug!("replace_child: {} ist kein Kind von {}", old, g);
                false
            }
        }
    }

    /// Nachbereitung eines bereits aus der Liste genommenen Kindes.
    fn detach_child(&mut self, g: Handle, child: Handle) {
        let still_owned = self.contains_child(g, child);
        if self.is_root(g) && !still_owned {
            self.root_unsync_child(g, child);
            if let Some(r) = self.entities.get_mut(g.0).and_then(|e| e.root.as_mut()) {
                r.opt_out.retain(|(c, _)| *c != child);
            }
        }
        if !still_owned {
            if let Some(c) = self.entities.get_mut(child.0) {
                c.parents.retain(|p| *p != g);
            }
            self.remove_entity_observer(child, g);
        }
        self.fire_node_event(EventKind::NodeRemoved, g, child, NotifyFlags::ALL);
        self.release(child);
    }

    // ── Root-Synchronisation ────────────────────────────────────────

    pub fn root_sync_names(&self, root: Handle) -> Vec<String> {
        self.entities
            .get(root.0)
            .and_then(|e| e.root.as_ref())
            .map(|r| r.sync_names.clone())
            .unwrap_or_default()
    }

    pub(crate) fn root_syncs(&self, root: Handle, name: &str) -> bool {
        self.entities
            .get(root.0)
            .and_then(|e| e.root.as_ref())
            .is_some_and(|r| r.sync_names.iter().any(|n| n == name))
    }

    fn root_opted_out(&self, root: Handle, child: Handle, name: &str) -> bool {
        self.entities
            .get(root.0)
            .and_then(|e| e.root.as_ref())
            .is_some_and(|r| r.opt_out.contains(&(child, name.to_string())))
    }

    /// Nimmt einen weiteren Namen in die Synchronisation auf.
    pub fn add_root_sync_name(&mut self, root: Handle, name: &str) -> bool {
        let added = match self.entities.get_mut(root.0).and_then(|e| e.root.as_mut()) {
            Some(r) if !r.sync_names.iter().any(|n| n == name) => {
                r.sync_names.push(name.to_string());
                true
            }
            _ => false,
        };
        if added {
            self.root_sync_name_to_children(root, name);
        }
        added
    }

    /// Das Kind folgt `name` der Root nicht mehr, solange es Kind bleibt.
    pub fn root_opt_out(&mut self, root: Handle, child: Handle, name: &str) -> bool {
        if !self.contains_child(root, child) {
            debug!("root_opt_out: {} ist kein Kind von {}", child, root);
            return false;
        }
        match self.entities.get_mut(root.0).and_then(|e| e.root.as_mut()) {
            Some(r) => {
                r.opt_out.insert((child, name.to_string()));
            }
            None => return false,
        }
        self.unsync_value(root, name, child);
        true
    }

    pub fn root_opt_in(&mut self, root: Handle, child: Handle, name: &str) -> bool {
        let removed = match self.entities.get_mut(root.0).and_then(|e| e.root.as_mut()) {
            Some(r) => r.opt_out.remove(&(child, name.to_string())),
            None => return false,
        };
        if removed && self.contains_child(root, child) {
            self.root_sync_one(root, child, name);
        }
        removed
    }

    pub(crate) fn root_sync_child(&mut self, root: Handle, child: Handle) {
        for name in self.root_sync_names(root) {
            self.root_sync_one(root, child, &name);
        }
    }

    pub(crate) fn root_unsync_child(&mut self, root: Handle, child: Handle) {
        for name in self.root_sync_names(root) {
            self.unsync_value(root, &name, child);
        }
    }

    pub(crate) fn root_sync_name_to_children(&mut self, root: Handle, name: &str) {
        let children = self.children(root).to_vec();
        for child in children {
            self.root_sync_one(root, child, name);
        }
    }

    fn root_sync_one(&mut self, root: Handle, child: Handle, name: &str) {
        if self.root_opted_out(root, child, name) {
            return;
        }
        let Some(value) = self.get_value(root, name).cloned() else {
            return;
        };
        if self.has_value(child, name) {
            self.prop_value(root, name, child);
        } else {
            self.add_value(child, name, value);
        }
        self.sync_value(root, name, child);
    }
}

#[cfg(test)]
mod tests;
