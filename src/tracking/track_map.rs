//! Zuordnung von Components über die Zeit.
//!
//! Regel: nächster Schwerpunkt innerhalb eines Suchradius, optional mit
//! Größengewichtung. Zugeordnete Components übernehmen die ID des
//! Vorgängers, alle anderen bekommen neue IDs oberhalb des bisherigen
//! Maximums.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::cell::{Cell, CelpList};
use super::spatial::{match_cost, CentroidIndex};

/// Parameter der Zuordnung.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackParams {
    /// Suchradius um den Schwerpunkt
    pub radius: f64,
    /// Gewicht des Größenunterschieds (0 = nur Abstand)
    pub size_weight: f64,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            radius: 10.0,
            size_weight: 0.0,
        }
    }
}

impl TrackParams {
    /// Bester Vorgänger für eine einzelne Zelle; `skip` schließt IDs aus.
    pub fn best_match(
        &self,
        prev: &CelpList,
        cell: &Cell,
        skip: impl Fn(u32) -> bool,
    ) -> Option<u32> {
        let index = CentroidIndex::from_cells(prev);
        index
            .within_radius(cell.center(), self.radius)
            .into_iter()
            .filter(|m| !skip(m.id))
            .filter_map(|m| {
                let p = prev.get(m.id)?;
                Some((match_cost(m.distance, cell.size(), p.size(), self.size_weight), m.id))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, id)| id)
    }

    /// Eindeutige Zuordnung `aktuelle ID -> Vorgänger-ID`.
    ///
    /// Alle Paare im Radius werden nach Kosten sortiert und gierig
    /// vergeben; jede ID wird höchstens einmal verwendet.
    pub fn correspond(&self, prev: &CelpList, cur: &CelpList) -> IndexMap<u32, u32> {
        let index = CentroidIndex::from_cells(prev);
        let mut candidates = Vec::new();
        for cell in cur.iter() {
            for m in index.within_radius(cell.center(), self.radius) {
                if let Some(p) = prev.get(m.id) {
                    let cost = match_cost(m.distance, cell.size(), p.size(), self.size_weight);
                    candidates.push((cost, cell.id(), m.id));
                }
            }
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut used_prev = HashSet::new();
        let mut assigned: IndexMap<u32, u32> = IndexMap::new();
        for (_, cur_id, prev_id) in candidates {
            if assigned.contains_key(&cur_id) || used_prev.contains(&prev_id) {
                continue;
            }
            assigned.insert(cur_id, prev_id);
            used_prev.insert(prev_id);
        }

        cur.ids()
            .filter_map(|id| assigned.get(&id).map(|p| (id, *p)))
            .collect()
    }

    /// Vollständige Umbenennung der aktuellen IDs.
    ///
    /// `next_id` ist die nächste freie ID und wird fortgeschrieben.
    pub fn relabel(&self, prev: &CelpList, cur: &CelpList, next_id: &mut u32) -> IndexMap<u32, u32> {
        let matched = self.correspond(prev, cur);
        *next_id = (*next_id).max(prev.max_id().unwrap_or(0) + 1);
        cur.ids()
            .map(|id| match matched.get(&id) {
                Some(prev_id) => (id, *prev_id),
                None => {
                    let fresh = *next_id;
                    *next_id += 1;
                    (id, fresh)
                }
            })
            .collect()
    }
}

/// Components aller Frames und die Verbindungen zwischen Nachbarframes.
#[derive(Debug, Clone, Default)]
pub struct TrackMap {
    params: TrackParams,
    frames: BTreeMap<usize, CelpList>,
    /// Verbindungen `frame - 1 -> frame` als `(vorher, nachher)`
    links: BTreeMap<usize, Vec<(u32, u32)>>,
    next_id: u32,
}

impl TrackMap {
    pub fn new(params: TrackParams) -> Self {
        Self {
            params,
            next_id: 1,
            ..Self::default()
        }
    }

    pub fn params(&self) -> &TrackParams {
        &self.params
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, frame: usize) -> Option<&CelpList> {
        self.frames.get(&frame)
    }

    pub fn frames(&self) -> impl Iterator<Item = (usize, &CelpList)> {
        self.frames.iter().map(|(f, l)| (*f, l))
    }

    pub fn links(&self, frame: usize) -> &[(u32, u32)] {
        self.links.get(&frame).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn next_id(&self) -> u32 {
        self.next_id.max(1)
    }

    /// Übernimmt eine Liste unverändert.
    pub fn set_frame(&mut self, frame: usize, list: CelpList) {
        self.next_id = self.next_id().max(list.max_id().unwrap_or(0) + 1);
        self.frames.insert(frame, list);
    }

    /// Ordnet eine Liste dem Vorgängerframe zu und speichert sie mit den
    /// übernommenen IDs. Liefert die Umbenennung `alt -> neu`.
    pub fn track_frame(&mut self, frame: usize, list: CelpList) -> IndexMap<u32, u32> {
        let prev = frame
            .checked_sub(1)
            .and_then(|p| self.frames.get(&p))
            .cloned()
            .unwrap_or_default();

        let mut next_id = self.next_id();
        let mapping = self.params.relabel(&prev, &list, &mut next_id);
        let list = list.remap(&mapping);

        let links: Vec<(u32, u32)> = list.ids().filter(|id| prev.contains(*id)).map(|id| (id, id)).collect();
        if frame > 0 {
            self.links.insert(frame, links);
        }
        self.next_id = next_id;
        self.set_frame(frame, list);
        mapping
    }

    /// Folgt einer ID vorwärts über die Verbindungen.
    pub fn track(&self, frame: usize, id: u32) -> Vec<(usize, u32)> {
        let mut path = Vec::new();
        if !self.frames.get(&frame).is_some_and(|l| l.contains(id)) {
            return path;
        }
        path.push((frame, id));
        let (mut f, mut cur) = (frame, id);
        while let Some(next) = self
            .links
            .get(&(f + 1))
            .and_then(|links| links.iter().find(|(a, _)| *a == cur))
        {
            f += 1;
            cur = next.1;
            path.push((f, cur));
        }
        path
    }

    /// Dupliziert eine Zelle unter einer neuen ID.
    pub fn add_cell_dup(&mut self, frame: usize, id: u32) -> Option<u32> {
        let new_id = self.next_id();
        let list = self.frames.get_mut(&frame)?;
        let mut cell = list.get(id)?.clone();
        cell.set_id(new_id);
        list.insert(cell);
        self.next_id = new_id + 1;
        Some(new_id)
    }

    /// Benennt eine Zelle um. Schlägt fehl, wenn `new` bereits existiert.
    pub fn replace_cell_id(&mut self, frame: usize, old: u32, new: u32) -> bool {
        let Some(list) = self.frames.get_mut(&frame) else {
            return false;
        };
        if old == new || !list.contains(old) || list.contains(new) {
            log::debug!("Umbenennen {} -> {} in Frame {} abgelehnt", old, new, frame);
            return false;
        }
        let mut map = IndexMap::new();
        map.insert(old, new);
        *list = list.remap(&map);

        if let Some(links) = self.links.get_mut(&frame) {
            for link in links.iter_mut().filter(|l| l.1 == old) {
                link.1 = new;
            }
        }
        if let Some(links) = self.links.get_mut(&(frame + 1)) {
            for link in links.iter_mut().filter(|l| l.0 == old) {
                link.0 = new;
            }
        }
        self.next_id = self.next_id().max(new + 1);
        true
    }

    /// Führt Zellen eines Frames zusammen und biegt Verbindungen um.
    pub fn combine_cells(&mut self, frame: usize, ids: &[u32]) -> Option<u32> {
        let target = self.frames.get_mut(&frame)?.combine_ids(ids)?;
        let merged: HashSet<u32> = ids.iter().copied().collect();
        let retarget = |links: &mut Vec<(u32, u32)>, incoming: bool| {
            for link in links.iter_mut() {
                let end = if incoming { &mut link.1 } else { &mut link.0 };
                if merged.contains(&*end) {
                    *end = target;
                }
            }
            let mut seen = HashSet::new();
            links.retain(|l| seen.insert(*l));
        };
        if let Some(links) = self.links.get_mut(&frame) {
            retarget(links, true);
        }
        if let Some(links) = self.links.get_mut(&(frame + 1)) {
            retarget(links, false);
        }
        Some(target)
    }
}
