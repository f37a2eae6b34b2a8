//! Bearbeitung der Components eines Frames: Bereinigen, neue IDs,
//! Umbenennen und Zusammenführen.
//!
//! Alle Operationen arbeiten auf Label-Volumen und Component-Liste
//! gemeinsam. Fehlen Label oder Maske, liefern sie ein leeres Ergebnis
//! mit dem Status `"no data"` statt eines Fehlers.

use indexmap::{IndexMap, IndexSet};

use super::analyzer::{CompAnalyzer, NO_DATA};
use super::cache::{CacheError, CacheQueue};
use super::cell::{Cell, CelpList};
use super::track_map::TrackParams;
use super::volume::LabelVolume;
use crate::core::Color;

/// Kriterium für `clean`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CleanMode {
    /// Label außerhalb der Maske entfernen
    OutsideMask,
    /// Label innerhalb der Maske entfernen
    InsideMask,
    /// Components mit weniger Voxeln entfernen
    BelowSize(u32),
    /// Components mit geringerer mittlerer Intensität entfernen
    BelowIntensity(f64),
}

/// Ergebnis einer Bearbeitung mit Statustext für die Anzeige.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    /// Anzahl geänderter Voxel bzw. Einträge
    pub changed: usize,
    pub status: String,
}

impl EditOutcome {
    pub fn no_data() -> Self {
        Self {
            changed: 0,
            status: NO_DATA.to_string(),
        }
    }

    fn unchanged(reason: &str) -> Self {
        Self {
            changed: 0,
            status: reason.to_string(),
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.status == NO_DATA
    }
}

/// Neuaufbau der Liste nach einer Label-Änderung; nur `keep`-IDs bleiben.
fn rebuild(vol: &LabelVolume, keep: impl Fn(u32) -> bool) -> CelpList {
    let mut list = CompAnalyzer::default().analyze(vol);
    list.retain(|c| keep(c.id()));
    list
}

/// Werkzeug zur Component-Bearbeitung mit aktueller ID und Auswahl.
#[derive(Debug, Clone)]
pub struct ComponentEditor {
    id: u32,
    id_empty: bool,
    shuffle: u32,
    track: TrackParams,
    selected: Vec<u32>,
    status: String,
}

impl Default for ComponentEditor {
    fn default() -> Self {
        Self::new(TrackParams::default())
    }
}

impl ComponentEditor {
    pub fn new(track: TrackParams) -> Self {
        Self {
            id: 0,
            id_empty: true,
            shuffle: 0,
            track,
            selected: Vec::new(),
            status: String::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Keine aktuelle ID gesetzt?
    pub fn id_empty(&self) -> bool {
        self.id_empty
    }

    /// Setzt die aktuelle ID; `0` leert sie.
    pub fn set_id(&mut self, id: u32) {
        self.id = id;
        self.id_empty = id == 0;
    }

    pub fn clear_id(&mut self) {
        self.set_id(0);
    }

    pub fn shuffle(&self) -> u32 {
        self.shuffle
    }

    pub fn set_shuffle(&mut self, shuffle: u32) {
        self.shuffle = shuffle;
    }

    /// Anzeigefarbe der aktuellen ID.
    pub fn color(&self) -> Color {
        Color::from_id(self.id, self.shuffle)
    }

    pub fn track_params(&self) -> &TrackParams {
        &self.track
    }

    pub fn set_track_params(&mut self, track: TrackParams) {
        self.track = track;
    }

    pub fn selected(&self) -> &[u32] {
        &self.selected
    }

    /// Setzt die Auswahl; doppelte IDs zählen einmal, die Reihenfolge bleibt.
    pub fn select(&mut self, ids: &[u32]) {
        let unique: IndexSet<u32> = ids.iter().copied().collect();
        self.selected = unique.into_iter().collect();
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Status der letzten Operation.
    pub fn status(&self) -> &str {
        &self.status
    }

    fn finish(&mut self, outcome: EditOutcome) -> EditOutcome {
        self.status = outcome.status.clone();
        outcome
    }

    // ── Bereinigen ──────────────────────────────────────────────────

    /// Entfernt Components bzw. Label-Voxel nach `mode`. IDs der
    /// verbleibenden Components bleiben unverändert.
    pub fn clean(&mut self, vol: &mut LabelVolume, list: &mut CelpList, mode: CleanMode) -> EditOutcome {
        if !vol.has_label() {
            return self.finish(EditOutcome::no_data());
        }

        let changed = match mode {
            CleanMode::OutsideMask | CleanMode::InsideMask => {
                if !vol.has_mask() {
                    return self.finish(EditOutcome::no_data());
                }
                let inside = mode == CleanMode::InsideMask;
                let remove: Vec<usize> = (0..vol.len())
                    .filter(|&i| vol.label(i) != 0 && vol.masked(i) == inside)
                    .collect();
                if let Some(labels) = vol.labels_mut() {
                    for &i in &remove {
                        labels[i] = 0;
                    }
                }
                let old = list.clone();
                *list = rebuild(vol, |id| old.contains(id));
                remove.len()
            }
            CleanMode::BelowSize(min) => self.drop_cells(vol, list, |c| c.size() < min),
            CleanMode::BelowIntensity(min) => self.drop_cells(vol, list, |c| c.mean() < min),
        };

        let status = format!("{} voxels cleaned, {} components left", changed, list.len());
        self.finish(EditOutcome { changed, status })
    }

    fn drop_cells(
        &self,
        vol: &mut LabelVolume,
        list: &mut CelpList,
        drop: impl Fn(&Cell) -> bool,
    ) -> usize {
        let removed = list.retain(|c| !drop(c));
        if removed.is_empty() {
            return 0;
        }
        vol.remap_labels(|l| if removed.contains(&l) { 0 } else { l })
    }

    // ── Neue ID ─────────────────────────────────────────────────────

    /// Vergibt für die maskierten Voxel eine ID.
    ///
    /// - `append` mit gesetzter aktueller ID: Voxel kommen zu dieser ID.
    /// - `track` mit Vorgängerliste: nächster Vorgänger-Schwerpunkt im
    ///   Suchradius, dessen ID im Frame noch frei ist.
    /// - sonst: neue ID oberhalb aller bekannten IDs.
    pub fn new_id(
        &mut self,
        vol: &mut LabelVolume,
        list: &mut CelpList,
        append: bool,
        track: Option<&CelpList>,
    ) -> EditOutcome {
        if !vol.has_mask() {
            return self.finish(EditOutcome::no_data());
        }
        let selected: Vec<usize> = (0..vol.len()).filter(|&i| vol.masked(i)).collect();
        if selected.is_empty() {
            return self.finish(EditOutcome::unchanged("no selection"));
        }

        let id = if append && !self.id_empty {
            self.id
        } else {
            let mut pending = Cell::new(0);
            for &i in &selected {
                pending.inc(vol.position(i), vol.intensity(i) as f64);
            }
            let tracked = track.and_then(|prev| {
                self.track
                    .best_match(prev, &pending, |pid| list.contains(pid) || pid == 0)
            });
            tracked.unwrap_or_else(|| {
                let known = [
                    vol.max_label(),
                    list.max_id().unwrap_or(0),
                    track.and_then(CelpList::max_id).unwrap_or(0),
                ];
                known.into_iter().max().unwrap_or(0) + 1
            })
        };

        let labels = vol.ensure_label();
        let mut changed = 0;
        for &i in &selected {
            if labels[i] != id {
                labels[i] = id;
                changed += 1;
            }
        }
        let old = list.clone();
        *list = rebuild(vol, |c| c == id || old.contains(c));

        self.set_id(id);
        let status = format!("id {}: {} voxels", id, changed);
        self.finish(EditOutcome { changed, status })
    }

    // ── Umbenennen ──────────────────────────────────────────────────

    /// Ersetzt die ID `old` durch `new` (existiert `new`, werden beide
    /// zusammengeführt).
    pub fn replace_id(
        &mut self,
        vol: &mut LabelVolume,
        list: &mut CelpList,
        old: u32,
        new: u32,
    ) -> EditOutcome {
        let mut map = IndexMap::new();
        map.insert(old, new);
        self.replace_list(vol, list, &map)
    }

    /// Ersetzt mehrere IDs gleichzeitig gemäß `map`.
    pub fn replace_list(
        &mut self,
        vol: &mut LabelVolume,
        list: &mut CelpList,
        map: &IndexMap<u32, u32>,
    ) -> EditOutcome {
        if !vol.has_label() {
            return self.finish(EditOutcome::no_data());
        }
        let map: IndexMap<u32, u32> = map
            .iter()
            .filter(|(old, new)| old != new && **old != 0 && **new != 0 && list.contains(**old))
            .map(|(o, n)| (*o, *n))
            .collect();
        if map.is_empty() {
            return self.finish(EditOutcome::unchanged("unchanged"));
        }

        let changed = vol.remap_labels(|l| map.get(&l).copied().unwrap_or(l));
        *list = list.remap(&map);
        if let Some(last) = map.values().last() {
            self.set_id(*last);
        }
        let status = format!("{} ids replaced", map.len());
        self.finish(EditOutcome { changed, status })
    }

    // ── Zusammenführen ──────────────────────────────────────────────

    /// Führt die Components `ids` zu einem zusammen (ID der größten).
    /// Mit Volumen werden auch die Voxel umgelabelt.
    pub fn combine_id(
        &mut self,
        list: &mut CelpList,
        ids: &[u32],
        vol: Option<&mut LabelVolume>,
    ) -> EditOutcome {
        if list.is_empty() {
            return self.finish(EditOutcome::no_data());
        }
        let members: Vec<u32> = ids
            .iter()
            .copied()
            .filter(|id| list.contains(*id))
            .collect::<IndexSet<u32>>()
            .into_iter()
            .collect();
        let Some(target) = list.combine_ids(&members) else {
            return self.finish(EditOutcome::unchanged("unchanged"));
        };

        let changed = match vol {
            Some(vol) => vol.remap_labels(|l| if members.contains(&l) { target } else { l }),
            None => members.iter().filter(|id| **id != target).count(),
        };
        self.set_id(target);
        let status = format!("{} components combined into id {}", members.len(), target);
        self.finish(EditOutcome { changed, status })
    }

    /// Führt die Auswahl zusammen, ohne Auswahl die ganze Liste.
    pub fn combine_list(&mut self, list: &mut CelpList, vol: Option<&mut LabelVolume>) -> EditOutcome {
        let ids: Vec<u32> = if self.selected.is_empty() {
            list.ids().collect()
        } else {
            self.selected.clone()
        };
        self.combine_id(list, &ids, vol)
    }

    // ── Frame über den Cache ────────────────────────────────────────

    /// Bearbeitet einen Frame aus dem Cache.
    ///
    /// Das Volumen wird als Kopie bearbeitet und nur bei Änderungen als
    /// Ganzes zurückgeschrieben. Danach wird der Frame gespeichert und
    /// freigegeben.
    pub fn edit_frame(
        &mut self,
        cache: &CacheQueue,
        frame: usize,
        op: impl FnOnce(&mut Self, &mut LabelVolume, &mut CelpList) -> EditOutcome,
    ) -> Result<EditOutcome, CacheError> {
        let outcome = cache.with_frame(frame, |c| {
            let Some(vol) = c.volume() else {
                return EditOutcome::no_data();
            };
            let mut work = vol.clone();
            let mut list = CompAnalyzer::default().analyze(&work);
            let outcome = op(self, &mut work, &mut list);
            if outcome.changed > 0 {
                c.replace(work);
            }
            outcome
        })?;
        cache.release_frame(frame)?;
        Ok(self.finish(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::DVec3;

    /// 8x1x1: Component 1 auf 0..2, Component 2 auf 4..7.
    fn labeled() -> (LabelVolume, CelpList) {
        let mut vol = LabelVolume::from_data(8, 1, 1, vec![0.9, 0.9, 0.0, 0.0, 0.2, 0.2, 0.2, 0.0])
            .expect("passende Länge");
        vol.set_labels(Some(vec![1, 1, 0, 0, 2, 2, 2, 0]));
        let list = CompAnalyzer::default().analyze(&vol);
        (vol, list)
    }

    #[test]
    fn clean_without_label_reports_no_data() {
        let mut vol = LabelVolume::new(2, 2, 2);
        let mut list = CelpList::new();
        let mut editor = ComponentEditor::default();
        let outcome = editor.clean(&mut vol, &mut list, CleanMode::BelowSize(3));
        assert!(outcome.is_no_data());
        assert_eq!(editor.status(), NO_DATA);
    }

    #[test]
    fn clean_below_size_keeps_other_ids() {
        let (mut vol, mut list) = labeled();
        let mut editor = ComponentEditor::default();
        let outcome = editor.clean(&mut vol, &mut list, CleanMode::BelowSize(3));
        assert_eq!(outcome.changed, 2);
        assert_eq!(list.ids().collect::<Vec<_>>(), vec![2]);
        assert_eq!(vol.label(0), 0);
        assert_eq!(vol.label(4), 2);

        // erneut mit gleichen Parametern: keine Änderung
        let again = editor.clean(&mut vol, &mut list, CleanMode::BelowSize(3));
        assert_eq!(again.changed, 0);
        assert_eq!(list.ids().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn clean_below_intensity() {
        let (mut vol, mut list) = labeled();
        let mut editor = ComponentEditor::default();
        editor.clean(&mut vol, &mut list, CleanMode::BelowIntensity(0.5));
        assert_eq!(list.ids().collect::<Vec<_>>(), vec![1]);
        assert_eq!(vol.label(5), 0);
    }

    #[test]
    fn clean_outside_mask_trims_voxels() {
        let (mut vol, mut list) = labeled();
        let mask = vol.ensure_mask();
        mask[0] = 1;
        mask[4] = 1;
        mask[5] = 1;
        let mut editor = ComponentEditor::default();
        let outcome = editor.clean(&mut vol, &mut list, CleanMode::OutsideMask);
        assert_eq!(outcome.changed, 2);
        assert_eq!(list.get(1).map(Cell::size), Some(1));
        assert_eq!(list.get(2).map(Cell::size), Some(2));
    }

    #[test]
    fn clean_inside_mask_needs_mask() {
        let (mut vol, mut list) = labeled();
        let mut editor = ComponentEditor::default();
        assert!(editor
            .clean(&mut vol, &mut list, CleanMode::InsideMask)
            .is_no_data());
    }

    #[test]
    fn new_id_goes_beyond_maximum() {
        let (mut vol, mut list) = labeled();
        vol.ensure_mask()[2] = 1;
        vol.ensure_mask()[3] = 1;
        let mut editor = ComponentEditor::default();
        let outcome = editor.new_id(&mut vol, &mut list, false, None);
        assert_eq!(outcome.changed, 2);
        assert_eq!(editor.id(), 3);
        assert!(!editor.id_empty());
        assert_eq!(list.get(3).map(Cell::size), Some(2));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn new_id_append_extends_current_id() {
        let (mut vol, mut list) = labeled();
        vol.ensure_mask()[2] = 1;
        let mut editor = ComponentEditor::default();
        editor.set_id(1);
        editor.new_id(&mut vol, &mut list, true, None);
        assert_eq!(vol.label(2), 1);
        assert_eq!(list.get(1).map(Cell::size), Some(3));
    }

    #[test]
    fn new_id_with_track_reuses_previous_id() {
        let mut vol = LabelVolume::new(10, 1, 1);
        vol.ensure_mask()[8] = 1;
        let mut list = CelpList::new();
        let prev: CelpList = [
            Cell::with_size(4, 1, DVec3::new(1.0, 0.0, 0.0)),
            Cell::with_size(9, 1, DVec3::new(7.5, 0.0, 0.0)),
        ]
        .into_iter()
        .collect();
        let mut editor = ComponentEditor::new(TrackParams {
            radius: 2.0,
            size_weight: 0.0,
        });
        editor.new_id(&mut vol, &mut list, false, Some(&prev));
        assert_eq!(editor.id(), 9);
        assert_eq!(vol.label(8), 9);

        // außerhalb des Radius: neue ID über allen bekannten
        let mut far = LabelVolume::new(30, 1, 1);
        far.ensure_mask()[29] = 1;
        let mut far_list = CelpList::new();
        editor.new_id(&mut far, &mut far_list, false, Some(&prev));
        assert_eq!(editor.id(), 10);
    }

    #[test]
    fn new_id_without_mask_is_no_data() {
        let (mut vol, mut list) = labeled();
        let mut editor = ComponentEditor::default();
        assert!(editor.new_id(&mut vol, &mut list, false, None).is_no_data());
        assert!(editor.id_empty());
    }

    #[test]
    fn replace_id_merges_into_existing() {
        let (mut vol, mut list) = labeled();
        let mut editor = ComponentEditor::default();
        let outcome = editor.replace_id(&mut vol, &mut list, 1, 2);
        assert_eq!(outcome.changed, 2);
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(2).map(Cell::size), Some(5));
        assert_eq!(vol.label(0), 2);

        let unchanged = editor.replace_id(&mut vol, &mut list, 1, 5);
        assert_eq!(unchanged.changed, 0);
    }

    #[test]
    fn replace_list_swaps_ids() {
        let (mut vol, mut list) = labeled();
        let mut map = IndexMap::new();
        map.insert(1, 2);
        map.insert(2, 1);
        let mut editor = ComponentEditor::default();
        editor.replace_list(&mut vol, &mut list, &map);
        assert_eq!(vol.label(0), 2);
        assert_eq!(vol.label(4), 1);
        assert_eq!(list.get(1).map(Cell::size), Some(3));
        assert_eq!(list.get(2).map(Cell::size), Some(2));
    }

    #[test]
    fn combine_id_relabels_voxels() {
        let (mut vol, mut list) = labeled();
        let mut editor = ComponentEditor::default();
        let outcome = editor.combine_id(&mut list, &[1, 2], Some(&mut vol));
        assert_eq!(editor.id(), 2);
        assert_eq!(outcome.changed, 2);
        assert_eq!(vol.label(0), 2);
        let merged = list.get(2).expect("zusammengeführt");
        assert_eq!(merged.size(), 5);
        assert_relative_eq!(merged.center().x, (0.0 + 1.0 + 4.0 + 5.0 + 6.0) / 5.0);
    }

    #[test]
    fn combine_list_uses_selection() {
        let mut list: CelpList = (1..=3)
            .map(|id| Cell::with_size(id, id * 10, DVec3::new(id as f64, 0.0, 0.0)))
            .collect();
        let mut editor = ComponentEditor::default();
        editor.select(&[1, 2]);
        editor.combine_list(&mut list, None);
        assert_eq!(list.len(), 2);
        editor.clear_selection();
        editor.combine_list(&mut list, None);
        assert_eq!(list.len(), 1);
        assert_eq!(list.total_size(), 60);
    }

    #[test]
    fn repeated_ids_count_once() {
        let mut list: CelpList = (1..=3)
            .map(|id| Cell::with_size(id, id * 10, DVec3::new(id as f64, 0.0, 0.0)))
            .collect();
        let mut editor = ComponentEditor::default();
        editor.select(&[1, 2, 1]);
        assert_eq!(editor.selected(), &[1, 2]);

        let outcome = editor.combine_list(&mut list, None);
        assert_eq!(outcome.changed, 1);
        assert_eq!(editor.status(), "2 components combined into id 2");

        // beide jetzt 30 Voxel groß: die kleinere ID bleibt
        let outcome = editor.combine_id(&mut list, &[3, 2, 3], None);
        assert_eq!(outcome.changed, 1);
        assert_eq!(editor.status(), "2 components combined into id 2");
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn combine_on_empty_list_is_no_data() {
        let mut list = CelpList::new();
        let mut editor = ComponentEditor::default();
        assert!(editor.combine_id(&mut list, &[1], None).is_no_data());
    }
}
