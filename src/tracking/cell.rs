//! Components eines Zeitpunkts (`Cell`) und ihre Liste (`CelpList`).
//!
//! Eine Zelle speichert nur Summen (Anzahl, Positionssummen, Intensitäts-
//! summen). Zusammenführen addiert die Summen; Schwerpunkt und Statistik
//! werden bei Bedarf daraus abgeleitet. Dadurch ist das Zusammenführen
//! assoziativ und kommutativ.

use glam::DVec3;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::{BBox, Point};

/// Ein gelabelter Component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    id: u32,
    /// Anzahl Voxel
    size: u32,
    /// Anzahl Voxel an der Oberfläche
    ext_size: u32,
    pos_sum: DVec3,
    weighted_pos_sum: DVec3,
    intensity_sum: f64,
    intensity_sq_sum: f64,
    min_intensity: f64,
    max_intensity: f64,
    bbox: BBox,
}

impl Cell {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            size: 0,
            ext_size: 0,
            pos_sum: DVec3::ZERO,
            weighted_pos_sum: DVec3::ZERO,
            intensity_sum: 0.0,
            intensity_sq_sum: 0.0,
            min_intensity: f64::MAX,
            max_intensity: f64::MIN,
            bbox: BBox::empty(),
        }
    }

    /// Zelle aus Anzahl und Schwerpunkt (ohne Intensitätsstatistik).
    pub fn with_size(id: u32, size: u32, center: Point) -> Self {
        let mut cell = Self::new(id);
        cell.size = size;
        cell.pos_sum = center * size as f64;
        cell.weighted_pos_sum = cell.pos_sum;
        cell.intensity_sum = size as f64;
        cell.intensity_sq_sum = size as f64;
        if size > 0 {
            cell.min_intensity = 1.0;
            cell.max_intensity = 1.0;
            cell.bbox = BBox::new(center, center);
        }
        cell
    }

    /// Nimmt einen Voxel auf.
    pub fn inc(&mut self, pos: Point, intensity: f64) {
        self.size += 1;
        self.pos_sum += pos;
        self.weighted_pos_sum += pos * intensity;
        self.intensity_sum += intensity;
        self.intensity_sq_sum += intensity * intensity;
        self.min_intensity = self.min_intensity.min(intensity);
        self.max_intensity = self.max_intensity.max(intensity);
        self.bbox.extend(pos);
    }

    /// Zählt einen Oberflächen-Voxel.
    pub fn inc_ext(&mut self) {
        self.ext_size += 1;
    }

    /// Addiert die Summen einer anderen Zelle; die eigene ID bleibt.
    pub fn merge(&mut self, other: &Cell) {
        self.size += other.size;
        self.ext_size += other.ext_size;
        self.pos_sum += other.pos_sum;
        self.weighted_pos_sum += other.weighted_pos_sum;
        self.intensity_sum += other.intensity_sum;
        self.intensity_sq_sum += other.intensity_sq_sum;
        self.min_intensity = self.min_intensity.min(other.min_intensity);
        self.max_intensity = self.max_intensity.max(other.max_intensity);
        self.bbox.extend_box(&other.bbox);
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn ext_size(&self) -> u32 {
        self.ext_size
    }

    /// Schwerpunkt (gewichtet mit der Voxelanzahl).
    pub fn center(&self) -> Point {
        if self.size == 0 {
            return DVec3::ZERO;
        }
        self.pos_sum / self.size as f64
    }

    /// Intensitätsgewichteter Schwerpunkt.
    pub fn weighted_center(&self) -> Point {
        if self.intensity_sum <= 0.0 {
            return self.center();
        }
        self.weighted_pos_sum / self.intensity_sum
    }

    /// Intensitätssumme.
    pub fn intensity_size(&self) -> f64 {
        self.intensity_sum
    }

    pub fn mean(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        self.intensity_sum / self.size as f64
    }

    pub fn std_dev(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        let n = self.size as f64;
        let mean = self.intensity_sum / n;
        (self.intensity_sq_sum / n - mean * mean).max(0.0).sqrt()
    }

    pub fn min_intensity(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.min_intensity
        }
    }

    pub fn max_intensity(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.max_intensity
        }
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }
}

/// Kompakte Zusammenfassung einer Zelle für JSON-Ausgaben.
#[derive(Debug, Clone, Serialize)]
pub struct CellSummary {
    pub id: u32,
    pub size: u32,
    pub ext_size: u32,
    pub center: [f64; 3],
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&Cell> for CellSummary {
    fn from(cell: &Cell) -> Self {
        Self {
            id: cell.id,
            size: cell.size,
            ext_size: cell.ext_size,
            center: cell.center().to_array(),
            mean: cell.mean(),
            std_dev: cell.std_dev(),
        }
    }
}

/// Components eines Zeitpunkts, nach ID adressiert (Einfügereihenfolge stabil).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CelpList {
    cells: IndexMap<u32, Cell>,
}

impl CelpList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fügt eine Zelle ein. Eine vorhandene Zelle gleicher ID wird ersetzt.
    pub fn insert(&mut self, cell: Cell) -> Option<Cell> {
        self.cells.insert(cell.id, cell)
    }

    pub fn get(&self, id: u32) -> Option<&Cell> {
        self.cells.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Cell> {
        self.cells.shift_remove(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.cells.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.cells.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn min_id(&self) -> Option<u32> {
        self.cells.keys().copied().min()
    }

    pub fn max_id(&self) -> Option<u32> {
        self.cells.keys().copied().max()
    }

    /// Summe aller Voxel.
    pub fn total_size(&self) -> u64 {
        self.cells.values().map(|c| c.size as u64).sum()
    }

    /// Behält nur Zellen, für die `keep` gilt; liefert die entfernten IDs.
    pub fn retain(&mut self, mut keep: impl FnMut(&Cell) -> bool) -> Vec<u32> {
        let mut removed = Vec::new();
        self.cells.retain(|id, cell| {
            let k = keep(cell);
            if !k {
                removed.push(*id);
            }
            k
        });
        removed
    }

    /// Führt die vorhandenen Zellen aus `ids` zu einer zusammen.
    ///
    /// Die Ziel-ID ist die der größten Zelle (bei Gleichstand die kleinste
    /// ID); sie bleibt an ihrer Position in der Liste. Liefert die Ziel-ID,
    /// oder `None`, wenn keine der IDs existiert.
    pub fn combine_ids(&mut self, ids: &[u32]) -> Option<u32> {
        let mut present: Vec<u32> = ids.iter().copied().filter(|id| self.contains(*id)).collect();
        present.sort_unstable();
        present.dedup();

        let target = present.iter().copied().max_by(|a, b| {
            let (sa, sb) = (self.cells[a].size, self.cells[b].size);
            sa.cmp(&sb).then(b.cmp(a))
        })?;

        for id in present.iter().copied().filter(|id| *id != target) {
            if let Some(cell) = self.cells.shift_remove(&id) {
                if let Some(t) = self.cells.get_mut(&target) {
                    t.merge(&cell);
                }
            }
        }
        Some(target)
    }

    /// Vergibt neue IDs gemäß `map` (nicht gelistete IDs bleiben).
    pub fn remap(&self, map: &IndexMap<u32, u32>) -> CelpList {
        let mut out = CelpList::new();
        for cell in self.cells.values() {
            let mut cell = cell.clone();
            let id = map.get(&cell.id).copied().unwrap_or(cell.id);
            cell.set_id(id);
            match out.get_mut(id) {
                Some(existing) => existing.merge(&cell),
                None => {
                    out.insert(cell);
                }
            }
        }
        out
    }

    /// JSON-Dump der Zellen-Zusammenfassungen.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let summaries: Vec<CellSummary> = self.cells.values().map(CellSummary::from).collect();
        serde_json::to_string_pretty(&summaries)
    }
}

impl FromIterator<Cell> for CelpList {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        let mut list = CelpList::new();
        for cell in iter {
            list.insert(cell);
        }
        list
    }
}
