//! Spatial-Index (KD-Tree) über Component-Schwerpunkten.
//!
//! Der Baum ist unveränderlich und wird pro Liste neu gebaut; Schwerpunkte
//! einer Schicht (gleiches z) sind damit unkritisch.

use std::collections::HashMap;
use std::sync::Arc;

use kiddo::{ImmutableKdTree, SquaredEuclidean};

use super::cell::CelpList;
use crate::core::{BBox, Point};

/// Ergebnis einer Distanzabfrage gegen den Index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentroidMatch {
    /// ID des gefundenen Components
    pub id: u32,
    /// Euklidische Distanz zum Suchpunkt
    pub distance: f64,
}

/// Read-only Index über den Schwerpunkten einer Component-Liste.
#[derive(Clone)]
pub struct CentroidIndex {
    tree: Option<Arc<ImmutableKdTree<f64, 3>>>,
    ids: Vec<u32>,
    positions: HashMap<u32, Point>,
}

impl std::fmt::Debug for CentroidIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentroidIndex")
            .field("len", &self.ids.len())
            .finish()
    }
}

impl CentroidIndex {
    /// Erstellt einen leeren Index.
    pub fn empty() -> Self {
        Self {
            tree: None,
            ids: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Baut den Index aus den Schwerpunkten aller Zellen.
    pub fn from_cells(cells: &CelpList) -> Self {
        Self::from_points(cells.iter().map(|c| (c.id(), c.center())))
    }

    /// Baut den Index aus `(id, position)`-Paaren.
    pub fn from_points(points: impl IntoIterator<Item = (u32, Point)>) -> Self {
        let mut points: Vec<(u32, Point)> = points.into_iter().collect();
        points.sort_unstable_by_key(|(id, _)| *id);
        if points.is_empty() {
            return Self::empty();
        }

        let entries: Vec<[f64; 3]> = points.iter().map(|(_, p)| p.to_array()).collect();
        let tree = ImmutableKdTree::new_from_slice(&entries);

        Self {
            tree: Some(Arc::new(tree)),
            ids: points.iter().map(|(id, _)| *id).collect(),
            positions: points.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn position(&self, id: u32) -> Option<Point> {
        self.positions.get(&id).copied()
    }

    /// Findet den nächsten Schwerpunkt zur Position.
    pub fn nearest(&self, query: Point) -> Option<CentroidMatch> {
        let tree = self.tree.as_ref()?;
        let result = tree
            .nearest_one::<SquaredEuclidean>(&query.to_array());
        let id = *self.ids.get(result.item as usize)?;

        Some(CentroidMatch {
            id,
            distance: result.distance.sqrt(),
        })
    }

    /// Findet alle Schwerpunkte im Radius, nach Distanz sortiert
    /// (bei gleicher Distanz nach ID).
    pub fn within_radius(&self, query: Point, radius: f64) -> Vec<CentroidMatch> {
        let Some(tree) = self.tree.as_ref() else {
            return Vec::new();
        };
        if radius.is_sign_negative() {
            return Vec::new();
        }

        let mut results = tree
            .within::<SquaredEuclidean>(&query.to_array(), radius * radius)
            .into_iter()
            .filter_map(|entry| {
                let id = *self.ids.get(entry.item as usize)?;
                Some(CentroidMatch {
                    id,
                    distance: entry.distance.sqrt(),
                })
            })
            .collect::<Vec<_>>();

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        results
    }

    /// Findet alle Schwerpunkte innerhalb einer Box.
    ///
    /// KD-Tree-Abfrage mit der umschließenden Kugel, danach exakte Prüfung.
    pub fn within_box(&self, bbox: &BBox) -> Vec<u32> {
        let Some(tree) = self.tree.as_ref() else {
            return Vec::new();
        };
        if !bbox.is_valid() {
            return Vec::new();
        }

        let half = (bbox.max - bbox.min) * 0.5;
        let radius_sq = half.length_squared();

        let mut ids: Vec<u32> = tree
            .within::<SquaredEuclidean>(&bbox.center().to_array(), radius_sq)
            .into_iter()
            .filter_map(|entry| {
                let id = *self.ids.get(entry.item as usize)?;
                let pos = self.positions.get(&id)?;
                bbox.contains(*pos).then_some(id)
            })
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Bevorzugt beim Abgleich ähnlich große Components.
///
/// `size_weight = 0` ergibt reinen Schwerpunktabstand. Sonst wird die
/// Distanz um `size_weight * |ln(a / b)|` erhöht.
pub fn match_cost(distance: f64, size_a: u32, size_b: u32, size_weight: f64) -> f64 {
    if size_weight <= 0.0 || size_a == 0 || size_b == 0 {
        return distance;
    }
    distance + size_weight * (size_a as f64 / size_b as f64).ln().abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::cell::Cell;
    use glam::DVec3;
    use approx::assert_relative_eq;

    fn sample_cells() -> CelpList {
        [
            Cell::with_size(1, 5, DVec3::new(0.0, 0.0, 0.0)),
            Cell::with_size(2, 5, DVec3::new(10.0, 0.0, 0.0)),
            Cell::with_size(3, 5, DVec3::new(4.0, 3.0, 0.0)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn nearest_returns_expected_cell() {
        let index = CentroidIndex::from_cells(&sample_cells());
        let nearest = index
            .nearest(DVec3::new(3.9, 2.9, 0.0))
            .expect("Treffer erwartet");

        assert_eq!(nearest.id, 3);
        assert!(nearest.distance < 0.2);
    }

    #[test]
    fn radius_query_returns_sorted_matches() {
        let index = CentroidIndex::from_cells(&sample_cells());
        let ids: Vec<u32> = index
            .within_radius(DVec3::ZERO, 6.0)
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn box_query_returns_cells_inside() {
        let index = CentroidIndex::from_cells(&sample_cells());
        let bbox = BBox::new(DVec3::new(-1.0, -1.0, -1.0), DVec3::new(5.0, 3.5, 1.0));
        assert_eq!(index.within_box(&bbox), vec![1, 3]);
    }

    #[test]
    fn empty_index_has_no_entries() {
        let index = CentroidIndex::empty();
        assert!(index.is_empty());
        assert!(index.nearest(DVec3::ZERO).is_none());
        assert!(index.within_radius(DVec3::ZERO, 100.0).is_empty());
    }

    #[test]
    fn size_weight_penalizes_mismatch() {
        assert_relative_eq!(match_cost(2.0, 10, 40, 0.0), 2.0);
        let cost = match_cost(2.0, 10, 40, 1.0);
        assert_relative_eq!(cost, 2.0 + 4.0f64.ln());
        assert_relative_eq!(match_cost(2.0, 40, 10, 1.0), cost);
    }

    #[test]
    fn flat_slice_with_many_centroids() {
        // 2D-Daten: alle Schwerpunkte auf z = 0
        let list: CelpList = (1..=200u32)
            .map(|id| Cell::with_size(id, 1, DVec3::new((id % 20) as f64, (id / 20) as f64, 0.0)))
            .collect();
        let index = CentroidIndex::from_cells(&list);
        assert_eq!(index.len(), 200);
        let hit = index.nearest(DVec3::new(5.1, 3.0, 0.0)).expect("Treffer erwartet");
        assert_eq!(hit.id, 65);
    }
}
