//! Volumen eines Zeitpunkts: Intensität, optionale Maske und Label.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::core::Point;

/// Voxel-Volumen mit Intensität in `[0, 1]`, optionaler Auswahlmaske
/// und optionalem Label-Kanal (`0` = kein Component).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelVolume {
    nx: usize,
    ny: usize,
    nz: usize,
    pub spacing: DVec3,
    data: Vec<f32>,
    mask: Option<Vec<u8>>,
    label: Option<Vec<u32>>,
}

impl LabelVolume {
    /// Leeres Volumen (Intensität 0, ohne Maske und Label).
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            nx,
            ny,
            nz,
            spacing: DVec3::ONE,
            data: vec![0.0; nx * ny * nz],
            mask: None,
            label: None,
        }
    }

    /// Volumen aus vorhandenen Intensitäten. `None` bei falscher Länge.
    pub fn from_data(nx: usize, ny: usize, nz: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != nx * ny * nz {
            log::debug!(
                "Volumen-Daten mit falscher Länge: {} statt {}",
                data.len(),
                nx * ny * nz
            );
            return None;
        }
        Some(Self {
            nx,
            ny,
            nz,
            spacing: DVec3::ONE,
            data,
            mask: None,
            label: None,
        })
    }

    /// Setzt ein Volumen aus allen Kanälen zusammen (z.B. beim Laden).
    pub fn from_parts(
        dims: (usize, usize, usize),
        spacing: DVec3,
        data: Vec<f32>,
        mask: Option<Vec<u8>>,
        label: Option<Vec<u32>>,
    ) -> Option<Self> {
        let mut vol = Self::from_data(dims.0, dims.1, dims.2, data)?;
        vol.spacing = spacing;
        (vol.set_mask(mask) && vol.set_labels(label)).then_some(vol)
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Linearer Index, `None` außerhalb.
    pub fn index(&self, x: usize, y: usize, z: usize) -> Option<usize> {
        (x < self.nx && y < self.ny && z < self.nz).then(|| (z * self.ny + y) * self.nx + x)
    }

    pub fn coords(&self, index: usize) -> (usize, usize, usize) {
        let x = index % self.nx;
        let y = (index / self.nx) % self.ny;
        let z = index / (self.nx * self.ny);
        (x, y, z)
    }

    /// Weltposition des Voxelzentrums.
    pub fn position(&self, index: usize) -> Point {
        let (x, y, z) = self.coords(index);
        DVec3::new(x as f64, y as f64, z as f64) * self.spacing
    }

    /// Indizes der 6 direkten Nachbarn.
    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let (x, y, z) = self.coords(index);
        let (x, y, z) = (x as isize, y as isize, z as isize);
        [
            (-1, 0, 0),
            (1, 0, 0),
            (0, -1, 0),
            (0, 1, 0),
            (0, 0, -1),
            (0, 0, 1),
        ]
        .into_iter()
        .filter_map(move |(dx, dy, dz)| {
            let (nx, ny, nz) = (x + dx, y + dy, z + dz);
            if nx < 0 || ny < 0 || nz < 0 {
                return None;
            }
            self.index(nx as usize, ny as usize, nz as usize)
        })
    }

    /// Liegt der Voxel am Volumenrand?
    pub fn on_border(&self, index: usize) -> bool {
        let (x, y, z) = self.coords(index);
        x == 0 || y == 0 || z == 0 || x + 1 == self.nx || y + 1 == self.ny || z + 1 == self.nz
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn intensity(&self, index: usize) -> f32 {
        self.data.get(index).copied().unwrap_or(0.0)
    }

    pub fn set_intensity(&mut self, index: usize, value: f32) -> bool {
        match self.data.get_mut(index) {
            Some(v) => {
                *v = value;
                true
            }
            None => false,
        }
    }

    // ── Maske ───────────────────────────────────────────────────────

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    pub fn mask(&self) -> Option<&[u8]> {
        self.mask.as_deref()
    }

    /// Legt eine leere Maske an, falls keine existiert.
    pub fn ensure_mask(&mut self) -> &mut [u8] {
        let len = self.data.len();
        self.mask.get_or_insert_with(|| vec![0; len])
    }

    pub fn set_mask(&mut self, mask: Option<Vec<u8>>) -> bool {
        if mask.as_ref().is_some_and(|m| m.len() != self.data.len()) {
            log::debug!("Maske mit falscher Länge verworfen");
            return false;
        }
        self.mask = mask;
        true
    }

    /// Voxel ausgewählt? Ohne Maske ist nichts ausgewählt.
    pub fn masked(&self, index: usize) -> bool {
        self.mask
            .as_ref()
            .and_then(|m| m.get(index))
            .is_some_and(|&m| m > 0)
    }

    // ── Label ───────────────────────────────────────────────────────

    pub fn has_label(&self) -> bool {
        self.label.is_some()
    }

    pub fn labels(&self) -> Option<&[u32]> {
        self.label.as_deref()
    }

    pub fn labels_mut(&mut self) -> Option<&mut [u32]> {
        self.label.as_deref_mut()
    }

    /// Legt einen leeren Label-Kanal an, falls keiner existiert.
    pub fn ensure_label(&mut self) -> &mut [u32] {
        let len = self.data.len();
        self.label.get_or_insert_with(|| vec![0; len])
    }

    pub fn set_labels(&mut self, label: Option<Vec<u32>>) -> bool {
        if label.as_ref().is_some_and(|l| l.len() != self.data.len()) {
            log::debug!("Label mit falscher Länge verworfen");
            return false;
        }
        self.label = label;
        true
    }

    pub fn label(&self, index: usize) -> u32 {
        self.label
            .as_ref()
            .and_then(|l| l.get(index))
            .copied()
            .unwrap_or(0)
    }

    /// Größte vorkommende Label-ID.
    pub fn max_label(&self) -> u32 {
        self.label
            .as_ref()
            .and_then(|l| l.iter().copied().max())
            .unwrap_or(0)
    }

    /// Ersetzt Label-IDs gemäß Zuordnung; liefert die Anzahl geänderter Voxel.
    pub fn remap_labels(&mut self, map: impl Fn(u32) -> u32) -> usize {
        let Some(labels) = self.label.as_mut() else {
            return 0;
        };
        let mut changed = 0;
        for l in labels.iter_mut().filter(|l| **l != 0) {
            let new = map(*l);
            if new != *l {
                *l = new;
                changed += 1;
            }
        }
        changed
    }
}
