//! Auswertung eines Label-Volumens zu einer Component-Liste.

use super::cell::{Cell, CelpList};
use super::volume::LabelVolume;

/// Status-Text, wenn kein Label vorhanden ist.
pub const NO_DATA: &str = "no data";

/// Parameter der Analyse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompAnalyzer {
    /// Kleinere Components werden nicht gelistet
    pub min_size: u32,
    /// Größere Components werden nicht gelistet
    pub max_size: Option<u32>,
    /// Nur maskierte Voxel zählen (falls eine Maske existiert)
    pub use_mask: bool,
}

impl CompAnalyzer {
    /// Baut die Component-Liste aus dem Label-Kanal.
    ///
    /// Ohne Label ist das Ergebnis leer.
    pub fn analyze(&self, vol: &LabelVolume) -> CelpList {
        let Some(labels) = vol.labels() else {
            log::debug!("Analyse ohne Label-Daten");
            return CelpList::new();
        };
        let restrict = self.use_mask && vol.has_mask();

        let mut list = CelpList::new();
        for (i, &id) in labels.iter().enumerate() {
            if id == 0 || (restrict && !vol.masked(i)) {
                continue;
            }
            let pos = vol.position(i);
            let intensity = vol.intensity(i) as f64;
            let surface = vol.on_border(i) || vol.neighbors(i).any(|n| labels[n] != id);
            match list.get_mut(id) {
                Some(cell) => {
                    cell.inc(pos, intensity);
                    if surface {
                        cell.inc_ext();
                    }
                }
                None => {
                    let mut cell = Cell::new(id);
                    cell.inc(pos, intensity);
                    if surface {
                        cell.inc_ext();
                    }
                    list.insert(cell);
                }
            }
        }

        let removed = list.retain(|c| {
            c.size() >= self.min_size && self.max_size.is_none_or(|max| c.size() <= max)
        });
        if !removed.is_empty() {
            log::debug!("{} Components außerhalb der Größengrenzen", removed.len());
        }
        list
    }

    /// Kurze Zusammenfassung für die Statusanzeige.
    pub fn summary(list: &CelpList) -> String {
        if list.is_empty() {
            return NO_DATA.to_string();
        }
        format!(
            "{} components, {} voxels",
            list.len(),
            list.total_size()
        )
    }
}
