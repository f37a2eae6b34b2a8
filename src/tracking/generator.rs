//! Erzeugt Labels aus Intensitäten (6-Nachbarschaft, Union-Find).

use super::volume::LabelVolume;

/// Parameter der Component-Erzeugung.
#[derive(Debug, Clone, PartialEq)]
pub struct CompGenerator {
    /// Voxel mit Intensität über diesem Wert gehören zum Vordergrund
    pub threshold: f32,
    /// Nur maskierte Voxel verwenden (falls eine Maske existiert)
    pub use_mask: bool,
    /// Components mit weniger Voxeln werden verworfen
    pub min_size: u32,
}

impl Default for CompGenerator {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            use_mask: false,
            min_size: 0,
        }
    }
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

impl CompGenerator {
    fn is_foreground(&self, vol: &LabelVolume, index: usize) -> bool {
        if vol.intensity(index) <= self.threshold {
            return false;
        }
        !(self.use_mask && vol.has_mask()) || vol.masked(index)
    }

    /// Ersetzt den Label-Kanal durch zusammenhängende Components.
    ///
    /// IDs werden ab 1 in Scan-Reihenfolge vergeben. Liefert die Anzahl
    /// der erzeugten Components.
    pub fn label_connected(&self, vol: &mut LabelVolume) -> usize {
        let n = vol.len();
        let foreground: Vec<bool> = (0..n).map(|i| self.is_foreground(vol, i)).collect();
        let (nx, ny, _) = vol.dims();

        let mut sets = DisjointSet::new(n);
        for i in (0..n).filter(|&i| foreground[i]) {
            let (x, y, z) = vol.coords(i);
            // Nur rückwärts gerichtete Nachbarn; die übrigen folgen beim Scan.
            if x > 0 && foreground[i - 1] {
                sets.union(i, i - 1);
            }
            if y > 0 && foreground[i - nx] {
                sets.union(i, i - nx);
            }
            if z > 0 && foreground[i - nx * ny] {
                sets.union(i, i - nx * ny);
            }
        }

        let mut sizes = vec![0u32; n];
        for i in (0..n).filter(|&i| foreground[i]) {
            let root = sets.find(i);
            sizes[root] += 1;
        }

        let mut ids = vec![0u32; n];
        let mut next = 0u32;
        let mut labels = vec![0u32; n];
        for i in (0..n).filter(|&i| foreground[i]) {
            let root = sets.find(i);
            if sizes[root] < self.min_size {
                continue;
            }
            if ids[root] == 0 {
                next += 1;
                ids[root] = next;
            }
            labels[i] = ids[root];
        }

        vol.set_labels(Some(labels));
        log::debug!("{} Components erzeugt (Schwelle {})", next, self.threshold);
        next as usize
    }
}
