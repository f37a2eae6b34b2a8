//! Zerlegung von Components bzw. Voxeln in Cluster.
//!
//! Verfahren: K-Means (Lloyd, Startpunkte per Farthest-First ab dem
//! hellsten Punkt), DBSCAN (Radius `eps`, Mindestgewicht `size`) und EM
//! (Gauß-Mischung mit diagonaler Kovarianz). Die Eingaben werden nie
//! verändert.

use std::collections::{HashMap, VecDeque};

use glam::DVec3;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::cell::{Cell, CelpList};
use super::volume::LabelVolume;
use crate::core::Point;

/// Untergrenze der Varianz je Achse beim EM.
const MIN_VARIANCE: f64 = 1e-4;
/// Relative Änderung der Log-Likelihood, ab der EM als konvergiert gilt.
const EM_CONVERGENCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusterMethod {
    #[default]
    ExMax,
    Dbscan,
    KMeans,
}

/// Parameter der Cluster-Verfahren.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    pub method: ClusterMethod,
    /// Anzahl Cluster (K-Means, EM)
    pub num: usize,
    pub max_iter: usize,
    /// Mindestwahrscheinlichkeit der Zugehörigkeit (EM)
    pub tol: f64,
    /// Mindestgröße eines Clusters in Voxeln
    pub size: u32,
    /// Nachbarschaftsradius (DBSCAN)
    pub eps: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            method: ClusterMethod::ExMax,
            num: 2,
            max_iter: 200,
            tol: 0.9,
            size: 60,
            eps: 2.5,
        }
    }
}

/// Ergebnis: Cluster als Zellen (IDs ab 1) und Zuordnung Eingabe -> Cluster.
///
/// Bei `compute` ist der Schlüssel die Component-ID, bei `compute_voxels`
/// der Voxel-Index. Nicht zugeordnete Eingaben fehlen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterResult {
    pub clusters: CelpList,
    pub membership: IndexMap<u32, u32>,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    key: u32,
    pos: Point,
    weight: f64,
    intensity: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Clusterizer {
    params: ClusterParams,
}

impl Clusterizer {
    pub fn new(params: ClusterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    pub fn set_params(&mut self, params: ClusterParams) {
        self.params = params;
    }

    /// Clustert die Components einer Liste (Schwerpunkte, gewichtet mit
    /// ihrer Voxelanzahl). Jeder Cluster ist die Vereinigung seiner Zellen.
    pub fn compute(&self, input: &CelpList) -> ClusterResult {
        let samples: Vec<Sample> = input
            .iter()
            .map(|c| Sample {
                key: c.id(),
                pos: c.center(),
                weight: c.size() as f64,
                intensity: c.mean(),
            })
            .collect();
        let assignment = self.assign(&samples);
        self.build_clusters(&samples, &assignment, |sample, cell| {
            if let Some(src) = input.get(sample.key) {
                cell.merge(src);
            }
        })
    }

    /// Clustert die Voxel eines Components.
    pub fn compute_voxels(&self, vol: &LabelVolume, id: u32) -> ClusterResult {
        let samples: Vec<Sample> = vol
            .labels()
            .map(|labels| {
                labels
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| **l == id && id != 0)
                    .map(|(i, _)| Sample {
                        key: i as u32,
                        pos: vol.position(i),
                        weight: 1.0,
                        intensity: vol.intensity(i) as f64,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let assignment = self.assign(&samples);
        self.build_clusters(&samples, &assignment, |sample, cell| {
            cell.inc(sample.pos, sample.intensity);
        })
    }

    fn assign(&self, samples: &[Sample]) -> Vec<Option<usize>> {
        if samples.is_empty() {
            return Vec::new();
        }
        match self.params.method {
            ClusterMethod::KMeans => kmeans(samples, self.params.num, self.params.max_iter)
                .into_iter()
                .map(Some)
                .collect(),
            ClusterMethod::Dbscan => dbscan(samples, self.params.eps, self.params.size as f64),
            ClusterMethod::ExMax => {
                exmax(samples, self.params.num, self.params.max_iter, self.params.tol)
            }
        }
    }

    /// Baut die Cluster-Zellen; zu kleine Cluster entfallen, die übrigen
    /// werden in Reihenfolge ihres Index ab 1 nummeriert.
    fn build_clusters(
        &self,
        samples: &[Sample],
        assignment: &[Option<usize>],
        mut add: impl FnMut(&Sample, &mut Cell),
    ) -> ClusterResult {
        let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
        for (i, a) in assignment.iter().enumerate() {
            let Some(k) = a else { continue };
            match groups.iter_mut().find(|(g, _)| g == k) {
                Some((_, members)) => members.push(i),
                None => groups.push((*k, vec![i])),
            }
        }
        groups.sort_by_key(|(k, _)| *k);

        let mut result = ClusterResult::default();
        let mut next = 1u32;
        for (_, members) in groups {
            let weight: f64 = members.iter().map(|&i| samples[i].weight).sum();
            if weight < self.params.size as f64 {
                continue;
            }
            let mut cell = Cell::new(next);
            for &i in &members {
                add(&samples[i], &mut cell);
                result.membership.insert(samples[i].key, next);
            }
            result.clusters.insert(cell);
            next += 1;
        }
        log::debug!(
            "{:?}: {} Cluster aus {} Eingaben",
            self.params.method,
            result.clusters.len(),
            samples.len()
        );
        result
    }
}

// ── K-Means ─────────────────────────────────────────────────────────

fn nearest_center(pos: Point, centers: &[Point]) -> usize {
    let mut best = 0;
    let mut best_d = f64::MAX;
    for (k, c) in centers.iter().enumerate() {
        let d = pos.distance_squared(*c);
        if d < best_d {
            best = k;
            best_d = d;
        }
    }
    best
}

fn seed_centers(samples: &[Sample], k: usize) -> Vec<Point> {
    let mut brightest = 0;
    for (i, s) in samples.iter().enumerate() {
        if s.intensity > samples[brightest].intensity {
            brightest = i;
        }
    }
    let mut centers = vec![samples[brightest].pos];
    while centers.len() < k {
        let mut far = 0;
        let mut far_d = -1.0;
        for (i, s) in samples.iter().enumerate() {
            let d = centers
                .iter()
                .map(|c| s.pos.distance_squared(*c))
                .fold(f64::MAX, f64::min);
            if d > far_d {
                far = i;
                far_d = d;
            }
        }
        centers.push(samples[far].pos);
    }
    centers
}

fn kmeans(samples: &[Sample], num: usize, max_iter: usize) -> Vec<usize> {
    let k = num.clamp(1, samples.len());
    let mut centers = seed_centers(samples, k);
    let mut assignment: Vec<usize> = samples.iter().map(|s| nearest_center(s.pos, &centers)).collect();

    for _ in 0..max_iter {
        let mut sums = vec![DVec3::ZERO; k];
        let mut weights = vec![0.0; k];
        for (s, &a) in samples.iter().zip(&assignment) {
            sums[a] += s.pos * s.weight;
            weights[a] += s.weight;
        }
        for (c, (sum, w)) in centers.iter_mut().zip(sums.into_iter().zip(weights)) {
            if w > 0.0 {
                *c = sum / w;
            }
        }

        let next: Vec<usize> = samples.iter().map(|s| nearest_center(s.pos, &centers)).collect();
        if next == assignment {
            break;
        }
        assignment = next;
    }
    assignment
}

// ── DBSCAN ──────────────────────────────────────────────────────────

/// Gitter mit Kantenlänge `eps` für Nachbarschaftsabfragen.
struct Grid {
    size: f64,
    buckets: HashMap<(i64, i64, i64), Vec<usize>>,
}

impl Grid {
    fn new(samples: &[Sample], size: f64) -> Self {
        let mut grid = Self {
            size,
            buckets: HashMap::new(),
        };
        for (i, s) in samples.iter().enumerate() {
            grid.buckets.entry(grid.key(s.pos)).or_default().push(i);
        }
        grid
    }

    fn key(&self, p: Point) -> (i64, i64, i64) {
        let q = (p / self.size).floor();
        (q.x as i64, q.y as i64, q.z as i64)
    }

    fn neighbors(&self, samples: &[Sample], i: usize, eps: f64) -> Vec<usize> {
        let (x, y, z) = self.key(samples[i].pos);
        let eps_sq = eps * eps;
        let mut out = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(bucket) = self.buckets.get(&(x + dx, y + dy, z + dz)) else {
                        continue;
                    };
                    out.extend(bucket.iter().copied().filter(|&j| {
                        samples[j].pos.distance_squared(samples[i].pos) <= eps_sq
                    }));
                }
            }
        }
        out.sort_unstable();
        out
    }
}

fn dbscan(samples: &[Sample], eps: f64, min_weight: f64) -> Vec<Option<usize>> {
    let eps = eps.max(f64::EPSILON);
    let grid = Grid::new(samples, eps);
    let weight = |ids: &[usize]| ids.iter().map(|&j| samples[j].weight).sum::<f64>();

    let n = samples.len();
    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut cluster = 0;

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let seeds = grid.neighbors(samples, i, eps);
        if weight(&seeds) < min_weight {
            continue;
        }
        labels[i] = Some(cluster);
        let mut queue: VecDeque<usize> = seeds.into_iter().collect();
        while let Some(j) = queue.pop_front() {
            if labels[j].is_none() {
                labels[j] = Some(cluster);
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;
            let more = grid.neighbors(samples, j, eps);
            if weight(&more) >= min_weight {
                queue.extend(more);
            }
        }
        cluster += 1;
    }
    labels
}

// ── EM ──────────────────────────────────────────────────────────────

struct Gaussian {
    weight: f64,
    mean: DVec3,
    var: DVec3,
}

impl Gaussian {
    fn log_density(&self, p: Point) -> f64 {
        let d = p - self.mean;
        let q = d * d / self.var;
        let log_det = self.var.x.ln() + self.var.y.ln() + self.var.z.ln();
        -0.5 * (3.0 * (2.0 * std::f64::consts::PI).ln() + log_det + q.x + q.y + q.z)
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Neuschätzung einer Komponente aus gewichteten Verantwortlichkeiten.
fn estimate(samples: &[Sample], resp: &[f64], total_weight: f64) -> Option<Gaussian> {
    let mut nk = 0.0;
    let mut sum = DVec3::ZERO;
    for (s, r) in samples.iter().zip(resp) {
        nk += r * s.weight;
        sum += s.pos * (r * s.weight);
    }
    if nk <= f64::EPSILON {
        return None;
    }
    let mean = sum / nk;
    let mut var = DVec3::ZERO;
    for (s, r) in samples.iter().zip(resp) {
        let d = s.pos - mean;
        var += d * d * (r * s.weight);
    }
    Some(Gaussian {
        weight: nk / total_weight,
        mean,
        var: (var / nk).max(DVec3::splat(MIN_VARIANCE)),
    })
}

fn exmax(samples: &[Sample], num: usize, max_iter: usize, tol: f64) -> Vec<Option<usize>> {
    let k = num.clamp(1, samples.len());
    let total_weight: f64 = samples.iter().map(|s| s.weight).sum();
    let n = samples.len();

    // Start aus K-Means
    let init = kmeans(samples, k, max_iter);
    let mut resp = vec![vec![0.0; n]; k];
    for (i, &a) in init.iter().enumerate() {
        resp[a][i] = 1.0;
    }

    let mut prev_ll = f64::MIN;
    let mut components: Vec<Gaussian> = Vec::new();
    for iter in 0..max_iter.max(1) {
        // M-Schritt
        components = resp
            .iter()
            .filter_map(|r| estimate(samples, r, total_weight))
            .collect();
        if components.is_empty() {
            return vec![None; n];
        }

        // E-Schritt
        let mut ll = 0.0;
        resp = vec![vec![0.0; n]; components.len()];
        for (i, s) in samples.iter().enumerate() {
            let logs: Vec<f64> = components
                .iter()
                .map(|g| g.weight.ln() + g.log_density(s.pos))
                .collect();
            let norm = log_sum_exp(&logs);
            ll += s.weight * norm;
            for (c, l) in logs.iter().enumerate() {
                resp[c][i] = (l - norm).exp();
            }
        }

        if (ll - prev_ll).abs() <= EM_CONVERGENCE * ll.abs().max(1.0) {
            log::trace!("EM nach {} Iterationen konvergiert", iter + 1);
            break;
        }
        prev_ll = ll;
    }

    (0..n)
        .map(|i| {
            let (best, p) = (0..components.len())
                .map(|c| (c, resp[c][i]))
                .fold((0, f64::MIN), |a, b| if b.1 > a.1 { b } else { a });
            (p >= tol).then_some(best)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Zwei Gruppen von Zellen um x = 0 und x = 20.
    fn two_groups() -> CelpList {
        let mut cells = Vec::new();
        for (i, x) in [0.0, 1.0, 0.5, 20.0, 21.0, 20.5].into_iter().enumerate() {
            let mut cell = Cell::new(i as u32 + 1);
            let intensity = if i == 4 { 0.9 } else { 0.5 };
            for j in 0..10 {
                cell.inc(DVec3::new(x, j as f64 * 0.1, 0.0), intensity);
            }
            cells.push(cell);
        }
        cells.into_iter().collect()
    }

    fn params(method: ClusterMethod) -> ClusterParams {
        ClusterParams {
            method,
            size: 10,
            ..ClusterParams::default()
        }
    }

    fn groups_of(result: &ClusterResult) -> Vec<Vec<u32>> {
        let mut groups: Vec<Vec<u32>> = result
            .clusters
            .ids()
            .map(|c| {
                result
                    .membership
                    .iter()
                    .filter(|(_, k)| **k == c)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .collect();
        for g in &mut groups {
            g.sort_unstable();
        }
        groups.sort();
        groups
    }

    #[test]
    fn defaults_match_documented_values() {
        let p = ClusterParams::default();
        assert_eq!(p.num, 2);
        assert_eq!(p.max_iter, 200);
        assert_relative_eq!(p.tol, 0.9);
        assert_eq!(p.size, 60);
        assert_relative_eq!(p.eps, 2.5);
    }

    #[test]
    fn kmeans_separates_groups() {
        let input = two_groups();
        let result = Clusterizer::new(params(ClusterMethod::KMeans)).compute(&input);
        assert_eq!(groups_of(&result), vec![vec![1, 2, 3], vec![4, 5, 6]]);
        // Startpunkt ist die hellste Zelle: sie landet in Cluster 1
        assert_eq!(result.membership.get(&5), Some(&1));
        assert_eq!(result.clusters.total_size(), 60);
    }

    #[test]
    fn dbscan_separates_groups() {
        let input = two_groups();
        let result = Clusterizer::new(params(ClusterMethod::Dbscan)).compute(&input);
        assert_eq!(groups_of(&result), vec![vec![1, 2, 3], vec![4, 5, 6]]);
    }

    #[test]
    fn dbscan_marks_sparse_points_as_noise() {
        let mut input = two_groups();
        input.insert(Cell::with_size(9, 1, DVec3::new(100.0, 0.0, 0.0)));
        let result = Clusterizer::new(params(ClusterMethod::Dbscan)).compute(&input);
        assert!(!result.membership.contains_key(&9));
        assert_eq!(result.clusters.len(), 2);
    }

    #[test]
    fn exmax_separates_groups() {
        let input = two_groups();
        let result = Clusterizer::new(params(ClusterMethod::ExMax)).compute(&input);
        assert_eq!(groups_of(&result), vec![vec![1, 2, 3], vec![4, 5, 6]]);
    }

    #[test]
    fn small_clusters_are_dropped() {
        let input = two_groups();
        let mut p = params(ClusterMethod::KMeans);
        p.size = 40;
        let result = Clusterizer::new(p).compute(&input);
        assert!(result.clusters.is_empty());
        assert!(result.membership.is_empty());
    }

    #[test]
    fn input_list_is_not_modified() {
        let input = two_groups();
        let before = input.clone();
        let clusterizer = Clusterizer::new(params(ClusterMethod::KMeans));
        let first = clusterizer.compute(&input);
        let second = clusterizer.compute(&input);
        assert_eq!(input, before);
        assert_eq!(first, second);
    }

    #[test]
    fn voxels_of_one_component_are_split() {
        let mut vol = LabelVolume::new(20, 1, 1);
        let mut labels = vec![0u32; 20];
        for i in (0..5).chain(15..20) {
            labels[i] = 3;
            vol.set_intensity(i, 0.5);
        }
        vol.set_labels(Some(labels));
        let p = ClusterParams {
            method: ClusterMethod::KMeans,
            size: 1,
            ..ClusterParams::default()
        };
        let result = Clusterizer::new(p).compute_voxels(&vol, 3);
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.clusters.get(1).map(Cell::size), Some(5));
        assert_eq!(result.clusters.get(2).map(Cell::size), Some(5));
        assert!(Clusterizer::default().compute_voxels(&vol, 0).clusters.is_empty());
    }
}
