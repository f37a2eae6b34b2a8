//! Geometrische Hilfstypen für Werte und Komponenten-Analyse.
//!
//! Punkte, Vektoren und Quaternionen sind direkt `glam`-Typen in doppelter
//! Genauigkeit. `Transform`, `BBox`, `Ray`, `Plane`, `Color` und `HsvColor`
//! sind eigene Typen mit serde-Unterstützung.

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Punkt im Welt- oder Voxelraum.
pub type Point = DVec3;
/// Richtungsvektor.
pub type Vector = DVec3;
/// Rotation als Einheitsquaternion.
pub type Quaternion = DQuat;

/// Toleranz mit `digits` Nachkommastellen (`epsilon(6)` = 1e-6).
pub fn epsilon(digits: i32) -> f64 {
    10f64.powi(-digits)
}

/// Standard-Toleranz für `f32`-Werte.
pub const EPS_F32: f64 = 1e-6;
/// Standard-Toleranz für `f64`-Werte.
pub const EPS_F64: f64 = 1e-10;

/// Vergleicht zwei Vektoren komponentenweise mit Toleranz.
pub fn vec_close(a: DVec3, b: DVec3, eps: f64) -> bool {
    (a - b).abs().max_element() <= eps
}

// ── Transform ───────────────────────────────────────────────────────

/// Affine 4x4-Transformation (spaltenweise, wie `glam`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    mat: DMat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            mat: DMat4::IDENTITY,
        }
    }

    pub fn from_mat(mat: DMat4) -> Self {
        Self { mat }
    }

    pub fn from_translation(t: Vector) -> Self {
        Self {
            mat: DMat4::from_translation(t),
        }
    }

    pub fn from_rotation(q: Quaternion) -> Self {
        Self {
            mat: DMat4::from_quat(q),
        }
    }

    pub fn from_scale(s: Vector) -> Self {
        Self {
            mat: DMat4::from_scale(s),
        }
    }

    pub fn matrix(&self) -> &DMat4 {
        &self.mat
    }

    /// Spaltenweise 16 Werte.
    pub fn to_cols_array(&self) -> [f64; 16] {
        self.mat.to_cols_array()
    }

    pub fn from_cols_array(cols: &[f64; 16]) -> Self {
        Self {
            mat: DMat4::from_cols_array(cols),
        }
    }

    /// `self` nach `other` anwenden (`other * self`).
    pub fn then(&self, other: &Transform) -> Transform {
        Transform {
            mat: other.mat * self.mat,
        }
    }

    /// Inverse; `None` bei singulärer Matrix.
    pub fn inverse(&self) -> Option<Transform> {
        if self.mat.determinant().abs() < EPS_F64 {
            return None;
        }
        Some(Transform {
            mat: self.mat.inverse(),
        })
    }

    pub fn transform_point(&self, p: Point) -> Point {
        self.mat.transform_point3(p)
    }

    pub fn transform_vector(&self, v: Vector) -> Vector {
        self.mat.transform_vector3(v)
    }

    pub fn abs_diff_eq(&self, other: &Transform, eps: f64) -> bool {
        self.mat.abs_diff_eq(other.mat, eps)
    }
}

// ── BBox ────────────────────────────────────────────────────────────

/// Achsenparallele Bounding-Box. Eine leere Box ist ungültig (`min > max`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl Default for BBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BBox {
    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::MAX),
            max: DVec3::splat(f64::MIN),
        }
    }

    pub fn new(a: Point, b: Point) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    pub fn extend(&mut self, p: Point) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn extend_box(&mut self, other: &BBox) {
        if other.is_valid() {
            self.extend(other.min);
            self.extend(other.max);
        }
    }

    pub fn center(&self) -> Point {
        (self.min + self.max) * 0.5
    }

    pub fn diagonal(&self) -> Vector {
        if self.is_valid() {
            self.max - self.min
        } else {
            DVec3::ZERO
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        self.is_valid() && p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.min.cmple(other.max).all()
            && other.min.cmple(self.max).all()
    }
}

// ── Ray / Plane ─────────────────────────────────────────────────────

/// Strahl mit Ursprung und Richtung (nicht notwendigerweise normiert).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Point,
    pub direction: Vector,
}

impl Ray {
    pub fn new(origin: Point, direction: Vector) -> Self {
        Self { origin, direction }
    }

    pub fn point_at(&self, t: f64) -> Point {
        self.origin + self.direction * t
    }

    /// Abstand eines Punktes zur Geraden des Strahls.
    pub fn distance_to(&self, p: Point) -> f64 {
        let len_sq = self.direction.length_squared();
        if len_sq < EPS_F64 {
            return p.distance(self.origin);
        }
        let t = (p - self.origin).dot(self.direction) / len_sq;
        p.distance(self.point_at(t))
    }

    /// Schnittparameter mit einer Ebene; `None` bei paralleler Lage.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<f64> {
        let denom = plane.normal.dot(self.direction);
        if denom.abs() < EPS_F64 {
            return None;
        }
        Some(-(plane.normal.dot(self.origin) + plane.d) / denom)
    }
}

/// Ebene `normal · p + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vector,
    pub d: f64,
}

impl Plane {
    pub fn from_point_normal(p: Point, normal: Vector) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            d: -normal.dot(p),
        }
    }

    pub fn distance(&self, p: Point) -> f64 {
        self.normal.dot(p) + self.d
    }
}

// ── Farben ──────────────────────────────────────────────────────────

/// RGB-Farbe mit Kanälen in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

/// HSV-Farbe: Farbton in Grad `[0, 360)`, Sättigung und Helligkeit in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HsvColor {
    pub h: f64,
    pub s: f64,
    pub v: f64,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0);

    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Deterministische Pseudofarbe für eine Komponenten-ID.
    ///
    /// `shuffle` verschiebt die Farbtabelle, ohne dass benachbarte IDs
    /// ähnliche Farben bekommen. ID 0 ist immer schwarz (Hintergrund).
    pub fn from_id(id: u32, shuffle: u32) -> Self {
        if id == 0 {
            return Color::BLACK;
        }
        let slot = (id as u64 + shuffle as u64 * 7) % 253;
        // goldener Winkel
        let hue = (slot as f64 * 137.507_764_05) % 360.0;
        let value = if id % 2 == 0 { 0.85 } else { 1.0 };
        HsvColor {
            h: hue,
            s: 1.0,
            v: value,
        }
        .to_rgb()
    }

    pub fn to_hsv(&self) -> HsvColor {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let delta = max - min;
        let h = if delta < EPS_F64 {
            0.0
        } else if max == self.r {
            60.0 * ((self.g - self.b) / delta).rem_euclid(6.0)
        } else if max == self.g {
            60.0 * ((self.b - self.r) / delta + 2.0)
        } else {
            60.0 * ((self.r - self.g) / delta + 4.0)
        };
        let s = if max < EPS_F64 { 0.0 } else { delta / max };
        HsvColor { h, s, v: max }
    }

    pub fn luminance(&self) -> f64 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }

    pub fn abs_diff_eq(&self, other: &Color, eps: f64) -> bool {
        (self.r - other.r).abs() <= eps
            && (self.g - other.g).abs() <= eps
            && (self.b - other.b).abs() <= eps
    }
}

impl HsvColor {
    pub fn to_rgb(&self) -> Color {
        let c = self.v * self.s;
        let hp = self.h.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
        let (r, g, b) = match hp as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = self.v - c;
        Color::new(r + m, g + m, b + m)
    }
}
