//! Laufzeit-typisierte Werte.
//!
//! Ein `Value` ist eine geschlossene Summe aller Nutzlast-Arten, die ein
//! Objekt unter einem Namen speichern kann. Der Typ (`ValueKind`) eines
//! Namens steht nach dem ersten `add_value` fest.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use super::handle::Handle;
use super::math::{BBox, Color, Ray, Transform, EPS_F32, EPS_F64};

// ── Referenced ──────────────────────────────────────────────────────

/// Undurchsichtige, referenzgezählte Nutzlast.
///
/// Kopier-Operationen behandeln sie immer als Identität: ein Klon teilt
/// denselben Zeiger.
#[derive(Clone)]
pub struct Referenced(Arc<dyn Any + Send + Sync>);

impl Referenced {
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Self(Arc::new(payload))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Referenced) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Anzahl der aktuellen Halter.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl PartialEq for Referenced {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Referenced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Referenced({:p})", Arc::as_ptr(&self.0))
    }
}

// ── ValueKind ───────────────────────────────────────────────────────

/// Typ-Tag eines Wertes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
    WString,
    Color,
    Point,
    Vector,
    BBox,
    Ray,
    Transform,
    Quaternion,
    Object,
    Referenced,
    List,
}

impl ValueKind {
    pub const ALL: [ValueKind; 17] = [
        ValueKind::Bool,
        ValueKind::Int,
        ValueKind::Long,
        ValueKind::Float,
        ValueKind::Double,
        ValueKind::String,
        ValueKind::WString,
        ValueKind::Color,
        ValueKind::Point,
        ValueKind::Vector,
        ValueKind::BBox,
        ValueKind::Ray,
        ValueKind::Transform,
        ValueKind::Quaternion,
        ValueKind::Object,
        ValueKind::Referenced,
        ValueKind::List,
    ];

    /// Kanonischer Typname (wie in gespeicherten Wert-Sets).
    pub fn type_name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::WString => "wstring",
            ValueKind::Color => "Color",
            ValueKind::Point => "Point",
            ValueKind::Vector => "Vector",
            ValueKind::BBox => "BBox",
            ValueKind::Ray => "Ray",
            ValueKind::Transform => "Transform",
            ValueKind::Quaternion => "Quaternion",
            ValueKind::Object => "Object",
            ValueKind::Referenced => "Referenced",
            ValueKind::List => "List",
        }
    }

    pub fn from_type_name(name: &str) -> Option<ValueKind> {
        ValueKind::ALL.into_iter().find(|k| k.type_name() == name)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValueKind::Float | ValueKind::Double)
    }
}

// ── Value ───────────────────────────────────────────────────────────

/// Eine typisierte Nutzlast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// UTF-16-Text (breite Zeichenkette)
    WString(Vec<u16>),
    Color(Color),
    Point(DVec3),
    Vector(DVec3),
    BBox(BBox),
    Ray(Ray),
    Transform(Transform),
    Quaternion(DQuat),
    /// Verweis auf ein anderes Objekt der Szene (haltend)
    Object(Option<Handle>),
    #[serde(skip)]
    Referenced(Referenced),
    List(Vec<Value>),
}

/// Name, Typname und Textform eines Wertes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueTuple {
    pub name: String,
    pub type_name: String,
    pub text: String,
}

impl ValueTuple {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            text: text.into(),
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::WString(_) => ValueKind::WString,
            Value::Color(_) => ValueKind::Color,
            Value::Point(_) => ValueKind::Point,
            Value::Vector(_) => ValueKind::Vector,
            Value::BBox(_) => ValueKind::BBox,
            Value::Ray(_) => ValueKind::Ray,
            Value::Transform(_) => ValueKind::Transform,
            Value::Quaternion(_) => ValueKind::Quaternion,
            Value::Object(_) => ValueKind::Object,
            Value::Referenced(_) => ValueKind::Referenced,
            Value::List(_) => ValueKind::List,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    pub fn point(p: DVec3) -> Self {
        Value::Point(p)
    }

    pub fn vector(v: DVec3) -> Self {
        Value::Vector(v)
    }

    pub fn wstring(text: &str) -> Self {
        Value::WString(text.encode_utf16().collect())
    }

    /// Startwert einer Art (für Text-Import ohne Vorwert).
    pub fn default_of(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int => Value::Int(0),
            ValueKind::Long => Value::Long(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::String => Value::String(String::new()),
            ValueKind::WString => Value::WString(Vec::new()),
            ValueKind::Color => Value::Color(Color::default()),
            ValueKind::Point => Value::Point(DVec3::ZERO),
            ValueKind::Vector => Value::Vector(DVec3::ZERO),
            ValueKind::BBox => Value::BBox(BBox::empty()),
            ValueKind::Ray => Value::Ray(Ray::default()),
            ValueKind::Transform => Value::Transform(Transform::identity()),
            ValueKind::Quaternion => Value::Quaternion(DQuat::IDENTITY),
            ValueKind::Object => Value::Object(None),
            ValueKind::Referenced => Value::Referenced(Referenced::new(())),
            ValueKind::List => Value::List(Vec::new()),
        }
    }

    /// Vergleich mit Toleranz; `precise` erzwingt exakte Gleichheit.
    pub fn same_as(&self, other: &Value, precise: bool) -> bool {
        if precise {
            return self == other;
        }
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => ((*a as f64) - (*b as f64)).abs() <= EPS_F32,
            (Value::Double(a), Value::Double(b)) => (a - b).abs() <= EPS_F64,
            (Value::Color(a), Value::Color(b)) => a.abs_diff_eq(b, EPS_F64),
            (Value::Point(a), Value::Point(b)) | (Value::Vector(a), Value::Vector(b)) => {
                a.abs_diff_eq(*b, EPS_F64)
            }
            (Value::Quaternion(a), Value::Quaternion(b)) => a.abs_diff_eq(*b, EPS_F64),
            (Value::Transform(a), Value::Transform(b)) => a.abs_diff_eq(b, EPS_F64),
            (Value::BBox(a), Value::BBox(b)) => {
                a.is_valid() == b.is_valid()
                    && (!a.is_valid()
                        || (a.min.abs_diff_eq(b.min, EPS_F64) && a.max.abs_diff_eq(b.max, EPS_F64)))
            }
            (Value::Ray(a), Value::Ray(b)) => {
                a.origin.abs_diff_eq(b.origin, EPS_F64)
                    && a.direction.abs_diff_eq(b.direction, EPS_F64)
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y, false))
            }
            _ => self == other,
        }
    }

    /// Textform für Wert-Tupel und XML-Defaults.
    ///
    /// Objektverweise und undurchsichtige Nutzlasten haben keine Textform
    /// und liefern einen leeren String.
    pub fn to_text(&self) -> String {
        fn join(values: &[f64]) -> String {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        }
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::String(s) => s.clone(),
            Value::WString(w) => String::from_utf16_lossy(w),
            Value::Color(c) => join(&[c.r, c.g, c.b]),
            Value::Point(p) | Value::Vector(p) => join(&p.to_array()),
            Value::BBox(b) => {
                if b.is_valid() {
                    join(&[b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z])
                } else {
                    "empty".to_string()
                }
            }
            Value::Ray(r) => join(&[
                r.origin.x,
                r.origin.y,
                r.origin.z,
                r.direction.x,
                r.direction.y,
                r.direction.z,
            ]),
            Value::Transform(t) => join(&t.to_cols_array()),
            Value::Quaternion(q) => join(&q.to_array()),
            Value::Object(_) | Value::Referenced(_) => String::new(),
            Value::List(items) => serde_json::to_string(items).unwrap_or_default(),
        }
    }

    /// Parst die Textform einer Art. `None` bei ungültigem Text.
    pub fn from_text(kind: ValueKind, text: &str) -> Option<Value> {
        fn numbers<const N: usize>(text: &str) -> Option<[f64; N]> {
            let parsed: Vec<f64> = text
                .split_whitespace()
                .map(|t| t.parse::<f64>())
                .collect::<Result<_, _>>()
                .ok()?;
            parsed.try_into().ok()
        }
        let text_trim = text.trim();
        Some(match kind {
            ValueKind::Bool => match text_trim {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return None,
            },
            ValueKind::Int => Value::Int(text_trim.parse().ok()?),
            ValueKind::Long => Value::Long(text_trim.parse().ok()?),
            ValueKind::Float => Value::Float(text_trim.parse().ok()?),
            ValueKind::Double => Value::Double(text_trim.parse().ok()?),
            ValueKind::String => Value::String(text.to_string()),
            ValueKind::WString => Value::wstring(text),
            ValueKind::Color => {
                let [r, g, b] = numbers::<3>(text)?;
                Value::Color(Color::new(r, g, b))
            }
            ValueKind::Point => Value::Point(DVec3::from_array(numbers::<3>(text)?)),
            ValueKind::Vector => Value::Vector(DVec3::from_array(numbers::<3>(text)?)),
            ValueKind::BBox => {
                if text_trim == "empty" {
                    Value::BBox(BBox::empty())
                } else {
                    let v = numbers::<6>(text)?;
                    Value::BBox(BBox::new(
                        DVec3::new(v[0], v[1], v[2]),
                        DVec3::new(v[3], v[4], v[5]),
                    ))
                }
            }
            ValueKind::Ray => {
                let v = numbers::<6>(text)?;
                Value::Ray(Ray::new(
                    DVec3::new(v[0], v[1], v[2]),
                    DVec3::new(v[3], v[4], v[5]),
                ))
            }
            ValueKind::Transform => Value::Transform(Transform::from_cols_array(&numbers::<16>(text)?)),
            ValueKind::Quaternion => Value::Quaternion(DQuat::from_array(numbers::<4>(text)?)),
            ValueKind::Object => Value::Object(None),
            ValueKind::Referenced => return None,
            ValueKind::List => {
                if text_trim.is_empty() {
                    Value::List(Vec::new())
                } else {
                    Value::List(serde_json::from_str(text_trim).ok()?)
                }
            }
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Numerischer Wert für Sortierung und Analyse.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Handle> {
        match self {
            Value::Object(h) => *h,
            _ => None,
        }
    }

    /// Alle haltenden Objektverweise (auch in Listen).
    pub(crate) fn object_refs(&self, out: &mut Vec<Handle>) {
        match self {
            Value::Object(Some(h)) => out.push(*h),
            Value::List(items) => items.iter().for_each(|v| v.object_refs(out)),
            _ => {}
        }
    }
}

// ── Konvertierungen ─────────────────────────────────────────────────

macro_rules! value_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

value_from!(bool, Bool);
value_from!(i32, Int);
value_from!(i64, Long);
value_from!(f32, Float);
value_from!(f64, Double);
value_from!(String, String);
value_from!(Color, Color);
value_from!(BBox, BBox);
value_from!(Ray, Ray);
value_from!(Transform, Transform);
value_from!(DQuat, Quaternion);
value_from!(Referenced, Referenced);
value_from!(Vec<Value>, List);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Handle> for Value {
    fn from(h: Handle) -> Self {
        Value::Object(Some(h))
    }
}

/// Typisierte Entnahme aus einem `Value`; `None` bei abweichender Art.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! from_value {
    ($ty:ty, $variant:ident) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

from_value!(bool, Bool);
from_value!(i32, Int);
from_value!(i64, Long);
from_value!(f32, Float);
from_value!(f64, Double);
from_value!(String, String);
from_value!(Color, Color);
from_value!(BBox, BBox);
from_value!(Ray, Ray);
from_value!(Transform, Transform);
from_value!(DQuat, Quaternion);
from_value!(Referenced, Referenced);
from_value!(Vec<Value>, List);

/// Punkte und Vektoren teilen sich `DVec3`; beide Arten werden akzeptiert.
impl FromValue for DVec3 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Point(p) | Value::Vector(p) => Some(*p),
            _ => None,
        }
    }
}

impl FromValue for Option<Handle> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(h) => Some(*h),
            _ => None,
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerant_equality_ignores_tiny_float_noise() {
        let a = Value::Double(1.0);
        let b = Value::Double(1.0 + 1e-12);
        assert!(a.same_as(&b, false));
        assert!(!a.same_as(&b, true));
        assert!(!Value::Double(1.0).same_as(&Value::Float(1.0), false));
    }

    #[test]
    fn text_round_trip_keeps_kind() {
        let samples = [
            Value::Bool(true),
            Value::Int(-3),
            Value::Long(1 << 40),
            Value::Double(0.25),
            Value::String("Volume 1".into()),
            Value::wstring("Zelle"),
            Value::Color(Color::new(0.5, 0.25, 1.0)),
            Value::vector(DVec3::new(1.0, 2.0, 3.0)),
            Value::Transform(Transform::from_translation(DVec3::X)),
            Value::Quaternion(DQuat::IDENTITY),
            Value::BBox(BBox::empty()),
            Value::List(vec![Value::Int(1), Value::Bool(false)]),
        ];
        for value in samples {
            let text = value.to_text();
            let back = Value::from_text(value.kind(), &text)
                .unwrap_or_else(|| panic!("Text '{}' nicht lesbar", text));
            assert!(value.same_as(&back, false), "{:?} != {:?}", value, back);
        }
    }

    #[test]
    fn invalid_text_is_rejected() {
        assert!(Value::from_text(ValueKind::Int, "abc").is_none());
        assert!(Value::from_text(ValueKind::Color, "1 2").is_none());
        assert!(Value::from_text(ValueKind::Referenced, "").is_none());
    }

    #[test]
    fn referenced_compares_by_identity() {
        let a = Referenced::new(vec![1u8, 2, 3]);
        let b = a.clone();
        let c = Referenced::new(vec![1u8, 2, 3]);
        assert!(a.ptr_eq(&b));
        assert_ne!(a, c);
        assert_eq!(b.downcast_ref::<Vec<u8>>().map(|v| v.len()), Some(3));
    }

    #[test]
    fn type_names_resolve_back() {
        for kind in ValueKind::ALL {
            assert_eq!(ValueKind::from_type_name(kind.type_name()), Some(kind));
        }
    }
}
