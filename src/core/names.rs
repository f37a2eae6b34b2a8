//! Bekannte Wertnamen (Schlüssel-Vertrag mit Agenten und Panels).

use serde::{Deserialize, Serialize};

use super::value::Value;

pub const DISPLAY: &str = "display";
pub const SELECTED: &str = "selected";
pub const SORT_VALUE: &str = "sort value";
pub const SORT_METHOD: &str = "sort method";
pub const NAME: &str = "name";

pub const GAMMA_3D: &str = "gamma 3d";
pub const LOW_THRESHOLD: &str = "low threshold";
pub const HIGH_THRESHOLD: &str = "high threshold";
pub const LUMINANCE: &str = "luminance";
pub const COLOR: &str = "color";
pub const COLORMAP_LOW: &str = "colormap low";
pub const COLORMAP_HIGH: &str = "colormap high";
pub const ALPHA: &str = "alpha";
pub const SPACING: &str = "spacing";
pub const TRANSFORM: &str = "transform";
pub const BOUNDS: &str = "bounds";
pub const LABEL: &str = "label";

pub const SYNC_R: &str = "sync r";
pub const SYNC_G: &str = "sync g";
pub const SYNC_B: &str = "sync b";
pub const GAMMA_R: &str = "gamma r";
pub const GAMMA_G: &str = "gamma g";
pub const GAMMA_B: &str = "gamma b";
pub const SYNC_GROUP: &str = "sync group";

pub const TEXT: &str = "text";
pub const POSITION: &str = "position";
pub const POINTS: &str = "points";
pub const RAY: &str = "ray";
pub const TRANSIENT: &str = "transient";

pub const DEFAULT_FILENAME: &str = "default filename";

/// Sortiermethode der Gruppen (als `int` gespeichert).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortMethod {
    #[default]
    SortNone,
    SortAscend,
    SortDescend,
}

impl SortMethod {
    pub fn to_int(self) -> i32 {
        match self {
            SortMethod::SortNone => 0,
            SortMethod::SortAscend => 1,
            SortMethod::SortDescend => 2,
        }
    }

    pub fn from_int(v: i32) -> Option<SortMethod> {
        match v {
            0 => Some(SortMethod::SortNone),
            1 => Some(SortMethod::SortAscend),
            2 => Some(SortMethod::SortDescend),
            _ => None,
        }
    }

    pub fn from_value(value: &Value) -> Option<SortMethod> {
        match value {
            Value::Int(v) => Self::from_int(*v),
            _ => None,
        }
    }
}

impl From<SortMethod> for Value {
    fn from(m: SortMethod) -> Self {
        Value::Int(m.to_int())
    }
}
