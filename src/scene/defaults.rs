//! Standardwerte je Entitäts-Art (Schlüssel-Vertrag der Agenten).

use glam::DVec3;

use crate::core::names::*;
use crate::core::{BBox, Color, Handle, Ray, SortMethod, Transform, Value};

use super::entity::EntityKind;
use super::Scene;

/// Legt die Standardwerte von `kind` auf `h` an (bestehende Namen bleiben).
pub fn populate_defaults(scene: &mut Scene, h: Handle, kind: EntityKind) {
    let mut values: Vec<(&str, Value)> = Vec::new();

    if kind.is_node() {
        values.push((DISPLAY, Value::Bool(true)));
        values.push((SELECTED, Value::Bool(false)));
    }
    if kind.is_group() {
        values.push((SORT_VALUE, Value::String(String::new())));
        values.push((SORT_METHOD, SortMethod::SortNone.into()));
    }

    match kind {
        EntityKind::Volume => {
            values.extend([
                (GAMMA_3D, Value::Double(1.0)),
                (LOW_THRESHOLD, Value::Double(0.0)),
                (HIGH_THRESHOLD, Value::Double(1.0)),
                (LUMINANCE, Value::Double(1.0)),
                (COLOR, Value::Color(Color::WHITE)),
                (COLORMAP_LOW, Value::Double(0.0)),
                (COLORMAP_HIGH, Value::Double(1.0)),
                (SYNC_R, Value::Bool(false)),
                (SYNC_G, Value::Bool(false)),
                (SYNC_B, Value::Bool(false)),
                (GAMMA_R, Value::Double(1.0)),
                (GAMMA_G, Value::Double(1.0)),
                (GAMMA_B, Value::Double(1.0)),
                (SPACING, Value::vector(DVec3::ONE)),
                (TRANSFORM, Value::Transform(Transform::identity())),
                (BOUNDS, Value::BBox(BBox::empty())),
                (LABEL, Value::Object(None)),
            ]);
        }
        EntityKind::Mesh => {
            values.extend([
                (COLOR, Value::Color(Color::WHITE)),
                (ALPHA, Value::Double(1.0)),
                (TRANSFORM, Value::Transform(Transform::identity())),
                (BOUNDS, Value::BBox(BBox::empty())),
            ]);
        }
        EntityKind::Annotation => {
            values.extend([
                (TEXT, Value::String(String::new())),
                (POSITION, Value::point(DVec3::ZERO)),
                (COLOR, Value::Color(Color::WHITE)),
            ]);
        }
        EntityKind::Ruler => {
            values.extend([
                (POINTS, Value::List(Vec::new())),
                (RAY, Value::Ray(Ray::default())),
                (COLOR, Value::Color(Color::new(1.0, 1.0, 0.0))),
                (TRANSIENT, Value::Bool(false)),
            ]);
        }
        EntityKind::VolumeGroup | EntityKind::MeshGroup => {
            values.push((SYNC_GROUP, Value::Bool(false)));
        }
        EntityKind::Object | EntityKind::Node | EntityKind::Group | EntityKind::Root => {}
    }

    for (name, value) in values {
        if !scene.has_value(h, name) {
            scene.add_value(h, name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_carries_agent_keys() {
        let mut scene = Scene::new();
        let v = scene.create(EntityKind::Volume, "v");
        populate_defaults(&mut scene, v, EntityKind::Volume);
        for key in [GAMMA_3D, LOW_THRESHOLD, HIGH_THRESHOLD, COLOR, COLORMAP_LOW, COLORMAP_HIGH] {
            assert!(scene.has_value(v, key), "Schlüssel '{}' fehlt", key);
        }
        assert!(!scene.has_value(v, SORT_METHOD));
    }

    #[test]
    fn plain_object_gets_nothing() {
        let mut scene = Scene::new();
        let o = scene.create(EntityKind::Object, "o");
        populate_defaults(&mut scene, o, EntityKind::Object);
        assert_eq!(scene.value_count(o), 0);
    }
}
