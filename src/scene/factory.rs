//! Factories: einzige Stelle, an der Objekt-IDs vergeben werden.
//!
//! Jede Art hat genau eine Factory mit einer Standard-Instanz. `build`
//! klont den Standard, `clone_object` eine bestehende Instanz; beide
//! vergeben eine neue, nie wiederverwendete ID und einen generierten Namen.
//! Die Registry wird explizit durchgereicht (kein globaler Zustand).

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::core::names::DEFAULT_FILENAME;
use crate::core::{CopyOp, EventKind, Handle, NotifyFlags, ObserverId};
use crate::xml::{parse_value_set, write_value_set};

use super::defaults::populate_defaults;
use super::entity::EntityKind;
use super::observer::Observer;
use super::store::NameOrder;
use super::Scene;

/// Monoton steigender ID-Zähler; 0 ist "keine ID".
#[derive(Debug, Clone)]
pub struct IdMinter {
    /// `None`, sobald der Zahlenraum verbraucht ist
    next: Option<u32>,
}

impl Default for IdMinter {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdMinter {
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: (first > 0).then_some(first),
        }
    }

    /// Vergibt die nächste ID; `None`, wenn keine unbenutzte mehr übrig ist.
    pub fn mint(&mut self) -> Option<u32> {
        let Some(id) = self.next else {
            warn!("ID-Raum erschöpft, keine neue ID vergeben");
            return None;
        };
        self.next = id.checked_add(1);
        Some(id)
    }

    /// Nächste zu vergebende ID.
    pub fn peek(&self) -> Option<u32> {
        self.next
    }
}

/// Factory einer Art.
#[derive(Debug, Clone)]
pub struct ObjectFactory {
    kind: EntityKind,
    /// Einstellungs-Objekt der Factory, trägt Observer und `default filename`
    node: Handle,
    default: Option<Handle>,
    objects: Vec<Handle>,
}

impl ObjectFactory {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn node(&self) -> Handle {
        self.node
    }

    pub fn default_instance(&self) -> Option<Handle> {
        self.default
    }

    /// Alle erzeugten Instanzen, älteste zuerst.
    pub fn objects(&self) -> &[Handle] {
        &self.objects
    }

    pub fn latest(&self) -> Option<Handle> {
        self.objects.last().copied()
    }
}

/// Alle Factories plus ID-Vergabe.
#[derive(Debug)]
pub struct FactoryRegistry {
    minter: IdMinter,
    factories: IndexMap<EntityKind, ObjectFactory>,
}

impl FactoryRegistry {
    pub fn new(scene: &mut Scene) -> Self {
        let factories = EntityKind::ALL
            .into_iter()
            .map(|kind| {
                let prefix = kind.name_prefix();
                let node = scene.create(EntityKind::Object, &format!("{} factory", prefix));
                scene.add_value(
                    node,
                    DEFAULT_FILENAME,
                    format!("{}_default.xml", prefix.replace(' ', "_")),
                );
                (
                    kind,
                    ObjectFactory {
                        kind,
                        node,
                        default: None,
                        objects: Vec::new(),
                    },
                )
            })
            .collect();
        Self {
            minter: IdMinter::default(),
            factories,
        }
    }

    pub fn factory(&self, kind: EntityKind) -> Option<&ObjectFactory> {
        self.factories.get(&kind)
    }

    /// Nächste ID, die vergeben würde.
    pub fn next_id(&self) -> Option<u32> {
        self.minter.peek()
    }

    /// Observer für `NodeAdded`/`NodeRemoved` dieser Factory.
    pub fn add_observer(
        &self,
        scene: &mut Scene,
        kind: EntityKind,
        observer: Box<dyn Observer>,
    ) -> Option<ObserverId> {
        let node = self.factory(kind)?.node;
        scene.add_observer(node, observer)
    }

    /// Legt die Standard-Instanz an, falls noch keine existiert.
    pub fn create_default(&mut self, scene: &mut Scene, kind: EntityKind) -> Option<Handle> {
        let factory = self.factories.get_mut(&kind)?;
        if let Some(existing) = factory.default.filter(|h| scene.is_alive(*h)) {
            return Some(existing);
        }
        let h = scene.create(kind, &format!("default {}", kind.name_prefix()));
        populate_defaults(scene, h, kind);
        factory.default = Some(h);
        debug!("Standard-Instanz für {} angelegt", kind.class_name());
        Some(h)
    }

    pub fn default_of(&self, kind: EntityKind) -> Option<Handle> {
        self.factory(kind)?.default
    }

    /// Neue Instanz als Klon des Standards. Die Factory hält die Referenz;
    /// Aufrufer, die länger halten wollen, rufen `Scene::retain`.
    pub fn build(&mut self, scene: &mut Scene, kind: EntityKind) -> Option<Handle> {
        let default = self.create_default(scene, kind)?;
        let h = scene.clone_entity(default, CopyOp::DEEP_COPY_ALL)?;
        self.register(scene, kind, h)
    }

    /// Tiefe Kopie einer bestehenden Instanz mit neuer ID.
    pub fn clone_object(&mut self, scene: &mut Scene, source: Handle) -> Option<Handle> {
        let kind = scene.kind(source)?;
        let h = scene.clone_entity(source, CopyOp::DEEP_COPY_ALL)?;
        self.register(scene, kind, h)
    }

    pub fn clone_id(&mut self, scene: &mut Scene, id: u32) -> Option<Handle> {
        let source = self.find(scene, id)?;
        self.clone_object(scene, source)
    }

    fn register(&mut self, scene: &mut Scene, kind: EntityKind, h: Handle) -> Option<Handle> {
        let Some(id) = self.minter.mint() else {
            scene.release(h);
            return None;
        };
        scene.set_id(h, id);
        scene.set_name(h, &format!("{}{}", kind.name_prefix().replace(' ', "_"), id));
        if let Some(factory) = self.factories.get_mut(&kind) {
            factory.objects.push(h);
            let node = factory.node;
            scene.fire_node_event(EventKind::NodeAdded, node, h, NotifyFlags::FACTORY);
        }
        Some(h)
    }

    /// Instanz mit der ID über alle Factories.
    pub fn find(&self, scene: &Scene, id: u32) -> Option<Handle> {
        if id == 0 {
            return None;
        }
        self.factories
            .values()
            .flat_map(|f| f.objects.iter())
            .copied()
            .find(|h| scene.id(*h) == Some(id))
    }

    /// Erste Instanz einer Art mit diesem Namen.
    pub fn find_first(&self, scene: &Scene, kind: EntityKind, name: &str) -> Option<Handle> {
        self.factory(kind)?
            .objects
            .iter()
            .copied()
            .find(|h| scene.name(*h) == Some(name))
    }

    /// Instanzen einer Art, deren Werte (bzw. `names`) mit `pattern` übereinstimmen.
    pub fn find_by_values(
        &self,
        scene: &Scene,
        kind: EntityKind,
        pattern: Handle,
        names: Option<&[&str]>,
    ) -> Vec<Handle> {
        self.factory(kind)
            .map(|f| {
                f.objects
                    .iter()
                    .copied()
                    .filter(|h| *h != pattern && scene.cmp_values(pattern, *h, names))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Gibt die Referenz der Factory ab.
    pub fn remove(&mut self, scene: &mut Scene, h: Handle) -> bool {
        let Some(kind) = scene.kind(h) else {
            return false;
        };
        let Some(factory) = self.factories.get_mut(&kind) else {
            return false;
        };
        let Some(pos) = factory.objects.iter().position(|o| *o == h) else {
            debug!("{} gehört nicht zur {}-Factory", h, kind.class_name());
            return false;
        };
        factory.objects.remove(pos);
        let node = factory.node;
        scene.fire_node_event(EventKind::NodeRemoved, node, h, NotifyFlags::FACTORY);
        scene.release(h);
        true
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.factory(kind).map_or(0, |f| f.objects.len())
    }

    pub fn all(&self, kind: EntityKind) -> &[Handle] {
        self.factory(kind).map_or(&[], |f| f.objects.as_slice())
    }

    /// Überträgt Werte von `h` in die Standard-Instanz seiner Art.
    pub fn prop_values_to_default(&mut self, scene: &mut Scene, h: Handle, names: Option<&[&str]>) -> usize {
        let Some(kind) = scene.kind(h) else {
            return 0;
        };
        let Some(default) = self.create_default(scene, kind) else {
            return 0;
        };
        match names {
            Some(names) => scene.prop_values(h, names, default),
            None => scene.prop_all_values(h, default),
        }
    }

    /// Setzt Werte von `h` auf die Standardwerte zurück.
    pub fn prop_values_from_default(&mut self, scene: &mut Scene, h: Handle, names: Option<&[&str]>) -> usize {
        let Some(kind) = scene.kind(h) else {
            return 0;
        };
        let Some(default) = self.create_default(scene, kind) else {
            return 0;
        };
        match names {
            Some(names) => scene.prop_values(default, names, h),
            None => scene.prop_all_values(default, h),
        }
    }

    /// Übernimmt Standardwerte aus XML; liefert die Zahl übernommener Werte.
    pub fn read_default(&mut self, scene: &mut Scene, kind: EntityKind, xml: &str) -> Result<usize> {
        let set = parse_value_set(xml)?;
        if let Some(class) = set.class.as_deref().filter(|c| *c != kind.class_name()) {
            warn!(
                "Standardwerte für {} werden in die {}-Factory geladen",
                class,
                kind.class_name()
            );
        }
        let default = self
            .create_default(scene, kind)
            .with_context(|| format!("Keine Factory für {}", kind.class_name()))?;
        let mut applied = 0;
        for tuple in &set.tuples {
            let ok = if scene.has_value(default, &tuple.name) {
                scene.set_value_tuple(default, tuple)
                    || scene.get_value_tuple(default, &tuple.name).as_ref() == Some(tuple)
            } else {
                scene.add_value_tuple(default, tuple)
            };
            if ok {
                applied += 1;
            } else {
                debug!("Standardwert '{}' übersprungen", tuple.name);
            }
        }
        Ok(applied)
    }

    /// Standardwerte einer Art als XML.
    pub fn write_default(&mut self, scene: &mut Scene, kind: EntityKind) -> Result<String> {
        let default = self
            .create_default(scene, kind)
            .with_context(|| format!("Keine Factory für {}", kind.class_name()))?;
        let tuples: Vec<_> = scene
            .value_names(default, NameOrder::Unordered)
            .iter()
            .filter_map(|name| scene.get_value_tuple(default, name))
            .filter(|t| !t.text.is_empty() || t.type_name == "string")
            .collect();
        write_value_set(kind.class_name(), &tuples)
    }

    /// Dateiname der Standardwerte laut Factory-Einstellung.
    pub fn default_filename(&self, scene: &Scene, kind: EntityKind) -> Option<String> {
        scene.get::<String>(self.factory(kind)?.node, DEFAULT_FILENAME)
    }

    /// Lädt Standardwerte aus `dir`/`default filename`, falls vorhanden.
    pub fn load_defaults(&mut self, scene: &mut Scene, dir: &Path) -> Result<usize> {
        let mut total = 0;
        for kind in EntityKind::ALL {
            let Some(file) = self.default_filename(scene, kind) else {
                continue;
            };
            let path = dir.join(file);
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Standardwerte nicht lesbar: {}", path.display()))?;
            total += self.read_default(scene, kind, &content)?;
            info!("Standardwerte geladen: {}", path.display());
        }
        Ok(total)
    }

    /// Schreibt die Standardwerte aller angelegten Standard-Instanzen.
    pub fn save_defaults(&mut self, scene: &mut Scene, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        for kind in EntityKind::ALL {
            if self.default_of(kind).is_none() {
                continue;
            }
            let Some(file) = self.default_filename(scene, kind) else {
                continue;
            };
            let xml = self.write_default(scene, kind)?;
            let path = dir.join(file);
            std::fs::write(&path, xml)
                .with_context(|| format!("Standardwerte nicht schreibbar: {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::names::{GAMMA_3D, SELECTED};
    use crate::scene::EventRecorder;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut scene = Scene::new();
        let mut reg = FactoryRegistry::new(&mut scene);
        let a = reg.build(&mut scene, EntityKind::Volume).expect("Volume");
        let b = reg.build(&mut scene, EntityKind::Mesh).expect("Mesh");
        assert_eq!(scene.id(a), Some(1));
        assert_eq!(scene.id(b), Some(2));
        assert_eq!(scene.name(a), Some("volume1"));

        assert!(reg.remove(&mut scene, a));
        assert!(!scene.is_alive(a));
        let c = reg.build(&mut scene, EntityKind::Volume).expect("Volume");
        assert_eq!(scene.id(c), Some(3));
    }

    #[test]
    fn minter_never_repeats_the_last_id() {
        let mut minter = IdMinter::starting_at(u32::MAX - 1);
        assert_eq!(minter.mint(), Some(u32::MAX - 1));
        assert_eq!(minter.mint(), Some(u32::MAX));
        assert_eq!(minter.mint(), None);
        assert_eq!(minter.mint(), None);
        assert_eq!(minter.peek(), None);
    }

    #[test]
    fn build_refuses_once_ids_are_exhausted() {
        let mut scene = Scene::new();
        let mut reg = FactoryRegistry::new(&mut scene);
        reg.minter = IdMinter::starting_at(u32::MAX);
        reg.create_default(&mut scene, EntityKind::Volume).expect("Default");

        let last = reg.build(&mut scene, EntityKind::Volume).expect("letzte ID");
        assert_eq!(scene.id(last), Some(u32::MAX));
        let entities = scene.len();

        assert!(reg.build(&mut scene, EntityKind::Volume).is_none());
        assert!(reg.clone_object(&mut scene, last).is_none());
        assert_eq!(scene.len(), entities);
        assert_eq!(reg.count(EntityKind::Volume), 1);
    }

    #[test]
    fn create_default_is_idempotent() {
        let mut scene = Scene::new();
        let mut reg = FactoryRegistry::new(&mut scene);
        let d1 = reg.create_default(&mut scene, EntityKind::Volume);
        let d2 = reg.create_default(&mut scene, EntityKind::Volume);
        assert_eq!(d1, d2);
        assert_eq!(reg.count(EntityKind::Volume), 0);
    }

    #[test]
    fn build_copies_default_values_independently() {
        let mut scene = Scene::new();
        let mut reg = FactoryRegistry::new(&mut scene);
        let default = reg.create_default(&mut scene, EntityKind::Volume).expect("Default");
        scene.set_value(default, GAMMA_3D, 2.0f64);

        let v = reg.build(&mut scene, EntityKind::Volume).expect("Volume");
        assert_eq!(scene.get::<f64>(v, GAMMA_3D), Some(2.0));
        scene.set_value(v, GAMMA_3D, 3.0f64);
        assert_eq!(scene.get::<f64>(default, GAMMA_3D), Some(2.0));
    }

    #[test]
    fn clone_by_id_and_find() {
        let mut scene = Scene::new();
        let mut reg = FactoryRegistry::new(&mut scene);
        let v = reg.build(&mut scene, EntityKind::Volume).expect("Volume");
        scene.set_value(v, GAMMA_3D, 1.7f64);
        let id = scene.id(v).expect("ID");

        let c = reg.clone_id(&mut scene, id).expect("Klon");
        assert_ne!(scene.id(c), Some(id));
        assert_eq!(scene.get::<f64>(c, GAMMA_3D), Some(1.7));
        assert_eq!(reg.find(&scene, id), Some(v));
        assert_eq!(reg.find_first(&scene, EntityKind::Volume, "volume1"), Some(v));
        assert_eq!(reg.find_by_values(&scene, EntityKind::Volume, v, Some(&[GAMMA_3D])), vec![c]);
        assert!(reg.clone_id(&mut scene, 999).is_none());
    }

    #[test]
    fn factory_observers_see_additions() {
        let mut scene = Scene::new();
        let mut reg = FactoryRegistry::new(&mut scene);
        let recorder = EventRecorder::with_flags(NotifyFlags::FACTORY);
        let records = recorder.records();
        reg.add_observer(&mut scene, EntityKind::Mesh, Box::new(recorder))
            .expect("Observer registriert");

        let m = reg.build(&mut scene, EntityKind::Mesh).expect("Mesh");
        reg.build(&mut scene, EntityKind::Volume).expect("Volume");
        reg.remove(&mut scene, m);

        let kinds: Vec<EventKind> = records
            .lock()
            .expect("Lock")
            .iter()
            .map(|r| r.kind)
            .collect();
        assert_eq!(kinds, vec![EventKind::NodeAdded, EventKind::NodeRemoved]);
    }

    #[test]
    fn defaults_round_trip_through_xml() {
        let mut scene = Scene::new();
        let mut reg = FactoryRegistry::new(&mut scene);
        let default = reg.create_default(&mut scene, EntityKind::Volume).expect("Default");
        scene.set_value(default, GAMMA_3D, 0.8f64);
        let xml = reg.write_default(&mut scene, EntityKind::Volume).expect("XML");

        let mut other_scene = Scene::new();
        let mut other = FactoryRegistry::new(&mut other_scene);
        let applied = other
            .read_default(&mut other_scene, EntityKind::Volume, &xml)
            .expect("Lesen");
        assert!(applied > 10);
        let d = other.default_of(EntityKind::Volume).expect("Default");
        assert_eq!(other_scene.get::<f64>(d, GAMMA_3D), Some(0.8));
        assert_eq!(other_scene.get::<bool>(d, SELECTED), Some(false));
    }

    #[test]
    fn values_propagate_to_and_from_default() {
        let mut scene = Scene::new();
        let mut reg = FactoryRegistry::new(&mut scene);
        let v = reg.build(&mut scene, EntityKind::Volume).expect("Volume");
        scene.set_value(v, GAMMA_3D, 2.5f64);
        assert_eq!(reg.prop_values_to_default(&mut scene, v, Some(&[GAMMA_3D])), 1);

        let w = reg.build(&mut scene, EntityKind::Volume).expect("Volume");
        assert_eq!(scene.get::<f64>(w, GAMMA_3D), Some(2.5));
        scene.set_value(w, GAMMA_3D, 1.0f64);
        reg.prop_values_from_default(&mut scene, w, None);
        assert_eq!(scene.get::<f64>(w, GAMMA_3D), Some(2.5));
    }
}
