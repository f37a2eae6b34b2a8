//! Traversierung des Graphen mit Besuchern.
//!
//! `Scene::accept` prüft die Maske, legt den Node auf den Pfad-Stack und
//! verteilt per `match` auf die passende `apply_*`-Methode. Die
//! Standard-Implementierungen fallen von der speziellen Art auf
//! `apply_group` bzw. `apply_node` zurück, die wiederum `traverse` aufrufen.

use std::fmt::Write as _;

use crate::core::names::DISPLAY;
use crate::core::Handle;

use super::entity::EntityKind;
use super::store::NameOrder;
use super::Scene;

/// Richtung bzw. Umfang der Traversierung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalMode {
    None,
    Parents,
    #[default]
    AllChildren,
    /// Nur Kinder, deren `display` wahr ist (oder fehlt)
    ActiveChildren,
}

/// Gemeinsamer Zustand aller Besucher.
#[derive(Debug, Clone)]
pub struct VisitorState {
    pub mode: TraversalMode,
    pub traversal_mask: u32,
    /// Bits, die unabhängig von der Node-Maske als gesetzt gelten
    pub override_mask: u32,
    path: Vec<Handle>,
}

impl Default for VisitorState {
    fn default() -> Self {
        Self::new(TraversalMode::AllChildren)
    }
}

impl VisitorState {
    pub fn new(mode: TraversalMode) -> Self {
        Self {
            mode,
            traversal_mask: u32::MAX,
            override_mask: 0,
            path: Vec::new(),
        }
    }

    pub fn valid_mask(&self, node_mask: u32) -> bool {
        self.traversal_mask & (self.override_mask | node_mask) != 0
    }

    pub fn path(&self) -> &[Handle] {
        &self.path
    }

    /// Tiefe des aktuellen Nodes (0 = Startknoten).
    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

pub trait NodeVisitor {
    fn state(&self) -> &VisitorState;
    fn state_mut(&mut self) -> &mut VisitorState;

    fn apply_node(&mut self, scene: &Scene, node: Handle) {
        self.traverse(scene, node);
    }

    fn apply_group(&mut self, scene: &Scene, group: Handle) {
        self.apply_node(scene, group);
    }

    fn apply_root(&mut self, scene: &Scene, root: Handle) {
        self.apply_group(scene, root);
    }

    fn apply_volume(&mut self, scene: &Scene, node: Handle) {
        self.apply_node(scene, node);
    }

    fn apply_mesh(&mut self, scene: &Scene, node: Handle) {
        self.apply_node(scene, node);
    }

    fn apply_annotation(&mut self, scene: &Scene, node: Handle) {
        self.apply_node(scene, node);
    }

    fn apply_ruler(&mut self, scene: &Scene, node: Handle) {
        self.apply_node(scene, node);
    }

    fn apply_volume_group(&mut self, scene: &Scene, group: Handle) {
        self.apply_group(scene, group);
    }

    fn apply_mesh_group(&mut self, scene: &Scene, group: Handle) {
        self.apply_group(scene, group);
    }

    /// Geht je nach Modus zu den Eltern oder Kindern weiter.
    fn traverse(&mut self, scene: &Scene, node: Handle) {
        traverse_default(self, scene, node);
    }
}

/// Standard-Traversierung, auch aus überschriebenem `traverse` nutzbar.
pub fn traverse_default<V: NodeVisitor + ?Sized>(visitor: &mut V, scene: &Scene, node: Handle) {
    match visitor.state().mode {
        TraversalMode::None => {}
        TraversalMode::Parents => {
            for parent in scene.parents(node) {
                scene.accept(parent, visitor);
            }
        }
        TraversalMode::AllChildren => {
            for child in scene.children(node).to_vec() {
                scene.accept(child, visitor);
            }
        }
        TraversalMode::ActiveChildren => {
            for child in scene.children(node).to_vec() {
                if scene.get::<bool>(child, DISPLAY).unwrap_or(true) {
                    scene.accept(child, visitor);
                }
            }
        }
    }
}

impl Scene {
    /// Besucht `node`, sofern dessen Maske zum Besucher passt.
    pub fn accept<V: NodeVisitor + ?Sized>(&self, node: Handle, visitor: &mut V) {
        let Some(entity) = self.entities.get(node.0) else {
            return;
        };
        if !entity.kind.is_node() || !visitor.state().valid_mask(entity.node_mask) {
            return;
        }
        let kind = entity.kind;
        visitor.state_mut().path.push(node);
        match kind {
            EntityKind::Object => {}
            EntityKind::Node => visitor.apply_node(self, node),
            EntityKind::Group => visitor.apply_group(self, node),
            EntityKind::Root => visitor.apply_root(self, node),
            EntityKind::Volume => visitor.apply_volume(self, node),
            EntityKind::Mesh => visitor.apply_mesh(self, node),
            EntityKind::Annotation => visitor.apply_annotation(self, node),
            EntityKind::Ruler => visitor.apply_ruler(self, node),
            EntityKind::VolumeGroup => visitor.apply_volume_group(self, node),
            EntityKind::MeshGroup => visitor.apply_mesh_group(self, node),
        }
        visitor.state_mut().path.pop();
    }
}

// ── Besucher ────────────────────────────────────────────────────────

/// Eingerückte Textausgabe des Baums.
#[derive(Debug, Default)]
pub struct InfoVisitor {
    state: VisitorState,
    show_values: bool,
    out: String,
}

impl InfoVisitor {
    pub fn new(show_values: bool) -> Self {
        Self {
            state: VisitorState::default(),
            show_values,
            out: String::new(),
        }
    }

    pub fn output(&self) -> &str {
        &self.out
    }
}

impl NodeVisitor for InfoVisitor {
    fn state(&self) -> &VisitorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut VisitorState {
        &mut self.state
    }

    fn apply_node(&mut self, scene: &Scene, node: Handle) {
        let indent = "  ".repeat(self.state.depth());
        let class = scene.kind(node).map_or("?", |k| k.class_name());
        let _ = writeln!(
            self.out,
            "{}{} '{}' (id {})",
            indent,
            class,
            scene.name(node).unwrap_or(""),
            scene.id(node).unwrap_or(0)
        );
        if self.show_values {
            for tuple in scene.value_tuples(node) {
                let _ = writeln!(
                    self.out,
                    "{}  - {} [{}] = {}",
                    indent, tuple.name, tuple.type_name, tuple.text
                );
            }
        }
        self.traverse(scene, node);
    }
}

/// Suchkriterium für `SearchVisitor`.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchBy {
    Name(String),
    Id(u32),
}

/// Sammelt alle Nodes mit passendem Namen bzw. passender ID.
#[derive(Debug)]
pub struct SearchVisitor {
    state: VisitorState,
    by: SearchBy,
    found: Vec<Handle>,
}

impl SearchVisitor {
    pub fn new(by: SearchBy) -> Self {
        Self {
            state: VisitorState::default(),
            by,
            found: Vec::new(),
        }
    }

    pub fn found(&self) -> &[Handle] {
        &self.found
    }

    pub fn first(&self) -> Option<Handle> {
        self.found.first().copied()
    }
}

impl NodeVisitor for SearchVisitor {
    fn state(&self) -> &VisitorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut VisitorState {
        &mut self.state
    }

    fn apply_node(&mut self, scene: &Scene, node: Handle) {
        let hit = match &self.by {
            SearchBy::Name(name) => scene.name(node) == Some(name.as_str()),
            SearchBy::Id(id) => scene.id(node) == Some(*id),
        };
        if hit && !self.found.contains(&node) {
            self.found.push(node);
        }
        self.traverse(scene, node);
    }
}

/// Sammelt Nodes bestimmter Arten (leer = alle).
#[derive(Debug, Default)]
pub struct CollectVisitor {
    state: VisitorState,
    kinds: Vec<EntityKind>,
    nodes: Vec<Handle>,
}

impl CollectVisitor {
    pub fn new(kinds: &[EntityKind]) -> Self {
        Self {
            state: VisitorState::default(),
            kinds: kinds.to_vec(),
            nodes: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: TraversalMode) -> Self {
        self.state.mode = mode;
        self
    }

    pub fn nodes(&self) -> &[Handle] {
        &self.nodes
    }
}

impl NodeVisitor for CollectVisitor {
    fn state(&self) -> &VisitorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut VisitorState {
        &mut self.state
    }

    fn apply_node(&mut self, scene: &Scene, node: Handle) {
        let wanted = self.kinds.is_empty()
            || scene.kind(node).is_some_and(|k| self.kinds.contains(&k));
        if wanted && !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
        self.traverse(scene, node);
    }
}

/// Überträgt Werte einer Quelle auf alle besuchten Nodes, die sie besitzen.
///
/// Die Traversierung sammelt nur; das Setzen folgt in `apply`, weil der
/// Besuch selbst die Szene nicht verändert.
#[derive(Debug)]
pub struct ValueUpdateVisitor {
    state: VisitorState,
    names: Vec<String>,
    targets: Vec<Handle>,
}

impl ValueUpdateVisitor {
    pub fn new(names: &[&str]) -> Self {
        Self {
            state: VisitorState::default(),
            names: names.iter().map(|s| s.to_string()).collect(),
            targets: Vec::new(),
        }
    }

    pub fn targets(&self) -> &[Handle] {
        &self.targets
    }

    /// Besucht ab `start` und überträgt von `source`; liefert die Zahl
    /// geänderter Werte.
    pub fn apply(mut self, scene: &mut Scene, start: Handle, source: Handle) -> usize {
        scene.accept(start, &mut self);
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        self.targets
            .iter()
            .filter(|t| **t != source)
            .map(|t| scene.prop_values(source, &names, *t))
            .sum()
    }
}

impl NodeVisitor for ValueUpdateVisitor {
    fn state(&self) -> &VisitorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut VisitorState {
        &mut self.state
    }

    fn apply_node(&mut self, scene: &Scene, node: Handle) {
        if self.names.iter().any(|n| scene.has_value(node, n)) && !self.targets.contains(&node) {
            self.targets.push(node);
        }
        self.traverse(scene, node);
    }
}

/// Alle Wertnamen eines Teilbaums (für Panels, die Schlüssel anbieten).
pub fn collect_value_names(scene: &Scene, start: Handle) -> Vec<String> {
    let mut collector = CollectVisitor::new(&[]);
    scene.accept(start, &mut collector);
    let mut names: Vec<String> = Vec::new();
    for node in collector.nodes() {
        for name in scene.value_names(*node, NameOrder::Ascending) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (Scene, Handle, Handle, Handle) {
        let mut scene = Scene::new();
        let root = scene.create(EntityKind::Root, "root");
        let group = scene.create(EntityKind::VolumeGroup, "channels");
        let v1 = scene.create(EntityKind::Volume, "ch1");
        let v2 = scene.create(EntityKind::Volume, "ch2");
        scene.add_child(root, group);
        scene.add_child(group, v1);
        scene.add_child(group, v2);
        scene.add_value(v2, DISPLAY, false);
        (scene, root, v1, v2)
    }

    #[test]
    fn collect_skips_hidden_children() {
        let (scene, root, v1, v2) = tree();
        let mut all = CollectVisitor::new(&[EntityKind::Volume]);
        scene.accept(root, &mut all);
        assert_eq!(all.nodes(), &[v1, v2]);

        let mut active = CollectVisitor::new(&[EntityKind::Volume]).with_mode(TraversalMode::ActiveChildren);
        scene.accept(root, &mut active);
        assert_eq!(active.nodes(), &[v1]);
    }

    #[test]
    fn mask_prunes_subtree_unless_overridden() {
        let (mut scene, root, v1, _) = tree();
        scene.set_node_mask(v1, 0b10);
        let mut visitor = CollectVisitor::new(&[EntityKind::Volume]);
        visitor.state_mut().traversal_mask = 0b01;
        visitor.state_mut().override_mask = 0;
        // Root und Gruppe haben alle Bits gesetzt
        scene.accept(root, &mut visitor);
        assert!(!visitor.nodes().contains(&v1));

        let mut forced = CollectVisitor::new(&[EntityKind::Volume]);
        forced.state_mut().traversal_mask = 0b01;
        forced.state_mut().override_mask = 0b01;
        scene.accept(root, &mut forced);
        assert!(forced.nodes().contains(&v1));
    }

    #[test]
    fn parents_mode_walks_upwards() {
        let (scene, root, v1, _) = tree();
        let mut visitor = SearchVisitor::new(SearchBy::Name("root".into()));
        visitor.state_mut().mode = TraversalMode::Parents;
        scene.accept(v1, &mut visitor);
        assert_eq!(visitor.first(), Some(root));
    }

    #[test]
    fn info_visitor_indents_by_depth() {
        let (scene, root, _, _) = tree();
        let mut info = InfoVisitor::new(false);
        scene.accept(root, &mut info);
        let lines: Vec<&str> = info.output().lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Root 'root'"));
        assert!(lines[1].starts_with("  VolumeGroup 'channels'"));
        assert!(lines[2].starts_with("    VolumeData 'ch1'"));
    }

    #[test]
    fn value_update_visitor_propagates_from_source() {
        let (mut scene, root, v1, v2) = tree();
        scene.add_value(v1, "gamma 3d", 1.0f64);
        scene.add_value(v2, "gamma 3d", 1.0f64);
        let source = scene.create(EntityKind::Object, "preset");
        scene.add_value(source, "gamma 3d", 2.2f64);

        let changed = ValueUpdateVisitor::new(&["gamma 3d"]).apply(&mut scene, root, source);
        assert_eq!(changed, 2);
        assert_eq!(scene.get::<f64>(v2, "gamma 3d"), Some(2.2));
    }

    #[test]
    fn value_names_of_subtree_are_unique() {
        let (mut scene, root, v1, _) = tree();
        scene.add_value(v1, DISPLAY, true);
        let names = collect_value_names(&scene, root);
        assert_eq!(names.iter().filter(|n| n.as_str() == DISPLAY).count(), 1);
    }
}
