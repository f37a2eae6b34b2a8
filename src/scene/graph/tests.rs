use super::*;
use crate::core::names::{SELECTED, SORT_METHOD};
use crate::core::{CopyOp, SortMethod, Value};
use std::collections::BTreeSet;

fn scene_with_group() -> (Scene, Handle) {
    let mut scene = Scene::new();
    let g = scene.create(EntityKind::Group, "g");
    (scene, g)
}

/// Eltern-Menge jedes Kindes == Menge der besitzenden Gruppen.
fn assert_back_refs_consistent(scene: &Scene) {
    for n in scene.handles() {
        let owners: BTreeSet<Handle> = scene
            .handles()
            .into_iter()
            .filter(|g| scene.contains_child(*g, n))
            .collect();
        let parents: BTreeSet<Handle> = scene.parents(n).into_iter().collect();
        assert_eq!(owners, parents, "Rückverweise von {} inkonsistent", n);
    }
}

#[test]
fn add_child_sets_back_reference_and_retains() {
    let (mut scene, g) = scene_with_group();
    let n = scene.create(EntityKind::Node, "n");
    assert!(scene.add_child(g, n));
    assert_eq!(scene.parents(n), vec![g]);
    assert_eq!(scene.ref_count(n), 2);
    assert_back_refs_consistent(&scene);
}

#[test]
fn dead_or_non_node_children_are_rejected() {
    let (mut scene, g) = scene_with_group();
    let obj = scene.create(EntityKind::Object, "obj");
    assert!(!scene.add_child(g, obj));

    let n = scene.create(EntityKind::Node, "n");
    scene.release(n);
    assert!(!scene.add_child(g, n));
    assert_eq!(scene.child_count(g), 0);
}

#[test]
fn cycles_are_rejected() {
    let (mut scene, g) = scene_with_group();
    let inner = scene.create(EntityKind::Group, "inner");
    assert!(scene.add_child(g, inner));
    assert!(!scene.add_child(inner, g));
    assert!(!scene.add_child(g, g));
    assert_back_refs_consistent(&scene);
}

#[test]
fn insert_past_end_appends() {
    let (mut scene, g) = scene_with_group();
    let a = scene.create(EntityKind::Node, "a");
    let b = scene.create(EntityKind::Node, "b");
    let c = scene.create(EntityKind::Node, "c");
    assert!(scene.insert_child(g, 10, a));
    assert!(scene.insert_child(g, 0, b));
    assert!(scene.insert_child(g, 1, c));
    assert_eq!(scene.children(g), &[b, c, a]);
}

#[test]
fn remove_children_clamps_and_validates() {
    let (mut scene, g) = scene_with_group();
    let nodes: Vec<Handle> = (0..4)
        .map(|i| scene.create(EntityKind::Node, &format!("n{}", i)))
        .collect();
    for n in &nodes {
        scene.add_child(g, *n);
    }
    assert!(!scene.remove_children(g, 4, 1));
    assert!(!scene.remove_children(g, 0, 0));
    assert!(scene.remove_children(g, 2, 100));
    assert_eq!(scene.children(g), &nodes[..2]);
    assert!(scene.parents(nodes[3]).is_empty());
    assert_back_refs_consistent(&scene);
}

#[test]
fn node_with_multiple_parents_survives_single_removal() {
    let mut scene = Scene::new();
    let g1 = scene.create(EntityKind::Group, "g1");
    let g2 = scene.create(EntityKind::Group, "g2");
    let n = scene.create(EntityKind::Volume, "v");
    scene.add_child(g1, n);
    scene.add_child(g2, n);
    scene.release(n);

    assert_eq!(scene.parent_count(n), 2);
    scene.remove_child(g1, n);
    assert!(scene.is_alive(n));
    assert_eq!(scene.parents(n), vec![g2]);

    scene.remove_child(g2, n);
    assert!(!scene.is_alive(n));
}

#[test]
fn set_and_replace_child_update_back_references() {
    let (mut scene, g) = scene_with_group();
    let a = scene.create(EntityKind::Node, "a");
    let b = scene.create(EntityKind::Node, "b");
    let c = scene.create(EntityKind::Node, "c");
    scene.add_child(g, a);

    assert!(!scene.set_child(g, 1, b));
    assert!(scene.set_child(g, 0, b));
    assert!(scene.parents(a).is_empty());
    assert_eq!(scene.parents(b), vec![g]);

    assert!(!scene.replace_child(g, a, c));
    assert!(scene.replace_child(g, b, c));
    assert_eq!(scene.children(g), &[c]);
    assert_back_refs_consistent(&scene);
}

#[test]
fn duplicate_child_keeps_back_reference_until_last_copy_removed() {
    let (mut scene, g) = scene_with_group();
    let n = scene.create(EntityKind::Node, "n");
    scene.add_child(g, n);
    scene.add_child(g, n);
    scene.remove_children(g, 0, 1);
    assert_eq!(scene.parents(n), vec![g]);
    scene.remove_children(g, 0, 1);
    assert!(scene.parents(n).is_empty());
}

#[test]
fn destroyed_group_leaves_no_stale_parent() {
    let (mut scene, g) = scene_with_group();
    let n = scene.create(EntityKind::Node, "n");
    scene.add_child(g, n);
    scene.release(g);
    assert!(!scene.is_alive(g));
    assert!(scene.is_alive(n));
    assert!(scene.parents(n).is_empty());
}

#[test]
fn remove_parent_refuses_while_owned() {
    let (mut scene, g) = scene_with_group();
    let n = scene.create(EntityKind::Node, "n");
    scene.add_child(g, n);
    assert!(!scene.remove_parent(n, g));
    assert_eq!(scene.parent_count(n), 1);
}

#[test]
fn root_pushes_sync_values_to_children() {
    let mut scene = Scene::new();
    let root = scene.create(EntityKind::Root, "root");
    scene.add_value(root, SORT_METHOD, SortMethod::SortNone);
    scene.add_value(root, SELECTED, false);

    let g = scene.create(EntityKind::Group, "g");
    scene.add_value(g, SORT_METHOD, SortMethod::SortAscend);
    assert!(scene.add_child(root, g));

    // fehlender Wert wird angelegt, vorhandener übernommen
    assert_eq!(scene.get::<bool>(g, SELECTED), Some(false));
    assert_eq!(scene.get_value(g, SORT_METHOD), Some(&Value::Int(0)));

    scene.set_value(root, SELECTED, true);
    assert_eq!(scene.get::<bool>(g, SELECTED), Some(true));

    assert!(scene.remove_children(root, 0, 1));
    scene.set_value(root, SELECTED, false);
    assert_eq!(scene.get::<bool>(g, SELECTED), Some(true));
}

#[test]
fn root_value_added_later_reaches_existing_children() {
    let mut scene = Scene::new();
    let root = scene.create(EntityKind::Root, "root");
    let g = scene.create(EntityKind::Group, "g");
    scene.add_child(root, g);
    assert!(!scene.has_value(g, SELECTED));

    scene.add_value(root, SELECTED, true);
    assert_eq!(scene.get::<bool>(g, SELECTED), Some(true));
}

#[test]
fn root_opt_out_stops_sync_for_one_child() {
    let mut scene = Scene::new();
    let root = scene.create(EntityKind::Root, "root");
    scene.add_value(root, SELECTED, false);
    let a = scene.create(EntityKind::Group, "a");
    let b = scene.create(EntityKind::Group, "b");
    scene.add_child(root, a);
    scene.add_child(root, b);

    assert!(scene.root_opt_out(root, b, SELECTED));
    scene.set_value(root, SELECTED, true);
    assert_eq!(scene.get::<bool>(a, SELECTED), Some(true));
    assert_eq!(scene.get::<bool>(b, SELECTED), Some(false));

    assert!(scene.root_opt_in(root, b, SELECTED));
    assert_eq!(scene.get::<bool>(b, SELECTED), Some(true));
}

#[test]
fn deep_clone_of_root_keeps_child_opt_out() {
    let mut scene = Scene::new();
    let root = scene.create(EntityKind::Root, "root");
    scene.add_value(root, SELECTED, false);
    let a = scene.create(EntityKind::Group, "a");
    let b = scene.create(EntityKind::Group, "b");
    scene.add_child(root, a);
    scene.add_child(root, b);
    assert!(scene.root_opt_out(root, b, SELECTED));
    scene.set_value(b, SELECTED, true);

    let copy = scene
        .clone_entity(root, CopyOp::DEEP_COPY_ALL)
        .expect("Klon erwartet");
    let ca = scene.child(copy, 0).expect("Kopie von a");
    let cb = scene.child(copy, 1).expect("Kopie von b");
    assert_ne!(cb, b);
    assert!(scene.root_opted_out(copy, cb, SELECTED));
    assert!(!scene.root_opted_out(copy, b, SELECTED));
    assert_eq!(scene.get::<bool>(cb, SELECTED), Some(true));

    scene.set_value(copy, SELECTED, true);
    scene.set_value(copy, SELECTED, false);
    assert_eq!(scene.get::<bool>(ca, SELECTED), Some(false));
    assert_eq!(scene.get::<bool>(cb, SELECTED), Some(true));
    assert_eq!(scene.get::<bool>(b, SELECTED), Some(true));
}

#[test]
fn opt_out_ends_when_child_leaves_root() {
    let mut scene = Scene::new();
    let root = scene.create(EntityKind::Root, "root");
    scene.add_value(root, SELECTED, false);
    let stranger = scene.create(EntityKind::Group, "stranger");
    let b = scene.create(EntityKind::Group, "b");
    scene.add_child(root, b);

    assert!(!scene.root_opt_out(root, stranger, SELECTED));
    assert!(scene.root_opt_out(root, b, SELECTED));

    assert!(scene.remove_child(root, b));
    assert!(!scene.root_opted_out(root, b, SELECTED));

    assert!(scene.add_child(root, b));
    scene.set_value(root, SELECTED, true);
    assert_eq!(scene.get::<bool>(b, SELECTED), Some(true));
}
