//! Integrationstests für Component-Tracking: Zusammenführen, Editor,
//! Cache-Queue mit Datei-Quelle und Analyse über mehrere Frames.

use std::sync::Arc;

use approx::assert_relative_eq;
use glam::DVec3;

use fluo_scene::tracking::{
    CacheQueue, Cell, CelpList, CleanMode, CompAnalyzer, ComponentEditor, DiskVolSource,
    LabelVolume, MemoryVolSource, SequenceAnalyzer, TrackMap, TrackParams, VolCacheSource,
};
use fluo_scene::{CancelToken, Progress};

fn cell_from(id: u32, voxels: &[(f64, f64, f64)]) -> Cell {
    let mut cell = Cell::new(id);
    for &(x, y, z) in voxels {
        cell.inc(DVec3::new(x, y, z), 1.0 + x);
    }
    cell
}

fn three_cells() -> CelpList {
    [
        cell_from(1, &[(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)]),
        cell_from(2, &[(5.0, 1.0, 0.0), (5.0, 2.0, 0.0), (6.0, 2.0, 0.0)]),
        cell_from(3, &[(9.0, 9.0, 3.0)]),
    ]
    .into_iter()
    .collect()
}

#[test]
fn combine_is_independent_of_pairing_order() {
    let mut left = three_cells();
    let ab = left.combine_ids(&[1, 2]).expect("1 und 2 vorhanden");
    let abc_left = left.combine_ids(&[ab, 3]).expect("Zusammenführung");

    let mut right = three_cells();
    let bc = right.combine_ids(&[2, 3]).expect("2 und 3 vorhanden");
    let abc_right = right.combine_ids(&[bc, 1]).expect("Zusammenführung");

    let a = left.get(abc_left).expect("Ergebnis links");
    let b = right.get(abc_right).expect("Ergebnis rechts");
    assert_eq!(a.size(), 6);
    assert_eq!(a.size(), b.size());
    assert_relative_eq!(a.center().x, b.center().x, epsilon = 1e-9);
    assert_relative_eq!(a.center().y, b.center().y, epsilon = 1e-9);
    assert_relative_eq!(a.center().z, b.center().z, epsilon = 1e-9);
    assert_relative_eq!(a.mean(), b.mean(), epsilon = 1e-9);
}

#[test]
fn combine_two_of_three_components() {
    let mut list: CelpList = [(1, 10), (2, 20), (3, 30)]
        .into_iter()
        .map(|(id, size)| Cell::with_size(id, size, DVec3::splat(id as f64)))
        .collect();

    let mut editor = ComponentEditor::default();
    let outcome = editor.combine_id(&mut list, &[1, 3], None);

    assert_eq!(outcome.changed, 1);
    assert_eq!(list.len(), 2);
    let merged = list
        .iter()
        .find(|c| c.id() != 2)
        .expect("zusammengeführte Component");
    assert!([1, 3].contains(&merged.id()));
    assert_eq!(merged.size(), 40);
    let untouched = list.get(2).expect("Component 2 unverändert");
    assert_eq!(untouched.size(), 20);
    assert_eq!(editor.id(), merged.id());
}

#[test]
fn new_id_continues_the_nearest_previous_component() {
    let mut prev_vol = LabelVolume::new(10, 1, 1);
    prev_vol.set_labels(Some(vec![0, 0, 7, 7, 0, 0, 0, 0, 0, 0]));
    let prev = CompAnalyzer::default().analyze(&prev_vol);

    let mut vol = LabelVolume::new(10, 1, 1);
    {
        let mask = vol.ensure_mask();
        mask[3] = 255;
        mask[4] = 255;
    }
    let mut list = CelpList::new();
    let mut editor = ComponentEditor::new(TrackParams {
        radius: 3.0,
        size_weight: 0.0,
    });
    let outcome = editor.new_id(&mut vol, &mut list, false, Some(&prev));

    assert_eq!(outcome.changed, 2);
    assert_eq!(vol.label(3), 7);
    assert_eq!(vol.label(4), 7);
    assert!(list.contains(7));
    assert_eq!(editor.id(), 7);
}

#[test]
fn clean_below_size_keeps_remaining_ids() {
    let mut vol = LabelVolume::new(8, 1, 1);
    vol.set_labels(Some(vec![4, 0, 9, 9, 9, 0, 2, 2]));
    let mut list = CompAnalyzer::default().analyze(&vol);

    let mut editor = ComponentEditor::default();
    let outcome = editor.clean(&mut vol, &mut list, CleanMode::BelowSize(2));
    assert_eq!(outcome.changed, 1);
    assert_eq!(vol.labels().map(<[u32]>::to_vec), Some(vec![0, 0, 9, 9, 9, 0, 2, 2]));
    assert_eq!(list.ids().collect::<Vec<_>>(), vec![9, 2]);

    let again = editor.clean(&mut vol, &mut list, CleanMode::BelowSize(2));
    assert_eq!(again.changed, 0);
}

fn moving_block(frame: usize) -> LabelVolume {
    let mut vol = LabelVolume::new(16, 2, 1);
    for x in frame..frame + 3 {
        for y in 0..2 {
            if let Some(i) = vol.index(x, y, 0) {
                vol.set_intensity(i, 1.0);
            }
        }
    }
    vol
}

#[test]
fn sequence_on_disk_survives_a_fresh_queue() {
    let dir = std::env::temp_dir().join(format!("fluo_scene_seq_{}", std::process::id()));
    let source = Arc::new(DiskVolSource::new(&dir).expect("Verzeichnis"));
    for frame in 0..4 {
        source
            .write(frame, &moving_block(frame))
            .expect("Frame geschrieben");
    }

    let queue = CacheQueue::new(source.clone(), 2);
    let mut tracks = TrackMap::new(TrackParams {
        radius: 2.0,
        size_weight: 0.0,
    });
    let analyzer = SequenceAnalyzer {
        track: true,
        ..SequenceAnalyzer::default()
    };
    let report = analyzer.run(
        &queue,
        0..4,
        &mut tracks,
        &mut Progress::silent(),
        &CancelToken::new(),
    );
    assert!(report.failed.is_empty(), "Fehler: {:?}", report.failed);
    assert!(queue.is_empty());

    let fresh = CacheQueue::new(source, 1);
    for frame in 0..4 {
        let vol = fresh.read(frame).expect("Frame lesbar");
        let first = vol.index(frame, 0, 0).expect("im Volumen");
        assert_eq!(vol.label(first), 1, "Frame {} hat eine andere ID", frame);
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn worker_thread_shares_the_queue() {
    let source = Arc::new(MemoryVolSource::new());
    for frame in 0..3 {
        source.insert(frame, moving_block(frame)).expect("Einfügen");
    }
    let queue = Arc::new(CacheQueue::new(source.clone(), 2));

    let worker_queue = Arc::clone(&queue);
    let handle = std::thread::spawn(move || {
        let mut tracks = TrackMap::new(TrackParams::default());
        SequenceAnalyzer::default().run(
            &worker_queue,
            0..3,
            &mut tracks,
            &mut Progress::silent(),
            &CancelToken::new(),
        )
    });
    let report = handle.join().expect("Worker beendet");
    assert_eq!(report.frames.len(), 3);
    for frame in 0..3 {
        let vol = source.snapshot(frame).expect("geschrieben");
        assert!(vol.has_label());
    }
}
