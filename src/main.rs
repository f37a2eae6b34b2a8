//! fluo-scene Demo.
//!
//! Baut eine kleine Szene über die Factories, zeigt die Root-Synchronisation
//! und verfolgt eine synthetische Frame-Folge auf einem Worker-Thread.

use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context};
use fluo_scene::core::names::{GAMMA_3D, SELECTED};
use fluo_scene::tracking::{
    CleanMode, ClusterMethod, MemoryVolSource, SequenceReport, VolCacheSource,
};
use fluo_scene::{
    CancelToken, Clusterizer, ComponentEditor, EntityKind, FactoryRegistry, InfoVisitor,
    LabelVolume, Progress, Scene, SceneOptions, SequenceAnalyzer, TrackMap,
};

/// Fortschritt des Tracking-Laufs (Prozent), vom Worker gemeldet.
const PROGRESS: &str = "progress";
/// Anzahl Components im letzten Frame.
const COMP_COUNT: &str = "comp count";

const FRAMES: usize = 6;

fn main() -> anyhow::Result<()> {
    let options = SceneOptions::load_from_file(&SceneOptions::config_path());

    env_logger::Builder::new()
        .filter_level(options.log_filter())
        .parse_default_env()
        .init();

    log::info!("fluo-scene v{} startet...", env!("CARGO_PKG_VERSION"));

    let mut scene = options.new_scene();
    let mut factories = FactoryRegistry::new(&mut scene);
    let (root, volumes) = build_scene(&mut scene, &mut factories)?;

    // ── Root-Synchronisation ────────────────────────────────────
    scene.set_value(root, SELECTED, true);
    for &v in &volumes {
        log::info!(
            "{}: selected = {:?}",
            scene.name(v).unwrap_or("?"),
            scene.get::<bool>(v, SELECTED)
        );
    }

    scene.sync_value(volumes[0], GAMMA_3D, volumes[1]);
    scene.set_value(volumes[0], GAMMA_3D, 2.2);
    log::info!(
        "gamma 3d synchronisiert: {:?}",
        scene.get::<f64>(volumes[1], GAMMA_3D)
    );

    // ── Tracking auf dem Worker ─────────────────────────────────
    let source = Arc::new(MemoryVolSource::new());
    for frame in 0..FRAMES {
        source
            .insert(frame, synthetic_frame(frame))
            .with_context(|| format!("Frame {} konnte nicht abgelegt werden", frame))?;
    }
    let dyn_source: Arc<dyn VolCacheSource> = source.clone();
    let queue = Arc::new(options.cache_queue(dyn_source));

    let target = volumes[0];
    scene.add_value(target, PROGRESS, 0i32);
    scene.add_value(target, COMP_COUNT, 0i32);

    let (report, tracks) = run_tracking(&scene, Arc::clone(&queue), &options, target)?;
    let applied = scene.drain_mailbox();
    log::info!("{} Wertänderungen aus dem Postfach übernommen", applied);

    // ── Nachbearbeitung ─────────────────────────────────────────
    let mut editor = ComponentEditor::new(options.track_params());
    let outcome = editor
        .edit_frame(&queue, 0, |ed, vol, list| {
            ed.clean(vol, list, CleanMode::BelowSize(2))
        })
        .context("Frame 0 konnte nicht bearbeitet werden")?;
    log::info!("Bereinigung Frame 0: {}", outcome.status);

    let mut params = options.cluster.clone();
    params.method = ClusterMethod::KMeans;
    if let Some(list) = tracks.frame(FRAMES - 1) {
        let clusters = Clusterizer::new(params).compute(list);
        log::info!("{} Cluster im letzten Frame", clusters.clusters.len());
        println!("{}", list.to_json()?);
    }

    print_report(&report);
    let mut info = InfoVisitor::new(true);
    scene.accept(root, &mut info);
    println!("{}", info.output());

    Ok(())
}

/// Root mit einer VolumeGroup und zwei Volumes als Kindern.
fn build_scene(
    scene: &mut Scene,
    factories: &mut FactoryRegistry,
) -> anyhow::Result<(fluo_scene::Handle, Vec<fluo_scene::Handle>)> {
    let root = factories
        .build(scene, EntityKind::Root)
        .ok_or_else(|| anyhow!("Root konnte nicht angelegt werden"))?;
    let group = factories
        .build(scene, EntityKind::VolumeGroup)
        .ok_or_else(|| anyhow!("Gruppe konnte nicht angelegt werden"))?;
    scene.add_child(root, group);

    let mut volumes = Vec::new();
    for _ in 0..2 {
        let v = factories
            .build(scene, EntityKind::Volume)
            .ok_or_else(|| anyhow!("Volume konnte nicht angelegt werden"))?;
        scene.add_child(root, v);
        volumes.push(v);
    }
    Ok((root, volumes))
}

fn run_tracking(
    scene: &Scene,
    queue: Arc<fluo_scene::CacheQueue>,
    options: &SceneOptions,
    target: fluo_scene::Handle,
) -> anyhow::Result<(SequenceReport, TrackMap)> {
    let mailbox = scene.mailbox();
    let params = options.track_params();
    let cancel = CancelToken::new();

    let worker = thread::spawn(move || {
        let analyzer = SequenceAnalyzer {
            track: true,
            ..SequenceAnalyzer::default()
        };
        let mut tracks = TrackMap::new(params);
        let progress_mail = mailbox.clone();
        let mut progress = Progress::new(move |percent, _| {
            progress_mail.post(target, PROGRESS, percent);
        });
        let report = analyzer.run(&queue, 0..FRAMES, &mut tracks, &mut progress, &cancel);
        if let Some(last) = report.frames.last() {
            mailbox.post(target, COMP_COUNT, last.components as i32);
        }
        (report, tracks)
    });

    worker
        .join()
        .map_err(|_| anyhow!("Tracking-Thread ist abgestürzt"))
}

/// Zwei Blöcke, die pro Frame um einen Voxel wandern; ab Frame 3
/// kommt ein dritter hinzu.
fn synthetic_frame(frame: usize) -> LabelVolume {
    let (nx, ny, nz) = (24, 8, 4);
    let mut vol = LabelVolume::new(nx, ny, nz);
    let mut block = |x0: usize, y0: usize| {
        for z in 0..2 {
            for y in y0..y0 + 2 {
                for x in x0..x0 + 3 {
                    if let Some(i) = vol.index(x, y, z) {
                        vol.set_intensity(i, 1.0);
                    }
                }
            }
        }
    };
    block(frame, 1);
    block(12 + frame / 2, 5);
    if frame >= 3 {
        block(20, 1);
    }
    vol
}

fn print_report(report: &SequenceReport) {
    for summary in &report.frames {
        println!("frame {}: {}", summary.frame, summary.status);
    }
    for (frame, error) in &report.failed {
        println!("frame {} failed: {}", frame, error);
    }
}
