//! Analyse einer Frame-Folge über den Cache.
//!
//! Läuft typischerweise auf einem Worker-Thread. Der Abbruch wird
//! zwischen zwei Frames geprüft; bereits bearbeitete Frames bleiben im
//! Cache bzw. in der Quelle erhalten. Schlägt ein Frame fehl, wird nur
//! dieser übersprungen.

use std::ops::Range;

use super::analyzer::{CompAnalyzer, NO_DATA};
use super::cache::CacheQueue;
use super::cell::CelpList;
use super::generator::CompGenerator;
use super::track_map::TrackMap;
use super::volume::LabelVolume;
use crate::io::{EntryParams, Table};
use crate::shared::{CancelToken, Progress};

/// Ergebnis eines Frames.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSummary {
    pub frame: usize,
    pub components: usize,
    pub voxels: u64,
    pub status: String,
}

/// Ergebnis eines Laufs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    pub frames: Vec<FrameSummary>,
    /// Fehlgeschlagene Frames mit Fehlermeldung
    pub failed: Vec<(usize, String)>,
    pub cancelled: bool,
}

impl SequenceReport {
    /// Kennzahlen je Frame als Tabelle.
    pub fn params_table(&self) -> Table<EntryParams> {
        let mut table = Table::new("components");
        for summary in &self.frames {
            let mut params = EntryParams::new();
            params.set("frame", summary.frame as f32);
            params.set("components", summary.components as f32);
            params.set("voxels", summary.voxels as f32);
            table.push(params);
        }
        table
    }
}

/// Erzeugt, analysiert und verfolgt Components über mehrere Frames.
#[derive(Debug, Clone, Default)]
pub struct SequenceAnalyzer {
    pub generator: CompGenerator,
    pub analyzer: CompAnalyzer,
    /// IDs über die Zeit fortführen
    pub track: bool,
}

impl SequenceAnalyzer {
    /// Bearbeitet ein einzelnes Volumen und trägt es in die Track-Map ein.
    ///
    /// Label, die nicht in der Liste landen (Größengrenzen), werden gelöscht.
    pub fn process_volume(&self, frame: usize, vol: &mut LabelVolume, tracks: &mut TrackMap) -> CelpList {
        self.generator.label_connected(vol);
        let list = self.analyzer.analyze(vol);

        if self.track {
            let mapping = tracks.track_frame(frame, list);
            vol.remap_labels(|l| mapping.get(&l).copied().unwrap_or(0));
            tracks.frame(frame).cloned().unwrap_or_default()
        } else {
            vol.remap_labels(|l| if list.contains(l) { l } else { 0 });
            tracks.set_frame(frame, list.clone());
            list
        }
    }

    /// Läuft über `frames`; jeder Frame wird gelesen, bearbeitet, als
    /// Ganzes ersetzt, geschrieben und freigegeben.
    pub fn run(
        &self,
        cache: &CacheQueue,
        frames: Range<usize>,
        tracks: &mut TrackMap,
        progress: &mut Progress,
        cancel: &CancelToken,
    ) -> SequenceReport {
        let mut report = SequenceReport::default();
        let total = frames.len().max(1);

        for (n, frame) in frames.enumerate() {
            if cancel.is_cancelled() {
                log::info!("Analyse vor Frame {} abgebrochen", frame);
                report.cancelled = true;
                break;
            }
            progress.update((n * 100 / total) as i32, &format!("frame {}", frame));

            let result = cache.with_frame(frame, |c| {
                let vol = c.volume()?;
                let mut work = vol.clone();
                let list = self.process_volume(frame, &mut work, tracks);
                c.replace(work);
                Some(list)
            });

            match result {
                Ok(Some(list)) => report.frames.push(FrameSummary {
                    frame,
                    components: list.len(),
                    voxels: list.total_size(),
                    status: CompAnalyzer::summary(&list),
                }),
                Ok(None) => report.frames.push(FrameSummary {
                    frame,
                    components: 0,
                    voxels: 0,
                    status: NO_DATA.to_string(),
                }),
                Err(e) => {
                    log::warn!("Frame {} übersprungen: {}", frame, e);
                    report.failed.push((frame, e.to_string()));
                    continue;
                }
            }

            if let Err(e) = cache.release_frame(frame) {
                log::warn!("Frame {} konnte nicht gespeichert werden: {}", frame, e);
                report.failed.push((frame, e.to_string()));
            }
        }

        if !report.cancelled {
            progress.update(100, "done");
        }
        log::info!(
            "Analyse beendet: {} Frames, {} Fehler",
            report.frames.len(),
            report.failed.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::cache::MemoryVolSource;
    use crate::tracking::track_map::TrackParams;
    use std::sync::Arc;

    /// 12x1x1 mit Blöcken an den gegebenen Startpositionen (Länge 2).
    fn frame_with_blocks(starts: &[usize]) -> LabelVolume {
        let mut vol = LabelVolume::new(12, 1, 1);
        for &s in starts {
            vol.set_intensity(s, 1.0);
            vol.set_intensity(s + 1, 1.0);
        }
        vol
    }

    fn setup(frames: &[&[usize]]) -> (Arc<MemoryVolSource>, CacheQueue) {
        let source = Arc::new(MemoryVolSource::new());
        for (f, starts) in frames.iter().enumerate() {
            source.insert(f, frame_with_blocks(starts)).expect("Einfügen");
        }
        let queue = CacheQueue::new(source.clone(), 2);
        (source, queue)
    }

    fn tracking_analyzer() -> SequenceAnalyzer {
        SequenceAnalyzer {
            track: true,
            ..SequenceAnalyzer::default()
        }
    }

    #[test]
    fn ids_persist_across_frames() {
        let (source, queue) = setup(&[&[0, 6], &[1, 7], &[8]]);
        let mut tracks = TrackMap::new(TrackParams {
            radius: 2.0,
            size_weight: 0.0,
        });
        let report = tracking_analyzer().run(
            &queue,
            0..3,
            &mut tracks,
            &mut Progress::silent(),
            &CancelToken::new(),
        );

        assert!(report.failed.is_empty());
        assert_eq!(report.frames.len(), 3);
        // Block rechts behält ID 2 über alle Frames
        let last = source.snapshot(2).expect("Frame 2 geschrieben");
        assert_eq!(last.label(8), 2);
        let second = source.snapshot(1).expect("Frame 1 geschrieben");
        assert_eq!(second.label(1), 1);
        assert_eq!(second.label(7), 2);
        assert_eq!(tracks.track(0, 2), vec![(0, 2), (1, 2), (2, 2)]);
    }

    #[test]
    fn missing_frame_is_skipped() {
        let (_, queue) = setup(&[&[0]]);
        let mut tracks = TrackMap::new(TrackParams::default());
        let report = tracking_analyzer().run(
            &queue,
            0..2,
            &mut tracks,
            &mut Progress::silent(),
            &CancelToken::new(),
        );
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 1);
    }

    #[test]
    fn cancel_stops_between_frames() {
        let (_, queue) = setup(&[&[0], &[0], &[0]]);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut progress = Progress::new(move |p, _| {
            if p > 0 {
                trigger.cancel();
            }
        });
        let mut tracks = TrackMap::new(TrackParams::default());
        let report = tracking_analyzer().run(&queue, 0..3, &mut tracks, &mut progress, &cancel);
        assert!(report.cancelled);
        assert_eq!(report.frames.len(), 2);
        assert_eq!(tracks.frame_count(), 2);
    }

    #[test]
    fn report_converts_to_table() {
        let report = SequenceReport {
            frames: vec![FrameSummary {
                frame: 3,
                components: 2,
                voxels: 40,
                status: String::new(),
            }],
            ..SequenceReport::default()
        };
        let table = report.params_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table.records[0].get("voxels"), Some(40.0));
    }
}
