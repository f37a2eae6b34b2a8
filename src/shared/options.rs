//! Zentrale Konfiguration für `fluo_scene`.
//!
//! `SceneOptions` enthält alle zur Laufzeit änderbaren Werte.
//! Die `const`-Werte bleiben als Fallback/Default erhalten.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::Undoable;
use crate::scene::{Scene, DEFAULT_MAX_DEPTH};
use crate::tracking::{CacheQueue, ClusterParams, TrackParams, VolCacheSource, DEFAULT_QUEUE_SIZE};

// ── Undo ────────────────────────────────────────────────────────────

/// Mindestabstand zwischen zwei Undo-Schritten in Sekunden.
pub const UNDO_INTERVAL: f64 = 0.3;
/// Mindestabstand für Texteingaben in Sekunden.
pub const TEXT_UNDO_INTERVAL: f64 = 1.0;
/// Maximale Anzahl gespeicherter Undo-Schritte.
pub const UNDO_DEPTH: usize = 64;

// ── Tracking ────────────────────────────────────────────────────────

/// Suchradius der Zuordnung zwischen zwei Frames (Voxel).
pub const TRACK_RADIUS: f64 = 10.0;

/// Konfigurierbare Werte, persistent als TOML gespeichert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneOptions {
    // ── Undo ─────────────────────────────────────────────────────
    /// Mindestabstand zwischen Undo-Schritten (Sekunden)
    pub undo_interval: f64,
    /// Mindestabstand für Texteingaben (Sekunden)
    #[serde(default = "default_text_undo_interval")]
    pub text_undo_interval: f64,
    /// Maximale Undo-Tiefe
    pub undo_depth: usize,

    // ── Tracking ─────────────────────────────────────────────────
    /// Anzahl gleichzeitig geladener Frames
    pub cache_queue_size: usize,
    /// Suchradius der Zuordnung
    pub track_radius: f64,
    /// Gewicht des Größenunterschieds (0 = nur Abstand)
    #[serde(default)]
    pub track_size_weight: f64,

    // ── Werte / Ereignisse ───────────────────────────────────────
    /// Exakter Wertvergleich statt Toleranz
    #[serde(default)]
    pub precise: bool,
    /// Obergrenze der Kaskadentiefe
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    // ── Logging ──────────────────────────────────────────────────
    /// Log-Level (`error`, `warn`, `info`, `debug`, `trace`)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // ── Clustering ───────────────────────────────────────────────
    /// Standardwerte für Clustering
    #[serde(default)]
    pub cluster: ClusterParams,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            undo_interval: UNDO_INTERVAL,
            text_undo_interval: TEXT_UNDO_INTERVAL,
            undo_depth: UNDO_DEPTH,
            cache_queue_size: DEFAULT_QUEUE_SIZE,
            track_radius: TRACK_RADIUS,
            track_size_weight: 0.0,
            cluster: ClusterParams::default(),
            precise: false,
            max_depth: DEFAULT_MAX_DEPTH,
            log_level: default_log_level(),
        }
    }
}

/// Serde-Default für `text_undo_interval` (Abwärtskompatibilität).
fn default_text_undo_interval() -> f64 {
    TEXT_UNDO_INTERVAL
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SceneOptions {
    /// Lädt Optionen aus einer TOML-Datei. Bei Fehler: Standardwerte.
    pub fn load_from_file(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(opts) => {
                    log::info!("Optionen geladen aus: {}", path.display());
                    opts
                }
                Err(e) => {
                    log::warn!("Optionen-Datei fehlerhaft, verwende Standardwerte: {}", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("Keine Optionen-Datei gefunden, verwende Standardwerte");
                Self::default()
            }
        }
    }

    /// Speichert Optionen als TOML-Datei.
    pub fn save_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        log::info!("Optionen gespeichert nach: {}", path.display());
        Ok(())
    }

    /// Ermittelt den Pfad zur Optionen-Datei neben der Binary.
    pub fn config_path() -> std::path::PathBuf {
        std::env::current_exe()
            .unwrap_or_else(|_| std::path::PathBuf::from("fluo_scene"))
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join("fluo_scene.toml")
    }

    /// Log-Filter aus `log_level`; unbekannte Angaben ergeben `Info`.
    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    /// Leere Szene mit Vergleichsmodus und Kaskadentiefe aus den Optionen.
    pub fn new_scene(&self) -> Scene {
        Scene::with_settings(self.precise, self.max_depth)
    }

    pub fn track_params(&self) -> TrackParams {
        TrackParams {
            radius: self.track_radius,
            size_weight: self.track_size_weight,
        }
    }

    pub fn cache_queue(&self, source: std::sync::Arc<dyn VolCacheSource>) -> CacheQueue {
        CacheQueue::new(source, self.cache_queue_size)
    }

    /// Undo-Verlauf für Werte; `text` wählt das längere Intervall.
    pub fn undoable<T: Clone + PartialEq>(&self, initial: T, text: bool) -> Undoable<T> {
        let secs = if text { self.text_undo_interval } else { self.undo_interval };
        Undoable::new(initial, Duration::from_secs_f64(secs.max(0.0)), self.undo_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_toml_round_trip() {
        let opts = SceneOptions::default();
        let text = toml::to_string_pretty(&opts).expect("Serialisierung");
        let back: SceneOptions = toml::from_str(&text).expect("Deserialisierung");
        assert_eq!(back, opts);
    }

    #[test]
    fn old_files_fill_missing_fields() {
        let text = "undo_interval = 0.5\nundo_depth = 10\ncache_queue_size = 2\ntrack_radius = 4.0\n";
        let opts: SceneOptions = toml::from_str(text).expect("ältere Datei lesbar");
        assert_eq!(opts.undo_depth, 10);
        assert_eq!(opts.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(opts.text_undo_interval, TEXT_UNDO_INTERVAL);
        assert_eq!(opts.cluster, ClusterParams::default());
        assert_eq!(opts.log_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("fluo_scene_options_fehlt.toml");
        let _ = std::fs::remove_file(&path);
        assert_eq!(SceneOptions::load_from_file(&path), SceneOptions::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!(
            "fluo_scene_options_kaputt_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "undo_depth = \"viele\"").expect("Schreiben");
        assert_eq!(SceneOptions::load_from_file(&path), SceneOptions::default());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!(
            "fluo_scene_options_{}.toml",
            std::process::id()
        ));
        let opts = SceneOptions {
            track_radius: 3.5,
            precise: true,
            log_level: "debug".into(),
            ..SceneOptions::default()
        };
        opts.save_to_file(&path).expect("Speichern");
        let loaded = SceneOptions::load_from_file(&path);
        assert_eq!(loaded, opts);
        assert_eq!(loaded.log_filter(), log::LevelFilter::Debug);
        assert!(loaded.new_scene().is_precise());
        let _ = std::fs::remove_file(&path);
    }
}
