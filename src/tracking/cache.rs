//! Cache der Label-Volumen pro Zeitpunkt (Read-Through, Write-Back).
//!
//! Die Queue ist die einzige zwischen Threads geteilte Ressource des
//! Tracking. Jeder Frame hat eine eigene Sperre: pro Frame ist immer nur
//! ein Leser oder Schreiber aktiv, verschiedene Frames laufen unabhängig.
//! Geänderte Volumen werden beim Verdrängen vollständig in die Quelle
//! geschrieben, bevor der Slot verschwindet.
//!
//! Innerhalb einer `with_frame`-Closure darf die Queue nicht erneut
//! benutzt werden.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use glam::DVec3;

use super::volume::LabelVolume;
use crate::io::{BinaryFile, BinaryReader, BinaryWriter, FileError};

/// Standardgröße der Queue beim Tracking.
pub const DEFAULT_QUEUE_SIZE: usize = 4;

/// Fehler beim Zugriff auf den Volumen-Cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Frame {0} ist in der Quelle nicht vorhanden")]
    Missing(usize),
    #[error("Frame {frame}: Dateifehler")]
    File {
        frame: usize,
        #[source]
        source: FileError,
    },
    #[error("Frame {frame}: Daten beschädigt ({reason})")]
    Corrupt { frame: usize, reason: String },
    #[error("Cache-Sperre vergiftet")]
    Poisoned,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, CacheError> {
    mutex.lock().map_err(|_| CacheError::Poisoned)
}

// ── Quellen ─────────────────────────────────────────────────────────

/// Externer Speicher hinter der Queue.
pub trait VolCacheSource: Send + Sync {
    /// Liest das vollständige Volumen eines Frames.
    fn read(&self, frame: usize) -> Result<LabelVolume, CacheError>;
    /// Ersetzt das Volumen eines Frames vollständig.
    fn write(&self, frame: usize, volume: &LabelVolume) -> Result<(), CacheError>;
}

/// Quelle im Arbeitsspeicher (Tests, Demo).
#[derive(Default)]
pub struct MemoryVolSource {
    frames: Mutex<HashMap<usize, LabelVolume>>,
    writes: AtomicUsize,
}

impl MemoryVolSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, frame: usize, volume: LabelVolume) -> Result<(), CacheError> {
        lock(&self.frames)?.insert(frame, volume);
        Ok(())
    }

    /// Kopie des gespeicherten Volumens (ohne den Cache).
    pub fn snapshot(&self, frame: usize) -> Option<LabelVolume> {
        lock(&self.frames).ok()?.get(&frame).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl VolCacheSource for MemoryVolSource {
    fn read(&self, frame: usize) -> Result<LabelVolume, CacheError> {
        lock(&self.frames)?
            .get(&frame)
            .cloned()
            .ok_or(CacheError::Missing(frame))
    }

    fn write(&self, frame: usize, volume: &LabelVolume) -> Result<(), CacheError> {
        lock(&self.frames)?.insert(frame, volume.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

const TAG_LABEL_VOLUME: u32 = 0x4c56_4f4c;
const FIELD_DIMS: u32 = 1;
const FIELD_SPACING: u32 = 2;
const FIELD_DATA: u32 = 3;
const FIELD_HAS_MASK: u32 = 4;
const FIELD_MASK: u32 = 5;
const FIELD_HAS_LABEL: u32 = 6;
const FIELD_LABEL: u32 = 7;

fn write_volume<W: Write>(w: &mut BinaryWriter<W>, vol: &LabelVolume) -> Result<(), FileError> {
    let (nx, ny, nz) = vol.dims();
    w.write_tag(TAG_LABEL_VOLUME)?;
    w.write_vector(FIELD_DIMS, &[nx as u64, ny as u64, nz as u64])?;
    w.write_vector(FIELD_SPACING, &vol.spacing.to_array())?;
    w.write_vector(FIELD_DATA, vol.data())?;
    w.write_value(FIELD_HAS_MASK, &vol.has_mask())?;
    if let Some(mask) = vol.mask() {
        w.write_vector(FIELD_MASK, mask)?;
    }
    w.write_value(FIELD_HAS_LABEL, &vol.has_label())?;
    if let Some(labels) = vol.labels() {
        w.write_vector(FIELD_LABEL, labels)?;
    }
    Ok(())
}

fn read_volume<R: Read>(r: &mut BinaryReader<R>) -> Result<LabelVolume, FileError> {
    r.expect_tag(TAG_LABEL_VOLUME)?;
    let dims: Vec<u64> = r.read_vector(FIELD_DIMS)?;
    let spacing: Vec<f64> = r.read_vector(FIELD_SPACING)?;
    let data: Vec<f32> = r.read_vector(FIELD_DATA)?;
    let mask = if r.read_value::<bool>(FIELD_HAS_MASK)? {
        Some(r.read_vector::<u8>(FIELD_MASK)?)
    } else {
        None
    };
    let label = if r.read_value::<bool>(FIELD_HAS_LABEL)? {
        Some(r.read_vector::<u32>(FIELD_LABEL)?)
    } else {
        None
    };

    let (&[nx, ny, nz], &[sx, sy, sz]) = (dims.as_slice(), spacing.as_slice()) else {
        return Err(FileError::Invalid {
            field: "dims",
            reason: format!("{} Dimensionen, {} Abstände", dims.len(), spacing.len()),
        });
    };
    LabelVolume::from_parts(
        (nx as usize, ny as usize, nz as usize),
        DVec3::new(sx, sy, sz),
        data,
        mask,
        label,
    )
    .ok_or(FileError::Invalid {
        field: "data",
        reason: "Kanallängen passen nicht zu den Dimensionen".to_string(),
    })
}

/// Quelle auf der Festplatte, eine Datei pro Frame.
///
/// Schreiben erfolgt über eine temporäre Datei und `rename`, ein Frame
/// ist also entweder alt oder neu, nie halb geschrieben.
pub struct DiskVolSource {
    dir: PathBuf,
}

impl DiskVolSource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::File {
            frame: 0,
            source: FileError::Io(e),
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, frame: usize) -> PathBuf {
        self.dir.join(format!("frame_{:04}.lbl", frame))
    }
}

impl VolCacheSource for DiskVolSource {
    fn read(&self, frame: usize) -> Result<LabelVolume, CacheError> {
        let path = self.path(frame);
        if !path.exists() {
            return Err(CacheError::Missing(frame));
        }
        let mut reader =
            BinaryFile::open(&path).map_err(|source| CacheError::File { frame, source })?;
        read_volume(&mut reader).map_err(|source| match source {
            FileError::Invalid { reason, .. } => CacheError::Corrupt { frame, reason },
            source => CacheError::File { frame, source },
        })
    }

    fn write(&self, frame: usize, volume: &LabelVolume) -> Result<(), CacheError> {
        let path = self.path(frame);
        let tmp = path.with_extension("lbl.tmp");
        let file_err = |source| CacheError::File { frame, source };

        let mut writer = BinaryFile::create(&tmp).map_err(file_err)?;
        write_volume(&mut writer, volume).map_err(file_err)?;
        writer.finish().map_err(file_err)?;
        fs::rename(&tmp, &path).map_err(|e| file_err(FileError::Io(e)))?;
        log::debug!("Frame {} geschrieben nach {}", frame, path.display());
        Ok(())
    }
}

// ── Cache ───────────────────────────────────────────────────────────

/// Inhalt eines Slots: das Volumen eines Frames und sein Änderungsstatus.
#[derive(Debug)]
pub struct VolCache {
    frame: usize,
    volume: Option<LabelVolume>,
    modified: bool,
}

impl VolCache {
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn volume(&self) -> Option<&LabelVolume> {
        self.volume.as_ref()
    }

    /// Änderbarer Zugriff; markiert den Frame nicht automatisch.
    pub fn volume_mut(&mut self) -> Option<&mut LabelVolume> {
        self.volume.as_mut()
    }

    /// Ersetzt das Volumen vollständig und markiert den Frame als geändert.
    pub fn replace(&mut self, volume: LabelVolume) {
        self.volume = Some(volume);
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }
}

struct CacheSlot {
    frame: usize,
    cache: Mutex<VolCache>,
    in_use: AtomicUsize,
    protected: AtomicBool,
}

impl CacheSlot {
    fn new(frame: usize) -> Self {
        Self {
            frame,
            cache: Mutex::new(VolCache {
                frame,
                volume: None,
                modified: false,
            }),
            in_use: AtomicUsize::new(0),
            protected: AtomicBool::new(false),
        }
    }

    fn evictable(&self) -> bool {
        self.in_use.load(Ordering::SeqCst) == 0 && !self.protected.load(Ordering::SeqCst)
    }
}

/// Zähler der Queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub reads: usize,
    pub writes: usize,
    pub evictions: usize,
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicUsize,
    misses: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    evictions: AtomicUsize,
}

/// LRU-Queue der residenten Frames.
pub struct CacheQueue {
    source: Arc<dyn VolCacheSource>,
    max_size: AtomicUsize,
    slots: Mutex<VecDeque<Arc<CacheSlot>>>,
    stats: AtomicStats,
}

impl CacheQueue {
    pub fn new(source: Arc<dyn VolCacheSource>, max_size: usize) -> Self {
        Self {
            source,
            max_size: AtomicUsize::new(max_size.max(1)),
            slots: Mutex::new(VecDeque::new()),
            stats: AtomicStats::default(),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::SeqCst)
    }

    /// Setzt die Größe und verdrängt bei Bedarf.
    pub fn set_max_size(&self, max_size: usize) -> Result<(), CacheError> {
        self.max_size.store(max_size.max(1), Ordering::SeqCst);
        let mut slots = lock(&self.slots)?;
        self.evict_locked(&mut slots);
        Ok(())
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Residente Frames, ältester zuerst.
    pub fn frames(&self) -> Vec<usize> {
        lock(&self.slots)
            .map(|s| s.iter().map(|slot| slot.frame).collect())
            .unwrap_or_default()
    }

    pub fn is_resident(&self, frame: usize) -> bool {
        self.frames().contains(&frame)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::SeqCst),
            misses: self.stats.misses.load(Ordering::SeqCst),
            reads: self.stats.reads.load(Ordering::SeqCst),
            writes: self.stats.writes.load(Ordering::SeqCst),
            evictions: self.stats.evictions.load(Ordering::SeqCst),
        }
    }

    /// Reserviert den Slot eines Frames (legt ihn bei `create` an).
    fn pin(&self, frame: usize, create: bool) -> Result<Option<Arc<CacheSlot>>, CacheError> {
        let mut slots = lock(&self.slots)?;
        if let Some(pos) = slots.iter().position(|s| s.frame == frame) {
            self.stats.hits.fetch_add(1, Ordering::SeqCst);
            let slot = slots.remove(pos).ok_or(CacheError::Poisoned)?;
            slot.in_use.fetch_add(1, Ordering::SeqCst);
            slots.push_back(Arc::clone(&slot));
            return Ok(Some(slot));
        }
        if !create {
            return Ok(None);
        }
        self.stats.misses.fetch_add(1, Ordering::SeqCst);
        let slot = Arc::new(CacheSlot::new(frame));
        slot.in_use.fetch_add(1, Ordering::SeqCst);
        slots.push_back(Arc::clone(&slot));
        self.evict_locked(&mut slots);
        Ok(Some(slot))
    }

    /// Gibt einen reservierten Slot frei. Leere Slots (fehlgeschlagenes
    /// Lesen) werden entfernt.
    fn unpin(&self, slot: &Arc<CacheSlot>) -> Result<(), CacheError> {
        slot.in_use.fetch_sub(1, Ordering::SeqCst);
        let mut slots = lock(&self.slots)?;
        if slot.in_use.load(Ordering::SeqCst) == 0 && lock(&slot.cache)?.volume.is_none() {
            slots.retain(|s| !Arc::ptr_eq(s, slot));
        }
        self.evict_locked(&mut slots);
        Ok(())
    }

    fn flush_slot(&self, slot: &CacheSlot) -> Result<bool, CacheError> {
        let mut cache = lock(&slot.cache)?;
        if !cache.modified {
            return Ok(false);
        }
        if let Some(volume) = cache.volume.as_ref() {
            self.source.write(slot.frame, volume)?;
            self.stats.writes.fetch_add(1, Ordering::SeqCst);
        }
        cache.modified = false;
        Ok(true)
    }

    /// Verdrängt die ältesten freien Slots, bis die Größe passt.
    /// Reservierte oder geschützte Slots bleiben; die Queue darf dann
    /// vorübergehend größer sein.
    fn evict_locked(&self, slots: &mut VecDeque<Arc<CacheSlot>>) {
        let max = self.max_size();
        while slots.len() > max {
            let Some(pos) = slots.iter().position(|s| s.evictable()) else {
                break;
            };
            let slot = Arc::clone(&slots[pos]);
            match self.flush_slot(&slot) {
                Ok(_) => {
                    slots.remove(pos);
                    self.stats.evictions.fetch_add(1, Ordering::SeqCst);
                    log::trace!("Frame {} aus dem Cache verdrängt", slot.frame);
                }
                Err(e) => {
                    log::warn!("Frame {} konnte nicht geschrieben werden: {}", slot.frame, e);
                    break;
                }
            }
        }
    }

    /// Führt `f` mit dem residenten Volumen eines Frames aus.
    ///
    /// Fehlt der Frame im Cache, wird er blockierend aus der Quelle
    /// gelesen. Innerhalb von `f` ist das Volumen immer vorhanden.
    pub fn with_frame<R>(
        &self,
        frame: usize,
        f: impl FnOnce(&mut VolCache) -> R,
    ) -> Result<R, CacheError> {
        let slot = self.pin(frame, true)?.ok_or(CacheError::Missing(frame))?;
        let result = (|| -> Result<R, CacheError> {
            let mut cache = lock(&slot.cache)?;
            if cache.volume.is_none() {
                let volume = self.source.read(frame)?;
                self.stats.reads.fetch_add(1, Ordering::SeqCst);
                cache.volume = Some(volume);
                cache.modified = false;
            }
            Ok(f(&mut cache))
        })();
        self.unpin(&slot)?;
        result
    }

    /// Kopie des Volumens eines Frames (Read-Through).
    pub fn read(&self, frame: usize) -> Result<LabelVolume, CacheError> {
        self.with_frame(frame, |cache| cache.volume.clone())?
            .ok_or(CacheError::Missing(frame))
    }

    /// Ersetzt das Volumen eines Frames, ohne vorher zu lesen.
    pub fn write(&self, frame: usize, volume: LabelVolume) -> Result<(), CacheError> {
        let slot = self.pin(frame, true)?.ok_or(CacheError::Missing(frame))?;
        let result = lock(&slot.cache).map(|mut cache| cache.replace(volume));
        self.unpin(&slot)?;
        result
    }

    /// Setzt den Änderungsstatus eines residenten Frames.
    pub fn set_modified(&self, frame: usize, modified: bool) -> Result<bool, CacheError> {
        let Some(slot) = self.pin(frame, false)? else {
            return Ok(false);
        };
        let result = lock(&slot.cache).map(|mut cache| cache.set_modified(modified));
        self.unpin(&slot)?;
        result.map(|_| true)
    }

    /// Schützt einen residenten Frame vor Verdrängung.
    pub fn protect(&self, frame: usize) -> bool {
        self.set_protected(frame, true)
    }

    pub fn unprotect(&self, frame: usize) -> bool {
        self.set_protected(frame, false)
    }

    fn set_protected(&self, frame: usize, protected: bool) -> bool {
        let Ok(mut slots) = lock(&self.slots) else {
            return false;
        };
        let Some(slot) = slots.iter().find(|s| s.frame == frame) else {
            log::debug!("Frame {} nicht resident, Schutz unverändert", frame);
            return false;
        };
        slot.protected.store(protected, Ordering::SeqCst);
        if !protected {
            self.evict_locked(&mut slots);
        }
        true
    }

    pub fn is_protected(&self, frame: usize) -> bool {
        lock(&self.slots)
            .map(|s| {
                s.iter()
                    .any(|slot| slot.frame == frame && slot.protected.load(Ordering::SeqCst))
            })
            .unwrap_or(false)
    }

    /// Schreibt einen geänderten Frame in die Quelle, ohne ihn zu verdrängen.
    pub fn flush(&self, frame: usize) -> Result<bool, CacheError> {
        let Some(slot) = self.pin(frame, false)? else {
            return Ok(false);
        };
        let result = self.flush_slot(&slot);
        self.unpin(&slot)?;
        result
    }

    /// Schreibt einen Frame zurück und entfernt ihn aus dem Cache.
    ///
    /// Liefert `false`, wenn der Frame nicht resident ist oder gerade
    /// benutzt wird.
    pub fn clear(&self, frame: usize) -> Result<bool, CacheError> {
        let mut slots = lock(&self.slots)?;
        let Some(pos) = slots.iter().position(|s| s.frame == frame) else {
            return Ok(false);
        };
        let slot = Arc::clone(&slots[pos]);
        if slot.in_use.load(Ordering::SeqCst) > 0 {
            log::debug!("Frame {} wird benutzt, nicht entfernt", frame);
            return Ok(false);
        }
        self.flush_slot(&slot)?;
        slots.remove(pos);
        Ok(true)
    }

    /// Schreibt alle geänderten Frames zurück und leert den Cache.
    pub fn clear_all(&self) -> Result<(), CacheError> {
        let mut slots = lock(&self.slots)?;
        let mut kept = VecDeque::new();
        while let Some(slot) = slots.pop_front() {
            if slot.in_use.load(Ordering::SeqCst) > 0 {
                kept.push_back(slot);
                continue;
            }
            if let Err(e) = self.flush_slot(&slot) {
                kept.push_back(slot);
                kept.extend(slots.drain(..));
                *slots = kept;
                return Err(e);
            }
        }
        *slots = kept;
        Ok(())
    }

    /// Nach abgeschlossener Bearbeitung: geänderte Daten schreiben und
    /// den Frame freigeben, sofern er nicht geschützt ist.
    pub fn release_frame(&self, frame: usize) -> Result<(), CacheError> {
        if self.is_protected(frame) {
            self.flush(frame)?;
        } else {
            self.clear(frame)?;
        }
        Ok(())
    }
}
