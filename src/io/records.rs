//! Datensätze für Histogramme und Parameter sowie Tabellen daraus.

use std::io::{Read, Write};

use super::file::{BinaryReader, BinaryWriter, FileError};

/// Typ-Tags der Datensätze.
pub const TAG_ENTRY_HIST: u32 = 0x4849_5354;
pub const TAG_ENTRY_PARAMS: u32 = 0x5041_524d;
pub const TAG_TABLE: u32 = 0x5441_424c;

// Feld-Tags
const FIELD_POPULATION: u32 = 1;
const FIELD_MIN: u32 = 2;
const FIELD_MAX: u32 = 3;
const FIELD_BINS: u32 = 4;
const FIELD_NAMES: u32 = 1;
const FIELD_VALUES: u32 = 2;
const FIELD_TABLE_NAME: u32 = 1;
const FIELD_TABLE_COUNT: u32 = 2;

/// Ein Datensatz im Tag-Format.
pub trait Record: Sized {
    const TYPE_TAG: u32;

    /// Schreibt Typ-Tag und Felder.
    fn write<W: Write>(&self, w: &mut BinaryWriter<W>) -> Result<(), FileError>;

    /// Liest die Felder; das Typ-Tag wurde bereits gelesen.
    fn read_fields<R: Read>(r: &mut BinaryReader<R>) -> Result<Self, FileError>;

    /// Liest Typ-Tag und Felder.
    fn read<R: Read>(r: &mut BinaryReader<R>) -> Result<Self, FileError> {
        r.expect_tag(Self::TYPE_TAG)?;
        Self::read_fields(r)
    }
}

// ── EntryHist ───────────────────────────────────────────────────────

/// Histogramm über einen Wertebereich.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntryHist {
    pub population: u64,
    pub min: f32,
    pub max: f32,
    pub bins: Vec<f32>,
}

impl EntryHist {
    /// Baut ein Histogramm mit `bin_count` Klassen über `[min, max]`.
    pub fn from_samples(samples: &[f32], bin_count: usize, min: f32, max: f32) -> Self {
        let mut bins = vec![0.0f32; bin_count];
        let range = max - min;
        let mut population = 0u64;
        if bin_count > 0 && range > 0.0 {
            for &s in samples {
                if s < min || s > max {
                    continue;
                }
                let idx = (((s - min) / range) * bin_count as f32) as usize;
                bins[idx.min(bin_count - 1)] += 1.0;
                population += 1;
            }
        }
        Self {
            population,
            min,
            max,
            bins,
        }
    }

    /// Index der stärksten Klasse (bei Gleichstand die erste).
    pub fn peak(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &count) in self.bins.iter().enumerate() {
            if best.is_none_or(|(_, c)| count > c) {
                best = Some((i, count));
            }
        }
        best.map(|(i, _)| i)
    }
}

impl Record for EntryHist {
    const TYPE_TAG: u32 = TAG_ENTRY_HIST;

    fn write<W: Write>(&self, w: &mut BinaryWriter<W>) -> Result<(), FileError> {
        w.write_tag(Self::TYPE_TAG)?;
        w.write_value(FIELD_POPULATION, &self.population)?;
        w.write_value(FIELD_MIN, &self.min)?;
        w.write_value(FIELD_MAX, &self.max)?;
        w.write_vector(FIELD_BINS, &self.bins)
    }

    fn read_fields<R: Read>(r: &mut BinaryReader<R>) -> Result<Self, FileError> {
        Ok(Self {
            population: r.read_value(FIELD_POPULATION)?,
            min: r.read_value(FIELD_MIN)?,
            max: r.read_value(FIELD_MAX)?,
            bins: r.read_vector(FIELD_BINS)?,
        })
    }
}

// ── EntryParams ─────────────────────────────────────────────────────

/// Benannte Parameter (z.B. Kennzahlen eines Frames).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntryParams {
    names: Vec<String>,
    values: Vec<f32>,
}

impl EntryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Setzt einen Parameter (legt ihn bei Bedarf an).
    pub fn set(&mut self, name: &str, value: f32) {
        match self.names.iter().position(|n| n == name) {
            Some(i) => self.values[i] = value,
            None => {
                self.names.push(name.to_string());
                self.values.push(value);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

impl Record for EntryParams {
    const TYPE_TAG: u32 = TAG_ENTRY_PARAMS;

    fn write<W: Write>(&self, w: &mut BinaryWriter<W>) -> Result<(), FileError> {
        w.write_tag(Self::TYPE_TAG)?;
        w.write_vector(FIELD_NAMES, &self.names)?;
        w.write_vector(FIELD_VALUES, &self.values)
    }

    fn read_fields<R: Read>(r: &mut BinaryReader<R>) -> Result<Self, FileError> {
        let names: Vec<String> = r.read_vector(FIELD_NAMES)?;
        let values: Vec<f32> = r.read_vector(FIELD_VALUES)?;
        if names.len() != values.len() {
            return Err(FileError::Invalid {
                field: "values",
                reason: format!("{} Namen, {} Werte", names.len(), values.len()),
            });
        }
        Ok(Self { names, values })
    }
}

// ── Table ───────────────────────────────────────────────────────────

/// Benannte Folge gleichartiger Datensätze.
#[derive(Debug, Clone, PartialEq)]
pub struct Table<T: Record> {
    pub name: String,
    pub records: Vec<T>,
}

impl<T: Record> Table<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: T) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn write<W: Write>(&self, w: &mut BinaryWriter<W>) -> Result<(), FileError> {
        w.write_tag(TAG_TABLE)?;
        w.write_value(FIELD_TABLE_NAME, &self.name)?;
        w.write_value(FIELD_TABLE_COUNT, &(self.records.len() as u64))?;
        for record in &self.records {
            record.write(w)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(r: &mut BinaryReader<R>) -> Result<Self, FileError> {
        r.expect_tag(TAG_TABLE)?;
        let name: String = r.read_value(FIELD_TABLE_NAME)?;
        let count: u64 = r.read_value(FIELD_TABLE_COUNT)?;
        let mut records = Vec::new();
        for _ in 0..count {
            records.push(T::read(r)?);
        }
        Ok(Self { name, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_counts_samples_in_range() {
        let hist = EntryHist::from_samples(&[0.0, 0.1, 0.5, 0.9, 1.0, 2.0], 4, 0.0, 1.0);
        assert_eq!(hist.population, 5);
        assert_eq!(hist.bins, vec![2.0, 0.0, 1.0, 2.0]);
        assert_eq!(hist.peak(), Some(0));
    }

    #[test]
    fn params_keep_insertion_order() {
        let mut params = EntryParams::new();
        params.set("count", 3.0);
        params.set("volume", 120.0);
        params.set("count", 4.0);
        let names: Vec<&str> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["count", "volume"]);
        assert_eq!(params.get("count"), Some(4.0));
        assert_eq!(params.get("fehlt"), None);
    }

    #[test]
    fn table_of_params_reads_back() {
        let mut table = Table::new("frames");
        for i in 0..3 {
            let mut p = EntryParams::new();
            p.set("frame", i as f32);
            p.set("components", (i * 2) as f32);
            table.push(p);
        }
        let mut w = BinaryWriter::new(Vec::new());
        table.write(&mut w).expect("Schreiben fehlgeschlagen");
        let bytes = w.finish().expect("Flush fehlgeschlagen");

        let mut r = BinaryReader::new(bytes.as_slice());
        let back: Table<EntryParams> = Table::read(&mut r).expect("Lesen fehlgeschlagen");
        assert_eq!(back, table);
    }

    #[test]
    fn wrong_record_type_is_rejected() {
        let mut w = BinaryWriter::new(Vec::new());
        EntryHist::default().write(&mut w).unwrap();
        let bytes = w.finish().unwrap();
        let mut r = BinaryReader::new(bytes.as_slice());
        assert!(EntryParams::read(&mut r).is_err());
    }
}
