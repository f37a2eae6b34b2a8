//! Binäre Persistenz im Tag-Format: Datei-Writer/-Reader und Datensätze.

pub mod file;
pub mod records;

pub use file::{BinaryFile, BinaryReader, BinaryWriter, FileError, FileValue};
pub use records::{EntryHist, EntryParams, Record, Table};
