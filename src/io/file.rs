//! Binäres Tag-Format: jeder Wert wird mit einem vorangestellten Feld-Tag
//! geschrieben, Vektoren zusätzlich mit ihrer Länge.
//!
//! Alle Zahlen sind Little-Endian. Ein Datensatz beginnt mit seinem
//! Typ-Tag, danach folgen `{Feld-Tag, Wert}`-Paare in fester Reihenfolge.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Obergrenze für Vektorlängen beim Lesen (schützt vor kaputten Dateien).
pub const MAX_VECTOR_LEN: u64 = 1 << 32;

/// Fehler beim Lesen oder Schreiben des Tag-Formats.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Unerwartetes Tag: erwartet {expected}, gefunden {found}")]
    UnexpectedTag { expected: u32, found: u32 },
    #[error("Ungültiger UTF-8-Text: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Vektorlänge {0} überschreitet die Obergrenze")]
    TooLong(u64),
    #[error("Ungültiger Wert für Feld {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Ein Wert, der im Tag-Format lesbar und schreibbar ist.
pub trait FileValue: Sized {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()>;
    fn read_from<R: Read>(r: &mut R) -> Result<Self, FileError>;
}

macro_rules! le_value {
    ($($t:ty),*) => {
        $(
            impl FileValue for $t {
                fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
                    w.write_all(&self.to_le_bytes())
                }

                fn read_from<R: Read>(r: &mut R) -> Result<Self, FileError> {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    r.read_exact(&mut buf)?;
                    Ok(<$t>::from_le_bytes(buf))
                }
            }
        )*
    };
}

le_value!(u8, u32, u64, i32, i64, f32, f64);

impl FileValue for bool {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[u8::from(*self)])
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self, FileError> {
        Ok(u8::read_from(r)? != 0)
    }
}

impl FileValue for String {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        (self.len() as u64).write_to(w)?;
        w.write_all(self.as_bytes())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Self, FileError> {
        let len = u64::read_from(r)?;
        if len > MAX_VECTOR_LEN {
            return Err(FileError::TooLong(len));
        }
        let mut buf = vec![0u8; len as usize];
        r.read_exact(&mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Einstiegspunkt zum Öffnen/Anlegen von Tag-Dateien.
pub struct BinaryFile;

impl BinaryFile {
    /// Legt eine Datei an (überschreibt sie) und liefert einen gepufferten Writer.
    pub fn create(path: &Path) -> Result<BinaryWriter<BufWriter<File>>, FileError> {
        Ok(BinaryWriter::new(BufWriter::new(File::create(path)?)))
    }

    /// Öffnet eine Datei zum Lesen.
    pub fn open(path: &Path) -> Result<BinaryReader<BufReader<File>>, FileError> {
        Ok(BinaryReader::new(BufReader::new(File::open(path)?)))
    }
}

/// Schreibende Seite des Tag-Formats.
pub struct BinaryWriter<W: Write> {
    inner: W,
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_tag(&mut self, tag: u32) -> Result<(), FileError> {
        tag.write_to(&mut self.inner)?;
        Ok(())
    }

    /// Schreibt einen Einzelwert ohne Tag.
    pub fn write_raw<T: FileValue>(&mut self, value: &T) -> Result<(), FileError> {
        value.write_to(&mut self.inner)?;
        Ok(())
    }

    /// Schreibt `{tag, value}`.
    pub fn write_value<T: FileValue>(&mut self, tag: u32, value: &T) -> Result<(), FileError> {
        self.write_tag(tag)?;
        self.write_raw(value)
    }

    /// Schreibt `{tag, len, items...}`.
    pub fn write_vector<T: FileValue>(&mut self, tag: u32, values: &[T]) -> Result<(), FileError> {
        self.write_tag(tag)?;
        (values.len() as u64).write_to(&mut self.inner)?;
        for value in values {
            value.write_to(&mut self.inner)?;
        }
        Ok(())
    }

    /// Leert Puffer und gibt den inneren Writer zurück.
    pub fn finish(mut self) -> Result<W, FileError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Lesende Seite des Tag-Formats. Der Leser kennt die erwartete Feldfolge.
pub struct BinaryReader<R: Read> {
    inner: R,
}

impl<R: Read> BinaryReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read_tag(&mut self) -> Result<u32, FileError> {
        u32::read_from(&mut self.inner)
    }

    /// Liest ein Tag und prüft es gegen den erwarteten Wert.
    pub fn expect_tag(&mut self, expected: u32) -> Result<(), FileError> {
        let found = self.read_tag()?;
        if found != expected {
            return Err(FileError::UnexpectedTag { expected, found });
        }
        Ok(())
    }

    pub fn read_raw<T: FileValue>(&mut self) -> Result<T, FileError> {
        T::read_from(&mut self.inner)
    }

    pub fn read_value<T: FileValue>(&mut self, tag: u32) -> Result<T, FileError> {
        self.expect_tag(tag)?;
        self.read_raw()
    }

    pub fn read_vector<T: FileValue>(&mut self, tag: u32) -> Result<Vec<T>, FileError> {
        self.expect_tag(tag)?;
        let len = u64::read_from(&mut self.inner)?;
        if len > MAX_VECTOR_LEN {
            return Err(FileError::TooLong(len));
        }
        let mut values = Vec::with_capacity((len as usize).min(1 << 20));
        for _ in 0..len {
            values.push(T::read_from(&mut self.inner)?);
        }
        Ok(values)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
