//! Parser für Wert-Sets (Factory-Standardwerte).

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::core::ValueTuple;

/// Ergebnis des Parsens: Klassenname und Wert-Tupel in Dateireihenfolge.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSet {
    pub class: Option<String>,
    pub tuples: Vec<ValueTuple>,
}

/// Parsed ein `<ValueSet>` aus einem XML-String.
pub fn parse_value_set(xml_content: &str) -> Result<ValueSet> {
    let mut reader = Reader::from_str(xml_content);
    reader.config_mut().trim_text(true);

    let mut buffer = Vec::new();
    let mut class: Option<String> = None;
    let mut tuples = Vec::new();
    let mut in_set = false;
    let mut saw_set = false;

    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                let tag = reader.decoder().decode(name.as_ref())?;
                if tag == "ValueSet" {
                    in_set = true;
                    saw_set = true;
                    class = attribute(&reader, e, "class")?;
                } else if in_set && tag == "Value" {
                    tuples.push(read_tuple(&reader, e)?);
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.name();
                let tag = reader.decoder().decode(name.as_ref())?;
                if in_set && tag == "Value" {
                    tuples.push(read_tuple(&reader, e)?);
                } else if tag == "ValueSet" {
                    saw_set = true;
                    class = attribute(&reader, e, "class")?;
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                let tag = reader.decoder().decode(name.as_ref())?;
                if tag == "ValueSet" {
                    in_set = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!(
                "XML-Fehler an Position {}: {:?}",
                reader.buffer_position(),
                e
            ),
            _ => {}
        }
        buffer.clear();
    }

    if !saw_set {
        bail!("Kein <ValueSet> gefunden");
    }
    Ok(ValueSet { class, tuples })
}

fn attribute(reader: &Reader<&[u8]>, e: &BytesStart, key: &str) -> Result<Option<String>> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        let name = reader.decoder().decode(attr.key.as_ref())?;
        if name == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn read_tuple(reader: &Reader<&[u8]>, e: &BytesStart) -> Result<ValueTuple> {
    let name = attribute(reader, e, "name")?.context("<Value> ohne name-Attribut")?;
    let type_name = attribute(reader, e, "type")?
        .with_context(|| format!("<Value name=\"{}\"> ohne type-Attribut", name))?;
    let text = attribute(reader, e, "value")?.unwrap_or_default();
    Ok(ValueTuple {
        name,
        type_name,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::write_value_set;

    #[test]
    fn reads_written_set() {
        let tuples = vec![
            ValueTuple::new("gamma 3d", "double", "1.5"),
            ValueTuple::new("text", "string", "a<b"),
            ValueTuple::new("color", "Color", "1 0.5 0"),
        ];
        let xml = write_value_set("VolumeData", &tuples).expect("Schreiben fehlgeschlagen");
        let set = parse_value_set(&xml).expect("Parsen fehlgeschlagen");
        assert_eq!(set.class.as_deref(), Some("VolumeData"));
        assert_eq!(set.tuples, tuples);
    }

    #[test]
    fn missing_type_is_an_error() {
        let xml = "<ValueSet><Value name=\"x\" value=\"1\"/></ValueSet>";
        assert!(parse_value_set(xml).is_err());
    }

    #[test]
    fn document_without_set_is_rejected() {
        assert!(parse_value_set("<Other/>").is_err());
    }
}
