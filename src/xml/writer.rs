//! Writer für Wert-Sets (Factory-Standardwerte).

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::core::ValueTuple;

/// Schreibt Wert-Tupel als `<ValueSet>` mit einem `<Value/>` je Eintrag.
///
/// # Parameter
/// - `kind`: Klassenname der Factory (Attribut `class`)
/// - `tuples`: Name, Typname und Textform der Werte
pub fn write_value_set(kind: &str, tuples: &[ValueTuple]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut set = BytesStart::new("ValueSet");
    set.push_attribute(("class", kind));
    writer.write_event(Event::Start(set))?;

    for tuple in tuples {
        let mut value = BytesStart::new("Value");
        value.push_attribute(("name", tuple.name.as_str()));
        value.push_attribute(("type", tuple.type_name.as_str()));
        value.push_attribute(("value", tuple.text.as_str()));
        writer.write_event(Event::Empty(value))?;
    }

    writer.write_event(Event::End(BytesEnd::new("ValueSet")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_attribute_text() {
        let xml = write_value_set("VolumeData", &[ValueTuple::new("text", "string", "a<b & \"c\"")])
            .expect("Schreiben fehlgeschlagen");
        assert!(xml.contains("class=\"VolumeData\""));
        assert!(xml.contains("a&lt;b &amp; &quot;c&quot;"));
    }
}
