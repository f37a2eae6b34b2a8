//! XML Import/Export der Factory-Standardwerte.
//!
//! Format: `<ValueSet class="...">` mit je einem
//! `<Value name="..." type="..." value="..."/>` pro Wert.

pub mod parser;
pub mod writer;

pub use parser::{parse_value_set, ValueSet};
pub use writer::write_value_set;
