//! Application-Layer: Undo/Redo-Verlauf und Eingabe-Flanken.

pub mod history;
pub mod input;

pub use history::{UndoTarget, Undoable};
pub use input::KeyState;
