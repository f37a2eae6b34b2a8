//! Kopier-Strategie für das Klonen von Objekten, Nodes und Werten.

use std::ops::BitOr;

use super::value::Referenced;

/// Bitmenge, die pro Art festlegt, ob tief kopiert oder geteilt wird.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CopyOp {
    flags: u32,
}

impl CopyOp {
    /// Alles wird geteilt.
    pub const SHALLOW_COPY: CopyOp = CopyOp { flags: 0 };
    pub const DEEP_COPY_OBJECTS: CopyOp = CopyOp { flags: 1 };
    pub const DEEP_COPY_NODES: CopyOp = CopyOp { flags: 1 << 1 };
    pub const DEEP_COPY_VALUES: CopyOp = CopyOp { flags: 1 << 2 };
    pub const DEEP_COPY_ALL: CopyOp = CopyOp { flags: 0b111 };

    pub fn from_bits(flags: u32) -> Self {
        Self {
            flags: flags & Self::DEEP_COPY_ALL.flags,
        }
    }

    pub fn bits(&self) -> u32 {
        self.flags
    }

    pub fn contains(&self, other: CopyOp) -> bool {
        self.flags & other.flags == other.flags
    }

    pub fn deep_objects(&self) -> bool {
        self.contains(Self::DEEP_COPY_OBJECTS)
    }

    pub fn deep_nodes(&self) -> bool {
        self.contains(Self::DEEP_COPY_NODES)
    }

    pub fn deep_values(&self) -> bool {
        self.contains(Self::DEEP_COPY_VALUES)
    }

    /// Ob ein verwiesenes Objekt (bzw. Node) tief kopiert wird.
    pub fn copies_entity(&self, is_node: bool) -> bool {
        if is_node {
            self.deep_nodes()
        } else {
            self.deep_objects()
        }
    }

    /// Undurchsichtige Nutzlasten nehmen nie an tiefen Kopien teil.
    pub fn apply_referenced(&self, r: &Referenced) -> Referenced {
        r.clone()
    }
}

impl BitOr for CopyOp {
    type Output = CopyOp;

    fn bitor(self, rhs: CopyOp) -> CopyOp {
        CopyOp {
            flags: self.flags | rhs.flags,
        }
    }
}
