//! Flankenerkennung für Tasten und Schalter.

/// Zustand einer Taste über zwei Abfragen hinweg.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    /// Taste ist gedrückt
    pub held: bool,
    /// Wechsel auf gedrückt in dieser Abfrage
    pub down: bool,
    /// Wechsel auf losgelassen in dieser Abfrage
    pub up: bool,
}

impl KeyState {
    /// Übernimmt den neuen Rohzustand und setzt die Flanken.
    pub fn update(&mut self, pressed: bool) {
        self.down = !self.held && pressed;
        self.up = self.held && !pressed;
        self.held = pressed;
    }

    /// Irgendeine Flanke in dieser Abfrage.
    pub fn changed(&self) -> bool {
        self.down || self.up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_fires_once_on_press() {
        let mut key = KeyState::default();
        key.update(true);
        assert!(key.down && key.held && !key.up);
        key.update(true);
        assert!(!key.down && key.held && !key.up);
    }

    #[test]
    fn up_fires_only_on_release() {
        let mut key = KeyState::default();
        key.update(false);
        assert!(!key.up, "nicht gedrückt -> nicht gedrückt ist keine Flanke");
        key.update(true);
        assert!(!key.up);
        key.update(false);
        assert!(key.up && !key.held && !key.down);
        key.update(false);
        assert!(!key.changed());
    }
}
