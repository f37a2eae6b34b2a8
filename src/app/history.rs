//! Zeitlich abgetasteter Undo/Redo-Verlauf für einzelne Werte.
//!
//! Nicht jede Änderung wird aufgezeichnet: ein neuer Eintrag entsteht nur,
//! wenn seit dem letzten Eintrag mindestens `min_interval` vergangen ist.
//! Schnellere Änderungen überschreiben den jüngsten Eintrag.

use std::time::{Duration, Instant};

/// Ziel, auf das ein gespeicherter Wert zurückgeschrieben wird.
pub trait UndoTarget<T> {
    /// Übernimmt den wiederhergestellten Wert.
    fn replace(&mut self, value: &T);

    /// Wird vor `replace` bei Redo aufgerufen.
    fn on_push(&mut self, _value: &T) {}

    /// Wird vor `replace` bei Undo mit dem verlassenen Wert aufgerufen.
    fn on_pop(&mut self, _value: &T) {}
}

/// Begrenzter Wertestapel mit Zeiger auf den aktuellen Zustand.
#[derive(Debug, Clone)]
pub struct Undoable<T> {
    stack: Vec<T>,
    pointer: usize,
    last_push: Option<Instant>,
    min_interval: Duration,
    max_depth: usize,
}

impl<T: Clone + PartialEq> Undoable<T> {
    /// `max_depth` zählt die Undo-Schritte; der Startwert kommt hinzu.
    pub fn new(initial: T, min_interval: Duration, max_depth: usize) -> Self {
        Self {
            stack: vec![initial],
            pointer: 0,
            last_push: None,
            min_interval,
            max_depth: max_depth.max(1),
        }
    }

    pub fn current(&self) -> &T {
        &self.stack[self.pointer]
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn set_min_interval(&mut self, interval: Duration) {
        self.min_interval = interval;
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn set_max_depth(&mut self, depth: usize) {
        self.max_depth = depth.max(1);
        self.enforce_depth();
    }

    pub fn can_undo(&self) -> bool {
        self.pointer > 0
    }

    pub fn can_redo(&self) -> bool {
        self.pointer + 1 < self.stack.len()
    }

    /// Zeichnet `value` zum aktuellen Zeitpunkt auf.
    pub fn push(&mut self, value: T) -> bool {
        self.push_at(value, Instant::now())
    }

    /// Zeichnet `value` zum Zeitpunkt `now` auf.
    ///
    /// Gleiche Werte werden ignoriert. Redo-Einträge fallen weg. Liegt der
    /// letzte Eintrag weniger als `min_interval` zurück, wird er ersetzt
    /// statt ein neuer angelegt; der Startwert wird nie ersetzt.
    pub fn push_at(&mut self, value: T, now: Instant) -> bool {
        if *self.current() == value {
            return false;
        }
        self.stack.truncate(self.pointer + 1);

        let coalesce = self.pointer > 0
            && self
                .last_push
                .is_some_and(|last| now.saturating_duration_since(last) < self.min_interval);

        if coalesce {
            self.stack[self.pointer] = value;
        } else {
            self.stack.push(value);
            self.pointer += 1;
            self.enforce_depth();
        }
        self.last_push = Some(now);
        true
    }

    /// Geht einen Schritt zurück und schreibt den Wert in `target`.
    pub fn undo(&mut self, target: &mut impl UndoTarget<T>) -> bool {
        if !self.can_undo() {
            return false;
        }
        target.on_pop(&self.stack[self.pointer]);
        self.pointer -= 1;
        target.replace(&self.stack[self.pointer]);
        self.last_push = None;
        log::trace!("Undo auf Schritt {}", self.pointer);
        true
    }

    /// Geht einen Schritt vor und schreibt den Wert in `target`.
    pub fn redo(&mut self, target: &mut impl UndoTarget<T>) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.pointer += 1;
        target.on_push(&self.stack[self.pointer]);
        target.replace(&self.stack[self.pointer]);
        self.last_push = None;
        log::trace!("Redo auf Schritt {}", self.pointer);
        true
    }

    /// Entfernt bis zu `count` der ältesten Einträge vor dem Zeiger.
    pub fn trim_head(&mut self, count: usize) -> usize {
        let n = count.min(self.pointer);
        self.stack.drain(..n);
        self.pointer -= n;
        n
    }

    /// Entfernt bis zu `count` der jüngsten Redo-Einträge.
    pub fn trim_tail(&mut self, count: usize) -> usize {
        let redo = self.stack.len() - self.pointer - 1;
        let n = count.min(redo);
        self.stack.truncate(self.stack.len() - n);
        n
    }

    /// Verwirft den Verlauf; `value` wird neuer Startwert.
    pub fn reset(&mut self, value: T) {
        self.stack.clear();
        self.stack.push(value);
        self.pointer = 0;
        self.last_push = None;
    }

    fn enforce_depth(&mut self) {
        let limit = self.max_depth + 1;
        if self.stack.len() > limit {
            let excess = self.stack.len() - limit;
            self.trim_head(excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Field {
        value: f64,
        pops: usize,
        pushes: usize,
    }

    impl UndoTarget<f64> for Field {
        fn replace(&mut self, value: &f64) {
            self.value = *value;
        }

        fn on_push(&mut self, _value: &f64) {
            self.pushes += 1;
        }

        fn on_pop(&mut self, _value: &f64) {
            self.pops += 1;
        }
    }

    const STEP: Duration = Duration::from_millis(300);

    fn history() -> (Undoable<f64>, Instant) {
        (Undoable::new(0.0, STEP, 8), Instant::now())
    }

    #[test]
    fn empty_history_cannot_undo_or_redo() {
        let (h, _) = history();
        assert!(!h.can_undo());
        assert!(!h.can_redo());
        assert_eq!(*h.current(), 0.0);
    }

    #[test]
    fn undo_and_redo_restore_values() {
        let (mut h, t0) = history();
        h.push_at(1.0, t0);
        h.push_at(2.0, t0 + STEP);

        let mut field = Field::default();
        assert!(h.undo(&mut field));
        assert_eq!(field.value, 1.0);
        assert!(h.undo(&mut field));
        assert_eq!(field.value, 0.0);
        assert!(!h.undo(&mut field));
        assert_eq!(field.pops, 2);

        assert!(h.redo(&mut field));
        assert_eq!(field.value, 1.0);
        assert_eq!(field.pushes, 1);
    }

    #[test]
    fn fast_pushes_coalesce() {
        let (mut h, t0) = history();
        h.push_at(1.0, t0);
        h.push_at(1.5, t0 + Duration::from_millis(100));
        h.push_at(2.0, t0 + Duration::from_millis(200));
        assert_eq!(h.len(), 2);
        assert_eq!(*h.current(), 2.0);

        h.push_at(3.0, t0 + Duration::from_millis(600));
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn equal_value_is_ignored() {
        let (mut h, t0) = history();
        assert!(!h.push_at(0.0, t0));
        assert!(h.push_at(4.0, t0));
        assert!(!h.push_at(4.0, t0 + STEP));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn push_after_undo_drops_redo() {
        let (mut h, t0) = history();
        h.push_at(1.0, t0);
        h.push_at(2.0, t0 + STEP);
        let mut field = Field::default();
        h.undo(&mut field);
        assert!(h.can_redo());

        // direkt nach Undo wird nicht zusammengefasst
        h.push_at(5.0, t0 + STEP);
        assert!(!h.can_redo());
        assert_eq!(h.len(), 3);
        assert_eq!(*h.current(), 5.0);
    }

    #[test]
    fn depth_is_bounded() {
        let mut h = Undoable::new(0, Duration::ZERO, 3);
        let t0 = Instant::now();
        for i in 1..=6 {
            h.push_at(i, t0 + STEP * i as u32);
        }
        assert_eq!(h.len(), 4);
        assert_eq!(*h.current(), 6);

        struct Sink(i32);
        impl UndoTarget<i32> for Sink {
            fn replace(&mut self, value: &i32) {
                self.0 = *value;
            }
        }
        let mut sink = Sink(6);
        let mut steps = 0;
        while h.undo(&mut sink) {
            steps += 1;
        }
        assert_eq!(steps, 3);
        assert_eq!(sink.0, 3);
    }

    #[test]
    fn trim_head_and_tail() {
        let (mut h, t0) = history();
        for i in 1..=4 {
            h.push_at(i as f64, t0 + STEP * i);
        }
        let mut field = Field::default();
        h.undo(&mut field);
        h.undo(&mut field);
        // Stapel: 0 1 2 | 3 4, Zeiger auf 2
        assert_eq!(h.trim_tail(5), 2);
        assert!(!h.can_redo());
        assert_eq!(h.trim_head(1), 1);
        assert_eq!(h.len(), 2);
        assert_eq!(*h.current(), 2.0);
        assert_eq!(h.pointer(), 1);
    }
}
