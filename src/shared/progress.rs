//! Fortschrittsmeldung und Abbruch für lange Operationen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Rückruf mit Prozentwert und Statustext.
pub type ProgressCallback = Box<dyn FnMut(i32, &str) + Send>;

/// Meldet Fortschritt an einen Rückruf.
///
/// Intern wird immer mit 0..=100 gemeldet; `set_range` bildet diesen
/// Bereich auf einen Teilbereich des Aufrufers ab.
pub struct Progress {
    callback: Option<ProgressCallback>,
    min: i32,
    max: i32,
    last: Option<i32>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::silent()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("min", &self.min)
            .field("max", &self.max)
            .field("last", &self.last)
            .finish()
    }
}

impl Progress {
    pub fn new(callback: impl FnMut(i32, &str) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            ..Self::silent()
        }
    }

    /// Fortschritt ohne Rückruf.
    pub fn silent() -> Self {
        Self {
            callback: None,
            min: 0,
            max: 100,
            last: None,
        }
    }

    pub fn set_range(&mut self, min: i32, max: i32) {
        self.min = min;
        self.max = max;
    }

    pub fn range(&self) -> (i32, i32) {
        (self.min, self.max)
    }

    /// Meldet `percent` (0..=100) im abgebildeten Bereich.
    pub fn update(&mut self, percent: i32, message: &str) {
        let p = percent.clamp(0, 100);
        let mapped = self.min + (self.max - self.min) * p / 100;
        self.last = Some(mapped);
        log::trace!("Fortschritt {}%: {}", mapped, message);
        if let Some(callback) = self.callback.as_mut() {
            callback(mapped, message);
        }
    }

    /// Zuletzt gemeldeter (abgebildeter) Wert.
    pub fn last(&self) -> Option<i32> {
        self.last
    }
}

/// Abbruch-Flag, zwischen Threads teilbar.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn range_maps_percentages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut progress = Progress::new(move |p, msg| {
            sink.lock().expect("Sperre").push((p, msg.to_string()));
        });
        progress.set_range(50, 100);
        progress.update(0, "start");
        progress.update(50, "halb");
        progress.update(150, "über");

        let seen = seen.lock().expect("Sperre");
        assert_eq!(
            *seen,
            vec![
                (50, "start".to_string()),
                (75, "halb".to_string()),
                (100, "über".to_string())
            ]
        );
        assert_eq!(progress.last(), Some(100));
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        other.reset();
        assert!(!token.is_cancelled());
    }
}
