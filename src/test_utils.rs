//! Helpers for driving the engine in tests.

use std::{cell::RefCell, rc::Rc};

use crate::cue::{Cue, CuePlayer};

/// Remembers every cue it was asked to play. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingPlayer {
    played: Rc<RefCell<Vec<(Cue, f32)>>>,
}

impl RecordingPlayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cues(&self) -> Vec<Cue> {
        self.played.borrow().iter().map(|(cue, _)| *cue).collect()
    }

    #[must_use]
    pub fn volumes(&self) -> Vec<f32> {
        self.played.borrow().iter().map(|(_, volume)| *volume).collect()
    }

    #[must_use]
    pub fn count(&self, cue: Cue) -> usize {
        self.played.borrow().iter().filter(|(c, _)| *c == cue).count()
    }

    pub fn clear(&self) {
        self.played.borrow_mut().clear();
    }
}

impl CuePlayer for RecordingPlayer {
    fn play_normal(&mut self, volume: f32) {
        self.played.borrow_mut().push((Cue::Normal, volume));
    }

    fn play_warning(&mut self, volume: f32) {
        self.played.borrow_mut().push((Cue::Warning, volume));
    }

    fn play_final(&mut self, volume: f32) {
        self.played.borrow_mut().push((Cue::Final, volume));
    }
}
