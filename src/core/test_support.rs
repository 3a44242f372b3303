use crate::common::Result;
use crate::core::embedding::Embedding;
use crate::core::matcher::Identity;
use crate::core::source::{Announcer, EmbeddingSource, SourceOpener};
use chrono::Utc;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

pub const ORIGIN: [f32; 2] = [0.0, 0.0];

/// A sample exactly `d` away from `ORIGIN`.
pub fn at(d: f32) -> Embedding {
    vec![d, 0.0]
}

pub fn identity(id: &str, name: &str, embeddings: Vec<Embedding>) -> Identity {
    Identity {
        id: id.to_string(),
        name: name.to_string(),
        embeddings,
        created_at: Utc::now(),
    }
}

/// Replays a fixed script of detections, then reports no face forever.
pub struct ScriptedSource {
    script: VecDeque<Result<Option<Embedding>>>,
    released: Rc<Cell<bool>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Option<Embedding>>>) -> (Self, Rc<Cell<bool>>) {
        let released = Rc::new(Cell::new(false));
        let source = Self {
            script: script.into(),
            released: released.clone(),
        };
        (source, released)
    }
}

impl EmbeddingSource for ScriptedSource {
    fn detect(&mut self) -> Result<Option<Embedding>> {
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.released.set(true);
    }
}

pub struct OnceOpener(Option<ScriptedSource>);

impl OnceOpener {
    pub fn new(source: ScriptedSource) -> Self {
        Self(Some(source))
    }
}

impl SourceOpener for OnceOpener {
    fn open(&mut self) -> Result<Box<dyn EmbeddingSource>> {
        let source = self.0.take().expect("camera opened twice");
        Ok(Box::new(source))
    }
}

#[derive(Clone, Default)]
pub struct RecordingAnnouncer(Rc<RefCell<Vec<String>>>);

impl RecordingAnnouncer {
    pub fn spoken(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce(&self, text: &str) {
        self.0.borrow_mut().push(text.to_string());
    }
}
