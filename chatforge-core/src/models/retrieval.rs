use serde::{Deserialize, Serialize};

/// A passage returned by a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub content: String,
    pub seq: i32,
    pub similarity: f32,
}

/// Passages for one query, best match first. Empty means "use the raw
/// knowledge text instead".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub passages: Vec<RetrievedPassage>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }
}

impl From<Vec<RetrievedPassage>> for RetrievalResult {
    fn from(passages: Vec<RetrievedPassage>) -> Self {
        Self { passages }
    }
}
