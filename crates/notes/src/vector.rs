//! Vector search hook for notes.
//!
//! Semantic search is out of scope for the bundled implementation; the
//! default [`NullVectorIndex`] always signals `Error::Unavailable` so
//! callers can treat it as a non-fatal "not configured" condition rather
//! than crashing.

use op_domain::error::{Error, Result};
use op_domain::note::{Note, NoteSummary};

/// Pluggable semantic search over an operative's notes.
pub trait VectorIndex: Send + Sync {
    fn search(&self, operative_id: &str, query: &str, notes: &[Note]) -> Result<Vec<NoteSummary>>;
}

/// The default, bundled [`VectorIndex`]: always unavailable.
pub struct NullVectorIndex;

impl VectorIndex for NullVectorIndex {
    fn search(&self, _operative_id: &str, _query: &str, _notes: &[Note]) -> Result<Vec<NoteSummary>> {
        Err(Error::Unavailable("vector search not configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_index_is_unavailable() {
        let idx = NullVectorIndex;
        let err = idx.search("op1", "anything", &[]).unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }
}
