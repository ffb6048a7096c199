//! Rough token estimation for compaction triggering.
//!
//! Deliberately not a vendor tokenizer: a fixed chars-per-token divisor over
//! the UTF-8 byte length of the serialized entry is good enough to decide
//! "should we compact", and keeps this crate free of any provider-specific
//! tokenizer dependency.

use op_domain::entry::StreamEntry;

const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(entry: &StreamEntry) -> usize {
    let raw = serde_json::to_string(&entry.content).unwrap_or_default();
    (raw.len() / CHARS_PER_TOKEN).max(1)
}

pub fn estimate_view_tokens(view: &[StreamEntry]) -> usize {
    view.iter().map(estimate_tokens).sum()
}

/// Whether the view's estimated token count exceeds `threshold * max_tokens`.
pub fn should_compact(view: &[StreamEntry], threshold: f32, max_tokens: u32) -> bool {
    let estimated = estimate_view_tokens(view);
    let limit = (threshold as f64 * max_tokens as f64) as usize;
    estimated > limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use op_domain::entry::EntryRole;

    #[test]
    fn estimate_scales_with_content_length() {
        let short = StreamEntry::text("op1", 0, EntryRole::User, "hi");
        let long = StreamEntry::text("op1", 1, EntryRole::User, "a".repeat(400));
        assert!(estimate_tokens(&long) > estimate_tokens(&short));
    }

    #[test]
    fn should_compact_respects_threshold() {
        let view: Vec<StreamEntry> = (0..50)
            .map(|i| StreamEntry::text("op1", i, EntryRole::User, "x".repeat(100)))
            .collect();
        assert!(should_compact(&view, 0.1, 1000));
        assert!(!should_compact(&view, 0.99, 100_000));
    }
}
