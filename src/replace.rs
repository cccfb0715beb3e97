// SPDX-License-Identifier: Apache-2.0

/// One pending edit: replace `source[start..end]` with `text`. Offsets are
/// byte positions into the original buffer, never into intermediate results.
#[derive(Clone, Debug)]
pub struct Replacement {
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Short description used in logs, e.g. `AUTOINST u_fifo_0`.
    pub label: String,
}

/// Collects replacements during generation and applies them in one pass.
///
/// The queue accepts edits in any order; [`apply`](Self::apply) sorts them and
/// splices against the original buffer, so no edit ever observes offsets
/// shifted by another edit. Ranges are half-open and must be pairwise
/// disjoint.
#[derive(Debug, Default)]
pub struct ReplacementQueue {
    edits: Vec<Replacement>,
}

impl ReplacementQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, replacement: Replacement) {
        assert!(
            replacement.start <= replacement.end,
            "replacement {} has inverted range {}..{}",
            replacement.label,
            replacement.start,
            replacement.end
        );
        log::debug!(
            "queueing {} at {}..{} ({} bytes of new text)",
            replacement.label,
            replacement.start,
            replacement.end,
            replacement.text.len()
        );
        self.edits.push(replacement);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Returns true if `[start, end)` intersects any queued edit.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.edits.iter().any(|r| start < r.end && r.start < end)
    }

    /// Splices all queued edits into `source` and returns the new buffer.
    ///
    /// Panics if any range is out of bounds or if two ranges overlap; the
    /// generators uphold both invariants, so a panic here is a bug in the
    /// caller rather than in user input.
    pub fn apply(mut self, source: &str) -> String {
        self.edits.sort_by_key(|r| (r.start, r.end));
        for pair in self.edits.windows(2) {
            assert!(
                pair[0].end <= pair[1].start,
                "overlapping replacements: {} ({}..{}) and {} ({}..{})",
                pair[0].label,
                pair[0].start,
                pair[0].end,
                pair[1].label,
                pair[1].start,
                pair[1].end
            );
        }

        let grown: usize = self.edits.iter().map(|r| r.text.len()).sum();
        let mut out = String::with_capacity(source.len() + grown);
        let mut pos = 0;
        for r in &self.edits {
            assert!(
                r.end <= source.len(),
                "replacement {} range {}..{} exceeds source length {}",
                r.label,
                r.start,
                r.end,
                source.len()
            );
            out.push_str(&source[pos..r.start]);
            out.push_str(&r.text);
            pos = r.end;
        }
        out.push_str(&source[pos..]);
        out
    }
}
