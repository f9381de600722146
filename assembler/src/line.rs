//! The flat, origin-tagged line buffer every stage reads and rewrites.

use asm_support::origin::Origin;

/// A single line in the stream threaded through preprocessor → macro
/// expander → loop expander → pass 1 → pass 2.
///
/// `text` is what gets parsed at this occurrence (it differs from
/// `origin.text` once a line has been through macro parameter substitution);
/// `origin` is always the original, pre-expansion provenance used in
/// diagnostics and scope-key computation.
#[derive(Debug, Clone)]
pub struct Line {
    pub text: String,
    pub origin: Origin,
}

impl Line {
    pub fn new(text: String, origin: Origin) -> Self {
        Self { text, origin }
    }

    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }

    pub fn is_blank(&self) -> bool {
        self.trimmed().is_empty()
    }
}
