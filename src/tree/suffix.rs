// 🔖 Clone Suffixes - One fresh suffix per clone operation
//
// Suffixes only need to be unique within a document and must not contain the
// clone separator. UUIDs are the default, a monotonic counter keeps tests and
// fixtures deterministic.

use std::collections::HashSet;

use crate::tree::node::CLONE_SEPARATOR;

/// Produces the suffix appended to every id of a newly cloned subtree
pub trait SuffixSource {
    fn next_suffix(&mut self) -> String;
}

/// Random v4 UUID suffixes (simple form, no hyphens)
#[derive(Debug, Default, Clone)]
pub struct UuidSuffixes;

impl SuffixSource for UuidSuffixes {
    fn next_suffix(&mut self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Monotonic counter suffixes: "1", "2", ...
#[derive(Debug, Clone)]
pub struct SequentialSuffixes {
    next: u64,
}

impl SequentialSuffixes {
    pub fn new() -> Self {
        SequentialSuffixes { next: 1 }
    }

    /// Start counting at `first` (e.g. past the suffixes already in a document)
    pub fn starting_at(first: u64) -> Self {
        SequentialSuffixes { next: first }
    }
}

impl Default for SequentialSuffixes {
    fn default() -> Self {
        Self::new()
    }
}

impl SuffixSource for SequentialSuffixes {
    fn next_suffix(&mut self) -> String {
        let suffix = self.next.to_string();
        self.next += 1;
        suffix
    }
}

/// Wraps another source and skips suffix tokens already present in a document
pub(crate) struct FreshSuffixes<'a> {
    inner: &'a mut dyn SuffixSource,
    taken: HashSet<String>,
}

impl<'a> FreshSuffixes<'a> {
    pub(crate) fn new(inner: &'a mut dyn SuffixSource, taken: HashSet<String>) -> Self {
        FreshSuffixes { inner, taken }
    }
}

impl SuffixSource for FreshSuffixes<'_> {
    fn next_suffix(&mut self) -> String {
        loop {
            let suffix = self.inner.next_suffix();
            if suffix.is_empty() || suffix.contains(CLONE_SEPARATOR) {
                continue;
            }
            if self.taken.insert(suffix.clone()) {
                return suffix;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
