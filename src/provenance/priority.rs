// src/provenance/priority.rs

//! Source priority ordering
//!
//! Curated prefixes rank above everything; the remaining sources rank in the
//! order they are listed in the settings. Sources not listed rank last, and
//! ties between unlisted sources are broken by the prefix string so the
//! ordering never depends on iteration order.

/// Default curated source prefix
pub const CURATED_PREFIX: &str = "md_curated.bib";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePriority {
    curated: Vec<String>,
    ordered: Vec<String>,
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self {
            curated: vec![CURATED_PREFIX.to_string()],
            ordered: Vec::new(),
        }
    }
}

impl SourcePriority {
    /// Build from the settings source list (highest priority first)
    pub fn new<I, S>(ordered: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            curated: vec![CURATED_PREFIX.to_string()],
            ordered: ordered.into_iter().map(Into::into).collect(),
        }
    }

    /// Add another curated prefix
    pub fn with_curated(mut self, prefix: impl Into<String>) -> Self {
        self.curated.push(prefix.into());
        self
    }

    pub fn is_curated(&self, prefix: &str) -> bool {
        self.curated.iter().any(|c| c == prefix)
    }

    /// Rank of a prefix (lower is higher priority)
    pub fn rank(&self, prefix: &str) -> usize {
        if self.is_curated(prefix) {
            return 0;
        }
        match self.ordered.iter().position(|p| p == prefix) {
            Some(pos) => pos + 1,
            None => self.ordered.len() + 1,
        }
    }

    /// Compare two prefixes: `Less` means `a` has higher priority
    pub fn compare(&self, a: &str, b: &str) -> std::cmp::Ordering {
        self.rank(a).cmp(&self.rank(b)).then_with(|| a.cmp(b))
    }
}
