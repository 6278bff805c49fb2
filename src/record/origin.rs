// src/record/origin.rs

//! Origin tags linking main records to source records
//!
//! Format: `<source-prefix>/<source-local-id>`, e.g. `crossref.bib/000012`.
//! The prefix identifies one search source; the local id is the feed-local
//! incremental id. Prefixes may themselves contain `/`, so the local id is
//! everything after the last separator.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin {
    /// Source prefix (one per search source)
    pub prefix: String,
    /// Feed-local record id
    pub local_id: String,
}

impl Origin {
    pub fn new(prefix: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            local_id: local_id.into(),
        }
    }

    /// Parse `prefix/local_id`
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (prefix, local_id) = s
            .rsplit_once('/')
            .ok_or_else(|| crate::Error::InvalidOrigin(s.to_string()))?;

        if prefix.is_empty() || local_id.is_empty() {
            return Err(crate::Error::InvalidOrigin(s.to_string()));
        }
        if s.contains(';') || s.chars().any(char::is_whitespace) {
            return Err(crate::Error::InvalidOrigin(s.to_string()));
        }

        Ok(Self::new(prefix, local_id))
    }

    /// Whether both origins come from the same source
    pub fn same_source(&self, other: &Origin) -> bool {
        self.prefix == other.prefix
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.local_id)
    }
}

impl FromStr for Origin {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Origin::parse(s)
    }
}

/// Extract the source prefix from a provenance source string
///
/// Provenance sources are usually origins, but may also be free-form tags
/// such as `manual` or `litrev/prep`; those have no separator-bound id and
/// are returned whole.
pub fn source_prefix(source: &str) -> &str {
    match source.rsplit_once('/') {
        Some((prefix, id)) if !prefix.is_empty() && !id.is_empty() => prefix,
        _ => source,
    }
}
