// src/record/status.rs

//! Record status enumeration
//!
//! Declaration order is pipeline order; `order()` is the index the
//! lifecycle engine uses to reject backward moves.
//!
//! ```text
//! retrieved -> imported -> {needs_manual_preparation | prepared}
//!   -> {needs_manual_merge | processed}
//!   -> {prescreen_excluded | prescreen_included}
//!   -> {pdf_needs_manual_retrieval | pdf_not_available | pdf_imported}
//!   -> {pdf_needs_manual_preparation | pdf_prepared}
//!   -> {excluded | included} -> synthesized
//! ```

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum RecordStatus {
    #[strum(serialize = "md_retrieved")]
    #[serde(rename = "md_retrieved")]
    Retrieved,
    #[strum(serialize = "md_imported")]
    #[serde(rename = "md_imported")]
    Imported,
    #[strum(serialize = "md_needs_manual_preparation")]
    #[serde(rename = "md_needs_manual_preparation")]
    NeedsManualPreparation,
    #[strum(serialize = "md_prepared")]
    #[serde(rename = "md_prepared")]
    Prepared,
    #[strum(serialize = "md_needs_manual_merge")]
    #[serde(rename = "md_needs_manual_merge")]
    NeedsManualMerge,
    #[strum(serialize = "md_processed")]
    #[serde(rename = "md_processed")]
    Processed,
    #[strum(serialize = "rev_prescreen_excluded")]
    #[serde(rename = "rev_prescreen_excluded")]
    PrescreenExcluded,
    #[strum(serialize = "rev_prescreen_included")]
    #[serde(rename = "rev_prescreen_included")]
    PrescreenIncluded,
    #[strum(serialize = "pdf_needs_manual_retrieval")]
    #[serde(rename = "pdf_needs_manual_retrieval")]
    PdfNeedsManualRetrieval,
    #[strum(serialize = "pdf_not_available")]
    #[serde(rename = "pdf_not_available")]
    PdfNotAvailable,
    #[strum(serialize = "pdf_imported")]
    #[serde(rename = "pdf_imported")]
    PdfImported,
    #[strum(serialize = "pdf_needs_manual_preparation")]
    #[serde(rename = "pdf_needs_manual_preparation")]
    PdfNeedsManualPreparation,
    #[strum(serialize = "pdf_prepared")]
    #[serde(rename = "pdf_prepared")]
    PdfPrepared,
    #[strum(serialize = "rev_excluded")]
    #[serde(rename = "rev_excluded")]
    Excluded,
    #[strum(serialize = "rev_included")]
    #[serde(rename = "rev_included")]
    Included,
    #[strum(serialize = "rev_synthesized")]
    #[serde(rename = "rev_synthesized")]
    Synthesized,
}

impl RecordStatus {
    /// Pipeline-order index
    pub fn order(self) -> u8 {
        self as u8
    }

    /// Parse the serialized form (`md_prepared`, ...)
    pub fn parse(s: &str) -> crate::Result<Self> {
        s.parse::<Self>()
            .map_err(|_| crate::Error::InvalidStatus(s.to_string()))
    }

    /// Legal forward successors along the pipeline graph
    pub fn successors(self) -> &'static [RecordStatus] {
        use RecordStatus::*;
        match self {
            Retrieved => &[Imported],
            Imported => &[NeedsManualPreparation, Prepared],
            NeedsManualPreparation => &[Prepared],
            Prepared => &[NeedsManualMerge, Processed],
            NeedsManualMerge => &[Processed],
            Processed => &[PrescreenExcluded, PrescreenIncluded],
            PrescreenIncluded => &[PdfNeedsManualRetrieval, PdfNotAvailable, PdfImported],
            PdfNeedsManualRetrieval => &[PdfNotAvailable, PdfImported],
            PdfImported => &[PdfNeedsManualPreparation, PdfPrepared],
            PdfNeedsManualPreparation => &[PdfPrepared],
            PdfPrepared => &[Excluded, Included],
            Included => &[Synthesized],
            PrescreenExcluded | PdfNotAvailable | Excluded | Synthesized => &[],
        }
    }

    /// No further normal transitions leave this state
    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// Exclusion markers (the record stays addressable)
    pub fn is_excluded(self) -> bool {
        matches!(
            self,
            RecordStatus::PrescreenExcluded | RecordStatus::PdfNotAvailable | RecordStatus::Excluded
        )
    }

    /// Deduplication decisions for this record are committed
    pub fn is_resolved(self) -> bool {
        self >= RecordStatus::Processed
    }

    /// The record still needs a human before it can advance
    pub fn needs_manual(self) -> bool {
        matches!(
            self,
            RecordStatus::NeedsManualPreparation
                | RecordStatus::NeedsManualMerge
                | RecordStatus::PdfNeedsManualRetrieval
                | RecordStatus::PdfNeedsManualPreparation
        )
    }
}
