//! # Catalog Engine
//!
//! Re-derives a one-table-per-sheet catalog from a workbook whose index sheet may point at
//! the same worksheet several times, and whose worksheets may stack several tables.
//!
//! Stages run strictly in order, each on the complete output of the previous one:
//! index grouping → block detection → reconciliation → splitting → renaming → link rewriting → report.

pub mod block;
pub mod index;
pub mod link;
pub mod marker;
pub mod pipeline;
pub mod reconcile;
pub mod rename;
pub mod report;
pub mod split;

use thiserror::Error;

/// Errors raised by the catalog stages
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Workbook '{0}' has no '{1}' sheet")]
    MissingIndexSheet(String, String),

    #[error("Index sheet '{0}' is empty")]
    MissingIndexHeader(String),

    #[error("Index sheet '{0}' has no '{1}' column")]
    MissingIndexColumn(String, String),

    #[error("Sheet name '{0}' would be used twice")]
    DuplicateSheetName(String),
}

impl CatalogError {
    /// A missing or malformed index sheet makes the workbook unprocessable.
    pub fn is_structural(&self) -> bool {
        match self {
            CatalogError::MissingIndexSheet(..)
            | CatalogError::MissingIndexHeader(_)
            | CatalogError::MissingIndexColumn(..) => true,
            CatalogError::DuplicateSheetName(_) => false,
        }
    }
}
