//! Run settings shared by every mode
use std::path::PathBuf;

pub const DEFAULT_INDEX_SHEET: &str = "Index";
pub const DEFAULT_BACK_LINK_LABEL: &str = "← Back to Index";
pub const DEFAULT_PATTERN: &str = "*.xlsx";

/// Settings of one run. Every field has a default and can be overridden from the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Name of the catalog sheet, matched case-insensitively
    pub index_sheet: String,
    /// Text of the back-link cell written at the top of every output sheet
    pub back_link_label: String,
    /// Glob pattern selecting workbooks in batch mode
    pub pattern: String,
    /// Worker threads in batch mode; `None` uses one per core
    pub jobs: Option<usize>,
    /// Where to write the Markdown report; stdout when `None`
    pub report: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            index_sheet: DEFAULT_INDEX_SHEET.to_owned(),
            back_link_label: DEFAULT_BACK_LINK_LABEL.to_owned(),
            pattern: DEFAULT_PATTERN.to_owned(),
            jobs: None,
            report: None,
        }
    }
}
