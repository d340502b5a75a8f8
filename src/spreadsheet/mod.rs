//! # Workbook Container
//!
//! Reads xlsx workbooks into an immutable, ordered list of [`SheetGrid`]s and writes
//! sheet grids back out as a new package. The catalog engine never touches the package
//! directly: it works on grids only.

pub(crate) mod cell;
pub(crate) mod excel;
pub mod reference;
pub mod sheet;
pub mod writer;
pub(crate) mod xlsx;

use crate::error::SplitterError;
use crate::spreadsheet::sheet::SheetGrid;
use crate::spreadsheet::xlsx::XlsxWorkbook;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

pub use crate::spreadsheet::cell::CellValue;

/// Errors raised while reading a workbook package
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    /// The file is not a readable zip container
    #[error("Cannot open '{0}' as an xlsx workbook: {1}")]
    ContainerError(String, String),

    /// A required package part is missing
    #[error("Missing package part '{0}'")]
    FileError(String),

    /// The workbook lists no worksheets
    #[error("Workbook '{0}' contains no worksheets")]
    SpreadsheetEmptyError(String),
}

/// An opened workbook: its path and every worksheet in workbook order.
#[derive(Clone, Debug, Default)]
pub struct Workbook {
    pub path: PathBuf,
    pub sheets: Vec<SheetGrid>,
}

impl Workbook {
    /// Reads every worksheet of the xlsx file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Workbook, SplitterError> {
        let path = path.as_ref();
        let mut workbook = XlsxWorkbook::open(path)?;
        let sheets = workbook.read_sheets()?;
        Ok(Workbook {
            path: path.to_path_buf(),
            sheets,
        })
    }

    /// Looks a sheet up by name; an exact match wins over a case-insensitive one.
    pub fn sheet(&self, name: &str) -> Option<&SheetGrid> {
        self.sheets
            .iter()
            .find(|sheet| sheet.name == name)
            .or_else(|| self.sheets.iter().find(|sheet| sheet.name.eq_ignore_ascii_case(name)))
    }

    /// Position of a sheet in workbook order, with the same matching rules as [`Workbook::sheet`].
    pub fn position(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|sheet| sheet.name == name)
            .or_else(|| self.sheets.iter().position(|sheet| sheet.name.eq_ignore_ascii_case(name)))
    }

    /// Sheet names in workbook order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str()).collect()
    }
}
