use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use std::borrow::Cow;

static EMPTY_CELL: CellValue = CellValue::Empty;

/// Where a hyperlink points.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkTarget {
    /// A cell inside the same workbook
    Internal { sheet: String, cell: String },
    /// Anything outside the workbook (URL, mail, other file)
    External(String),
}

/// A hyperlink anchored on one cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Hyperlink {
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
    pub target: LinkTarget,
}

impl Hyperlink {
    /// Creates an internal hyperlink to cell A1 of `sheet`.
    pub fn internal(row: usize, col: usize, sheet: &str) -> Self {
        Hyperlink {
            row,
            col,
            target: LinkTarget::Internal {
                sheet: sheet.to_owned(),
                cell: "A1".to_owned(),
            },
        }
    }

    /// Sheet name of an internal target.
    pub fn internal_sheet(&self) -> Option<&str> {
        match &self.target {
            LinkTarget::Internal { sheet, .. } => Some(sheet.as_str()),
            LinkTarget::External(_) => None,
        }
    }
}

/// Read-only cell grid of one worksheet.
///
/// Rows are dense and start at column A; cells past the end of a row are empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SheetGrid {
    /// Sheet name
    pub name: String,
    /// Cell values, row-major
    pub rows: Vec<Vec<CellValue>>,
    /// Hyperlinks anchored in this sheet
    pub hyperlinks: Vec<Hyperlink>,
}

impl SheetGrid {
    /// Creates a grid from already materialized rows.
    pub fn from_rows(name: &str, rows: Vec<Vec<CellValue>>) -> Self {
        SheetGrid {
            name: name.to_owned(),
            rows,
            hyperlinks: Vec::new(),
        }
    }

    /// Number of rows, including trailing blank rows that were materialized.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells of a row; rows past the end are empty.
    pub fn row(&self, row: usize) -> &[CellValue] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cell at (row, col); out-of-range positions are empty.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Text of the cell at (row, col).
    pub fn text(&self, row: usize, col: usize) -> Cow<'_, str> {
        self.cell(row, col).text()
    }

    /// True if every cell of the row is empty or whitespace.
    pub fn is_row_blank(&self, row: usize) -> bool {
        self.row(row).iter().all(CellValue::is_blank)
    }

    /// Hyperlink anchored on (row, col), if any.
    pub fn hyperlink_at(&self, row: usize, col: usize) -> Option<&Hyperlink> {
        self.hyperlinks.iter().find(|link| link.row == row && link.col == col)
    }
}

/// Accumulates raw cells in document order and materializes a [`SheetGrid`].
pub(crate) struct SheetGridBuilder {
    /// Sheet name
    name: String,
    /// All cells in the sheet
    cells: Vec<Cell>,
    hyperlinks: Vec<Hyperlink>,
    /// Actual data range (determined from cell data)
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl SheetGridBuilder {
    /// Creates an empty builder for the named sheet.
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
            hyperlinks: Vec::new(),
            row_upper_bound: None,
            col_upper_bound: None,
        }
    }

    /// Adds a cell to the sheet, updating data ranges.
    pub(crate) fn push(&mut self, cell: Cell) {
        self.update_bound(cell.row, cell.col);
        self.cells.push(cell);
    }

    /// Adds a hyperlink; a later link on the same cell replaces the earlier one.
    pub(crate) fn push_hyperlink(&mut self, hyperlink: Hyperlink) {
        self.hyperlinks.retain(|link| link.row != hyperlink.row || link.col != hyperlink.col);
        self.hyperlinks.push(hyperlink);
    }

    /// Updates the actual data range boundaries based on cell positions.
    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_upper_bound.map(|row_upper_bound| row_upper_bound < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_upper_bound.map(|col_upper_bound| col_upper_bound < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Materializes dense rows, resolving shared strings and number formats.
    /// Trailing empty cells of each row are trimmed.
    pub(crate) fn finish(self, shared_strings: &[String]) -> SheetGrid {
        let row_count = self.row_upper_bound.map(|row| row + 1).unwrap_or(0);
        let mut rows = vec![Vec::<CellValue>::new(); row_count];
        for cell in &self.cells {
            let value = cell.resolve(shared_strings);
            if value == CellValue::Empty {
                continue;
            }
            let record = &mut rows[cell.row];
            if record.len() <= cell.col {
                record.resize(cell.col + 1, CellValue::Empty);
            }
            record[cell.col] = value;
        }
        for record in &mut rows {
            while record.last().map(CellValue::is_blank).unwrap_or(false) {
                record.pop();
            }
        }
        SheetGrid {
            name: self.name,
            rows,
            hyperlinks: self.hyperlinks,
        }
    }
}
