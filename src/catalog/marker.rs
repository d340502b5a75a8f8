//! Row classification for table-block detection
use crate::catalog::report::DiagnosticKind;
use crate::catalog::report::Reporter;
use crate::error::SplitterError;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::SheetGrid;
use regex::Regex;
use tracing::debug;

pub const TITLE_LABEL: &str = "Table Title:";
pub const SOURCE_LABEL: &str = "Source(s):";

/// Currency-and-scale phrases: `$ in millions`, `in billions`, `$ (in thousands)`, …
const UNIT_INDICATOR_PATTERN: &str =
    r"(?i)^\s*\(?\s*(?:[$€£¥]\s*)?\(?\s*in\s+(?:thousands|millions|billions|trillions)\b";

/// `Q1-2024`, `Q1-QTD-2024`, `Q1-YTD-2024`, `YTD-2024`, `At March 31, 2024`, each with any suffix
const PERIOD_HEADER_PATTERN: &str =
    r"(?i)^\s*(?:Q[1-4]\s*-\s*(?:(?:QTD|YTD)\s*-\s*)?\d{4}\b|YTD\s*-\s*\d{4}\b|At\s+[A-Za-z]+\.?\s+\d{1,2}\s*,\s*\d{4}\b)";

/// Metadata fields that open a metadata span besides the table title.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MetadataField {
    CategoryParent,
    LineItems,
    ProductEntity,
    ColumnHeader,
}

impl MetadataField {
    pub const ALL: [MetadataField; 4] = [
        MetadataField::CategoryParent,
        MetadataField::LineItems,
        MetadataField::ProductEntity,
        MetadataField::ColumnHeader,
    ];

    /// The literal cell prefix of the field.
    pub fn label(&self) -> &'static str {
        match self {
            MetadataField::CategoryParent => "Category (Parent):",
            MetadataField::LineItems => "Line Items:",
            MetadataField::ProductEntity => "Product/Entity:",
            MetadataField::ColumnHeader => "Column Header:",
        }
    }
}

/// Classification of one sheet row.
#[derive(Clone, Debug, PartialEq)]
pub enum RowTag {
    /// The back-link row an output sheet starts with
    BackLink,
    /// `Table Title:` with its value
    TitleMarker(String),
    /// `Source(s):` with its value; closes a metadata span
    SourceMarker(String),
    /// Any other metadata label with its value
    MetadataStart(MetadataField, String),
    /// Every cell empty or whitespace
    BlankSeparator,
    /// Unit indicator in the first cell followed by period headers
    UnitIndicatorHeader,
    /// Empty first cell and a majority of period headers
    PeriodHeader,
    /// Anything else
    Content,
}

impl RowTag {
    /// True for rows that start a new data block.
    pub fn is_header(&self) -> bool {
        matches!(self, RowTag::UnitIndicatorHeader | RowTag::PeriodHeader)
    }

    /// True for rows that belong to a metadata span.
    pub fn is_marker(&self) -> bool {
        matches!(self, RowTag::TitleMarker(_) | RowTag::SourceMarker(_) | RowTag::MetadataStart(..))
    }
}

/// A row index with its classification.
#[derive(Clone, Debug, PartialEq)]
pub struct TaggedRow {
    pub row: usize,
    pub tag: RowTag,
}

/// Recognizes metadata markers, separators, unit indicators and period headers.
pub struct MarkerScanner {
    unit_indicator: Regex,
    period_header: Regex,
    back_link_label: String,
}

impl MarkerScanner {
    pub fn new(back_link_label: &str) -> Result<Self, SplitterError> {
        Ok(MarkerScanner {
            unit_indicator: Regex::new(UNIT_INDICATOR_PATTERN)?,
            period_header: Regex::new(PERIOD_HEADER_PATTERN)?,
            back_link_label: back_link_label.trim().to_owned(),
        })
    }

    pub fn is_unit_indicator(&self, text: &str) -> bool {
        self.unit_indicator.is_match(text)
    }

    pub fn is_period_header(&self, text: &str) -> bool {
        self.period_header.is_match(text)
    }

    /// Tags every row of the grid, top to bottom.
    /// Rows recognized only through the unprefixed period-header rule are recorded as detection ambiguities.
    pub fn scan(&self, grid: &SheetGrid, reporter: &mut Reporter) -> Vec<TaggedRow> {
        let mut rows = Vec::with_capacity(grid.row_count());
        for row in 0..grid.row_count() {
            let tag = self.tag_row(row, grid.row(row));
            if tag == RowTag::PeriodHeader {
                reporter.record(
                    DiagnosticKind::DetectionAmbiguity,
                    &grid.name,
                    format!("block boundary at {} inferred from period headers without a unit indicator", index_to_reference(row, 0)),
                );
            }
            debug!(sheet = grid.name.as_str(), row, tag = ?tag, "tagged row");
            rows.push(TaggedRow { row, tag });
        }
        rows
    }

    /// Classifies one row; rules are evaluated in order and the first match wins.
    pub fn tag_row(&self, row: usize, cells: &[CellValue]) -> RowTag {
        let first = cells.first().map(|cell| cell.text()).unwrap_or_default();
        let first = first.trim();

        if row == 0 && !self.back_link_label.is_empty() && first == self.back_link_label {
            return RowTag::BackLink;
        }
        if let Some(value) = marker_value(first, TITLE_LABEL, cells) {
            return RowTag::TitleMarker(value);
        }
        if let Some(value) = marker_value(first, SOURCE_LABEL, cells) {
            return RowTag::SourceMarker(value);
        }
        for field in MetadataField::ALL {
            if let Some(value) = marker_value(first, field.label(), cells) {
                return RowTag::MetadataStart(field, value);
            }
        }
        if cells.iter().all(CellValue::is_blank) {
            return RowTag::BlankSeparator;
        }

        let rest = cells.get(1..).unwrap_or_default();
        if self.is_unit_indicator(first) && rest.iter().any(|cell| self.is_period_header(&cell.text())) {
            return RowTag::UnitIndicatorHeader;
        }
        if first.is_empty() {
            let filled = rest.iter().filter(|cell| !cell.is_blank()).count();
            let periods = rest.iter().filter(|cell| self.is_period_header(&cell.text())).count();
            if filled > 0 && periods * 2 > filled {
                return RowTag::PeriodHeader;
            }
        }
        RowTag::Content
    }
}

/// Value of a `Label: value` cell: the remainder after the label, or the next non-empty cell.
fn marker_value(first: &str, label: &str, cells: &[CellValue]) -> Option<String> {
    let remainder = first.strip_prefix(label)?.trim();
    if !remainder.is_empty() {
        return Some(remainder.to_owned());
    }
    let next = cells
        .iter()
        .skip(1)
        .find(|cell| !cell.is_blank())
        .map(|cell| cell.text().trim().to_owned())
        .unwrap_or_default();
    Some(next)
}
