//! Table-block detection inside one worksheet
use crate::catalog::marker::MarkerScanner;
use crate::catalog::marker::MetadataField;
use crate::catalog::marker::RowTag;
use crate::catalog::marker::TaggedRow;
use crate::catalog::report::DiagnosticKind;
use crate::catalog::report::Reporter;
use crate::spreadsheet::sheet::SheetGrid;
use std::ops::Range;

/// Descriptive header of one table instance. Any field may be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataBlock {
    pub category_parent: String,
    pub line_items: String,
    pub product_entity: String,
    pub column_header: String,
    pub table_title: String,
    pub sources: String,
}

impl MetadataBlock {
    /// A minimal block carries only a title and sources.
    pub fn minimal(table_title: &str, sources: &str) -> Self {
        MetadataBlock {
            table_title: table_title.to_owned(),
            sources: sources.to_owned(),
            ..MetadataBlock::default()
        }
    }

    pub fn is_minimal(&self) -> bool {
        self.category_parent.is_empty()
            && self.line_items.is_empty()
            && self.product_entity.is_empty()
            && self.column_header.is_empty()
    }

    fn set(&mut self, field: MetadataField, value: String) {
        match field {
            MetadataField::CategoryParent => self.category_parent = value,
            MetadataField::LineItems => self.line_items = value,
            MetadataField::ProductEntity => self.product_entity = value,
            MetadataField::ColumnHeader => self.column_header = value,
        }
    }
}

/// Tabular payload of one table instance, as row indexes into the source grid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataBlock {
    pub header_row: Option<usize>,
    pub data_rows: Vec<usize>,
}

impl DataBlock {
    pub fn is_empty(&self) -> bool {
        self.header_row.is_none() && self.data_rows.is_empty()
    }

    /// Header row followed by data rows.
    pub fn rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.header_row.into_iter().chain(self.data_rows.iter().copied())
    }

    fn push(&mut self, row: usize) {
        if self.header_row.is_none() {
            self.header_row = Some(row);
        } else {
            self.data_rows.push(row);
        }
    }
}

/// One table instance found in a sheet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableBlock {
    pub metadata: Option<MetadataBlock>,
    pub data: DataBlock,
    /// Source rows covered by the block, metadata included
    pub span: Range<usize>,
}

impl TableBlock {
    fn open(metadata: Option<MetadataBlock>, start: usize) -> Self {
        TableBlock {
            metadata,
            data: DataBlock::default(),
            span: start..start,
        }
    }

    fn extend_to(&mut self, row: usize) {
        self.span.end = self.span.end.max(row + 1);
    }
}

/// Outcome of block detection for one sheet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detection {
    pub sheet_name: String,
    /// Blocks in source order
    pub blocks: Vec<TableBlock>,
    /// Whether the sheet carries any metadata marker
    pub has_markers: bool,
    /// For sheets without markers: segments split on header rows, or else on blank rows
    pub fallback_segments: Vec<TableBlock>,
}

/// Splits a sheet into table blocks using the marker stream.
pub struct BlockDetector<'a> {
    scanner: &'a MarkerScanner,
}

impl<'a> BlockDetector<'a> {
    pub fn new(scanner: &'a MarkerScanner) -> Self {
        BlockDetector { scanner }
    }

    pub fn detect(&self, grid: &SheetGrid, reporter: &mut Reporter) -> Detection {
        let rows = self.scanner.scan(grid, reporter);
        let has_markers = rows.iter().any(|tagged| tagged.tag.is_marker());
        if has_markers {
            Detection {
                sheet_name: grid.name.to_owned(),
                blocks: detect_marked(&rows),
                has_markers,
                fallback_segments: Vec::new(),
            }
        } else {
            let block = detect_unmarked(&rows);
            let segments = fallback_segments(&rows);
            if segments.len() <= 1 {
                reporter.record(
                    DiagnosticKind::PassThrough,
                    &grid.name,
                    "no metadata markers and no repeating structure; sheet content kept as one table",
                );
            }
            Detection {
                sheet_name: grid.name.to_owned(),
                blocks: block.into_iter().collect(),
                has_markers,
                fallback_segments: segments,
            }
        }
    }
}

/// Marker-driven detection.
///
/// A metadata span opens at a title or metadata row and closes at the source marker (inclusive)
/// or at the first payload row. Rows after it form the first data block of that metadata; a blank
/// row, or a later header row with data above it, ends that block, and the next payload row starts
/// another one carrying a copy of the same metadata.
fn detect_marked(rows: &[TaggedRow]) -> Vec<TableBlock> {
    let mut state = MarkedState::default();
    for tagged in rows {
        let row = tagged.row;
        match &tagged.tag {
            RowTag::BackLink => (),
            RowTag::BlankSeparator => {
                // Blank rows inside a metadata span or ahead of any data are layout only
                if state.current.as_ref().map(|block| !block.data.is_empty()).unwrap_or(false) {
                    state.close_block();
                }
            }
            RowTag::TitleMarker(value) => {
                let titled = state.span.as_ref().map(|(metadata, _)| !metadata.table_title.is_empty());
                if titled.unwrap_or(true) {
                    state.close_span(None);
                    state.close_block();
                    state.span = Some((MetadataBlock::default(), row));
                }
                if let Some((metadata, _)) = state.span.as_mut() {
                    metadata.table_title = value.to_owned();
                }
            }
            RowTag::MetadataStart(field, value) => {
                if state.span.is_none() {
                    state.close_block();
                    state.span = Some((MetadataBlock::default(), row));
                }
                if let Some((metadata, _)) = state.span.as_mut() {
                    metadata.set(*field, value.to_owned());
                }
            }
            RowTag::SourceMarker(value) => {
                if let Some((metadata, _)) = state.span.as_mut() {
                    metadata.sources = value.to_owned();
                    state.close_span(Some(row));
                } else if !state.attach_sources(row, value) {
                    state.push_row(row, false);
                }
            }
            tag => {
                // Any payload row ends a span that has no source marker
                state.close_span(None);
                state.push_row(row, tag.is_header());
            }
        }
    }
    state.close_span(None);
    state.close_block();
    state.blocks
}

#[derive(Default)]
struct MarkedState {
    blocks: Vec<TableBlock>,
    /// Metadata span being read, with its first row
    span: Option<(MetadataBlock, usize)>,
    /// Metadata of the latest closed span, copied into every block that follows it
    metadata: Option<MetadataBlock>,
    /// Block receiving rows
    current: Option<TableBlock>,
}

impl MarkedState {
    /// Closes the open metadata span and opens its first block. `end` is the row closing the span, if any.
    fn close_span(&mut self, end: Option<usize>) {
        if let Some((metadata, start)) = self.span.take() {
            self.close_block();
            let mut block = TableBlock::open(Some(metadata.clone()), start);
            if let Some(end) = end {
                block.extend_to(end);
            }
            self.metadata = Some(metadata);
            self.current = Some(block);
        }
    }

    /// Pushes the open block, data or not: metadata without data still describes a table.
    fn close_block(&mut self) {
        if let Some(block) = self.current.take() {
            self.blocks.push(block);
        }
    }

    /// A trailing source note fills the sources of the block above it, even across blank rows.
    /// Returns false when that block already has sources.
    fn attach_sources(&mut self, row: usize, value: &str) -> bool {
        let block = match self.current.as_mut() {
            Some(block) => Some(block),
            None => self.blocks.last_mut(),
        };
        let Some(block) = block else {
            return false;
        };
        match block.metadata.as_mut() {
            Some(metadata) if metadata.sources.is_empty() => metadata.sources = value.to_owned(),
            _ => return false,
        }
        block.extend_to(row);
        if let Some(metadata) = self.metadata.as_mut() {
            if metadata.sources.is_empty() {
                metadata.sources = value.to_owned();
            }
        }
        true
    }

    fn push_row(&mut self, row: usize, is_header: bool) {
        let starts_new = is_header
            && self.current.as_ref().map(|block| !block.data.data_rows.is_empty()).unwrap_or(false);
        if starts_new {
            self.close_block();
        }
        let metadata = &self.metadata;
        let block = self.current.get_or_insert_with(|| TableBlock::open(metadata.clone(), row));
        block.data.push(row);
        block.extend_to(row);
    }
}

/// Without markers the whole non-blank content is one block with no metadata.
fn detect_unmarked(rows: &[TaggedRow]) -> Option<TableBlock> {
    let mut block: Option<TableBlock> = None;
    for tagged in rows.iter().filter(|tagged| is_payload(&tagged.tag)) {
        let block = block.get_or_insert_with(|| TableBlock::open(None, tagged.row));
        block.data.push(tagged.row);
        block.extend_to(tagged.row);
    }
    block
}

/// Segments of a marker-less sheet: split on header rows when there are at least two,
/// otherwise on runs of blank rows.
fn fallback_segments(rows: &[TaggedRow]) -> Vec<TableBlock> {
    let header_count = rows.iter().filter(|tagged| tagged.tag.is_header()).count();
    let mut segments = Vec::<TableBlock>::new();
    let mut current: Option<TableBlock> = None;
    for tagged in rows {
        let boundary = if header_count >= 2 {
            tagged.tag.is_header()
        } else {
            tagged.tag == RowTag::BlankSeparator
        };
        if boundary {
            if let Some(segment) = current.take() {
                segments.push(segment);
            }
        }
        if is_payload(&tagged.tag) {
            let segment = current.get_or_insert_with(|| TableBlock::open(None, tagged.row));
            segment.data.push(tagged.row);
            segment.extend_to(tagged.row);
        }
    }
    segments.extend(current);
    segments
}

fn is_payload(tag: &RowTag) -> bool {
    !matches!(tag, RowTag::BackLink | RowTag::BlankSeparator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::CellValue;

    fn grid(rows: &[&[&str]]) -> SheetGrid {
        SheetGrid::from_rows(
            "8",
            rows.iter()
                .map(|row| row.iter().map(|value| CellValue::from(*value)).collect())
                .collect(),
        )
    }

    fn detect(grid: &SheetGrid) -> (Detection, Reporter) {
        let scanner = MarkerScanner::new("← Back to Index").expect("valid patterns");
        let mut reporter = Reporter::new();
        let detection = BlockDetector::new(&scanner).detect(grid, &mut reporter);
        (detection, reporter)
    }

    #[test]
    fn full_metadata_blocks_are_independent() {
        let grid = grid(&[
            &["Category (Parent): Equity"],
            &["Table Title: Net Revenues"],
            &["Source(s): 10-K"],
            &["$ in millions", "Q1-2024", "Q2-2024"],
            &["Revenue", "1", "2"],
            &[""],
            &["Table Title: Expenses"],
            &["Source(s): 10-Q"],
            &["Item", "Amount"],
            &["Rent", "3"],
        ]);
        let (detection, _) = detect(&grid);
        assert!(detection.has_markers);
        assert_eq!(detection.blocks.len(), 2);

        let first = &detection.blocks[0];
        let metadata = first.metadata.as_ref().expect("metadata");
        assert_eq!(metadata.category_parent, "Equity");
        assert_eq!(metadata.table_title, "Net Revenues");
        assert_eq!(metadata.sources, "10-K");
        assert_eq!(first.data, DataBlock { header_row: Some(3), data_rows: vec![4] });
        assert_eq!(first.span, 0..5);

        let second = &detection.blocks[1];
        let metadata = second.metadata.as_ref().expect("metadata");
        assert!(metadata.is_minimal());
        assert_eq!(metadata.table_title, "Expenses");
        assert_eq!(second.data, DataBlock { header_row: Some(8), data_rows: vec![9] });
        assert_eq!(second.span, 6..10);
    }

    #[test]
    fn repeated_headers_share_copied_metadata() {
        let grid = grid(&[
            &["Table Title: Net Revenues"],
            &["Source(s): 10-K"],
            &["$ in millions", "Q1-2024", "Q2-2024"],
            &["Revenue", "1", "2"],
            &[""],
            &["$ in millions", "Q1-QTD-2024", "Q2-QTD-2024"],
            &["Revenue", "3", "4"],
            &["", ""],
            &["", "Q1-YTD-2024", "Q2-YTD-2024"],
            &["Revenue", "5", "6"],
        ]);
        let (detection, reporter) = detect(&grid);
        assert_eq!(detection.blocks.len(), 3);
        for block in &detection.blocks {
            assert_eq!(block.metadata, Some(MetadataBlock::minimal("Net Revenues", "10-K")));
            assert_eq!(block.data.data_rows.len(), 1);
        }
        assert_eq!(detection.blocks[1].data.header_row, Some(5));
        assert_eq!(detection.blocks[2].data.header_row, Some(8));
        assert_eq!(reporter.count(DiagnosticKind::DetectionAmbiguity), 1);
    }

    #[test]
    fn stacked_header_lines_stay_in_one_block() {
        let grid = grid(&[
            &["Table Title: Balances"],
            &["Source(s): 10-K"],
            &["$ in millions", "Q1-2024"],
            &["", "At March 31, 2024"],
            &["Cash", "7"],
        ]);
        let (detection, _) = detect(&grid);
        assert_eq!(detection.blocks.len(), 1);
        assert_eq!(detection.blocks[0].data, DataBlock { header_row: Some(2), data_rows: vec![3, 4] });
    }

    #[test]
    fn output_sheet_layout_is_a_single_block() {
        let grid = grid(&[
            &["← Back to Index"],
            &["Table Title: Net Revenues"],
            &["Source(s): 10-K, page 4"],
            &[""],
            &["$ in millions", "Q1-2024"],
            &["Revenue", "1"],
        ]);
        let (detection, _) = detect(&grid);
        assert_eq!(detection.blocks.len(), 1);
        assert_eq!(detection.blocks[0].span, 1..6);
    }

    #[test]
    fn metadata_without_data_is_kept() {
        let grid = grid(&[
            &["Table Title: Empty"],
            &["Source(s): 10-K"],
            &[""],
            &["Table Title: Next"],
            &["Source(s): 10-Q"],
            &["A", "B"],
        ]);
        let (detection, _) = detect(&grid);
        assert_eq!(detection.blocks.len(), 2);
        assert!(detection.blocks[0].data.is_empty());
        assert_eq!(detection.blocks[1].data.header_row, Some(5));
    }

    #[test]
    fn title_without_sources_keeps_its_table() {
        let grid = grid(&[
            &["Table Title: Net Revenues"],
            &["Item", "Amount"],
            &["Rent", "3"],
            &["Fees", "4"],
        ]);
        let (detection, _) = detect(&grid);
        assert_eq!(detection.blocks.len(), 1);
        assert_eq!(detection.blocks[0].metadata, Some(MetadataBlock::minimal("Net Revenues", "")));
        assert_eq!(detection.blocks[0].data, DataBlock { header_row: Some(1), data_rows: vec![2, 3] });
        assert_eq!(detection.blocks[0].span, 0..4);
    }

    #[test]
    fn source_footer_below_data_fills_sources() {
        let grid = grid(&[
            &["Table Title: Net Revenues"],
            &["Item", "Amount"],
            &["Rent", "3"],
            &[""],
            &["Source(s): 10-K"],
        ]);
        let (detection, _) = detect(&grid);
        assert_eq!(detection.blocks.len(), 1);
        assert_eq!(detection.blocks[0].metadata, Some(MetadataBlock::minimal("Net Revenues", "10-K")));
        assert_eq!(detection.blocks[0].data, DataBlock { header_row: Some(1), data_rows: vec![2] });
        assert_eq!(detection.blocks[0].span, 0..5);
    }

    #[test]
    fn blank_row_ends_a_data_block() {
        let grid = grid(&[
            &["Table Title: Net Revenues"],
            &["Source(s): 10-K"],
            &["$ in millions", "Q1-2024"],
            &["Revenue", "1"],
            &[""],
            &["Item", "Amount"],
            &["Rent", "3"],
        ]);
        let (detection, _) = detect(&grid);
        assert_eq!(detection.blocks.len(), 2);
        assert_eq!(detection.blocks[0].data, DataBlock { header_row: Some(2), data_rows: vec![3] });
        assert_eq!(detection.blocks[1].data, DataBlock { header_row: Some(5), data_rows: vec![6] });
        for block in &detection.blocks {
            assert_eq!(block.metadata, Some(MetadataBlock::minimal("Net Revenues", "10-K")));
        }
    }

    #[test]
    fn unmarked_sheet_is_one_block_with_segments() {
        let grid = grid(&[
            &["Item", "Amount"],
            &["Rent", "3"],
            &[""],
            &[""],
            &["Item", "Amount"],
            &["Fees", "4"],
        ]);
        let (detection, reporter) = detect(&grid);
        assert!(!detection.has_markers);
        assert_eq!(detection.blocks.len(), 1);
        assert_eq!(detection.blocks[0].metadata, None);
        assert_eq!(detection.blocks[0].data.data_rows, vec![1, 4, 5]);
        assert_eq!(detection.fallback_segments.len(), 2);
        assert_eq!(detection.fallback_segments[1].data.header_row, Some(4));
        assert_eq!(reporter.count(DiagnosticKind::PassThrough), 0);
    }

    #[test]
    fn structureless_sheet_is_passed_through() {
        let grid = grid(&[&["Note"], &["Some text"]]);
        let (detection, reporter) = detect(&grid);
        assert_eq!(detection.blocks.len(), 1);
        assert_eq!(detection.fallback_segments.len(), 1);
        assert_eq!(reporter.count(DiagnosticKind::PassThrough), 1);
    }
}
