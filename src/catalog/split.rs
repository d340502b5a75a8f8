//! Materializes one sheet per finalized table block
use crate::catalog::block::MetadataBlock;
use crate::catalog::block::TableBlock;
use crate::catalog::index::FinalId;
use crate::catalog::marker::MetadataField;
use crate::catalog::marker::SOURCE_LABEL;
use crate::catalog::marker::TITLE_LABEL;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::sheet::Hyperlink;
use crate::spreadsheet::sheet::SheetGrid;
use std::collections::HashSet;
use uuid::Uuid;

/// Row of the back-link in every output sheet
pub const BACK_LINK_ROW: usize = 0;

/// A sheet produced for one index entry, still under its temporary name.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputSheet {
    pub temp_name: String,
    pub final_id: FinalId,
    /// Row of the index entry this sheet belongs to
    pub entry_row: usize,
    /// Sheet the block was cut from; `None` for padded entries without a sheet
    pub source_sheet: Option<String>,
    pub grid: SheetGrid,
}

/// Writes output sheets: back-link, metadata, a blank row, then the data span.
pub struct SheetSplitter<'a> {
    back_link_label: &'a str,
}

impl<'a> SheetSplitter<'a> {
    pub fn new(back_link_label: &'a str) -> Self {
        SheetSplitter { back_link_label }
    }

    /// Builds the sheet for one block under a fresh temporary name not in `taken`.
    /// Hyperlinks anchored in copied rows move with their rows.
    pub fn split(
        &self,
        source: Option<&SheetGrid>,
        block: &TableBlock,
        final_id: FinalId,
        entry_row: usize,
        taken: &mut HashSet<String>,
    ) -> OutputSheet {
        let temp_name = temporary_name(taken);
        let mut rows = vec![vec![CellValue::from(self.back_link_label)]];
        rows.extend(render_metadata(block.metadata.as_ref().unwrap_or(&MetadataBlock::default())));
        rows.push(Vec::new());

        let mut hyperlinks = Vec::new();
        if let Some(source) = source {
            for source_row in block.data.rows() {
                let row = rows.len();
                rows.push(source.row(source_row).to_vec());
                hyperlinks.extend(
                    source.hyperlinks
                        .iter()
                        .filter(|link| link.row == source_row)
                        .map(|link| Hyperlink { row, ..link.clone() }),
                );
            }
        }

        let mut grid = SheetGrid::from_rows(&temp_name, rows);
        grid.hyperlinks = hyperlinks;
        OutputSheet {
            temp_name,
            final_id,
            entry_row,
            source_sheet: source.map(|source| source.name.to_owned()),
            grid,
        }
    }
}

/// `tmp_` plus twelve random hex digits, retried until unused.
fn temporary_name(taken: &mut HashSet<String>) -> String {
    loop {
        let token = Uuid::new_v4().simple().to_string();
        let name = format!("tmp_{}", &token[..12]);
        if taken.insert(name.to_lowercase()) {
            return name;
        }
    }
}

/// One `Label value` cell per populated field; title and sources are always written.
fn render_metadata(metadata: &MetadataBlock) -> Vec<Vec<CellValue>> {
    let mut rows = Vec::new();
    for field in MetadataField::ALL {
        let value = match field {
            MetadataField::CategoryParent => &metadata.category_parent,
            MetadataField::LineItems => &metadata.line_items,
            MetadataField::ProductEntity => &metadata.product_entity,
            MetadataField::ColumnHeader => &metadata.column_header,
        };
        if !value.is_empty() {
            rows.push(vec![labelled(field.label(), value)]);
        }
    }
    rows.push(vec![labelled(TITLE_LABEL, &metadata.table_title)]);
    rows.push(vec![labelled(SOURCE_LABEL, &metadata.sources)]);
    rows
}

fn labelled(label: &str, value: &str) -> CellValue {
    CellValue::from(format!("{label} {value}").trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::block::DataBlock;

    #[test]
    fn output_sheet_layout() {
        let mut source = SheetGrid::from_rows("8", vec![
            vec![CellValue::from("Table Title: Net Revenues")],
            vec![CellValue::from("Source(s): 10-K")],
            vec![CellValue::from("$ in millions"), CellValue::from("Q1-2024")],
            vec![CellValue::from("Revenue"), CellValue::Number("10".to_owned())],
        ]);
        source.hyperlinks.push(Hyperlink::internal(3, 0, "9"));
        let block = TableBlock {
            metadata: Some(MetadataBlock {
                line_items: "Revenue".to_owned(),
                ..MetadataBlock::minimal("Net Revenues", "10-K")
            }),
            data: DataBlock { header_row: Some(2), data_rows: vec![3] },
            span: 0..4,
        };
        let mut taken = HashSet::new();
        let output = SheetSplitter::new("← Back to Index").split(Some(&source), &block, FinalId::Sub(8, 1), 3, &mut taken);

        assert!(output.temp_name.starts_with("tmp_"));
        assert_eq!(output.temp_name.len(), 16);
        assert!(taken.contains(&output.temp_name.to_lowercase()));
        assert_eq!(output.grid.name, output.temp_name);
        assert_eq!(output.source_sheet.as_deref(), Some("8"));
        let texts: Vec<String> = (0..output.grid.row_count()).map(|row| output.grid.text(row, 0).into_owned()).collect();
        assert_eq!(texts, vec![
            "← Back to Index",
            "Line Items: Revenue",
            "Table Title: Net Revenues",
            "Source(s): 10-K",
            "",
            "$ in millions",
            "Revenue",
        ]);
        assert_eq!(output.grid.cell(6, 1), &CellValue::Number("10".to_owned()));
        assert_eq!(output.grid.hyperlink_at(6, 0).and_then(Hyperlink::internal_sheet), Some("9"));
    }

    #[test]
    fn padded_block_has_metadata_only() {
        let block = TableBlock {
            metadata: Some(MetadataBlock::minimal("Missing", "")),
            ..TableBlock::default()
        };
        let output = SheetSplitter::new("← Back to Index").split(None, &block, FinalId::Base(4), 9, &mut HashSet::new());
        assert_eq!(output.grid.row_count(), 4);
        assert_eq!(output.grid.text(2, 0), "Source(s):");
        assert_eq!(output.source_sheet, None);
    }
}
