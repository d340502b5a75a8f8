//! Cross-reference repair after splitting and renaming
use crate::catalog::index::FinalId;
use crate::catalog::index::IndexTable;
use crate::catalog::split::OutputSheet;
use crate::catalog::split::BACK_LINK_ROW;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::sheet::Hyperlink;
use crate::spreadsheet::sheet::LinkTarget;
use crate::spreadsheet::sheet::SheetGrid;
use std::collections::HashMap;
use std::collections::HashSet;

/// Final placement of one surviving index entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryTarget {
    pub final_id: FinalId,
    pub sheet_name: String,
}

pub struct LinkRewriter<'a> {
    index_sheet: &'a str,
}

impl<'a> LinkRewriter<'a> {
    pub fn new(index_sheet: &'a str) -> Self {
        LinkRewriter { index_sheet }
    }

    /// Rebuilds the index sheet: discarded rows are removed, every surviving entry's Link cell
    /// names its final sheet (text and hyperlink) and its Table_ID cell carries the FinalID.
    pub fn rewrite_index(
        &self,
        index: &SheetGrid,
        table: &IndexTable,
        targets: &HashMap<usize, EntryTarget>,
        discarded: &HashSet<usize>,
    ) -> SheetGrid {
        let mut rows = Vec::with_capacity(index.row_count());
        let mut moved = HashMap::<usize, usize>::new();
        for (row, cells) in index.rows.iter().enumerate() {
            if discarded.contains(&row) {
                continue;
            }
            moved.insert(row, rows.len());
            let mut cells = cells.to_vec();
            if let Some(target) = targets.get(&row) {
                set_cell(&mut cells, table.columns.link, CellValue::from(target.sheet_name.as_str()));
                if let Some(col) = table.columns.table_id {
                    let id = match target.final_id {
                        FinalId::Base(base) => CellValue::Number(base.to_string()),
                        FinalId::Sub(..) => CellValue::from(target.final_id.to_string()),
                    };
                    set_cell(&mut cells, col, id);
                }
            }
            rows.push(cells);
        }

        let mut grid = SheetGrid::from_rows(&index.name, rows);
        grid.hyperlinks = index.hyperlinks
            .iter()
            .filter(|link| !targets.contains_key(&link.row) || link.col != table.columns.link)
            .filter_map(|link| moved.get(&link.row).map(|row| Hyperlink { row: *row, ..link.clone() }))
            .collect();
        for (row, target) in targets {
            if let Some(row) = moved.get(row) {
                grid.hyperlinks.push(Hyperlink::internal(*row, table.columns.link, &target.sheet_name));
            }
        }
        grid.hyperlinks.sort_by_key(|link| (link.row, link.col));
        grid
    }

    /// Points every output sheet's back-link cell at the index sheet.
    pub fn add_back_links(&self, outputs: &mut [OutputSheet]) {
        for output in outputs {
            output.grid.hyperlinks.retain(|link| link.row != BACK_LINK_ROW || link.col != 0);
            output.grid.hyperlinks.push(Hyperlink::internal(BACK_LINK_ROW, 0, self.index_sheet));
        }
    }

    /// Redirects internal links aimed at a split source sheet to the first sheet produced from it.
    /// `redirects` is keyed by lowercase source name. Returns the number of links changed.
    pub fn repair_links(&self, sheet: &mut SheetGrid, redirects: &HashMap<String, String>) -> usize {
        let mut repaired = 0;
        for link in &mut sheet.hyperlinks {
            if let LinkTarget::Internal { sheet: target, .. } = &mut link.target {
                if let Some(replacement) = redirects.get(&target.to_lowercase()) {
                    if *target != *replacement {
                        *target = replacement.to_owned();
                        repaired += 1;
                    }
                }
            }
        }
        repaired
    }
}

fn set_cell(cells: &mut Vec<CellValue>, col: usize, value: CellValue) {
    if cells.len() <= col {
        cells.resize(col + 1, CellValue::Empty);
    }
    cells[col] = value;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::index::IndexColumns;
    use crate::catalog::index::IndexEntry;
    use crate::spreadsheet::reference::parse_location;

    fn index_grid() -> SheetGrid {
        let row = |values: &[&str]| values.iter().map(|value| CellValue::from(*value)).collect::<Vec<_>>();
        let mut grid = SheetGrid::from_rows("Index", vec![
            row(&["Table_ID", "Table Title", "Link", "Notes"]),
            row(&["1", "Net Revenues", "8"]),
            row(&["1", "Net Revenues", "8"]),
            row(&["2", "Expenses", "8", "see 8"]),
        ]);
        grid.hyperlinks.push(Hyperlink::internal(1, 2, "8"));
        grid.hyperlinks.push(Hyperlink::internal(2, 2, "8"));
        grid.hyperlinks.push(Hyperlink::internal(3, 2, "8"));
        grid.hyperlinks.push(Hyperlink::internal(3, 3, "8"));
        grid
    }

    fn table() -> IndexTable {
        IndexTable {
            header_row: 0,
            columns: IndexColumns { table_id: Some(0), table_title: Some(1), link: 2, ..IndexColumns::default() },
            entries: (1..=3).map(|row| IndexEntry { row, ..IndexEntry::default() }).collect(),
        }
    }

    #[test]
    fn index_rows_are_rewritten_and_discarded_rows_removed() {
        let mut targets = HashMap::new();
        targets.insert(1, EntryTarget { final_id: FinalId::Base(1), sheet_name: "1".to_owned() });
        targets.insert(3, EntryTarget { final_id: FinalId::Sub(2, 1), sheet_name: "2_1 (1)".to_owned() });
        let discarded: HashSet<usize> = [2].into_iter().collect();

        let rewriter = LinkRewriter::new("Index");
        let mut grid = rewriter.rewrite_index(&index_grid(), &table(), &targets, &discarded);
        assert_eq!(grid.row_count(), 3);
        assert_eq!(grid.cell(1, 0), &CellValue::Number("1".to_owned()));
        assert_eq!(grid.text(2, 0), "2_1");
        assert_eq!(grid.text(2, 2), "2_1 (1)");
        assert_eq!(grid.hyperlink_at(2, 2).and_then(Hyperlink::internal_sheet), Some("2_1 (1)"));
        // Non-link hyperlinks move with their row
        assert_eq!(grid.hyperlink_at(2, 3).and_then(Hyperlink::internal_sheet), Some("8"));
        assert_eq!(grid.hyperlinks.len(), 3);

        let mut redirects = HashMap::new();
        redirects.insert("8".to_owned(), "1".to_owned());
        assert_eq!(rewriter.repair_links(&mut grid, &redirects), 1);
        assert_eq!(grid.hyperlink_at(2, 3).and_then(Hyperlink::internal_sheet), Some("1"));
    }

    #[test]
    fn back_links_point_at_the_index() {
        let mut outputs = vec![OutputSheet {
            temp_name: "tmp_a".to_owned(),
            final_id: FinalId::Base(1),
            entry_row: 1,
            source_sheet: None,
            grid: SheetGrid::from_rows("1", vec![vec![CellValue::from("← Back to Index")]]),
        }];
        LinkRewriter::new("Index").add_back_links(&mut outputs);
        let link = outputs[0].grid.hyperlink_at(0, 0).cloned();
        assert_eq!(link.map(|link| link.target), Some(LinkTarget::Internal { sheet: "Index".to_owned(), cell: "A1".to_owned() }));
        assert_eq!(parse_location("'Index'!A1").map(|(sheet, _)| sheet), Some("Index".to_owned()));
    }
}
