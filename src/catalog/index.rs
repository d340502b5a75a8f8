//! Index sheet parsing and canonical ID assignment
use crate::catalog::report::DiagnosticKind;
use crate::catalog::report::Reporter;
use crate::catalog::CatalogError;
use crate::error::SplitterError;
use crate::spreadsheet::reference::parse_location;
use crate::spreadsheet::sheet::SheetGrid;
use crate::spreadsheet::Workbook;
use std::collections::HashMap;
use std::fmt;

/// Column positions of the index header. Only `link` is required.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexColumns {
    pub source: Option<usize>,
    pub page_no: Option<usize>,
    pub table_id: Option<usize>,
    pub location_id: Option<usize>,
    pub section: Option<usize>,
    pub table_title: Option<usize>,
    pub link: usize,
}

/// One catalog row of the index sheet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexEntry {
    /// Row of the entry in the index sheet
    pub row: usize,
    pub source: String,
    pub page_no: String,
    pub table_id: String,
    pub location_id: String,
    pub section: String,
    pub table_title: String,
    /// Name of the sheet the entry links to, as spelled in the workbook
    pub original_link: Option<String>,
}

impl IndexEntry {
    /// Grouping identity: trimmed section and title; missing values group as empty strings.
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            section: self.section.trim().to_owned(),
            table_title: self.table_title.trim().to_owned(),
        }
    }
}

/// The parsed index sheet.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexTable {
    pub header_row: usize,
    pub columns: IndexColumns,
    pub entries: Vec<IndexEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub section: String,
    pub table_title: String,
}

/// Index rows sharing one (section, title) identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalGroup {
    pub key: GroupKey,
    pub base_id: usize,
    pub next_suffix: usize,
}

/// `base_id` for the first occurrence of a group, `base_id_suffix` for the repeats.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FinalId {
    Base(usize),
    Sub(usize, usize),
}

impl fmt::Display for FinalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalId::Base(base) => write!(f, "{base}"),
            FinalId::Sub(base, suffix) => write!(f, "{base}_{suffix}"),
        }
    }
}

/// Entries paired with their FinalIDs, and the completed group table.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupedIndex {
    pub assignments: Vec<(IndexEntry, FinalId)>,
    pub groups: Vec<CanonicalGroup>,
}

/// Normalized header text: case, spaces and underscores are ignored.
fn normalize_header(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn locate_columns(grid: &SheetGrid, header_row: usize) -> Result<IndexColumns, SplitterError> {
    let mut positions = HashMap::<String, usize>::new();
    for (col, cell) in grid.row(header_row).iter().enumerate() {
        positions.entry(normalize_header(&cell.text())).or_insert(col);
    }
    let find = |name: &str| positions.get(name).copied();
    let link = find("link").ok_or_else(|| CatalogError::MissingIndexColumn(grid.name.to_owned(), "Link".to_owned()))?;
    Ok(IndexColumns {
        source: find("source"),
        page_no: find("pageno"),
        table_id: find("tableid"),
        location_id: find("locationid"),
        section: find("section"),
        table_title: find("tabletitle"),
        link,
    })
}

/// Reads the index sheet: the header is its first non-blank row, every later non-blank row is an entry.
/// Links that resolve to no sheet of the workbook are recorded and left unresolved.
pub fn read_index(grid: &SheetGrid, workbook: &Workbook, reporter: &mut Reporter) -> Result<IndexTable, SplitterError> {
    let header_row = (0..grid.row_count())
        .find(|row| !grid.is_row_blank(*row))
        .ok_or_else(|| CatalogError::MissingIndexHeader(grid.name.to_owned()))?;
    let columns = locate_columns(grid, header_row)?;
    let text = |row: usize, col: Option<usize>| {
        col.map(|col| grid.text(row, col).trim().to_owned()).unwrap_or_default()
    };

    let mut entries = Vec::new();
    for row in header_row + 1..grid.row_count() {
        if grid.is_row_blank(row) {
            continue;
        }
        let table_id = text(row, columns.table_id);
        let original_link = resolve_link(grid, row, &columns, &table_id, workbook);
        if original_link.is_none() {
            reporter.record(
                DiagnosticKind::UnresolvedLink,
                &grid.name,
                format!("row {} links to no sheet ('{}')", row + 1, grid.text(row, columns.link).trim()),
            );
        }
        entries.push(IndexEntry {
            row,
            source: text(row, columns.source),
            page_no: text(row, columns.page_no),
            table_id,
            location_id: text(row, columns.location_id),
            section: text(row, columns.section),
            table_title: text(row, columns.table_title),
            original_link,
        });
    }
    Ok(IndexTable {
        header_row,
        columns,
        entries,
    })
}

/// Resolves the sheet an index row links to. First match wins:
/// hyperlink on the Link cell, then Link text naming a sheet or a location, then Table_ID naming a sheet.
fn resolve_link(grid: &SheetGrid, row: usize, columns: &IndexColumns, table_id: &str, workbook: &Workbook) -> Option<String> {
    let existing = |name: &str| workbook.sheet(name).map(|sheet| sheet.name.to_owned());
    let from_hyperlink = grid
        .hyperlink_at(row, columns.link)
        .and_then(|link| link.internal_sheet())
        .and_then(existing);
    if from_hyperlink.is_some() {
        return from_hyperlink;
    }
    let link_text = grid.text(row, columns.link);
    let link_text = link_text.trim();
    existing(link_text)
        .or_else(|| parse_location(link_text).and_then(|(sheet, _)| existing(&sheet)))
        .or_else(|| Some(table_id).filter(|id| !id.is_empty()).and_then(existing))
}

/// Assigns FinalIDs in one left-to-right pass. Base ids are dense and start at 1.
pub fn group_entries(entries: &[IndexEntry]) -> GroupedIndex {
    let mut groups = Vec::<CanonicalGroup>::new();
    let mut positions = HashMap::<GroupKey, usize>::new();
    let mut assignments = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = entry.group_key();
        let final_id = match positions.get(&key) {
            Some(position) => {
                let group = &mut groups[*position];
                let final_id = FinalId::Sub(group.base_id, group.next_suffix);
                group.next_suffix += 1;
                final_id
            }
            None => {
                let base_id = groups.len() + 1;
                positions.insert(key.clone(), groups.len());
                groups.push(CanonicalGroup {
                    key,
                    base_id,
                    next_suffix: 1,
                });
                FinalId::Base(base_id)
            }
        };
        assignments.push((entry.clone(), final_id));
    }
    GroupedIndex { assignments, groups }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::CellValue;
    use crate::spreadsheet::sheet::Hyperlink;

    fn entry(section: &str, title: &str) -> IndexEntry {
        IndexEntry {
            section: section.to_owned(),
            table_title: title.to_owned(),
            ..IndexEntry::default()
        }
    }

    fn ids(grouped: &GroupedIndex) -> Vec<String> {
        grouped.assignments.iter().map(|(_, id)| id.to_string()).collect()
    }

    #[test]
    fn groups_by_section_and_title() {
        let entries = vec![
            entry("Equity", "Net Revenues"),
            entry("Equity", "Net Revenues"),
            entry("Equity", "Expenses"),
            entry("Equity", " Net Revenues "),
            entry("Wealth", "Net Revenues"),
        ];
        let grouped = group_entries(&entries);
        assert_eq!(ids(&grouped), vec!["1", "1_1", "2", "1_2", "3"]);
        assert_eq!(grouped.groups.len(), 3);
        assert_eq!(grouped.groups[0].next_suffix, 3);
        // Re-running yields the same ids
        assert_eq!(ids(&group_entries(&entries)), ids(&grouped));
    }

    #[test]
    fn dash_ids_are_rederived_from_identity() {
        let mut same = entry("Equity", "Net Revenues");
        same.table_id = "4-1".to_owned();
        let mut other = entry("Equity", "Other");
        other.table_id = "4-2".to_owned();
        let grouped = group_entries(&[entry("Equity", "Net Revenues"), same, other, entry("", "")]);
        assert_eq!(ids(&grouped), vec!["1", "1_1", "2", "3"]);
        let bases: Vec<usize> = grouped.groups.iter().map(|group| group.base_id).collect();
        assert_eq!(bases, vec![1, 2, 3]);
    }

    #[test]
    fn reads_entries_and_resolves_links() -> Result<(), SplitterError> {
        let row = |values: &[&str]| values.iter().map(|value| CellValue::from(*value)).collect::<Vec<_>>();
        let mut index = SheetGrid::from_rows("Index", vec![
            vec![],
            row(&["Source", "PageNo", "Table_ID", "Location_ID", "Section", "Table Title", "LINK"]),
            row(&["10-K", "4", "1", "L1", "Equity", "Net Revenues", "8"]),
            vec![],
            row(&["10-K", "5", "2", "L2", "Equity", "Expenses", "see sheet"]),
            row(&["10-K", "6", "9", "L3", "Equity", "Other", "'9'!A1"]),
            row(&["10-K", "7", "77", "L4", "Equity", "Missing", "nowhere"]),
        ]);
        index.hyperlinks.push(Hyperlink::internal(4, 6, "12"));
        let workbook = Workbook {
            sheets: vec![
                index.clone(),
                SheetGrid::from_rows("8", vec![]),
                SheetGrid::from_rows("9", vec![]),
                SheetGrid::from_rows("12", vec![]),
            ],
            ..Workbook::default()
        };
        let mut reporter = Reporter::new();
        let table = read_index(&index, &workbook, &mut reporter)?;
        assert_eq!(table.header_row, 1);
        assert_eq!(table.columns.link, 6);
        assert_eq!(table.columns.table_title, Some(5));
        let links: Vec<Option<&str>> = table.entries.iter().map(|entry| entry.original_link.as_deref()).collect();
        assert_eq!(links, vec![Some("8"), Some("12"), Some("9"), None]);
        assert_eq!(table.entries[1].row, 4);
        assert_eq!(reporter.count(DiagnosticKind::UnresolvedLink), 1);
        Ok(())
    }

    #[test]
    fn missing_link_column_is_structural() {
        let index = SheetGrid::from_rows("Index", vec![vec![CellValue::from("Source")]]);
        let mut reporter = Reporter::new();
        let error = read_index(&index, &Workbook::default(), &mut reporter).expect_err("no link column");
        assert!(error.is_structural());
    }
}
