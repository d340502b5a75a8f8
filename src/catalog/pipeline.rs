//! The per-workbook pipeline: read model in, write plan out, one final write
use crate::catalog::block::BlockDetector;
use crate::catalog::block::Detection;
use crate::catalog::index::group_entries;
use crate::catalog::index::read_index;
use crate::catalog::index::IndexEntry;
use crate::catalog::link::EntryTarget;
use crate::catalog::link::LinkRewriter;
use crate::catalog::marker::MarkerScanner;
use crate::catalog::reconcile::reconcile;
use crate::catalog::rename;
use crate::catalog::rename::SafeRenamer;
use crate::catalog::report::Reporter;
use crate::catalog::report::WorkbookReport;
use crate::catalog::split::OutputSheet;
use crate::catalog::split::SheetSplitter;
use crate::catalog::CatalogError;
use crate::error::ResultMessage;
use crate::error::SplitterError;
use crate::settings::Settings;
use crate::spreadsheet::sheet::SheetGrid;
use crate::spreadsheet::writer::write_workbook;
use crate::spreadsheet::Workbook;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;
use tracing::info;

/// The complete write plan of one workbook: the resulting sheets in order, and the report.
#[derive(Clone, Debug)]
pub struct Plan {
    pub sheets: Vec<SheetGrid>,
    pub report: WorkbookReport,
}

/// Index entries that link to one sheet, as positions into the grouped assignments.
struct LinkedSheet<'a> {
    grid: &'a SheetGrid,
    positions: Vec<usize>,
}

/// Runs every stage on an opened workbook without touching the file system.
pub fn plan(workbook: &Workbook, settings: &Settings) -> Result<Plan, SplitterError> {
    let index_position = workbook.position(&settings.index_sheet).ok_or_else(|| {
        CatalogError::MissingIndexSheet(workbook.path.display().to_string(), settings.index_sheet.to_owned())
    })?;
    let index = &workbook.sheets[index_position];
    let mut reporter = Reporter::new();

    let table = read_index(index, workbook, &mut reporter)?;
    let grouped = group_entries(&table.entries);
    info!(
        workbook = %workbook.path.display(),
        entries = table.entries.len(),
        groups = grouped.groups.len(),
        "index grouped"
    );

    // Entries grouped by the sheet they link to, in order of first reference
    let mut linked = Vec::<LinkedSheet>::new();
    let mut unresolved = Vec::<usize>::new();
    for (position, (entry, _)) in grouped.assignments.iter().enumerate() {
        let target = entry
            .original_link
            .as_deref()
            .filter(|link| !link.eq_ignore_ascii_case(&index.name))
            .and_then(|link| workbook.sheet(link));
        match target {
            Some(grid) => match linked.iter_mut().find(|sheet| sheet.grid.name == grid.name) {
                Some(sheet) => sheet.positions.push(position),
                None => linked.push(LinkedSheet { grid, positions: vec![position] }),
            },
            None => unresolved.push(position),
        }
    }

    let scanner = MarkerScanner::new(&settings.back_link_label)?;
    let detector = BlockDetector::new(&scanner);
    let splitter = SheetSplitter::new(&settings.back_link_label);
    let mut taken: HashSet<String> = workbook.sheets.iter().map(|sheet| sheet.name.to_lowercase()).collect();
    let mut outputs = Vec::<OutputSheet>::new();
    let mut discarded = HashSet::<usize>::new();
    let mut reconciliations = Vec::new();

    for sheet in &linked {
        let detection = detector.detect(sheet.grid, &mut reporter);
        debug!(sheet = %sheet.grid.name, blocks = detection.blocks.len(), "blocks detected");
        let entries: Vec<&IndexEntry> = sheet.positions.iter().map(|position| &grouped.assignments[*position].0).collect();
        let reconciled = reconcile(&detection, &entries, &mut reporter);
        for position in &reconciled.discarded {
            discarded.insert(entries[*position].row);
        }
        for (position, block) in &reconciled.pairs {
            let (entry, final_id) = &grouped.assignments[sheet.positions[*position]];
            outputs.push(splitter.split(Some(sheet.grid), block, *final_id, entry.row, &mut taken));
        }
        reconciliations.push(reconciled.result);
    }

    for position in &unresolved {
        let (entry, final_id) = &grouped.assignments[*position];
        let detection = Detection {
            sheet_name: unresolved_name(entry, index),
            ..Detection::default()
        };
        let reconciled = reconcile(&detection, &[entry], &mut reporter);
        for (_, block) in &reconciled.pairs {
            outputs.push(splitter.split(None, block, *final_id, entry.row, &mut taken));
        }
        reconciliations.push(reconciled.result);
    }

    // Sheets that stay: the index and every sheet no entry links to
    let processed: HashSet<String> = linked.iter().map(|sheet| sheet.grid.name.to_lowercase()).collect();
    let reserved: Vec<&str> = workbook
        .sheets
        .iter()
        .filter(|sheet| !processed.contains(&sheet.name.to_lowercase()))
        .map(|sheet| sheet.name.as_str())
        .collect();
    let renames = SafeRenamer::new(reserved.iter().copied()).plan(&outputs, &mut reporter);
    rename::apply(&renames, &mut outputs, &reserved)?;

    let mut redirects = HashMap::<String, String>::new();
    for output in &outputs {
        if let Some(source) = &output.source_sheet {
            redirects.entry(source.to_lowercase()).or_insert_with(|| output.grid.name.to_owned());
        }
    }
    let rewriter = LinkRewriter::new(&index.name);
    let mut repaired_links = 0;
    for output in &mut outputs {
        repaired_links += rewriter.repair_links(&mut output.grid, &redirects);
    }
    rewriter.add_back_links(&mut outputs);

    let targets: HashMap<usize, EntryTarget> = outputs
        .iter()
        .map(|output| {
            (output.entry_row, EntryTarget {
                final_id: output.final_id,
                sheet_name: output.grid.name.to_owned(),
            })
        })
        .collect();
    let mut source_index = index.clone();
    source_index.hyperlinks.retain(|link| {
        !discarded.contains(&link.row) && (link.col != table.columns.link || !targets.contains_key(&link.row))
    });
    repaired_links += rewriter.repair_links(&mut source_index, &redirects);
    let mut rewritten_index = Some(rewriter.rewrite_index(&source_index, &table, &targets, &discarded));

    // Outputs take their source's position; padded outputs go last
    let mut sheets = Vec::with_capacity(workbook.sheets.len() + outputs.len());
    for (position, sheet) in workbook.sheets.iter().enumerate() {
        if position == index_position {
            sheets.extend(rewritten_index.take());
        } else if processed.contains(&sheet.name.to_lowercase()) {
            sheets.extend(
                outputs
                    .iter()
                    .filter(|output| output.source_sheet.as_deref() == Some(sheet.name.as_str()))
                    .map(|output| output.grid.clone()),
            );
        } else {
            let mut sheet = sheet.clone();
            repaired_links += rewriter.repair_links(&mut sheet, &redirects);
            sheets.push(sheet);
        }
    }
    sheets.extend(outputs.iter().filter(|output| output.source_sheet.is_none()).map(|output| output.grid.clone()));

    let before: HashSet<String> = workbook.sheets.iter().map(|sheet| sheet.name.to_lowercase()).collect();
    let report = WorkbookReport {
        file: workbook.path.to_path_buf(),
        sheets_before: workbook.sheets.len(),
        sheets_after: sheets.len(),
        entries_before: table.entries.len(),
        entries_after: table.entries.len() - discarded.len(),
        canonical_groups: grouped.groups.len(),
        new_sheets: sheets.iter().filter(|sheet| !before.contains(&sheet.name.to_lowercase())).count(),
        repaired_links,
        planned_sheets: sheets.iter().map(|sheet| sheet.name.to_owned()).collect(),
        rename_conflicts: renames.conflicts,
        reconciliations,
        diagnostics: reporter.into_diagnostics(),
        written: false,
    };
    info!(
        workbook = %workbook.path.display(),
        sheets_before = report.sheets_before,
        sheets_after = report.sheets_after,
        new_sheets = report.new_sheets,
        "plan ready"
    );
    Ok(Plan { sheets, report })
}

/// Label for an entry whose link names no sheet: its Table_ID, or else its index row.
fn unresolved_name(entry: &IndexEntry, index: &SheetGrid) -> String {
    if entry.table_id.is_empty() {
        format!("{} row {}", index.name, entry.row + 1)
    } else {
        entry.table_id.to_owned()
    }
}

/// Reads a workbook and reports its plan. Nothing is written.
pub fn analyze(path: &Path, settings: &Settings) -> Result<WorkbookReport, SplitterError> {
    let file_name = path.display().to_string();
    let run = || -> Result<WorkbookReport, SplitterError> {
        let workbook = Workbook::open(path)?;
        Ok(plan(&workbook, settings)?.report)
    };
    run().with_prefix(&file_name)
}

/// Processes one workbook and writes the result atomically to `output`, or over the input
/// when `output` is `None`. With `dry_run` the plan is computed but nothing is written.
pub fn process_file(
    path: &Path,
    output: Option<&Path>,
    settings: &Settings,
    dry_run: bool,
) -> Result<WorkbookReport, SplitterError> {
    let file_name = path.display().to_string();
    let run = || -> Result<WorkbookReport, SplitterError> {
        let workbook = Workbook::open(path)?;
        let Plan { sheets, mut report } = plan(&workbook, settings)?;
        if !dry_run {
            let destination = output.unwrap_or(path);
            write_workbook(destination, &sheets)?;
            report.written = true;
            info!(workbook = %file_name, destination = %destination.display(), "workbook written");
        }
        Ok(report)
    };
    run().with_prefix(&file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::reconcile::Resolution;
    use crate::catalog::report::DiagnosticKind;
    use crate::spreadsheet::sheet::Hyperlink;
    use crate::spreadsheet::CellValue;

    fn row(values: &[&str]) -> Vec<CellValue> {
        values.iter().map(|value| CellValue::from(*value)).collect()
    }

    fn index(entries: &[[&str; 3]]) -> SheetGrid {
        let mut rows = vec![row(&["Source", "PageNo", "Table_ID", "Location_ID", "Section", "Table Title", "Link"])];
        for (position, [section, title, link]) in entries.iter().enumerate() {
            let page = (position + 1).to_string();
            rows.push(row(&["10-K", &page, "", "", section, title, link]));
        }
        let mut grid = SheetGrid::from_rows("Index", rows);
        for (position, [_, _, link]) in entries.iter().enumerate() {
            grid.hyperlinks.push(Hyperlink::internal(position + 1, 6, link));
        }
        grid
    }

    fn workbook(sheets: Vec<SheetGrid>) -> Workbook {
        Workbook { sheets, ..Workbook::default() }
    }

    #[test]
    fn missing_index_is_structural() {
        let error = plan(&workbook(vec![SheetGrid::from_rows("1", vec![])]), &Settings::default()).expect_err("no index");
        assert!(error.is_structural());
    }

    #[test]
    fn repeated_entries_split_one_sheet() -> Result<(), SplitterError> {
        let data = SheetGrid::from_rows("8", vec![
            row(&["Table Title: Net Revenues"]),
            row(&["Source(s): 10-K"]),
            row(&["$ in millions", "Q1-2024"]),
            row(&["Revenue", "10"]),
            vec![],
            row(&["Table Title: Net Revenues"]),
            row(&["Source(s): 10-K"]),
            row(&["$ in millions", "Q2-2024"]),
            row(&["Revenue", "11"]),
        ]);
        let mut other = SheetGrid::from_rows("Notes", vec![row(&["see table"])]);
        other.hyperlinks.push(Hyperlink::internal(0, 0, "8"));
        let entries = [["Equity", "Expenses", "8"], ["Equity", "Net Revenues", "8"]];
        let book = workbook(vec![index(&entries), data, other]);

        let Plan { sheets, report } = plan(&book, &Settings::default())?;
        let names: Vec<&str> = sheets.iter().map(|sheet| sheet.name.as_str()).collect();
        assert_eq!(names, vec!["Index", "1", "2", "Notes"]);
        assert_eq!(report.new_sheets, 2);
        assert_eq!(report.reconciliations[0].resolution, Resolution::ExactMatch);
        assert_eq!(sheets[0].text(2, 6), "2");
        assert_eq!(sheets[1].hyperlink_at(0, 0).and_then(Hyperlink::internal_sheet), Some("Index"));
        assert_eq!(sheets[2].text(4, 1), "Q2-2024");
        // The untouched sheet now points at the first replacement of "8"
        assert_eq!(sheets[3].hyperlink_at(0, 0).and_then(Hyperlink::internal_sheet), Some("1"));
        assert_eq!(report.repaired_links, 1);
        Ok(())
    }

    #[test]
    fn unresolved_entries_are_padded_at_the_end() -> Result<(), SplitterError> {
        let mut grid = index(&[["Equity", "Gone", "nowhere"]]);
        grid.hyperlinks.clear();
        let Plan { sheets, report } = plan(&workbook(vec![grid, SheetGrid::from_rows("Notes", vec![])]), &Settings::default())?;
        let names: Vec<&str> = sheets.iter().map(|sheet| sheet.name.as_str()).collect();
        assert_eq!(names, vec!["Index", "Notes", "1"]);
        assert_eq!(report.mismatches().count(), 1);
        let kinds: Vec<DiagnosticKind> = report.diagnostics.iter().map(|diagnostic| diagnostic.kind).collect();
        assert!(kinds.contains(&DiagnosticKind::UnresolvedLink));
        assert!(kinds.contains(&DiagnosticKind::PaddedBlock));
        assert_eq!(sheets[2].text(1, 0), "Table Title: Gone");
        Ok(())
    }

    #[test]
    fn untouched_sheet_keeps_its_name_and_output_is_suffixed() -> Result<(), SplitterError> {
        let data = SheetGrid::from_rows("Data", vec![row(&["Revenue", "10"])]);
        let taken = SheetGrid::from_rows("1", vec![row(&["unrelated"])]);
        let book = workbook(vec![index(&[["Equity", "Net Revenues", "Data"]]), data, taken]);
        let Plan { sheets, report } = plan(&book, &Settings::default())?;
        let names: Vec<&str> = sheets.iter().map(|sheet| sheet.name.as_str()).collect();
        assert_eq!(names, vec!["Index", "1 (1)", "1"]);
        assert_eq!(report.rename_conflicts.len(), 1);
        assert_eq!(sheets[0].text(1, 6), "1 (1)");
        Ok(())
    }
}
