//! Matching detected blocks against the index entries that link to a sheet
use crate::catalog::block::Detection;
use crate::catalog::block::MetadataBlock;
use crate::catalog::block::TableBlock;
use crate::catalog::index::IndexEntry;
use crate::catalog::report::DiagnosticKind;
use crate::catalog::report::Reporter;
use std::fmt;
use tracing::info;

/// How a sheet's blocks and entries were brought to the same count.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    ExactMatch,
    ConsolidateDuplicates,
    SynthesizeMetadata,
    FlaggedMismatch,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::ExactMatch => "exact_match",
            Resolution::ConsolidateDuplicates => "consolidate_duplicates",
            Resolution::SynthesizeMetadata => "synthesize_metadata",
            Resolution::FlaggedMismatch => "flagged_mismatch",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub sheet_name: String,
    pub detected_block_count: usize,
    pub index_entry_count: usize,
    pub resolution: Resolution,
}

/// Blocks aligned 1:1 with the surviving entries of one sheet.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled {
    pub result: ReconciliationResult,
    /// Position of the entry in the reconciled slice, with its finalized block
    pub pairs: Vec<(usize, TableBlock)>,
    /// Positions of entries collapsed away by consolidation
    pub discarded: Vec<usize>,
}

/// Metadata built from an index entry: the title (or the section when the title is empty)
/// and the source with its page number. Other fields stay empty.
pub fn synthesize_metadata(entry: &IndexEntry) -> MetadataBlock {
    let title = if entry.table_title.is_empty() { &entry.section } else { &entry.table_title };
    let sources = match (entry.source.is_empty(), entry.page_no.is_empty()) {
        (false, false) => format!("{}, page {}", entry.source, entry.page_no),
        (true, false) => format!("page {}", entry.page_no),
        _ => entry.source.to_owned(),
    };
    MetadataBlock::minimal(title, &sources)
}

/// Fills a missing metadata block from the entry; returns whether it did.
fn backfill(block: &mut TableBlock, entry: &IndexEntry) -> bool {
    if block.metadata.is_some() {
        return false;
    }
    block.metadata = Some(synthesize_metadata(entry));
    true
}

/// Reconciles the detected blocks of one sheet with the entries linking to it, in index order.
///
/// Priority: exact match, consolidation of multi-page duplicates, metadata synthesis from
/// blank-separated segments, and otherwise a flagged mismatch where the index count wins.
pub fn reconcile(detection: &Detection, entries: &[&IndexEntry], reporter: &mut Reporter) -> Reconciled {
    let detected = detection.blocks.len();
    let expected = entries.len();
    let sheet = detection.sheet_name.as_str();
    let result = |resolution| ReconciliationResult {
        sheet_name: sheet.to_owned(),
        detected_block_count: detected,
        index_entry_count: expected,
        resolution,
    };

    if detected == expected {
        let mut synthesized = false;
        let pairs = detection.blocks.iter().cloned().zip(entries).enumerate()
            .map(|(position, (mut block, entry))| {
                synthesized |= backfill(&mut block, entry);
                (position, block)
            })
            .collect();
        let resolution = if synthesized { Resolution::SynthesizeMetadata } else { Resolution::ExactMatch };
        info!(sheet, detected, expected, resolution = resolution.as_str(), "reconciled");
        return Reconciled { result: result(resolution), pairs, discarded: Vec::new() };
    }

    // Only a sheet holding one genuine table can absorb repeated entries
    if expected > 1 && detected <= 1 && detection.fallback_segments.len() <= 1 && is_duplicate_run(entries) {
        let mut block = detection.blocks.first().cloned().unwrap_or_default();
        backfill(&mut block, entries[0]);
        reporter.record(
            DiagnosticKind::ConsolidatedEntries,
            sheet,
            format!("{expected} index rows describe one continuous table; kept the first, discarded {}", expected - 1),
        );
        return Reconciled {
            result: result(Resolution::ConsolidateDuplicates),
            pairs: vec![(0, block)],
            discarded: (1..expected).collect(),
        };
    }

    if detected < expected && !detection.has_markers && detection.fallback_segments.len() == expected {
        let pairs = detection.fallback_segments.iter().cloned().zip(entries).enumerate()
            .map(|(position, (mut block, entry))| {
                backfill(&mut block, entry);
                (position, block)
            })
            .collect();
        info!(sheet, detected, expected, "metadata synthesized for unmarked segments");
        return Reconciled { result: result(Resolution::SynthesizeMetadata), pairs, discarded: Vec::new() };
    }

    reporter.record(
        DiagnosticKind::ReconciliationMismatch,
        sheet,
        format!("detected {detected} blocks, index expects {expected}; index count is authoritative"),
    );
    for block in detection.blocks.iter().skip(expected) {
        reporter.record(
            DiagnosticKind::DroppedBlock,
            sheet,
            format!("block at rows {}-{} has no index entry and was dropped", block.span.start + 1, block.span.end),
        );
    }
    let pairs = entries.iter().enumerate()
        .map(|(position, entry)| {
            let mut block = match detection.blocks.get(position) {
                Some(block) => block.clone(),
                None => {
                    reporter.record(
                        DiagnosticKind::PaddedBlock,
                        sheet,
                        format!("index row {} has no detected block; an empty one was added", entry.row + 1),
                    );
                    TableBlock::default()
                }
            };
            backfill(&mut block, entry);
            (position, block)
        })
        .collect();
    Reconciled { result: result(Resolution::FlaggedMismatch), pairs, discarded: Vec::new() }
}

/// True when every entry shares the first one's group key and resolved link.
fn is_duplicate_run(entries: &[&IndexEntry]) -> bool {
    let Some(first) = entries.first() else {
        return false;
    };
    let key = first.group_key();
    first.original_link.is_some()
        && entries.iter().all(|entry| entry.group_key() == key && entry.original_link == first.original_link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::block::DataBlock;

    fn entry(row: usize, title: &str, link: &str) -> IndexEntry {
        IndexEntry {
            row,
            source: "10-K".to_owned(),
            page_no: (row + 3).to_string(),
            section: "Equity".to_owned(),
            table_title: title.to_owned(),
            original_link: Some(link.to_owned()),
            ..IndexEntry::default()
        }
    }

    fn block(metadata: Option<MetadataBlock>, header_row: usize) -> TableBlock {
        TableBlock {
            metadata,
            data: DataBlock { header_row: Some(header_row), data_rows: vec![header_row + 1] },
            span: header_row..header_row + 2,
        }
    }

    fn detection(blocks: Vec<TableBlock>, has_markers: bool, fallback_segments: Vec<TableBlock>) -> Detection {
        Detection { sheet_name: "8".to_owned(), blocks, has_markers, fallback_segments }
    }

    #[test]
    fn equal_counts_pair_positionally() {
        let metadata = MetadataBlock::minimal("Net Revenues", "10-K");
        let detection = detection(vec![block(Some(metadata.clone()), 2), block(Some(metadata), 6)], true, vec![]);
        let (first, second) = (entry(1, "Net Revenues", "8"), entry(2, "Net Revenues", "8"));
        let mut reporter = Reporter::new();
        let reconciled = reconcile(&detection, &[&first, &second], &mut reporter);
        assert_eq!(reconciled.result.resolution, Resolution::ExactMatch);
        assert_eq!(reconciled.pairs[1].1.data.header_row, Some(6));
        assert!(reporter.diagnostics().is_empty());
    }

    #[test]
    fn single_unmarked_block_gets_synthesized_metadata() {
        let detection = detection(vec![block(None, 0)], false, vec![block(None, 0)]);
        let only = entry(1, "Net Revenues", "8");
        let reconciled = reconcile(&detection, &[&only], &mut Reporter::new());
        assert_eq!(reconciled.result.resolution, Resolution::SynthesizeMetadata);
        assert_eq!(reconciled.pairs[0].1.metadata, Some(MetadataBlock::minimal("Net Revenues", "10-K, page 4")));
    }

    #[test]
    fn duplicate_pages_are_consolidated() {
        let detection = detection(vec![block(None, 0)], false, vec![block(None, 0)]);
        let entries: Vec<IndexEntry> = (1..=4).map(|row| entry(row, "Net Revenues", "8")).collect();
        let refs: Vec<&IndexEntry> = entries.iter().collect();
        let mut reporter = Reporter::new();
        let reconciled = reconcile(&detection, &refs, &mut reporter);
        assert_eq!(reconciled.result.resolution, Resolution::ConsolidateDuplicates);
        assert_eq!(reconciled.pairs.len(), 1);
        assert_eq!(reconciled.discarded, vec![1, 2, 3]);
        assert_eq!(reporter.count(DiagnosticKind::ConsolidatedEntries), 1);
    }

    #[test]
    fn repeated_entries_over_stacked_segments_are_not_consolidated() {
        let segments = vec![block(None, 0), block(None, 2), block(None, 4), block(None, 6)];
        let detection = detection(vec![block(None, 0)], false, segments);
        let entries: Vec<IndexEntry> = (1..=4).map(|row| entry(row, "Net Revenues", "8")).collect();
        let refs: Vec<&IndexEntry> = entries.iter().collect();
        let mut reporter = Reporter::new();
        let reconciled = reconcile(&detection, &refs, &mut reporter);
        assert_eq!(reconciled.result.resolution, Resolution::SynthesizeMetadata);
        assert_eq!(reconciled.pairs.len(), 4);
        assert!(reconciled.discarded.is_empty());
        assert_eq!(reconciled.pairs[3].1.data.header_row, Some(6));
        assert_eq!(reporter.count(DiagnosticKind::ConsolidatedEntries), 0);
    }

    #[test]
    fn blank_separated_segments_back_synthesis() {
        let segments = vec![block(None, 0), block(None, 4), block(None, 8)];
        let detection = detection(vec![block(None, 0)], false, segments);
        let entries = [entry(1, "A", "8"), entry(2, "B", "8"), entry(3, "C", "8")];
        let refs: Vec<&IndexEntry> = entries.iter().collect();
        let reconciled = reconcile(&detection, &refs, &mut Reporter::new());
        assert_eq!(reconciled.result.resolution, Resolution::SynthesizeMetadata);
        let titles: Vec<String> = reconciled.pairs.iter()
            .filter_map(|(_, block)| block.metadata.as_ref().map(|metadata| metadata.table_title.to_owned()))
            .collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn mismatch_drops_excess_and_pads_missing() {
        let metadata = MetadataBlock::minimal("T", "S");
        let three = detection(vec![block(Some(metadata.clone()), 0), block(Some(metadata.clone()), 4), block(Some(metadata), 8)], true, vec![]);
        let entries = [entry(1, "A", "8"), entry(2, "B", "8")];
        let refs: Vec<&IndexEntry> = entries.iter().collect();
        let mut reporter = Reporter::new();
        let reconciled = reconcile(&three, &refs, &mut reporter);
        assert_eq!(reconciled.result.resolution, Resolution::FlaggedMismatch);
        assert_eq!(reconciled.pairs.len(), 2);
        assert_eq!(reporter.count(DiagnosticKind::DroppedBlock), 1);

        let entries = [entry(1, "A", "8"), entry(2, "B", "8"), entry(3, "C", "8")];
        let refs: Vec<&IndexEntry> = entries.iter().collect();
        let two = detection(vec![block(None, 0), block(None, 4)], true, vec![]);
        let mut reporter = Reporter::new();
        let reconciled = reconcile(&two, &refs, &mut reporter);
        assert_eq!(reconciled.pairs.len(), 3);
        assert!(reconciled.pairs[2].1.data.is_empty());
        assert_eq!(reconciled.pairs[2].1.metadata.as_ref().map(|metadata| metadata.table_title.as_str()), Some("C"));
        assert_eq!(reporter.count(DiagnosticKind::PaddedBlock), 1);
        assert_eq!(reporter.count(DiagnosticKind::ReconciliationMismatch), 1);
    }
}
