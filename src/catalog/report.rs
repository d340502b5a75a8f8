//! Diagnostics collection and the Markdown statistics report
use crate::catalog::reconcile::ReconciliationResult;
use crate::catalog::reconcile::Resolution;
use crate::error::SplitterError;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;
use tracing::error;
use tracing::warn;

/// Kinds of recoverable conditions recorded while processing a workbook.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A block boundary inferred from an unprefixed period header
    DetectionAmbiguity,
    /// A sheet with neither markers nor repeating structure, copied through as one table
    PassThrough,
    /// Detected blocks and index entries disagree
    ReconciliationMismatch,
    /// A detected block beyond the index count was discarded
    DroppedBlock,
    /// An index entry without a matching block got an empty one
    PaddedBlock,
    /// Redundant index rows collapsed into one
    ConsolidatedEntries,
    /// An index row whose link names no sheet of the workbook
    UnresolvedLink,
    /// A target name was taken and a counter suffix was appended
    RenameConflict,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::DetectionAmbiguity => "detection_ambiguity",
            DiagnosticKind::PassThrough => "pass_through",
            DiagnosticKind::ReconciliationMismatch => "reconciliation_mismatch",
            DiagnosticKind::DroppedBlock => "dropped_block",
            DiagnosticKind::PaddedBlock => "padded_block",
            DiagnosticKind::ConsolidatedEntries => "consolidated_entries",
            DiagnosticKind::UnresolvedLink => "unresolved_link",
            DiagnosticKind::RenameConflict => "rename_conflict",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded condition.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub sheet: String,
    pub message: String,
}

/// Collects diagnostics for one workbook.
///
/// Every stage receives the reporter explicitly; each record is also emitted through `tracing`.
#[derive(Clone, Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a condition and logs it. Detection ambiguities are logged at debug level,
    /// everything else as a warning.
    pub fn record(&mut self, kind: DiagnosticKind, sheet: &str, message: impl Into<String>) {
        let message = message.into();
        match kind {
            DiagnosticKind::DetectionAmbiguity => debug!(kind = kind.as_str(), sheet, "{message}"),
            _ => warn!(kind = kind.as_str(), sheet, "{message}"),
        }
        self.diagnostics.push(Diagnostic {
            kind,
            sheet: sheet.to_owned(),
            message,
        });
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Number of records of one kind.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|diagnostic| diagnostic.kind == kind).count()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// A resolved rename conflict: the wanted name and the name actually used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameConflict {
    pub wanted: String,
    pub assigned: String,
}

/// Statistics of one workbook run.
#[derive(Clone, Debug, Default)]
pub struct WorkbookReport {
    pub file: PathBuf,
    pub sheets_before: usize,
    pub sheets_after: usize,
    pub entries_before: usize,
    pub entries_after: usize,
    pub canonical_groups: usize,
    pub new_sheets: usize,
    /// Hyperlinks outside the index redirected from a split sheet to its first replacement
    pub repaired_links: usize,
    /// Sheet names of the resulting workbook, in order
    pub planned_sheets: Vec<String>,
    pub rename_conflicts: Vec<RenameConflict>,
    pub reconciliations: Vec<ReconciliationResult>,
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the workbook was written (false in analyze and dry-run modes)
    pub written: bool,
}

impl WorkbookReport {
    /// Reconciliations that ended as a flagged mismatch.
    pub fn mismatches(&self) -> impl Iterator<Item = &ReconciliationResult> {
        self.reconciliations
            .iter()
            .filter(|result| result.resolution == Resolution::FlaggedMismatch)
    }

    /// Renders the report as a Markdown section.
    pub fn to_markdown(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for WorkbookReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## {}", self.file.display())?;
        writeln!(f)?;
        writeln!(f, "| Metric | Value |")?;
        writeln!(f, "|---|---|")?;
        writeln!(f, "| Sheets before | {} |", self.sheets_before)?;
        writeln!(f, "| Sheets after | {} |", self.sheets_after)?;
        writeln!(f, "| Index entries before | {} |", self.entries_before)?;
        writeln!(f, "| Index entries after | {} |", self.entries_after)?;
        writeln!(f, "| Canonical groups | {} |", self.canonical_groups)?;
        writeln!(f, "| New sheets created | {} |", self.new_sheets)?;
        writeln!(f, "| Rename conflicts resolved | {} |", self.rename_conflicts.len())?;
        writeln!(f, "| Reconciliation mismatches | {} |", self.mismatches().count())?;
        writeln!(f, "| Links repaired | {} |", self.repaired_links)?;
        writeln!(f, "| Written | {} |", if self.written { "yes" } else { "no" })?;

        if !self.planned_sheets.is_empty() {
            writeln!(f)?;
            writeln!(f, "Sheets: {}", self.planned_sheets.join(", "))?;
        }

        if !self.reconciliations.is_empty() {
            writeln!(f)?;
            writeln!(f, "### Reconciliation")?;
            writeln!(f)?;
            writeln!(f, "| Sheet | Detected | Expected | Resolution |")?;
            writeln!(f, "|---|---|---|---|")?;
            for result in &self.reconciliations {
                writeln!(
                    f,
                    "| {} | {} | {} | {} |",
                    result.sheet_name, result.detected_block_count, result.index_entry_count, result.resolution
                )?;
            }
        }

        if !self.rename_conflicts.is_empty() {
            writeln!(f)?;
            writeln!(f, "### Rename conflicts")?;
            writeln!(f)?;
            for conflict in &self.rename_conflicts {
                writeln!(f, "- `{}` was taken, used `{}`", conflict.wanted, conflict.assigned)?;
            }
        }

        if !self.diagnostics.is_empty() {
            writeln!(f)?;
            writeln!(f, "### Diagnostics")?;
            writeln!(f)?;
            for diagnostic in &self.diagnostics {
                writeln!(f, "- **{}** `{}`: {}", diagnostic.kind, diagnostic.sheet, diagnostic.message)?;
            }
        }
        Ok(())
    }
}

/// Class of the error that stopped a workbook.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Unreadable container or missing index sheet
    Structural,
    /// A file could not be read or written
    Io,
    /// Anything else; the workbook is skipped but the run still succeeds
    Other,
}

impl FailureKind {
    pub fn classify(error: &SplitterError) -> Self {
        if error.is_structural() {
            FailureKind::Structural
        } else if error.is_io() {
            FailureKind::Io
        } else {
            FailureKind::Other
        }
    }

    pub fn is_fatal(&self) -> bool {
        *self != FailureKind::Other
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Structural => "structural",
            FailureKind::Io => "io",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workbook whose pipeline stopped with an error.
#[derive(Clone, Debug)]
pub struct WorkbookFailure {
    pub file: PathBuf,
    pub kind: FailureKind,
    pub error: String,
}

/// Aggregated result of a batch run.
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<WorkbookReport>,
    pub failures: Vec<WorkbookFailure>,
}

impl BatchReport {
    /// Adds the outcome of one workbook; a fatal error becomes a listed failure.
    pub fn record(&mut self, file: PathBuf, result: Result<WorkbookReport, SplitterError>) {
        match result {
            Ok(report) => self.reports.push(report),
            Err(e) => {
                let kind = FailureKind::classify(&e);
                error!(file = %file.display(), kind = kind.as_str(), "{e}");
                self.failures.push(WorkbookFailure {
                    file,
                    kind,
                    error: e.to_string(),
                });
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// True when a workbook failed on a structural or I/O error; decides the exit status.
    pub fn has_fatal_failures(&self) -> bool {
        self.failures.iter().any(|failure| failure.kind.is_fatal())
    }

    /// Renders the summary followed by every workbook section.
    pub fn to_markdown(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Sheet catalog report")?;
        writeln!(f)?;
        writeln!(f, "Generated at {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f)?;
        writeln!(f, "| Metric | Value |")?;
        writeln!(f, "|---|---|")?;
        writeln!(f, "| Workbooks processed | {} |", self.reports.len())?;
        writeln!(f, "| Workbooks failed | {} |", self.failures.len())?;
        writeln!(f, "| New sheets created | {} |", self.reports.iter().map(|report| report.new_sheets).sum::<usize>())?;
        writeln!(f, "| Rename conflicts resolved | {} |", self.reports.iter().map(|report| report.rename_conflicts.len()).sum::<usize>())?;
        writeln!(f, "| Reconciliation mismatches | {} |", self.reports.iter().map(|report| report.mismatches().count()).sum::<usize>())?;

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "## Failed workbooks")?;
            writeln!(f)?;
            for failure in &self.failures {
                writeln!(f, "- `{}` ({}): {}", failure.file.display(), failure.kind, failure.error)?;
            }
        }
        for report in &self.reports {
            writeln!(f)?;
            write!(f, "{report}")?;
        }
        Ok(())
    }
}
