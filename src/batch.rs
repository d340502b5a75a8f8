//! Batch mode: every matching workbook of a directory, in parallel
use crate::catalog::pipeline::process_file;
use crate::catalog::report::BatchReport;
use crate::error::SplitterError;
use crate::settings::Settings;
use glob::glob;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;

/// Workbooks under `dir` matching the settings' pattern, sorted. Office lock files (`~$…`) are skipped.
pub fn find_workbooks(dir: &Path, settings: &Settings) -> Result<Vec<PathBuf>, SplitterError> {
    let pattern = dir.join(&settings.pattern);
    let mut paths = Vec::new();
    for entry in glob(&pattern.to_string_lossy())? {
        let path = entry?;
        let is_lock_file = path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with("~$"))
            .unwrap_or(false);
        if path.is_file() && !is_lock_file {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Processes every workbook in place. A failing workbook is listed in the report and does not
/// stop the others.
pub fn run_batch(dir: &Path, settings: &Settings, dry_run: bool) -> Result<BatchReport, SplitterError> {
    let paths = find_workbooks(dir, settings)?;
    info!(dir = %dir.display(), workbooks = paths.len(), "batch started");

    let mut builder = ThreadPoolBuilder::new();
    if let Some(jobs) = settings.jobs {
        builder = builder.num_threads(jobs);
    }
    let pool = builder.build()?;
    let results: Vec<(PathBuf, Result<_, SplitterError>)> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| (path.to_path_buf(), process_file(path, None, settings, dry_run)))
            .collect()
    });

    let mut report = BatchReport::default();
    for (file, result) in results {
        report.record(file, result);
    }
    info!(processed = report.reports.len(), failed = report.failures.len(), "batch finished");
    Ok(report)
}
