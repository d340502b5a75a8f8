use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use sheet_catalog::batch::run_batch;
use sheet_catalog::catalog::pipeline::analyze;
use sheet_catalog::catalog::pipeline::process_file;
use sheet_catalog::catalog::report::BatchReport;
use sheet_catalog::settings::Settings;
use sheet_catalog::settings::DEFAULT_BACK_LINK_LABEL;
use sheet_catalog::settings::DEFAULT_INDEX_SHEET;
use sheet_catalog::settings::DEFAULT_PATTERN;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Split multi-table worksheets into one sheet per index entry and re-sequence the index.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Name of the index sheet.
    #[arg(long, global = true, default_value = DEFAULT_INDEX_SHEET)]
    index_sheet: String,

    /// Text of the back-link cell written at the top of every output sheet.
    #[arg(long, global = true, default_value = DEFAULT_BACK_LINK_LABEL)]
    back_link_label: String,

    /// Write the Markdown report to this file instead of stdout.
    #[arg(long, global = true, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Report the grouping and splitting plan of one workbook without writing anything.
    Analyze {
        file: PathBuf,
    },

    /// Process one workbook.
    SingleFile {
        file: PathBuf,

        /// Write the result here instead of replacing the input.
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Process every matching workbook of a directory.
    Batch {
        dir: PathBuf,

        /// Glob pattern selecting workbooks inside the directory.
        #[arg(long, default_value = DEFAULT_PATTERN)]
        pattern: String,

        /// Number of worker threads (defaults to one per core).
        #[arg(long, short)]
        jobs: Option<usize>,

        /// Compute and report the plan without writing.
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut settings = Settings {
        index_sheet: cli.index_sheet,
        back_link_label: cli.back_link_label,
        report: cli.report,
        ..Settings::default()
    };

    let report = match cli.command {
        Command::Analyze { file } => {
            let mut report = BatchReport::default();
            report.record(file.to_path_buf(), analyze(&file, &settings));
            report
        }
        Command::SingleFile { file, output } => {
            let mut report = BatchReport::default();
            report.record(file.to_path_buf(), process_file(&file, output.as_deref(), &settings, false));
            report
        }
        Command::Batch { dir, pattern, jobs, dry_run } => {
            settings.pattern = pattern;
            settings.jobs = jobs;
            run_batch(&dir, &settings, dry_run).with_context(|| format!("Failed to scan '{}'", dir.display()))?
        }
    };

    let markdown = report.to_markdown();
    match &settings.report {
        Some(path) => std::fs::write(path, markdown)
            .with_context(|| format!("Failed to write report to '{}'", path.display()))?,
        None => print!("{markdown}"),
    }

    Ok(if report.has_fatal_failures() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
