use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use camtrap_ingest::catalog;
use camtrap_ingest::config::{ConfigLoader, IngestContext};
use camtrap_ingest::download::HttpDownloader;
use camtrap_ingest::error::IngestError;
use camtrap_ingest::fs_util::find_metadata_json;
use camtrap_ingest::output::{JsonOutput, StderrProgress};
use camtrap_ingest::pipeline::{Importer, new_study_id};
use camtrap_ingest::sink::RelationalSink;
use camtrap_ingest::sink::memory::MemorySink;
use camtrap_ingest::sink::sqlite::SqliteSink;

#[derive(Parser)]
#[command(name = "camtrap-ingest")]
#[command(about = "Import COCO camera-trap metadata into Camtrap DP tables")]
#[command(version, author)]
struct Cli {
    /// Only report errors on stderr.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List the known datasets")]
    Datasets,
    #[command(about = "Download and import a dataset")]
    Import(ImportArgs),
}

#[derive(Args)]
struct ImportArgs {
    dataset: String,

    #[arg(long)]
    study_id: Option<String>,

    /// Import a local metadata file (or an unpacked archive directory)
    /// instead of downloading it.
    #[arg(long)]
    source: Option<PathBuf>,

    /// Override the image count at which the streaming path is used.
    #[arg(long)]
    threshold: Option<u64>,

    #[arg(long)]
    config: Option<String>,

    /// Parse and resolve everything but keep rows in memory.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::UnknownDataset(_)
        | IngestError::ConfigRead(_)
        | IngestError::ConfigParse(_) => 2,
        IngestError::DownloadHttp(_) | IngestError::DownloadStatus { .. } => 3,
        IngestError::MissingArray(_)
        | IngestError::NotAnArray(_)
        | IngestError::MalformedJson(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Datasets => JsonOutput::print_datasets(catalog::all()).into_diagnostic(),
        Commands::Import(args) => run_import(args, cli.quiet),
    }
}

fn run_import(args: ImportArgs, quiet: bool) -> miette::Result<()> {
    let mut config = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(threshold) = args.threshold {
        config.streaming_threshold = threshold;
    }
    let descriptor = catalog::find(&args.dataset)?;
    let study_id = args
        .study_id
        .unwrap_or_else(|| new_study_id(descriptor.id));

    let mut sink: Box<dyn RelationalSink> = if args.dry_run {
        Box::new(MemorySink::new())
    } else {
        let db_path = config.study_dir(&study_id).join("study.db");
        Box::new(SqliteSink::open(db_path.as_std_path())?)
    };

    let importer = Importer::new(IngestContext::new(config), HttpDownloader::new()?);
    let progress = StderrProgress::new(quiet);
    let summary = match args.source {
        Some(source) => {
            let source = if source.is_dir() {
                find_metadata_json(&source)?
            } else {
                source
            };
            importer.import_file(
                descriptor,
                &source,
                &study_id,
                sink.as_mut(),
                Some(&progress),
            )?
        }
        None => importer.import(descriptor.id, &study_id, sink.as_mut(), Some(&progress))?,
    };
    JsonOutput::print_summary(&summary).into_diagnostic()
}
