use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::Utc;
use clap::Parser;
use clap::error::ErrorKind;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use nwp_retrieve::app::{App, ProgressSink, RetrievalRequest};
use nwp_retrieve::config::{ArchiveFormat, ConfigLoader, DataLocations};
use nwp_retrieve::domain::{
    DataStore, FileFormat, FileSet, TransferMode, parse_cycle, parse_lead_times, parse_members,
};
use nwp_retrieve::error::RetrieveError;
use nwp_retrieve::hpss::{HtarClient, HtarToolStatus};
use nwp_retrieve::output::{JsonOutput, LogOutput, OutputMode};
use nwp_retrieve::template::Template;
use nwp_retrieve::transfer::FsTransfer;

#[derive(Parser, Debug)]
#[command(name = "retrieve-data")]
#[command(about = "Retrieve external model input from disk, cloud, web and tape-archive data stores")]
#[command(version)]
struct Cli {
    /// Category of files to retrieve.
    #[arg(long, value_enum)]
    file_set: FileSet,

    /// Data locations file. Defaults to the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cycle date and time (ISO 8601), read as UTC. An explicit offset is
    /// ignored, so 2025-05-04T02:00+02:00 means 02Z. Defaults to now.
    #[arg(long)]
    cycle: Option<String>,

    /// Data stores to try, in priority order.
    #[arg(long, value_enum, num_args = 1.., required = true)]
    data_stores: Vec<DataStore>,

    /// External model label, e.g. GFS.
    #[arg(long)]
    data_type: String,

    /// Forecast hours: one value, start stop, start stop step, or a list.
    #[arg(long, num_args = 1.., default_value = "0")]
    fcst_hrs: Vec<String>,

    /// Directory receiving the retrieved files.
    #[arg(long)]
    output_path: Utf8PathBuf,

    /// Link local files instead of copying them.
    #[arg(long)]
    symlink: bool,

    #[arg(long)]
    debug: bool,

    /// File name templates overriding the configured names for disk.
    #[arg(long, num_args = 1..)]
    file_templates: Vec<String>,

    #[arg(long, value_enum)]
    file_fmt: Option<FileFormat>,

    /// Source directory for disk, may contain templates.
    #[arg(long)]
    input_file_path: Option<String>,

    /// Ensemble members, with the same shorthand as --fcst-hrs.
    #[arg(long, num_args = 1.., allow_negative_numbers = true)]
    members: Vec<String>,

    /// Write the retrieved target to source mapping here (YAML).
    #[arg(long)]
    summary_file: Option<Utf8PathBuf>,

    /// Print the retrieval outcome as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                err.exit();
            }
            let _ = err.print();
            return ExitCode::from(1);
        }
    };
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> miette::Result<bool> {
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    log_arguments(&cli);

    let request = build_request(&cli)?;
    request.validate()?;

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => ConfigLoader::default_path()
            .ok_or_else(|| miette::miette!("no user config directory; pass --config"))?,
    };
    let locations = ConfigLoader::resolve(&config_path)?;
    tracing::debug!(
        config = %config_path.display(),
        data_types = locations.data_type_names().count(),
        "loaded data locations"
    );

    if needs_htar(&locations, &request) {
        if let HtarToolStatus::Missing { message } = HtarClient::new().tool_status() {
            return Err(RetrieveError::MissingTool(message).into());
        }
    }

    let app = App::new(locations, FsTransfer::system()?);
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &LogOutput,
    };
    let outcome = app.retrieve(&request, sink)?;
    if matches!(output_mode, OutputMode::Json) {
        JsonOutput::print_outcome(&outcome).into_diagnostic()?;
    }
    Ok(outcome.success)
}

/// True when a requested store of the requested data type reads `htar`
/// archives. Lookup errors are left for the retrieval to report.
fn needs_htar(locations: &DataLocations, request: &RetrievalRequest) -> bool {
    let Ok(data_type) = locations.data_type(&request.data_type) else {
        return false;
    };
    request.data_stores.iter().any(|store| {
        data_type
            .store(*store)
            .ok()
            .and_then(|config| config.archive.as_ref())
            .is_some_and(|archive| archive.format == ArchiveFormat::Htar)
    })
}

fn build_request(cli: &Cli) -> Result<RetrievalRequest, RetrieveError> {
    let cycle = match &cli.cycle {
        Some(cycle) => parse_cycle(cycle)?,
        None => Utc::now(),
    };
    let file_templates = cli
        .file_templates
        .iter()
        .map(|template| Template::parse(template))
        .collect::<Result<Vec<_>, _>>()?;
    let input_path = cli
        .input_file_path
        .as_deref()
        .map(Template::parse)
        .transpose()?;

    Ok(RetrievalRequest {
        cycle,
        data_stores: cli.data_stores.clone(),
        data_type: cli.data_type.clone(),
        file_set: cli.file_set,
        file_format: cli.file_fmt,
        lead_times: parse_lead_times(&cli.fcst_hrs)?,
        members: parse_members(&cli.members)?,
        file_templates,
        input_path,
        output_path: cli.output_path.clone(),
        summary_file: cli.summary_file.clone(),
        mode: if cli.symlink {
            TransferMode::Symlink
        } else {
            TransferMode::Copy
        },
    })
}

fn log_arguments(cli: &Cli) {
    tracing::info!("retrieve-data invoked with:");
    tracing::info!("  file_set: {}", cli.file_set);
    tracing::info!("  config: {:?}", cli.config);
    tracing::info!("  cycle: {:?}", cli.cycle);
    tracing::info!("  data_stores: {:?}", cli.data_stores);
    tracing::info!("  data_type: {}", cli.data_type);
    tracing::info!("  fcst_hrs: {:?}", cli.fcst_hrs);
    tracing::info!("  output_path: {}", cli.output_path);
    tracing::info!("  symlink: {}", cli.symlink);
    tracing::info!("  file_templates: {:?}", cli.file_templates);
    tracing::info!("  file_fmt: {:?}", cli.file_fmt);
    tracing::info!("  input_file_path: {:?}", cli.input_file_path);
    tracing::info!("  members: {:?}", cli.members);
    tracing::info!("  summary_file: {:?}", cli.summary_file);
}
