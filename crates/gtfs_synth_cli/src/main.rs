use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use gtfs_synth_core::{
    load_dir, FeedAssembler, FeedSummary, NoOpProgressHandler, ProgressHandler, ReferenceData,
    SynthesisConfig, SynthesisNotice,
};

mod acquire;

use acquire::{resolve_account_key, DataMallClient, DATAMALL_BASE_URL};

#[derive(Debug, Parser)]
#[command(name = "gtfs-synth")]
#[command(about = "Synthesizes a GTFS feed from LTA DataMall bus data and rail stations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the GTFS tables and archive from a directory of source files
    Generate(GenerateArgs),
    /// Download the bus datasets from LTA DataMall
    Fetch(FetchArgs),
    /// Write the built-in reference data as JSON
    ExportReference(ExportReferenceArgs),
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(short = 'i', long = "input", default_value = ".")]
    input: PathBuf,

    #[arg(short = 'o', long = "output", default_value = "gtfs_output")]
    output: PathBuf,

    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[arg(long = "reference")]
    reference: Option<PathBuf>,

    #[arg(long = "archive", conflicts_with = "no_archive")]
    archive: Option<PathBuf>,

    #[arg(long = "no-archive")]
    no_archive: bool,

    #[arg(long = "buffer-size")]
    buffer_size: Option<usize>,

    #[arg(long = "start-date")]
    start_date: Option<String>,

    #[arg(long = "end-date")]
    end_date: Option<String>,

    #[arg(short = 'r', long = "report-name", default_value = "report.json")]
    report_name: String,

    #[arg(short = 'p', long = "pretty")]
    pretty: bool,

    #[arg(long = "no-progress")]
    no_progress: bool,
}

#[derive(Debug, Args)]
struct FetchArgs {
    #[arg(short = 'o', long = "output", default_value = ".")]
    output: PathBuf,

    #[arg(short = 'k', long = "key-file", default_value = "api_key.txt")]
    key_file: PathBuf,

    #[arg(long = "base-url", default_value = DATAMALL_BASE_URL)]
    base_url: String,

    #[arg(long = "delay-ms", default_value_t = 100)]
    delay_ms: u64,
}

#[derive(Debug, Args)]
struct ExportReferenceArgs {
    #[arg(short = 'o', long = "output", default_value = "reference.json")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(&args),
        Command::Fetch(args) => run_fetch(&args),
        Command::ExportReference(args) => run_export_reference(&args),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport<'a> {
    generator_version: &'static str,
    generated_at: String,
    input: String,
    output: String,
    elapsed_seconds: f64,
    summary: &'a FeedSummary,
    notice_counts: BTreeMap<String, usize>,
    notices: Vec<&'a SynthesisNotice>,
}

fn run_generate(args: &GenerateArgs) -> anyhow::Result<()> {
    let started_at = Instant::now();

    let mut config = match &args.config {
        Some(path) => SynthesisConfig::from_json_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => SynthesisConfig::default(),
    };
    if let Some(size) = args.buffer_size {
        if size == 0 {
            bail!("--buffer-size must be positive");
        }
        config.sink_buffer_size = size;
    }
    if let Some(value) = &args.start_date {
        config.calendar.start_date = parse_calendar_date(value, "--start-date")?;
    }
    if let Some(value) = &args.end_date {
        config.calendar.end_date = parse_calendar_date(value, "--end-date")?;
    }
    if config.calendar.end_date < config.calendar.start_date {
        bail!(
            "calendar ends ({}) before it starts ({})",
            config.calendar.end_date,
            config.calendar.start_date
        );
    }

    let reference = match &args.reference {
        Some(path) => ReferenceData::from_json_file(path)
            .with_context(|| format!("load reference data {}", path.display()))?,
        None => ReferenceData::singapore(),
    };

    let source = load_dir(&args.input)
        .with_context(|| format!("load source data from {}", args.input.display()))?;

    let indicatif = (!args.no_progress).then(IndicatifHandler::new);
    let progress: &dyn ProgressHandler = match &indicatif {
        Some(handler) => handler,
        None => &NoOpProgressHandler,
    };

    let mut assembler = FeedAssembler::new(&config, &reference).with_progress(progress);
    if args.no_archive {
        assembler = assembler.without_archive();
    } else if let Some(path) = &args.archive {
        assembler = assembler.with_archive_path(path.clone());
    }
    let outcome = assembler
        .assemble(&source, &args.output)
        .with_context(|| format!("synthesize feed into {}", args.output.display()))?;
    if let Some(handler) = &indicatif {
        handler.finish();
    }

    let report = RunReport {
        generator_version: env!("CARGO_PKG_VERSION"),
        generated_at: chrono::Utc::now().to_rfc3339(),
        input: args.input.display().to_string(),
        output: args.output.display().to_string(),
        elapsed_seconds: started_at.elapsed().as_secs_f64(),
        summary: &outcome.summary,
        notice_counts: outcome.notices.count_by_code(),
        notices: outcome.notices.iter().collect(),
    };
    let report_path = args.output.join(&args.report_name);
    write_json(&report_path, &report, args.pretty)?;

    info!(
        trips = outcome.summary.trips,
        stop_times = outcome.summary.stop_times,
        notices = outcome.notices.len(),
        report = %report_path.display(),
        "feed generated"
    );
    if let Some(archive) = &outcome.summary.archive {
        info!(archive = %archive.display(), "archive written");
    }
    Ok(())
}

fn run_fetch(args: &FetchArgs) -> anyhow::Result<()> {
    let account_key = resolve_account_key(&args.key_file)?;
    let mut client = DataMallClient::new(&args.base_url, account_key)?;
    let written = acquire::fetch_datasets(
        &mut client,
        &args.output,
        Duration::from_millis(args.delay_ms),
    )?;
    info!(files = written.len(), output = %args.output.display(), "DataMall download complete");
    Ok(())
}

fn run_export_reference(args: &ExportReferenceArgs) -> anyhow::Result<()> {
    write_json(&args.output, &ReferenceData::singapore(), true)?;
    info!(path = %args.output.display(), "reference data exported");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir {}", parent.display()))?;
    }
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .with_context(|| format!("serialize {}", path.display()))?;
    std::fs::write(path, format!("{}\n", json))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn parse_calendar_date(value: &str, flag: &str) -> anyhow::Result<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{} cannot be empty", flag);
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .with_context(|| format!("invalid {} {}", flag, value))
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

struct IndicatifHandler {
    _multi: MultiProgress,
    stage_pb: ProgressBar,
    pattern_pb: ProgressBar,
}

impl IndicatifHandler {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let stage_pb = multi.add(ProgressBar::new_spinner());
        stage_pb.set_style(bar_style("{spinner:.green} [{elapsed_precise}] {msg}"));
        stage_pb.enable_steady_tick(Duration::from_millis(120));
        stage_pb.set_message("Starting...");

        let pattern_pb = multi.add(ProgressBar::new(0));
        pattern_pb.set_style(bar_style(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        ));
        pattern_pb.set_message("Waiting for trip patterns...");

        Self {
            _multi: multi,
            stage_pb,
            pattern_pb,
        }
    }

    fn finish(&self) {
        self.pattern_pb.finish_with_message("Trips complete");
        self.stage_pb.finish_with_message("Feed complete");
    }
}

impl ProgressHandler for IndicatifHandler {
    fn on_start_stage(&self, stage: &str) {
        self.stage_pb.set_message(format!("Running {}", stage));
    }

    fn on_finish_stage(&self, stage: &str) {
        self.stage_pb.set_message(format!("Finished {}", stage));
    }

    fn set_total_patterns(&self, count: usize) {
        self.pattern_pb.set_length(count as u64);
        self.pattern_pb.set_message("Synthesizing trips...");
    }

    fn increment_pattern_progress(&self) {
        self.pattern_pb.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_date_accepts_both_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(parse_calendar_date("2026-03-01", "--start-date").unwrap(), expected);
        assert_eq!(parse_calendar_date(" 20260301 ", "--start-date").unwrap(), expected);
        assert!(parse_calendar_date("", "--start-date").is_err());
        assert!(parse_calendar_date("March 1", "--start-date").is_err());
    }

    #[test]
    fn generate_arguments_parse() {
        let cli = Cli::try_parse_from([
            "gtfs-synth",
            "generate",
            "-i",
            "data",
            "--no-archive",
            "--buffer-size",
            "500",
            "-p",
        ])
        .unwrap();
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.input, PathBuf::from("data"));
                assert_eq!(args.output, PathBuf::from("gtfs_output"));
                assert!(args.no_archive);
                assert_eq!(args.buffer_size, Some(500));
                assert_eq!(args.report_name, "report.json");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn archive_conflicts_with_no_archive() {
        let result = Cli::try_parse_from([
            "gtfs-synth",
            "generate",
            "--archive",
            "feed.zip",
            "--no-archive",
        ]);
        assert!(result.is_err());
    }
}
