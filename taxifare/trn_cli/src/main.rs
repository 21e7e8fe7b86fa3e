use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;
use taxifare_model::{
    data::{clean_features, get_data, synthetic_trips, write_csv, CleaningRules, TripFrame},
    model::EstimatorKind,
    FareTelemetry, FittedFarePipeline, TrainerConfig, TrainingReport, TrainingRun,
    MODEL_ARTIFACT_PATH,
};
use uuid::Uuid;

const DEFAULT_MANIFEST: &str = "runs/manifest.jsonl";

#[derive(Parser, Debug)]
#[command(name = "trn", version, about = "Taxi fare model training CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trains, evaluates and saves a fare model.
    Train(TrainArgs),
    /// Predicts fares for a CSV with a saved model.
    Predict {
        /// Saved pipeline.
        #[arg(long, default_value = MODEL_ARTIFACT_PATH)]
        model: PathBuf,
        /// CSV with trip columns; `fare_amount` may be absent.
        #[arg(long)]
        data: PathBuf,
        /// Rows to read.
        #[arg(long)]
        nrows: Option<usize>,
        /// Write `key,fare_amount` here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Lists most recent training runs.
    List {
        /// Number of entries to display.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
    /// Shows one training run.
    Status {
        run_id: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
    /// Writes a synthetic training CSV.
    Synth {
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 1_000)]
        rows: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[derive(Parser, Debug, Default)]
struct TrainArgs {
    /// TOML config; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    data: Option<PathBuf>,
    /// Rows to read; 0 reads the whole file.
    #[arg(long)]
    nrows: Option<usize>,
    #[arg(long)]
    test_size: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_enum)]
    model: Option<ModelArg>,
    #[arg(long)]
    experiment_name: Option<String>,
    #[arg(long)]
    tracking_uri: Option<String>,
    /// Track in process instead of contacting the server.
    #[arg(long)]
    offline: bool,
    #[arg(long)]
    artifact: Option<PathBuf>,
    #[arg(long)]
    log_dir: Option<PathBuf>,
    #[arg(long)]
    manifest: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModelArg {
    Linear,
    Sgd,
}

impl From<ModelArg> for EstimatorKind {
    fn from(value: ModelArg) -> Self {
        match value {
            ModelArg::Linear => Self::Linear,
            ModelArg::Sgd => Self::Sgd,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct RunManifestEntry {
    run_id: String,
    submitted_at: DateTime<Utc>,
    config: Option<PathBuf>,
    data: PathBuf,
    model: EstimatorKind,
    experiment_name: String,
    log_path: PathBuf,
    status: String,
    rmse: Option<f64>,
    experiment_url: Option<String>,
}

impl RunManifestEntry {
    fn new(config_path: Option<PathBuf>, config: &TrainerConfig, log_path: PathBuf) -> Self {
        Self {
            run_id: format!("run-{}", Uuid::new_v4()),
            submitted_at: Utc::now(),
            config: config_path,
            data: config.data.path.clone(),
            model: config.model.kind,
            experiment_name: config.tracking.experiment_name.clone(),
            log_path,
            status: "pending".into(),
            rmse: None,
            experiment_url: None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Train(args) => handle_train(args).map(|_| ()),
        Commands::Predict {
            model,
            data,
            nrows,
            output,
        } => handle_predict(&model, &data, nrows, output.as_deref()),
        Commands::List { limit, manifest } => {
            for entry in recent_runs(&manifest, limit)? {
                let rmse = entry
                    .rmse
                    .map_or_else(|| "-".to_string(), |rmse| format!("{rmse:.4}"));
                println!(
                    "{} | {:?} | {} | {} | rmse {}",
                    entry.run_id, entry.model, entry.status, entry.submitted_at, rmse
                );
            }
            Ok(())
        }
        Commands::Status { run_id, manifest } => {
            let entry = find_run(&manifest, &run_id)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
            Ok(())
        }
        Commands::Synth { output, rows, seed } => {
            write_csv(&output, &synthetic_trips(rows, seed))
                .with_context(|| format!("writing {}", output.display()))?;
            println!("wrote {rows} synthetic trips to {}", output.display());
            Ok(())
        }
    }
}

fn resolve_config(args: &TrainArgs) -> Result<TrainerConfig> {
    let mut config = match &args.config {
        Some(path) => TrainerConfig::load(path)?,
        None => TrainerConfig::default(),
    };
    if let Some(data) = &args.data {
        config.data.path.clone_from(data);
    }
    if let Some(nrows) = args.nrows {
        config.data.nrows = nrows;
    }
    if let Some(test_size) = args.test_size {
        config.data.test_size = test_size;
    }
    if let Some(seed) = args.seed {
        config.data.seed = seed;
    }
    if let Some(model) = args.model {
        config.model.kind = model.into();
    }
    if let Some(name) = &args.experiment_name {
        config.tracking.experiment_name.clone_from(name);
    }
    if let Some(uri) = &args.tracking_uri {
        config.tracking.uri.clone_from(uri);
    }
    if args.offline {
        config.tracking.offline = true;
    }
    if let Some(artifact) = &args.artifact {
        config.output.artifact_path.clone_from(artifact);
    }
    if let Some(log_dir) = &args.log_dir {
        config.output.log_dir.clone_from(log_dir);
    }
    if let Some(manifest) = &args.manifest {
        config.output.manifest.clone_from(manifest);
    }
    config.validate().context("invalid training configuration")?;
    Ok(config)
}

fn handle_train(args: TrainArgs) -> Result<TrainingReport> {
    let config = resolve_config(&args)?;
    anyhow::ensure!(
        config.data.path.exists(),
        "data file {} not found",
        config.data.path.display()
    );
    let manifest = config.output.manifest.clone();
    let log_path = compute_log_path(&config.output.log_dir)?;
    let telemetry = FareTelemetry::builder("trn")
        .log_path(&log_path)
        .build()?;

    let mut entry = RunManifestEntry::new(args.config.clone(), &config, log_path);
    entry.status = "queued".into();
    append_manifest(&manifest, &entry)?;
    telemetry.log(
        LogLevel::Info,
        "run queued",
        json!({
            "run_id": entry.run_id,
            "data": entry.data,
            "model": entry.model,
            "experiment": entry.experiment_name,
        }),
    )?;

    update_entry(&manifest, &entry.run_id, |e| e.status = "running".into())?;
    let outcome = TrainingRun::new(config)
        .with_telemetry(telemetry.clone())
        .execute();
    match outcome {
        Ok(report) => {
            update_entry(&manifest, &entry.run_id, |e| {
                e.status = "completed".into();
                e.rmse = Some(report.rmse);
                e.experiment_url = Some(report.experiment_url.clone());
            })?;
            telemetry.log(
                LogLevel::Info,
                "run completed",
                json!({ "run_id": entry.run_id, "rmse": report.rmse }),
            )?;
            print_report(&entry.run_id, &report);
            Ok(report)
        }
        Err(err) => {
            update_entry(&manifest, &entry.run_id, |e| e.status = "failed".into())?;
            telemetry.log(
                LogLevel::Error,
                "run failed",
                json!({ "run_id": entry.run_id, "error": err.to_string() }),
            )?;
            Err(err).with_context(|| format!("training run {} failed", entry.run_id))
        }
    }
}

fn print_report(run_id: &str, report: &TrainingReport) {
    let event: Value = json!({
        "run_id": run_id,
        "model": report.model,
        "rows_read": report.cleaning.rows_in,
        "rows_kept": report.cleaning.rows_out,
        "train_rows": report.train_rows,
        "test_rows": report.test_rows,
        "artifact": report.artifact_path,
    });
    if let Ok(pretty) = serde_json::to_string_pretty(&event) {
        println!("{pretty}");
    }
    println!("rmse: {}", report.rmse);
    println!("experiment: {}", report.experiment_url);
}

fn handle_predict(
    model: &Path,
    data: &Path,
    nrows: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let pipeline = FittedFarePipeline::load(model)
        .with_context(|| format!("loading model {}", model.display()))?;
    let raw = get_data(data, nrows).with_context(|| format!("reading {}", data.display()))?;
    let (rows, report) = clean_features(raw, &CleaningRules::default());
    if rows.is_empty() {
        bail!("no usable rows in {} ({} read)", data.display(), report.rows_in);
    }
    if report.rows_out < report.rows_in {
        eprintln!(
            "skipped {} of {} rows that failed cleaning",
            report.rows_in - report.rows_out,
            report.rows_in
        );
    }
    let frame = TripFrame::new(rows);
    let predictions = pipeline.predict(&frame)?;

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    write_predictions(sink, &frame, &predictions)
}

fn write_predictions(sink: impl Write, frame: &TripFrame, predictions: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(["key", "fare_amount"])?;
    for (row, fare) in frame.rows().iter().zip(predictions) {
        let fare = format!("{fare:.2}");
        writer.write_record([row.key.as_str(), fare.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn append_manifest(path: &Path, entry: &RunManifestEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    serde_json::to_writer(&mut file, entry)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn read_manifest(path: &Path) -> Result<Vec<RunManifestEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: RunManifestEntry = serde_json::from_str(&line)
            .with_context(|| format!("invalid manifest line in {}", path.display()))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Newest first.
fn recent_runs(path: &Path, limit: usize) -> Result<Vec<RunManifestEntry>> {
    Ok(read_manifest(path)?.into_iter().rev().take(limit).collect())
}

fn find_run(path: &Path, run_id: &str) -> Result<RunManifestEntry> {
    match read_manifest(path)?.into_iter().find(|e| e.run_id == run_id) {
        Some(entry) => Ok(entry),
        None => bail!("run {run_id} not found in {}", path.display()),
    }
}

fn update_entry(
    path: &Path,
    run_id: &str,
    mut apply: impl FnMut(&mut RunManifestEntry),
) -> Result<()> {
    let mut entries = read_manifest(path)?;
    let mut changed = false;
    for entry in &mut entries {
        if entry.run_id == run_id {
            apply(entry);
            changed = true;
        }
    }
    if !changed {
        return Ok(());
    }
    let mut file = File::create(path)?;
    for entry in entries {
        serde_json::to_writer(&mut file, &entry)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn compute_log_path(base: &Path) -> Result<PathBuf> {
    let now = Local::now();
    let dir = base
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    fs::create_dir_all(&dir)?;
    Ok(dir.join(format!(
        "run-{}.log.jsonl",
        Utc::now().format("%Y%m%d-%H%M%S")
    )))
}
