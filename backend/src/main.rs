//! Rowclean CLI - clean contact-record CSV files
//!
//! # Main Commands
//!
//! ```bash
//! rowclean process staff.csv --clean-out clean.jsonl --errors-out errors.jsonl
//! rowclean infer staff.csv          # Show inferred column types
//! rowclean detect staff.csv         # Show detected encoding and separator
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! rowclean clean phone "138 1234 5678"   # Run one field cleaner
//! rowclean chunks 100000 8               # Show chunk ranges for 8 workers
//! ```

use clap::{Parser, Subcommand};
use rowclean::{
    clean_value, partition_rows, CleaningStrategy, ColumnInferencer, ColumnType, ColumnTypeMap, CsvRowSource,
    IngestPipeline, JsonLinesSink, PipelineConfig, ProgressSnapshot, RowRange, RowSource,
};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Parser)]
#[command(name = "rowclean")]
#[command(about = "Detect, infer and clean contact-record CSV files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected encoding and separator
    Detect {
        /// Input CSV file
        input: PathBuf,
    },

    /// Infer column types from the first rows
    Infer {
        /// Input CSV file
        input: PathBuf,

        /// Rows to sample (default: ROWCLEAN_SAMPLE_ROWS)
        #[arg(long)]
        sample_rows: Option<usize>,
    },

    /// Run the full pipeline, writing clean and exception rows as JSON Lines
    Process {
        /// Input CSV file
        input: PathBuf,

        /// Output file for clean rows
        #[arg(long)]
        clean_out: PathBuf,

        /// Output file for exception rows
        #[arg(long)]
        errors_out: PathBuf,

        /// Rows per flushed batch (default: ROWCLEAN_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only process data rows START:END (1-based, inclusive)
        #[arg(long, value_parser = parse_range)]
        range: Option<RowRange>,

        /// Column type map (JSON object) to use instead of inference
        #[arg(long)]
        type_map: Option<PathBuf>,

        /// Treat phone columns as plain text
        #[arg(long)]
        skip_phone: bool,

        /// Print progress snapshots to stderr
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run one field cleaner on a value
    Clean {
        /// phone, date, address, number or text
        column_type: ColumnType,

        /// Raw value
        value: String,
    },

    /// Show how rows would be split across workers
    Chunks {
        /// Number of data rows
        rows: u64,

        /// Number of workers
        workers: u64,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Detect { input } => cmd_detect(&input),

        Commands::Infer { input, sample_rows } => cmd_infer(&input, sample_rows),

        Commands::Process {
            input,
            clean_out,
            errors_out,
            batch_size,
            range,
            type_map,
            skip_phone,
            verbose,
        } => {
            cmd_process(
                &input,
                &clean_out,
                &errors_out,
                batch_size,
                range,
                type_map.as_deref(),
                skip_phone,
                verbose,
            )
            .await
        }

        Commands::Clean { column_type, value } => cmd_clean(column_type, &value),

        Commands::Chunks { rows, workers } => cmd_chunks(rows, workers),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_detect(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (source, format) = CsvRowSource::open(input)?;
    eprintln!("📄 {}", input.display());
    eprintln!("   Columns: {}", source.headers().join(", "));
    println!("{}", serde_json::to_string_pretty(&format)?);
    Ok(())
}

fn cmd_infer(input: &Path, sample_rows: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(n) = sample_rows {
        config.inference.sample_rows = n;
    }
    config.validate()?;

    let (mut source, _) = CsvRowSource::open(input)?;
    let mut sample = Vec::new();
    while sample.len() < config.inference.sample_rows {
        match source.next_row() {
            Some(row) => sample.push(row?),
            None => break,
        }
    }
    eprintln!("🔎 Sampled {} rows from {}", sample.len(), input.display());

    let report = ColumnInferencer::new(config.inference).infer(source.headers(), &sample);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_process(
    input: &Path,
    clean_out: &Path,
    errors_out: &Path,
    batch_size: Option<usize>,
    range: Option<RowRange>,
    type_map: Option<&Path>,
    skip_phone: bool,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(n) = batch_size {
        config.batch_size = n;
    }
    config.validate()?;

    eprintln!("📄 Processing: {}", input.display());
    let mut clean_sink = JsonLinesSink::create(clean_out).await?;
    let mut error_sink = JsonLinesSink::create(errors_out).await?;

    let (progress_tx, mut progress_rx) = broadcast::channel::<ProgressSnapshot>(64);
    let printer = tokio::spawn(async move {
        loop {
            match progress_rx.recv().await {
                Ok(snapshot) if verbose => eprintln!(
                    "   [{:>3}%] {:?} {}/{} rows",
                    snapshot.progress_percent, snapshot.current_phase, snapshot.processed_rows, snapshot.total_rows
                ),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut strategy = CleaningStrategy::standard();
    if skip_phone {
        strategy = strategy.pass_through(ColumnType::Phone);
    }

    let mut pipeline = IngestPipeline::new(config, &mut clean_sink, &mut error_sink)
        .with_progress(progress_tx)
        .with_strategy(strategy);
    if let Some(range) = range {
        pipeline = pipeline.with_range(range);
    }
    if let Some(path) = type_map {
        let map: ColumnTypeMap = serde_json::from_str(&fs::read_to_string(path)?)?;
        pipeline = pipeline.with_type_map(map);
    }

    let result = pipeline.run_file(input).await;
    // The pipeline owned the sender; the printer stops once it is dropped.
    printer.await.ok();
    let report = result?;

    eprintln!("\n📊 Results:");
    eprintln!("   ✅ Clean: {}", report.statistics.processed_rows);
    eprintln!("   ❌ Exceptions: {}", report.statistics.error_rows);
    if !report.flush_failures.is_empty() {
        eprintln!("   ⚠️ Unsaved batches: {}", report.flush_failures.len());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_clean(column_type: ColumnType, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = clean_value(column_type, &Value::String(value.to_string()));
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_chunks(rows: u64, workers: u64) -> Result<(), Box<dyn std::error::Error>> {
    let ranges = partition_rows(rows, workers);
    let out: Vec<Value> = ranges
        .iter()
        .enumerate()
        .map(|(i, r)| json!({ "worker": i + 1, "startRow": r.start_row, "endRow": r.end_row, "rows": r.len() }))
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Parse `START:END` into a row range.
fn parse_range(s: &str) -> Result<RowRange, String> {
    let (start, end) = s
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{}'", s))?;
    let start: u64 = start.trim().parse().map_err(|_| format!("invalid start row '{}'", start))?;
    let end: u64 = end.trim().parse().map_err(|_| format!("invalid end row '{}'", end))?;
    if start == 0 || end < start {
        return Err(format!("invalid range {}:{}", start, end));
    }
    Ok(RowRange::new(start, end))
}
