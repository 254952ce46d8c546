//! Zone CLI - Command-line interface for Synheart Zone
//!
//! Commands:
//! - classify: Classify heart-rate readings against a zone table
//! - zones: Print a zone table
//! - summarize: Post-workout zone analysis of recorded samples
//! - replay: Drive recorded samples through a live session

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use synheart_zone::config::InMemoryConfigStore;
use synheart_zone::haptics::LogHaptic;
use synheart_zone::logging::LoggingConfig;
use synheart_zone::pipeline::{analyze, parse_records_ndjson, parse_samples, replay};
use synheart_zone::report::ReportEncoder;
use synheart_zone::zones::{estimate_max_heart_rate, zone_spec};
use synheart_zone::{classify, TrainerConfig, ZoneTable, ZONE_VERSION};

/// Zone - On-device heart-rate zone training engine
#[derive(Parser)]
#[command(name = "zone")]
#[command(author = "Synheart AI Inc")]
#[command(version = ZONE_VERSION)]
#[command(about = "Heart-rate zone classification, workout replay and analysis", long_about = None)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the zone table comes from
#[derive(Args)]
struct TableArgs {
    /// Zone table JSON file
    #[arg(long, conflicts_with_all = ["store", "max_hr", "age"])]
    table: Option<PathBuf>,

    /// Configuration store JSON file (flat `zone1Min`... keys)
    #[arg(long, conflicts_with_all = ["max_hr", "age"])]
    store: Option<PathBuf>,

    /// Build the standard table from a maximum heart rate
    #[arg(long, conflicts_with = "age")]
    max_hr: Option<u16>,

    /// Build the standard table from an age (220 - age)
    #[arg(long)]
    age: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one or more readings
    Classify {
        /// Heart-rate readings in bpm
        #[arg(required = true)]
        bpm: Vec<f64>,

        #[command(flatten)]
        table: TableArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a zone table
    Zones {
        #[command(flatten)]
        table: TableArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize recorded samples
    Summarize {
        /// Input file path (use - for stdin); JSON array or NDJSON
        #[arg(short, long)]
        input: PathBuf,

        /// Target zone (1-5)
        #[arg(short, long)]
        target: u8,

        #[command(flatten)]
        table: TableArgs,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Replay recorded NDJSON samples through a live session
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Target zone (1-5)
        #[arg(short, long)]
        target: u8,

        #[command(flatten)]
        table: TableArgs,

        /// Trainer configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Playback speed multiplier
        #[arg(long, default_value = "60")]
        speed: f64,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if cli.verbose && std::env::var("RUST_LOG").is_err() {
        logging = logging.with_level("debug");
    }
    if let Err(e) = logging.init() {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ZoneCliError> {
    match cli.command {
        Commands::Classify { bpm, table, json } => cmd_classify(&bpm, &table, json),
        Commands::Zones { table, json } => cmd_zones(&table, json),
        Commands::Summarize {
            input,
            target,
            table,
            output_format,
        } => cmd_summarize(&input, target, &table, output_format),
        Commands::Replay {
            input,
            output,
            target,
            table,
            config,
            speed,
            output_format,
        } => cmd_replay(
            &input,
            &output,
            target,
            &table,
            config.as_deref(),
            speed,
            output_format,
        ),
    }
}

fn cmd_classify(readings: &[f64], table_args: &TableArgs, json: bool) -> Result<(), ZoneCliError> {
    let table = load_table(table_args)?;
    let results: Vec<ClassifiedReading> = readings
        .iter()
        .map(|&bpm| {
            let zone = classify(bpm, &table);
            ClassifiedReading {
                bpm,
                zone,
                name: zone_spec(zone).map(|s| s.name.to_string()),
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string(&results)?);
    } else {
        for r in &results {
            println!(
                "{:>6.1} bpm  zone {}  {}",
                r.bpm,
                r.zone,
                r.name.as_deref().unwrap_or("unclassified")
            );
        }
    }
    Ok(())
}

fn cmd_zones(table_args: &TableArgs, json: bool) -> Result<(), ZoneCliError> {
    let table = load_table(table_args)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    println!("Max heart rate: {} bpm", table.max_heart_rate());
    for boundary in table.zones() {
        let (name, color) = zone_spec(boundary.zone).map_or(("", ""), |s| (s.name, s.color));
        println!(
            "  Zone {}  {:<10} {:>3}-{:<3} bpm  {}",
            boundary.zone, name, boundary.min, boundary.max, color
        );
    }
    Ok(())
}

fn cmd_summarize(
    input: &Path,
    target: u8,
    table_args: &TableArgs,
    output_format: OutputFormat,
) -> Result<(), ZoneCliError> {
    if zone_spec(target).is_none() {
        return Err(ZoneCliError::InvalidTarget(target));
    }
    let samples = parse_samples(&read_input(input)?)?;
    if samples.is_empty() {
        return Err(ZoneCliError::NoSamples);
    }
    let table = load_table(table_args)?;
    let analysis = analyze(&samples, &table, target);

    let output = match output_format {
        OutputFormat::Json => serde_json::to_string(&analysis)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&analysis)?,
    };
    println!("{output}");
    Ok(())
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    target: u8,
    table_args: &TableArgs,
    config_path: Option<&Path>,
    speed: f64,
    output_format: OutputFormat,
) -> Result<(), ZoneCliError> {
    if zone_spec(target).is_none() {
        return Err(ZoneCliError::InvalidTarget(target));
    }
    let records = parse_records_ndjson(&read_input(input)?)?;
    if records.is_empty() {
        return Err(ZoneCliError::NoSamples);
    }
    let table = load_table(table_args)?;
    let config = match config_path {
        Some(path) => TrainerConfig::from_json(&fs::read_to_string(path)?)?,
        None => TrainerConfig::default(),
    }
    .with_env();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;
    let report = runtime.block_on(replay(
        records,
        table,
        target,
        config,
        speed,
        Arc::new(LogHaptic),
    ))?;

    let encoder = ReportEncoder::new();
    let encoded = encoder.encode(&report);
    let output_data = match output_format {
        OutputFormat::Json => serde_json::to_string(&encoded)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&encoded)?,
    };

    if output.to_string_lossy() == "-" {
        println!("{output_data}");
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn read_input(input: &Path) -> Result<String, ZoneCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_table(args: &TableArgs) -> Result<ZoneTable, ZoneCliError> {
    if let Some(path) = &args.table {
        return Ok(serde_json::from_str(&fs::read_to_string(path)?)?);
    }
    if let Some(path) = &args.store {
        let store = InMemoryConfigStore::from_json(&fs::read_to_string(path)?)?;
        let table = ZoneTable::from_store(&store, &ZoneTable::default())
            .map_err(synheart_zone::ComputeError::from)?;
        return Ok(table);
    }
    if let Some(max_hr) = args.max_hr {
        return Ok(ZoneTable::from_max_heart_rate(max_hr));
    }
    if let Some(age) = args.age {
        return Ok(ZoneTable::from_max_heart_rate(estimate_max_heart_rate(age)));
    }
    Ok(ZoneTable::default())
}

#[derive(serde::Serialize)]
struct ClassifiedReading {
    bpm: f64,
    zone: u8,
    name: Option<String>,
}

// Error types

#[derive(Debug)]
enum ZoneCliError {
    Io(io::Error),
    Compute(synheart_zone::ComputeError),
    Json(serde_json::Error),
    InvalidTarget(u8),
    NoSamples,
}

impl From<io::Error> for ZoneCliError {
    fn from(e: io::Error) -> Self {
        ZoneCliError::Io(e)
    }
}

impl From<synheart_zone::ComputeError> for ZoneCliError {
    fn from(e: synheart_zone::ComputeError) -> Self {
        ZoneCliError::Compute(e)
    }
}

impl From<serde_json::Error> for ZoneCliError {
    fn from(e: serde_json::Error) -> Self {
        ZoneCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ZoneCliError> for CliError {
    fn from(e: ZoneCliError) -> Self {
        match e {
            ZoneCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ZoneCliError::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check samples and zone table input".to_string()),
            },
            ZoneCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ZoneCliError::InvalidTarget(zone) => CliError {
                code: "INVALID_TARGET".to_string(),
                message: format!("Target zone {zone} is not between 1 and 5"),
                hint: None,
            },
            ZoneCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
        }
    }
}
