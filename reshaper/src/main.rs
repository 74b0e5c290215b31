//! Budget Reshaper CLI - build chart data from the budget dataset
//!
//! # Main Commands
//!
//! ```bash
//! budget-reshaper chart donor-areas              # One chart, JSON to stdout
//! budget-reshaper chart tax-share -o share.json  # One chart, JSON to a file
//! budget-reshaper all --out-dir out --format csv # Every chart, one CSV per table
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! budget-reshaper parse                          # Load the dataset, print records as JSON
//! budget-reshaper charts                         # List the chart jobs
//! budget-reshaper settings                       # Print the effective settings
//! ```
//!
//! The dataset path comes from `--data`, `BUDGET_DATA` or the settings file.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use budget_reshaper::logs::{self, log_error, log_info, log_success};
use budget_reshaper::parser::format_delimiter;
use budget_reshaper::{
    load_records, run_all_charts, run_chart, ChartData, ChartKind, PipelineError, PipelineResult,
    Settings,
};

#[derive(Parser)]
#[command(name = "budget-reshaper")]
#[command(about = "Reshape Russian budget statistics into chart data", long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Dataset file (overrides settings and BUDGET_DATA)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Field delimiter (auto-detect if not specified)
    #[arg(short, long, global = true)]
    delimiter: Option<char>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the data of one chart
    Chart {
        /// Chart job
        #[arg(value_enum)]
        chart: ChartKind,

        /// Output file for JSON (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write one CSV per table into this directory instead of JSON
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },

    /// Build the data of every chart
    All {
        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Load the dataset and output its records as JSON
    Parse {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the chart jobs
    Charts,

    /// Show the effective settings
    Settings,
}

fn main() {
    let cli = Cli::parse();
    logs::init(cli.verbose);

    let result = settings(&cli).and_then(|settings| match cli.command {
        Commands::Chart { chart, output, csv_dir } => {
            cmd_chart(&settings, chart, output.as_deref(), csv_dir.as_deref())
        }
        Commands::All { out_dir, format } => cmd_all(&settings, &out_dir, format),
        Commands::Parse { output } => cmd_parse(&settings, output.as_deref()),
        Commands::Charts => cmd_charts(),
        Commands::Settings => cmd_settings(&settings),
    });

    if let Err(e) = result {
        log_error(format!("Error: {}", e));
        std::process::exit(1);
    }
}

/// Defaults, settings file and environment, then command-line flags.
fn settings(cli: &Cli) -> PipelineResult<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(data) = &cli.data {
        settings.data_path = data.clone();
    }
    if cli.delimiter.is_some() {
        settings.delimiter = cli.delimiter;
    }
    settings.validate()?;
    Ok(settings)
}

fn load(settings: &Settings) -> PipelineResult<budget_reshaper::RecordSet> {
    let parsed = load_records(&settings.data_path, &settings.schema, settings.delimiter)?;
    log_info(format!("   Columns: {}", parsed.headers.join(", ")));
    if parsed.records.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(parsed.records)
}

fn cmd_chart(
    settings: &Settings,
    chart: ChartKind,
    output: Option<&Path>,
    csv_dir: Option<&Path>,
) -> PipelineResult<()> {
    let records = load(settings)?;
    let data = run_chart(chart, &records, settings)?;

    match csv_dir {
        Some(dir) => write_csv(&data, dir)?,
        None => write_output(&serde_json::to_string_pretty(&data.to_json())?, output)?,
    }

    log_success(format!("{} done", chart));
    Ok(())
}

fn cmd_all(settings: &Settings, out_dir: &Path, format: OutputFormat) -> PipelineResult<()> {
    let records = load(settings)?;
    let charts = run_all_charts(&records, settings)?;

    fs::create_dir_all(out_dir)?;
    for data in &charts {
        match format {
            OutputFormat::Json => {
                let path = out_dir.join(format!("{}.json", data.chart));
                write_output(&serde_json::to_string_pretty(&data.to_json())?, Some(&path))?;
            }
            OutputFormat::Csv => write_csv(data, out_dir)?,
        }
    }

    log_success(format!("Built {} charts into {}", charts.len(), out_dir.display()));
    Ok(())
}

fn cmd_parse(settings: &Settings, output: Option<&Path>) -> PipelineResult<()> {
    let parsed = load_records(&settings.data_path, &settings.schema, settings.delimiter)?;
    log_info(format!("   Delimiter: '{}'", format_delimiter(parsed.delimiter)));
    log_info(format!("   Columns: {}", parsed.headers.join(", ")));

    let json = serde_json::to_string_pretty(parsed.records.records())?;
    write_output(&json, output)
}

fn cmd_charts() -> PipelineResult<()> {
    for kind in ChartKind::ALL {
        println!("  {:<18} {}", kind.name(), kind.description());
    }
    Ok(())
}

fn cmd_settings(settings: &Settings) -> PipelineResult<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

fn write_csv(data: &ChartData, dir: &Path) -> PipelineResult<()> {
    for path in data.write_csv_dir(dir)? {
        log_info(format!("💾 Output written to: {}", path.display()));
    }
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> PipelineResult<()> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            log_info(format!("💾 Output written to: {}", p.display()));
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
