use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use solarscope::data::loader::save_csv;
use solarscope::data::schema::validate_file;
use solarscope::processing::cleaner::format_report;
use solarscope::processing::quality::missing_summary;
use solarscope::report::generator::{build_document, write_document};
use solarscope::{quick_clean, DataKind, DataLoader, Error, PipelineConfig, Result, StatisticalAnalyzer};

/// Share of non-empty cells that must parse for a column to pass validation.
const MIN_PARSE_RATE: f64 = 0.9;

#[derive(Parser)]
#[command(name = "solarscope", version)]
#[command(about = "Clean solar irradiance site data and generate summary statistics")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Pipeline configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the statistics document path
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Check site files against the expected schema
    Validate {
        /// Validate the cleaned files instead of the raw exports
        #[arg(long)]
        cleaned: bool,
    },
    /// Run the standard cleaning pass on raw files and write cleaned files
    Clean,
    /// Build the statistics document from cleaned files
    Generate,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = load_config(&cli).and_then(|config| match cli.command {
        Command::Validate { cleaned } => {
            validate(&config, if cleaned { DataKind::Cleaned } else { DataKind::Raw })
        }
        Command::Clean => clean(&config),
        Command::Generate => generate(&config),
    });

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(output) = &cli.output {
        config.output = Some(output.clone());
    }
    Ok(config)
}

/// Returns whether every site file passed.
fn validate(config: &PipelineConfig, kind: DataKind) -> Result<bool> {
    let loader = DataLoader::new(&config.data_dir);
    let mut all_valid = true;

    println!("{}", "=".repeat(70));
    println!("DATA VALIDATION REPORT ({})", loader.dir_for(kind).display());
    println!("{}", "=".repeat(70));

    for site in &config.sites {
        let path = loader.site_path(site, kind);
        match validate_file(&path) {
            Ok(report) => {
                let valid = report.is_valid(MIN_PARSE_RATE);
                all_valid &= valid;
                println!("{} {} ({} rows)", if valid { "OK  " } else { "FAIL" }, site.name, report.row_count);
                println!("  {}", report.columns.describe().replace('\n', "\n  "));
                for failure in report.type_failures(MIN_PARSE_RATE) {
                    println!(
                        "  {}: only {:.1}% of values parse as {}",
                        failure.column,
                        failure.parse_rate * 100.0,
                        failure.expected.label()
                    );
                }
            }
            Err(e) => {
                all_valid = false;
                println!("FAIL {}", site.name);
                println!("  {e}");
            }
        }
    }
    Ok(all_valid)
}

/// Cleans each site independently; a failing site does not stop the others.
fn clean(config: &PipelineConfig) -> Result<bool> {
    let loader = DataLoader::new(&config.data_dir);
    let mut all_ok = true;

    for site in &config.sites {
        let outcome = loader
            .load_site(site, DataKind::Raw)
            .and_then(|table| quick_clean(&table, &config.quick_clean));
        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                tracing::error!("{}: {e}", site.name);
                all_ok = false;
                continue;
            }
        };

        println!("\n[{}]\n{}", site.name, format_report(&outcome.log));
        for gap in missing_summary(&outcome.table) {
            tracing::info!(
                "{}: {} still missing {} values ({}%)",
                site.name,
                gap.column,
                gap.missing_count,
                gap.missing_percent
            );
        }

        let path = loader.site_path(site, DataKind::Cleaned);
        if let Err(e) = save_csv(&outcome.table, &path) {
            tracing::error!("{}: {e}", site.name);
            all_ok = false;
        }
    }
    Ok(all_ok)
}

fn generate(config: &PipelineConfig) -> Result<bool> {
    let loader = DataLoader::new(&config.data_dir);
    let sites = loader.load_all(&config.sites, DataKind::Cleaned);
    if sites.is_empty() {
        return Err(Error::DataFileNotFound {
            path: loader.dir_for(DataKind::Cleaned),
            hint: "No cleaned site data found. Run `solarscope clean` first.".to_string(),
        });
    }

    let analyzer = StatisticalAnalyzer::new(config.significance_level).with_seed(config.seed);
    let generated_at = chrono::Local::now().naive_local();
    let document = build_document(&sites, &analyzer, generated_at);
    write_document(&document, &config.output_path())?;

    Ok(sites.len() == config.sites.len())
}
