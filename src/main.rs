use std::path::PathBuf;

use clap::{Parser, Subcommand};
use workbook_tools::config::Config;
use workbook_tools::engine::{EngineContext, preview};
use workbook_tools::io::excel::{ExcelReader, ExcelWriter};
use workbook_tools::plan::PreviewPlan;
use workbook_tools::progress::ProgressBus;
use workbook_tools::runner::{execute_plan, load_plan_file};
use workbook_tools::{Result, WorkbookError};

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging()?;
    let config = Config::default();
    let reader = ExcelReader::new(config.default_glob.clone());
    let writer = ExcelWriter::new(config.temp_dir.clone());
    let progress = ProgressBus::new();

    match cli.command {
        Command::Run(args) => {
            let operations = load_plan_file(&args.plan)?;
            let outcomes = execute_plan(&operations, &reader, &writer, &config, &progress)?;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
            Ok(())
        }
        Command::Preview(args) => {
            let ctx = EngineContext::new(&reader, &writer, &config, &progress);
            let plan = PreviewPlan {
                path: args.path,
                password: args.password,
                password_map: None,
                limit: args.limit,
            };
            let report = preview(&plan, &ctx)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .map_err(|err| WorkbookError::Logging(err.to_string()))
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Combine, split, and clean Excel workbooks in bulk."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute every operation in a JSON or YAML plan file.
    Run(RunArgs),
    /// Summarise a workbook's sheets without writing anything.
    Preview(PreviewArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Plan file path (.json, .yaml, or .yml).
    plan: PathBuf,
}

#[derive(clap::Args)]
struct PreviewArgs {
    /// Workbook to inspect.
    path: PathBuf,

    /// Password used when the workbook is protected.
    #[arg(long)]
    password: Option<String>,

    /// Include up to N sample rows per sheet.
    #[arg(long)]
    limit: Option<usize>,
}
