use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use score_sync_core::{GRAINS_TABLE, SYSTEM_GRAIN, Score, system_grain};
use score_sync_db::{
    DbAdaptor, EngineConfig, EngineKind, GrainsTable, SyncError, SyncReport, dialect_for,
    load_score, synchronize,
};
use score_sync_sqlite::SqliteAdaptor;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "score-sync")]
#[command(about = "Grain-based schema synchronization", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bring the database in line with the score.
    Sync(SyncArgs),
    /// Print the bookkeeping rows of every known grain.
    Status(StatusArgs),
    /// Print CREATE statements for a score without touching a database.
    Ddl(DdlArgs),
    /// Check a score file and report its problems.
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Engine configuration file (YAML).
    #[arg(long)]
    config: PathBuf,
    /// Score file; overrides the `score` entry of the configuration.
    #[arg(long)]
    score: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Engine configuration file (YAML).
    #[arg(long)]
    config: PathBuf,
}

#[derive(Debug, Args)]
struct DdlArgs {
    /// Score file (.yml, .yaml or .json).
    #[arg(long)]
    score: PathBuf,
    /// Target engine: sqlite, postgres or mssql.
    #[arg(long, default_value = "sqlite")]
    engine: EngineKind,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Score file (.yml, .yaml or .json).
    #[arg(long)]
    score: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Sync(args) => run_sync(args),
        Command::Status(args) => run_status(args),
        Command::Ddl(args) => run_ddl(args),
        Command::Validate(args) => run_validate(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<EngineConfig, String> {
    EngineConfig::load(path)
        .map_err(|err| format!("Failed to load config '{}': {err}", path.display()))
}

fn open_score(path: &Path) -> Result<Score, String> {
    load_score(path).map_err(|err| format!("Failed to load score '{}': {err}", path.display()))
}

fn connect(config: &EngineConfig) -> Result<SqliteAdaptor, String> {
    score_sync_sqlite::connect(config).map_err(|err| err.to_string())
}

fn print_report(report: &SyncReport) {
    for result in &report.results {
        println!("{:<24} {}", result.grain, result.outcome);
    }
}

fn run_sync(args: SyncArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    let score_path = args
        .score
        .or_else(|| config.score.clone())
        .ok_or_else(|| "No score file: pass --score or set `score` in the config".to_string())?;
    let score = open_score(&score_path)?;
    let adaptor = connect(&config)?;

    info!(engine = %config.engine, database = %config.database, "synchronizing");
    match synchronize(&adaptor, &score) {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(SyncError::RunFailed(report)) => {
            print_report(&report);
            Err(SyncError::RunFailed(report).to_string())
        }
        Err(err) => Err(err.to_string()),
    }
}

fn run_status(args: StatusArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    let adaptor = connect(&config)?;

    let present = adaptor
        .table_exists(SYSTEM_GRAIN, GRAINS_TABLE)
        .map_err(|err| err.to_string())?;
    if !present {
        println!("No bookkeeping table: the database has never been synchronized.");
        return Ok(());
    }

    let system = system_grain();
    let mut grains = GrainsTable::new(&adaptor, &system).map_err(|err| err.to_string())?;
    let records = grains.load_all().map_err(|err| err.to_string())?;
    for record in records {
        let mut line = format!(
            "{:<24} {:<10} {:<10} {:>8} {} {}",
            record.id,
            record.status.to_string(),
            record.version.to_string(),
            record.length,
            record.checksum_hex(),
            record.last_modified
        );
        if !record.message.is_empty() {
            line.push_str("  ");
            line.push_str(&record.message);
        }
        println!("{line}");
    }
    Ok(())
}

fn run_ddl(args: DdlArgs) -> Result<(), String> {
    let score = open_score(&args.score)?;
    let dialect = dialect_for(args.engine);

    for grain in score.ordered_grains() {
        println!("-- grain {} {}", grain.name, grain.version);
        if let Some(sql) = dialect.create_schema_sql(&grain.name) {
            println!("{sql};");
        }
        for table in &grain.tables {
            println!("{};", dialect.create_table_sql(&grain.name, table));
        }
        for (table, index) in grain.indices() {
            println!("{};", dialect.create_index_sql(&grain.name, table, index));
        }
        println!();
    }
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    match load_score(&args.score) {
        Ok(score) => {
            println!("score is valid: {} grain(s)", score.ordered_grains().len());
            Ok(())
        }
        Err(SyncError::InvalidScore(problems)) => {
            for problem in &problems {
                println!("{problem}");
            }
            Err(format!("{} problem(s) in '{}'", problems.len(), args.score.display()))
        }
        Err(err) => Err(format!("Failed to load score '{}': {err}", args.score.display())),
    }
}
