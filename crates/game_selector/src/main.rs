//! Game selector CLI
//!
//! Split a PGN file into good and bad games and report who is to blame for
//! the bad ones.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use game_selector::{
    merge_totals, report_bad_games, run_selection, BadGameTally, CancelToken, ConfigOverrides,
    SelectorConfig, SelectorError, UciEngine,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "game_selector", version, about = "Separate good and bad games")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify, re-evaluate and partition games, then report on the bad ones
    Select(SelectArgs),
    /// Build the bad-game report from an existing bad partition
    Report {
        /// Bad partition to read
        bad: PathBuf,
        /// Directory receiving the report files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Collapse repeated entries in a totals file
    MergeTotals {
        /// Totals file to merge in place
        path: PathBuf,
    },
}

#[derive(Args)]
struct SelectArgs {
    /// TOML file with default settings; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Input PGN file
    #[arg(long)]
    input: Option<PathBuf>,
    /// Output for good games (appended)
    #[arg(long)]
    output_good: Option<PathBuf>,
    /// Output for bad games (appended)
    #[arg(long)]
    output_bad: Option<PathBuf>,
    /// UCI engine binary
    #[arg(long)]
    engine: Option<PathBuf>,
    /// Directory for the report and side files
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Engine hash size in MB [default: 128]
    #[arg(long)]
    hash: Option<u32>,
    /// Engine threads [default: 1]
    #[arg(long)]
    threads: Option<u32>,
    /// Search time per position in seconds [default: 1]
    #[arg(long)]
    move_time_sec: Option<f64>,
    /// Pawns an evaluation must support the recorded result by [default: 5.0]
    #[arg(long)]
    score_margin: Option<f64>,
    /// Seconds beyond the move time before the engine counts as hung [default: 10]
    #[arg(long)]
    engine_grace_sec: Option<f64>,
    /// Engine restarts allowed per position [default: 1]
    #[arg(long)]
    max_engine_restarts: Option<u32>,
    /// Do not print the progress percentage
    #[arg(long)]
    no_progress: bool,
}

impl SelectArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            input: self.input.clone(),
            good: self.output_good.clone(),
            bad: self.output_bad.clone(),
            engine: self.engine.clone(),
            output_dir: self.output_dir.clone(),
            hash_mb: self.hash,
            threads: self.threads,
            move_time_secs: self.move_time_sec,
            score_margin: self.score_margin,
            response_grace_secs: self.engine_grace_sec,
            max_engine_restarts: self.max_engine_restarts,
            show_progress: self.no_progress.then_some(false),
        }
    }
}

fn run_select(args: &SelectArgs) -> anyhow::Result<()> {
    let file = match &args.config {
        Some(path) => ConfigOverrides::load_file(path)?,
        None => ConfigOverrides::default(),
    };
    let config = SelectorConfig::resolve(args.overrides().over(file))?;
    config.validate()?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing the current game...");
        handler_token.cancel();
    })
    .context("failed to set Ctrl-C handler")?;

    let mut engine = UciEngine::start(config.engine_settings()).map_err(SelectorError::from)?;
    let summary = run_selection(&config, &mut engine, &cancel)?;
    engine.shutdown().map_err(SelectorError::from)?;

    println!("{}", summary.generate_report());
    Ok(())
}

fn run_report(bad: &Path, output_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir).map_err(|e| SelectorError::io(output_dir, e))?;
    let outcome = report_bad_games(bad, 0, output_dir, BadGameTally::new())?;
    println!(
        "{} bad games, {} attributed, {} undetermined",
        outcome.games, outcome.attributed, outcome.undetermined
    );
    for (name, count) in outcome.tally.iter() {
        println!("  {name:<30}{count:>6}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Select(args) => run_select(args),
        Command::Report { bad, output_dir } => run_report(bad, output_dir),
        Command::MergeTotals { path } => merge_totals(path).map_err(anyhow::Error::from),
    };

    match result {
        Ok(()) => {
            info!("done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let stage = err
                .downcast_ref::<SelectorError>()
                .map_or("setup", SelectorError::stage);
            eprintln!("error: {stage} stage failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
