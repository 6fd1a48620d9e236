//! The selection pass: read, classify, evaluate, decide, partition, report.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SelectorConfig;
use crate::error::{Result, SelectorError};
use crate::evaluator::Evaluator;
use crate::game::Game;
use crate::partition::Partitioner;
use crate::pgn::{count_games, PgnReader};
use crate::report::{report_bad_games, BadGameTally};
use crate::retention::decide;
use crate::termination::classify;

/// File name of the JSON run summary.
pub const SUMMARY_FILE: &str = "selection_summary.json";

/// Shared flag checked between games. Cloning gives another handle to the
/// same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one selection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Records encountered, including malformed ones.
    pub games_seen: usize,
    pub games_parsed: usize,
    pub games_skipped: usize,
    pub good: usize,
    pub bad: usize,
    pub kept_despite_anomaly: usize,
    pub classification_errors: usize,
    pub engine_evaluations: usize,
    pub engine_restarts: usize,
    pub cancelled: bool,
    /// Bad games the reporter could attribute to a player.
    pub bad_games_attributed: usize,
    pub tally: BadGameTally,
}

impl RunSummary {
    /// Save as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| SelectorError::io(path, e))
    }

    /// Short text table for the terminal.
    pub fn generate_report(&self) -> String {
        let rows = [
            ("Games seen", self.games_seen),
            ("Parsed", self.games_parsed),
            ("Skipped (malformed)", self.games_skipped),
            ("Good", self.good),
            ("Bad", self.bad),
            ("Kept despite anomaly", self.kept_despite_anomaly),
            ("Classification errors", self.classification_errors),
            ("Engine evaluations", self.engine_evaluations),
            ("Engine restarts", self.engine_restarts),
        ];
        let mut report = String::from("=== Selection summary ===\n");
        for (label, value) in rows {
            report.push_str(&format!("{label:<24}{value:>8}\n"));
        }
        if self.cancelled {
            report.push_str("Run was cancelled before the end of the input.\n");
        }
        if !self.tally.is_empty() {
            report.push_str("\nBad games per player:\n");
            for (name, count) in self.tally.iter() {
                report.push_str(&format!("  {name:<30}{count:>6}\n"));
            }
        }
        report
    }
}

struct Progress {
    enabled: bool,
    total: usize,
    last: Option<u32>,
}

impl Progress {
    fn new(enabled: bool, total: usize) -> Self {
        Self {
            enabled: enabled && total > 0,
            total,
            last: None,
        }
    }

    fn update(&mut self, done: usize) {
        if !self.enabled {
            return;
        }
        let percent = ((done * 100) / self.total).min(100) as u32;
        if self.last != Some(percent) {
            self.last = Some(percent);
            let mut err = std::io::stderr();
            let _ = write!(err, "\rProcessing games : {percent}% Complete");
            let _ = err.flush();
        }
    }

    fn finish(&self) {
        if self.enabled {
            eprintln!();
        }
    }
}

/// Evaluate one position, restarting the evaluator up to `max_restarts`
/// times if it fails.
fn evaluate_with_restarts<E: Evaluator + ?Sized>(
    evaluator: &mut E,
    fen: &str,
    move_time: Duration,
    max_restarts: u32,
    summary: &mut RunSummary,
) -> Result<f64> {
    let mut restarts = 0;
    loop {
        summary.engine_evaluations += 1;
        match evaluator.evaluate(fen, move_time) {
            Ok(score) => return Ok(score),
            Err(e) if restarts < max_restarts => {
                warn!(fen, "evaluation failed: {e}");
                evaluator.restart()?;
                restarts += 1;
                summary.engine_restarts += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn process_game<E: Evaluator + ?Sized>(
    game: &Game,
    config: &SelectorConfig,
    evaluator: &mut E,
    partitioner: &mut Partitioner,
    summary: &mut RunSummary,
) -> Result<()> {
    let classification = classify(game);
    let Some(anchor) = classification.anchor else {
        partitioner.emit(game, true)?;
        return Ok(());
    };

    let Some(result) = game.result() else {
        partitioner.record_classification_error(game);
        partitioner.emit(game, false)?;
        return Ok(());
    };

    let fen = game.fen_after(anchor);
    let score = evaluate_with_restarts(
        evaluator,
        &fen,
        config.move_time,
        config.max_engine_restarts,
        summary,
    )?;
    let decision = decide(result, classification.reason, score, config.score_margin);
    debug!(
        game = game.ordinal(),
        result = result.as_tag(),
        reason = %decision.reason,
        score,
        keep = decision.keep,
        "anomalous game evaluated"
    );

    partitioner.emit(game, decision.keep)?;
    if decision.keep {
        partitioner.record_kept_anomaly(game);
    }
    Ok(())
}

/// Run the full selection pass over `config.input` and report on the bad
/// games it produced.
///
/// Cancellation is checked between games; games already written stay
/// written and the report covers them. Engine failures beyond the restart
/// budget and I/O failures abort the run.
pub fn run_selection<E: Evaluator + ?Sized>(
    config: &SelectorConfig,
    evaluator: &mut E,
    cancel: &CancelToken,
) -> Result<RunSummary> {
    let total = match count_games(&config.input) {
        Ok(total) => total,
        Err(e) => {
            warn!("could not pre-scan {}: {e}", config.input.display());
            0
        }
    };
    info!(input = %config.input.display(), games = total, "starting selection");

    let reader = PgnReader::open(&config.input).map_err(|e| SelectorError::io(&config.input, e))?;
    let mut partitioner = Partitioner::create(&config.good, &config.bad, &config.output_dir)?;
    let bad_start = partitioner.bad_start_offset();
    let mut summary = RunSummary::default();
    let mut progress = Progress::new(config.show_progress, total);

    for record in reader {
        if cancel.is_cancelled() {
            warn!("selection cancelled");
            summary.cancelled = true;
            break;
        }
        summary.games_seen += 1;
        match record {
            Ok(game) => {
                summary.games_parsed += 1;
                process_game(&game, config, evaluator, &mut partitioner, &mut summary)?;
            }
            Err(e) if e.is_recoverable() => {
                warn!("skipping record: {e}");
                summary.games_skipped += 1;
            }
            Err(e) => return Err(SelectorError::Input(e)),
        }
        progress.update(summary.games_seen);
    }
    progress.finish();

    let counts = partitioner.finish()?;
    summary.good = counts.good;
    summary.bad = counts.bad;
    summary.kept_despite_anomaly = counts.kept_despite_anomaly;
    summary.classification_errors = counts.classification_errors;
    info!(
        good = summary.good,
        bad = summary.bad,
        skipped = summary.games_skipped,
        "selection pass complete"
    );

    let outcome =
        report_bad_games(&config.bad, bad_start, &config.output_dir, BadGameTally::new())?;
    summary.bad_games_attributed = outcome.attributed;
    summary.tally = outcome.tally;

    summary.save(&config.output_dir.join(SUMMARY_FILE))?;
    Ok(summary)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod pipeline_tests;
