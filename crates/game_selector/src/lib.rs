//! Game selector for engine tournaments
//!
//! This crate provides:
//! - A streaming PGN reader that derives positions for every move
//! - Detection of anomalous endings (time losses, illegal moves, crashes, false claims)
//! - Re-evaluation of the anomalous position with a UCI engine
//! - Partitioning into good and bad games, plus per-player bad-game reports
//!
//! # Usage
//!
//! ```bash
//! # Split a tournament PGN, re-checking anomalies with Stockfish
//! cargo run -p game_selector -- select --input games.pgn --engine ./stockfish --output-dir out
//!
//! # Rebuild the report from an existing bad partition
//! cargo run -p game_selector -- report out/bad.pgn --output-dir out
//! ```

pub mod config;
pub mod error;
pub mod evaluator;
pub mod game;
pub mod partition;
pub mod pgn;
pub mod pipeline;
pub mod report;
pub mod retention;
pub mod termination;

pub use config::{ConfigOverrides, SelectorConfig};
pub use error::{Result, SelectorError};
pub use evaluator::{EngineError, EngineSettings, Evaluator, Score, UciEngine, MATE_SCORE_CP};
pub use game::{Game, GameResult, MoveNode};
pub use partition::{Destination, PartitionCounts, Partitioner};
pub use pgn::{count_games, PgnError, PgnReader};
pub use pipeline::{run_selection, CancelToken, RunSummary, SUMMARY_FILE};
pub use report::{
    attribute, merge_totals, report_bad_games, Attribution, BadGameTally, ReportOutcome,
};
pub use retention::{decide, RetentionDecision};
pub use termination::{classify, Classification, TerminationReason};
