//! Bad-game reporting: per-game fault lines and per-player totals.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::Serialize;
use shakmaty::Color;
use tracing::{info, warn};

use crate::error::{Result, SelectorError};
use crate::game::{Game, GameResult};
use crate::partition::{remove_if_exists, write_atomic};
use crate::pgn::PgnReader;
use crate::termination::{classify, Classification, TerminationReason};

pub const REPORT_FILE: &str = "players_bad_games.txt";
pub const TOTALS_FILE: &str = "player_totals_bad_games.txt";
pub const SENTINEL_FILE: &str = "no_bad_games_found";

/// Per-player count of attributed bad games for one run.
///
/// Passed into the reporter and handed back with the run's additions; there
/// is no shared state between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BadGameTally {
    counts: BTreeMap<String, u64>,
}

impl BadGameTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn charge(&mut self, player: &str) {
        *self.counts.entry(player.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, player: &str) -> u64 {
        self.counts.get(player).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Players in name order with their counts.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(name, &n)| (name.as_str(), n))
    }
}

/// Who is held responsible for a bad game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribution {
    pub reason: TerminationReason,
    /// `None` when the side at fault cannot be determined.
    pub fault: Option<Color>,
}

/// Attribute a classified game to one side.
///
/// A decisive result charges the loser. For a draw the side named first in
/// the marker comment is charged.
pub fn attribute(game: &Game, classification: &Classification) -> Attribution {
    let reason = classification.reason;
    if !reason.is_anomalous() {
        return Attribution {
            reason,
            fault: None,
        };
    }
    let fault = match game.result() {
        Some(GameResult::Draw) => classification
            .anchor
            .and_then(|i| game.nodes().get(i))
            .and_then(|node| node.comment.as_deref())
            .and_then(first_named_side),
        Some(result) => result.loser(),
        None => None,
    };
    Attribution { reason, fault }
}

fn first_named_side(comment: &str) -> Option<Color> {
    match (comment.find("White"), comment.find("Black")) {
        (Some(w), Some(b)) if b < w => Some(Color::Black),
        (Some(_), _) => Some(Color::White),
        (None, Some(_)) => Some(Color::Black),
        (None, None) => None,
    }
}

/// One line of the per-game report.
pub fn report_line(game: &Game, attribution: &Attribution) -> String {
    let fault = match attribution.fault {
        Some(Color::White) => "White",
        Some(Color::Black) => "Black",
        None => "undetermined",
    };
    format!(
        "White: {} | Black: {} | Result: {} | Fault: {} ({})",
        game.white(),
        game.black(),
        game.result_tag(),
        fault,
        attribution.reason
    )
}

/// What the reporter saw in the bad partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    pub games: usize,
    pub attributed: usize,
    pub undetermined: usize,
    pub unreadable: usize,
    pub tally: BadGameTally,
}

/// Reclassify the bad games stored at or after `offset` in `bad_path` and
/// write the report files into `output_dir`.
///
/// Report lines are appended. The totals are appended as `name = count`
/// lines and the totals file is then merged. When no bad games are found
/// only the `no_bad_games_found` sentinel is written.
pub fn report_bad_games(
    bad_path: &Path,
    offset: u64,
    output_dir: &Path,
    tally: BadGameTally,
) -> Result<ReportOutcome> {
    let mut outcome = ReportOutcome {
        tally,
        ..ReportOutcome::default()
    };
    let mut lines = Vec::new();

    let reader = PgnReader::open_at(bad_path, offset).map_err(|e| SelectorError::io(bad_path, e))?;
    for record in reader {
        let game = match record {
            Ok(game) => game,
            Err(e) if e.is_recoverable() => {
                warn!("skipping unreadable bad game: {e}");
                outcome.unreadable += 1;
                continue;
            }
            Err(e) => return Err(SelectorError::Input(e)),
        };
        outcome.games += 1;

        let attribution = attribute(&game, &classify(&game));
        match attribution.fault {
            Some(color) => {
                outcome.tally.charge(game.player(color));
                outcome.attributed += 1;
            }
            None => outcome.undetermined += 1,
        }
        lines.push(report_line(&game, &attribution));
    }

    let sentinel = output_dir.join(SENTINEL_FILE);
    if outcome.games == 0 {
        fs::write(&sentinel, "").map_err(|e| SelectorError::io(&sentinel, e))?;
        info!("no bad games found");
        return Ok(outcome);
    }
    remove_if_exists(&sentinel)?;

    let mut report = String::new();
    for line in &lines {
        report.push_str(line);
        report.push('\n');
    }
    append(&output_dir.join(REPORT_FILE), &report)?;

    let totals_path = output_dir.join(TOTALS_FILE);
    let mut totals = String::new();
    for (name, count) in outcome.tally.iter() {
        totals.push_str(&format!("{name} = {count}\n"));
    }
    append(&totals_path, &totals)?;
    merge_totals(&totals_path)?;

    info!(
        games = outcome.games,
        attributed = outcome.attributed,
        undetermined = outcome.undetermined,
        players = outcome.tally.len(),
        "bad game report written"
    );
    Ok(outcome)
}

/// Append `text` to `path`, first closing an unterminated last line so the
/// new lines never run into it.
fn append(path: &Path, text: &str) -> Result<()> {
    let io_err = |e| SelectorError::io(path, e);
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;

    let mut chunk = String::new();
    let len = file.metadata().map_err(io_err)?.len();
    if len > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))
            .and_then(|_| file.read_exact(&mut last))
            .map_err(io_err)?;
        if last[0] != b'\n' {
            chunk.push('\n');
        }
    }
    chunk.push_str(text);

    file.write_all(chunk.as_bytes())
        .and_then(|()| file.flush())
        .map_err(io_err)
}

fn parse_total(line: &str) -> Option<(&str, u64)> {
    let (name, count) = line.rsplit_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, count.trim().parse().ok()?))
}

/// Collapse repeated `name = count` lines into one summed line per name.
///
/// Names keep the order of their first appearance. Lines that are not
/// `name = count` are kept verbatim after the totals; blank lines are
/// dropped. Merging an already merged text returns it unchanged.
pub fn merge_totals_text(text: &str) -> String {
    let mut order: Vec<(String, u64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut other = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_total(line) {
            Some((name, count)) => match index.get(name) {
                Some(&i) => order[i].1 = order[i].1.saturating_add(count),
                None => {
                    index.insert(name.to_string(), order.len());
                    order.push((name.to_string(), count));
                }
            },
            None => other.push(line),
        }
    }

    let mut merged = String::new();
    for (name, count) in &order {
        merged.push_str(&format!("{name} = {count}\n"));
    }
    for line in other {
        merged.push_str(line);
        merged.push('\n');
    }
    merged
}

/// Merge a totals file in place. A missing file is left missing.
pub fn merge_totals(path: &Path) -> Result<()> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(SelectorError::io(path, e)),
    };
    let merged = merge_totals_text(&text);
    if merged != text {
        write_atomic(path, &merged)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod report_tests;
