//! Good/bad output partitions and the per-run side files.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SelectorError};
use crate::game::Game;

/// Anomalous games whose result was corroborated by the evaluation.
pub const KEPT_FILE: &str = "kept_games_score_margin_reached.pgn";
/// Anomalous games whose `Result` tag could not be interpreted.
pub const CLASSIFICATION_ERRORS_FILE: &str = "classification_errors.txt";

/// Which partition a game went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Good,
    Bad,
}

/// A PGN file opened for appending whole records.
struct RecordFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl RecordFile {
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SelectorError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SelectorError::io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| SelectorError::io(path, e))?
            .len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    /// Append one record followed by a blank line. A failed write is rolled
    /// back so the file never ends in a partial record.
    fn append(&mut self, record: &str) -> Result<()> {
        let text = format!("{record}\n\n");
        let written = self
            .file
            .write_all(text.as_bytes())
            .and_then(|()| self.file.flush());
        if let Err(e) = written {
            if let Err(trunc) = self.file.set_len(self.len) {
                warn!(path = %self.path.display(), "could not roll back partial record: {trunc}");
            }
            return Err(SelectorError::io(&self.path, e));
        }
        self.len += text.len() as u64;
        Ok(())
    }
}

/// Counts produced by one partitioning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionCounts {
    pub good: usize,
    pub bad: usize,
    pub kept_despite_anomaly: usize,
    pub classification_errors: usize,
}

/// Routes games to the good and bad files in input order.
pub struct Partitioner {
    good: RecordFile,
    bad: RecordFile,
    bad_start: u64,
    output_dir: PathBuf,
    kept: Vec<String>,
    classification_errors: Vec<(usize, String)>,
    counts: PartitionCounts,
}

impl Partitioner {
    /// Open (or create) both partitions for appending. Side files go to
    /// `output_dir`.
    pub fn create(good: &Path, bad: &Path, output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir).map_err(|e| SelectorError::io(output_dir, e))?;
        let good = RecordFile::open(good)?;
        let bad = RecordFile::open(bad)?;
        let bad_start = bad.len;
        Ok(Self {
            good,
            bad,
            bad_start,
            output_dir: output_dir.to_path_buf(),
            kept: Vec::new(),
            classification_errors: Vec::new(),
            counts: PartitionCounts::default(),
        })
    }

    /// Byte offset in the bad file where this run's records begin.
    pub fn bad_start_offset(&self) -> u64 {
        self.bad_start
    }

    pub fn counts(&self) -> PartitionCounts {
        self.counts
    }

    /// Append the canonical form of `game` to one partition.
    pub fn emit(&mut self, game: &Game, keep: bool) -> Result<Destination> {
        let pgn = game.to_pgn();
        let destination = if keep {
            self.good.append(&pgn)?;
            self.counts.good += 1;
            Destination::Good
        } else {
            self.bad.append(&pgn)?;
            self.counts.bad += 1;
            Destination::Bad
        };
        debug!(game = game.ordinal(), ?destination, "game partitioned");
        Ok(destination)
    }

    /// Remember an anomalous game that stayed in the good partition.
    pub fn record_kept_anomaly(&mut self, game: &Game) {
        self.kept.push(game.to_pgn());
        self.counts.kept_despite_anomaly += 1;
    }

    /// Remember a game whose result tag could not be classified.
    pub fn record_classification_error(&mut self, game: &Game) {
        warn!(
            game = game.ordinal(),
            result = game.result_tag(),
            "unrecognized result on anomalous game"
        );
        self.classification_errors
            .push((game.ordinal(), game.result_tag().to_string()));
        self.counts.classification_errors += 1;
    }

    /// Write the side files and return the final counts.
    ///
    /// The kept file is rewritten on every run. The classification error list
    /// is written only when there is something to list; a stale one from an
    /// earlier run is removed.
    pub fn finish(self) -> Result<PartitionCounts> {
        let mut kept = String::new();
        for pgn in &self.kept {
            kept.push_str(pgn);
            kept.push_str("\n\n");
        }
        write_atomic(&self.output_dir.join(KEPT_FILE), &kept)?;

        let errors_path = self.output_dir.join(CLASSIFICATION_ERRORS_FILE);
        if self.classification_errors.is_empty() {
            remove_if_exists(&errors_path)?;
        } else {
            let mut text = String::new();
            for (ordinal, result) in &self.classification_errors {
                text.push_str(&format!("game {ordinal}: unrecognized result \"{result}\"\n"));
            }
            write_atomic(&errors_path, &text)?;
        }
        Ok(self.counts)
    }
}

/// Replace `path` with `contents` via a sibling temporary file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(|e| SelectorError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| SelectorError::io(path, e))
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SelectorError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pgn::PgnReader;
    use std::io::Cursor;

    fn games(text: &str) -> Vec<Game> {
        PgnReader::new(Cursor::new(text.as_bytes().to_vec()))
            .map(|g| g.unwrap())
            .collect()
    }

    const GAMES: &str = "[White \"A\"]\n[Result \"1-0\"]\n\n1. e4 1-0\n\n\
                         [White \"B\"]\n[Result \"0-1\"]\n\n1. d4 0-1\n\n\
                         [White \"C\"]\n[Result \"*\"]\n\n1. c4 {crash} *\n";

    #[test]
    fn test_emit_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pgn");
        let bad = dir.path().join("bad.pgn");
        let games = games(GAMES);

        let mut partitioner = Partitioner::create(&good, &bad, dir.path()).unwrap();
        assert_eq!(partitioner.emit(&games[0], true).unwrap(), Destination::Good);
        assert_eq!(partitioner.emit(&games[1], false).unwrap(), Destination::Bad);
        assert_eq!(partitioner.emit(&games[2], true).unwrap(), Destination::Good);
        partitioner.record_kept_anomaly(&games[2]);
        let counts = partitioner.finish().unwrap();

        assert_eq!(counts.good, 2);
        assert_eq!(counts.bad, 1);
        assert_eq!(counts.kept_despite_anomaly, 1);

        let good_text = fs::read_to_string(&good).unwrap();
        assert_eq!(
            good_text,
            format!("{}\n\n{}\n\n", games[0].to_pgn(), games[2].to_pgn())
        );
        let kept = fs::read_to_string(dir.path().join(KEPT_FILE)).unwrap();
        assert_eq!(kept, format!("{}\n\n", games[2].to_pgn()));
        assert!(!dir.path().join(CLASSIFICATION_ERRORS_FILE).exists());
    }

    #[test]
    fn test_bad_start_offset_marks_this_run() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.pgn");
        let bad = dir.path().join("bad.pgn");
        fs::write(&bad, "previous run\n\n").unwrap();

        let games = games(GAMES);
        let mut partitioner = Partitioner::create(&good, &bad, dir.path()).unwrap();
        assert_eq!(partitioner.bad_start_offset(), 14);
        partitioner.emit(&games[1], false).unwrap();
        partitioner.finish().unwrap();

        let text = fs::read_to_string(&bad).unwrap();
        assert!(text.starts_with("previous run\n\n"));
        assert_eq!(&text[14..], format!("{}\n\n", games[1].to_pgn()));
    }

    #[test]
    fn test_classification_errors_listed() {
        let dir = tempfile::tempdir().unwrap();
        let games = games(GAMES);
        let mut partitioner = Partitioner::create(
            &dir.path().join("good.pgn"),
            &dir.path().join("bad.pgn"),
            dir.path(),
        )
        .unwrap();
        partitioner.record_classification_error(&games[2]);
        partitioner.emit(&games[2], false).unwrap();
        let counts = partitioner.finish().unwrap();
        assert_eq!(counts.classification_errors, 1);

        let listed = fs::read_to_string(dir.path().join(CLASSIFICATION_ERRORS_FILE)).unwrap();
        assert_eq!(listed, "game 3: unrecognized result \"*\"\n");
    }
}
