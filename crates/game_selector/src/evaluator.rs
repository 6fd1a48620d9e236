//! Position evaluation through a UCI engine process.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Centipawn value a forced mate is saturated to, in either direction.
pub const MATE_SCORE_CP: i32 = 32_000;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const READY_TIMEOUT: Duration = Duration::from_secs(30);
const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start engine {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no '{expected}' from engine within {timeout:?}")]
    Timeout {
        expected: &'static str,
        timeout: Duration,
    },
    #[error("engine exited while waiting for '{expected}'")]
    Exited { expected: &'static str },
    #[error("failed to write to engine: {0}")]
    Write(#[source] std::io::Error),
    #[error("engine protocol error: {0}")]
    Protocol(String),
    #[error("evaluator cannot be restarted")]
    RestartUnsupported,
}

/// Something that can score a position. Implemented by [`UciEngine`]; tests
/// substitute scripted evaluators.
pub trait Evaluator {
    /// Score the position given as FEN, searching for `move_time`.
    ///
    /// Returns pawns from White's point of view, with forced mates saturated
    /// to ±320.0.
    fn evaluate(&mut self, fen: &str, move_time: Duration) -> Result<f64, EngineError>;

    /// Replace a failed session with a fresh one.
    fn restart(&mut self) -> Result<(), EngineError> {
        Err(EngineError::RestartUnsupported)
    }
}

/// Engine score as reported in an `info` line, from the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Moves to mate; zero or negative means the side to move gets mated.
    Mate(i32),
}

impl Score {
    /// Extract the score from an `info ... score cp|mate N ...` line.
    pub fn from_info_line(line: &str) -> Option<Score> {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("info") {
            return None;
        }
        while let Some(token) = tokens.next() {
            if token == "score" {
                let kind = tokens.next()?;
                let value: i32 = tokens.next()?.parse().ok()?;
                return match kind {
                    "cp" => Some(Score::Centipawns(value)),
                    "mate" => Some(Score::Mate(value)),
                    _ => None,
                };
            }
        }
        None
    }

    /// Centipawns with mates saturated to ±[`MATE_SCORE_CP`].
    pub fn saturated_cp(self) -> i32 {
        match self {
            Score::Centipawns(cp) => cp.clamp(-MATE_SCORE_CP, MATE_SCORE_CP),
            Score::Mate(n) if n > 0 => MATE_SCORE_CP,
            Score::Mate(_) => -MATE_SCORE_CP,
        }
    }

    /// Pawns from White's point of view, given who was to move.
    pub fn white_pawns(self, white_to_move: bool) -> f64 {
        let cp = self.saturated_cp();
        let cp = if white_to_move { cp } else { -cp };
        f64::from(cp) / 100.0
    }
}

/// Parameters for launching an engine session.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub path: PathBuf,
    pub hash_mb: u32,
    pub threads: u32,
    /// Extra time allowed beyond the move time before the engine is
    /// considered hung.
    pub response_grace: Duration,
    pub handshake_timeout: Duration,
}

impl EngineSettings {
    pub fn new(path: impl Into<PathBuf>, hash_mb: u32, threads: u32) -> Self {
        Self {
            path: path.into(),
            hash_mb,
            threads,
            response_grace: Duration::from_secs(10),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }
}

/// A running UCI engine process. The process is asked to quit, and killed if
/// it does not, on [`UciEngine::shutdown`] or when the value is dropped.
pub struct UciEngine {
    settings: EngineSettings,
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    closed: bool,
}

impl UciEngine {
    /// Launch the engine, complete the UCI handshake and apply hash and
    /// thread options.
    pub fn start(settings: EngineSettings) -> Result<Self, EngineError> {
        let mut child = Command::new(&settings.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: settings.path.clone(),
                source,
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Protocol("engine pipes unavailable".into()));
            }
        };

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut engine = UciEngine {
            settings,
            child,
            stdin: BufWriter::new(stdin),
            rx,
            closed: false,
        };

        engine.send("uci")?;
        let handshake = engine.settings.handshake_timeout;
        engine.wait_for("uciok", handshake)?;

        engine.send(&format!("setoption name Hash value {}", engine.settings.hash_mb))?;
        engine.send(&format!("setoption name Threads value {}", engine.settings.threads))?;
        engine.send("isready")?;
        engine.wait_for("readyok", READY_TIMEOUT.max(handshake))?;

        info!(
            engine = %engine.settings.path.display(),
            hash_mb = engine.settings.hash_mb,
            threads = engine.settings.threads,
            "engine ready"
        );
        Ok(engine)
    }

    pub fn path(&self) -> &Path {
        &self.settings.path
    }

    fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!(target: "uci", "> {cmd}");
        writeln!(self.stdin, "{cmd}").map_err(EngineError::Write)?;
        self.stdin.flush().map_err(EngineError::Write)
    }

    fn recv(
        &mut self,
        expected: &'static str,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<String, EngineError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(remaining) {
            Ok(line) => {
                debug!(target: "uci", "< {line}");
                Ok(line)
            }
            Err(RecvTimeoutError::Timeout) => Err(EngineError::Timeout { expected, timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::Exited { expected }),
        }
    }

    fn wait_for(&mut self, expected: &'static str, timeout: Duration) -> Result<(), EngineError> {
        let deadline = Instant::now() + timeout;
        loop {
            let line = self.recv(expected, deadline, timeout)?;
            if line.trim() == expected {
                return Ok(());
            }
        }
    }

    /// Send `quit` and wait briefly for the process to exit; kill it otherwise.
    fn terminate(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.send("quit");

        let deadline = Instant::now() + QUIT_TIMEOUT;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return Ok(()),
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
                _ => break,
            }
        }
        warn!(engine = %self.settings.path.display(), "engine ignored quit, killing it");
        let _ = self.child.kill();
        self.child
            .wait()
            .map(|_| ())
            .map_err(|e| EngineError::Protocol(format!("failed to reap engine: {e}")))
    }

    /// End the session. Dropping the engine does the same, ignoring errors.
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        self.terminate()
    }
}

impl Evaluator for UciEngine {
    fn evaluate(&mut self, fen: &str, move_time: Duration) -> Result<f64, EngineError> {
        let white_to_move = fen.split_whitespace().nth(1) != Some("b");
        self.send(&format!("position fen {fen}"))?;
        self.send(&format!("go movetime {}", move_time.as_millis().max(1)))?;

        let timeout = move_time + self.settings.response_grace;
        let deadline = Instant::now() + timeout;
        let mut last_score = None;
        loop {
            let line = self.recv("bestmove", deadline, timeout)?;
            if line.starts_with("info") {
                if let Some(score) = Score::from_info_line(&line) {
                    last_score = Some(score);
                }
            } else if line.starts_with("bestmove") {
                let score = last_score.ok_or_else(|| {
                    EngineError::Protocol(format!("no score reported before '{line}'"))
                })?;
                let pawns = score.white_pawns(white_to_move);
                debug!(fen, ?score, pawns, "position evaluated");
                return Ok(pawns);
            }
        }
    }

    fn restart(&mut self) -> Result<(), EngineError> {
        warn!(engine = %self.settings.path.display(), "restarting engine");
        let _ = self.terminate();
        let fresh = UciEngine::start(self.settings.clone())?;
        // The old value is already terminated; dropping it is a no-op.
        *self = fresh;
        Ok(())
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("engine shutdown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_scores() {
        let line = "info depth 20 seldepth 28 multipv 1 score cp -35 nodes 1000 pv e2e4";
        assert_eq!(Score::from_info_line(line), Some(Score::Centipawns(-35)));
        assert_eq!(
            Score::from_info_line("info depth 9 score mate -3 lowerbound"),
            Some(Score::Mate(-3))
        );
        assert_eq!(Score::from_info_line("info string hello"), None);
        assert_eq!(Score::from_info_line("bestmove e2e4"), None);
        assert_eq!(Score::from_info_line("info score wdl 1 2 3"), None);
    }

    #[test]
    fn test_mate_scores_saturate() {
        for n in [1, 2, 17, 250] {
            assert_eq!(Score::Mate(n).white_pawns(true), 320.0);
            assert_eq!(Score::Mate(-n).white_pawns(true), -320.0);
            assert_eq!(Score::Mate(n).white_pawns(false), -320.0);
            assert_eq!(Score::Mate(-n).white_pawns(false), 320.0);
        }
        // Side to move is already mated.
        assert_eq!(Score::Mate(0).white_pawns(true), -320.0);
        assert_eq!(Score::Mate(0).white_pawns(false), 320.0);
    }

    #[test]
    fn test_centipawns_convert_to_white_pawns() {
        assert_eq!(Score::Centipawns(120).white_pawns(true), 1.2);
        assert_eq!(Score::Centipawns(120).white_pawns(false), -1.2);
        assert_eq!(Score::Centipawns(99_999).white_pawns(true), 320.0);
    }

    #[test]
    fn test_missing_engine_fails_to_spawn() {
        let settings = EngineSettings::new("/nonexistent/engine-binary", 16, 1);
        assert!(matches!(
            UciEngine::start(settings),
            Err(EngineError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_uci_program_times_out_in_handshake() {
        // `cat` echoes "uci" back but never answers "uciok".
        let mut settings = EngineSettings::new("cat", 16, 1);
        settings.handshake_timeout = Duration::from_millis(200);
        assert!(matches!(
            UciEngine::start(settings),
            Err(EngineError::Timeout {
                expected: "uciok",
                ..
            })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_exiting_program_is_detected() {
        // `true` exits immediately and closes its stdout.
        let settings = EngineSettings::new("true", 16, 1);
        match UciEngine::start(settings) {
            Err(EngineError::Exited { expected: "uciok" }) | Err(EngineError::Write(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("`true` is not a UCI engine"),
        }
    }
}
