//! PGN reader.
//!
//! Records are split and tokenized by `pgn_reader`; a visitor replays the
//! mainline with `shakmaty` and builds a [`Game`]. A record whose moves or
//! FEN tag cannot be resolved is reported as [`PgnError::Malformed`] and the
//! stream moves on to the next one; only I/O failures end the stream. Input
//! is handled as bytes, so text that is not valid UTF-8 is decoded lossily.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use pgn_reader::{Nag, RawComment, RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::{CastlingMode, Chess, Color, Position};

use crate::game::{Game, MoveNode};

#[derive(Debug, thiserror::Error)]
pub enum PgnError {
    #[error("game #{ordinal}: {reason}")]
    Malformed { ordinal: usize, reason: String },
    #[error("failed to read PGN: {0}")]
    Io(#[from] io::Error),
}

impl PgnError {
    /// Malformed records can be skipped; read failures cannot.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PgnError::Malformed { .. })
    }
}

/// Mainline state while the movetext of one record is visited.
struct Replay {
    headers: Vec<(String, String)>,
    start: Chess,
    pos: Chess,
    comment: Option<String>,
    nodes: Vec<MoveNode>,
}

/// Visitor turning one record into a [`Game`], or into the reason it was
/// rejected.
struct GameBuilder {
    ordinal: usize,
}

impl Visitor for GameBuilder {
    type Tags = Vec<(String, String)>;
    type Movetext = Replay;
    type Output = Result<Game, String>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(Vec::new())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let name = String::from_utf8_lossy(name).into_owned();
        let value = value.decode_utf8_lossy().into_owned();
        match tags.iter_mut().find(|(key, _)| *key == name) {
            Some(existing) => existing.1 = value,
            None => tags.push((name, value)),
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        let start = match tags.iter().find(|(key, _)| key == "FEN") {
            Some((_, fen)) => match start_position(fen) {
                Ok(pos) => pos,
                Err(reason) => return ControlFlow::Break(Err(reason)),
            },
            None => Chess::default(),
        };
        ControlFlow::Continue(Replay {
            headers: tags,
            pos: start.clone(),
            start,
            comment: None,
            nodes: Vec::new(),
        })
    }

    fn san(&mut self, replay: &mut Replay, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        let pos = &replay.pos;
        let mv = match san_plus.san.to_move(pos) {
            Ok(mv) => mv,
            Err(e) => {
                let number = pos.fullmoves();
                let dots = dots(pos.turn());
                return ControlFlow::Break(Err(format!("move {number}{dots} {san_plus}: {e}")));
            }
        };

        let san = San::from_move(pos, mv);
        let color = pos.turn();
        let move_number = pos.fullmoves().get();
        let pos = &mut replay.pos;
        pos.play_unchecked(mv);
        let suffix = if pos.is_checkmate() {
            "#"
        } else if pos.is_check() {
            "+"
        } else {
            ""
        };

        let parent = replay.nodes.len().checked_sub(1);
        replay.nodes.push(MoveNode {
            mv,
            san: format!("{san}{suffix}"),
            color,
            move_number,
            nags: Vec::new(),
            comment: None,
            parent,
        });
        ControlFlow::Continue(())
    }

    fn nag(&mut self, replay: &mut Replay, nag: Nag) -> ControlFlow<Self::Output> {
        if let Some(node) = replay.nodes.last_mut() {
            node.nags.push(nag.0);
        }
        ControlFlow::Continue(())
    }

    fn comment(
        &mut self,
        replay: &mut Replay,
        comment: RawComment<'_>,
    ) -> ControlFlow<Self::Output> {
        let text = normalize(&String::from_utf8_lossy(comment.as_bytes()));
        if text.is_empty() {
            return ControlFlow::Continue(());
        }
        let slot = match replay.nodes.last_mut() {
            Some(node) => &mut node.comment,
            None => &mut replay.comment,
        };
        match slot {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(&text);
            }
            None => *slot = Some(text),
        }
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, _replay: &mut Replay) -> ControlFlow<Self::Output, Skip> {
        // Mainline only.
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, replay: Replay) -> Self::Output {
        Ok(Game::new(
            self.ordinal,
            replay.headers,
            replay.start,
            replay.comment,
            replay.nodes,
        ))
    }
}

fn start_position(fen: &str) -> Result<Chess, String> {
    let fen: Fen = fen.parse().map_err(|e| format!("invalid FEN tag '{fen}': {e}"))?;
    fen.into_position(CastlingMode::Standard)
        .map_err(|e| format!("invalid FEN tag position: {e}"))
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn dots(side: Color) -> &'static str {
    match side {
        Color::White => ".",
        Color::Black => "...",
    }
}

/// Streaming reader over PGN bytes.
pub struct PgnReader<R> {
    reader: Reader<R>,
    origin: Option<(PathBuf, u64)>,
    games: usize,
}

impl PgnReader<File> {
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::open_at(path, 0)
    }

    /// Open a file and start reading at `offset` bytes, which must fall on a
    /// record boundary.
    pub fn open_at(path: &Path, offset: u64) -> io::Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut reader = Self::new(file);
        reader.origin = Some((path.to_path_buf(), offset));
        Ok(reader)
    }

    /// Restart from where the file was opened.
    pub fn rewind(&mut self) -> io::Result<()> {
        let Some((path, offset)) = self.origin.clone() else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "reader was not opened from a path",
            ));
        };
        *self = Self::open_at(&path, offset)?;
        Ok(())
    }
}

impl<R: Read> PgnReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Reader::new(reader),
            origin: None,
            games: 0,
        }
    }

    /// Number of records returned so far, including malformed ones.
    pub fn records_read(&self) -> usize {
        self.games
    }

    /// Read the next game. `None` at end of stream.
    pub fn read_game(&mut self) -> Option<Result<Game, PgnError>> {
        let ordinal = self.games + 1;
        let mut builder = GameBuilder { ordinal };
        match self.reader.read_game(&mut builder) {
            Ok(None) => None,
            Ok(Some(record)) => {
                self.games = ordinal;
                Some(record.map_err(|reason| PgnError::Malformed { ordinal, reason }))
            }
            Err(e) => Some(Err(PgnError::Io(e))),
        }
    }
}

impl<R: Read> Iterator for PgnReader<R> {
    type Item = Result<Game, PgnError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_game()
    }
}

/// Visitor that only counts records, skipping every movetext.
struct GameCounter;

impl Visitor for GameCounter {
    type Tags = ();
    type Movetext = ();
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _tags: ()) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Break(())
    }

    fn end_game(&mut self, _movetext: ()) -> Self::Output {}
}

/// Advisory pre-scan: number of records in a PGN file. Used only for
/// progress reporting.
pub fn count_games(path: &Path) -> io::Result<usize> {
    let mut reader = Reader::new(File::open(path)?);
    let mut count = 0;
    while reader.read_game(&mut GameCounter)?.is_some() {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
#[path = "pgn_tests.rs"]
mod pgn_tests;
