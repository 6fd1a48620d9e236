//! Parsed game records.
//!
//! A [`Game`] is built once by the PGN reader and is read-only afterwards.
//! Moves are stored already resolved against the board, so positions can be
//! derived for any node by replaying the mainline.

use shakmaty::fen::Fen;
use shakmaty::{Chess, Color, EnPassantMode, Move, Position};

/// Tags written first, in this order, when a game is serialized.
pub const SEVEN_TAG_ROSTER: [&str; 7] =
    ["Event", "Site", "Date", "Round", "White", "Black", "Result"];

/// Outcome recorded in the `Result` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
}

impl GameResult {
    /// Parse a `Result` tag value. `*` and anything else unrecognized give `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "1-0" => Some(GameResult::WhiteWins),
            "0-1" => Some(GameResult::BlackWins),
            "1/2-1/2" => Some(GameResult::Draw),
            _ => None,
        }
    }

    pub fn as_tag(self) -> &'static str {
        match self {
            GameResult::WhiteWins => "1-0",
            GameResult::BlackWins => "0-1",
            GameResult::Draw => "1/2-1/2",
        }
    }

    /// The side that lost, if the game was decisive.
    pub fn loser(self) -> Option<Color> {
        match self {
            GameResult::WhiteWins => Some(Color::Black),
            GameResult::BlackWins => Some(Color::White),
            GameResult::Draw => None,
        }
    }
}

/// One half-move of the mainline.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveNode {
    /// Move resolved against the position before it.
    pub mv: Move,
    /// Canonical SAN of the move.
    pub san: String,
    /// Side that played the move.
    pub color: Color,
    /// Full move number the move belongs to.
    pub move_number: u32,
    /// Numeric annotation glyphs (`$n`).
    pub nags: Vec<u8>,
    /// Comment text following the move, whitespace-normalized.
    pub comment: Option<String>,
    /// Index of the previous node; `None` for the first move.
    pub parent: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Game {
    ordinal: usize,
    headers: Vec<(String, String)>,
    start: Chess,
    comment: Option<String>,
    nodes: Vec<MoveNode>,
}

impl Game {
    pub(crate) fn new(
        ordinal: usize,
        headers: Vec<(String, String)>,
        start: Chess,
        comment: Option<String>,
        nodes: Vec<MoveNode>,
    ) -> Self {
        Self {
            ordinal,
            headers,
            start,
            comment,
            nodes,
        }
    }

    /// 1-based position of the record in its source file.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Raw `Result` tag, `*` when absent.
    pub fn result_tag(&self) -> &str {
        self.header("Result").unwrap_or("*")
    }

    pub fn result(&self) -> Option<GameResult> {
        GameResult::from_tag(self.result_tag())
    }

    pub fn white(&self) -> &str {
        self.header("White").unwrap_or("?")
    }

    pub fn black(&self) -> &str {
        self.header("Black").unwrap_or("?")
    }

    /// Name of the player of `color`.
    pub fn player(&self, color: Color) -> &str {
        match color {
            Color::White => self.white(),
            Color::Black => self.black(),
        }
    }

    /// Comment placed before the first move.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn nodes(&self) -> &[MoveNode] {
        &self.nodes
    }

    pub fn parent(&self, index: usize) -> Option<&MoveNode> {
        self.nodes
            .get(index)
            .and_then(|node| node.parent)
            .and_then(|p| self.nodes.get(p))
    }

    pub fn start_position(&self) -> &Chess {
        &self.start
    }

    /// Position after the move at `index` has been played. Indices past the
    /// end give the final position.
    pub fn position_after(&self, index: usize) -> Chess {
        let end = (index + 1).min(self.nodes.len());
        let mut pos = self.start.clone();
        for node in &self.nodes[..end] {
            pos.play_unchecked(node.mv);
        }
        pos
    }

    /// FEN after the move at `index`. The en-passant square is only written
    /// when the capture is legal.
    pub fn fen_after(&self, index: usize) -> String {
        Fen::from_position(&self.position_after(index), EnPassantMode::Legal).to_string()
    }

    /// Canonical PGN: Seven Tag Roster first, then the remaining tags in
    /// input order, then the movetext wrapped at 80 columns. No trailing
    /// newline.
    pub fn to_pgn(&self) -> String {
        let mut out = String::new();
        for name in SEVEN_TAG_ROSTER {
            let value = self.header(name).unwrap_or(match name {
                "Date" => "????.??.??",
                "Result" => "*",
                _ => "?",
            });
            push_tag(&mut out, name, value);
        }
        for (name, value) in &self.headers {
            if !SEVEN_TAG_ROSTER.contains(&name.as_str()) {
                push_tag(&mut out, name, value);
            }
        }
        out.push('\n');
        out.push_str(&self.movetext());
        out
    }

    fn movetext(&self) -> String {
        let mut tokens: Vec<String> = Vec::new();
        if let Some(comment) = &self.comment {
            tokens.push(format!("{{ {comment} }}"));
        }

        let mut needs_number = true;
        for node in &self.nodes {
            match node.color {
                Color::White => tokens.push(format!("{}.", node.move_number)),
                Color::Black if needs_number => tokens.push(format!("{}...", node.move_number)),
                Color::Black => {}
            }
            tokens.push(node.san.clone());
            tokens.extend(node.nags.iter().map(|nag| format!("${nag}")));
            needs_number = false;
            if let Some(comment) = &node.comment {
                tokens.push(format!("{{ {comment} }}"));
                needs_number = true;
            }
        }
        tokens.push(self.result_tag().to_string());

        wrap_tokens(&tokens, 80)
    }
}

fn push_tag(out: &mut String, name: &str, value: &str) {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    out.push_str(&format!("[{name} \"{escaped}\"]\n"));
}

fn wrap_tokens(tokens: &[String], width: usize) -> String {
    let mut out = String::new();
    let mut line_len = 0;
    for token in tokens {
        if line_len > 0 && line_len + 1 + token.len() > width {
            out.push('\n');
            line_len = 0;
        } else if line_len > 0 {
            out.push(' ');
            line_len += 1;
        }
        out.push_str(token);
        line_len += token.len();
    }
    out
}
