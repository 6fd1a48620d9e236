//! Minimal UCI engine that scores positions by material count.
//!
//! It answers `go` immediately, ignoring time controls, which makes it a
//! fast and deterministic stand-in for a real engine when smoke-testing the
//! selector.

use chess_core::{legal_moves, move_to_uci, set_position_from_uci, Move, Position};
use std::io::{self, BufRead, Write};

/// Score from the side to move, in UCI `score` syntax, and the move to play.
fn analyse(pos: &Position) -> (String, Option<Move>) {
    let moves = legal_moves(pos);
    if moves.is_empty() {
        let score = if pos.in_check(pos.side_to_move) {
            "mate 0".to_string()
        } else {
            "cp 0".to_string()
        };
        return (score, None);
    }

    let mut scratch = pos.clone();
    for &mv in &moves {
        let undo = scratch.make_move(mv);
        let mates = scratch.is_checkmate();
        scratch.unmake_move(mv, undo);
        if mates {
            return ("mate 1".to_string(), Some(mv));
        }
    }

    let balance = pos.material_balance();
    let cp = match pos.side_to_move {
        chess_core::Color::White => balance,
        chess_core::Color::Black => -balance,
    };
    (format!("cp {cp}"), moves.first().copied())
}

fn main() {
    // UCI engines communicate via stdin/stdout.
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    let mut pos = Position::startpos();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "uci" => {
                writeln!(stdout, "id name MaterialUci 0.2").ok();
                writeln!(stdout, "id author ML-chess").ok();
                writeln!(stdout, "option name Hash type spin default 16 min 1 max 65536").ok();
                writeln!(stdout, "option name Threads type spin default 1 min 1 max 512").ok();
                writeln!(stdout, "uciok").ok();
                stdout.flush().ok();
            }
            "isready" => {
                writeln!(stdout, "readyok").ok();
                stdout.flush().ok();
            }
            // Hash and Threads are accepted but have no effect.
            "setoption" | "stop" => {}
            "ucinewgame" => {
                pos = Position::startpos();
            }
            "position" => {
                if let Err(e) = set_position_from_uci(&mut pos, &parts[1..]) {
                    writeln!(stdout, "info string bad position: {e}").ok();
                    pos = Position::startpos();
                }
            }
            "go" => {
                let (score, best) = analyse(&pos);
                writeln!(stdout, "info depth 1 score {score} nodes 1").ok();
                match best {
                    Some(mv) => writeln!(stdout, "bestmove {}", move_to_uci(mv)).ok(),
                    None => writeln!(stdout, "bestmove 0000").ok(),
                };
                stdout.flush().ok();
            }
            "quit" => break,
            _ => {
                // ignore unknown commands
            }
        }
    }
}
