//! Move generator node counts against well known reference values.

use chess_core::{Position, legal_moves_into, parse_uci_move, replay, set_position_from_uci};

fn perft(pos: &mut Position, depth: u8) -> u64 {
    if depth == 0 {
        return 1;
    }
    let mut moves = Vec::new();
    legal_moves_into(pos, &mut moves);
    if depth == 1 {
        return moves.len() as u64;
    }
    let mut nodes = 0;
    for mv in moves {
        let undo = pos.make_move(mv);
        nodes += perft(pos, depth - 1);
        pos.unmake_move(mv, undo);
    }
    nodes
}

#[test]
fn test_perft_startpos() {
    let mut pos = Position::startpos();
    assert_eq!(perft(&mut pos, 1), 20);
    assert_eq!(perft(&mut pos, 2), 400);
    assert_eq!(perft(&mut pos, 3), 8902);
}

#[test]
fn test_perft_kiwipete() {
    let mut pos =
        Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
            .unwrap();
    assert_eq!(perft(&mut pos, 1), 48);
    assert_eq!(perft(&mut pos, 2), 2039);
}

#[test]
fn test_perft_position_3() {
    let mut pos = Position::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1").unwrap();
    assert_eq!(perft(&mut pos, 1), 14);
    assert_eq!(perft(&mut pos, 2), 191);
    assert_eq!(perft(&mut pos, 3), 2812);
}

#[test]
fn test_uci_position_command() {
    let mut pos = Position::startpos();
    set_position_from_uci(&mut pos, &["startpos", "moves", "e2e4", "e7e5", "g1f3"]).unwrap();
    assert_eq!(
        pos.to_fen(),
        "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
    );

    set_position_from_uci(
        &mut pos,
        &["fen", "4k3/8/8/8/8/8/8/3QK3", "w", "-", "-", "0", "1", "moves", "d1d7"],
    )
    .unwrap();
    assert_eq!(pos.to_fen(), "4k3/3Q4/8/8/8/8/8/4K3 b - - 1 1");
}

#[test]
fn test_replay_matches_incremental_play() {
    let start = Position::startpos();
    let mut pos = start.clone();
    let mut played = Vec::new();
    for txt in ["d2d4", "d7d5", "c2c4", "d5c4"] {
        let mv = parse_uci_move(&pos, txt).unwrap();
        pos.make_move(mv);
        played.push(mv);
    }
    assert_eq!(replay(&start, &played), pos);
}
