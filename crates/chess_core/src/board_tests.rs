use super::*;
use crate::{movegen::legal_moves, parse_uci_move};

#[test]
fn test_startpos_fen_roundtrip() {
    assert_eq!(Position::startpos().to_fen(), STARTING_FEN);
    assert_eq!(Position::from_fen(STARTING_FEN).unwrap(), Position::startpos());
}

#[test]
fn test_fen_counters_default() {
    let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 b - -").unwrap();
    assert_eq!(pos.halfmove_clock, 0);
    assert_eq!(pos.fullmove_number, 1);
    assert_eq!(pos.side_to_move, Color::Black);
}

#[test]
fn test_invalid_fens_are_rejected() {
    assert_eq!(Position::from_fen("8/8/8 w - -"), Err(FenError::RankCount(3)));
    assert_eq!(
        Position::from_fen("4k3/8/8/8/8/8/8/4K3 x - -"),
        Err(FenError::SideToMove("x".into()))
    );
    assert_eq!(
        Position::from_fen("4k3/8/8/8/8/8/8/4X3 w - -"),
        Err(FenError::PieceChar('X'))
    );
    assert_eq!(Position::from_fen("8/8/8/8/8/8/8/4K3 w - -"), Err(FenError::Kings));
    assert!(matches!(
        Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - x 1"),
        Err(FenError::Counter(_))
    ));
    assert!(matches!(Position::from_fen("4k3 w"), Err(FenError::MissingFields(2))));
}

#[test]
fn test_en_passant_only_written_when_legal() {
    let mut pos = Position::startpos();
    let e4 = parse_uci_move(&pos, "e2e4").unwrap();
    pos.make_move(e4);
    // No black pawn can capture on e3.
    assert_eq!(
        pos.to_fen(),
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
    );

    let pos = Position::from_fen("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2").unwrap();
    assert_eq!(pos.to_fen(), "4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2");
}

#[test]
fn test_make_unmake_restores_position() {
    let original =
        Position::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
            .unwrap();
    let mut pos = original.clone();
    for mv in legal_moves(&original) {
        let undo = pos.make_move(mv);
        pos.unmake_move(mv, undo);
        assert_eq!(pos, original, "unmake failed for {:?}", mv);
    }
}

#[test]
fn test_castling_rights_lost_on_rook_capture() {
    let mut pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
    let capture = parse_uci_move(&pos, "a1a8").unwrap();
    pos.make_move(capture);
    assert!(!pos.castling.wq);
    assert!(!pos.castling.bq);
    assert!(pos.castling.wk && pos.castling.bk);
}

#[test]
fn test_material_and_mate() {
    let pos = Position::from_fen("4k3/8/8/8/8/8/8/3QK3 w - - 0 1").unwrap();
    assert_eq!(pos.material_balance(), 900);

    // Back rank mate.
    let mated = Position::from_fen("R5k1/5ppp/8/8/8/8/8/6K1 b - - 0 1").unwrap();
    assert!(mated.is_checkmate());
    assert!(!Position::startpos().is_checkmate());
}
