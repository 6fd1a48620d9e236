//! Keep/discard policy for games with an anomalous ending.

use crate::game::GameResult;
use crate::termination::TerminationReason;

/// Outcome of the retention policy for one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionDecision {
    pub keep: bool,
    pub reason: TerminationReason,
}

/// Decide whether a game stays in the good partition.
///
/// `score_wpov` is the re-evaluated score of the anchor position in pawns,
/// White positive. A game without an anomaly is always kept. For an
/// anomalous game the recorded result must be corroborated by the
/// evaluation by at least `margin` pawns:
///
/// * `0-1` is discarded when `score_wpov > -margin`
/// * `1-0` is discarded when `score_wpov < margin`
/// * `1/2-1/2` is discarded when `score_wpov > -margin` or `score_wpov < margin`
///
/// The draw rule discards nearly every draw: for any positive margin the two
/// conditions together cover the whole real line.
pub fn decide(
    result: GameResult,
    reason: TerminationReason,
    score_wpov: f64,
    margin: f64,
) -> RetentionDecision {
    let discard = reason.is_anomalous()
        && match result {
            GameResult::BlackWins => score_wpov > -margin,
            GameResult::WhiteWins => score_wpov < margin,
            GameResult::Draw => score_wpov > -margin || score_wpov < margin,
        };
    RetentionDecision {
        keep: !discard,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARGIN: f64 = 5.0;

    fn keep(result: GameResult, score: f64) -> bool {
        decide(result, TerminationReason::WinOnTime, score, MARGIN).keep
    }

    #[test]
    fn test_black_win_needs_black_advantage() {
        assert!(!keep(GameResult::BlackWins, 1.2));
        assert!(!keep(GameResult::BlackWins, -4.99));
        assert!(keep(GameResult::BlackWins, -5.0));
        assert!(keep(GameResult::BlackWins, -320.0));
    }

    #[test]
    fn test_white_win_needs_white_advantage() {
        assert!(keep(GameResult::WhiteWins, 6.0));
        assert!(keep(GameResult::WhiteWins, 5.0));
        assert!(!keep(GameResult::WhiteWins, 4.99));
        assert!(!keep(GameResult::WhiteWins, -320.0));
    }

    #[test]
    fn test_draw_rule_is_near_degenerate() {
        // With a positive margin no score keeps a draw.
        for score in [-320.0, -5.0, -1.0, 0.0, 1.0, 5.0, 320.0] {
            assert!(!keep(GameResult::Draw, score), "draw kept at {score}");
        }
        // Only a zero margin leaves a single keeping point.
        let at_zero = |score| decide(GameResult::Draw, TerminationReason::Crash, score, 0.0).keep;
        assert!(at_zero(0.0));
        assert!(!at_zero(0.01));
        assert!(!at_zero(-0.01));
    }

    #[test]
    fn test_no_anomaly_is_always_kept() {
        for result in [GameResult::WhiteWins, GameResult::BlackWins, GameResult::Draw] {
            for score in [-320.0, 0.0, 320.0] {
                let decision = decide(result, TerminationReason::None, score, MARGIN);
                assert!(decision.keep);
                assert_eq!(decision.reason, TerminationReason::None);
            }
        }
    }

    #[test]
    fn test_decide_is_pure() {
        let a = decide(GameResult::BlackWins, TerminationReason::IllegalMove, 0.5, MARGIN);
        let b = decide(GameResult::BlackWins, TerminationReason::IllegalMove, 0.5, MARGIN);
        assert_eq!(a, b);
        assert_eq!(a.reason, TerminationReason::IllegalMove);
    }
}
