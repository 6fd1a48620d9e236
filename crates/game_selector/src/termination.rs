//! Detection of anomalous game endings from move comments.
//!
//! The same [`classify`] function is used for the selection pass and for
//! the bad-game report, so both always agree on a game's reason.

use std::fmt;

use serde::Serialize;

use crate::game::Game;

/// Why a game ended abnormally. `None` means no adjudication marker was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TerminationReason {
    WinOnTime,
    IllegalMove,
    Crash,
    DrawnWithBareKing,
    FalseIllegalClaim,
    FalseDrawClaim,
    None,
}

impl TerminationReason {
    pub fn is_anomalous(self) -> bool {
        self != TerminationReason::None
    }

    /// Human readable label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            TerminationReason::WinOnTime => "win on time",
            TerminationReason::IllegalMove => "illegal move",
            TerminationReason::Crash => "crash",
            TerminationReason::DrawnWithBareKing => "drawn with bare king",
            TerminationReason::FalseIllegalClaim => "false illegal-move claim",
            TerminationReason::FalseDrawClaim => "false draw claim",
            TerminationReason::None => "none",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Marker phrases written by tournament managers and adapters, grouped by
/// the reason they signal. Order is priority: the first matching group wins.
pub const MARKER_RULES: &[(TerminationReason, &[&str])] = &[
    (
        TerminationReason::WinOnTime,
        &["wins on time", "forfeits on time"],
    ),
    (
        TerminationReason::IllegalMove,
        &[
            "Arena Adjudication. Illegal move!",
            "Forfeit due to invalid move",
            "polyglot: resign (illegal engine move",
        ],
    ),
    (TerminationReason::Crash, &["exited unexpectedly"]),
    (TerminationReason::DrawnWithBareKing, &["but bare king"]),
    (
        TerminationReason::FalseIllegalClaim,
        &["False illegal-move claim"],
    ),
    (
        TerminationReason::FalseDrawClaim,
        &["False draw claim: 'Fifty move rule'"],
    ),
];

/// Reason signalled by a single comment, if any. Matching is exact and
/// case-sensitive.
pub fn reason_for_comment(comment: &str) -> Option<TerminationReason> {
    MARKER_RULES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|phrase| comment.contains(phrase)))
        .map(|(reason, _)| *reason)
}

/// Result of classifying one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub reason: TerminationReason,
    /// Index of the first node whose comment carries a marker.
    pub anchor: Option<usize>,
}

impl Classification {
    pub fn is_anomalous(&self) -> bool {
        self.reason.is_anomalous()
    }
}

/// Scan the mainline in play order and stop at the first node whose comment
/// carries a marker phrase.
pub fn classify(game: &Game) -> Classification {
    game.nodes()
        .iter()
        .enumerate()
        .find_map(|(index, node)| {
            let reason = reason_for_comment(node.comment.as_deref()?)?;
            Some(Classification {
                reason,
                anchor: Some(index),
            })
        })
        .unwrap_or(Classification {
            reason: TerminationReason::None,
            anchor: None,
        })
}

#[cfg(test)]
#[path = "termination_tests.rs"]
mod termination_tests;
