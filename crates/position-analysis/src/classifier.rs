//! Move classification — pure functions only.
//!
//! Tags describe the move leading *into* a child node and are computed from
//! the parent's evaluations.

use serde::{Deserialize, Serialize};

use crate::evaluation::{MovePolicy, SearchEvaluation};

/// Search depth below which no tags are assigned
pub const MIN_CLASSIFICATION_DEPTH: u32 = 12;

/// Win-rate loss thresholds (magnitudes)
pub const BLUNDER_WIN_RATE_LOSS: f64 = 0.10;
pub const INACCURACY_WIN_RATE_LOSS: f64 = 0.05;

/// Fallback blunder threshold when no win-rate loss is known
pub const BLUNDER_RELATIVE_CP: i32 = -150;

/// A move at or below this probability counts as overlooked
const UNLIKELY_PROBABILITY: f64 = 0.10;

/// Required win-rate edge over the reference level's expected win rate
const EXCELLENT_ADVANTAGE: f64 = 0.10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTags {
    pub blunder: bool,
    pub inaccuracy: bool,
    pub excellent: bool,
    pub best: bool,
}

impl MoveTags {
    /// Single display label, strongest claim first.
    pub fn label(&self) -> Option<&'static str> {
        if self.best {
            Some("best")
        } else if self.excellent {
            Some("excellent")
        } else if self.blunder {
            Some("blunder")
        } else if self.inaccuracy {
            Some("inaccuracy")
        } else {
            None
        }
    }
}

/// Classify `mv` played from a position with the given evaluations.
///
/// `policy` is the reference skill level's distribution for the same position.
/// Returns all-false tags until the search has reached
/// [`MIN_CLASSIFICATION_DEPTH`].
pub fn classify_move(
    search: Option<&SearchEvaluation>,
    policy: Option<&MovePolicy>,
    mv: &str,
) -> MoveTags {
    let search = match search {
        Some(s) if s.depth >= MIN_CLASSIFICATION_DEPTH => s,
        _ => return MoveTags::default(),
    };

    let loss = search.win_rate_loss(mv).map(f64::abs);

    let blunder = match loss {
        Some(loss) => loss >= BLUNDER_WIN_RATE_LOSS,
        None => search
            .relative_cp(mv)
            .is_some_and(|cp| cp < BLUNDER_RELATIVE_CP),
    };
    let inaccuracy = !blunder && loss.is_some_and(|loss| loss >= INACCURACY_WIN_RATE_LOSS);

    MoveTags {
        blunder,
        inaccuracy,
        excellent: is_excellent(search, policy, mv),
        best: search.model_move == mv,
    }
}

fn is_excellent(search: &SearchEvaluation, policy: Option<&MovePolicy>, mv: &str) -> bool {
    let (Some(policy), Some(move_rate)) = (policy, search.win_rate(mv)) else {
        return false;
    };

    let probability = policy.get(mv).copied().unwrap_or(0.0);
    if probability > UNLIKELY_PROBABILITY {
        return false;
    }

    match expected_win_rate(search, policy) {
        Some(expected) => move_rate - expected >= EXCELLENT_ADVANTAGE,
        None => false,
    }
}

/// Probability-weighted average win rate over moves that have both a
/// probability and a win rate.
pub fn expected_win_rate(search: &SearchEvaluation, policy: &MovePolicy) -> Option<f64> {
    let (weighted, mass) = policy
        .iter()
        .filter_map(|(mv, &p)| Some((p, search.win_rate(mv)?)))
        .fold((0.0, 0.0), |(weighted, mass), (p, rate)| (weighted + p * rate, mass + p));

    if mass > 0.0 {
        Some(weighted / mass)
    } else {
        None
    }
}
