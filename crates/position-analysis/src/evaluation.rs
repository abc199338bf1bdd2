//! Evaluation payloads attached to position nodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::win_rate::win_rate;

/// Move (UCI) → probability, as produced by the model or the opening book.
pub type MovePolicy = BTreeMap<String, f64>;

/// Model output for one skill level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelEvaluation {
    /// Expected value for the side to move
    pub value: f64,
    pub policy: MovePolicy,
}

/// Skill level → model output.
pub type MoveProbabilities = BTreeMap<String, LevelEvaluation>;

/// One depth of search-engine output for a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEvaluation {
    pub depth: u32,
    /// Engine's preferred move (UCI)
    pub model_move: String,
    /// Move → centipawns from White's point of view
    pub cp_vec: BTreeMap<String, i32>,
    /// Move → centipawns relative to the best move, for the side to move (≤ 0)
    pub cp_relative_vec: BTreeMap<String, i32>,
    pub winrate_vec: Option<BTreeMap<String, f64>>,
    /// Move → win rate minus the best move's win rate (≤ 0)
    pub winrate_loss_vec: Option<BTreeMap<String, f64>>,
}

impl SearchEvaluation {
    /// Build an evaluation from White-POV scores, deriving the relative table.
    pub fn new(
        depth: u32,
        model_move: impl Into<String>,
        cp_vec: BTreeMap<String, i32>,
        white_to_move: bool,
    ) -> Self {
        let mut eval = Self {
            depth,
            model_move: model_move.into(),
            cp_vec,
            cp_relative_vec: BTreeMap::new(),
            winrate_vec: None,
            winrate_loss_vec: None,
        };
        if let Some(best) = eval.best_side_cp(white_to_move) {
            eval.cp_relative_vec = eval
                .cp_vec
                .keys()
                .filter_map(|mv| Some((mv.clone(), eval.side_cp(mv, white_to_move)? - best)))
                .collect();
        }
        eval
    }

    /// Centipawns for `mv` from the side to move's point of view.
    pub fn side_cp(&self, mv: &str, white_to_move: bool) -> Option<i32> {
        let cp = *self.cp_vec.get(mv)?;
        Some(if white_to_move { cp } else { -cp })
    }

    fn best_side_cp(&self, white_to_move: bool) -> Option<i32> {
        self.cp_vec
            .keys()
            .filter_map(|mv| self.side_cp(mv, white_to_move))
            .max()
    }

    /// Fill in the win-rate tables from `cp_vec` when the engine did not
    /// provide them. Existing tables are kept as-is.
    pub fn with_win_rates(mut self, white_to_move: bool) -> Self {
        if self.winrate_vec.is_none() {
            let rates: BTreeMap<String, f64> = self
                .cp_vec
                .keys()
                .filter_map(|mv| Some((mv.clone(), win_rate(self.side_cp(mv, white_to_move)?))))
                .collect();
            self.winrate_vec = Some(rates);
        }
        if self.winrate_loss_vec.is_none() {
            if let Some(rates) = &self.winrate_vec {
                let best = rates.values().copied().fold(f64::NEG_INFINITY, f64::max);
                let losses = rates
                    .iter()
                    .map(|(mv, rate)| (mv.clone(), rate - best))
                    .collect();
                self.winrate_loss_vec = Some(losses);
            }
        }
        self
    }

    pub fn win_rate(&self, mv: &str) -> Option<f64> {
        self.winrate_vec.as_ref()?.get(mv).copied()
    }

    pub fn win_rate_loss(&self, mv: &str) -> Option<f64> {
        self.winrate_loss_vec.as_ref()?.get(mv).copied()
    }

    pub fn relative_cp(&self, mv: &str) -> Option<i32> {
        self.cp_relative_vec.get(mv).copied()
    }
}
