//! In-memory opening book.
//!
//! bincode-serialized map of normalized FEN → skill level → move (UCI) →
//! game statistics. Serves book policies to the scheduler and can stand in
//! for the move-probability model.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chess_core::rules::Side;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engines::{BatchEvaluation, BookMoves, ModelStatus, MoveModel, OpeningBook};
use crate::error::AnalysisError;
use crate::evaluation::{LevelEvaluation, MovePolicy};

/// Stats for a single book move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMoveStats {
    pub games: u32,
    pub white_wins: u32,
    pub draws: u32,
    pub black_wins: u32,
}

/// Move → stats for one skill level
pub type LevelBook = HashMap<String, BookMoveStats>;

/// Normalized FEN → skill level → moves
pub type BookPositions = HashMap<String, HashMap<String, LevelBook>>;

#[derive(Debug, Clone, Default)]
pub struct BookCache {
    positions: BookPositions,
}

impl BookCache {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: BookPositions) -> Self {
        Self { positions }
    }

    /// Load the book from a binary file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let file = File::open(path.as_ref())
            .map_err(|e| AnalysisError::Book(format!("{}: {e}", path.as_ref().display())))?;
        let positions: BookPositions = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| AnalysisError::Book(e.to_string()))?;
        Ok(Self { positions })
    }

    /// Load the book, falling back to an empty one (book lookups disabled).
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(book) => {
                info!(positions = book.len(), moves = book.move_count(), "Loaded opening book");
                book
            }
            Err(e) => {
                warn!(path = %path.as_ref().display(), error = %e, "Failed to load opening book");
                warn!("Book lookups will be disabled");
                Self::empty()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), AnalysisError> {
        let file = File::create(path.as_ref())
            .map_err(|e| AnalysisError::Book(format!("{}: {e}", path.as_ref().display())))?;
        bincode::serialize_into(BufWriter::new(file), &self.positions)
            .map_err(|e| AnalysisError::Book(e.to_string()))
    }

    /// Record a move's statistics, replacing any previous entry.
    pub fn insert(&mut self, fen: &str, level: &str, mv: &str, stats: BookMoveStats) {
        self.positions
            .entry(normalize_fen(fen))
            .or_default()
            .entry(level.to_string())
            .or_default()
            .insert(mv.to_string(), stats);
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn move_count(&self) -> usize {
        self.positions
            .values()
            .flat_map(|levels| levels.values())
            .map(|moves| moves.len())
            .sum()
    }

    fn level_book(&self, fen: &str, level: &str) -> Option<&LevelBook> {
        self.positions.get(&normalize_fen(fen))?.get(level)
    }

    /// Game counts normalized into move probabilities. Empty when the
    /// position or level has no games.
    pub fn policy(&self, fen: &str, level: &str) -> MovePolicy {
        let Some(moves) = self.level_book(fen, level) else {
            return MovePolicy::new();
        };
        let total: u32 = moves.values().map(|s| s.games).sum();
        if total == 0 {
            return MovePolicy::new();
        }
        moves
            .iter()
            .filter(|(_, s)| s.games > 0)
            .map(|(mv, s)| (mv.clone(), s.games as f64 / total as f64))
            .collect()
    }

    /// Expected score for the side to move over all book games at this level.
    pub fn expected_score(&self, fen: &str, level: &str) -> Option<f64> {
        let moves = self.level_book(fen, level)?;
        let (games, white_points) = moves.values().fold((0u32, 0.0), |(games, points), s| {
            (games + s.games, points + s.white_wins as f64 + 0.5 * s.draws as f64)
        });
        if games == 0 {
            return None;
        }
        let white_score = white_points / games as f64;
        Some(match Side::from_fen(fen) {
            Side::White => white_score,
            Side::Black => 1.0 - white_score,
        })
    }

    /// Skill levels with data for this position.
    pub fn levels(&self, fen: &str) -> Vec<String> {
        self.positions
            .get(&normalize_fen(fen))
            .map(|levels| levels.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl OpeningBook for BookCache {
    async fn get_book_moves(&self, fen: &str) -> Result<BookMoves, AnalysisError> {
        Ok(self
            .levels(fen)
            .into_iter()
            .map(|level| {
                let policy = self.policy(fen, &level);
                (level, policy)
            })
            .collect())
    }
}

/// Serves book statistics through the move-model contract.
///
/// Positions outside the book get an empty policy and an even value.
#[derive(Debug, Clone, Default)]
pub struct BookMoveModel {
    book: BookCache,
}

impl BookMoveModel {
    pub fn new(book: BookCache) -> Self {
        Self { book }
    }
}

impl MoveModel for BookMoveModel {
    fn status(&self) -> ModelStatus {
        ModelStatus::Ready
    }

    async fn batch_evaluate(
        &self,
        fens: &[String],
        levels: &[String],
        _thresholds: &[f64],
    ) -> Result<BatchEvaluation, AnalysisError> {
        if fens.len() != levels.len() {
            return Err(AnalysisError::MoveModel(format!(
                "{} positions for {} skill levels",
                fens.len(),
                levels.len()
            )));
        }
        let results = fens
            .iter()
            .zip(levels)
            .map(|(fen, level)| LevelEvaluation {
                value: self.book.expected_score(fen, level).unwrap_or(0.5),
                policy: self.book.policy(fen, level),
            })
            .collect();
        Ok(BatchEvaluation { results, time: 0.0 })
    }
}

/// Strips move counters from FEN, keeping only position + side + castling + ep.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}
