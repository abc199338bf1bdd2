//! Async contracts for the external evaluation sources.
//!
//! Methods return `impl Future + Send` so the scheduler can drive them from
//! spawned tasks with static dispatch.

use std::collections::BTreeMap;
use std::future::Future;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::evaluation::{LevelEvaluation, MovePolicy, SearchEvaluation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Loading,
    NoCache,
    Downloading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Loading,
    Ready,
    Error,
}

/// Output of one batched model call, one result per requested skill level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchEvaluation {
    pub results: Vec<LevelEvaluation>,
    /// Wall time reported by the model, in seconds
    pub time: f64,
}

/// Skill level → move → probability.
pub type BookMoves = BTreeMap<String, MovePolicy>;

/// Human move-probability model, one distribution per skill level.
pub trait MoveModel: Send + Sync {
    fn status(&self) -> ModelStatus;

    /// Evaluate `fens[i]` at skill level `levels[i]`. The scheduler always
    /// sends one position repeated once per level.
    fn batch_evaluate(
        &self,
        fens: &[String],
        levels: &[String],
        thresholds: &[f64],
    ) -> impl Future<Output = Result<BatchEvaluation, AnalysisError>> + Send;
}

/// Depth-iterative search engine.
pub trait SearchEngine: Send + Sync {
    fn status(&self) -> EngineStatus;

    /// Start an infinite analysis. Yields evaluations with strictly increasing
    /// depth until stopped; `None` if the search could not be started.
    fn stream_evaluations(
        &self,
        fen: &str,
        legal_move_count: usize,
    ) -> impl Future<Output = Option<BoxStream<'static, SearchEvaluation>>> + Send;

    /// Stop the active stream. Safe to call when nothing is running.
    fn stop_evaluation(&self) -> impl Future<Output = ()> + Send;
}

/// Opening-book lookup by FEN. Levels without book data may be missing or
/// map to an empty policy.
pub trait OpeningBook: Send + Sync {
    fn get_book_moves(
        &self,
        fen: &str,
    ) -> impl Future<Output = Result<BookMoves, AnalysisError>> + Send;
}
