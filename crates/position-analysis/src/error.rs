//! Analysis error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stockfish error: {0}")]
    Stockfish(String),

    #[error("Move model error: {0}")]
    MoveModel(String),

    #[error("Opening book error: {0}")]
    Book(String),

    #[error("Rules error: {0}")]
    Rules(#[from] chess_core::RulesError),

    #[error("Graph error: {0}")]
    Graph(#[from] crate::graph::GraphError),
}
