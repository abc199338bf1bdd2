use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Invalid UCI move: {0}")]
    InvalidUci(String),

    #[error("Invalid SAN move: {0}")]
    InvalidSan(String),

    #[error("Illegal move {mv} in {fen}")]
    IllegalMove { fen: String, mv: String },
}
