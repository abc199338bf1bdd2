//! Position-analysis engine: a game tree annotated by a human move-probability
//! model and a search engine, with move classification, aggregate
//! recommendations and a plain-language description per position.

pub mod aggregator;
pub mod book_cache;
pub mod classifier;
pub mod color;
pub mod config;
pub mod description;
pub mod engines;
pub mod error;
pub mod evaluation;
pub mod graph;
pub mod scheduler;
pub mod skill;
pub mod stockfish;
pub mod win_rate;

pub use aggregator::Recommendations;
pub use config::AnalysisConfig;
pub use error::AnalysisError;
pub use graph::{GraphError, NodeId, PositionGraph, PositionNode};
pub use scheduler::{AnalysisOutcome, EvaluationScheduler, SharedGraph};
pub use skill::SkillLevels;
