//! Analysis configuration from environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::AnalysisError;
use crate::skill::DEFAULT_REFERENCE_LEVEL;

#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// Path to the bincode opening book
    pub book_path: String,

    /// Search depth at which a node counts as fully analyzed
    pub target_depth: u32,

    /// Interval between engine readiness checks
    pub readiness_poll: Duration,

    /// Total time to wait for an engine before abandoning a node
    pub readiness_timeout: Duration,

    /// Positions before this ply also consult the opening book
    pub opening_book_plies: u32,

    /// Skill level used for classification, meter and move map
    pub reference_level: String,

    /// Stockfish `Threads` option
    pub stockfish_threads: u32,

    /// Stockfish `Hash` option in MB
    pub stockfish_hash_mb: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            stockfish_path: "/usr/local/bin/stockfish".to_string(),
            book_path: "data/opening_book.bin".to_string(),
            target_depth: 18,
            readiness_poll: Duration::from_millis(100),
            readiness_timeout: Duration::from_millis(3000),
            opening_book_plies: 10,
            reference_level: DEFAULT_REFERENCE_LEVEL.to_string(),
            stockfish_threads: 1,
            stockfish_hash_mb: 256,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, AnalysisError> {
        let defaults = Self::default();

        let readiness_poll_ms: u64 = parse_var("READINESS_POLL_MS", 100)?;
        let readiness_timeout_ms: u64 = parse_var("READINESS_TIMEOUT_MS", 3000)?;
        if readiness_poll_ms == 0 {
            return Err(AnalysisError::Config("READINESS_POLL_MS must be positive".into()));
        }

        let config = Self {
            stockfish_path: env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path),
            book_path: env::var("OPENING_BOOK_PATH").unwrap_or(defaults.book_path),
            target_depth: parse_var("TARGET_DEPTH", defaults.target_depth)?,
            readiness_poll: Duration::from_millis(readiness_poll_ms),
            readiness_timeout: Duration::from_millis(readiness_timeout_ms),
            opening_book_plies: parse_var("OPENING_BOOK_PLIES", defaults.opening_book_plies)?,
            reference_level: env::var("REFERENCE_SKILL_LEVEL").unwrap_or(defaults.reference_level),
            stockfish_threads: parse_var("STOCKFISH_THREADS", defaults.stockfish_threads)?,
            stockfish_hash_mb: parse_var("STOCKFISH_HASH_MB", defaults.stockfish_hash_mb)?,
        };

        info!(
            target_depth = config.target_depth,
            reference_level = %config.reference_level,
            "Analysis config loaded"
        );
        Ok(config)
    }
}

/// Parse an optional variable; unset means default, unparsable is an error.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AnalysisError> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| AnalysisError::Config(format!("{name} has invalid value {v:?}"))),
        Err(_) => Ok(default),
    }
}
