//! Chess rules and notation helpers shared by the analysis crates.
//!
//! Everything position-related is delegated to `shakmaty`; this crate only
//! exposes the narrow string-in/string-out surface the analysis engine needs.

pub mod error;
pub mod pgn;
pub mod rules;

pub use error::RulesError;
pub use rules::{LegalMove, PlayedMove, Side, STANDARD_START_FEN};
