//! Legal-move oracle: FEN parsing, move enumeration and move application.

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position};

use crate::error::RulesError;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// Read the side-to-move field of a FEN without parsing the board.
    /// Anything other than `b` is treated as White.
    pub fn from_fen(fen: &str) -> Side {
        match fen.split_whitespace().nth(1) {
            Some("b") => Side::Black,
            _ => Side::White,
        }
    }

    pub fn is_white(self) -> bool {
        self == Side::White
    }
}

/// A legal move in both notations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalMove {
    pub uci: String,
    pub san: String,
    pub from: String,
    pub to: String,
    pub promotion: Option<char>,
}

/// Result of applying a move to a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedMove {
    pub uci: String,
    pub san: String,
    /// FEN of the resulting position
    pub fen: String,
}

/// Parse a FEN into a playable position.
pub fn parse_position(fen: &str) -> Result<Chess, RulesError> {
    let parsed: Fen = fen
        .parse()
        .map_err(|e| RulesError::InvalidFen(format!("{fen}: {e}")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| RulesError::InvalidFen(format!("{fen}: {e}")))
}

/// Zero-based ply count derived from the full-move counter and side to move.
pub fn ply_from_fen(fen: &str) -> u32 {
    let fullmove: u32 = fen
        .split_whitespace()
        .nth(5)
        .and_then(|n| n.parse().ok())
        .unwrap_or(1)
        .max(1);
    let black = u32::from(!Side::from_fen(fen).is_white());
    (fullmove - 1) * 2 + black
}

/// All legal moves in the position.
pub fn legal_moves(fen: &str) -> Result<Vec<LegalMove>, RulesError> {
    let pos = parse_position(fen)?;
    Ok(pos
        .legal_moves()
        .iter()
        .map(|m| LegalMove {
            uci: m.to_uci(CastlingMode::Standard).to_string(),
            san: san_with_suffix(&pos, m),
            from: m.from().map(|sq| sq.to_string()).unwrap_or_default(),
            to: m.to().to_string(),
            promotion: m.promotion().map(|role| role.char()),
        })
        .collect())
}

/// Number of legal moves, or 0 if the FEN cannot be parsed.
pub fn legal_move_count(fen: &str) -> usize {
    parse_position(fen)
        .map(|pos| pos.legal_moves().len())
        .unwrap_or(0)
}

/// Apply a UCI move and return the resulting position.
pub fn play_uci(fen: &str, uci: &str) -> Result<PlayedMove, RulesError> {
    let pos = parse_position(fen)?;
    let legal_move = to_legal_move(&pos, fen, uci)?;
    Ok(play(pos, &legal_move))
}

/// Apply a SAN move (check suffixes and annotations allowed, e.g. `Nf3+!`).
pub fn play_san(fen: &str, san: &str) -> Result<PlayedMove, RulesError> {
    let pos = parse_position(fen)?;
    let trimmed = san.trim_end_matches(['!', '?']);
    let parsed: SanPlus = trimmed
        .parse()
        .map_err(|_| RulesError::InvalidSan(san.to_string()))?;
    let legal_move = parsed.san.to_move(&pos).map_err(|_| RulesError::IllegalMove {
        fen: fen.to_string(),
        mv: san.to_string(),
    })?;
    Ok(play(pos, &legal_move))
}

fn play(pos: Chess, legal_move: &Move) -> PlayedMove {
    let san = san_with_suffix(&pos, legal_move);
    let uci = legal_move.to_uci(CastlingMode::Standard).to_string();

    let mut after = pos;
    after.play_unchecked(legal_move.clone());

    PlayedMove {
        uci,
        san,
        fen: Fen::from_position(&after, EnPassantMode::Legal).to_string(),
    }
}

fn to_legal_move(pos: &Chess, fen: &str, uci: &str) -> Result<Move, RulesError> {
    let uci_move: UciMove = uci
        .parse()
        .map_err(|_| RulesError::InvalidUci(uci.to_string()))?;
    uci_move.to_move(pos).map_err(|_| RulesError::IllegalMove {
        fen: fen.to_string(),
        mv: uci.to_string(),
    })
}

fn san_with_suffix(pos: &Chess, m: &Move) -> String {
    let mut san = San::from_move(pos, m.clone()).to_string();
    let mut after = pos.clone();
    after.play_unchecked(m.clone());
    if after.is_checkmate() {
        san.push('#');
    } else if after.is_check() {
        san.push('+');
    }
    san
}
