//! UI-facing summaries of a node's evaluations.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chess_core::rules::legal_moves;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::color::{move_colors, MoveColor};
use crate::evaluation::{MovePolicy, MoveProbabilities, SearchEvaluation};
use crate::graph::{GraphError, NodeId, PositionGraph};
use crate::skill::SkillLevels;

/// Loss cut between good and ok moves
const OK_LOSS: f64 = -0.05;
/// Loss cut between ok moves and blunders
const BLUNDER_LOSS: f64 = -0.10;

/// Candidates taken from the reference level and from the engine
const MATRIX_TOP_MOVES: usize = 3;

/// Move-map x axis range, in pawns
const MOVE_MAP_MIN_PAWNS: f64 = -4.0;

/// Share of a level's probability mass per move-quality bucket, in percent.
/// Sums to exactly 100, or to 0 when nothing could be tallied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlunderMeter {
    pub good: u32,
    pub ok: u32,
    pub blunder: u32,
}

/// Tally `policy` into good / ok / blunder buckets by win-rate loss.
///
/// Losses may be given with either sign. Moves without a loss are skipped.
pub fn blunder_meter(policy: &MovePolicy, losses: &BTreeMap<String, f64>) -> BlunderMeter {
    let mut raw = [0.0f64; 3];
    for (mv, &probability) in policy {
        let Some(loss) = losses.get(mv).map(|l| -l.abs()) else {
            continue;
        };
        let bucket = if loss >= OK_LOSS {
            0
        } else if loss >= BLUNDER_LOSS {
            1
        } else {
            2
        };
        raw[bucket] += probability * 100.0;
    }

    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        return BlunderMeter::default();
    }

    let shares = raw.map(|r| r * 100.0 / total);
    let mut floored = shares.map(|s| (s + 1e-9).floor() as u32);
    let mut shortfall = 100u32.saturating_sub(floored.iter().sum());

    // Largest remainder first
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        let ra = shares[a] - floored[a] as f64;
        let rb = shares[b] - floored[b] as f64;
        rb.partial_cmp(&ra).unwrap_or(Ordering::Equal)
    });
    for &i in order.iter().cycle() {
        if shortfall == 0 {
            break;
        }
        floored[i] += 1;
        shortfall -= 1;
    }

    BlunderMeter {
        good: floored[0],
        ok: floored[1],
        blunder: floored[2],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveProbability {
    #[serde(rename = "move")]
    pub mv: String,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineMove {
    #[serde(rename = "move")]
    pub mv: String,
    /// White's point of view
    pub cp: i32,
    /// Relative to the best move, side to move's point of view
    pub relative_cp: i32,
    pub win_rate: Option<f64>,
    pub win_rate_loss: Option<f64>,
}

/// Moves by descending probability.
pub fn ranked_probabilities(policy: &MovePolicy) -> Vec<MoveProbability> {
    let mut moves: Vec<MoveProbability> = policy
        .iter()
        .map(|(mv, &probability)| MoveProbability { mv: mv.clone(), probability })
        .collect();
    moves.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.mv.cmp(&b.mv))
    });
    moves
}

/// Engine moves, best first for the side to move.
pub fn ranked_engine_moves(search: &SearchEvaluation) -> Vec<EngineMove> {
    let mut moves: Vec<EngineMove> = search
        .cp_vec
        .iter()
        .map(|(mv, &cp)| EngineMove {
            mv: mv.clone(),
            cp,
            relative_cp: search.relative_cp(mv).unwrap_or(0),
            win_rate: search.win_rate(mv),
            win_rate_loss: search.win_rate_loss(mv),
        })
        .collect();
    moves.sort_by(|a, b| b.relative_cp.cmp(&a.relative_cp).then_with(|| a.mv.cmp(&b.mv)));
    moves
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingRow {
    pub level: String,
    pub rating: Option<u32>,
    /// Candidate move → percent
    pub probabilities: IndexMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MovesByRating {
    pub moves: Vec<String>,
    pub rows: Vec<RatingRow>,
}

/// Probability of each candidate move at every skill level.
///
/// Candidates: the reference level's top three, the engine's top three and
/// every level's favorite, in that order without duplicates.
pub fn moves_by_rating(
    probabilities: &MoveProbabilities,
    search: Option<&SearchEvaluation>,
    levels: &SkillLevels,
) -> MovesByRating {
    let mut candidates: IndexSet<String> = IndexSet::new();

    if let Some(reference) = probabilities.get(levels.reference()) {
        candidates.extend(
            ranked_probabilities(&reference.policy)
                .into_iter()
                .take(MATRIX_TOP_MOVES)
                .map(|m| m.mv),
        );
    }
    if let Some(search) = search {
        candidates.extend(
            ranked_engine_moves(search)
                .into_iter()
                .take(MATRIX_TOP_MOVES)
                .map(|m| m.mv),
        );
    }
    for level in levels.levels() {
        if let Some(top) = probabilities
            .get(level)
            .and_then(|l| ranked_probabilities(&l.policy).into_iter().next())
        {
            candidates.insert(top.mv);
        }
    }

    let rows = levels
        .levels()
        .iter()
        .map(|level| {
            let policy = probabilities.get(level).map(|l| &l.policy);
            RatingRow {
                level: level.clone(),
                rating: SkillLevels::rating(level),
                probabilities: candidates
                    .iter()
                    .map(|mv| {
                        let p = policy.and_then(|p| p.get(mv)).copied().unwrap_or(0.0);
                        (mv.clone(), p * 100.0)
                    })
                    .collect(),
            }
        })
        .collect();

    MovesByRating {
        moves: candidates.into_iter().collect(),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveMapPoint {
    #[serde(rename = "move")]
    pub mv: String,
    /// Relative score in pawns, within [-4, 0]
    pub x: f64,
    /// Probability in percent
    pub y: f64,
}

/// Scatter points for moves with both a probability and a relative score.
pub fn move_map(policy: &MovePolicy, search: &SearchEvaluation) -> Vec<MoveMapPoint> {
    ranked_probabilities(policy)
        .into_iter()
        .filter_map(|m| {
            let cp = search.relative_cp(&m.mv)?;
            Some(MoveMapPoint {
                x: (cp as f64 / 100.0).clamp(MOVE_MAP_MIN_PAWNS, 0.0),
                y: m.probability * 100.0,
                mv: m.mv,
            })
        })
        .collect()
}

/// Everything the analysis panel shows for one node.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Recommendations {
    pub blunder_meter: BlunderMeter,
    pub probabilities: Vec<MoveProbability>,
    pub engine_moves: Vec<EngineMove>,
    pub moves_by_rating: MovesByRating,
    pub move_map: Vec<MoveMapPoint>,
    pub colors: BTreeMap<String, MoveColor>,
}

impl Recommendations {
    /// Aggregate the node's current data; missing data yields empty parts.
    pub fn for_node(graph: &PositionGraph, node: NodeId, levels: &SkillLevels) -> Result<Self, GraphError> {
        let node = graph.get(node)?;
        let search = node.search.as_ref();
        let reference = node
            .move_probabilities
            .as_ref()
            .and_then(|p| p.get(levels.reference()))
            .map(|l| &l.policy);

        let legal: Vec<String> = legal_moves(&node.fen)
            .map(|moves| moves.into_iter().map(|m| m.uci).collect())
            .unwrap_or_default();

        Ok(Self {
            blunder_meter: match (reference, search.and_then(|s| s.winrate_loss_vec.as_ref())) {
                (Some(policy), Some(losses)) => blunder_meter(policy, losses),
                _ => BlunderMeter::default(),
            },
            probabilities: reference.map(ranked_probabilities).unwrap_or_default(),
            engine_moves: search.map(ranked_engine_moves).unwrap_or_default(),
            moves_by_rating: node
                .move_probabilities
                .as_ref()
                .map(|p| moves_by_rating(p, search, levels))
                .unwrap_or_default(),
            move_map: match (reference, search) {
                (Some(policy), Some(search)) => move_map(policy, search),
                _ => Vec::new(),
            },
            colors: move_colors(&legal, search),
        })
    }
}
