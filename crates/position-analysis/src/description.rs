//! Plain-language summary of a position: how many good moves there are, how
//! easy they are to find and whether a trap is waiting.
//!
//! Phrase choice is randomized through the caller's [`Rng`] so output is
//! reproducible with a seeded or mock generator.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chess_core::rules::{legal_moves, Side};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::evaluation::{MoveProbabilities, SearchEvaluation};
use crate::skill::SkillLevels;
use crate::win_rate::{wdl, win_rate, Wdl};

/// Win/draw tolerance for a move to count as good
const GOOD_MOVE_EPSILON: f64 = 0.08;

/// Win-rate loss versus the optimal move that makes a move a trap
const TRAP_LOSS_GAP: f64 = 0.10;

/// Share of all probability mass on losing moves above which the position
/// is called treacherous
const TREACHEROUS_MASS: f64 = 0.40;

/// Good moves named in the summary sentence
const MAX_LISTED_MOVES: usize = 4;

/// Mean centipawns of the good moves → outcome phrase, best first.
const OUTCOMES: [(i32, &str); 6] = [
    (500, "a crushing advantage"),
    (200, "a clear advantage"),
    (75, "a slight edge"),
    (-75, "a roughly equal game"),
    (-200, "a slightly worse position"),
    (-500, "a difficult defense"),
];
const LOST_OUTCOME: &str = "a fight to survive";

const NO_LEGAL_MOVES: &str = "There are no legal moves in this position.";

const SEVERAL_MOVES: &[&str] = &["Several moves", "A handful of moves", "Multiple moves"];
const VERB_SINGULAR: &[&str] = &["leads to", "secures"];
const VERB_PLURAL: &[&str] = &["lead to", "secure"];

const HARD_TO_FIND: &[&str] = &[
    "Most players will struggle to find a good continuation.",
    "Finding a good continuation here is a real challenge.",
];
const SKILLED_FIND: &[&str] = &[
    "Stronger players should find a good continuation.",
    "A skilled player will likely find the right idea.",
];
const EASY_TO_FIND: &[&str] = &[
    "Most players will find a good continuation.",
    "Finding a good continuation should be straightforward.",
];
const UNIQUELY_DEMANDING: &[&str] = &[
    "Only the strongest players find the best move, {}.",
    "The best move, {}, is much harder to spot.",
];
const TRAP_WARNING: &[&str] = &[
    "Beware of {}, a tempting mistake.",
    "Watch out for {}: it looks natural but loses ground.",
];
const TREACHEROUS: &[&str] = &[
    "This position is highly treacherous: most natural moves go wrong.",
    "A highly treacherous position where the natural moves lose ground.",
];
const TEMPTATION: &[&str] = &[
    "Many players are tempted by {} instead.",
    "{} is a tempting alternative that falls short.",
];

/// How many skill levels find a move, bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Findability {
    /// Found by at most 2 levels
    Hard,
    /// Found by at most 6 levels
    Skilled,
    Straightforward,
}

impl Findability {
    pub fn from_count(levels_found: usize) -> Self {
        match levels_found {
            0..=2 => Findability::Hard,
            3..=6 => Findability::Skilled,
            _ => Findability::Straightforward,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Trap {
    /// The most popular non-good move loses significantly
    Blunder {
        #[serde(rename = "move")]
        mv: String,
    },
    /// Losing moves carry most of the probability mass
    Treacherous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Arrow {
    pub from: String,
    pub to: String,
    pub optimal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionDescription {
    pub text: String,
    /// Equally winning moves (UCI), best first
    pub good_moves: Vec<String>,
    pub optimal_move: Option<String>,
    pub findability: Option<Findability>,
    pub optimal_findability: Option<Findability>,
    pub trap: Option<Trap>,
    pub temptation: Option<String>,
    pub arrows: Vec<Arrow>,
}

/// Scored legal move
struct Candidate {
    uci: String,
    san: String,
    from: String,
    to: String,
    cp: i32,
    wdl: Wdl,
}

/// Describe the position at `fen` from its search evaluation and the
/// per-level move probabilities.
pub fn describe_position<R: Rng + ?Sized>(
    fen: &str,
    search: &SearchEvaluation,
    probabilities: &MoveProbabilities,
    levels: &SkillLevels,
    rng: &mut R,
) -> PositionDescription {
    let white_to_move = Side::from_fen(fen).is_white();

    // Only legal moves with a score; stale engine entries are dropped
    let mut candidates: Vec<Candidate> = legal_moves(fen)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|m| {
            let cp = search.side_cp(&m.uci, white_to_move)?;
            Some(Candidate {
                uci: m.uci,
                san: m.san,
                from: m.from,
                to: m.to,
                cp,
                wdl: wdl(cp),
            })
        })
        .collect();
    if candidates.is_empty() {
        return PositionDescription {
            text: NO_LEGAL_MOVES.to_string(),
            ..Default::default()
        };
    }
    candidates.sort_by(|a, b| b.cp.cmp(&a.cp).then_with(|| a.uci.cmp(&b.uci)));

    let optimal = &candidates[0];
    let good: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| {
            (c.wdl.win - optimal.wdl.win).abs() <= GOOD_MOVE_EPSILON
                && (c.wdl.draw - optimal.wdl.draw).abs() <= GOOD_MOVE_EPSILON
        })
        .collect();
    let is_good = |mv: &str| good.iter().any(|c| c.uci == mv);
    let san_of: HashMap<&str, &str> = candidates.iter().map(|c| (c.uci.as_str(), c.san.as_str())).collect();

    let mut sentences = vec![summary_sentence(&good, rng)];

    // Per-level tallies
    let mut good_found = 0;
    let mut optimal_found = 0;
    let mut near_misses: BTreeMap<String, usize> = BTreeMap::new();
    for level in levels.levels() {
        let Some(level_eval) = probabilities.get(level) else {
            continue;
        };
        let ranked = ranked_moves(&level_eval.policy);
        let Some(&(top_move, top_p)) = ranked.first() else {
            continue;
        };
        if is_good(top_move) {
            good_found += 1;
        }
        if top_move == optimal.uci {
            optimal_found += 1;
        }
        for &(mv, p) in ranked.iter().skip(1).take(2) {
            if !is_good(mv) && top_p - p <= GOOD_MOVE_EPSILON {
                *near_misses.entry(mv.to_string()).or_default() += 1;
            }
        }
    }

    let findability = Findability::from_count(good_found);
    let optimal_findability = Findability::from_count(optimal_found);
    let findability_bank = match findability {
        Findability::Hard => HARD_TO_FIND,
        Findability::Skilled => SKILLED_FIND,
        Findability::Straightforward => EASY_TO_FIND,
    };
    sentences.push(pick(rng, findability_bank).to_string());

    let clearly_best = good
        .get(1)
        .is_some_and(|next| optimal.wdl.win - next.wdl.win > GOOD_MOVE_EPSILON / 2.0);
    if optimal_findability < findability && clearly_best {
        sentences.push(pick(rng, UNIQUELY_DEMANDING).replace("{}", &optimal.san));
    }

    // Trap detection over mass summed across all levels
    let mut mass: BTreeMap<&str, f64> = BTreeMap::new();
    for level_eval in probabilities.values() {
        for (mv, &p) in &level_eval.policy {
            *mass.entry(mv.as_str()).or_default() += p;
        }
    }
    let total_mass: f64 = mass.values().sum();
    let optimal_rate = win_rate(optimal.cp);
    let loss_of = |c: &Candidate| optimal_rate - win_rate(c.cp);

    let mut trap = None;
    let popular_mistake = candidates
        .iter()
        .filter(|c| !is_good(&c.uci))
        .filter_map(|c| Some((c, *mass.get(c.uci.as_str())?)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    if let Some((mistake, _)) = popular_mistake.filter(|(c, _)| loss_of(*c) > TRAP_LOSS_GAP) {
        let losing_mass: f64 = candidates
            .iter()
            .filter(|c| !is_good(&c.uci) && loss_of(*c) > TRAP_LOSS_GAP)
            .filter_map(|c| mass.get(c.uci.as_str()))
            .sum();
        if total_mass > 0.0 && losing_mass / total_mass > TREACHEROUS_MASS {
            sentences.push(pick(rng, TREACHEROUS).to_string());
            trap = Some(Trap::Treacherous);
        } else {
            sentences.push(pick(rng, TRAP_WARNING).replace("{}", &mistake.san));
            trap = Some(Trap::Blunder { mv: mistake.uci.clone() });
        }
    }

    let mut temptation = None;
    if trap.is_none() && findability != Findability::Straightforward {
        let tempting = near_misses
            .iter()
            .filter(|(mv, _)| mv.as_str() != optimal.uci)
            .max_by_key(|(_, count)| **count)
            .map(|(mv, _)| mv.clone());
        if let Some(mv) = tempting {
            if let Some(san) = san_of.get(mv.as_str()) {
                sentences.push(pick(rng, TEMPTATION).replace("{}", san));
                temptation = Some(mv);
            }
        }
    }

    PositionDescription {
        text: sentences.join(" "),
        good_moves: good.iter().map(|c| c.uci.clone()).collect(),
        optimal_move: Some(optimal.uci.clone()),
        findability: Some(findability),
        optimal_findability: Some(optimal_findability),
        trap,
        temptation,
        arrows: good
            .iter()
            .map(|c| Arrow {
                from: c.from.clone(),
                to: c.to.clone(),
                optimal: c.uci == optimal.uci,
            })
            .collect(),
    }
}

/// Describe with the thread-local generator.
pub fn describe_position_random(
    fen: &str,
    search: &SearchEvaluation,
    probabilities: &MoveProbabilities,
    levels: &SkillLevels,
) -> PositionDescription {
    describe_position(fen, search, probabilities, levels, &mut rand::thread_rng())
}

/// "Only one move (Nf3) leads to a clear advantage."
fn summary_sentence<R: Rng + ?Sized>(good: &[&Candidate], rng: &mut R) -> String {
    let (subject, verb) = match good.len() {
        1 => ("Only one move", pick(rng, VERB_SINGULAR)),
        2 => ("Two moves", pick(rng, VERB_PLURAL)),
        _ => (pick(rng, SEVERAL_MOVES), pick(rng, VERB_PLURAL)),
    };
    let listed: Vec<&str> = good.iter().take(MAX_LISTED_MOVES).map(|c| c.san.as_str()).collect();
    let mean_cp = good.iter().map(|c| c.cp as f64).sum::<f64>() / good.len().max(1) as f64;
    format!("{subject} ({}) {verb} {}.", listed.join(", "), outcome_phrase(mean_cp))
}

fn outcome_phrase(mean_cp: f64) -> &'static str {
    OUTCOMES
        .iter()
        .find(|(threshold, _)| mean_cp >= *threshold as f64)
        .map_or(LOST_OUTCOME, |&(_, phrase)| phrase)
}

/// Policy moves by descending probability, ties by move.
fn ranked_moves(policy: &BTreeMap<String, f64>) -> Vec<(&str, f64)> {
    let mut moves: Vec<(&str, f64)> = policy.iter().map(|(m, &p)| (m.as_str(), p)).collect();
    moves.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0)));
    moves
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, bank: &[&'a str]) -> &'a str {
    bank.choose(rng).copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::LevelEvaluation;
    use chess_core::STANDARD_START_FEN;
    use rand::rngs::mock::StepRng;

    fn search(cp: &[(&str, i32)]) -> SearchEvaluation {
        let cp = cp.iter().map(|(m, c)| (m.to_string(), *c)).collect();
        SearchEvaluation::new(20, "e2e4", cp, true)
    }

    /// Same policy at every level
    fn uniform(policy: &[(&str, f64)]) -> MoveProbabilities {
        SkillLevels::default()
            .levels()
            .iter()
            .map(|level| {
                let policy = policy.iter().map(|(m, p)| (m.to_string(), *p)).collect();
                (level.clone(), LevelEvaluation { value: 0.5, policy })
            })
            .collect()
    }

    fn describe(search: &SearchEvaluation, probabilities: &MoveProbabilities) -> PositionDescription {
        describe_position(
            STANDARD_START_FEN,
            search,
            probabilities,
            &SkillLevels::default(),
            &mut StepRng::new(0, 0),
        )
    }

    #[test]
    fn test_single_good_move_with_trap() {
        let search = search(&[("e2e4", 300), ("d2d4", 0), ("g2g4", -100)]);
        let desc = describe(&search, &uniform(&[("e2e4", 0.7), ("d2d4", 0.3)]));

        assert_eq!(desc.good_moves, ["e2e4"]);
        assert_eq!(desc.findability, Some(Findability::Straightforward));
        assert_eq!(desc.trap, Some(Trap::Blunder { mv: "d2d4".into() }));
        assert_eq!(
            desc.text,
            "Only one move (e4) leads to a clear advantage. \
             Most players will find a good continuation. \
             Beware of d4, a tempting mistake."
        );
        assert_eq!(desc.arrows, [Arrow { from: "e2".into(), to: "e4".into(), optimal: true }]);
    }

    #[test]
    fn test_treacherous_position() {
        let search = search(&[("e2e4", 300), ("d2d4", 0), ("g2g4", -100)]);
        let desc = describe(&search, &uniform(&[("e2e4", 0.4), ("d2d4", 0.5), ("g2g4", 0.1)]));

        assert_eq!(desc.findability, Some(Findability::Hard));
        assert_eq!(desc.trap, Some(Trap::Treacherous));
        assert!(desc.text.contains("highly treacherous"));
        assert!(desc.text.contains("Most players will struggle"));
    }

    #[test]
    fn test_several_equal_moves() {
        let search = search(&[("e2e4", 40), ("d2d4", 35), ("g1f3", 30), ("g2g4", -150)]);
        let desc = describe(&search, &uniform(&[("e2e4", 0.5), ("d2d4", 0.3), ("g1f3", 0.2)]));

        assert_eq!(desc.good_moves, ["e2e4", "d2d4", "g1f3"]);
        assert!(desc.text.starts_with("Several moves (e4, d4, Nf3) lead to a roughly equal game."));
        assert_eq!(desc.trap, None);
    }

    #[test]
    fn test_temptation_mentioned_when_not_straightforward() {
        // f2f3 is nearly as popular as e2e4, slightly worse but not a trap
        let search = search(&[("e2e4", 100), ("d2d4", 90), ("f2f3", 0)]);
        let mut probabilities = uniform(&[("e2e4", 0.45), ("f2f3", 0.40), ("d2d4", 0.15)]);
        for level in ["maia_kdd_1100", "maia_kdd_1200", "maia_kdd_1300", "maia_kdd_1400"] {
            probabilities.get_mut(level).unwrap().policy =
                [("f2f3".to_string(), 0.6), ("e2e4".to_string(), 0.4)].into_iter().collect();
        }
        let desc = describe(&search, &probabilities);

        // Five of nine levels pick a good move
        assert_eq!(desc.good_moves, ["e2e4", "d2d4"]);
        assert_eq!(desc.findability, Some(Findability::Skilled));
        assert_eq!(desc.trap, None);
        assert_eq!(desc.temptation.as_deref(), Some("f2f3"));
        assert!(desc.text.ends_with("Many players are tempted by f3 instead."));
    }

    #[test]
    fn test_optimal_move_harder_to_find_than_good_moves() {
        let search = search(&[("e2e4", 150), ("d2d4", 90), ("g2g4", -300)]);
        let mut probabilities = uniform(&[("d2d4", 0.6), ("e2e4", 0.3), ("g2g4", 0.1)]);
        probabilities.get_mut("maia_kdd_1900").unwrap().policy =
            [("e2e4".to_string(), 0.7), ("d2d4".to_string(), 0.3)].into_iter().collect();
        let desc = describe(&search, &probabilities);

        assert_eq!(desc.good_moves, ["e2e4", "d2d4"]);
        assert_eq!(desc.findability, Some(Findability::Straightforward));
        assert_eq!(desc.optimal_findability, Some(Findability::Hard));
        assert!(desc.text.contains("Only the strongest players find the best move, e4."));
    }

    #[test]
    fn test_close_optimal_move_not_singled_out() {
        let search = search(&[("e2e4", 100), ("d2d4", 95), ("g2g4", -300)]);
        let mut probabilities = uniform(&[("d2d4", 0.6), ("e2e4", 0.3), ("g2g4", 0.1)]);
        probabilities.get_mut("maia_kdd_1900").unwrap().policy =
            [("e2e4".to_string(), 0.7), ("d2d4".to_string(), 0.3)].into_iter().collect();
        let desc = describe(&search, &probabilities);

        assert_eq!(desc.optimal_findability, Some(Findability::Hard));
        assert!(!desc.text.contains("best move, e4"));
    }

    #[test]
    fn test_no_temptation_when_straightforward() {
        let search = search(&[("e2e4", 100), ("d2d4", 90), ("f2f3", 0)]);
        let desc = describe(&search, &uniform(&[("e2e4", 0.45), ("f2f3", 0.40), ("d2d4", 0.15)]));
        assert_eq!(desc.findability, Some(Findability::Straightforward));
        assert_eq!(desc.temptation, None);
    }

    #[test]
    fn test_no_legal_moves() {
        // Fool's mate
        let fen = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";
        let desc = describe_position(
            fen,
            &search(&[("e2e4", 0)]),
            &MoveProbabilities::new(),
            &SkillLevels::default(),
            &mut StepRng::new(0, 0),
        );
        assert_eq!(desc.text, NO_LEGAL_MOVES);
        assert!(desc.good_moves.is_empty());
    }

    #[test]
    fn test_stale_moves_are_ignored() {
        // e7e5 is not legal for White
        let search = search(&[("e2e4", 20), ("e7e5", 900)]);
        let desc = describe(&search, &uniform(&[("e2e4", 1.0)]));
        assert_eq!(desc.optimal_move.as_deref(), Some("e2e4"));
    }

    #[test]
    fn test_outcome_breakpoints() {
        assert_eq!(outcome_phrase(650.0), "a crushing advantage");
        assert_eq!(outcome_phrase(0.0), "a roughly equal game");
        assert_eq!(outcome_phrase(-300.0), "a difficult defense");
        assert_eq!(outcome_phrase(-800.0), LOST_OUTCOME);
    }

    #[test]
    fn test_findability_tiers() {
        assert_eq!(Findability::from_count(2), Findability::Hard);
        assert_eq!(Findability::from_count(6), Findability::Skilled);
        assert_eq!(Findability::from_count(7), Findability::Straightforward);
    }
}
