//! Centipawn to win-rate conversions.
//!
//! All functions take scores from the point of view of the player to move.

/// Logistic slope (Lichess winning-chances constant, per centipawn).
const WIN_RATE_SLOPE: f64 = 0.00368208;

/// Offset that separates the win and loss curves; the gap between them is
/// the draw probability.
const DRAW_MARGIN_CP: f64 = 200.0;

/// Centipawn value used for forced mates (minus 10 cp per move to mate).
pub const MATE_SCORE_CP: i32 = 10_000;

/// Expected score in [0, 1] for a centipawn evaluation.
pub fn win_rate(cp: i32) -> f64 {
    logistic(cp as f64)
}

/// Approximate win/draw/loss probabilities for a centipawn evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wdl {
    pub win: f64,
    pub draw: f64,
    pub loss: f64,
}

pub fn wdl(cp: i32) -> Wdl {
    let cp = cp as f64;
    let win = logistic(cp - DRAW_MARGIN_CP);
    let loss = logistic(-cp - DRAW_MARGIN_CP);
    Wdl {
        win,
        draw: (1.0 - win - loss).max(0.0),
        loss,
    }
}

/// Mate in `n` (negative: getting mated) as a centipawn score.
pub fn mate_to_cp(n: i32) -> i32 {
    if n > 0 {
        MATE_SCORE_CP - n * 10
    } else {
        -MATE_SCORE_CP - n * 10
    }
}

fn logistic(cp: f64) -> f64 {
    1.0 / (1.0 + (-WIN_RATE_SLOPE * cp).exp())
}
