//! Move colors by win-rate loss.
//!
//! Green up to 5% loss, yellow/orange up to 10%, red beyond that darkening
//! until 30%.

use std::collections::BTreeMap;

use palette::{FromColor, Hsl, Srgb};
use serde::{Serialize, Serializer};

use crate::evaluation::SearchEvaluation;

const GOOD_LOSS: f64 = 0.05;
const BLUNDER_LOSS: f64 = 0.10;
const MAX_LOSS: f64 = 0.30;

/// Relative centipawns per unit of win-rate loss when no win rates exist
const CP_PER_LOSS: f64 = 1000.0;

const GREEN_HUE: f32 = 130.0;
pub const GREEN_MAX_LIGHTNESS: f32 = 0.50;
const GREEN_MIN_LIGHTNESS: f32 = 0.40;

const YELLOW_HUE: f32 = 40.0;
const YELLOW_MAX_LIGHTNESS: f32 = 0.55;
const YELLOW_MIN_LIGHTNESS: f32 = 0.45;

const RED_HUE: f32 = 0.0;
const RED_MAX_LIGHTNESS: f32 = 0.50;
pub const RED_MIN_LIGHTNESS: f32 = 0.25;

/// Off-white for moves without evaluation data
const NEUTRAL: (f32, f32, f32) = (45.0, 0.30, 0.94);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Band {
    Green,
    Yellow,
    Red,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveColor {
    pub band: Band,
    pub hsl: Hsl,
}

impl MoveColor {
    pub fn lightness(&self) -> f32 {
        self.hsl.lightness
    }

    /// `#rrggbb`
    pub fn hex(&self) -> String {
        let rgb: Srgb<u8> = Srgb::from_color(self.hsl).into_format();
        format!("#{:02x}{:02x}{:02x}", rgb.red, rgb.green, rgb.blue)
    }
}

impl Serialize for MoveColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

/// Color for a win-rate loss (sign ignored); `None` gives the neutral color.
pub fn loss_color(loss: Option<f64>) -> MoveColor {
    let Some(loss) = loss else {
        let (h, s, l) = NEUTRAL;
        return MoveColor { band: Band::Neutral, hsl: Hsl::new(h, s, l) };
    };
    let loss = loss.abs();

    if loss <= GOOD_LOSS {
        let t = ease_cubic(loss / GOOD_LOSS);
        MoveColor {
            band: Band::Green,
            hsl: Hsl::new(
                GREEN_HUE,
                lerp(0.65, 0.35, t),
                lerp(GREEN_MAX_LIGHTNESS, GREEN_MIN_LIGHTNESS, t),
            ),
        }
    } else if loss <= BLUNDER_LOSS {
        let t = ease_quadratic((loss - GOOD_LOSS) / (BLUNDER_LOSS - GOOD_LOSS));
        MoveColor {
            band: Band::Yellow,
            hsl: Hsl::new(
                YELLOW_HUE,
                lerp(0.70, 0.95, t),
                lerp(YELLOW_MAX_LIGHTNESS, YELLOW_MIN_LIGHTNESS, t),
            ),
        }
    } else {
        let t = ((loss - BLUNDER_LOSS) / (MAX_LOSS - BLUNDER_LOSS)).min(1.0);
        MoveColor {
            band: Band::Red,
            hsl: Hsl::new(RED_HUE, lerp(0.75, 0.90, t), lerp(RED_MAX_LIGHTNESS, RED_MIN_LIGHTNESS, t)),
        }
    }
}

/// Loss used for coloring `mv`: the win-rate loss, else the relative score
/// scaled so that 100 cp counts as a 0.10 loss.
pub fn move_loss(search: &SearchEvaluation, mv: &str) -> Option<f64> {
    search
        .win_rate_loss(mv)
        .or_else(|| search.relative_cp(mv).map(|cp| cp as f64 / CP_PER_LOSS))
}

/// Colors for every legal move; unevaluated moves get the neutral color.
pub fn move_colors(legal_moves: &[String], search: Option<&SearchEvaluation>) -> BTreeMap<String, MoveColor> {
    legal_moves
        .iter()
        .map(|mv| {
            let loss = search.and_then(|s| move_loss(s, mv));
            (mv.clone(), loss_color(loss))
        })
        .collect()
}

fn lerp(from: f32, to: f32, t: f64) -> f32 {
    from + (to - from) * t as f32
}

fn ease_cubic(t: f64) -> f64 {
    t.clamp(0.0, 1.0).powi(3)
}

fn ease_quadratic(t: f64) -> f64 {
    t.clamp(0.0, 1.0).powi(2)
}
