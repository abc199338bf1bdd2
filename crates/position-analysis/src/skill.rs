//! The nine skill levels of the move-probability model.

use serde::{Deserialize, Serialize};

/// Model identifiers, weakest first.
pub const MAIA_LEVELS: [&str; 9] = [
    "maia_kdd_1100",
    "maia_kdd_1200",
    "maia_kdd_1300",
    "maia_kdd_1400",
    "maia_kdd_1500",
    "maia_kdd_1600",
    "maia_kdd_1700",
    "maia_kdd_1800",
    "maia_kdd_1900",
];

pub const DEFAULT_REFERENCE_LEVEL: &str = "maia_kdd_1500";

/// Ordered skill-level table plus the level used as the classification
/// reference. Passed explicitly into every component that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillLevels {
    levels: Vec<String>,
    reference: String,
}

impl SkillLevels {
    pub fn new(levels: Vec<String>, reference: impl Into<String>) -> Self {
        Self {
            levels,
            reference: reference.into(),
        }
    }

    pub fn with_reference(reference: impl Into<String>) -> Self {
        Self::new(MAIA_LEVELS.iter().map(|l| l.to_string()).collect(), reference)
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Rating number parsed from the identifier suffix, e.g. 1500.
    pub fn rating(level: &str) -> Option<u32> {
        level.rsplit('_').next()?.parse().ok()
    }
}

impl Default for SkillLevels {
    fn default() -> Self {
        Self::with_reference(DEFAULT_REFERENCE_LEVEL)
    }
}
