/// Tunable weights for card ranking and earnings estimates.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Multiplier on a reward line that matches the merchant only by alias.
    pub fuzzy_weight: f64,

    /// Unrelated reward lines at or above `generic_min_rate` still add a
    /// little, so generally strong cards outrank weak ones.
    pub generic_weight: f64,
    pub generic_min_rate: f64,

    /// Added for cards the user already carries.
    pub held_card_bonus: f64,

    pub top_n: usize,

    /// Used when the merchant has no spend estimate.
    pub default_spend: f64,
    /// Cash-back rate assumed when no reward line matches.
    pub default_rate: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fuzzy_weight: 0.8,
            generic_weight: 0.1,
            generic_min_rate: 0.02,
            held_card_bonus: 5.0,
            top_n: 3,
            default_spend: 30.0,
            default_rate: 0.01,
        }
    }
}
