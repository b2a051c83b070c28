/// Signal weights for the rule-based scorer.
/// Career-path overlap dominates; city and recency only break ties.
pub const FALLBACK_WEIGHTS: Weights = Weights {
    career: 0.5,
    city: 0.3,
    recency: 0.2,
};

/// Band every rule-based score is mapped into.
pub const FALLBACK_SCORE_FLOOR: f64 = 0.40;
pub const FALLBACK_SCORE_CEILING: f64 = 0.65;

/// Days over which the recency signal decays linearly to zero.
pub const RECENCY_HORIZON_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub career: f64,
    pub city: f64,
    pub recency: f64,
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.career + self.city + self.recency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one() {
        assert!((FALLBACK_WEIGHTS.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn band_is_ordered_and_below_quality_gate_ceiling() {
        assert!(FALLBACK_SCORE_FLOOR < FALLBACK_SCORE_CEILING);
        assert!(FALLBACK_SCORE_CEILING < 0.70);
    }
}
