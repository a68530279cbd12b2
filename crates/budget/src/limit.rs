//! Budget arithmetic.
//!
//! Derives the budget available for a response from the model's context
//! window, the tokens already consumed, and a safety margin.

/// Headroom kept free when deriving an available budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SafetyMargin {
    /// Fixed token amount.
    Absolute(u64),
    /// Percentage of the total limit (0..100), clamped to an absolute
    /// min/max buffer.
    Percent { percent: f64, min: u64, max: u64 },
}

impl SafetyMargin {
    /// Margin in tokens for the given total limit.
    pub fn tokens(&self, total_limit: u64) -> u64 {
        match *self {
            SafetyMargin::Absolute(tokens) => tokens,
            SafetyMargin::Percent { percent, min, max } => {
                let raw = (total_limit as f64 * percent / 100.0).round() as u64;
                raw.clamp(min, max)
            }
        }
    }
}

impl Default for SafetyMargin {
    fn default() -> Self {
        SafetyMargin::Absolute(10_000)
    }
}

/// Available budget: total limit minus consumed tokens minus the safety
/// margin, saturating at zero.
pub fn calculate_token_budget(total_limit: u64, used_tokens: u64, margin: SafetyMargin) -> u64 {
    total_limit
        .saturating_sub(used_tokens)
        .saturating_sub(margin.tokens(total_limit))
}
