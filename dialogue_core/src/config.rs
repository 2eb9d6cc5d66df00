//! Engine configuration.
//!
//! Every engine tunable lives here with a documented default: decay
//! factors, the reinforcement boost, the affinity floor, and the context
//! budget ceilings. Cooldown windows are per-pattern in the catalog.
//! Configurations deserialize from TOML; omitted fields keep their
//! defaults.

use serde::{Deserialize, Serialize};

use assessment_rules::SignalDecay;

use crate::composition::CompositionConfig;
use crate::context::BudgetConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Composition update tuning (reinforcement boost 0.6; per-mode decay
    /// 0.70-0.95).
    pub composition: CompositionConfig,

    /// Per-turn emotional signal decay (frustration 0.6, confusion 0.6).
    pub signal_decay: SignalDecay,

    /// Minimum composition weight required on a pattern's dominant
    /// affinity mode. Default 0.3; critical candidates bypass it.
    pub min_dominant_weight: f32,

    /// Context size ceilings (warn 1800 tokens, reject 2400, per-field
    /// limit 240 characters, 3 turns of history).
    pub budget: BudgetConfig,

    /// Turn records retained per session; assembly takes the budget's
    /// history window from the tail. Default 6.
    pub retained_turns: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            composition: CompositionConfig::default(),
            signal_decay: SignalDecay::default(),
            min_dominant_weight: 0.3,
            budget: BudgetConfig::default(),
            retained_turns: 6,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from TOML; omitted fields keep defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.min_dominant_weight, 0.3);
        assert_eq!(config.budget.warn_tokens, 1800);
        assert_eq!(config.budget.reject_tokens, 2400);
        assert_eq!(config.budget.history_turns, 3);
        assert_eq!(config.retained_turns, 6);
        assert_eq!(config.composition.reinforcement_boost, 0.6);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
min_dominant_weight = 0.25

[budget]
warn_tokens = 1000
reject_tokens = 1500
field_limit = 120
history_turns = 2
"#,
        )
        .unwrap();

        assert_eq!(config.min_dominant_weight, 0.25);
        assert_eq!(config.budget.warn_tokens, 1000);
        // Untouched sections keep their defaults.
        assert_eq!(config.retained_turns, 6);
        assert_eq!(config.signal_decay.frustration, 0.6);
    }
}
