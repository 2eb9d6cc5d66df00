//! Dimension-comparison predicates.
//!
//! Pattern prerequisites (`requires`/`blocks`), proactive-trigger
//! opportunity conditions, and cooldown overrides are all expressed as
//! conjunctions of these simple comparisons.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::knowledge::{DimensionKey, KnowledgeState, KnowledgeValue};

/// Comparison operators over a single dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// The dimension holds a non-default value (non-empty text, non-zero
    /// number, or true).
    IsSet,
    /// The dimension is still at its unset default.
    NotSet,
}

/// A single dimension comparison, evaluated against a [`KnowledgeState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub dimension: DimensionKey,
    pub comparison: Comparison,
    /// Comparand; absent for `IsSet`/`NotSet`.
    pub value: Option<KnowledgeValue>,
}

impl Predicate {
    pub fn eq(dimension: impl Into<DimensionKey>, value: KnowledgeValue) -> Self {
        Self::compare(dimension, Comparison::Eq, value)
    }

    pub fn ne(dimension: impl Into<DimensionKey>, value: KnowledgeValue) -> Self {
        Self::compare(dimension, Comparison::Ne, value)
    }

    pub fn at_least(dimension: impl Into<DimensionKey>, value: KnowledgeValue) -> Self {
        Self::compare(dimension, Comparison::Ge, value)
    }

    pub fn less_than(dimension: impl Into<DimensionKey>, value: KnowledgeValue) -> Self {
        Self::compare(dimension, Comparison::Lt, value)
    }

    pub fn is_set(dimension: impl Into<DimensionKey>) -> Self {
        Self {
            dimension: dimension.into(),
            comparison: Comparison::IsSet,
            value: None,
        }
    }

    pub fn not_set(dimension: impl Into<DimensionKey>) -> Self {
        Self {
            dimension: dimension.into(),
            comparison: Comparison::NotSet,
            value: None,
        }
    }

    fn compare(dimension: impl Into<DimensionKey>, comparison: Comparison, value: KnowledgeValue) -> Self {
        Self {
            dimension: dimension.into(),
            comparison,
            value: Some(value),
        }
    }

    /// Evaluate against the given state. A predicate over an unknown
    /// dimension or with mismatched kinds evaluates to false; catalog
    /// validation rules both out up front.
    pub fn holds(&self, state: &KnowledgeState) -> bool {
        let Some(current) = state.get(&self.dimension) else {
            return false;
        };

        match self.comparison {
            Comparison::IsSet => current.is_set(),
            Comparison::NotSet => !current.is_set(),
            _ => {
                let Some(expected) = &self.value else {
                    return false;
                };
                let Some(ordering) = current.compare(expected) else {
                    return false;
                };
                match self.comparison {
                    Comparison::Eq => ordering == Ordering::Equal,
                    Comparison::Ne => ordering != Ordering::Equal,
                    Comparison::Lt => ordering == Ordering::Less,
                    Comparison::Le => ordering != Ordering::Greater,
                    Comparison::Gt => ordering == Ordering::Greater,
                    Comparison::Ge => ordering != Ordering::Less,
                    Comparison::IsSet | Comparison::NotSet => unreachable!(),
                }
            }
        }
    }
}

/// Whether every predicate in the conjunction holds.
pub fn all_hold(predicates: &[Predicate], state: &KnowledgeState) -> bool {
    predicates.iter().all(|p| p.holds(state))
}

/// Whether any predicate in the set holds.
pub fn any_holds(predicates: &[Predicate], state: &KnowledgeState) -> bool {
    predicates.iter().any(|p| p.holds(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeSchema;

    fn state_with_components(n: i64) -> KnowledgeState {
        let mut state = KnowledgeState::new(&KnowledgeSchema::standard());
        state.apply_mutations(
            &[DimensionKey::new("system.assessed_components")],
            &[crate::knowledge::FlatMutation {
                dimension: DimensionKey::new("system.assessed_components"),
                action: crate::knowledge::MutationAction::Set(KnowledgeValue::Int(n)),
            }],
        );
        state
    }

    #[test]
    fn test_numeric_comparisons() {
        let state = state_with_components(3);

        assert!(Predicate::at_least("system.assessed_components", KnowledgeValue::Int(1)).holds(&state));
        assert!(Predicate::at_least("system.assessed_components", KnowledgeValue::Int(3)).holds(&state));
        assert!(!Predicate::at_least("system.assessed_components", KnowledgeValue::Int(4)).holds(&state));
        assert!(Predicate::less_than("system.assessed_components", KnowledgeValue::Int(5)).holds(&state));
    }

    #[test]
    fn test_is_set_and_not_set() {
        let state = KnowledgeState::new(&KnowledgeSchema::standard());

        assert!(Predicate::not_set("system.budget_range").holds(&state));
        assert!(!Predicate::is_set("system.budget_range").holds(&state));

        let mut captured = state.clone();
        captured.apply_mutations(
            &[DimensionKey::new("system.budget_range")],
            &[crate::knowledge::FlatMutation {
                dimension: DimensionKey::new("system.budget_range"),
                action: crate::knowledge::MutationAction::Set(KnowledgeValue::Text("10k-20k".into())),
            }],
        );
        assert!(Predicate::is_set("system.budget_range").holds(&captured));
    }

    #[test]
    fn test_unknown_dimension_is_false() {
        let state = KnowledgeState::new(&KnowledgeSchema::standard());
        assert!(!Predicate::is_set("system.never_declared").holds(&state));
    }

    #[test]
    fn test_conjunction() {
        let state = state_with_components(2);
        let predicates = vec![
            Predicate::at_least("system.assessed_components", KnowledgeValue::Int(1)),
            Predicate::not_set("system.budget_range"),
        ];

        assert!(all_hold(&predicates, &state));
        assert!(any_holds(&predicates, &state));
    }

    #[test]
    fn test_float_threshold_against_frustration() {
        let mut state = KnowledgeState::new(&KnowledgeSchema::standard());
        state.raise_level("conversation.frustration", 0.7);

        let rising = Predicate::at_least("conversation.frustration", KnowledgeValue::Float(0.6));
        assert!(rising.holds(&state));
    }
}
