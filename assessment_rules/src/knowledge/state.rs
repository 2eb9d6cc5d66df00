//! Knowledge state - the central mutable memory for one conversation.
//!
//! State is mutated through three controlled paths only: the per-turn
//! [`KnowledgeState::decay`] step, signal bookkeeping, and pattern mutations
//! checked against each pattern's declared write set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{DimensionKey, KnowledgeSchema, KnowledgeValue, PatternHistory};

/// Per-turn decay factors for emotional signals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalDecay {
    /// Multiplicative factor applied to `conversation.frustration` each turn.
    pub frustration: f64,
    /// Multiplicative factor applied to `conversation.confusion` each turn.
    pub confusion: f64,
}

impl Default for SignalDecay {
    fn default() -> Self {
        Self {
            frustration: 0.6,
            confusion: 0.6,
        }
    }
}

// Levels this close to zero snap to exactly zero during decay.
const LEVEL_EPSILON: f64 = 0.01;

/// A mutation resolved down to a concrete dimension write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatMutation {
    pub dimension: DimensionKey,
    pub action: MutationAction,
}

/// What a mutation does to its dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MutationAction {
    /// Overwrite with a value of the dimension's kind.
    Set(KnowledgeValue),
    /// Add to an integer dimension.
    Increment(i64),
}

/// Why a mutation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// The dimension is not in the pattern's declared write set.
    Undeclared,
    /// The dimension is not part of the schema this state was built from.
    UnknownDimension,
    /// The written value's kind does not match the dimension's kind.
    KindMismatch,
}

/// A rejected mutation, kept for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedMutation {
    pub dimension: DimensionKey,
    pub reason: RejectionReason,
}

/// Outcome of applying one pattern's mutations.
#[derive(Debug, Clone, Default)]
pub struct MutationReport {
    pub applied: Vec<DimensionKey>,
    pub rejected: Vec<RejectedMutation>,
}

impl MutationReport {
    /// Whether any applied write captured a `system.` fact, which counts as
    /// conversation progress.
    pub fn made_progress(&self) -> bool {
        self.applied.iter().any(|k| k.is_system_fact())
    }
}

/// Gaps found while deserializing a persisted snapshot against the current
/// schema. Never fatal: gaps are default-filled and reported for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaGaps {
    /// Dimensions absent from the snapshot, filled with schema defaults.
    pub missing: Vec<String>,
    /// Entries present but unparseable, replaced with schema defaults.
    pub malformed: Vec<String>,
}

impl SchemaGaps {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.malformed.is_empty()
    }
}

/// The complete knowledge memory for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeState {
    values: BTreeMap<DimensionKey, KnowledgeValue>,
    history: PatternHistory,
}

impl KnowledgeState {
    /// Create a fresh state with every schema dimension at its default.
    pub fn new(schema: &KnowledgeSchema) -> Self {
        Self {
            values: schema
                .iter()
                .map(|def| (def.key.clone(), def.default.clone()))
                .collect(),
            history: PatternHistory::new(),
        }
    }

    /// A defensive snapshot. Callers never receive a live reference.
    pub fn snapshot(&self) -> KnowledgeState {
        self.clone()
    }

    /// Read a dimension.
    pub fn get(&self, key: &DimensionKey) -> Option<&KnowledgeValue> {
        self.values.get(key)
    }

    /// Read a boolean dimension, defaulting to false.
    pub fn flag(&self, key: &str) -> bool {
        self.values
            .get(&DimensionKey::new(key))
            .and_then(KnowledgeValue::as_bool)
            .unwrap_or(false)
    }

    /// Read an integer dimension, defaulting to 0.
    pub fn count(&self, key: &str) -> i64 {
        self.values
            .get(&DimensionKey::new(key))
            .and_then(KnowledgeValue::as_int)
            .unwrap_or(0)
    }

    /// Read a float dimension, defaulting to 0.0.
    pub fn level(&self, key: &str) -> f64 {
        self.values
            .get(&DimensionKey::new(key))
            .and_then(KnowledgeValue::as_float)
            .unwrap_or(0.0)
    }

    /// Read a text dimension, defaulting to "".
    pub fn text(&self, key: &str) -> &str {
        self.values
            .get(&DimensionKey::new(key))
            .and_then(KnowledgeValue::as_text)
            .unwrap_or("")
    }

    /// Current frustration level in [0, 1].
    pub fn frustration(&self) -> f64 {
        self.level("conversation.frustration")
    }

    /// Current confusion level in [0, 1].
    pub fn confusion(&self) -> f64 {
        self.level("conversation.confusion")
    }

    /// The current turn number (1-based once the first turn begins).
    pub fn turn(&self) -> u32 {
        self.count("conversation.turn").max(0) as u32
    }

    /// Turns elapsed since a fact was last captured.
    pub fn turns_since_progress(&self) -> u32 {
        self.count("conversation.turns_since_progress").max(0) as u32
    }

    /// The pattern usage log.
    pub fn history(&self) -> &PatternHistory {
        &self.history
    }

    /// Record a pattern firing at the current turn.
    pub fn record_pattern(&mut self, pattern_id: impl Into<String>, category: impl Into<String>) {
        let turn = self.turn();
        self.history.record(pattern_id, category, turn);
    }

    /// Per-turn decay, run before trigger detection: emotional signals decay
    /// multiplicatively toward zero (snapping below an epsilon), the turn
    /// counter advances, and `turns_since_progress` increments.
    pub fn decay(&mut self, decay: &SignalDecay) {
        self.decay_level("conversation.frustration", decay.frustration);
        self.decay_level("conversation.confusion", decay.confusion);
        self.bump("conversation.turn");
        self.bump("conversation.turns_since_progress");
    }

    /// Raise an emotional signal toward 1.0 by the given amount.
    pub fn raise_level(&mut self, key: &str, amount: f64) {
        let current = self.level(key);
        self.values.insert(
            DimensionKey::new(key),
            KnowledgeValue::Float((current + amount).clamp(0.0, 1.0)),
        );
    }

    /// Increment an integer dimension by one.
    pub fn bump(&mut self, key: &str) {
        let current = self.count(key);
        self.values
            .insert(DimensionKey::new(key), KnowledgeValue::Int(current + 1));
    }

    /// Reset the progress counter; called when a fact capture lands.
    pub fn mark_progress(&mut self) {
        self.values.insert(
            DimensionKey::new("conversation.turns_since_progress"),
            KnowledgeValue::Int(0),
        );
    }

    fn decay_level(&mut self, key: &str, factor: f64) {
        let mut next = self.level(key) * factor;
        if next < LEVEL_EPSILON {
            next = 0.0;
        }
        self.values
            .insert(DimensionKey::new(key), KnowledgeValue::Float(next));
    }

    /// Apply one pattern's mutations. Only dimensions in `declared` may be
    /// written; everything else is rejected and reported, never applied.
    pub fn apply_mutations(
        &mut self,
        declared: &[DimensionKey],
        mutations: &[FlatMutation],
    ) -> MutationReport {
        let mut report = MutationReport::default();

        for mutation in mutations {
            if !declared.contains(&mutation.dimension) {
                report.rejected.push(RejectedMutation {
                    dimension: mutation.dimension.clone(),
                    reason: RejectionReason::Undeclared,
                });
                continue;
            }

            let Some(current) = self.values.get(&mutation.dimension) else {
                report.rejected.push(RejectedMutation {
                    dimension: mutation.dimension.clone(),
                    reason: RejectionReason::UnknownDimension,
                });
                continue;
            };

            let next = match &mutation.action {
                MutationAction::Set(value) if value.kind() == current.kind() => value.clone(),
                MutationAction::Increment(by) => match current.as_int() {
                    Some(i) => KnowledgeValue::Int(i + by),
                    None => {
                        report.rejected.push(RejectedMutation {
                            dimension: mutation.dimension.clone(),
                            reason: RejectionReason::KindMismatch,
                        });
                        continue;
                    }
                },
                MutationAction::Set(_) => {
                    report.rejected.push(RejectedMutation {
                        dimension: mutation.dimension.clone(),
                        reason: RejectionReason::KindMismatch,
                    });
                    continue;
                }
            };

            self.values.insert(mutation.dimension.clone(), next);
            report.applied.push(mutation.dimension.clone());
        }

        report
    }

    /// Serialize to the flat key-value form the persistence collaborator
    /// consumes. History entries are keyed `history.NNNN` in firing order.
    pub fn to_flat(&self) -> BTreeMap<String, String> {
        let mut flat: BTreeMap<String, String> = self
            .values
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        for (index, entry) in self.history.iter().enumerate() {
            flat.insert(
                format!("history.{:04}", index),
                format!("{}|{}|{}", entry.pattern_id, entry.category, entry.turn),
            );
        }

        flat
    }

    /// Deserialize from the flat form. Dimensions absent from the snapshot
    /// (or unparseable) are filled from schema defaults and reported as
    /// gaps; this is deliberately lossy-tolerant so older snapshots load
    /// against a newer schema.
    pub fn from_flat(schema: &KnowledgeSchema, flat: &BTreeMap<String, String>) -> (Self, SchemaGaps) {
        let mut gaps = SchemaGaps::default();
        let mut values = BTreeMap::new();

        for def in schema.iter() {
            let value = match flat.get(def.key.as_str()) {
                Some(raw) => match KnowledgeValue::parse(def.kind, raw) {
                    Some(value) => value,
                    None => {
                        gaps.malformed.push(def.key.to_string());
                        def.default.clone()
                    }
                },
                None => {
                    gaps.missing.push(def.key.to_string());
                    def.default.clone()
                }
            };
            values.insert(def.key.clone(), value);
        }

        let mut history = PatternHistory::new();
        for (key, raw) in flat.range("history.".to_string()..) {
            if !key.starts_with("history.") {
                break;
            }
            match Self::parse_history_entry(raw) {
                Some((pattern_id, category, turn)) => history.record(pattern_id, category, turn),
                None => gaps.malformed.push(key.clone()),
            }
        }

        (Self { values, history }, gaps)
    }

    fn parse_history_entry(raw: &str) -> Option<(String, String, u32)> {
        let mut parts = raw.splitn(3, '|');
        let pattern_id = parts.next()?.to_string();
        let category = parts.next()?.to_string();
        let turn = parts.next()?.parse().ok()?;
        Some((pattern_id, category, turn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_state() -> KnowledgeState {
        KnowledgeState::new(&KnowledgeSchema::standard())
    }

    #[test]
    fn test_fresh_state_uses_defaults() {
        let state = kinds_state();
        assert_eq!(state.turn(), 0);
        assert_eq!(state.frustration(), 0.0);
        assert_eq!(state.text("user.terminology_level"), "novice");
        assert!(!state.flag("user.purpose_understood"));
    }

    #[test]
    fn test_decay_advances_turn_and_fades_signals() {
        let mut state = kinds_state();
        state.raise_level("conversation.frustration", 0.8);

        let decay = SignalDecay::default();
        state.decay(&decay);

        assert_eq!(state.turn(), 1);
        assert_eq!(state.turns_since_progress(), 1);
        assert!((state.frustration() - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_decay_snaps_small_levels_to_zero() {
        let mut state = kinds_state();
        state.raise_level("conversation.confusion", 0.015);

        state.decay(&SignalDecay::default());

        assert_eq!(state.confusion(), 0.0);
    }

    #[test]
    fn test_undeclared_mutation_rejected() {
        let mut state = kinds_state();
        let declared = vec![DimensionKey::new("system.industry")];

        let report = state.apply_mutations(
            &declared,
            &[
                FlatMutation {
                    dimension: DimensionKey::new("system.industry"),
                    action: MutationAction::Set(KnowledgeValue::Text("retail".into())),
                },
                FlatMutation {
                    dimension: DimensionKey::new("system.budget_range"),
                    action: MutationAction::Set(KnowledgeValue::Text("20k".into())),
                },
            ],
        );

        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].reason, RejectionReason::Undeclared);
        assert_eq!(state.text("system.industry"), "retail");
        assert_eq!(state.text("system.budget_range"), "");
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut state = kinds_state();
        let declared = vec![DimensionKey::new("system.team_size")];

        let report = state.apply_mutations(
            &declared,
            &[FlatMutation {
                dimension: DimensionKey::new("system.team_size"),
                action: MutationAction::Set(KnowledgeValue::Text("five".into())),
            }],
        );

        assert!(report.applied.is_empty());
        assert_eq!(report.rejected[0].reason, RejectionReason::KindMismatch);
    }

    #[test]
    fn test_system_write_counts_as_progress() {
        let mut state = kinds_state();
        let declared = vec![DimensionKey::new("system.primary_goal")];

        let report = state.apply_mutations(
            &declared,
            &[FlatMutation {
                dimension: DimensionKey::new("system.primary_goal"),
                action: MutationAction::Set(KnowledgeValue::Text("grow online sales".into())),
            }],
        );

        assert!(report.made_progress());
    }

    #[test]
    fn test_flat_round_trip() {
        let schema = KnowledgeSchema::standard();
        let mut state = KnowledgeState::new(&schema);
        state.decay(&SignalDecay::default());
        state.raise_level("conversation.frustration", 0.4);
        state.apply_mutations(
            &[DimensionKey::new("system.industry")],
            &[FlatMutation {
                dimension: DimensionKey::new("system.industry"),
                action: MutationAction::Set(KnowledgeValue::Text("logistics".into())),
            }],
        );
        state.record_pattern("capture_industry", "discovery");
        state.record_pattern("explain_process", "education");

        let flat = state.to_flat();
        let (restored, gaps) = KnowledgeState::from_flat(&schema, &flat);

        assert!(gaps.is_empty());
        assert_eq!(restored, state);
    }

    #[test]
    fn test_from_flat_default_fills_missing_dimensions() {
        let schema = KnowledgeSchema::standard();
        let state = KnowledgeState::new(&schema);

        let mut flat = state.to_flat();
        flat.remove("system.budget_range");
        flat.remove("quality.fallback_count");

        let (restored, gaps) = KnowledgeState::from_flat(&schema, &flat);

        assert_eq!(gaps.missing.len(), 2);
        assert_eq!(restored.text("system.budget_range"), "");
        assert_eq!(restored.count("quality.fallback_count"), 0);
    }

    #[test]
    fn test_from_flat_reports_malformed_values() {
        let schema = KnowledgeSchema::standard();
        let mut flat = KnowledgeState::new(&schema).to_flat();
        flat.insert("conversation.turn".into(), "not-a-number".into());

        let (restored, gaps) = KnowledgeState::from_flat(&schema, &flat);

        assert_eq!(gaps.malformed, vec!["conversation.turn".to_string()]);
        assert_eq!(restored.turn(), 0);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut state = kinds_state();
        let snapshot = state.snapshot();

        state.raise_level("conversation.frustration", 0.9);

        assert_eq!(snapshot.frustration(), 0.0);
        assert!((state.frustration() - 0.9).abs() < 1e-9);
    }
}
