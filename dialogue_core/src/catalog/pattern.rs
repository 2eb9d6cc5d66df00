//! Pattern definitions - declarative response templates with a
//! knowledge-mutation contract.
//!
//! Patterns are tagged data records interpreted by one generic selector;
//! there is no behavior hierarchy.

use serde::{Deserialize, Serialize};

use assessment_rules::{DimensionKey, KnowledgeValue, Predicate};

use crate::composition::{AffinityVector, Mode};

use super::TriggerId;

/// Unique identifier for patterns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(String);

impl PatternId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PatternId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Response-shaping constraints handed to the generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseConstraints {
    /// Upper bound on response length, in sentences.
    pub max_sentences: Option<u8>,
    /// Requested tone, e.g. "calm", "encouraging".
    pub tone: Option<String>,
}

/// What a cooldown window applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// This pattern id may not re-fire inside the window.
    Pattern,
    /// No pattern of this category may re-fire inside the window.
    Category,
}

/// Minimum turn gap before a pattern (or its category) may re-fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cooldown {
    pub turns: u32,
    pub scope: CooldownScope,
    /// If every override predicate holds, the cooldown is ignored
    /// (e.g. frustration still high overrides an error-recovery cooldown).
    #[serde(default)]
    pub override_when: Vec<Predicate>,
}

impl Cooldown {
    pub fn pattern(turns: u32) -> Self {
        Self {
            turns,
            scope: CooldownScope::Pattern,
            override_when: Vec::new(),
        }
    }

    pub fn category(turns: u32) -> Self {
        Self {
            turns,
            scope: CooldownScope::Category,
            override_when: Vec::new(),
        }
    }

    pub fn with_override(mut self, predicate: Predicate) -> Self {
        self.override_when.push(predicate);
        self
    }
}

/// A declared knowledge mutation. Capture variants resolve their value from
/// the turn's extracted signal payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationOp {
    /// Overwrite a dimension with a fixed value.
    Set {
        dimension: DimensionKey,
        value: KnowledgeValue,
    },
    /// Add to an integer dimension.
    Increment { dimension: DimensionKey, by: i64 },
    /// Write the extracted payload value into a fixed dimension.
    CaptureInto { dimension: DimensionKey },
    /// Write every extracted fact into the dimension it names.
    CaptureFacts,
}

impl MutationOp {
    /// The fixed dimension this op writes, if it has one. `CaptureFacts`
    /// resolves dimensions at runtime and is checked against the declared
    /// write set when applied.
    pub fn dimension(&self) -> Option<&DimensionKey> {
        match self {
            MutationOp::Set { dimension, .. }
            | MutationOp::Increment { dimension, .. }
            | MutationOp::CaptureInto { dimension } => Some(dimension),
            MutationOp::CaptureFacts => None,
        }
    }
}

/// An immutable pattern definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDef {
    pub id: PatternId,
    pub category: Mode,
    /// What a response following this pattern should accomplish.
    pub goal: String,
    /// Template text handed to the generator.
    pub template: String,
    #[serde(default)]
    pub constraints: ResponseConstraints,
    pub affinity: AffinityVector,

    /// Triggers that make this pattern a candidate.
    #[serde(default)]
    pub triggered_by: Vec<TriggerId>,
    /// Disambiguation predicates for triggers mapping to several patterns;
    /// all must hold for this pattern to enter the candidate set.
    #[serde(default)]
    pub selection: Vec<Predicate>,

    /// Prerequisites that must all hold.
    #[serde(default)]
    pub requires: Vec<Predicate>,
    /// Blockers that must all be false.
    #[serde(default)]
    pub blocks: Vec<Predicate>,

    #[serde(default)]
    pub cooldown: Option<Cooldown>,

    /// The exact dimensions this pattern may write.
    #[serde(default)]
    pub writes: Vec<DimensionKey>,
    #[serde(default)]
    pub mutations: Vec<MutationOp>,
}

impl PatternDef {
    /// Create a pattern with no triggers, predicates, or mutations.
    pub fn new(
        id: impl Into<PatternId>,
        category: Mode,
        goal: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            goal: goal.into(),
            template: template.into(),
            constraints: ResponseConstraints::default(),
            affinity: AffinityVector::new(),
            triggered_by: Vec::new(),
            selection: Vec::new(),
            requires: Vec::new(),
            blocks: Vec::new(),
            cooldown: None,
            writes: Vec::new(),
            mutations: Vec::new(),
        }
    }

    pub fn with_affinity(mut self, affinity: AffinityVector) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn with_constraints(mut self, constraints: ResponseConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn triggered_by(mut self, trigger: impl Into<TriggerId>) -> Self {
        self.triggered_by.push(trigger.into());
        self
    }

    pub fn with_selection(mut self, predicate: Predicate) -> Self {
        self.selection.push(predicate);
        self
    }

    pub fn with_requires(mut self, predicate: Predicate) -> Self {
        self.requires.push(predicate);
        self
    }

    pub fn with_blocks(mut self, predicate: Predicate) -> Self {
        self.blocks.push(predicate);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Cooldown) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Declare a writable dimension.
    pub fn with_write(mut self, dimension: impl Into<DimensionKey>) -> Self {
        self.writes.push(dimension.into());
        self
    }

    pub fn with_mutation(mut self, mutation: MutationOp) -> Self {
        self.mutations.push(mutation);
        self
    }

    /// Whether the pattern is unconditionally eligible: no prerequisites,
    /// no blockers, no cooldown. Required of the fallback pattern.
    pub fn is_unconditional(&self) -> bool {
        self.requires.is_empty() && self.blocks.is_empty() && self.cooldown.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates() {
        let pattern = PatternDef::new(
            "probe_budget",
            Mode::Discovery,
            "Ask about the budget",
            "Ask one open question about budget expectations.",
        )
        .triggered_by("cost_opportunity")
        .with_requires(Predicate::not_set("system.budget_range"))
        .with_cooldown(Cooldown::pattern(3));

        assert_eq!(pattern.triggered_by.len(), 1);
        assert_eq!(pattern.requires.len(), 1);
        assert!(!pattern.is_unconditional());
    }

    #[test]
    fn test_unconditional_detection() {
        let pattern = PatternDef::new(
            "fallback",
            Mode::Discovery,
            "Keep things moving",
            "Ask an open question.",
        );
        assert!(pattern.is_unconditional());
    }

    #[test]
    fn test_mutation_fixed_dimension() {
        let set = MutationOp::Set {
            dimension: DimensionKey::new("user.purpose_understood"),
            value: KnowledgeValue::Bool(true),
        };
        assert!(set.dimension().is_some());
        assert!(MutationOp::CaptureFacts.dimension().is_none());
    }
}
