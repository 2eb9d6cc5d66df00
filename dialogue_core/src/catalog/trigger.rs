//! Trigger definitions - the conversational signals the detector looks for.

use serde::{Deserialize, Serialize};

use assessment_rules::Predicate;

use crate::composition::AffinityVector;

/// Unique identifier for triggers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(String);

impl TriggerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TriggerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Who originates a trigger and how deliberately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// The user explicitly asked for something.
    UserExplicit,
    /// Inferred from how the user is writing.
    UserImplicit,
    /// The system spots an opportunity in the state.
    SystemProactive,
    /// The system reacts to a state transition.
    SystemReactive,
}

/// Priority classes, ordered low to critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityClass {
    /// One tier up; critical stays critical.
    pub fn escalate(&self) -> PriorityClass {
        match self {
            PriorityClass::Low => PriorityClass::Medium,
            PriorityClass::Medium => PriorityClass::High,
            PriorityClass::High | PriorityClass::Critical => PriorityClass::Critical,
        }
    }
}

/// Implicit signal families the lexicon scan can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Frustration,
    Confusion,
    Pain,
    Satisfaction,
    /// A newly stated fact conflicts with a stored one.
    Contradiction,
    /// The user shared a capturable business fact.
    FactShared,
    /// Profanity with no emotion, no fact, and no domain content.
    ProfanityAlone,
}

/// State transitions reactive triggers watch for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionKind {
    /// The very first user turn.
    FirstTurn,
    /// The same pattern fired this many times in a row.
    RepeatedPattern { times: u32 },
    /// This many turns passed without a fact being captured.
    Stalled { turns: u32 },
}

/// How a trigger matches a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchRule {
    /// Fires when any phrase appears in the message.
    Keyword { any_of: Vec<String> },
    /// Fires when the lexicon scan produces the signal.
    Signal { signal: SignalKind },
    /// Fires when an opportunity keyword appears and every state
    /// condition holds.
    Opportunity {
        keywords: Vec<String>,
        conditions: Vec<Predicate>,
    },
    /// Fires on a conversation-state transition.
    Transition { transition: TransitionKind },
}

/// An immutable trigger definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDef {
    pub id: TriggerId,
    pub trigger_type: TriggerType,
    pub rule: MatchRule,
    /// Which modes this signal reinforces when it fires.
    pub affinity: AffinityVector,
    pub priority: PriorityClass,
}

impl TriggerDef {
    /// Create a trigger with medium priority and zero affinity.
    pub fn new(id: impl Into<TriggerId>, trigger_type: TriggerType, rule: MatchRule) -> Self {
        Self {
            id: id.into(),
            trigger_type,
            rule,
            affinity: AffinityVector::new(),
            priority: PriorityClass::Medium,
        }
    }

    pub fn with_affinity(mut self, affinity: AffinityVector) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn with_priority(mut self, priority: PriorityClass) -> Self {
        self.priority = priority;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(PriorityClass::Critical > PriorityClass::High);
        assert!(PriorityClass::High > PriorityClass::Medium);
        assert!(PriorityClass::Medium > PriorityClass::Low);
    }

    #[test]
    fn test_escalation_saturates() {
        assert_eq!(PriorityClass::Low.escalate(), PriorityClass::Medium);
        assert_eq!(PriorityClass::High.escalate(), PriorityClass::Critical);
        assert_eq!(PriorityClass::Critical.escalate(), PriorityClass::Critical);
    }

    #[test]
    fn test_trigger_builder_defaults() {
        let trigger = TriggerDef::new(
            "progress_query",
            TriggerType::UserExplicit,
            MatchRule::Keyword {
                any_of: vec!["where are we".into()],
            },
        );

        assert_eq!(trigger.priority, PriorityClass::Medium);
        assert!(trigger.affinity.is_zero());
    }
}
