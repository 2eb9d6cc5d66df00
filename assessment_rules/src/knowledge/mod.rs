//! Knowledge model - dimensions, values, and per-conversation state.
//!
//! Conversation memory is organized into four categories:
//! - **User knowledge**: what the user currently understands
//! - **System knowledge**: structured facts the system has captured
//! - **Conversation state**: emotional signals and progress tracking
//! - **Quality metrics**: counters for observability

mod history;
mod schema;
mod state;

pub use history::*;
pub use schema::*;
pub use state::*;

use serde::{Deserialize, Serialize};

/// The four categories of conversation memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnowledgeCategory {
    /// What the user understands about the process.
    User,
    /// Facts the system has captured about the business.
    System,
    /// Emotional signals and progress tracking.
    Conversation,
    /// Observability counters.
    Quality,
}

impl KnowledgeCategory {
    /// The dotted-key prefix for this category.
    pub fn prefix(&self) -> &'static str {
        match self {
            KnowledgeCategory::User => "user",
            KnowledgeCategory::System => "system",
            KnowledgeCategory::Conversation => "conversation",
            KnowledgeCategory::Quality => "quality",
        }
    }

    /// Parse a category from a dotted-key prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "user" => Some(KnowledgeCategory::User),
            "system" => Some(KnowledgeCategory::System),
            "conversation" => Some(KnowledgeCategory::Conversation),
            "quality" => Some(KnowledgeCategory::Quality),
            _ => None,
        }
    }
}

/// A dotted dimension key, e.g. `"system.budget_range"`.
///
/// The prefix before the first dot names the [`KnowledgeCategory`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionKey(String);

impl DimensionKey {
    /// Create a new dimension key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The full dotted key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The category encoded in the key prefix, if recognized.
    pub fn category(&self) -> Option<KnowledgeCategory> {
        let prefix = self.0.split('.').next().unwrap_or("");
        KnowledgeCategory::from_prefix(prefix)
    }

    /// Whether this key names a captured-fact dimension (`system.`).
    pub fn is_system_fact(&self) -> bool {
        self.category() == Some(KnowledgeCategory::System)
    }
}

impl std::fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DimensionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Value kinds a dimension may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
}

/// A single knowledge value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KnowledgeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl KnowledgeValue {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            KnowledgeValue::Bool(_) => ValueKind::Bool,
            KnowledgeValue::Int(_) => ValueKind::Int,
            KnowledgeValue::Float(_) => ValueKind::Float,
            KnowledgeValue::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            KnowledgeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            KnowledgeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            KnowledgeValue::Float(f) => Some(*f),
            KnowledgeValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            KnowledgeValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Whether this value is "set": non-empty text, non-zero number, or true.
    pub fn is_set(&self) -> bool {
        match self {
            KnowledgeValue::Bool(b) => *b,
            KnowledgeValue::Int(i) => *i != 0,
            KnowledgeValue::Float(f) => *f != 0.0,
            KnowledgeValue::Text(s) => !s.is_empty(),
        }
    }

    /// Compare two values. Numeric kinds compare cross-kind; bools order
    /// false < true; text compares lexically. Mismatched kinds otherwise
    /// return `None`.
    pub fn compare(&self, other: &KnowledgeValue) -> Option<std::cmp::Ordering> {
        use KnowledgeValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Float(_), Float(_) | Int(_)) | (Int(_), Float(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            _ => None,
        }
    }

    /// Parse a flat string encoding back into a value of the given kind.
    pub fn parse(kind: ValueKind, raw: &str) -> Option<Self> {
        match kind {
            ValueKind::Bool => raw.parse().ok().map(KnowledgeValue::Bool),
            ValueKind::Int => raw.parse().ok().map(KnowledgeValue::Int),
            ValueKind::Float => raw.parse().ok().map(KnowledgeValue::Float),
            ValueKind::Text => Some(KnowledgeValue::Text(raw.to_string())),
        }
    }
}

impl std::fmt::Display for KnowledgeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KnowledgeValue::Bool(b) => write!(f, "{}", b),
            KnowledgeValue::Int(i) => write!(f, "{}", i),
            KnowledgeValue::Float(x) => write!(f, "{}", x),
            KnowledgeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_category() {
        assert_eq!(
            DimensionKey::new("system.budget_range").category(),
            Some(KnowledgeCategory::System)
        );
        assert_eq!(
            DimensionKey::new("conversation.frustration").category(),
            Some(KnowledgeCategory::Conversation)
        );
        assert_eq!(DimensionKey::new("bogus.key").category(), None);
    }

    #[test]
    fn test_value_round_trip() {
        let cases = [
            (KnowledgeValue::Bool(true), ValueKind::Bool),
            (KnowledgeValue::Int(-42), ValueKind::Int),
            (KnowledgeValue::Float(0.125), ValueKind::Float),
            (KnowledgeValue::Text("retail".into()), ValueKind::Text),
        ];

        for (value, kind) in cases {
            let encoded = value.to_string();
            let decoded = KnowledgeValue::parse(kind, &encoded);
            assert_eq!(decoded, Some(value));
        }
    }

    #[test]
    fn test_cross_kind_numeric_compare() {
        let int = KnowledgeValue::Int(1);
        let float = KnowledgeValue::Float(1.5);
        assert_eq!(int.compare(&float), Some(std::cmp::Ordering::Less));
    }

    #[test]
    fn test_is_set() {
        assert!(!KnowledgeValue::Text(String::new()).is_set());
        assert!(KnowledgeValue::Text("known".into()).is_set());
        assert!(!KnowledgeValue::Int(0).is_set());
        assert!(KnowledgeValue::Bool(true).is_set());
    }
}
