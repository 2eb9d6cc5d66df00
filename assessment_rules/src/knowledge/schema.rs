//! Knowledge schema - the registry of declared dimensions.
//!
//! Every dimension the engine may read or write is declared here with its
//! value kind and default. Catalog validation and forward-compatible
//! deserialization both run against the schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{DimensionKey, KnowledgeValue, ValueKind};

/// A declared knowledge dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionDef {
    pub key: DimensionKey,
    pub kind: ValueKind,
    /// Value a fresh conversation starts with, also used to fill gaps when
    /// deserializing older persisted snapshots.
    pub default: KnowledgeValue,
}

/// The registry of declared dimensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeSchema {
    dimensions: BTreeMap<DimensionKey, DimensionDef>,
}

impl KnowledgeSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a dimension. The default value fixes the kind.
    pub fn with_dimension(mut self, key: impl Into<DimensionKey>, default: KnowledgeValue) -> Self {
        let key = key.into();
        self.dimensions.insert(
            key.clone(),
            DimensionDef {
                key,
                kind: default.kind(),
                default,
            },
        );
        self
    }

    /// Whether the schema declares the given dimension.
    pub fn contains(&self, key: &DimensionKey) -> bool {
        self.dimensions.contains_key(key)
    }

    /// Get a dimension definition.
    pub fn get(&self, key: &DimensionKey) -> Option<&DimensionDef> {
        self.dimensions.get(key)
    }

    /// Iterate all declared dimensions in key order.
    pub fn iter(&self) -> impl Iterator<Item = &DimensionDef> {
        self.dimensions.values()
    }

    /// Number of declared dimensions.
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// The standard schema for the business-assessment domain.
    pub fn standard() -> Self {
        Self::new()
            // What the user understands about the process.
            .with_dimension("user.purpose_understood", KnowledgeValue::Bool(false))
            .with_dimension("user.process_understood", KnowledgeValue::Bool(false))
            .with_dimension("user.report_awareness", KnowledgeValue::Bool(false))
            .with_dimension(
                "user.terminology_level",
                KnowledgeValue::Text("novice".into()),
            )
            // Facts captured about the business.
            .with_dimension("system.business_name", KnowledgeValue::Text(String::new()))
            .with_dimension("system.industry", KnowledgeValue::Text(String::new()))
            .with_dimension("system.team_size", KnowledgeValue::Int(0))
            .with_dimension("system.budget_range", KnowledgeValue::Text(String::new()))
            .with_dimension("system.primary_goal", KnowledgeValue::Text(String::new()))
            .with_dimension("system.assessed_components", KnowledgeValue::Int(0))
            .with_dimension("system.pain_points", KnowledgeValue::Text(String::new()))
            // Emotional signals and progress tracking.
            .with_dimension("conversation.frustration", KnowledgeValue::Float(0.0))
            .with_dimension("conversation.confusion", KnowledgeValue::Float(0.0))
            .with_dimension("conversation.turn", KnowledgeValue::Int(0))
            .with_dimension("conversation.turns_since_progress", KnowledgeValue::Int(0))
            // Observability counters.
            .with_dimension("quality.fallback_count", KnowledgeValue::Int(0))
            .with_dimension("quality.rejected_mutations", KnowledgeValue::Int(0))
            .with_dimension("quality.contradictions_seen", KnowledgeValue::Int(0))
            .with_dimension("quality.patterns_fired", KnowledgeValue::Int(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_schema_declares_core_dimensions() {
        let schema = KnowledgeSchema::standard();

        assert!(schema.contains(&DimensionKey::new("conversation.frustration")));
        assert!(schema.contains(&DimensionKey::new("system.assessed_components")));
        assert!(schema.contains(&DimensionKey::new("quality.fallback_count")));
        assert!(!schema.contains(&DimensionKey::new("system.unknown")));
    }

    #[test]
    fn test_dimension_kind_follows_default() {
        let schema = KnowledgeSchema::new()
            .with_dimension("system.team_size", KnowledgeValue::Int(0));

        let def = schema.get(&DimensionKey::new("system.team_size")).unwrap();
        assert_eq!(def.kind, ValueKind::Int);
    }

    #[test]
    fn test_every_standard_key_has_known_category() {
        let schema = KnowledgeSchema::standard();
        for def in schema.iter() {
            assert!(
                def.key.category().is_some(),
                "uncategorized key: {}",
                def.key
            );
        }
    }
}
