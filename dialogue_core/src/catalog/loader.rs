//! TOML catalog loading.
//!
//! Catalogs are authored declaratively and loaded once at process start.
//! The raw document shape is mapped onto definition records and then run
//! through the same validation as programmatically built catalogs.

use std::collections::BTreeMap;

use serde::Deserialize;

use assessment_rules::{Comparison, DimensionKey, KnowledgeSchema, KnowledgeValue, Predicate};

use crate::composition::{AffinityVector, Mode};
use crate::error::CatalogError;

use super::{
    Catalog, Cooldown, CooldownScope, MatchRule, MutationOp, PatternDef, PriorityClass,
    ResponseConstraints, SignalKind, TransitionKind, TriggerDef, TriggerType,
};

impl Catalog {
    /// Load and validate a catalog from TOML source.
    pub fn from_toml_str(source: &str, schema: &KnowledgeSchema) -> Result<Catalog, CatalogError> {
        let raw: RawCatalog = toml::from_str(source)?;
        raw.into_catalog(schema)
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default = "default_fallback")]
    fallback: String,
    #[serde(default)]
    exclusive: Vec<String>,
    #[serde(default)]
    incompatible: Vec<RawPair>,
    #[serde(default)]
    triggers: Vec<RawTrigger>,
    #[serde(default)]
    patterns: Vec<RawPattern>,
}

fn default_fallback() -> String {
    "fallback".to_string()
}

#[derive(Debug, Deserialize)]
struct RawPair {
    a: String,
    b: String,
}

#[derive(Debug, Deserialize)]
struct RawTrigger {
    id: String,
    #[serde(rename = "type")]
    trigger_type: TriggerType,
    #[serde(default)]
    priority: Option<PriorityClass>,
    rule: RawRule,
    #[serde(default)]
    affinity: BTreeMap<String, f32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawRule {
    Keyword {
        any_of: Vec<String>,
    },
    Signal {
        signal: SignalKind,
    },
    Opportunity {
        keywords: Vec<String>,
        #[serde(default)]
        conditions: Vec<RawPredicate>,
    },
    Transition {
        transition: TransitionKind,
    },
}

#[derive(Debug, Deserialize)]
struct RawPredicate {
    dimension: String,
    comparison: Comparison,
    #[serde(default)]
    value: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawCooldown {
    turns: u32,
    scope: CooldownScope,
    #[serde(default)]
    override_when: Vec<RawPredicate>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawMutation {
    Set { dimension: String, value: toml::Value },
    Increment { dimension: String, by: i64 },
    CaptureInto { dimension: String },
    CaptureFacts,
}

#[derive(Debug, Deserialize)]
struct RawPattern {
    id: String,
    category: String,
    goal: String,
    template: String,
    #[serde(default)]
    constraints: ResponseConstraints,
    #[serde(default)]
    affinity: BTreeMap<String, f32>,
    #[serde(default)]
    triggered_by: Vec<String>,
    #[serde(default)]
    selection: Vec<RawPredicate>,
    #[serde(default)]
    requires: Vec<RawPredicate>,
    #[serde(default)]
    blocks: Vec<RawPredicate>,
    #[serde(default)]
    cooldown: Option<RawCooldown>,
    #[serde(default)]
    writes: Vec<String>,
    #[serde(default)]
    mutations: Vec<RawMutation>,
}

impl RawCatalog {
    fn into_catalog(self, schema: &KnowledgeSchema) -> Result<Catalog, CatalogError> {
        let mut builder = Catalog::builder().fallback(self.fallback.as_str());

        for mode in self.exclusive {
            builder = builder.exclusive(parse_mode(&mode)?);
        }
        for pair in self.incompatible {
            builder = builder.incompatible(parse_mode(&pair.a)?, parse_mode(&pair.b)?);
        }

        for raw in self.triggers {
            let owner = format!("trigger `{}`", raw.id);
            let rule = match raw.rule {
                RawRule::Keyword { any_of } => MatchRule::Keyword { any_of },
                RawRule::Signal { signal } => MatchRule::Signal { signal },
                RawRule::Opportunity { keywords, conditions } => MatchRule::Opportunity {
                    keywords,
                    conditions: parse_predicates(&owner, conditions)?,
                },
                RawRule::Transition { transition } => MatchRule::Transition { transition },
            };

            let mut trigger = TriggerDef::new(raw.id.as_str(), raw.trigger_type, rule)
                .with_affinity(parse_affinity(&raw.affinity)?);
            if let Some(priority) = raw.priority {
                trigger = trigger.with_priority(priority);
            }
            builder = builder.trigger(trigger);
        }

        for raw in self.patterns {
            let owner = format!("pattern `{}`", raw.id);

            let mut pattern = PatternDef::new(
                raw.id.as_str(),
                parse_mode(&raw.category)?,
                raw.goal,
                raw.template,
            )
            .with_constraints(raw.constraints)
            .with_affinity(parse_affinity(&raw.affinity)?);

            for trigger in raw.triggered_by {
                pattern = pattern.triggered_by(trigger.as_str());
            }
            for predicate in parse_predicates(&owner, raw.selection)? {
                pattern = pattern.with_selection(predicate);
            }
            for predicate in parse_predicates(&owner, raw.requires)? {
                pattern = pattern.with_requires(predicate);
            }
            for predicate in parse_predicates(&owner, raw.blocks)? {
                pattern = pattern.with_blocks(predicate);
            }
            if let Some(raw_cooldown) = raw.cooldown {
                let mut cooldown = Cooldown {
                    turns: raw_cooldown.turns,
                    scope: raw_cooldown.scope,
                    override_when: Vec::new(),
                };
                cooldown.override_when = parse_predicates(&owner, raw_cooldown.override_when)?;
                pattern = pattern.with_cooldown(cooldown);
            }
            for dimension in raw.writes {
                pattern = pattern.with_write(dimension.as_str());
            }
            for mutation in raw.mutations {
                pattern = pattern.with_mutation(parse_mutation(&owner, mutation)?);
            }

            builder = builder.pattern(pattern);
        }

        builder.build(schema)
    }
}

fn parse_mode(key: &str) -> Result<Mode, CatalogError> {
    Mode::from_key(key).ok_or_else(|| CatalogError::UnknownMode(key.to_string()))
}

fn parse_affinity(raw: &BTreeMap<String, f32>) -> Result<AffinityVector, CatalogError> {
    let mut affinity = AffinityVector::new();
    for (key, weight) in raw {
        affinity = affinity.with(parse_mode(key)?, *weight);
    }
    Ok(affinity)
}

fn parse_predicates(
    owner: &str,
    raw: Vec<RawPredicate>,
) -> Result<Vec<Predicate>, CatalogError> {
    raw.into_iter()
        .map(|p| {
            let value = p.value.map(|v| parse_value(owner, v)).transpose()?;
            Ok(Predicate {
                dimension: DimensionKey::new(p.dimension),
                comparison: p.comparison,
                value,
            })
        })
        .collect()
}

fn parse_mutation(owner: &str, raw: RawMutation) -> Result<MutationOp, CatalogError> {
    Ok(match raw {
        RawMutation::Set { dimension, value } => MutationOp::Set {
            dimension: DimensionKey::new(dimension),
            value: parse_value(owner, value)?,
        },
        RawMutation::Increment { dimension, by } => MutationOp::Increment {
            dimension: DimensionKey::new(dimension),
            by,
        },
        RawMutation::CaptureInto { dimension } => MutationOp::CaptureInto {
            dimension: DimensionKey::new(dimension),
        },
        RawMutation::CaptureFacts => MutationOp::CaptureFacts,
    })
}

fn parse_value(owner: &str, value: toml::Value) -> Result<KnowledgeValue, CatalogError> {
    match value {
        toml::Value::Boolean(b) => Ok(KnowledgeValue::Bool(b)),
        toml::Value::Integer(i) => Ok(KnowledgeValue::Int(i)),
        toml::Value::Float(f) => Ok(KnowledgeValue::Float(f)),
        toml::Value::String(s) => Ok(KnowledgeValue::Text(s)),
        other => Err(CatalogError::InvalidValue {
            owner: owner.to_string(),
            found: other.type_str().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TriggerId;

    const SMALL_CATALOG: &str = r#"
fallback = "fallback"
exclusive = ["error_recovery"]

[[incompatible]]
a = "education"
b = "assessment"

[[triggers]]
id = "progress_query"
type = "user_explicit"
priority = "medium"

[triggers.rule]
kind = "keyword"
any_of = ["where are we", "status update"]

[triggers.affinity]
navigation = 1.0

[[triggers]]
id = "cost_opportunity"
type = "system_proactive"

[triggers.rule]
kind = "opportunity"
keywords = ["cost", "budget"]

[[triggers.rule.conditions]]
dimension = "system.budget_range"
comparison = "not_set"

[triggers.affinity]
discovery = 0.7

[[patterns]]
id = "orient_progress"
category = "navigation"
goal = "Tell the user where they are in the assessment"
template = "Summarize completed and remaining steps in two sentences."
triggered_by = ["progress_query"]

[patterns.affinity]
navigation = 1.0

[patterns.cooldown]
turns = 2
scope = "pattern"

[[patterns]]
id = "fallback"
category = "discovery"
goal = "Keep the conversation moving"
template = "Ask one open question about the business."

[patterns.affinity]
discovery = 0.5
"#;

    #[test]
    fn test_load_small_catalog() {
        let catalog =
            Catalog::from_toml_str(SMALL_CATALOG, &KnowledgeSchema::standard()).unwrap();

        assert_eq!(catalog.trigger_count(), 2);
        assert_eq!(catalog.pattern_count(), 2);

        let trigger = catalog.trigger(&TriggerId::new("cost_opportunity")).unwrap();
        assert!(matches!(
            trigger.rule,
            MatchRule::Opportunity { ref conditions, .. } if conditions.len() == 1
        ));

        assert!(catalog.incompatible(Mode::Education, Mode::Assessment));
        assert!(catalog.incompatible(Mode::ErrorRecovery, Mode::Navigation));
    }

    #[test]
    fn test_unknown_category_fails() {
        let source = r#"
[[patterns]]
id = "fallback"
category = "daydreaming"
goal = "g"
template = "t"
"#;
        let result = Catalog::from_toml_str(source, &KnowledgeSchema::standard());
        assert!(matches!(result, Err(CatalogError::UnknownMode(_))));
    }

    #[test]
    fn test_undeclared_predicate_dimension_fails() {
        let source = r#"
[[patterns]]
id = "fallback"
category = "discovery"
goal = "g"
template = "t"

[[patterns]]
id = "gated"
category = "discovery"
goal = "g"
template = "t"

[[patterns.requires]]
dimension = "system.not_in_schema"
comparison = "is_set"
"#;
        let result = Catalog::from_toml_str(source, &KnowledgeSchema::standard());
        assert!(matches!(result, Err(CatalogError::UnknownDimension { .. })));
    }

    #[test]
    fn test_malformed_toml_fails() {
        let result = Catalog::from_toml_str("not [ valid", &KnowledgeSchema::standard());
        assert!(matches!(result, Err(CatalogError::Parse(_))));
    }
}
