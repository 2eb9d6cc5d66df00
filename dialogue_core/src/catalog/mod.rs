//! Catalog store - immutable trigger and pattern definitions.
//!
//! The catalog is built once at startup, validated for referential
//! integrity, and then shared read-only across workers. Validation fails
//! loudly: a catalog that loads is a catalog whose every trigger reference
//! resolves and whose every predicate names a declared dimension.

mod loader;
mod pattern;
mod standard;
mod trigger;

pub use loader::*;
pub use pattern::*;
pub use standard::*;
pub use trigger::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use assessment_rules::{KnowledgeSchema, Predicate};

use crate::composition::Mode;
use crate::error::CatalogError;

/// A pair of pattern categories that must not co-fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incompatibility {
    pub a: Mode,
    pub b: Mode,
}

/// Mutable staging area for catalog construction. `build` validates and
/// freezes it into a [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    triggers: Vec<TriggerDef>,
    patterns: Vec<PatternDef>,
    incompatibilities: Vec<Incompatibility>,
    exclusive: Vec<Mode>,
    fallback: Option<PatternId>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(mut self, trigger: TriggerDef) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn pattern(mut self, pattern: PatternDef) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Declare two categories mutually incompatible.
    pub fn incompatible(mut self, a: Mode, b: Mode) -> Self {
        self.incompatibilities.push(Incompatibility { a, b });
        self
    }

    /// Declare a category incompatible with every other category.
    pub fn exclusive(mut self, mode: Mode) -> Self {
        self.exclusive.push(mode);
        self
    }

    /// Name the reserved always-eligible fallback pattern.
    pub fn fallback(mut self, id: impl Into<PatternId>) -> Self {
        self.fallback = Some(id.into());
        self
    }

    /// Validate and freeze. Every check failure is fatal.
    pub fn build(self, schema: &KnowledgeSchema) -> Result<Catalog, CatalogError> {
        let fallback = self.fallback.unwrap_or_else(|| PatternId::new("fallback"));

        let mut triggers = BTreeMap::new();
        for trigger in self.triggers {
            validate_predicates(
                schema,
                &format!("trigger `{}`", trigger.id),
                rule_conditions(&trigger.rule),
            )?;
            let id = trigger.id.clone();
            if triggers.insert(id.clone(), trigger).is_some() {
                return Err(CatalogError::DuplicateTrigger(id));
            }
        }

        let mut patterns = BTreeMap::new();
        let mut by_trigger: BTreeMap<TriggerId, Vec<PatternId>> = BTreeMap::new();

        for pattern in self.patterns {
            let owner = format!("pattern `{}`", pattern.id);

            for trigger in &pattern.triggered_by {
                if !triggers.contains_key(trigger) {
                    return Err(CatalogError::UnknownTrigger {
                        pattern: pattern.id.clone(),
                        trigger: trigger.clone(),
                    });
                }
            }

            validate_predicates(schema, &owner, pattern.selection.iter())?;
            validate_predicates(schema, &owner, pattern.requires.iter())?;
            validate_predicates(schema, &owner, pattern.blocks.iter())?;
            if let Some(cooldown) = &pattern.cooldown {
                validate_predicates(schema, &owner, cooldown.override_when.iter())?;
            }

            for dimension in &pattern.writes {
                if !schema.contains(dimension) {
                    return Err(CatalogError::UnknownDimension {
                        owner,
                        dimension: dimension.clone(),
                    });
                }
            }
            for mutation in &pattern.mutations {
                if let Some(dimension) = mutation.dimension() {
                    if !pattern.writes.contains(dimension) {
                        return Err(CatalogError::UndeclaredMutation {
                            pattern: pattern.id.clone(),
                            dimension: dimension.clone(),
                        });
                    }
                }
            }

            for trigger in &pattern.triggered_by {
                by_trigger
                    .entry(trigger.clone())
                    .or_default()
                    .push(pattern.id.clone());
            }

            let id = pattern.id.clone();
            if patterns.insert(id.clone(), pattern).is_some() {
                return Err(CatalogError::DuplicatePattern(id));
            }
        }

        match patterns.get(&fallback) {
            None => return Err(CatalogError::MissingFallback(fallback)),
            Some(pattern) if !pattern.is_unconditional() => {
                return Err(CatalogError::ConditionalFallback(fallback));
            }
            Some(_) => {}
        }

        tracing::info!(
            triggers = triggers.len(),
            patterns = patterns.len(),
            incompatibilities = self.incompatibilities.len(),
            "catalog validated"
        );

        Ok(Catalog {
            triggers,
            patterns,
            by_trigger,
            incompatibilities: self.incompatibilities,
            exclusive: self.exclusive,
            fallback,
        })
    }
}

fn rule_conditions(rule: &MatchRule) -> &[Predicate] {
    match rule {
        MatchRule::Opportunity { conditions, .. } => conditions,
        _ => &[],
    }
}

fn validate_predicates<'a>(
    schema: &KnowledgeSchema,
    owner: &str,
    predicates: impl IntoIterator<Item = &'a Predicate>,
) -> Result<(), CatalogError> {
    for predicate in predicates {
        if !schema.contains(&predicate.dimension) {
            return Err(CatalogError::UnknownDimension {
                owner: owner.to_string(),
                dimension: predicate.dimension.clone(),
            });
        }
    }
    Ok(())
}

/// The validated, immutable catalog. Safe to share behind an `Arc` across
/// workers; definitions are keyed in sorted order so iteration is
/// deterministic.
#[derive(Debug, Clone)]
pub struct Catalog {
    triggers: BTreeMap<TriggerId, TriggerDef>,
    patterns: BTreeMap<PatternId, PatternDef>,
    by_trigger: BTreeMap<TriggerId, Vec<PatternId>>,
    incompatibilities: Vec<Incompatibility>,
    exclusive: Vec<Mode>,
    fallback: PatternId,
}

impl Catalog {
    /// Start building a catalog.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Get a trigger definition.
    pub fn trigger(&self, id: &TriggerId) -> Option<&TriggerDef> {
        self.triggers.get(id)
    }

    /// Get a pattern definition.
    pub fn pattern(&self, id: &PatternId) -> Option<&PatternDef> {
        self.patterns.get(id)
    }

    /// Iterate trigger definitions in id order.
    pub fn triggers(&self) -> impl Iterator<Item = &TriggerDef> {
        self.triggers.values()
    }

    /// Iterate pattern definitions in id order.
    pub fn patterns(&self) -> impl Iterator<Item = &PatternDef> {
        self.patterns.values()
    }

    /// The patterns a fired trigger makes candidates.
    pub fn patterns_for(&self, trigger: &TriggerId) -> &[PatternId] {
        self.by_trigger
            .get(trigger)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Whether two categories may not co-fire.
    pub fn incompatible(&self, a: Mode, b: Mode) -> bool {
        if a == b {
            return false;
        }
        if self.exclusive.contains(&a) || self.exclusive.contains(&b) {
            return true;
        }
        self.incompatibilities
            .iter()
            .any(|pair| (pair.a == a && pair.b == b) || (pair.a == b && pair.b == a))
    }

    /// The reserved always-eligible fallback pattern.
    pub fn fallback(&self) -> &PatternDef {
        // Guaranteed by build-time validation.
        &self.patterns[&self.fallback]
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}
