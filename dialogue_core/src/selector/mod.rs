//! Pattern selection - the central per-turn algorithm.
//!
//! Selection is a pure pipeline over immutable inputs: candidate expansion,
//! prerequisite filter, cooldown filter, affinity scoring, critical
//! priority override, incompatibility pruning, and a deterministic final
//! ranking capped at two patterns. Side effects (history, mutations) belong
//! to the engine, never to the selector.

use serde::{Deserialize, Serialize};

use assessment_rules::{all_hold, any_holds, KnowledgeState};

use crate::catalog::{Catalog, CooldownScope, PatternDef, PatternId, PriorityClass, ResponseConstraints};
use crate::composition::{Composition, Mode};
use crate::detector::CandidateTriggerMatch;
use crate::error::EngineError;

/// Maximum patterns returned per turn.
pub const SELECTION_CAP: usize = 2;

/// A pattern chosen for this turn, with its resolved response material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPattern {
    pub id: PatternId,
    pub category: Mode,
    pub score: f32,
    pub goal: String,
    pub template: String,
    pub constraints: ResponseConstraints,
}

impl SelectedPattern {
    /// Resolve a pattern definition into a selection result.
    pub fn from_def(def: &PatternDef, score: f32) -> Self {
        Self {
            id: def.id.clone(),
            category: def.category,
            score,
            goal: def.goal.clone(),
            template: def.template.clone(),
            constraints: def.constraints.clone(),
        }
    }
}

/// The selector's verdict for one turn.
///
/// `NoneEligible` is an explicit sentinel: the caller must substitute the
/// reserved fallback pattern so the conversation never stalls.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Selected(Vec<SelectedPattern>),
    NoneEligible,
}

impl SelectionOutcome {
    pub fn patterns(&self) -> &[SelectedPattern] {
        match self {
            SelectionOutcome::Selected(patterns) => patterns,
            SelectionOutcome::NoneEligible => &[],
        }
    }

    pub fn is_none_eligible(&self) -> bool {
        matches!(self, SelectionOutcome::NoneEligible)
    }

    /// Turn the sentinel into the error taxonomy, for callers driving the
    /// selector without the engine's fallback handling.
    pub fn into_result(self, turn: u32) -> Result<Vec<SelectedPattern>, EngineError> {
        match self {
            SelectionOutcome::Selected(patterns) => Ok(patterns),
            SelectionOutcome::NoneEligible => Err(EngineError::NoEligiblePattern { turn }),
        }
    }
}

struct Candidate<'a> {
    def: &'a PatternDef,
    /// Highest effective priority among the triggers that proposed it.
    priority: PriorityClass,
    score: f32,
}

/// The pattern selection algorithm. Stateless; all inputs arrive per call.
#[derive(Debug, Clone)]
pub struct PatternSelector {
    /// Minimum composition weight required on a pattern's dominant affinity
    /// mode. Critical-priority candidates bypass this floor.
    min_dominant_weight: f32,
}

impl PatternSelector {
    pub fn new(min_dominant_weight: f32) -> Self {
        Self { min_dominant_weight }
    }

    /// Select up to [`SELECTION_CAP`] patterns for this turn.
    pub fn select(
        &self,
        catalog: &Catalog,
        matches: &[CandidateTriggerMatch],
        state: &KnowledgeState,
        composition: &Composition,
    ) -> SelectionOutcome {
        // 1. Candidate expansion through the trigger->pattern mapping,
        //    disambiguated by per-pattern selection predicates.
        let mut candidates: Vec<Candidate> = Vec::new();
        for matched in matches {
            for pattern_id in catalog.patterns_for(&matched.trigger) {
                let Some(def) = catalog.pattern(pattern_id) else {
                    continue;
                };
                if !all_hold(&def.selection, state) {
                    continue;
                }
                match candidates.iter_mut().find(|c| &c.def.id == pattern_id) {
                    Some(existing) => {
                        existing.priority = existing.priority.max(matched.priority);
                    }
                    None => candidates.push(Candidate {
                        def,
                        priority: matched.priority,
                        score: 0.0,
                    }),
                }
            }
        }
        tracing::debug!(stage = "expansion", candidates = candidates.len());

        // 2. Prerequisite filter.
        candidates.retain(|c| check_prerequisites(c.def, state));
        tracing::debug!(stage = "prerequisites", candidates = candidates.len());

        // 3. Cooldown filter with override predicates.
        candidates.retain(|c| !on_cooldown(c.def, state));
        tracing::debug!(stage = "cooldown", candidates = candidates.len());

        // 4. Affinity scoring with the dominant-mode floor.
        //    5. Critical candidates bypass the floor.
        for candidate in &mut candidates {
            candidate.score = Mode::ALL
                .iter()
                .map(|m| composition.get(*m) * candidate.def.affinity.get(*m))
                .sum();
        }
        candidates.retain(|c| {
            if c.priority == PriorityClass::Critical {
                return true;
            }
            match c.def.affinity.dominant() {
                Some(dominant) => composition.get(dominant) >= self.min_dominant_weight,
                None => false,
            }
        });
        tracing::debug!(stage = "scoring", candidates = candidates.len());

        // Rank: critical first, then score, then priority, then id.
        candidates.sort_by(|a, b| {
            let a_critical = a.priority == PriorityClass::Critical;
            let b_critical = b.priority == PriorityClass::Critical;
            b_critical
                .cmp(&a_critical)
                .then_with(|| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.def.id.cmp(&b.def.id))
        });

        // 6. Incompatibility pruning over the tentative set; the
        //    lower-priority member of a conflicting pair loses.
        let mut selected: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            let conflicts: Vec<usize> = selected
                .iter()
                .enumerate()
                .filter(|(_, s)| catalog.incompatible(s.def.category, candidate.def.category))
                .map(|(i, _)| i)
                .collect();

            if conflicts.is_empty() {
                if selected.len() < SELECTION_CAP {
                    selected.push(candidate);
                }
            } else if conflicts
                .iter()
                .all(|&i| candidate.priority > selected[i].priority)
            {
                for &index in conflicts.iter().rev() {
                    let removed = selected.remove(index);
                    tracing::debug!(
                        pruned = %removed.def.id,
                        kept = %candidate.def.id,
                        "incompatible pattern pruned"
                    );
                }
                selected.push(candidate);
            } else {
                tracing::debug!(pruned = %candidate.def.id, "incompatible pattern pruned");
            }
        }

        // 7. Final deterministic ranking.
        selected.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.def.id.cmp(&b.def.id))
        });

        if selected.is_empty() {
            SelectionOutcome::NoneEligible
        } else {
            SelectionOutcome::Selected(
                selected
                    .into_iter()
                    .map(|c| SelectedPattern::from_def(c.def, c.score))
                    .collect(),
            )
        }
    }
}

/// Conjunctive `requires` must all hold; `blocks` must all be false.
pub fn check_prerequisites(def: &PatternDef, state: &KnowledgeState) -> bool {
    all_hold(&def.requires, state) && !any_holds(&def.blocks, state)
}

fn on_cooldown(def: &PatternDef, state: &KnowledgeState) -> bool {
    let Some(cooldown) = &def.cooldown else {
        return false;
    };
    let last = match cooldown.scope {
        CooldownScope::Pattern => state.history().last_fired(def.id.as_str()),
        CooldownScope::Category => state.history().last_fired_category(def.category.key()),
    };
    let Some(last) = last else {
        return false;
    };
    if state.turn().saturating_sub(last) >= cooldown.turns {
        return false;
    }
    // Inside the window; only a holding override lifts it.
    cooldown.override_when.is_empty() || !all_hold(&cooldown.override_when, state)
}
