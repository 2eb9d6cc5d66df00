//! The per-turn engine, session types, and the conversation-keyed store.
//!
//! One turn of one conversation is processed at a time against its own
//! session; different conversations are independent and the catalog is
//! shared read-only. A turn is all-or-nothing: every step runs against a
//! staged copy of the session, which replaces the live session only after
//! assembly succeeds, so an abandoned or failed turn leaves no partial
//! mutation behind.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use assessment_rules::{
    DimensionKey, FlatMutation, KnowledgeSchema, KnowledgeState, KnowledgeValue, MutationAction,
};

use crate::catalog::{standard_catalog, Catalog, MatchRule, MutationOp, PatternDef, SignalKind};
use crate::composition::{AffinityVector, Composition};
use crate::config::EngineConfig;
use crate::context::{AssembledPayload, ContextAssembler, TurnRecord};
use crate::detector::{CandidateTriggerMatch, EmotionalIntensity, SignalPayload, TriggerDetector};
use crate::error::{CatalogError, EngineError};
use crate::selector::{PatternSelector, SelectedPattern, SelectionOutcome};

/// Unique identifier for conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Create a new random conversation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a conversation ID from a specific UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a nil conversation ID (useful for defaults and tests).
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// All per-conversation state: knowledge memory, mode mixture, and the
/// recent-turn log. Serializable for the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub knowledge: KnowledgeState,
    pub composition: Composition,
    pub recent_turns: Vec<TurnRecord>,
}

impl Session {
    /// Create a fresh session against the given schema.
    pub fn new(schema: &KnowledgeSchema) -> Self {
        Self {
            knowledge: KnowledgeState::new(schema),
            composition: Composition::initial(),
            recent_turns: Vec::new(),
        }
    }

    /// Explicit restart: fresh knowledge and the initial composition prior.
    pub fn restart(&mut self, schema: &KnowledgeSchema) {
        *self = Session::new(schema);
    }
}

/// Caller-owned conversation-id-keyed session store. Never a global: each
/// worker passes its own store (or its own sessions) into the engine.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<ConversationId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &ConversationId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Fetch the session for a conversation, creating it on first contact.
    pub fn get_or_create(&mut self, id: ConversationId, schema: &KnowledgeSchema) -> &mut Session {
        self.sessions.entry(id).or_insert_with(|| Session::new(schema))
    }

    /// Drop a conversation's state at session end.
    pub fn remove(&mut self, id: &ConversationId) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Everything one turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Triggers that fired, in catalog order.
    pub triggers: Vec<CandidateTriggerMatch>,
    /// Ranked selected patterns (the fallback when nothing survived).
    pub patterns: Vec<SelectedPattern>,
    pub used_fallback: bool,
    /// Bounded payload for the downstream generator.
    pub payload: AssembledPayload,
}

/// The conversation engine. Holds the immutable catalog and configuration;
/// all mutable state arrives per call, so one engine serves any number of
/// concurrent conversations.
#[derive(Debug, Clone)]
pub struct DialogueEngine {
    catalog: Arc<Catalog>,
    schema: KnowledgeSchema,
    config: EngineConfig,
    detector: TriggerDetector,
    selector: PatternSelector,
    assembler: ContextAssembler,
}

impl DialogueEngine {
    /// Create an engine from a validated catalog.
    pub fn new(catalog: Catalog, schema: KnowledgeSchema, config: EngineConfig) -> Self {
        let selector = PatternSelector::new(config.min_dominant_weight);
        let assembler = ContextAssembler::new(config.budget.clone());
        Self {
            catalog: Arc::new(catalog),
            schema,
            config,
            detector: TriggerDetector::default(),
            selector,
            assembler,
        }
    }

    /// Engine with the standard schema, catalog, and configuration.
    pub fn with_standard_catalog() -> Result<Self, CatalogError> {
        let schema = KnowledgeSchema::standard();
        let catalog = standard_catalog(&schema)?;
        Ok(Self::new(catalog, schema, EngineConfig::default()))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn schema(&self) -> &KnowledgeSchema {
        &self.schema
    }

    /// A fresh session for a new conversation.
    pub fn new_session(&self) -> Session {
        Session::new(&self.schema)
    }

    /// Process one user turn against one conversation's session.
    ///
    /// On success the session is advanced; on any error it is left exactly
    /// as it was.
    pub fn process_turn(
        &self,
        conversation: ConversationId,
        session: &mut Session,
        message: &str,
    ) -> Result<TurnOutcome, EngineError> {
        let mut staged = session.clone();

        staged.knowledge.decay(&self.config.signal_decay);

        let matches = self
            .detector
            .detect(&self.catalog, message, &staged.knowledge);
        self.record_signals(&mut staged.knowledge, &matches);

        let mut reinforcement = AffinityVector::new();
        for matched in &matches {
            if let Some(def) = self.catalog.trigger(&matched.trigger) {
                for (mode, weight) in def.affinity.iter() {
                    if weight > 0.0 {
                        reinforcement.raise(mode, weight * matched.strength);
                    }
                }
            }
        }
        staged.composition.update(&reinforcement, &self.config.composition);

        let outcome =
            self.selector
                .select(&self.catalog, &matches, &staged.knowledge, &staged.composition);
        let (selected, used_fallback) = match outcome {
            SelectionOutcome::Selected(patterns) => (patterns, false),
            SelectionOutcome::NoneEligible => {
                tracing::warn!(
                    conversation = %conversation,
                    turn = staged.knowledge.turn(),
                    "no eligible pattern, degrading to fallback"
                );
                staged.knowledge.bump("quality.fallback_count");
                let fallback = SelectedPattern::from_def(self.catalog.fallback(), 0.0);
                (vec![fallback], true)
            }
        };

        let facts = collect_facts(&matches);
        for pattern in &selected {
            let Some(def) = self.catalog.pattern(&pattern.id) else {
                continue;
            };
            let mutations = resolve_mutations(def, &facts);
            let report = staged.knowledge.apply_mutations(&def.writes, &mutations);
            for rejected in &report.rejected {
                tracing::warn!(
                    conversation = %conversation,
                    pattern = %pattern.id,
                    dimension = %rejected.dimension,
                    reason = ?rejected.reason,
                    "knowledge mutation rejected"
                );
                staged.knowledge.bump("quality.rejected_mutations");
            }
            if report.made_progress() {
                staged.knowledge.mark_progress();
            }
            staged.knowledge.record_pattern(pattern.id.as_str(), pattern.category.key());
            staged.knowledge.bump("quality.patterns_fired");
        }

        let turn = staged.knowledge.turn();
        staged.recent_turns.push(TurnRecord {
            turn,
            user_message: message.to_string(),
            patterns: selected.iter().map(|p| p.id.to_string()).collect(),
        });
        if staged.recent_turns.len() > self.config.retained_turns {
            let excess = staged.recent_turns.len() - self.config.retained_turns;
            staged.recent_turns.drain(..excess);
        }

        // Assembly is the last fallible step; on failure the staged state
        // is discarded and the live session stays untouched.
        let payload = self.assembler.assemble(
            conversation,
            &self.catalog,
            &selected,
            &staged.knowledge,
            &staged.recent_turns,
        )?;

        *session = staged;
        Ok(TurnOutcome {
            triggers: matches,
            patterns: selected,
            used_fallback,
            payload,
        })
    }

    /// Emotional-signal bookkeeping: matched signal triggers reinforce the
    /// levels the per-turn decay otherwise fades.
    fn record_signals(&self, knowledge: &mut KnowledgeState, matches: &[CandidateTriggerMatch]) {
        for matched in matches {
            let Some(def) = self.catalog.trigger(&matched.trigger) else {
                continue;
            };
            let MatchRule::Signal { signal } = &def.rule else {
                continue;
            };
            let amount = (matched.strength * intensity_factor(matched.intensity)) as f64;
            match signal {
                SignalKind::Frustration => {
                    knowledge.raise_level("conversation.frustration", amount);
                }
                SignalKind::Confusion => {
                    knowledge.raise_level("conversation.confusion", amount);
                }
                SignalKind::Contradiction => {
                    knowledge.bump("quality.contradictions_seen");
                }
                _ => {}
            }
        }
    }
}

/// Restore persisted knowledge against the current schema.
///
/// Dimensions missing from the snapshot (an older schema) are filled with
/// defaults and logged at warn level; this path is never fatal.
pub fn restore_knowledge(
    schema: &KnowledgeSchema,
    flat: &BTreeMap<String, String>,
) -> KnowledgeState {
    let (state, gaps) = KnowledgeState::from_flat(schema, flat);
    if !gaps.is_empty() {
        tracing::warn!(
            missing = gaps.missing.len(),
            malformed = gaps.malformed.len(),
            "knowledge snapshot did not match current schema, gaps default-filled"
        );
    }
    state
}

fn intensity_factor(intensity: EmotionalIntensity) -> f32 {
    match intensity {
        EmotionalIntensity::Normal => 0.4,
        EmotionalIntensity::Elevated => 0.6,
        EmotionalIntensity::Extreme => 0.9,
    }
}

/// All capturable (dimension, value) pairs the detector extracted this turn.
fn collect_facts(matches: &[CandidateTriggerMatch]) -> Vec<(DimensionKey, KnowledgeValue)> {
    matches
        .iter()
        .filter_map(|m| match &m.payload {
            Some(SignalPayload::Fact { dimension, value }) => {
                Some((dimension.clone(), value.clone()))
            }
            Some(SignalPayload::Contradiction {
                dimension, stated, ..
            }) => Some((dimension.clone(), stated.clone())),
            None => None,
        })
        .collect()
}

/// Resolve a pattern's declared mutation ops into concrete writes.
fn resolve_mutations(
    def: &PatternDef,
    facts: &[(DimensionKey, KnowledgeValue)],
) -> Vec<FlatMutation> {
    let mut resolved = Vec::new();
    for op in &def.mutations {
        match op {
            MutationOp::Set { dimension, value } => resolved.push(FlatMutation {
                dimension: dimension.clone(),
                action: MutationAction::Set(value.clone()),
            }),
            MutationOp::Increment { dimension, by } => resolved.push(FlatMutation {
                dimension: dimension.clone(),
                action: MutationAction::Increment(*by),
            }),
            MutationOp::CaptureInto { dimension } => {
                if let Some((_, value)) = facts.iter().find(|(d, _)| d == dimension) {
                    resolved.push(FlatMutation {
                        dimension: dimension.clone(),
                        action: MutationAction::Set(value.clone()),
                    });
                }
            }
            MutationOp::CaptureFacts => {
                for (dimension, value) in facts {
                    resolved.push(FlatMutation {
                        dimension: dimension.clone(),
                        action: MutationAction::Set(value.clone()),
                    });
                }
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Mode;
    use crate::context::BudgetConfig;

    fn engine() -> DialogueEngine {
        DialogueEngine::with_standard_catalog().unwrap()
    }

    fn run_turns(engine: &DialogueEngine, session: &mut Session, messages: &[&str]) {
        let id = ConversationId::nil();
        for message in messages {
            engine.process_turn(id, session, message).unwrap();
        }
    }

    #[test]
    fn test_first_turn_selects_welcome() {
        let engine = engine();
        let mut session = engine.new_session();

        let outcome = engine
            .process_turn(ConversationId::nil(), &mut session, "Hello!")
            .unwrap();

        let ids: Vec<&str> = outcome.patterns.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["welcome_orientation"]);
        assert!(session.knowledge.flag("user.purpose_understood"));
        assert!(session.knowledge.flag("user.report_awareness"));
    }

    #[test]
    fn test_scenario_progress_query_selects_one_navigation_pattern() {
        let engine = engine();
        let mut session = engine.new_session();
        run_turns(&engine, &mut session, &["Hello!"]);

        let outcome = engine
            .process_turn(ConversationId::nil(), &mut session, "Where are we?")
            .unwrap();

        assert_eq!(outcome.patterns.len(), 1);
        assert_eq!(outcome.patterns[0].id.as_str(), "orient_progress");
        assert_eq!(outcome.patterns[0].category, Mode::Navigation);
        assert!(!outcome.used_fallback);
    }

    #[test]
    fn test_scenario_profane_frustration_selects_error_recovery_only() {
        let engine = engine();
        let mut session = engine.new_session();
        run_turns(&engine, &mut session, &["Hello!"]);

        let outcome = engine
            .process_turn(
                ConversationId::nil(),
                &mut session,
                "Where the fuck is the report?",
            )
            .unwrap();

        assert_eq!(outcome.patterns.len(), 1);
        assert_eq!(outcome.patterns[0].id.as_str(), "acknowledge_frustration");
        assert_eq!(outcome.patterns[0].category, Mode::ErrorRecovery);
        assert!(session.knowledge.frustration() > 0.5);
    }

    #[test]
    fn test_scenario_unmet_recommendation_falls_back_to_discovery() {
        let engine = engine();
        let mut session = engine.new_session();
        run_turns(&engine, &mut session, &["Hello!"]);
        assert_eq!(session.knowledge.count("system.assessed_components"), 0);

        let outcome = engine
            .process_turn(ConversationId::nil(), &mut session, "What do you recommend?")
            .unwrap();

        assert!(outcome.used_fallback);
        assert_eq!(outcome.patterns[0].id.as_str(), "fallback");
        assert_eq!(outcome.patterns[0].category, Mode::Discovery);
        assert_eq!(session.knowledge.count("quality.fallback_count"), 1);
    }

    #[test]
    fn test_fact_capture_resets_progress_counter() {
        let engine = engine();
        let mut session = engine.new_session();
        run_turns(&engine, &mut session, &["Hello!"]);

        let outcome = engine
            .process_turn(
                ConversationId::nil(),
                &mut session,
                "Our industry is retail",
            )
            .unwrap();

        let ids: Vec<&str> = outcome.patterns.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.contains(&"capture_business_fact"));
        assert_eq!(session.knowledge.text("system.industry"), "retail");
        assert_eq!(session.knowledge.turns_since_progress(), 0);
    }

    #[test]
    fn test_selection_count_always_bounded() {
        let engine = engine();
        let mut session = engine.new_session();
        let messages = [
            "Hello!",
            "Our industry is retail, and we have 8 people",
            "Can you explain how does this work?",
            "I worry about the cost",
            "Where are we?",
            "thanks, that helps",
        ];

        let id = ConversationId::nil();
        for message in messages {
            let outcome = engine.process_turn(id, &mut session, message).unwrap();
            assert!(outcome.patterns.len() <= 2);
            assert!(!outcome.patterns.is_empty());
            assert!(session.composition.is_normalized());
        }
    }

    #[test]
    fn test_oversized_context_leaves_session_untouched() {
        let schema = KnowledgeSchema::standard();
        let catalog = standard_catalog(&schema).unwrap();
        let config = EngineConfig {
            budget: BudgetConfig {
                warn_tokens: 5,
                reject_tokens: 10,
                ..BudgetConfig::default()
            },
            ..EngineConfig::default()
        };
        let engine = DialogueEngine::new(catalog, schema, config);
        let mut session = engine.new_session();
        let before = session.clone();

        let result = engine.process_turn(ConversationId::nil(), &mut session, "Hello!");

        assert!(matches!(result, Err(EngineError::OversizedContext { .. })));
        assert_eq!(session, before);
    }

    #[test]
    fn test_session_round_trips_through_serde() {
        let engine = engine();
        let mut session = engine.new_session();
        run_turns(&engine, &mut session, &["Hello!", "Our industry is retail"]);

        let encoded = serde_json::to_string(&session).unwrap();
        let decoded: Session = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, session);
    }

    #[test]
    fn test_restore_default_fills_older_snapshot() {
        let engine = engine();
        let mut session = engine.new_session();
        run_turns(&engine, &mut session, &["Hello!", "Our industry is retail"]);

        // An older persisted snapshot that predates the budget dimension.
        let mut flat = session.knowledge.to_flat();
        flat.remove("system.budget_range");

        let restored = restore_knowledge(engine.schema(), &flat);

        assert_eq!(restored.text("system.budget_range"), "");
        assert_eq!(restored.text("system.industry"), "retail");
    }

    #[test]
    fn test_knowledge_flat_round_trip_after_turns() {
        let engine = engine();
        let mut session = engine.new_session();
        run_turns(
            &engine,
            &mut session,
            &["Hello!", "Our industry is retail", "Where are we?"],
        );

        let flat = session.knowledge.to_flat();
        let (restored, gaps) = KnowledgeState::from_flat(engine.schema(), &flat);

        assert!(gaps.is_empty());
        assert_eq!(restored, session.knowledge);
    }

    #[test]
    fn test_restart_resets_composition_and_knowledge() {
        let engine = engine();
        let mut session = engine.new_session();
        run_turns(&engine, &mut session, &["Hello!", "Where are we?"]);
        assert!(session.knowledge.turn() > 0);

        session.restart(engine.schema());

        assert_eq!(session.knowledge.turn(), 0);
        assert_eq!(session.composition, Composition::initial());
        assert!(session.recent_turns.is_empty());
    }

    #[test]
    fn test_store_isolates_conversations() {
        let engine = engine();
        let mut store = SessionStore::new();
        let a = ConversationId::new();
        let b = ConversationId::new();

        {
            let session = store.get_or_create(a, engine.schema());
            engine.process_turn(a, session, "Hello!").unwrap();
        }

        let session_b = store.get_or_create(b, engine.schema());
        assert_eq!(session_b.knowledge.turn(), 0);
        assert_eq!(store.get(&a).unwrap().knowledge.turn(), 1);

        store.remove(&a);
        assert_eq!(store.len(), 1);
    }
}
