//! Trigger detection - a pure function from (message, state) to candidate
//! trigger matches.
//!
//! Profanity is never a standalone emotion trigger. It is an intensity
//! multiplier: co-occurring with a base emotion it escalates that trigger's
//! priority one tier; with pain and domain-relevant content it produces a
//! critical discovery opportunity; alone it yields a distinct low-value
//! inappropriate-use signal.

mod signals;

pub use signals::*;

use serde::{Deserialize, Serialize};

use assessment_rules::{all_hold, DimensionKey, KnowledgeState, KnowledgeValue};

use crate::catalog::{
    Catalog, MatchRule, PriorityClass, SignalKind, TransitionKind, TriggerDef, TriggerId,
};

/// How charged the signal behind a match is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalIntensity {
    Normal,
    Elevated,
    Extreme,
}

/// Structured data extracted alongside a trigger match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalPayload {
    /// A capturable fact the user stated.
    Fact {
        dimension: DimensionKey,
        value: KnowledgeValue,
    },
    /// A stated fact conflicting with a stored one.
    Contradiction {
        dimension: DimensionKey,
        stored: KnowledgeValue,
        stated: KnowledgeValue,
    },
}

/// A trigger that fired this turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTriggerMatch {
    pub trigger: TriggerId,
    /// Match strength in [0, 1].
    pub strength: f32,
    /// Effective priority after any profanity escalation.
    pub priority: PriorityClass,
    pub intensity: EmotionalIntensity,
    pub payload: Option<SignalPayload>,
}

/// Detects candidate triggers for one turn. Stateless and side-effect free.
#[derive(Debug, Clone, Default)]
pub struct TriggerDetector {
    lexicon: SignalLexicon,
}

impl TriggerDetector {
    pub fn new(lexicon: SignalLexicon) -> Self {
        Self { lexicon }
    }

    /// Detect all triggers firing for this message against this state.
    ///
    /// Pure: identical (message, state) inputs always produce identical
    /// matches, in catalog id order.
    pub fn detect(
        &self,
        catalog: &Catalog,
        message: &str,
        state: &KnowledgeState,
    ) -> Vec<CandidateTriggerMatch> {
        let scan = self.lexicon.scan(message, state);
        let lower = message.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut matches = Vec::new();

        for trigger in catalog.triggers() {
            match &trigger.rule {
                MatchRule::Keyword { any_of } => {
                    if any_of.iter().any(|phrase| lower.contains(phrase.as_str())) {
                        matches.push(plain_match(trigger, 1.0));
                    }
                }
                MatchRule::Signal { signal } => {
                    self.match_signal(trigger, *signal, &scan, message, &mut matches);
                }
                MatchRule::Opportunity { keywords, conditions } => {
                    let keyword_hit = keywords.iter().any(|k| words.contains(&k.as_str()));
                    if keyword_hit && all_hold(conditions, state) {
                        matches.push(plain_match(trigger, 0.8));
                    }
                }
                MatchRule::Transition { transition } => {
                    if transition_holds(transition, state) {
                        matches.push(plain_match(trigger, 1.0));
                    }
                }
            }
        }

        matches
    }

    fn match_signal(
        &self,
        trigger: &TriggerDef,
        kind: SignalKind,
        scan: &SignalScan,
        message: &str,
        matches: &mut Vec<CandidateTriggerMatch>,
    ) {
        match kind {
            SignalKind::Frustration => {
                let mut strength = scan.frustration;
                // A demand wrapped in an expletive about our domain reads as
                // frustration even without frustration vocabulary. A pain
                // signal takes precedence as the richer interpretation.
                if strength == 0.0 && scan.profanity && scan.domain_relevant && scan.pain == 0.0 {
                    strength = 0.8;
                }
                if strength > 0.0 {
                    matches.push(emotion_match(trigger, strength, scan.profanity, None));
                }
            }
            SignalKind::Confusion => {
                if scan.confusion > 0.0 {
                    matches.push(emotion_match(trigger, scan.confusion, scan.profanity, None));
                }
            }
            SignalKind::Pain => {
                if scan.pain > 0.0 {
                    let payload = Some(SignalPayload::Fact {
                        dimension: DimensionKey::new("system.pain_points"),
                        value: KnowledgeValue::Text(message.trim().to_string()),
                    });
                    let mut matched = emotion_match(trigger, scan.pain, scan.profanity, payload);
                    // Strong language about a real problem is a valuable
                    // discovery signal, not a violation.
                    if scan.profanity && scan.domain_relevant {
                        matched.priority = PriorityClass::Critical;
                        matched.intensity = EmotionalIntensity::Extreme;
                    }
                    matches.push(matched);
                }
            }
            SignalKind::Satisfaction => {
                if scan.satisfaction > 0.0 {
                    matches.push(emotion_match(trigger, scan.satisfaction, scan.profanity, None));
                }
            }
            SignalKind::Contradiction => {
                for finding in &scan.contradictions {
                    matches.push(CandidateTriggerMatch {
                        trigger: trigger.id.clone(),
                        strength: 1.0,
                        priority: trigger.priority,
                        intensity: EmotionalIntensity::Normal,
                        payload: Some(SignalPayload::Contradiction {
                            dimension: finding.dimension.clone(),
                            stored: finding.stored.clone(),
                            stated: finding.stated.clone(),
                        }),
                    });
                }
            }
            SignalKind::FactShared => {
                for (dimension, value) in &scan.facts {
                    matches.push(CandidateTriggerMatch {
                        trigger: trigger.id.clone(),
                        strength: 0.9,
                        priority: trigger.priority,
                        intensity: EmotionalIntensity::Normal,
                        payload: Some(SignalPayload::Fact {
                            dimension: dimension.clone(),
                            value: value.clone(),
                        }),
                    });
                }
            }
            SignalKind::ProfanityAlone => {
                let nothing_else = !scan.has_emotion()
                    && !scan.domain_relevant
                    && scan.facts.is_empty()
                    && scan.contradictions.is_empty();
                if scan.profanity && nothing_else {
                    matches.push(plain_match(trigger, 0.4));
                }
            }
        }
    }
}

fn plain_match(trigger: &TriggerDef, strength: f32) -> CandidateTriggerMatch {
    CandidateTriggerMatch {
        trigger: trigger.id.clone(),
        strength,
        priority: trigger.priority,
        intensity: intensity_for(strength),
        payload: None,
    }
}

fn emotion_match(
    trigger: &TriggerDef,
    strength: f32,
    profanity: bool,
    payload: Option<SignalPayload>,
) -> CandidateTriggerMatch {
    let (priority, intensity) = if profanity {
        (trigger.priority.escalate(), EmotionalIntensity::Extreme)
    } else {
        (trigger.priority, intensity_for(strength))
    };
    CandidateTriggerMatch {
        trigger: trigger.id.clone(),
        strength,
        priority,
        intensity,
        payload,
    }
}

fn intensity_for(strength: f32) -> EmotionalIntensity {
    if strength >= 0.75 {
        EmotionalIntensity::Elevated
    } else {
        EmotionalIntensity::Normal
    }
}

fn transition_holds(transition: &TransitionKind, state: &KnowledgeState) -> bool {
    match transition {
        TransitionKind::FirstTurn => state.turn() == 1,
        TransitionKind::RepeatedPattern { times } => state
            .history()
            .trailing_run()
            .map_or(false, |(_, run)| run >= *times),
        TransitionKind::Stalled { turns } => state.turns_since_progress() >= *turns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standard_catalog;
    use assessment_rules::{KnowledgeSchema, SignalDecay};

    fn setup() -> (Catalog, TriggerDetector, KnowledgeState) {
        let schema = KnowledgeSchema::standard();
        let catalog = standard_catalog(&schema).unwrap();
        let detector = TriggerDetector::default();
        let state = KnowledgeState::new(&schema);
        (catalog, detector, state)
    }

    /// Advance the state to the given turn number, as the engine's per-turn
    /// decay step would.
    fn at_turn(state: &mut KnowledgeState, turn: u32) {
        let decay = SignalDecay::default();
        while state.turn() < turn {
            state.decay(&decay);
        }
    }

    fn ids(matches: &[CandidateTriggerMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.trigger.as_str()).collect()
    }

    #[test]
    fn test_detect_is_pure() {
        let (catalog, detector, mut state) = setup();
        at_turn(&mut state, 2);

        let first = detector.detect(&catalog, "Where are we?", &state);
        let second = detector.detect(&catalog, "Where are we?", &state);

        assert_eq!(first, second);
    }

    #[test]
    fn test_progress_query_fires_alone() {
        let (catalog, detector, mut state) = setup();
        at_turn(&mut state, 2);

        let matches = detector.detect(&catalog, "Where are we?", &state);

        assert_eq!(ids(&matches), vec!["progress_query"]);
        assert_eq!(matches[0].strength, 1.0);
    }

    #[test]
    fn test_profanity_escalates_frustration_to_critical() {
        let (catalog, detector, mut state) = setup();
        at_turn(&mut state, 3);

        let matches = detector.detect(&catalog, "Where the fuck is the report?", &state);

        assert_eq!(ids(&matches), vec!["frustration_signal"]);
        assert_eq!(matches[0].priority, PriorityClass::Critical);
        assert_eq!(matches[0].intensity, EmotionalIntensity::Extreme);
    }

    #[test]
    fn test_profanity_with_pain_and_domain_is_critical_discovery_signal() {
        let (catalog, detector, mut state) = setup();
        at_turn(&mut state, 2);

        let matches = detector.detect(
            &catalog,
            "Our website is a fucking nightmare and it's killing us",
            &state,
        );

        let pain = matches
            .iter()
            .find(|m| m.trigger.as_str() == "pain_point_signal")
            .expect("pain trigger should fire");
        assert_eq!(pain.priority, PriorityClass::Critical);
        assert_eq!(pain.intensity, EmotionalIntensity::Extreme);
        assert!(matches!(pain.payload, Some(SignalPayload::Fact { .. })));
        assert!(!ids(&matches).contains(&"inappropriate_use"));
    }

    #[test]
    fn test_profanity_alone_is_inappropriate_use() {
        let (catalog, detector, mut state) = setup();
        at_turn(&mut state, 2);

        let matches = detector.detect(&catalog, "fuck this", &state);

        assert_eq!(ids(&matches), vec!["inappropriate_use"]);
        assert_eq!(matches[0].priority, PriorityClass::Low);
    }

    #[test]
    fn test_cost_opportunity_respects_state_condition() {
        let (catalog, detector, mut state) = setup();
        at_turn(&mut state, 2);

        let matches = detector.detect(&catalog, "I worry about the cost", &state);
        assert!(ids(&matches).contains(&"cost_opportunity"));

        // Once the budget is known the opportunity is gone.
        state.apply_mutations(
            &[DimensionKey::new("system.budget_range")],
            &[assessment_rules::FlatMutation {
                dimension: DimensionKey::new("system.budget_range"),
                action: assessment_rules::MutationAction::Set(KnowledgeValue::Text("20k".into())),
            }],
        );
        let matches = detector.detect(&catalog, "I worry about the cost", &state);
        assert!(!ids(&matches).contains(&"cost_opportunity"));
    }

    #[test]
    fn test_first_turn_transition() {
        let (catalog, detector, mut state) = setup();
        at_turn(&mut state, 1);

        let matches = detector.detect(&catalog, "hi", &state);
        assert!(ids(&matches).contains(&"conversation_start"));

        at_turn(&mut state, 2);
        let matches = detector.detect(&catalog, "hi", &state);
        assert!(!ids(&matches).contains(&"conversation_start"));
    }

    #[test]
    fn test_repeated_pattern_transition() {
        let (catalog, detector, mut state) = setup();
        at_turn(&mut state, 4);
        for _ in 0..3 {
            state.record_pattern("explain_process", "education");
        }

        let matches = detector.detect(&catalog, "ok", &state);
        assert!(ids(&matches).contains(&"repeated_pattern"));
    }

    #[test]
    fn test_stalled_transition() {
        let (catalog, detector, mut state) = setup();
        at_turn(&mut state, 5);

        // Five turns, never a captured fact.
        assert!(state.turns_since_progress() >= 4);
        let matches = detector.detect(&catalog, "ok", &state);
        assert!(ids(&matches).contains(&"user_stuck"));
    }

    #[test]
    fn test_fact_shared_carries_payload() {
        let (catalog, detector, mut state) = setup();
        at_turn(&mut state, 2);

        let matches = detector.detect(&catalog, "our industry is retail", &state);

        let fact = matches
            .iter()
            .find(|m| m.trigger.as_str() == "fact_shared")
            .expect("fact trigger should fire");
        assert_eq!(
            fact.payload,
            Some(SignalPayload::Fact {
                dimension: DimensionKey::new("system.industry"),
                value: KnowledgeValue::Text("retail".into()),
            })
        );
    }
}
