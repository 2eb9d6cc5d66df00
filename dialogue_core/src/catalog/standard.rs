//! The standard catalog for the business-assessment domain.
//!
//! Kept in code rather than TOML so the engine works out of the box;
//! deployments with their own catalogs load them through the TOML loader
//! and get identical validation.

use assessment_rules::{KnowledgeSchema, KnowledgeValue, Predicate};

use crate::composition::{AffinityVector, Mode};
use crate::error::CatalogError;

use super::{
    Catalog, Cooldown, MatchRule, MutationOp, PatternDef, PriorityClass, ResponseConstraints,
    SignalKind, TransitionKind, TriggerDef, TriggerType,
};

fn keywords(phrases: &[&str]) -> MatchRule {
    MatchRule::Keyword {
        any_of: phrases.iter().map(|p| p.to_string()).collect(),
    }
}

fn signal(kind: SignalKind) -> MatchRule {
    MatchRule::Signal { signal: kind }
}

fn affinity(weights: &[(Mode, f32)]) -> AffinityVector {
    weights
        .iter()
        .fold(AffinityVector::new(), |acc, (mode, w)| acc.with(*mode, *w))
}

fn fact_dimensions() -> [&'static str; 5] {
    [
        "system.business_name",
        "system.industry",
        "system.team_size",
        "system.budget_range",
        "system.primary_goal",
    ]
}

/// Build and validate the standard catalog against the given schema.
pub fn standard_catalog(schema: &KnowledgeSchema) -> Result<Catalog, CatalogError> {
    let mut builder = Catalog::builder()
        .fallback("fallback")
        .exclusive(Mode::ErrorRecovery)
        .incompatible(Mode::Education, Mode::Assessment);

    // --- Triggers ---

    builder = builder
        .trigger(
            TriggerDef::new(
                "conversation_start",
                TriggerType::SystemReactive,
                MatchRule::Transition {
                    transition: TransitionKind::FirstTurn,
                },
            )
            .with_priority(PriorityClass::High)
            .with_affinity(affinity(&[
                (Mode::Discovery, 0.7),
                (Mode::Education, 0.6),
                (Mode::Rapport, 0.4),
            ])),
        )
        .trigger(
            TriggerDef::new(
                "progress_query",
                TriggerType::UserExplicit,
                keywords(&[
                    "where are we",
                    "how far along",
                    "what's left",
                    "how much longer",
                    "status update",
                    "what happens next",
                ]),
            )
            .with_affinity(affinity(&[(Mode::Navigation, 1.0)])),
        )
        .trigger(
            TriggerDef::new(
                "explain_request",
                TriggerType::UserExplicit,
                keywords(&[
                    "what do you mean",
                    "can you explain",
                    "how does this work",
                    "what is this for",
                    "why do you need",
                ]),
            )
            .with_affinity(affinity(&[(Mode::Education, 1.0)])),
        )
        .trigger(
            TriggerDef::new(
                "report_request",
                TriggerType::UserExplicit,
                keywords(&[
                    "show me the report",
                    "see the report",
                    "generate the report",
                    "final report",
                    "see the results",
                ]),
            )
            .with_affinity(affinity(&[(Mode::Reporting, 1.0), (Mode::Navigation, 0.3)])),
        )
        .trigger(
            TriggerDef::new(
                "recommendation_request",
                TriggerType::UserExplicit,
                keywords(&[
                    "what should i do",
                    "what do you recommend",
                    "next steps",
                    "how do i improve",
                    "where do i start",
                ]),
            )
            .with_affinity(affinity(&[
                (Mode::Recommendation, 1.0),
                (Mode::Assessment, 0.3),
            ])),
        );

    builder = builder
        .trigger(
            TriggerDef::new(
                "frustration_signal",
                TriggerType::UserImplicit,
                signal(SignalKind::Frustration),
            )
            .with_priority(PriorityClass::High)
            .with_affinity(affinity(&[(Mode::ErrorRecovery, 1.0)])),
        )
        .trigger(
            TriggerDef::new(
                "confusion_signal",
                TriggerType::UserImplicit,
                signal(SignalKind::Confusion),
            )
            .with_affinity(affinity(&[
                (Mode::ErrorRecovery, 0.7),
                (Mode::Education, 0.5),
            ])),
        )
        .trigger(
            TriggerDef::new(
                "pain_point_signal",
                TriggerType::UserImplicit,
                signal(SignalKind::Pain),
            )
            .with_affinity(affinity(&[(Mode::Discovery, 0.9), (Mode::Assessment, 0.4)])),
        )
        .trigger(
            TriggerDef::new(
                "satisfaction_signal",
                TriggerType::UserImplicit,
                signal(SignalKind::Satisfaction),
            )
            .with_priority(PriorityClass::Low)
            .with_affinity(affinity(&[(Mode::Rapport, 0.8)])),
        )
        .trigger(
            TriggerDef::new(
                "contradiction_signal",
                TriggerType::UserImplicit,
                signal(SignalKind::Contradiction),
            )
            .with_priority(PriorityClass::High)
            .with_affinity(affinity(&[
                (Mode::Assessment, 0.6),
                (Mode::ErrorRecovery, 0.4),
            ])),
        )
        .trigger(
            TriggerDef::new(
                "fact_shared",
                TriggerType::UserImplicit,
                signal(SignalKind::FactShared),
            )
            .with_affinity(affinity(&[(Mode::Discovery, 0.8), (Mode::Assessment, 0.5)])),
        )
        .trigger(
            TriggerDef::new(
                "inappropriate_use",
                TriggerType::UserImplicit,
                signal(SignalKind::ProfanityAlone),
            )
            .with_priority(PriorityClass::Low)
            .with_affinity(affinity(&[(Mode::Rapport, 0.5)])),
        );

    builder = builder
        .trigger(
            TriggerDef::new(
                "cost_opportunity",
                TriggerType::SystemProactive,
                MatchRule::Opportunity {
                    keywords: ["cost", "price", "expensive", "budget", "afford", "spend", "pay"]
                        .iter()
                        .map(|k| k.to_string())
                        .collect(),
                    conditions: vec![Predicate::not_set("system.budget_range")],
                },
            )
            .with_affinity(affinity(&[
                (Mode::Discovery, 0.7),
                (Mode::Recommendation, 0.3),
            ])),
        )
        .trigger(
            TriggerDef::new(
                "repeated_pattern",
                TriggerType::SystemReactive,
                MatchRule::Transition {
                    transition: TransitionKind::RepeatedPattern { times: 3 },
                },
            )
            .with_priority(PriorityClass::High)
            .with_affinity(affinity(&[
                (Mode::ErrorRecovery, 0.8),
                (Mode::Navigation, 0.4),
            ])),
        )
        .trigger(
            TriggerDef::new(
                "user_stuck",
                TriggerType::SystemReactive,
                MatchRule::Transition {
                    transition: TransitionKind::Stalled { turns: 4 },
                },
            )
            .with_priority(PriorityClass::High)
            .with_affinity(affinity(&[
                (Mode::Navigation, 0.7),
                (Mode::ErrorRecovery, 0.5),
            ])),
        );

    // --- Patterns ---

    builder = builder
        .pattern(
            PatternDef::new(
                "welcome_orientation",
                Mode::Education,
                "Welcome the user and explain what the assessment produces",
                "Greet warmly, explain that a few questions about the business feed a \
                 readiness report, and invite the first description of the business.",
            )
            .triggered_by("conversation_start")
            .with_affinity(affinity(&[
                (Mode::Education, 0.9),
                (Mode::Discovery, 0.6),
                (Mode::Rapport, 0.4),
            ]))
            .with_constraints(ResponseConstraints {
                max_sentences: Some(4),
                tone: Some("warm".into()),
            })
            .with_write("user.purpose_understood")
            .with_write("user.report_awareness")
            .with_mutation(MutationOp::Set {
                dimension: "user.purpose_understood".into(),
                value: KnowledgeValue::Bool(true),
            })
            .with_mutation(MutationOp::Set {
                dimension: "user.report_awareness".into(),
                value: KnowledgeValue::Bool(true),
            }),
        )
        .pattern(
            PatternDef::new(
                "explain_purpose",
                Mode::Education,
                "Explain why the assessment exists and what the user gets out of it",
                "Describe the goal of the assessment and the report it produces, \
                 without process detail.",
            )
            .triggered_by("explain_request")
            .with_selection(Predicate::eq(
                "user.purpose_understood",
                KnowledgeValue::Bool(false),
            ))
            .with_affinity(affinity(&[(Mode::Education, 1.0)]))
            .with_cooldown(Cooldown::category(2))
            .with_write("user.purpose_understood")
            .with_mutation(MutationOp::Set {
                dimension: "user.purpose_understood".into(),
                value: KnowledgeValue::Bool(true),
            }),
        )
        .pattern(
            PatternDef::new(
                "explain_process",
                Mode::Education,
                "Explain how the assessment flow works step by step",
                "Walk through the remaining steps briefly and say what is asked at each.",
            )
            .triggered_by("explain_request")
            .with_selection(Predicate::eq(
                "user.purpose_understood",
                KnowledgeValue::Bool(true),
            ))
            .with_affinity(affinity(&[(Mode::Education, 0.9), (Mode::Navigation, 0.3)]))
            .with_cooldown(Cooldown::category(2))
            .with_write("user.process_understood")
            .with_mutation(MutationOp::Set {
                dimension: "user.process_understood".into(),
                value: KnowledgeValue::Bool(true),
            }),
        );

    builder = builder
        .pattern(
            PatternDef::new(
                "orient_progress",
                Mode::Navigation,
                "Tell the user where they are in the assessment",
                "Summarize what has been covered and what remains, in two sentences.",
            )
            .triggered_by("progress_query")
            .with_affinity(affinity(&[(Mode::Navigation, 1.0)]))
            .with_constraints(ResponseConstraints {
                max_sentences: Some(3),
                tone: None,
            })
            .with_cooldown(Cooldown::pattern(2)),
        )
        .pattern(
            PatternDef::new(
                "unstick_refocus",
                Mode::Navigation,
                "Break a stall with one concrete next step",
                "Acknowledge the pause and propose the single easiest question to \
                 answer next.",
            )
            .triggered_by("user_stuck")
            .with_affinity(affinity(&[
                (Mode::Navigation, 0.8),
                (Mode::ErrorRecovery, 0.4),
            ]))
            .with_cooldown(Cooldown::pattern(4)),
        );

    builder = builder
        .pattern(
            PatternDef::new(
                "acknowledge_frustration",
                Mode::ErrorRecovery,
                "Defuse frustration and repair the interaction",
                "Acknowledge the frustration directly, give the shortest useful answer, \
                 and offer a way forward.",
            )
            .triggered_by("frustration_signal")
            .with_affinity(affinity(&[(Mode::ErrorRecovery, 1.0)]))
            .with_constraints(ResponseConstraints {
                max_sentences: Some(3),
                tone: Some("calm".into()),
            })
            .with_cooldown(
                Cooldown::pattern(2).with_override(Predicate::at_least(
                    "conversation.frustration",
                    KnowledgeValue::Float(0.6),
                )),
            ),
        )
        .pattern(
            PatternDef::new(
                "clarify_confusion",
                Mode::ErrorRecovery,
                "Clear up what confused the user",
                "Restate the last point in plainer words and check it landed.",
            )
            .triggered_by("confusion_signal")
            .with_affinity(affinity(&[
                (Mode::ErrorRecovery, 0.9),
                (Mode::Education, 0.4),
            ]))
            .with_cooldown(
                Cooldown::pattern(2).with_override(Predicate::at_least(
                    "conversation.confusion",
                    KnowledgeValue::Float(0.5),
                )),
            ),
        )
        .pattern(
            PatternDef::new(
                "change_approach",
                Mode::ErrorRecovery,
                "Stop repeating an approach that is not landing",
                "Name the loop, drop the current angle, and try a different way in.",
            )
            .triggered_by("repeated_pattern")
            .with_affinity(affinity(&[
                (Mode::ErrorRecovery, 0.8),
                (Mode::Navigation, 0.3),
            ]))
            .with_cooldown(Cooldown::pattern(3)),
        );

    let mut capture_business_fact = PatternDef::new(
        "capture_business_fact",
        Mode::Discovery,
        "Record the fact the user just shared and build on it",
        "Confirm the captured detail in passing and ask the next most useful question.",
    )
    .triggered_by("fact_shared")
    .with_affinity(affinity(&[(Mode::Discovery, 0.9)]))
    .with_mutation(MutationOp::CaptureFacts);
    for dimension in fact_dimensions() {
        capture_business_fact = capture_business_fact.with_write(dimension);
    }

    let mut reconcile_contradiction = PatternDef::new(
        "reconcile_contradiction",
        Mode::Assessment,
        "Resolve a conflict between a stated fact and a stored one",
        "Point out the earlier answer, ask which is right, and record the correction.",
    )
    .triggered_by("contradiction_signal")
    .with_affinity(affinity(&[
        (Mode::Assessment, 0.8),
        (Mode::ErrorRecovery, 0.4),
    ]))
    .with_mutation(MutationOp::CaptureFacts);
    for dimension in fact_dimensions() {
        reconcile_contradiction = reconcile_contradiction.with_write(dimension);
    }

    builder = builder
        .pattern(
            PatternDef::new(
                "capture_pain_point",
                Mode::Discovery,
                "Record the pain point and dig into it",
                "Reflect the problem back in the user's own words and ask what it \
                 costs them.",
            )
            .triggered_by("pain_point_signal")
            .with_affinity(affinity(&[(Mode::Discovery, 0.9), (Mode::Assessment, 0.3)]))
            .with_write("system.pain_points")
            .with_mutation(MutationOp::CaptureInto {
                dimension: "system.pain_points".into(),
            }),
        )
        .pattern(capture_business_fact)
        .pattern(
            PatternDef::new(
                "assess_component",
                Mode::Assessment,
                "Fold the new information into the running assessment",
                "Relate the new detail to the component being assessed and note what \
                 it implies.",
            )
            .triggered_by("fact_shared")
            .with_selection(Predicate::is_set("system.primary_goal"))
            .with_affinity(affinity(&[(Mode::Assessment, 0.9), (Mode::Discovery, 0.3)]))
            .with_write("system.assessed_components")
            .with_mutation(MutationOp::Increment {
                dimension: "system.assessed_components".into(),
                by: 1,
            }),
        )
        .pattern(reconcile_contradiction)
        .pattern(
            PatternDef::new(
                "probe_budget",
                Mode::Discovery,
                "Surface budget expectations while cost is on the table",
                "Ask one open question about what they expect to spend.",
            )
            .triggered_by("cost_opportunity")
            .with_requires(Predicate::not_set("system.budget_range"))
            .with_affinity(affinity(&[
                (Mode::Discovery, 0.8),
                (Mode::Recommendation, 0.3),
            ]))
            .with_cooldown(Cooldown::pattern(3)),
        );

    builder = builder
        .pattern(
            PatternDef::new(
                "recommend_next_step",
                Mode::Recommendation,
                "Advise based on what has been assessed so far",
                "Give the single highest-leverage recommendation grounded in the \
                 assessed components.",
            )
            .triggered_by("recommendation_request")
            .with_requires(Predicate::at_least(
                "system.assessed_components",
                KnowledgeValue::Int(1),
            ))
            .with_affinity(affinity(&[
                (Mode::Recommendation, 0.9),
                (Mode::Assessment, 0.3),
            ]))
            .with_cooldown(Cooldown::pattern(2)),
        )
        .pattern(
            PatternDef::new(
                "report_status",
                Mode::Reporting,
                "Explain where the report stands and what it will contain",
                "Say how much of the report is ready and what remains before it can \
                 be produced.",
            )
            .triggered_by("report_request")
            .with_requires(Predicate::at_least(
                "system.assessed_components",
                KnowledgeValue::Int(1),
            ))
            .with_affinity(affinity(&[(Mode::Reporting, 1.0)])),
        )
        .pattern(
            PatternDef::new(
                "celebrate_progress",
                Mode::Rapport,
                "Reinforce the momentum",
                "Briefly acknowledge the progress and keep going.",
            )
            .triggered_by("satisfaction_signal")
            .with_affinity(affinity(&[(Mode::Rapport, 0.9)]))
            .with_cooldown(Cooldown::category(3)),
        )
        .pattern(
            PatternDef::new(
                "boundary_reset",
                Mode::Rapport,
                "Steer an off-track exchange back to the assessment",
                "Stay neutral and redirect to the next assessment question.",
            )
            .triggered_by("inappropriate_use")
            .with_affinity(affinity(&[(Mode::Rapport, 0.6)]))
            .with_constraints(ResponseConstraints {
                max_sentences: Some(2),
                tone: Some("neutral".into()),
            })
            .with_cooldown(Cooldown::pattern(2)),
        )
        .pattern(
            PatternDef::new(
                "fallback",
                Mode::Discovery,
                "Keep the conversation moving when nothing else applies",
                "Ask one open question about the part of the business discussed least.",
            )
            .with_affinity(affinity(&[(Mode::Discovery, 0.5), (Mode::Education, 0.3)])),
        );

    builder.build(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TriggerId;

    #[test]
    fn test_standard_catalog_validates() {
        let catalog = standard_catalog(&KnowledgeSchema::standard()).unwrap();
        assert!(catalog.trigger_count() >= 15);
        assert!(catalog.pattern_count() >= 17);
    }

    #[test]
    fn test_fallback_is_unconditional() {
        let catalog = standard_catalog(&KnowledgeSchema::standard()).unwrap();
        assert!(catalog.fallback().is_unconditional());
        assert_eq!(catalog.fallback().category, Mode::Discovery);
    }

    #[test]
    fn test_fact_shared_maps_to_two_patterns() {
        let catalog = standard_catalog(&KnowledgeSchema::standard()).unwrap();
        let mapped = catalog.patterns_for(&TriggerId::new("fact_shared"));
        assert_eq!(mapped.len(), 2);
    }

    #[test]
    fn test_error_recovery_is_exclusive() {
        let catalog = standard_catalog(&KnowledgeSchema::standard()).unwrap();
        for mode in Mode::ALL {
            if mode != Mode::ErrorRecovery {
                assert!(catalog.incompatible(Mode::ErrorRecovery, mode));
            }
        }
    }
}
