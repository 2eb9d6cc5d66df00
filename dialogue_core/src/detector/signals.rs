//! Signal lexicon - keyword families and fact extraction for implicit
//! trigger detection.

use serde::{Deserialize, Serialize};

use assessment_rules::{DimensionKey, KnowledgeState, KnowledgeValue};

/// A fact conflict between what the user just said and what is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionFinding {
    pub dimension: DimensionKey,
    pub stored: KnowledgeValue,
    pub stated: KnowledgeValue,
}

/// Everything the lexicon scan reads out of one message.
///
/// Emotion strengths are 0.0 when the family did not match at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalScan {
    pub frustration: f32,
    pub confusion: f32,
    pub pain: f32,
    pub satisfaction: f32,
    pub profanity: bool,
    pub domain_relevant: bool,
    /// Newly stated facts not yet stored.
    pub facts: Vec<(DimensionKey, KnowledgeValue)>,
    /// Newly stated facts conflicting with stored ones.
    pub contradictions: Vec<ContradictionFinding>,
}

impl SignalScan {
    /// Whether any emotion family matched.
    pub fn has_emotion(&self) -> bool {
        self.frustration > 0.0
            || self.confusion > 0.0
            || self.pain > 0.0
            || self.satisfaction > 0.0
    }
}

/// Keyword families used by the scan. Phrase families match as substrings;
/// profanity and domain terms match whole words only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalLexicon {
    pub frustration: Vec<String>,
    pub confusion: Vec<String>,
    pub pain: Vec<String>,
    pub satisfaction: Vec<String>,
    pub profanity: Vec<String>,
    pub domain: Vec<String>,
}

fn phrases(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| p.to_string()).collect()
}

impl Default for SignalLexicon {
    fn default() -> Self {
        Self {
            frustration: phrases(&[
                "frustrated",
                "frustrating",
                "annoying",
                "annoyed",
                "waste of time",
                "not working",
                "still waiting",
                "asked you already",
                "fed up",
                "ridiculous",
                "getting nowhere",
            ]),
            confusion: phrases(&[
                "confused",
                "confusing",
                "don't understand",
                "dont understand",
                "not sure what",
                "what does that mean",
                "unclear",
                "lost me",
                "makes no sense",
            ]),
            pain: phrases(&[
                "struggling",
                "losing money",
                "losing customers",
                "too expensive for us",
                "nightmare",
                "killing us",
                "biggest problem",
                "pain point",
                "falling behind",
                "can't keep up",
                "cant keep up",
            ]),
            satisfaction: phrases(&[
                "thanks",
                "thank you",
                "that helps",
                "very helpful",
                "makes sense",
                "perfect",
                "exactly what i needed",
            ]),
            profanity: phrases(&["fuck", "fucking", "shit", "damn", "hell", "crap", "bullshit"]),
            domain: phrases(&[
                "report",
                "assessment",
                "business",
                "budget",
                "cost",
                "costs",
                "revenue",
                "customers",
                "marketing",
                "website",
                "component",
                "score",
                "team",
                "industry",
                "goal",
            ]),
        }
    }
}

impl SignalLexicon {
    /// Scan a message against the state. Pure: no side effects, identical
    /// inputs produce identical scans.
    pub fn scan(&self, message: &str, state: &KnowledgeState) -> SignalScan {
        let lower = message.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut scan = SignalScan {
            frustration: family_strength(&lower, &self.frustration),
            confusion: family_strength(&lower, &self.confusion),
            pain: family_strength(&lower, &self.pain),
            satisfaction: family_strength(&lower, &self.satisfaction),
            profanity: words.iter().any(|w| self.profanity.iter().any(|p| p == w)),
            domain_relevant: words.iter().any(|w| self.domain.iter().any(|d| d == w)),
            facts: Vec::new(),
            contradictions: Vec::new(),
        };

        for (dimension, stated) in extract_facts(&lower) {
            match state.get(&dimension) {
                Some(stored) if stored.is_set() => {
                    if !values_agree(stored, &stated) {
                        scan.contradictions.push(ContradictionFinding {
                            dimension,
                            stored: stored.clone(),
                            stated,
                        });
                    }
                }
                _ => scan.facts.push((dimension, stated)),
            }
        }

        scan
    }
}

fn family_strength(lower: &str, family: &[String]) -> f32 {
    let hits = family.iter().filter(|phrase| lower.contains(phrase.as_str())).count();
    if hits == 0 {
        0.0
    } else {
        (0.25 + 0.25 * hits as f32).min(1.0)
    }
}

fn values_agree(stored: &KnowledgeValue, stated: &KnowledgeValue) -> bool {
    match (stored.as_text(), stated.as_text()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => stored == stated,
    }
}

/// Extract `dimension = value` statements from a lowercased message.
///
/// Deliberately conservative: a missed fact costs one clarifying question,
/// a wrongly captured fact pollutes system knowledge.
fn extract_facts(lower: &str) -> Vec<(DimensionKey, KnowledgeValue)> {
    let mut facts = Vec::new();

    if let Some(value) = after_marker(lower, &["our industry is ", "industry is "]) {
        facts.push((
            DimensionKey::new("system.industry"),
            KnowledgeValue::Text(value),
        ));
    } else if let Some(value) = company_kind(lower) {
        facts.push((
            DimensionKey::new("system.industry"),
            KnowledgeValue::Text(value),
        ));
    }

    if let Some(value) = after_marker(lower, &["is called ", "we're called ", "we are called "]) {
        facts.push((
            DimensionKey::new("system.business_name"),
            KnowledgeValue::Text(value),
        ));
    }

    if let Some(value) = after_marker(
        lower,
        &["budget is around ", "budget is about ", "budget is ", "budget of "],
    ) {
        if value.chars().any(|c| c.is_ascii_digit()) {
            facts.push((
                DimensionKey::new("system.budget_range"),
                KnowledgeValue::Text(value),
            ));
        }
    }

    if let Some(size) = team_size(lower) {
        facts.push((
            DimensionKey::new("system.team_size"),
            KnowledgeValue::Int(size),
        ));
    }

    if let Some(value) = after_marker(lower, &["our goal is to ", "our goal is ", "we want to "]) {
        facts.push((
            DimensionKey::new("system.primary_goal"),
            KnowledgeValue::Text(value),
        ));
    }

    facts
}

/// The clause following the first matching marker, cut at sentence
/// punctuation and capped in length.
fn after_marker(lower: &str, markers: &[&str]) -> Option<String> {
    for marker in markers {
        if let Some(start) = lower.find(marker) {
            let rest = &lower[start + marker.len()..];
            let end = rest
                .find(['.', ',', '!', '?', ';'])
                .unwrap_or(rest.len());
            let value: String = rest[..end].trim().chars().take(60).collect();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

fn company_kind(lower: &str) -> Option<String> {
    const SUFFIXES: [&str; 6] = ["company", "business", "shop", "agency", "store", "firm"];
    let rest = after_marker(lower, &["we are a ", "we're a ", "we run a "])?;
    let mut words = Vec::new();
    for word in rest.split_whitespace() {
        if SUFFIXES.contains(&word) {
            if words.is_empty() {
                return None;
            }
            return Some(words.join(" "));
        }
        words.push(word);
        if words.len() > 3 {
            return None;
        }
    }
    None
}

fn team_size(lower: &str) -> Option<i64> {
    for marker in ["we have ", "team of ", "we employ "] {
        if let Some(start) = lower.find(marker) {
            let rest = &lower[start + marker.len()..];
            let first = rest.split_whitespace().next()?;
            if let Ok(size) = first.parse::<i64>() {
                let follows_people = rest
                    .split_whitespace()
                    .nth(1)
                    .map(|w| ["people", "employees", "staff"].contains(&w.trim_end_matches('.')))
                    .unwrap_or(false);
                if marker == "team of " || follows_people {
                    return Some(size);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessment_rules::{FlatMutation, KnowledgeSchema, MutationAction};

    fn empty_state() -> KnowledgeState {
        KnowledgeState::new(&KnowledgeSchema::standard())
    }

    #[test]
    fn test_emotion_families() {
        let lexicon = SignalLexicon::default();

        let scan = lexicon.scan("This is so frustrating, I'm fed up", &empty_state());
        assert!(scan.frustration >= 0.75);
        assert_eq!(scan.confusion, 0.0);

        let scan = lexicon.scan("I'm confused, what does that mean?", &empty_state());
        assert!(scan.confusion > 0.0);
    }

    #[test]
    fn test_profanity_is_word_bounded() {
        let lexicon = SignalLexicon::default();

        assert!(!lexicon.scan("hello there", &empty_state()).profanity);
        assert!(lexicon.scan("where the hell is it", &empty_state()).profanity);
    }

    #[test]
    fn test_domain_relevance() {
        let lexicon = SignalLexicon::default();

        assert!(lexicon.scan("where is the report", &empty_state()).domain_relevant);
        assert!(!lexicon.scan("nice weather today", &empty_state()).domain_relevant);
    }

    #[test]
    fn test_fact_extraction_industry_and_team() {
        let lexicon = SignalLexicon::default();
        let scan = lexicon.scan(
            "Our industry is logistics, and we have 12 people on staff",
            &empty_state(),
        );

        assert!(scan
            .facts
            .contains(&(DimensionKey::new("system.industry"), KnowledgeValue::Text("logistics".into()))));
        assert!(scan
            .facts
            .contains(&(DimensionKey::new("system.team_size"), KnowledgeValue::Int(12))));
    }

    #[test]
    fn test_company_kind_extraction() {
        let lexicon = SignalLexicon::default();
        let scan = lexicon.scan("We are a small retail company", &empty_state());

        assert!(scan
            .facts
            .contains(&(DimensionKey::new("system.industry"), KnowledgeValue::Text("small retail".into()))));
    }

    #[test]
    fn test_contradiction_against_stored_fact() {
        let lexicon = SignalLexicon::default();
        let mut state = empty_state();
        state.apply_mutations(
            &[DimensionKey::new("system.industry")],
            &[FlatMutation {
                dimension: DimensionKey::new("system.industry"),
                action: MutationAction::Set(KnowledgeValue::Text("retail".into())),
            }],
        );

        let scan = lexicon.scan("our industry is logistics", &state);

        assert!(scan.facts.is_empty());
        assert_eq!(scan.contradictions.len(), 1);
        assert_eq!(
            scan.contradictions[0].stored,
            KnowledgeValue::Text("retail".into())
        );
    }

    #[test]
    fn test_restating_known_fact_is_silent() {
        let lexicon = SignalLexicon::default();
        let mut state = empty_state();
        state.apply_mutations(
            &[DimensionKey::new("system.industry")],
            &[FlatMutation {
                dimension: DimensionKey::new("system.industry"),
                action: MutationAction::Set(KnowledgeValue::Text("Logistics".into())),
            }],
        );

        let scan = lexicon.scan("our industry is logistics", &state);

        assert!(scan.facts.is_empty());
        assert!(scan.contradictions.is_empty());
    }

    #[test]
    fn test_budget_requires_digits() {
        let lexicon = SignalLexicon::default();

        let scan = lexicon.scan("our budget is around 20k per year", &empty_state());
        assert!(scan
            .facts
            .iter()
            .any(|(dim, _)| dim.as_str() == "system.budget_range"));

        let scan = lexicon.scan("the budget is tight", &empty_state());
        assert!(!scan
            .facts
            .iter()
            .any(|(dim, _)| dim.as_str() == "system.budget_range"));
    }
}
