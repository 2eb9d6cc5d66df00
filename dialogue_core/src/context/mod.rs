//! Context assembly and token budgeting.
//!
//! The assembler extracts the minimal payload the generator needs: the
//! selected patterns' response material, only the knowledge dimensions
//! those patterns reference, and a short tail of history. The budget check
//! fails closed: a payload at or above the hard ceiling is never returned,
//! and nothing is silently truncated beyond the declared per-field policy.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use assessment_rules::{DimensionKey, KnowledgeState};

use crate::catalog::Catalog;
use crate::engine::ConversationId;
use crate::error::EngineError;
use crate::selector::SelectedPattern;

/// Marker appended wherever a value was cut at the per-field limit.
pub const TRUNCATION_MARKER: &str = " …[truncated]";

/// Size ceilings for assembled context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Above this estimate a structured warning is emitted; the payload
    /// still passes.
    pub warn_tokens: u32,
    /// At or above this estimate assembly refuses and returns an error.
    pub reject_tokens: u32,
    /// Per-field character limit; longer values get the truncation marker.
    pub field_limit: usize,
    /// How many recent turns to include.
    pub history_turns: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            warn_tokens: 1800,
            reject_tokens: 2400,
            field_limit: 240,
            history_turns: 3,
        }
    }
}

/// One past turn, as retained for context assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: u32,
    pub user_message: String,
    /// Ids of the patterns that shaped the response.
    pub patterns: Vec<String>,
}

/// A knowledge dimension included in the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub dimension: String,
    pub value: String,
    pub truncated: bool,
}

/// The bounded payload handed to the caller for generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledPayload {
    pub patterns: Vec<SelectedPattern>,
    pub knowledge: Vec<KnowledgeItem>,
    pub recent_turns: Vec<TurnRecord>,
    /// Token estimate of the rendered prompt.
    pub estimated_tokens: u32,
    /// Whether the warn threshold was crossed.
    pub warned: bool,
}

impl AssembledPayload {
    /// Render the payload as the prompt string handed to the generator.
    pub fn to_prompt_string(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str("## Response Patterns\n");
        for pattern in &self.patterns {
            prompt.push_str(&format!(
                "- {} ({}): {}\n  Template: {}\n",
                pattern.id, pattern.category, pattern.goal, pattern.template
            ));
            if let Some(max) = pattern.constraints.max_sentences {
                prompt.push_str(&format!("  At most {} sentences.\n", max));
            }
            if let Some(tone) = &pattern.constraints.tone {
                prompt.push_str(&format!("  Tone: {}.\n", tone));
            }
        }
        prompt.push('\n');

        if !self.knowledge.is_empty() {
            prompt.push_str("## Known Context\n");
            for item in &self.knowledge {
                prompt.push_str(&format!("- {}: {}\n", item.dimension, item.value));
            }
            prompt.push('\n');
        }

        if !self.recent_turns.is_empty() {
            prompt.push_str("## Recent Turns\n");
            for record in &self.recent_turns {
                prompt.push_str(&format!(
                    "- turn {}: \"{}\" -> [{}]\n",
                    record.turn,
                    record.user_message,
                    record.patterns.join(", ")
                ));
            }
            prompt.push('\n');
        }

        prompt
    }
}

/// Rough generator-agnostic token estimate: one token per four characters.
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.chars().count() + 3) / 4) as u32
}

fn clip(text: &str, limit: usize) -> (String, bool) {
    if text.chars().count() <= limit {
        (text.to_string(), false)
    } else {
        let mut clipped: String = text.chars().take(limit).collect();
        clipped.push_str(TRUNCATION_MARKER);
        (clipped, true)
    }
}

/// Builds bounded payloads for the generator.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    config: BudgetConfig,
}

impl ContextAssembler {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    /// Assemble the payload for this turn's selection.
    ///
    /// Includes only the knowledge dimensions the selected patterns
    /// reference through `requires` or their declared write sets, and the
    /// last [`BudgetConfig::history_turns`] turns.
    pub fn assemble(
        &self,
        conversation: ConversationId,
        catalog: &Catalog,
        selected: &[SelectedPattern],
        state: &KnowledgeState,
        recent: &[TurnRecord],
    ) -> Result<AssembledPayload, EngineError> {
        let mut referenced: BTreeSet<DimensionKey> = BTreeSet::new();
        for pattern in selected {
            if let Some(def) = catalog.pattern(&pattern.id) {
                referenced.extend(def.requires.iter().map(|p| p.dimension.clone()));
                referenced.extend(def.writes.iter().cloned());
            }
        }

        let knowledge: Vec<KnowledgeItem> = referenced
            .into_iter()
            .filter_map(|dimension| {
                state.get(&dimension).map(|value| {
                    let (rendered, truncated) =
                        clip(&value.to_string(), self.config.field_limit);
                    KnowledgeItem {
                        dimension: dimension.to_string(),
                        value: rendered,
                        truncated,
                    }
                })
            })
            .collect();

        let tail_start = recent.len().saturating_sub(self.config.history_turns);
        let recent_turns: Vec<TurnRecord> = recent[tail_start..]
            .iter()
            .map(|record| {
                let (message, _) = clip(&record.user_message, self.config.field_limit);
                TurnRecord {
                    turn: record.turn,
                    user_message: message,
                    patterns: record.patterns.clone(),
                }
            })
            .collect();

        let mut payload = AssembledPayload {
            patterns: selected.to_vec(),
            knowledge,
            recent_turns,
            estimated_tokens: 0,
            warned: false,
        };

        let rendered = payload.to_prompt_string();
        let tokens = estimate_tokens(&rendered);
        payload.estimated_tokens = tokens;

        if tokens >= self.config.reject_tokens {
            let (preview, _) = clip(&rendered, 160);
            return Err(EngineError::OversizedContext {
                conversation,
                tokens,
                limit: self.config.reject_tokens,
                overflow: tokens - self.config.reject_tokens,
                preview,
            });
        }

        if tokens >= self.config.warn_tokens {
            payload.warned = true;
            tracing::warn!(
                conversation = %conversation,
                tokens,
                warn_limit = self.config.warn_tokens,
                "assembled context above warn threshold"
            );
        }

        Ok(payload)
    }
}
