//! Error taxonomy for the engine.
//!
//! Catalog problems are fatal at load time. Per-turn problems are
//! recoverable: an empty selection degrades to the fallback pattern inside
//! the engine, and an oversized context is returned to the caller instead
//! of being silently truncated. Schema gaps found while deserializing
//! persisted state are not errors at all - they are default-filled and
//! reported through [`assessment_rules::SchemaGaps`], logged at warn level.

use thiserror::Error;

use assessment_rules::DimensionKey;

use crate::catalog::{PatternId, TriggerId};
use crate::engine::ConversationId;

/// Static catalog validation failures. All fatal at startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate trigger id `{0}`")]
    DuplicateTrigger(TriggerId),

    #[error("duplicate pattern id `{0}`")]
    DuplicatePattern(PatternId),

    #[error("pattern `{pattern}` references unknown trigger `{trigger}`")]
    UnknownTrigger {
        pattern: PatternId,
        trigger: TriggerId,
    },

    #[error("{owner} references undeclared knowledge dimension `{dimension}`")]
    UnknownDimension {
        owner: String,
        dimension: DimensionKey,
    },

    #[error("pattern `{pattern}` mutates `{dimension}` outside its declared write set")]
    UndeclaredMutation {
        pattern: PatternId,
        dimension: DimensionKey,
    },

    #[error("unknown mode `{0}`")]
    UnknownMode(String),

    #[error("{owner} carries an unsupported value type `{found}`")]
    InvalidValue { owner: String, found: String },

    #[error("fallback pattern `{0}` is not defined")]
    MissingFallback(PatternId),

    #[error("fallback pattern `{0}` must be unconditional (no requires, blocks, or cooldown)")]
    ConditionalFallback(PatternId),
}

/// Per-turn engine failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// No pattern survived filtering. The engine never surfaces this to a
    /// conversation; it exists for callers driving the selector directly.
    #[error("no pattern survived selection at turn {turn}")]
    NoEligiblePattern { turn: u32 },

    /// The assembled context reached the hard ceiling. The generator must
    /// not be invoked with this turn's context.
    #[error(
        "assembled context for conversation {conversation} is {tokens} tokens, \
         {overflow} over the {limit}-token ceiling"
    )]
    OversizedContext {
        conversation: ConversationId,
        tokens: u32,
        limit: u32,
        overflow: u32,
        /// Truncated preview of the rejected payload, for operators.
        preview: String,
    },
}
