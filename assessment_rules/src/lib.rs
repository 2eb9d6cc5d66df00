//! # Assessment Rules
//!
//! The "Assessment Bible" crate - contains the knowledge dimensions, value types,
//! and per-conversation state for the Compass assistant. This crate is the single
//! source of truth for conversation memory and does not contain any selection logic.

pub mod knowledge;
pub mod predicate;

pub use knowledge::*;
pub use predicate::*;
