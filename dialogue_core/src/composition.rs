//! Situational composition - the continuous mixture of conversational modes.
//!
//! There is no discrete "current phase". The conversation is always a blend
//! of eight modes, held as a normalized weight vector: reinforced modes gain
//! weight, unreinforced modes decay at per-mode rates, and the vector is
//! renormalized after every update so it sums to 1.0.

use serde::{Deserialize, Serialize};

/// The eight conversational modes of an assessment dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Learning about the user's business.
    Discovery,
    /// Explaining concepts and process.
    Education,
    /// Evaluating captured information.
    Assessment,
    /// Advising on next steps.
    Recommendation,
    /// Orienting the user in the process.
    Navigation,
    /// Repairing confusion or frustration.
    ErrorRecovery,
    /// Trust and relationship maintenance.
    Rapport,
    /// Talking about the produced report.
    Reporting,
}

impl Mode {
    /// All modes in canonical (index) order.
    pub const ALL: [Mode; 8] = [
        Mode::Discovery,
        Mode::Education,
        Mode::Assessment,
        Mode::Recommendation,
        Mode::Navigation,
        Mode::ErrorRecovery,
        Mode::Rapport,
        Mode::Reporting,
    ];

    /// Stable snake_case key, used in catalogs and history entries.
    pub fn key(&self) -> &'static str {
        match self {
            Mode::Discovery => "discovery",
            Mode::Education => "education",
            Mode::Assessment => "assessment",
            Mode::Recommendation => "recommendation",
            Mode::Navigation => "navigation",
            Mode::ErrorRecovery => "error_recovery",
            Mode::Rapport => "rapport",
            Mode::Reporting => "reporting",
        }
    }

    /// Parse a mode from its stable key.
    pub fn from_key(key: &str) -> Option<Mode> {
        Mode::ALL.iter().copied().find(|m| m.key() == key)
    }

    /// Position in [`Mode::ALL`].
    pub fn index(&self) -> usize {
        Mode::ALL.iter().position(|m| m == self).unwrap_or(0)
    }

    /// Per-turn decay factor when the mode is not reinforced. Error
    /// recovery fades fastest so a resolved incident quickly cedes
    /// priority; education fades slowest.
    pub fn default_decay(&self) -> f32 {
        match self {
            Mode::ErrorRecovery => 0.70,
            Mode::Navigation => 0.80,
            Mode::Recommendation => 0.85,
            Mode::Rapport => 0.85,
            Mode::Reporting => 0.85,
            Mode::Discovery => 0.90,
            Mode::Assessment => 0.90,
            Mode::Education => 0.95,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A weight per mode, used both for trigger/pattern affinities and for
/// composition reinforcement profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AffinityVector([f32; 8]);

impl AffinityVector {
    /// Create a zero vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one mode's weight, clamped to [0, 1].
    pub fn with(mut self, mode: Mode, weight: f32) -> Self {
        self.0[mode.index()] = weight.clamp(0.0, 1.0);
        self
    }

    /// Get one mode's weight.
    pub fn get(&self, mode: Mode) -> f32 {
        self.0[mode.index()]
    }

    /// Raise one mode's weight to at least `weight`.
    pub fn raise(&mut self, mode: Mode, weight: f32) {
        let slot = &mut self.0[mode.index()];
        *slot = slot.max(weight.clamp(0.0, 1.0));
    }

    /// The mode with the highest weight, if any weight is positive. Ties
    /// resolve to the earlier mode in canonical order.
    pub fn dominant(&self) -> Option<Mode> {
        let mut best: Option<(Mode, f32)> = None;
        for mode in Mode::ALL {
            let weight = self.get(mode);
            if weight > 0.0 && best.map_or(true, |(_, w)| weight > w) {
                best = Some((mode, weight));
            }
        }
        best.map(|(mode, _)| mode)
    }

    /// Whether every weight is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|w| *w == 0.0)
    }

    /// Iterate (mode, weight) pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Mode, f32)> + '_ {
        Mode::ALL.iter().map(move |m| (*m, self.get(*m)))
    }
}

/// Configuration for the composition update rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionConfig {
    /// Scale applied to reinforcement weights before they are added.
    pub reinforcement_boost: f32,

    /// Per-mode decay factors in [`Mode::ALL`] order.
    pub decay: [f32; 8],
}

impl Default for CompositionConfig {
    fn default() -> Self {
        let mut decay = [0.0; 8];
        for mode in Mode::ALL {
            decay[mode.index()] = mode.default_decay();
        }
        Self {
            reinforcement_boost: 0.6,
            decay,
        }
    }
}

/// Tolerance for the sum-to-one invariant.
pub const NORMALIZATION_EPSILON: f32 = 1e-6;

/// The normalized mode mixture for one conversation.
///
/// Invariant: weights sum to 1.0 ± [`NORMALIZATION_EPSILON`] at all times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    weights: [f32; 8],
}

impl Composition {
    /// The fixed turn-1 prior: discovery and education split evenly.
    pub fn initial() -> Self {
        let mut weights = [0.0; 8];
        weights[Mode::Discovery.index()] = 0.5;
        weights[Mode::Education.index()] = 0.5;
        Self { weights }
    }

    /// One mode's current share of the mixture.
    pub fn get(&self, mode: Mode) -> f32 {
        self.weights[mode.index()]
    }

    /// Sum of all weights; 1.0 up to the epsilon.
    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }

    /// The currently strongest mode. Ties resolve to canonical order.
    pub fn dominant(&self) -> Mode {
        let mut best = Mode::Discovery;
        for mode in Mode::ALL {
            if self.get(mode) > self.get(best) {
                best = mode;
            }
        }
        best
    }

    /// Whether the sum-to-one invariant currently holds.
    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= NORMALIZATION_EPSILON
    }

    /// Apply one turn of reinforcement and decay, then renormalize.
    ///
    /// Modes with a positive reinforcement weight gain
    /// `boost * reinforcement`, clamped to 1.0 before normalization; all
    /// other modes decay by their per-mode factor.
    pub fn update(&mut self, reinforcement: &AffinityVector, config: &CompositionConfig) {
        for mode in Mode::ALL {
            let index = mode.index();
            let gain = reinforcement.get(mode);
            if gain > 0.0 {
                self.weights[index] =
                    (self.weights[index] + config.reinforcement_boost * gain).min(1.0);
            } else {
                self.weights[index] *= config.decay[index];
            }
        }
        self.normalize();
    }

    /// Reset to the turn-1 prior. Only an explicit restart calls this; the
    /// mixture never reaches a terminal state on its own.
    pub fn reset(&mut self) {
        *self = Composition::initial();
    }

    fn normalize(&mut self) {
        let sum = self.sum();
        if sum <= NORMALIZATION_EPSILON {
            self.reset();
            return;
        }
        for weight in &mut self.weights {
            *weight /= sum;
        }
    }
}

impl Default for Composition {
    fn default() -> Self {
        Self::initial()
    }
}
