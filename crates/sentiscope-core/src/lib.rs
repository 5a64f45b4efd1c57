//! Core types for sentiscope: raw classifier scores, the three-way decision
//! policy, and input/engine configuration.

pub mod config;
pub mod input;
pub mod policy;
pub mod score;

pub use config::{Backend, EngineConfig};
pub use input::InputPolicy;
pub use policy::{
    DEFAULT_MIN_CONFIDENCE, DEFAULT_NEUTRAL_MARGIN, Decision, DecisionPolicy, PolicyError,
    Sentiment,
};
pub use score::{RawOutput, RawScoreSet, ScoreEntry};
