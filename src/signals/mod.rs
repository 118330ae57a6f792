//! Decision engine and core algorithm: C9-C13.

pub mod config_hash;
pub mod core_algorithm;
pub mod decision_engine;
pub mod regime;
pub mod schema;
pub mod writer;

pub use core_algorithm::{CoreAlgorithm, CoreAlgorithmConfig, FeatureRow};
pub use decision_engine::{DecisionEngine, DecisionEngineConfig, DecisionOutcome};
pub use regime::{RegimeClassifier, RegimeConfig, StrategyMode};
pub use schema::{DecisionCode, QualityTier, SignalMeta, SignalV2};
pub use writer::{SignalWriter, SignalWriterConfig, SinkKind};
