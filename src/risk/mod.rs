//! Pre-trade risk gating: schema validation, guards, position, stops, regime
//! injection, and shadow comparison (C2-C8).

pub mod guards;
pub mod injector;
pub mod manager;
pub mod position;
pub mod schema;
pub mod shadow;
pub mod stops;

pub use guards::{GuardConfig, GuardEvaluator};
pub use injector::{RiskParams, StrategyModeInjector};
pub use manager::RiskManager;
pub use position::{PositionConfig, PositionManager};
pub use schema::{OrderContext, ReasonCode, RiskDecision, SchemaValidator};
pub use shadow::{ShadowComparator, ShadowConfig, ShadowLevel};
pub use stops::{StopsConfig, StopsEvaluator};
