//! Core composition root: bundles the Risk Manager and Signal pipeline.
//!
//! No singletons or `lazy_static` globals here — every collaborator is
//! constructed once in [`Core::new`] and shared via `Arc` where a consumer
//! needs its own handle, the same explicit-composition shape the teacher's
//! `main.rs` builds its `AppState` with.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::risk::injector::StrategyModeInjector;
use crate::risk::manager::RiskManager;
use crate::risk::position::PositionManager;
use crate::risk::shadow::ShadowComparator;
use crate::signals::core_algorithm::{CoreAlgorithm, CoreAlgorithmConfig};
use crate::signals::decision_engine::DecisionEngine;
use crate::signals::regime::RegimeClassifier;
use crate::signals::writer::SignalWriter;

pub struct Core {
    pub config: AppConfig,
    pub risk_manager: Arc<RiskManager>,
    pub core_algorithm: Arc<CoreAlgorithm>,
}

impl Core {
    pub fn new(config: AppConfig, config_hash: String) -> Self {
        let injector = StrategyModeInjector::new(config.risk_params.clone());
        let position = PositionManager::new(config.position_config());
        let shadow = ShadowComparator::new(config.shadow);
        let risk_manager = Arc::new(RiskManager::new(injector, position, shadow));

        let regime = RegimeClassifier::default();
        let decision_engine = DecisionEngine::new(config.decision_engine.clone());
        let writer = SignalWriter::new(config.writer.clone());
        let mut core_algorithm_config: CoreAlgorithmConfig = config.core_algorithm.clone();
        core_algorithm_config.run_id = config.run_id.clone();
        let core_algorithm = Arc::new(CoreAlgorithm::new(
            core_algorithm_config,
            config.guard_config(),
            regime,
            decision_engine,
            writer,
            config_hash,
        ));

        Self {
            config,
            risk_manager,
            core_algorithm,
        }
    }
}
