//! Configuration loading (§6.5 ambient stack): `.env` via `dotenv`, process
//! environment variables, and an optional `core.toml` overlay read with
//! `toml`/`serde`, the same trio the teacher's `main.rs` already pulls in.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskCoreError};
use crate::risk::guards::GuardConfig;
use crate::risk::injector::RiskParams;
use crate::risk::position::PositionConfig;
use crate::risk::shadow::ShadowConfig;
use crate::risk::stops::StopsConfig;
use crate::signals::core_algorithm::CoreAlgorithmConfig;
use crate::signals::decision_engine::DecisionEngineConfig;
use crate::signals::writer::{SignalWriterConfig, SinkKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub run_id: String,
    pub decision_engine: DecisionEngineConfig,
    pub core_algorithm: CoreAlgorithmConfig,
    pub risk_params: RiskParams,
    pub shadow: ShadowConfig,
    pub writer: SignalWriterConfig,
    pub report_tz: String,
    pub http_bind: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            run_id: "run".to_string(),
            decision_engine: DecisionEngineConfig::default(),
            core_algorithm: CoreAlgorithmConfig::default(),
            risk_params: RiskParams::default(),
            shadow: ShadowConfig::default(),
            writer: SignalWriterConfig::default(),
            report_tz: "UTC".to_string(),
            http_bind: "0.0.0.0:8080".to_string(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    /// Loads `.env` (best-effort, missing file is not an error), then layers
    /// process environment variables over the defaults, then applies an
    /// optional `core.toml` overlay for fields env vars don't cover.
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = AppConfig::default();
        config.run_id = env_string_or("RUN_ID", &config.run_id);
        config.report_tz = env_string_or("REPORT_TZ", &config.report_tz);

        config.decision_engine.expiry_ms = env_or("CORE_EXPIRY_MS", config.decision_engine.expiry_ms);
        config.decision_engine.cooldown_ms = env_or("CORE_COOLDOWN_MS", config.decision_engine.cooldown_ms);
        config.decision_engine.gating_z_ofi = env_or("CORE_GATING_Z_OFI", config.decision_engine.gating_z_ofi);
        config.decision_engine.gating_z_cvd = env_or("CORE_GATING_Z_CVD", config.decision_engine.gating_z_cvd);
        config.decision_engine.entry_trend = env_or("CORE_ENTRY_TREND", config.decision_engine.entry_trend);
        config.decision_engine.entry_revert = env_or("CORE_ENTRY_REVERT", config.decision_engine.entry_revert);
        config.decision_engine.entry_quiet = env_or("CORE_ENTRY_QUIET", config.decision_engine.entry_quiet);

        config.core_algorithm.run_id = config.run_id.clone();
        config.core_algorithm.rules_ver = env_string_or("CORE_RULES_VER", &config.core_algorithm.rules_ver);
        config.core_algorithm.features_ver =
            env_string_or("CORE_FEATURES_VER", &config.core_algorithm.features_ver);

        config.writer.sqlite_batch_n = env_or("SQLITE_BATCH_N", config.writer.sqlite_batch_n);
        config.writer.sqlite_flush_ms = env_or("SQLITE_FLUSH_MS", config.writer.sqlite_flush_ms);
        config.writer.fsync_every_n = env_or("FSYNC_EVERY_N", config.writer.fsync_every_n);
        config.writer.sink_kind = SinkKind::from_env_str(&env_string_or("V13_SINK", "dual"));
        config.writer.output_dir = std::path::PathBuf::from(env_string_or(
            "V13_OUTPUT_DIR",
            &config.writer.output_dir.to_string_lossy(),
        ));

        if let Some(path) = toml_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path).map_err(|e| RiskCoreError::Config(e.to_string()))?;
                let overlay: TomlOverlay = toml::from_str(&contents).map_err(|e| RiskCoreError::Config(e.to_string()))?;
                overlay.apply(&mut config);
            }
        }

        Ok(config)
    }

    pub fn guard_config(&self) -> GuardConfig {
        self.risk_params.guard.clone()
    }

    pub fn position_config(&self) -> PositionConfig {
        self.risk_params.position.clone()
    }

    pub fn stops_config(&self) -> StopsConfig {
        self.risk_params.stops.clone()
    }
}

/// Partial overlay deserialized from `core.toml`; every field optional so a
/// file only needs to carry the keys it wants to override.
#[derive(Debug, Default, Deserialize)]
struct TomlOverlay {
    http_bind: Option<String>,
    max_spread_bps: Option<f64>,
    max_notional_per_symbol: Option<f64>,
}

impl TomlOverlay {
    fn apply(self, config: &mut AppConfig) {
        if let Some(bind) = self.http_bind {
            config.http_bind = bind;
        }
        if let Some(v) = self.max_spread_bps {
            config.risk_params.guard.max_spread_bps = v;
        }
        if let Some(v) = self.max_notional_per_symbol {
            config.risk_params.position.max_notional_per_symbol = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_env_or_toml() {
        let config = AppConfig::default();
        assert_eq!(config.run_id, "run");
        assert_eq!(config.decision_engine.expiry_ms, 5_000);
    }

    #[test]
    fn toml_overlay_applies_selected_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("core.toml");
        std::fs::write(&path, "http_bind = \"127.0.0.1:9000\"\nmax_spread_bps = 42.0\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.http_bind, "127.0.0.1:9000");
        assert_eq!(config.risk_params.guard.max_spread_bps, 42.0);
    }
}
