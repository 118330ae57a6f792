//! CoreAlgorithm pipeline (C13): feature row in, `SignalV2` out.
//!
//! Ported from `core_algo.py`'s `process_feature_row` / `_process_feature_row_v2`:
//! dedup -> score fusion -> consistency (with floor) -> regime -> gating
//! reasons -> direction -> quality tier -> confirm-v2 -> direction streak ->
//! handoff to the Decision Engine -> construct and emit `SignalV2`.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::risk::guards::{GuardConfig, GuardEvaluator};
use crate::risk::schema::Guards;
use crate::signals::config_hash::SignalIdGenerator;
use crate::signals::decision_engine::DecisionEngine;
use crate::signals::regime::RegimeClassifier;
use crate::signals::schema::{DecisionCode, QualityTier, SignalMeta, SignalV2};
use crate::signals::writer::SignalWriter;

/// Feature Row (§3.1): the raw per-tick input to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    pub symbol: String,
    pub ts_ms: i64,
    pub z_ofi: Option<f64>,
    pub z_cvd: Option<f64>,
    pub fusion_score: Option<f64>,
    pub div_type: Option<String>,
    pub spread_bps: f64,
    pub event_lag_sec: f64,
    pub activity_tpm: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreAlgorithmConfig {
    pub run_id: String,
    pub features_ver: String,
    pub rules_ver: String,
    pub window_ms: u64,
    pub dedupe_ms: i64,
    pub w_ofi: f64,
    pub w_cvd: f64,
    pub recompute_fusion: bool,
    pub strong_threshold: f64,
    pub weak_signal_threshold: f64,
    pub consistency_floor_when_abs_score_ge: f64,
    pub consistency_floor_strong: f64,
    pub consistency_floor_with_divergence: f64,
    pub min_consecutive_same_dir: u32,
}

impl Default for CoreAlgorithmConfig {
    fn default() -> Self {
        Self {
            run_id: "run".to_string(),
            features_ver: "v1".to_string(),
            rules_ver: "v1".to_string(),
            window_ms: 1_000,
            dedupe_ms: 50,
            w_ofi: 0.5,
            w_cvd: 0.5,
            recompute_fusion: true,
            strong_threshold: 3.0,
            weak_signal_threshold: 1.0,
            consistency_floor_when_abs_score_ge: 0.4,
            consistency_floor_strong: 0.10,
            consistency_floor_with_divergence: 0.12,
            min_consecutive_same_dir: 1,
        }
    }
}

#[derive(Default)]
struct SymbolPipelineState {
    last_ts_ms: Option<i64>,
    last_direction: i8,
    direction_streak: u32,
    signal_seq: u64,
}

/// Ties together dedup/score-fusion/consistency/regime/gating/confirm and
/// the handoff to the Decision Engine and Signal Writer.
pub struct CoreAlgorithm {
    config: CoreAlgorithmConfig,
    guard_evaluator: GuardEvaluator,
    regime: RegimeClassifier,
    decision_engine: DecisionEngine,
    writer: SignalWriter,
    id_gen: SignalIdGenerator,
    config_hash: String,
    state: Mutex<HashMap<String, SymbolPipelineState>>,
}

impl CoreAlgorithm {
    pub fn new(
        config: CoreAlgorithmConfig,
        guard_config: GuardConfig,
        regime: RegimeClassifier,
        decision_engine: DecisionEngine,
        writer: SignalWriter,
        config_hash: String,
    ) -> Self {
        Self {
            config,
            guard_evaluator: GuardEvaluator::new(guard_config),
            regime,
            decision_engine,
            writer,
            id_gen: SignalIdGenerator::new(),
            config_hash,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn is_duplicate(&self, symbol: &str, ts_ms: i64, state: &mut SymbolPipelineState) -> bool {
        match state.last_ts_ms {
            Some(last) if (ts_ms - last).abs() < self.config.dedupe_ms => true,
            _ => {
                state.last_ts_ms = Some(ts_ms);
                false
            }
        }
    }

    fn resolve_score(&self, row: &FeatureRow) -> f64 {
        let raw = if self.config.recompute_fusion || row.fusion_score.is_none() {
            let z_ofi = row.z_ofi.unwrap_or(0.0);
            let z_cvd = row.z_cvd.unwrap_or(0.0);
            self.config.w_ofi * (z_ofi / 3.0).tanh() * 5.0 + self.config.w_cvd * (z_cvd / 3.0).tanh() * 5.0
        } else {
            row.fusion_score.unwrap()
        };
        (raw / 3.0).tanh() * 5.0
    }

    fn calculate_consistency(&self, row: &FeatureRow) -> f64 {
        let (z_ofi, z_cvd) = match (row.z_ofi, row.z_cvd) {
            (Some(a), Some(b)) => (a, b),
            _ => return 0.0,
        };
        if z_ofi.signum() != z_cvd.signum() {
            return 0.0;
        }
        let (lo, hi) = if z_ofi.abs() < z_cvd.abs() {
            (z_ofi.abs(), z_cvd.abs())
        } else {
            (z_cvd.abs(), z_ofi.abs())
        };
        if hi <= 0.0 {
            0.0
        } else {
            (lo / hi).clamp(0.0, 1.0)
        }
    }

    fn apply_consistency_floor(&self, consistency: f64, score: f64, row: &FeatureRow) -> f64 {
        if score.abs() >= self.config.consistency_floor_when_abs_score_ge {
            consistency.max(self.config.consistency_floor_strong)
        } else if row.div_type.is_some() {
            consistency.max(self.config.consistency_floor_with_divergence)
        } else {
            consistency
        }
    }

    fn quality_tier(&self, score: f64) -> QualityTier {
        let abs_score = score.abs();
        if abs_score >= self.config.strong_threshold {
            QualityTier::Strong
        } else if abs_score >= self.config.weak_signal_threshold {
            QualityTier::Normal
        } else {
            QualityTier::Weak
        }
    }

    fn direction_streak(&self, direction: i8, state: &mut SymbolPipelineState) -> u32 {
        if direction == 0 {
            state.last_direction = 0;
            state.direction_streak = 0;
        } else if direction == state.last_direction {
            state.direction_streak += 1;
        } else {
            state.last_direction = direction;
            state.direction_streak = 1;
        }
        state.direction_streak
    }

    /// Runs the full pipeline for one feature row. Returns `None` when the
    /// row is dropped as a duplicate.
    pub fn process_feature_row(&self, row: &FeatureRow) -> Option<SignalV2> {
        let mut state_map = self.state.lock();
        let state = state_map.entry(row.symbol.clone()).or_default();

        if self.is_duplicate(&row.symbol, row.ts_ms, state) {
            debug!(symbol = %row.symbol, ts_ms = row.ts_ms, "dropping duplicate feature row");
            return None;
        }

        let score = self.resolve_score(row);
        let raw_consistency = self.calculate_consistency(row);
        let consistency = self.apply_consistency_floor(raw_consistency, score, row);

        // C10's activity-rate StrategyMode is ticked for its own state but
        // never feeds the signal's `regime` field — that belongs solely to
        // the Decision Engine's z-score classification below.
        self.regime.observe_tick(&row.symbol);

        let mut gate_reasons = self.guard_evaluator.failing_reasons(&Guards {
            spread_bps: row.spread_bps,
            event_lag_sec: row.event_lag_sec,
            activity_tpm: row.activity_tpm,
        });
        if consistency < 0.2 {
            gate_reasons.push("low_consistency".to_string());
        }

        let quality_tier = self.quality_tier(score);
        if quality_tier == QualityTier::Weak {
            gate_reasons.push("weak_signal".to_string());
        }

        let z_ofi = row.z_ofi.unwrap_or(0.0);
        let z_cvd = row.z_cvd.unwrap_or(0.0);

        let outcome = self.decision_engine.decide(
            row.ts_ms,
            &row.symbol,
            score,
            z_ofi,
            z_cvd,
            row.div_type.as_deref(),
            row.ts_ms,
        );

        let streak = self.direction_streak(outcome.direction, state);
        let mut reasons = outcome.reasons.clone();
        reasons.extend(gate_reasons.clone());
        if outcome.direction != 0 && streak < self.config.min_consecutive_same_dir {
            reasons.push(format!("reverse_cooldown_insufficient_ticks({streak})"));
        }

        let hard_gate_failed = outcome.decision_code != DecisionCode::Ok;
        let soft_guard_present = !gate_reasons.is_empty();
        let confirm = match quality_tier {
            QualityTier::Weak => false,
            QualityTier::Strong => !hard_gate_failed && streak >= self.config.min_consecutive_same_dir,
            QualityTier::Normal => {
                !hard_gate_failed && !soft_guard_present && streak >= self.config.min_consecutive_same_dir
            }
        };

        let gating = if confirm { 1 } else { outcome.gating };
        let decision_code = if confirm { DecisionCode::Ok } else { outcome.decision_code };
        let decision_reason = if decision_code == DecisionCode::Ok {
            None
        } else {
            reasons.first().cloned()
        };

        let seq = state.signal_seq;
        state.signal_seq += 1;
        drop(state_map);

        let signal_id = self.id_gen.next_id(&self.config.run_id, &row.symbol, row.ts_ms);
        debug!(signal_id = %signal_id, seq, "built signal id");

        let meta = SignalMeta {
            window_ms: self.config.window_ms,
            features_ver: self.config.features_ver.clone(),
            rules_ver: self.config.rules_ver.clone(),
            quality_tier: quality_tier.as_str().to_string(),
            quality_flags: gate_reasons.clone(),
        };

        let signal = SignalV2::new(
            signal_id,
            self.config.run_id.clone(),
            row.symbol.clone(),
            row.ts_ms,
            score,
            z_ofi,
            z_cvd,
            row.div_type.clone(),
            outcome.direction,
            consistency,
            outcome.regime.clone(),
            gating,
            decision_code,
            decision_reason,
            confirm,
            reasons,
            outcome.cooldown_ms,
            outcome.expiry_ms,
            self.config_hash.clone(),
            meta,
        );

        if let Err(e) = self.writer.write(&signal) {
            tracing::error!(error = %e, signal_id = %signal.signal_id, "failed to persist signal");
        }

        Some(signal)
    }

    pub fn record_exit(&self, symbol: &str, ts_ms: i64) {
        self.decision_engine.record_exit(symbol, ts_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::decision_engine::DecisionEngineConfig;
    use crate::signals::writer::{config_for_dir, SinkKind};

    fn algorithm(tmp: &std::path::Path) -> CoreAlgorithm {
        let mut writer_config = config_for_dir(tmp);
        writer_config.sink_kind = SinkKind::Jsonl;
        CoreAlgorithm::new(
            CoreAlgorithmConfig::default(),
            GuardConfig::default(),
            RegimeClassifier::default(),
            DecisionEngine::new(DecisionEngineConfig {
                gating_z_ofi: 1.0,
                gating_z_cvd: 1.0,
                entry_trend: 1.0,
                ..DecisionEngineConfig::default()
            }),
            SignalWriter::new(writer_config),
            "abc123def456".to_string(),
        )
    }

    fn strong_row(ts_ms: i64) -> FeatureRow {
        FeatureRow {
            symbol: "BTCUSDT".to_string(),
            ts_ms,
            z_ofi: Some(3.0),
            z_cvd: Some(3.0),
            fusion_score: None,
            div_type: None,
            spread_bps: 2.0,
            event_lag_sec: 0.1,
            activity_tpm: 10.0,
        }
    }

    #[test]
    fn duplicate_row_within_window_is_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let algo = algorithm(tmp.path());
        assert!(algo.process_feature_row(&strong_row(1_000)).is_some());
        assert!(algo.process_feature_row(&strong_row(1_010)).is_none());
    }

    #[test]
    fn strong_signal_confirms() {
        let tmp = tempfile::tempdir().unwrap();
        let algo = algorithm(tmp.path());
        let signal = algo.process_feature_row(&strong_row(1_000)).unwrap();
        assert!(signal.check_invariant());
    }

    #[test]
    fn missing_zscores_yield_zero_consistency() {
        let tmp = tempfile::tempdir().unwrap();
        let algo = algorithm(tmp.path());
        let mut row = strong_row(1_000);
        row.z_cvd = None;
        let signal = algo.process_feature_row(&row).unwrap();
        assert_eq!(signal.consistency, algo.config.consistency_floor_strong.max(0.0));
    }

    #[test]
    fn opposing_signs_yield_zero_consistency_before_floor() {
        let tmp = tempfile::tempdir().unwrap();
        let algo = algorithm(tmp.path());
        let mut row = strong_row(1_000);
        row.z_ofi = Some(3.0);
        row.z_cvd = Some(-3.0);
        let signal = algo.process_feature_row(&row).unwrap();
        assert!(signal.consistency <= algo.config.consistency_floor_strong + 1e-9);
    }
}
