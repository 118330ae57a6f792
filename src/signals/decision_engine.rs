//! Decision Engine (C9): expiry -> cooldown -> gating -> regime -> threshold -> OK.
//!
//! Ported near-verbatim from `decision_engine.py`'s ordered check sequence.
//! Each step either terminates the decision (expiry/cooldown/gating/regime)
//! or narrows the live threshold set the final step evaluates against.
//! Replay safety comes from taking `now_ms` as an explicit argument rather
//! than reading a wall clock, exactly as the Python `decide(..., now_ms=ts_ms)`
//! call from `core_algo.py` does for replay.
//!
//! The regime computed here (step 4, from `z_ofi`/`z_cvd` sign and
//! magnitude) is a distinct concept from `regime::StrategyMode` (C10, an
//! activity-rate classification used for risk-parameter injection) — this
//! module never reads or emits `StrategyMode`.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::signals::schema::DecisionCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEngineConfig {
    pub expiry_ms: i64,
    pub cooldown_ms: i64,
    pub gating_z_ofi: f64,
    pub gating_z_cvd: f64,
    /// Minimum `|z_ofi|` for the TREND classification (step 4).
    pub regime_z_t: f64,
    /// Minimum `|z_ofi|` for the REVERT classification (step 4).
    pub regime_z_r: f64,
    /// Whether a QUIET regime is allowed to proceed to threshold, or is
    /// rejected outright as `BAD_REGIME`.
    pub allow_quiet: bool,
    /// Whether `div_type ∈ {bull, bear}` may satisfy gating when the strong
    /// z-score path fails.
    pub enable_divergence_gating: bool,
    pub entry_trend: f64,
    pub entry_revert: f64,
    pub entry_quiet: f64,
    pub cooldown_after_exit_sec: f64,
}

impl Default for DecisionEngineConfig {
    fn default() -> Self {
        Self {
            expiry_ms: 5_000,
            cooldown_ms: 2_000,
            gating_z_ofi: 1.5,
            gating_z_cvd: 1.5,
            regime_z_t: 1.2,
            regime_z_r: 1.2,
            allow_quiet: true,
            enable_divergence_gating: true,
            entry_trend: 1.2,
            entry_revert: 1.2,
            entry_quiet: 1.8,
            cooldown_after_exit_sec: 0.0,
        }
    }
}

pub struct DecisionOutcome {
    pub decision_code: DecisionCode,
    pub gating: u8,
    pub direction: i8,
    /// One of `trend`, `revert`, `quiet`, `unknown` (§3.2) — never a
    /// `StrategyMode` string.
    pub regime: String,
    pub cooldown_ms: i64,
    pub expiry_ms: i64,
    pub reasons: Vec<String>,
}

/// Per-symbol state the ordered checks consult: last decided ts (cooldown)
/// and last recorded exit ts (`record_exit`, an explicit hook that is never
/// auto-invoked by `decide`).
#[derive(Default)]
struct SymbolState {
    last_decision_ts_ms: Option<i64>,
    last_exit_ts_ms: Option<i64>,
}

pub struct DecisionEngine {
    config: DecisionEngineConfig,
    state: RwLock<HashMap<String, SymbolState>>,
}

impl DecisionEngine {
    pub fn new(config: DecisionEngineConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Explicit exit hook. Only meaningful when `cooldown_after_exit_sec > 0`.
    pub fn record_exit(&self, symbol: &str, ts_ms: i64) {
        if self.config.cooldown_after_exit_sec <= 0.0 {
            return;
        }
        let mut state = self.state.write();
        state.entry(symbol.to_string()).or_default().last_exit_ts_ms = Some(ts_ms);
    }

    /// Step 4: z-score regime classification — TREND if `z_ofi`/`z_cvd`
    /// agree in sign above `regime_z_t`, REVERT if they disagree above
    /// `regime_z_r`, else QUIET.
    fn classify_regime(&self, z_ofi: f64, z_cvd: f64) -> &'static str {
        if z_ofi.abs() >= self.config.regime_z_t && z_ofi.signum() == z_cvd.signum() {
            "trend"
        } else if z_ofi.abs() >= self.config.regime_z_r && z_ofi.signum() != z_cvd.signum() {
            "revert"
        } else {
            "quiet"
        }
    }

    fn thresholds_for_regime(&self, regime: &str) -> f64 {
        match regime {
            "trend" => self.config.entry_trend,
            "revert" => self.config.entry_revert,
            "quiet" => self.config.entry_quiet,
            _ => self.config.entry_trend,
        }
    }

    /// Runs the six-step ordered decision. `now_ms` drives expiry/cooldown
    /// so the same call is replay-safe when fed a recorded clock.
    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &self,
        ts_ms: i64,
        symbol: &str,
        score: f64,
        z_ofi: f64,
        z_cvd: f64,
        div_type: Option<&str>,
        now_ms: i64,
    ) -> DecisionOutcome {
        // Step 1: expiry.
        if now_ms - ts_ms > self.config.expiry_ms {
            return DecisionOutcome {
                decision_code: DecisionCode::Expire,
                gating: 0,
                direction: 0,
                regime: "unknown".to_string(),
                cooldown_ms: self.config.cooldown_ms,
                expiry_ms: self.config.expiry_ms,
                reasons: vec!["expired".to_string()],
            };
        }

        let mut state = self.state.write();
        let symbol_state = state.entry(symbol.to_string()).or_default();

        // Step 2: cooldown (since the last decision, and since the last
        // recorded exit when configured).
        if let Some(last_ts) = symbol_state.last_decision_ts_ms {
            let remaining = self.config.cooldown_ms - (now_ms - last_ts);
            if remaining > 0 {
                return DecisionOutcome {
                    decision_code: DecisionCode::Cooldown,
                    gating: 0,
                    direction: 0,
                    regime: "unknown".to_string(),
                    cooldown_ms: remaining,
                    expiry_ms: self.config.expiry_ms,
                    reasons: vec!["cooldown".to_string()],
                };
            }
        }
        if self.config.cooldown_after_exit_sec > 0.0 {
            if let Some(exit_ts) = symbol_state.last_exit_ts_ms {
                let elapsed_sec = (now_ms - exit_ts) as f64 / 1000.0;
                if elapsed_sec < self.config.cooldown_after_exit_sec {
                    let remaining_ms = ((self.config.cooldown_after_exit_sec - elapsed_sec) * 1000.0).max(0.0) as i64;
                    return DecisionOutcome {
                        decision_code: DecisionCode::Cooldown,
                        gating: 0,
                        direction: 0,
                        regime: "unknown".to_string(),
                        cooldown_ms: remaining_ms,
                        expiry_ms: self.config.expiry_ms,
                        reasons: vec!["cooldown_after_exit".to_string()],
                    };
                }
            }
        }

        // Step 3: gating — strong z-score path, else the divergence-alt path.
        let mut reasons = Vec::new();
        if z_ofi.abs() < self.config.gating_z_ofi {
            reasons.push("reason:z_ofi_below_gate".to_string());
        }
        if z_cvd.abs() < self.config.gating_z_cvd {
            reasons.push("reason:z_cvd_below_gate".to_string());
        }
        let strong_gate_passed = reasons.is_empty();
        let divergence_gate_passed =
            self.config.enable_divergence_gating && matches!(div_type, Some("bull") | Some("bear"));

        if !strong_gate_passed && !divergence_gate_passed {
            symbol_state.last_decision_ts_ms = Some(now_ms);
            return DecisionOutcome {
                decision_code: DecisionCode::FailGating,
                gating: 0,
                direction: 0,
                regime: "unknown".to_string(),
                cooldown_ms: self.config.cooldown_ms,
                expiry_ms: self.config.expiry_ms,
                reasons,
            };
        }

        // Step 4: regime classification.
        let regime = self.classify_regime(z_ofi, z_cvd).to_string();
        if regime == "quiet" && !self.config.allow_quiet {
            symbol_state.last_decision_ts_ms = Some(now_ms);
            return DecisionOutcome {
                decision_code: DecisionCode::BadRegime,
                gating: 1,
                direction: 0,
                regime,
                cooldown_ms: self.config.cooldown_ms,
                expiry_ms: self.config.expiry_ms,
                reasons: vec!["bad_regime".to_string()],
            };
        }

        // Step 5: per-regime entry threshold.
        let threshold = self.thresholds_for_regime(&regime);
        if score.abs() < threshold {
            symbol_state.last_decision_ts_ms = Some(now_ms);
            return DecisionOutcome {
                decision_code: DecisionCode::LowScore,
                gating: 1,
                direction: 0,
                regime,
                cooldown_ms: self.config.cooldown_ms,
                expiry_ms: self.config.expiry_ms,
                reasons: vec!["low_score".to_string()],
            };
        }

        // Step 6: OK.
        symbol_state.last_decision_ts_ms = Some(now_ms);
        let direction = if score > 0.0 { 1 } else { -1 };
        DecisionOutcome {
            decision_code: DecisionCode::Ok,
            gating: 1,
            direction,
            regime,
            cooldown_ms: self.config.cooldown_ms,
            expiry_ms: self.config.expiry_ms,
            reasons: vec![],
        }
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DecisionEngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_ok() {
        let engine = DecisionEngine::default();
        let outcome = engine.decide(1_000, "BTCUSDT", 2.0, 2.0, 2.0, None, 1_000);
        assert_eq!(outcome.decision_code, DecisionCode::Ok);
        assert_eq!(outcome.gating, 1);
        assert_eq!(outcome.direction, 1);
        assert_eq!(outcome.regime, "trend");
    }

    #[test]
    fn fail_gating_on_weak_zscores() {
        let engine = DecisionEngine::default();
        let outcome = engine.decide(1_000, "BTCUSDT", 2.0, 0.1, 0.1, None, 1_000);
        assert_eq!(outcome.decision_code, DecisionCode::FailGating);
        assert_eq!(outcome.gating, 0);
    }

    #[test]
    fn divergence_alt_path_passes_gating_with_weak_zscores() {
        let engine = DecisionEngine::default();
        let outcome = engine.decide(1_000, "BTCUSDT", 2.0, 0.1, 0.1, Some("bull"), 1_000);
        assert_ne!(outcome.decision_code, DecisionCode::FailGating);
    }

    #[test]
    fn quiet_regime_rejected_when_not_allowed() {
        let engine = DecisionEngine::new(DecisionEngineConfig {
            gating_z_ofi: 0.0,
            gating_z_cvd: 0.0,
            allow_quiet: false,
            ..DecisionEngineConfig::default()
        });
        // z_ofi/z_cvd both below regime_z_t/z_r so classify_regime -> quiet.
        let outcome = engine.decide(1_000, "BTCUSDT", 2.0, 0.5, 0.5, None, 1_000);
        assert_eq!(outcome.decision_code, DecisionCode::BadRegime);
        assert_eq!(outcome.regime, "quiet");
    }

    #[test]
    fn low_score_below_entry_threshold() {
        let engine = DecisionEngine::default();
        let outcome = engine.decide(1_000, "BTCUSDT", 0.1, 2.0, 2.0, None, 1_000);
        assert_eq!(outcome.decision_code, DecisionCode::LowScore);
        assert_eq!(outcome.gating, 1);
    }

    #[test]
    fn cooldown_after_ok_blocks_next_decision() {
        let engine = DecisionEngine::default();
        let first = engine.decide(1_000, "BTCUSDT", 2.0, 2.0, 2.0, None, 1_000);
        assert_eq!(first.decision_code, DecisionCode::Ok);

        let second = engine.decide(1_500, "BTCUSDT", 2.0, 2.0, 2.0, None, 1_500);
        assert_eq!(second.decision_code, DecisionCode::Cooldown);
        assert!(second.cooldown_ms > 0);
    }

    #[test]
    fn expire_via_replay_stale_clock() {
        let engine = DecisionEngine::default();
        let outcome = engine.decide(1_000, "BTCUSDT", 2.0, 2.0, 2.0, None, 10_000);
        assert_eq!(outcome.decision_code, DecisionCode::Expire);
    }

    #[test]
    fn cooldown_after_exit_when_configured() {
        let engine = DecisionEngine::new(DecisionEngineConfig {
            cooldown_after_exit_sec: 5.0,
            ..DecisionEngineConfig::default()
        });
        engine.record_exit("BTCUSDT", 1_000);
        let outcome = engine.decide(3_000, "BTCUSDT", 2.0, 2.0, 2.0, None, 3_000);
        assert_eq!(outcome.decision_code, DecisionCode::Cooldown);
    }
}
