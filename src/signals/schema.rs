//! Signal v2 schema (§3.2): the record written to both sinks in C11.
//!
//! The one invariant every constructor enforces: `confirm == true` implies
//! `gating == 1` and `decision_code == DecisionCode::Ok`. A signal that
//! violates it is a programming error in the pipeline, not a data problem,
//! so `SignalV2::new` panics rather than silently repairing it — mirrors how
//! `decision_engine.py` treats that invariant as load-bearing, never
//! defensive-coded around downstream.

use serde::{Deserialize, Serialize};

/// The six terminal decision codes the Decision Engine (C9) may emit. The
/// wire representation is the literal uppercase spec string, not the Rust
/// variant name, so serialization is hand-rolled rather than derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionCode {
    Ok,
    FailGating,
    Cooldown,
    Expire,
    LowScore,
    BadRegime,
}

impl DecisionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionCode::Ok => "OK",
            DecisionCode::FailGating => "FAIL_GATING",
            DecisionCode::Cooldown => "COOLDOWN",
            DecisionCode::Expire => "EXPIRE",
            DecisionCode::LowScore => "LOW_SCORE",
            DecisionCode::BadRegime => "BAD_REGIME",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "OK" => Some(DecisionCode::Ok),
            "FAIL_GATING" => Some(DecisionCode::FailGating),
            "COOLDOWN" => Some(DecisionCode::Cooldown),
            "EXPIRE" => Some(DecisionCode::Expire),
            "LOW_SCORE" => Some(DecisionCode::LowScore),
            "BAD_REGIME" => Some(DecisionCode::BadRegime),
            _ => None,
        }
    }
}

impl std::fmt::Display for DecisionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DecisionCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DecisionCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DecisionCode::from_str(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown decision_code: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Strong,
    Normal,
    Weak,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Strong => "strong",
            QualityTier::Normal => "normal",
            QualityTier::Weak => "weak",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalMeta {
    pub window_ms: u64,
    pub features_ver: String,
    pub rules_ver: String,
    pub quality_tier: String,
    pub quality_flags: Vec<String>,
}

/// A fully-decided signal row, ready for C11 to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalV2 {
    pub signal_id: String,
    pub run_id: String,
    pub symbol: String,
    pub ts_ms: i64,
    pub score: f64,
    pub z_ofi: f64,
    pub z_cvd: f64,
    pub div_type: Option<String>,
    pub direction: i8,
    pub side_hint: String,
    pub consistency: f64,
    pub regime: String,
    pub gating: u8,
    pub decision_code: DecisionCode,
    pub decision_reason: Option<String>,
    pub confirm: bool,
    pub gate_reasons: Vec<String>,
    pub cooldown_ms: i64,
    pub expiry_ms: i64,
    pub config_hash: String,
    pub schema_version: String,
    pub meta: SignalMeta,
}

impl SignalV2 {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signal_id: String,
        run_id: String,
        symbol: String,
        ts_ms: i64,
        score: f64,
        z_ofi: f64,
        z_cvd: f64,
        div_type: Option<String>,
        direction: i8,
        consistency: f64,
        regime: String,
        gating: u8,
        decision_code: DecisionCode,
        decision_reason: Option<String>,
        confirm: bool,
        gate_reasons: Vec<String>,
        cooldown_ms: i64,
        expiry_ms: i64,
        config_hash: String,
        meta: SignalMeta,
    ) -> Self {
        if confirm {
            assert_eq!(gating, 1, "confirm=true requires gating=1");
            assert_eq!(
                decision_code,
                DecisionCode::Ok,
                "confirm=true requires decision_code=OK"
            );
        }
        let side_hint = match direction.signum() {
            1 => "buy",
            -1 => "sell",
            _ => "flat",
        }
        .to_string();
        Self {
            signal_id,
            run_id,
            symbol,
            ts_ms,
            score,
            z_ofi,
            z_cvd,
            div_type,
            direction,
            side_hint,
            consistency,
            regime,
            gating,
            decision_code,
            decision_reason,
            confirm,
            gate_reasons,
            cooldown_ms,
            expiry_ms,
            config_hash,
            schema_version: "signal/v2".to_string(),
            meta,
        }
    }

    pub fn check_invariant(&self) -> bool {
        if self.confirm {
            self.gating == 1 && self.decision_code == DecisionCode::Ok
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> (String, String, String, i64, f64, f64, f64, Option<String>) {
        (
            "run-BTCUSDT-1-1".to_string(),
            "run".to_string(),
            "BTCUSDT".to_string(),
            1_700_000_000_000,
            1.5,
            2.0,
            2.1,
            None,
        )
    }

    #[test]
    fn confirmed_signal_satisfies_invariant() {
        let (signal_id, run_id, symbol, ts_ms, score, z_ofi, z_cvd, div_type) = base();
        let signal = SignalV2::new(
            signal_id,
            run_id,
            symbol,
            ts_ms,
            score,
            z_ofi,
            z_cvd,
            div_type,
            1,
            0.8,
            "trend".to_string(),
            1,
            DecisionCode::Ok,
            None,
            true,
            vec![],
            30_000,
            60_000,
            "abc123".to_string(),
            SignalMeta::default(),
        );
        assert!(signal.check_invariant());
        assert_eq!(signal.side_hint, "buy");
        assert_eq!(signal.schema_version, "signal/v2");
    }

    #[test]
    #[should_panic(expected = "confirm=true requires gating=1")]
    fn confirm_true_with_gating_zero_panics() {
        let (signal_id, run_id, symbol, ts_ms, score, z_ofi, z_cvd, div_type) = base();
        SignalV2::new(
            signal_id,
            run_id,
            symbol,
            ts_ms,
            score,
            z_ofi,
            z_cvd,
            div_type,
            1,
            0.8,
            "trend".to_string(),
            0,
            DecisionCode::Ok,
            None,
            true,
            vec![],
            30_000,
            60_000,
            "abc123".to_string(),
            SignalMeta::default(),
        );
    }

    #[test]
    fn unconfirmed_signal_may_carry_any_decision_code() {
        let (signal_id, run_id, symbol, ts_ms, score, z_ofi, z_cvd, div_type) = base();
        let signal = SignalV2::new(
            signal_id,
            run_id,
            symbol,
            ts_ms,
            score,
            z_ofi,
            z_cvd,
            div_type,
            0,
            0.1,
            "quiet".to_string(),
            0,
            DecisionCode::FailGating,
            Some("reason:z_ofi_below_gate".to_string()),
            false,
            vec!["spread_too_wide".to_string()],
            2_000,
            5_000,
            "abc123".to_string(),
            SignalMeta::default(),
        );
        assert!(signal.check_invariant());
        assert_eq!(signal.side_hint, "flat");
    }
}
