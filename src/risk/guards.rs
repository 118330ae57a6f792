//! Soft market-condition guards (C3).
//!
//! These gate on the `OrderContext.guards` subtree populated upstream from
//! live feature rows. Unlike the schema validator, guard failures are
//! accumulated (never short-circuited) so a single `RiskDecision` can carry
//! every reason the order would be rejected for.

use serde::{Deserialize, Serialize};

use super::schema::{Guards, ReasonCode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    pub max_spread_bps: f64,
    pub max_event_lag_sec: f64,
    pub min_activity_tpm: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_spread_bps: 15.0,
            max_event_lag_sec: 2.0,
            min_activity_tpm: 1.0,
        }
    }
}

pub struct GuardCheck {
    pub reason: ReasonCode,
    pub passed: bool,
    pub observed: f64,
    pub limit: f64,
}

/// Runs the three market-condition guards against a [`Guards`] snapshot.
pub struct GuardEvaluator {
    config: GuardConfig,
}

impl GuardEvaluator {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, guards: &Guards) -> Vec<GuardCheck> {
        vec![
            GuardCheck {
                reason: ReasonCode::SpreadTooWide,
                passed: guards.spread_bps <= self.config.max_spread_bps,
                observed: guards.spread_bps,
                limit: self.config.max_spread_bps,
            },
            GuardCheck {
                reason: ReasonCode::LagExceedsCap,
                passed: guards.event_lag_sec <= self.config.max_event_lag_sec,
                observed: guards.event_lag_sec,
                limit: self.config.max_event_lag_sec,
            },
            GuardCheck {
                reason: ReasonCode::MarketInactive,
                passed: guards.activity_tpm >= self.config.min_activity_tpm,
                observed: guards.activity_tpm,
                limit: self.config.min_activity_tpm,
            },
        ]
    }

    /// Convenience used by the Risk Manager: failing reason codes only.
    pub fn failing_reasons(&self, guards: &Guards) -> Vec<String> {
        self.evaluate(guards)
            .into_iter()
            .filter(|c| !c.passed)
            .map(|c| c.reason.to_string())
            .collect()
    }
}

impl Default for GuardEvaluator {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_guards_pass_within_limits() {
        let eval = GuardEvaluator::default();
        let guards = Guards {
            spread_bps: 5.0,
            event_lag_sec: 0.1,
            activity_tpm: 10.0,
        };
        assert!(eval.failing_reasons(&guards).is_empty());
    }

    #[test]
    fn wide_spread_is_flagged() {
        let eval = GuardEvaluator::default();
        let guards = Guards {
            spread_bps: 100.0,
            event_lag_sec: 0.1,
            activity_tpm: 10.0,
        };
        let reasons = eval.failing_reasons(&guards);
        assert_eq!(reasons, vec![ReasonCode::SpreadTooWide.to_string()]);
    }

    #[test]
    fn quiet_market_is_flagged() {
        let eval = GuardEvaluator::default();
        let guards = Guards {
            spread_bps: 5.0,
            event_lag_sec: 0.1,
            activity_tpm: 0.0,
        };
        let reasons = eval.failing_reasons(&guards);
        assert_eq!(reasons, vec![ReasonCode::MarketInactive.to_string()]);
    }

    #[test]
    fn multiple_failures_all_accumulate() {
        let eval = GuardEvaluator::default();
        let guards = Guards {
            spread_bps: 100.0,
            event_lag_sec: 10.0,
            activity_tpm: 0.0,
        };
        assert_eq!(eval.failing_reasons(&guards).len(), 3);
    }
}
