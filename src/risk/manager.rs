//! Risk Manager (C6): orchestrates C2-C5 and C8 into one `RiskDecision`.
//!
//! The pipeline order matches `spec.md` §4.6: schema validation is a hard
//! gate that short-circuits everything else (its failure is the only case
//! where `reason_codes` isn't the union of every check), then guards,
//! position, and stops checks all run and accumulate regardless of whether
//! an earlier one failed — the same accumulator shape as
//! `backtest_v2::pre_trade_risk::PreTradeRiskController::check`. State
//! (position exposure) is mutated only when every check passed, mirroring
//! that controller's `check_and_execute`.

use std::time::Instant;

use serde_json::Value;

use super::guards::GuardEvaluator;
use super::injector::StrategyModeInjector;
use super::position::PositionManager;
use super::schema::{OrderContext, OrderType, RiskDecision, SchemaValidator, Side};
use super::shadow::ShadowComparator;
use super::stops::StopsEvaluator;

pub struct RiskManager {
    validator: SchemaValidator,
    injector: StrategyModeInjector,
    position: PositionManager,
    shadow: ShadowComparator,
}

impl RiskManager {
    pub fn new(injector: StrategyModeInjector, position: PositionManager, shadow: ShadowComparator) -> Self {
        Self {
            validator: SchemaValidator::new(),
            injector,
            position,
            shadow,
        }
    }

    /// Validates and decides on a free-form JSON order context, the entry
    /// point adapters coming from a JSON feed should use.
    pub fn decide_map(&self, map: &serde_json::Map<String, Value>) -> RiskDecision {
        match self.validator.validate_map(map) {
            Ok(ctx) => self.decide(&ctx),
            Err(reasons) => {
                let mut decision = RiskDecision::new();
                decision.passed = false;
                decision.reason_codes = reasons;
                decision
            }
        }
    }

    /// Runs the full pipeline against an already-typed `OrderContext`.
    pub fn decide(&self, ctx: &OrderContext) -> RiskDecision {
        let started = Instant::now();
        let mut decision = RiskDecision::new();

        if let Err(reasons) = self.validator.validate(ctx) {
            decision.reason_codes = reasons;
            decision.metrics.check_latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            decision.metrics.check_latency_seconds = started.elapsed().as_secs_f64();
            return decision;
        }

        let params = self.injector.snapshot();
        let guard_eval = GuardEvaluator::new(params.guard.clone());
        let stops_eval = StopsEvaluator::new(params.stops.clone());

        let mut reasons = Vec::new();
        reasons.extend(guard_eval.failing_reasons(&ctx.guards));
        reasons.extend(self.position.failing_reasons(ctx));

        // Adjustments are advice, computed unconditionally so a failing
        // order still carries min_qty/aligned_qty/aligned_price/final_qty.
        let mut adjustments = self.position.adjustments(ctx);
        if ctx.order_type == OrderType::Limit {
            if let Some(price) = ctx.price {
                let cap = stops_eval.price_cap(price, ctx);
                adjustments.price_cap = Some(cap);
                adjustments.aligned_price = Some(reconcile_price_cap(adjustments.aligned_price, cap, ctx.side));
            }
        }

        let passed = reasons.is_empty();
        decision.passed = passed;
        decision.reason_codes = reasons;
        decision.adjustments = adjustments;

        if passed {
            self.position.record_fill(ctx);
        }

        decision.metrics.check_latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        decision.metrics.check_latency_seconds = started.elapsed().as_secs_f64();

        decision.shadow_compare.legacy_passed = None;
        decision.shadow_compare.parity = self.shadow.parity();

        decision
    }

    /// Feeds a legacy (shadow) decision into the comparator for parity
    /// tracking. Called by adapters that still run the v1 path alongside.
    pub fn record_shadow(&self, current_passed: bool, legacy_passed: bool) {
        self.shadow.record(current_passed, legacy_passed);
    }

    pub fn injector(&self) -> &StrategyModeInjector {
        &self.injector
    }

    pub fn position_manager(&self) -> &PositionManager {
        &self.position
    }

    pub fn shadow_comparator(&self) -> &ShadowComparator {
        &self.shadow
    }
}

/// Reconciles an exchange-aligned limit price against the slippage cap:
/// buys keep the lower (tighter) of the two, sells keep the higher.
fn reconcile_price_cap(aligned: Option<f64>, cap: f64, side: Side) -> f64 {
    match aligned {
        Some(price) => match side {
            Side::Buy => price.min(cap),
            Side::Sell => price.max(cap),
        },
        None => cap,
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new(
            StrategyModeInjector::default(),
            PositionManager::default(),
            ShadowComparator::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::schema::{AccountMode, Guards, OrderContextExtra};

    fn healthy_ctx() -> OrderContext {
        OrderContext {
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            qty: 0.5,
            price: Some(100.0),
            account_mode: AccountMode::Isolated,
            max_slippage_bps: 10.0,
            ts_ms: 0,
            regime: "normal".to_string(),
            guards: Guards {
                spread_bps: 5.0,
                event_lag_sec: 0.1,
                activity_tpm: 5.0,
            },
            context: OrderContextExtra::default(),
        }
    }

    #[test]
    fn happy_path_passes_and_updates_position() {
        let manager = RiskManager::default();
        let ctx = healthy_ctx();
        let decision = manager.decide(&ctx);
        assert!(decision.passed);
        assert!(decision.reason_codes.is_empty());
        let (notional, _) = manager.position_manager().exposure("BTCUSDT");
        assert!(notional > 0.0);
    }

    #[test]
    fn invalid_schema_short_circuits_other_checks() {
        let manager = RiskManager::default();
        let mut ctx = healthy_ctx();
        ctx.qty = -1.0;
        let decision = manager.decide(&ctx);
        assert!(!decision.passed);
        assert_eq!(decision.reason_codes[0], "invalid_schema");
    }

    #[test]
    fn guard_failure_does_not_mutate_position() {
        let manager = RiskManager::default();
        let mut ctx = healthy_ctx();
        ctx.guards.activity_tpm = 0.0;
        let decision = manager.decide(&ctx);
        assert!(!decision.passed);
        let (notional, _) = manager.position_manager().exposure("BTCUSDT");
        assert_eq!(notional, 0.0);
    }

    #[test]
    fn quiet_regime_relaxes_guard_allows_low_activity() {
        let manager = RiskManager::default();
        manager.injector().set_regime("quiet");
        let mut ctx = healthy_ctx();
        ctx.guards.activity_tpm = 0.3;
        let decision = manager.decide(&ctx);
        assert!(decision.passed);
    }
}
