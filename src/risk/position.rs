//! Position Manager (C4): per-symbol notional/qty exposure bookkeeping.
//!
//! Structurally mirrors `backtest_v2::pre_trade_risk::PreTradeRiskController`'s
//! inventory map — a `HashMap<String, f64>` of running exposure mutated only
//! after a check passes — adapted from per-token inventory to per-symbol
//! notional exposure against `OrderContext`.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::schema::{Adjustments, OrderContext, OrderType, ReasonCode, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    pub max_notional_per_symbol: f64,
    pub max_qty_per_symbol: f64,
    pub min_notional: f64,
    /// Exchange qty increment; 0 disables step-size alignment.
    pub step_size: f64,
    /// Exchange price increment (limit orders only); 0 disables tick-size alignment.
    pub tick_size: f64,
    /// Float-noise tolerance when checking step/tick alignment.
    pub alignment_epsilon: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            max_notional_per_symbol: 50_000.0,
            max_qty_per_symbol: 10_000.0,
            min_notional: 5.0,
            step_size: 0.001,
            tick_size: 0.01,
            alignment_epsilon: 1e-10,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SymbolExposure {
    notional: f64,
    qty: f64,
}

pub struct PositionCheck {
    pub reason: ReasonCode,
    pub passed: bool,
    pub observed: f64,
    pub limit: f64,
}

/// Tracks running per-symbol exposure and gates new orders against it.
pub struct PositionManager {
    config: PositionConfig,
    exposure: RwLock<HashMap<String, SymbolExposure>>,
}

impl PositionManager {
    pub fn new(config: PositionConfig) -> Self {
        Self {
            config,
            exposure: RwLock::new(HashMap::new()),
        }
    }

    fn estimated_notional(&self, ctx: &OrderContext) -> f64 {
        let ref_price = ctx.price.unwrap_or(1.0);
        ctx.qty * ref_price
    }

    fn is_aligned(&self, value: f64, step: f64) -> bool {
        if step <= 0.0 {
            return true;
        }
        let ratio = value / step;
        (ratio - ratio.round()).abs() <= self.config.alignment_epsilon
    }

    fn align_to_step(value: f64, step: f64) -> f64 {
        if step <= 0.0 {
            return value;
        }
        (value / step).round() * step
    }

    /// Runs the exchange-filter and notional/qty checks (§4.4 policies
    /// 1-3). Never mutates state.
    pub fn check(&self, ctx: &OrderContext) -> Vec<PositionCheck> {
        let notional = self.estimated_notional(ctx);
        let current = self
            .exposure
            .read()
            .get(&ctx.symbol)
            .copied()
            .unwrap_or_default();
        let projected_notional = current.notional + notional;
        let projected_qty = current.qty + ctx.qty;

        let mut checks = vec![
            PositionCheck {
                reason: ReasonCode::QtyNotAlignedToStepSize,
                passed: self.is_aligned(ctx.qty, self.config.step_size),
                observed: ctx.qty,
                limit: self.config.step_size,
            },
            PositionCheck {
                reason: ReasonCode::NotionalExceedsLimit,
                passed: projected_notional <= self.config.max_notional_per_symbol,
                observed: projected_notional,
                limit: self.config.max_notional_per_symbol,
            },
            PositionCheck {
                reason: ReasonCode::SymbolQtyExceedsLimit,
                passed: projected_qty <= self.config.max_qty_per_symbol,
                observed: projected_qty,
                limit: self.config.max_qty_per_symbol,
            },
            PositionCheck {
                reason: ReasonCode::NotionalBelowMin,
                passed: notional >= self.config.min_notional,
                observed: notional,
                limit: self.config.min_notional,
            },
        ];

        if ctx.order_type == OrderType::Limit {
            if let Some(price) = ctx.price {
                checks.push(PositionCheck {
                    reason: ReasonCode::PriceNotAlignedToTickSize,
                    passed: self.is_aligned(price, self.config.tick_size),
                    observed: price,
                    limit: self.config.tick_size,
                });
            }
        }

        checks
    }

    /// Computes exchange-filter and cap advice unconditionally — a failing
    /// order still carries full adjustments (§8 scenario 5). Reconciled per
    /// policy 4: `final_qty = min(aligned_qty, max_qty)` when both exist.
    pub fn adjustments(&self, ctx: &OrderContext) -> Adjustments {
        let min_qty = ctx.price.map(|p| self.config.min_notional / p);
        let aligned_qty = Some(Self::align_to_step(ctx.qty, self.config.step_size));
        let aligned_price = if ctx.order_type == OrderType::Limit {
            ctx.price.map(|p| Self::align_to_step(p, self.config.tick_size))
        } else {
            None
        };

        let notional = self.estimated_notional(ctx);
        let max_qty = if notional > self.config.max_notional_per_symbol {
            ctx.price.map(|p| self.config.max_notional_per_symbol / p)
        } else {
            None
        };

        let final_qty = match (aligned_qty, max_qty) {
            (Some(a), Some(m)) => Some(a.min(m)),
            (Some(a), None) => Some(a),
            (None, Some(m)) => Some(m),
            (None, None) => Some(ctx.qty),
        };

        Adjustments {
            max_qty,
            price_cap: None,
            aligned_qty,
            aligned_price,
            min_qty,
            final_qty,
        }
    }

    pub fn failing_reasons(&self, ctx: &OrderContext) -> Vec<String> {
        self.check(ctx)
            .into_iter()
            .filter(|c| !c.passed)
            .map(|c| c.reason.to_string())
            .collect()
    }

    /// Mutates running exposure. Caller must only invoke this after every
    /// other gate in the pipeline passed (mutate-on-pass, per the teacher's
    /// `check_and_execute`).
    pub fn record_fill(&self, ctx: &OrderContext) {
        let notional = self.estimated_notional(ctx);
        let mut exposure = self.exposure.write();
        let entry = exposure.entry(ctx.symbol.clone()).or_default();
        match ctx.side {
            Side::Buy => {
                entry.notional += notional;
                entry.qty += ctx.qty;
            }
            Side::Sell => {
                entry.notional = (entry.notional - notional).max(0.0);
                entry.qty = (entry.qty - ctx.qty).max(0.0);
            }
        }
    }

    pub fn exposure(&self, symbol: &str) -> (f64, f64) {
        let exposure = self.exposure.read();
        let e = exposure.get(symbol).copied().unwrap_or_default();
        (e.notional, e.qty)
    }

    pub fn reset(&self) {
        self.exposure.write().clear();
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new(PositionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::schema::{AccountMode, Guards, OrderContextExtra};

    fn ctx(symbol: &str, qty: f64, price: f64) -> OrderContext {
        OrderContext {
            symbol: symbol.to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            qty,
            price: Some(price),
            account_mode: AccountMode::Isolated,
            max_slippage_bps: 10.0,
            ts_ms: 0,
            regime: "normal".to_string(),
            guards: Guards::default(),
            context: OrderContextExtra::default(),
        }
    }

    #[test]
    fn within_limits_passes() {
        let pm = PositionManager::default();
        assert!(pm.failing_reasons(&ctx("BTCUSDT", 1.0, 100.0)).is_empty());
    }

    #[test]
    fn over_notional_limit_fails() {
        let pm = PositionManager::default();
        let reasons = pm.failing_reasons(&ctx("BTCUSDT", 1000.0, 100.0));
        assert!(reasons.contains(&ReasonCode::NotionalExceedsLimit.to_string()));
    }

    #[test]
    fn below_min_notional_fails() {
        let pm = PositionManager::default();
        let reasons = pm.failing_reasons(&ctx("BTCUSDT", 0.01, 10.0));
        assert!(reasons.contains(&ReasonCode::NotionalBelowMin.to_string()));
    }

    #[test]
    fn record_fill_accumulates_then_blocks_next_order() {
        let pm = PositionManager::new(PositionConfig {
            max_notional_per_symbol: 1_000.0,
            max_qty_per_symbol: 100.0,
            min_notional: 1.0,
            ..PositionConfig::default()
        });
        let order = ctx("ETHUSDT", 5.0, 150.0);
        assert!(pm.failing_reasons(&order).is_empty());
        pm.record_fill(&order);
        let (notional, qty) = pm.exposure("ETHUSDT");
        assert!((notional - 750.0).abs() < 1e-9);
        assert!((qty - 5.0).abs() < 1e-9);

        let next = ctx("ETHUSDT", 3.0, 150.0);
        let reasons = pm.failing_reasons(&next);
        assert!(reasons.contains(&ReasonCode::NotionalExceedsLimit.to_string()));
    }

    #[test]
    fn misaligned_qty_fails() {
        let pm = PositionManager::default();
        let reasons = pm.failing_reasons(&ctx("BTCUSDT", 0.50015, 100.0));
        assert!(reasons.contains(&ReasonCode::QtyNotAlignedToStepSize.to_string()));
    }

    #[test]
    fn misaligned_price_fails() {
        let pm = PositionManager::default();
        let reasons = pm.failing_reasons(&ctx("BTCUSDT", 0.5, 100.005));
        assert!(reasons.contains(&ReasonCode::PriceNotAlignedToTickSize.to_string()));
    }

    #[test]
    fn exchange_filter_advice_computed_even_when_failing() {
        let pm = PositionManager::new(PositionConfig {
            min_notional: 10.0,
            step_size: 0.001,
            tick_size: 0.01,
            ..PositionConfig::default()
        });
        let order = ctx("BTCUSDT", 0.00015, 50_000.123);
        let reasons = pm.failing_reasons(&order);
        assert!(reasons.contains(&ReasonCode::NotionalBelowMin.to_string()));
        assert!(reasons.contains(&ReasonCode::QtyNotAlignedToStepSize.to_string()));
        assert!(reasons.contains(&ReasonCode::PriceNotAlignedToTickSize.to_string()));

        let adjustments = pm.adjustments(&order);
        assert!((adjustments.aligned_qty.unwrap() - 0.0).abs() < 1e-9);
        assert!((adjustments.aligned_price.unwrap() - 50_000.12).abs() < 1e-9);
        assert!(adjustments.min_qty.unwrap() > 0.0);
        assert_eq!(adjustments.final_qty, adjustments.aligned_qty);
    }

    #[test]
    fn aligned_qty_rounds_to_nearest_not_down() {
        let pm = PositionManager::default();
        let adjustments = pm.adjustments(&ctx("BTCUSDT", 0.0009, 100.0));
        assert!((adjustments.aligned_qty.unwrap() - 0.001).abs() < 1e-9);
    }
}
