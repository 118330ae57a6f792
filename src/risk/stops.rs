//! Stops & Slippage Cap (C5): price-cap computation from side, entry price,
//! and max-slippage tolerance. Exchange-filter qty/price alignment lives in
//! `PositionManager` (C4), not here.

use serde::{Deserialize, Serialize};

use super::schema::{OrderContext, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopsConfig {
    /// Tick size the computed slippage cap is rounded to, if any.
    pub tick_size: f64,
}

impl Default for StopsConfig {
    fn default() -> Self {
        Self { tick_size: 0.01 }
    }
}

/// Computes the slippage-capped limit price for an order.
pub struct StopsEvaluator {
    config: StopsConfig,
}

impl StopsEvaluator {
    pub fn new(config: StopsConfig) -> Self {
        Self { config }
    }

    /// Clamps a recommended limit price to respect `max_slippage_bps`
    /// relative to a reference price, rounding to the nearest tick multiple
    /// when one is configured (never floor, to avoid an over-tight limit).
    pub fn price_cap(&self, reference_price: f64, ctx: &OrderContext) -> f64 {
        let slip = ctx.max_slippage_bps / 10_000.0;
        let cap = match ctx.side {
            Side::Buy => reference_price * (1.0 + slip),
            Side::Sell => reference_price * (1.0 - slip),
        };
        if self.config.tick_size > 0.0 {
            (cap / self.config.tick_size).round() * self.config.tick_size
        } else {
            cap
        }
    }
}

impl Default for StopsEvaluator {
    fn default() -> Self {
        Self::new(StopsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::schema::{AccountMode, Guards, OrderContextExtra, OrderType};

    fn ctx(qty: f64, price: Option<f64>, order_type: OrderType) -> OrderContext {
        OrderContext {
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type,
            qty,
            price,
            account_mode: AccountMode::Isolated,
            max_slippage_bps: 10.0,
            ts_ms: 0,
            regime: "normal".to_string(),
            guards: Guards::default(),
            context: OrderContextExtra::default(),
        }
    }

    #[test]
    fn price_cap_respects_side() {
        let eval = StopsEvaluator::default();
        let buy = ctx(0.5, Some(100.0), OrderType::Limit);
        let capped = eval.price_cap(100.0, &buy);
        assert!(capped > 100.0);

        let mut sell = ctx(0.5, Some(100.0), OrderType::Limit);
        sell.side = Side::Sell;
        let capped = eval.price_cap(100.0, &sell);
        assert!(capped < 100.0);
    }

    #[test]
    fn price_cap_rounds_to_tick_when_configured() {
        let eval = StopsEvaluator::new(StopsConfig { tick_size: 0.01 });
        let buy = ctx(0.5, Some(100.0), OrderType::Limit);
        let capped = eval.price_cap(100.003, &buy);
        assert!(((capped / 0.01).round() - (capped / 0.01)).abs() < 1e-9);
    }

    #[test]
    fn price_cap_untouched_when_tick_size_disabled() {
        let eval = StopsEvaluator::new(StopsConfig { tick_size: 0.0 });
        let buy = ctx(0.5, Some(100.0), OrderType::Limit);
        let capped = eval.price_cap(100.003, &buy);
        assert!((capped - 100.003 * 1.001).abs() < 1e-9);
    }
}
