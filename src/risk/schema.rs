//! OrderContext / RiskDecision schema and the hard-gate validator (C2).
//!
//! Mirrors the guarantee the Python `OrderCtxSchemaValidator` made: any
//! invalid input fails with `reason_codes[0] == "invalid_schema"` before any
//! other risk logic runs, and both a typed record and a free JSON map reach
//! the same canonical `OrderContext` via a single fallible constructor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed, bounded set of reason codes the risk pipeline may emit.
/// Never add a free-form string here — see `spec.md` §6.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    SpreadTooWide,
    LagExceedsCap,
    MarketInactive,
    NotionalExceedsLimit,
    SymbolQtyExceedsLimit,
    NotionalBelowMin,
    QtyNotAlignedToStepSize,
    PriceNotAlignedToTickSize,
    InvalidSchema,
    MissingRequiredField,
    InvalidFieldType,
    InvalidEnumValue,
    CooldownAfterExit,
    ReverseCooldownInsufficientTicks,
    Warmup,
    WeakSignal,
    LowConsistency,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::SpreadTooWide => "spread_too_wide",
            ReasonCode::LagExceedsCap => "lag_exceeds_cap",
            ReasonCode::MarketInactive => "market_inactive",
            ReasonCode::NotionalExceedsLimit => "notional_exceeds_limit",
            ReasonCode::SymbolQtyExceedsLimit => "symbol_qty_exceeds_limit",
            ReasonCode::NotionalBelowMin => "notional_below_min",
            ReasonCode::QtyNotAlignedToStepSize => "qty_not_aligned_to_step_size",
            ReasonCode::PriceNotAlignedToTickSize => "price_not_aligned_to_tick_size",
            ReasonCode::InvalidSchema => "invalid_schema",
            ReasonCode::MissingRequiredField => "missing_required_field",
            ReasonCode::InvalidFieldType => "invalid_field_type",
            ReasonCode::InvalidEnumValue => "invalid_enum_value",
            ReasonCode::CooldownAfterExit => "cooldown_after_exit",
            ReasonCode::ReverseCooldownInsufficientTicks => "reverse_cooldown_insufficient_ticks",
            ReasonCode::Warmup => "warmup",
            ReasonCode::WeakSignal => "weak_signal",
            ReasonCode::LowConsistency => "low_consistency",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountMode {
    Isolated,
    Cross,
}

impl Default for AccountMode {
    fn default() -> Self {
        AccountMode::Isolated
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Guards {
    #[serde(default)]
    pub spread_bps: f64,
    #[serde(default)]
    pub event_lag_sec: f64,
    #[serde(default)]
    pub activity_tpm: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderContextExtra {
    #[serde(default)]
    pub fees_bps: f64,
    #[serde(default)]
    pub maker_ratio_target: f64,
    #[serde(default)]
    pub recent_pnl: f64,
}

/// Canonical, already-validated order context (§3.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderContext {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: f64,
    pub price: Option<f64>,
    #[serde(default)]
    pub account_mode: AccountMode,
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: f64,
    #[serde(default)]
    pub ts_ms: i64,
    #[serde(default = "default_regime")]
    pub regime: String,
    #[serde(default)]
    pub guards: Guards,
    #[serde(default)]
    pub context: OrderContextExtra,
}

fn default_max_slippage_bps() -> f64 {
    10.0
}

fn default_regime() -> String {
    "normal".to_string()
}

/// Adjustments the risk pipeline recommends but never applies silently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Adjustments {
    pub max_qty: Option<f64>,
    pub price_cap: Option<f64>,
    pub aligned_qty: Option<f64>,
    pub aligned_price: Option<f64>,
    pub min_qty: Option<f64>,
    pub final_qty: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskMetricsSnapshot {
    pub check_latency_ms: f64,
    pub check_latency_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadowCompare {
    pub legacy_passed: Option<bool>,
    pub parity: bool,
}

/// Output of the Risk Manager pipeline (§3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub passed: bool,
    pub reason_codes: Vec<String>,
    pub adjustments: Adjustments,
    pub metrics: RiskMetricsSnapshot,
    pub shadow_compare: ShadowCompare,
}

impl RiskDecision {
    pub fn new() -> Self {
        Self {
            passed: false,
            reason_codes: Vec::new(),
            adjustments: Adjustments::default(),
            metrics: RiskMetricsSnapshot::default(),
            shadow_compare: ShadowCompare::default(),
        }
    }

    pub fn push_reason(&mut self, reason: impl Into<String>) {
        self.reason_codes.push(reason.into());
    }
}

impl Default for RiskDecision {
    fn default() -> Self {
        Self::new()
    }
}

/// Hard-gate validator for `OrderContext` (C2).
///
/// Validation order matches `spec.md` §4.2: required-field presence → scalar
/// type/positivity → enum membership → conditional limit-order price →
/// guards subtree. Any failure prepends `invalid_schema` so
/// `reason_codes[0] == "invalid_schema"` always holds (the testable property
/// in `spec.md` §8).
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a free-form JSON map, the "duck typing" entrypoint collapsed
    /// into a single `try_from`-style constructor per `spec.md` §9.
    pub fn validate_map(&self, map: &serde_json::Map<String, Value>) -> Result<OrderContext, Vec<String>> {
        let mut missing = Vec::new();
        for field in ["symbol", "side", "order_type", "qty"] {
            if !map.get(field).is_some_and(|v| !v.is_null()) {
                missing.push(field.to_string());
            }
        }
        if !missing.is_empty() {
            let mut errors = vec![ReasonCode::MissingRequiredField.to_string()];
            errors.extend(missing);
            return Err(prefix_invalid_schema(errors));
        }

        let value = Value::Object(map.clone());
        let ctx: OrderContext = serde_json::from_value(value)
            .map_err(|_| prefix_invalid_schema(vec![ReasonCode::InvalidSchema.to_string()]))?;

        self.validate(&ctx)
    }

    /// Validate an already-typed `OrderContext`.
    pub fn validate(&self, ctx: &OrderContext) -> Result<OrderContext, Vec<String>> {
        let mut errors: Vec<String> = Vec::new();

        if ctx.symbol.trim().is_empty() {
            errors.push(ReasonCode::MissingRequiredField.to_string());
            errors.push("symbol".to_string());
        }

        if ctx.qty <= 0.0 {
            errors.push(ReasonCode::InvalidFieldType.to_string());
            errors.push("qty".to_string());
        }

        if ctx.order_type == OrderType::Limit && ctx.price.is_none() {
            errors.push(ReasonCode::MissingRequiredField.to_string());
            errors.push("price (required for limit orders)".to_string());
        }

        if let Some(price) = ctx.price {
            if price <= 0.0 {
                errors.push(ReasonCode::InvalidFieldType.to_string());
                errors.push("price".to_string());
            }
        }

        for (key, value) in [
            ("spread_bps", ctx.guards.spread_bps),
            ("event_lag_sec", ctx.guards.event_lag_sec),
            ("activity_tpm", ctx.guards.activity_tpm),
        ] {
            if value < 0.0 || !value.is_finite() {
                errors.push(ReasonCode::InvalidFieldType.to_string());
                errors.push(format!("guards.{key}"));
            }
        }

        if errors.is_empty() {
            Ok(ctx.clone())
        } else {
            Err(prefix_invalid_schema(errors))
        }
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn prefix_invalid_schema(mut errors: Vec<String>) -> Vec<String> {
    if errors.first().map(String::as_str) != Some(ReasonCode::InvalidSchema.as_str()) {
        let mut out = vec![ReasonCode::InvalidSchema.to_string()];
        out.append(&mut errors);
        out
    } else {
        errors
    }
}

/// Maps arbitrary key/value pairs from a legacy free map straight to
/// `OrderContext::context`, used by adapters that still speak dict-shaped
/// order contexts (kept for the v1 coexistence window, see `spec.md` §9).
pub fn extra_from_map(map: &HashMap<String, Value>) -> OrderContextExtra {
    OrderContextExtra {
        fees_bps: map.get("fees_bps").and_then(Value::as_f64).unwrap_or(0.0),
        maker_ratio_target: map
            .get("maker_ratio_target")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        recent_pnl: map.get("recent_pnl").and_then(Value::as_f64).unwrap_or(0.0),
    }
}
