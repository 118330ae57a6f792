//! Shadow Comparator (C8): legacy-vs-current parity tracking.
//!
//! Resolves the open question in `spec.md` §9 by making both the parity
//! alert threshold and the critical multiplier config-driven (defaults
//! 0.99 / 0.95) rather than hardcoded, and by emitting `risk_shadow_alert`
//! as three Prometheus gauge lines — one per level (`ok`/`warn`/`critical`),
//! value `1` iff that level is the active one — per the literal wording of
//! `spec.md` §4.1/§6.4.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShadowConfig {
    /// Parity ratio below which a `warn` alert is raised.
    pub warn_threshold: f64,
    /// Multiplied by `warn_threshold` to get the `critical` cutoff.
    pub critical_multiplier: f64,
    /// Minimum sample count before parity is considered meaningful.
    pub min_samples: u64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            warn_threshold: 0.99,
            critical_multiplier: 0.95,
            min_samples: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowLevel {
    Ok,
    Warn,
    Critical,
}

impl ShadowLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShadowLevel::Ok => "ok",
            ShadowLevel::Warn => "warn",
            ShadowLevel::Critical => "critical",
        }
    }
}

/// Running agree/disagree counters between the current and legacy (shadow)
/// decision path, reset never — this is a lifetime counter per process.
#[derive(Debug, Default)]
pub struct ShadowComparator {
    config: ShadowConfig,
    agreements: parking_lot::Mutex<(u64, u64)>,
}

impl ShadowComparator {
    pub fn new(config: ShadowConfig) -> Self {
        Self {
            config,
            agreements: parking_lot::Mutex::new((0, 0)),
        }
    }

    /// Records one shadow comparison: did the legacy `passed` decision agree
    /// with the current one?
    pub fn record(&self, current_passed: bool, legacy_passed: bool) {
        let mut counters = self.agreements.lock();
        counters.1 += 1;
        if current_passed == legacy_passed {
            counters.0 += 1;
        }
    }

    pub fn parity(&self) -> f64 {
        let (agree, total) = *self.agreements.lock();
        if total == 0 {
            1.0
        } else {
            agree as f64 / total as f64
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.agreements.lock().1
    }

    /// Computes the active alert level. Below `min_samples` always reports
    /// `Ok` — there isn't enough signal yet to page anyone.
    pub fn level(&self) -> ShadowLevel {
        if self.sample_count() < self.config.min_samples {
            return ShadowLevel::Ok;
        }
        let parity = self.parity();
        let critical_threshold = self.config.warn_threshold * self.config.critical_multiplier;
        if parity < critical_threshold {
            ShadowLevel::Critical
        } else if parity < self.config.warn_threshold {
            ShadowLevel::Warn
        } else {
            ShadowLevel::Ok
        }
    }

    /// Renders the three-gauge-line exposition for `risk_shadow_alert`.
    pub fn prometheus_lines(&self) -> String {
        let active = self.level();
        [ShadowLevel::Ok, ShadowLevel::Warn, ShadowLevel::Critical]
            .iter()
            .map(|level| {
                let value = if *level == active { 1 } else { 0 };
                format!("risk_shadow_alert{{level=\"{}\"}} {}", level.as_str(), value)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Clone for ShadowComparator {
    fn clone(&self) -> Self {
        let counters = *self.agreements.lock();
        Self {
            config: self.config,
            agreements: parking_lot::Mutex::new(counters),
        }
    }
}
