//! Regime Classifier / StrategyMode (C10): hysteresis-gated active/normal/quiet
//! classification from per-symbol tick arrival rate.
//!
//! The upstream Python `StrategyModeManager` that `core_algo.py` tries to
//! import isn't present in the reference pack, so this is built from
//! `spec.md` §4.10's prose directly, using the windowed-sample idiom from
//! `route_quality::baseline::BaselineCalculator` (a `VecDeque<Instant>` per
//! key, pruned by age) as the Rust-shape grounding rather than a line-by-line
//! port.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    Active,
    Normal,
    Quiet,
}

impl StrategyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyMode::Active => "active",
            StrategyMode::Normal => "normal",
            StrategyMode::Quiet => "quiet",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    pub active_min_tps: f64,
    pub normal_min_tps: f64,
    pub window: Duration,
    /// Consecutive same-direction classifications required before the
    /// active regime actually flips, preventing the boundary from
    /// flapping tick to tick.
    pub hysteresis_ticks: u32,
    pub arrival_window_cap: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            active_min_tps: 5.0,
            normal_min_tps: 1.0,
            window: Duration::from_secs(60),
            hysteresis_ticks: 3,
            arrival_window_cap: 6_000,
        }
    }
}

struct SymbolWindow {
    arrivals: VecDeque<Instant>,
    current_mode: StrategyMode,
    pending_mode: Option<StrategyMode>,
    pending_count: u32,
}

impl SymbolWindow {
    fn new() -> Self {
        Self {
            arrivals: VecDeque::new(),
            current_mode: StrategyMode::Normal,
            pending_mode: None,
            pending_count: 0,
        }
    }
}

/// Classifies the live regime per symbol from tick arrival rate, applying
/// hysteresis so transient bursts don't flip the regime on a single tick.
pub struct RegimeClassifier {
    config: RegimeConfig,
    windows: RwLock<HashMap<String, SymbolWindow>>,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    fn instantaneous_mode(&self, tps: f64) -> StrategyMode {
        if tps >= self.config.active_min_tps {
            StrategyMode::Active
        } else if tps >= self.config.normal_min_tps {
            StrategyMode::Normal
        } else {
            StrategyMode::Quiet
        }
    }

    /// Records one tick arrival for `symbol` and returns the (possibly
    /// unchanged) hysteresis-stable regime.
    pub fn observe_tick(&self, symbol: &str) -> StrategyMode {
        let mut windows = self.windows.write();
        let window = windows.entry(symbol.to_string()).or_insert_with(SymbolWindow::new);

        let now = Instant::now();
        window.arrivals.push_back(now);
        while window.arrivals.len() > self.config.arrival_window_cap {
            window.arrivals.pop_front();
        }
        let cutoff = now - self.config.window;
        while let Some(&front) = window.arrivals.front() {
            if front < cutoff {
                window.arrivals.pop_front();
            } else {
                break;
            }
        }

        let window_secs = self.config.window.as_secs_f64().max(1.0);
        let tps = window.arrivals.len() as f64 / window_secs;
        let instantaneous = self.instantaneous_mode(tps);

        if instantaneous == window.current_mode {
            window.pending_mode = None;
            window.pending_count = 0;
            return window.current_mode;
        }

        match window.pending_mode {
            Some(pending) if pending == instantaneous => {
                window.pending_count += 1;
            }
            _ => {
                window.pending_mode = Some(instantaneous);
                window.pending_count = 1;
            }
        }

        if window.pending_count >= self.config.hysteresis_ticks {
            window.current_mode = instantaneous;
            window.pending_mode = None;
            window.pending_count = 0;
        }

        window.current_mode
    }

    pub fn current_mode(&self, symbol: &str) -> StrategyMode {
        self.windows
            .read()
            .get(symbol)
            .map(|w| w.current_mode)
            .unwrap_or(StrategyMode::Normal)
    }
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self::new(RegimeConfig::default())
    }
}
