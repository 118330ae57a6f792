//! Config hashing and signal-id generation (C12).
//!
//! Grounded in `config_hash.py`: hashes the canonical (sorted-key) JSON
//! encoding of the active config with SHA1, truncated to the first 12 hex
//! characters. Using `sha1` here (not the teacher's existing `sha2`) because
//! the original implementation is specifically SHA1-truncated — see the
//! `sha1` line added to `Cargo.toml`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use sha1::{Digest, Sha1};

/// Computes a stable 12-hex-character fingerprint of a config map.
///
/// Keys are sorted (`BTreeMap`) before serialization so the hash is
/// independent of field insertion order, matching the Python
/// `json.dumps(config, sort_keys=True)` approach.
pub fn config_hash(config: &BTreeMap<String, Value>) -> String {
    let canonical = serde_json::to_string(config).unwrap_or_default();
    let mut hasher = Sha1::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..12].to_string()
}

/// Monotonic per-symbol sequence counter feeding `signal_id` generation,
/// so replays of the same `ts_ms` never collide.
#[derive(Default)]
pub struct SignalIdGenerator {
    counters: Mutex<std::collections::HashMap<String, AtomicU64>>,
}

impl SignalIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds `{run_id}-{SYMBOL}-{ts_ms}-{seq}`, matching the Python format
    /// string in `core_algo.py::_process_feature_row_v2`.
    pub fn next_id(&self, run_id: &str, symbol: &str, ts_ms: i64) -> String {
        let mut counters = self.counters.lock().unwrap();
        let counter = counters
            .entry(symbol.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        let seq = counter.fetch_add(1, Ordering::SeqCst);
        format!("{run_id}-{}-{ts_ms}-{seq}", symbol.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_regardless_of_key_order() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), Value::from(2));
        a.insert("a".to_string(), Value::from(1));

        let mut b = BTreeMap::new();
        b.insert("a".to_string(), Value::from(1));
        b.insert("b".to_string(), Value::from(2));

        assert_eq!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn hash_is_twelve_hex_chars() {
        let mut m = BTreeMap::new();
        m.insert("x".to_string(), Value::from(1));
        let h = config_hash(&m);
        assert_eq!(h.len(), 12);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signal_id_sequence_increments_per_symbol_independently() {
        let gen = SignalIdGenerator::new();
        let a1 = gen.next_id("run", "btcusdt", 1000);
        let a2 = gen.next_id("run", "btcusdt", 1000);
        let b1 = gen.next_id("run", "ethusdt", 1000);
        assert_eq!(a1, "run-BTCUSDT-1000-0");
        assert_eq!(a2, "run-BTCUSDT-1000-1");
        assert_eq!(b1, "run-ETHUSDT-1000-0");
    }
}
