//! Signal Writer v2 (C11): dual JSONL + SQLite sink.
//!
//! Grounded in `signal_writer.py`'s `SignalWriterV2` and in this crate's own
//! `signals::db_storage::DbSignalStorage` for the rusqlite batching idiom.
//! JSONL append-only files are rotated per symbol-hour; SQLite writes batch
//! up to `sqlite_batch_n` rows or `sqlite_flush_ms` elapsed, whichever comes
//! first, with `INSERT OR IGNORE` on the `(symbol, ts_ms, signal_id)` primary
//! key so replays are idempotent.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, error, warn};

use crate::error::RiskCoreError;
use crate::signals::schema::SignalV2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Jsonl,
    Sqlite,
    Dual,
}

impl SinkKind {
    pub fn from_env_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" => SinkKind::Jsonl,
            "sqlite" => SinkKind::Sqlite,
            _ => SinkKind::Dual,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalWriterConfig {
    pub output_dir: PathBuf,
    pub sink_kind: SinkKind,
    pub db_name: String,
    pub fsync_every_n: u64,
    pub sqlite_batch_n: usize,
    pub sqlite_flush_ms: u64,
}

impl Default for SignalWriterConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./var/signals"),
            sink_kind: SinkKind::Dual,
            db_name: "signals_v2.db".to_string(),
            fsync_every_n: 50,
            sqlite_batch_n: 500,
            sqlite_flush_ms: 500,
        }
    }
}

struct JsonlState {
    file: Option<File>,
    last_key: Option<(String, String)>,
    writes_since_fsync: u64,
}

struct SqliteState {
    conn: Option<Connection>,
    batch: Vec<SignalV2>,
    last_flush: Instant,
}

pub struct SignalWriter {
    config: SignalWriterConfig,
    jsonl_enabled: bool,
    sqlite_enabled: bool,
    jsonl: Mutex<JsonlState>,
    sqlite: Mutex<SqliteState>,
}

impl SignalWriter {
    pub fn new(config: SignalWriterConfig) -> Self {
        let jsonl_enabled = matches!(config.sink_kind, SinkKind::Jsonl | SinkKind::Dual);
        let sqlite_enabled = matches!(config.sink_kind, SinkKind::Sqlite | SinkKind::Dual);
        Self {
            config,
            jsonl_enabled,
            sqlite_enabled,
            jsonl: Mutex::new(JsonlState {
                file: None,
                last_key: None,
                writes_since_fsync: 0,
            }),
            sqlite: Mutex::new(SqliteState {
                conn: None,
                batch: Vec::new(),
                last_flush: Instant::now(),
            }),
        }
    }

    fn ready_dir(&self) -> PathBuf {
        self.config.output_dir.join("ready").join("signal")
    }

    fn hour_str(ts_ms: i64) -> String {
        Utc.timestamp_millis_opt(ts_ms)
            .single()
            .unwrap_or_else(Utc::now)
            .format("%Y%m%d-%H")
            .to_string()
    }

    fn jsonl_path(&self, symbol: &str, hour: &str) -> PathBuf {
        self.ready_dir().join(symbol).join(format!("signals-{hour}.jsonl"))
    }

    /// Writes one signal to every enabled sink. Errors from one sink don't
    /// prevent the other from being attempted, matching the Python writer's
    /// per-sink try/except.
    pub fn write(&self, signal: &SignalV2) -> Result<(), RiskCoreError> {
        let mut last_err = None;
        if self.jsonl_enabled {
            if let Err(e) = self.write_jsonl(signal) {
                error!(error = %e, "jsonl signal write failed");
                last_err = Some(e);
            }
        }
        if self.sqlite_enabled {
            if let Err(e) = self.write_sqlite(signal) {
                error!(error = %e, "sqlite signal write failed");
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write_jsonl(&self, signal: &SignalV2) -> Result<(), RiskCoreError> {
        std::fs::create_dir_all(self.ready_dir().join(&signal.symbol))
            .map_err(|e| RiskCoreError::Io(e.to_string()))?;

        let hour = Self::hour_str(signal.ts_ms);
        let key = (signal.symbol.clone(), hour.clone());

        let mut state = self.jsonl.lock();
        let rotated = state.last_key.as_ref() != Some(&key);
        if rotated {
            if let Some(mut old) = state.file.take() {
                old.sync_all().ok();
            }
            let path = self.jsonl_path(&signal.symbol, &hour);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| RiskCoreError::Io(e.to_string()))?;
            state.file = Some(file);
            state.last_key = Some(key);
        }

        let line = serde_json::to_string(signal).map_err(|e| RiskCoreError::Serialization(e.to_string()))?;
        if let Some(file) = state.file.as_mut() {
            writeln!(file, "{line}").map_err(|e| RiskCoreError::Io(e.to_string()))?;
            file.flush().map_err(|e| RiskCoreError::Io(e.to_string()))?;
            state.writes_since_fsync += 1;
            if rotated || state.writes_since_fsync >= self.config.fsync_every_n {
                file.sync_all().map_err(|e| RiskCoreError::Io(e.to_string()))?;
                state.writes_since_fsync = 0;
            }
        }
        Ok(())
    }

    fn ensure_sqlite_conn(&self, state: &mut SqliteState) -> Result<(), RiskCoreError> {
        if state.conn.is_some() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.config.output_dir).map_err(|e| RiskCoreError::Io(e.to_string()))?;
        let path: PathBuf = self.config.output_dir.join(&self.config.db_name);
        let conn = Connection::open(&path).map_err(|e| RiskCoreError::Storage(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| RiskCoreError::Storage(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| RiskCoreError::Storage(e.to_string()))?;
        conn.pragma_update(None, "temp_store", "MEMORY")
            .map_err(|e| RiskCoreError::Storage(e.to_string()))?;
        // ~20MB page cache; negative value is KiB per sqlite convention.
        conn.pragma_update(None, "cache_size", -20_000i64)
            .map_err(|e| RiskCoreError::Storage(e.to_string()))?;
        conn.busy_timeout(Duration::from_millis(5000))
            .map_err(|e| RiskCoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS signals (
                symbol TEXT NOT NULL,
                ts_ms INTEGER NOT NULL,
                signal_id TEXT NOT NULL,
                run_id TEXT NOT NULL,
                schema_version TEXT NOT NULL,
                score REAL NOT NULL,
                z_ofi REAL NOT NULL,
                z_cvd REAL NOT NULL,
                div_type TEXT,
                direction INTEGER NOT NULL,
                side_hint TEXT NOT NULL,
                consistency REAL NOT NULL,
                regime TEXT NOT NULL,
                gating INTEGER NOT NULL,
                decision_code TEXT NOT NULL,
                decision_reason TEXT,
                confirm INTEGER NOT NULL,
                gate_reasons TEXT NOT NULL,
                cooldown_ms INTEGER NOT NULL,
                expiry_ms INTEGER NOT NULL,
                config_hash TEXT NOT NULL,
                meta_json TEXT NOT NULL,
                PRIMARY KEY (symbol, ts_ms, signal_id)
            ) WITHOUT ROWID;
            CREATE INDEX IF NOT EXISTS idx_signals_symbol_ts ON signals (symbol, ts_ms);",
        )
        .map_err(|e| RiskCoreError::Storage(e.to_string()))?;
        state.conn = Some(conn);
        Ok(())
    }

    fn write_sqlite(&self, signal: &SignalV2) -> Result<(), RiskCoreError> {
        let mut state = self.sqlite.lock();
        state.batch.push(signal.clone());
        let should_flush = state.batch.len() >= self.config.sqlite_batch_n
            || state.last_flush.elapsed() >= Duration::from_millis(self.config.sqlite_flush_ms);
        if should_flush {
            self.flush_sqlite_batch(&mut state)?;
        }
        Ok(())
    }

    fn flush_sqlite_batch(&self, state: &mut SqliteState) -> Result<(), RiskCoreError> {
        if state.batch.is_empty() {
            return Ok(());
        }
        self.ensure_sqlite_conn(state)?;
        let batch = std::mem::take(&mut state.batch);

        let mut attempt = 0;
        loop {
            let result = (|| -> Result<(), RiskCoreError> {
                let conn = state.conn.as_mut().expect("connection ensured above");
                let tx = conn.transaction().map_err(|e| RiskCoreError::Storage(e.to_string()))?;
                for signal in &batch {
                    let gate_reasons = serde_json::to_string(&signal.gate_reasons)
                        .map_err(|e| RiskCoreError::Serialization(e.to_string()))?;
                    let meta_json = serde_json::to_string(&signal.meta)
                        .map_err(|e| RiskCoreError::Serialization(e.to_string()))?;
                    tx.execute(
                        "INSERT OR IGNORE INTO signals (
                            symbol, ts_ms, signal_id, run_id, schema_version, score, z_ofi, z_cvd,
                            div_type, direction, side_hint, consistency, regime, gating,
                            decision_code, decision_reason, confirm, gate_reasons, cooldown_ms,
                            expiry_ms, config_hash, meta_json
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                        params![
                            signal.symbol,
                            signal.ts_ms,
                            signal.signal_id,
                            signal.run_id,
                            signal.schema_version,
                            signal.score,
                            signal.z_ofi,
                            signal.z_cvd,
                            signal.div_type,
                            signal.direction,
                            signal.side_hint,
                            signal.consistency,
                            signal.regime,
                            signal.gating,
                            signal.decision_code.as_str(),
                            signal.decision_reason,
                            signal.confirm,
                            gate_reasons,
                            signal.cooldown_ms,
                            signal.expiry_ms,
                            signal.config_hash,
                            meta_json,
                        ],
                    )
                    .map_err(|e| RiskCoreError::Storage(e.to_string()))?;
                }
                tx.commit().map_err(|e| RiskCoreError::Storage(e.to_string()))?;
                Ok(())
            })();

            match result {
                Ok(()) => break,
                Err(e) if attempt < 2 => {
                    attempt += 1;
                    warn!(attempt, error = %e, "sqlite batch flush failed, retrying");
                    std::thread::sleep(Duration::from_millis(100 * (attempt as u64 + 1)));
                }
                Err(e) => {
                    error!(error = %e, "sqlite batch flush failed permanently, writing compensation file");
                    self.write_failed_batch(&batch)?;
                    return Err(e);
                }
            }
        }

        state.last_flush = Instant::now();
        Ok(())
    }

    fn write_failed_batch(&self, batch: &[SignalV2]) -> Result<(), RiskCoreError> {
        std::fs::create_dir_all(&self.config.output_dir).map_err(|e| RiskCoreError::Io(e.to_string()))?;
        let path: PathBuf = self.config.output_dir.join("failed_batches.jsonl");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| RiskCoreError::Io(e.to_string()))?;
        for signal in batch {
            let line = serde_json::to_string(signal).map_err(|e| RiskCoreError::Serialization(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| RiskCoreError::Io(e.to_string()))?;
        }
        debug!(count = batch.len(), path = %path.display(), "wrote compensation batch");
        Ok(())
    }

    /// Flushes any pending SQLite batch and fsyncs the current JSONL file.
    pub fn close(&self) -> Result<(), RiskCoreError> {
        if self.sqlite_enabled {
            let mut state = self.sqlite.lock();
            self.flush_sqlite_batch(&mut state)?;
            if let Some(conn) = state.conn.as_ref() {
                conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")
                    .map_err(|e| RiskCoreError::Storage(e.to_string()))?;
            }
            state.conn.take();
        }
        if self.jsonl_enabled {
            let mut state = self.jsonl.lock();
            if let Some(file) = state.file.as_mut() {
                file.sync_all().map_err(|e| RiskCoreError::Io(e.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Helper kept for tests and callers that want a scratch directory without
/// touching a shared `./var/signals`.
pub fn config_for_dir(dir: &Path) -> SignalWriterConfig {
    SignalWriterConfig {
        output_dir: dir.to_path_buf(),
        ..SignalWriterConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::schema::{DecisionCode, SignalMeta};

    fn sample_signal(seq: i64) -> SignalV2 {
        SignalV2::new(
            format!("run-BTCUSDT-{seq}-0"),
            "run".to_string(),
            "BTCUSDT".to_string(),
            1_700_000_000_000 + seq,
            1.5,
            2.0,
            2.1,
            None,
            1,
            0.8,
            "normal".to_string(),
            1,
            DecisionCode::Ok,
            None,
            true,
            vec![],
            30_000,
            60_000,
            "abc123".to_string(),
            SignalMeta::default(),
        )
    }

    #[test]
    fn dual_sink_write_creates_jsonl_and_sqlite_files() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = SignalWriter::new(config_for_dir(tmp.path()));
        writer.write(&sample_signal(1)).unwrap();
        writer.close().unwrap();

        let ready_dir = tmp.path().join("ready").join("signal");
        assert!(ready_dir.exists());
        let db_path = tmp.path().join("signals_v2.db");
        assert!(db_path.exists());
    }

    #[test]
    fn jsonl_only_sink_skips_sqlite_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_for_dir(tmp.path());
        config.sink_kind = SinkKind::Jsonl;
        let writer = SignalWriter::new(config);
        writer.write(&sample_signal(1)).unwrap();
        writer.close().unwrap();

        let db_path = tmp.path().join("signals_v2.db");
        assert!(!db_path.exists());
    }

    #[test]
    fn small_batch_threshold_flushes_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_for_dir(tmp.path());
        config.sink_kind = SinkKind::Sqlite;
        config.sqlite_batch_n = 1;
        let writer = SignalWriter::new(config);
        writer.write(&sample_signal(1)).unwrap();

        let conn = Connection::open(tmp.path().join("signals_v2.db")).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM signals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
