//! Crate-wide error type.
//!
//! The teacher has no `thiserror` dependency; its own modules hand-roll
//! `Display` + `std::error::Error` enums (see
//! `backtest_v2::event_time::EventTimeError`) and reserve `anyhow` for
//! binary/async entry points. This follows the same split.

use std::fmt;

#[derive(Debug)]
pub enum RiskCoreError {
    Io(String),
    Serialization(String),
    Storage(String),
    Validation(Vec<String>),
    Config(String),
}

impl fmt::Display for RiskCoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskCoreError::Io(msg) => write!(f, "io error: {msg}"),
            RiskCoreError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            RiskCoreError::Storage(msg) => write!(f, "storage error: {msg}"),
            RiskCoreError::Validation(reasons) => write!(f, "validation failed: {}", reasons.join(", ")),
            RiskCoreError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for RiskCoreError {}

pub type Result<T> = std::result::Result<T, RiskCoreError>;
