//! risk-core binary: loads configuration, builds the Core composition root,
//! and serves the HTTP exposition surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use risk_core::config::AppConfig;
use risk_core::core::Core;
use risk_core::http;
use risk_core::signals::config_hash::config_hash;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "risk_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Hashes every tunable that changes the effective decision/risk surface:
/// decision engine thresholds, rules/features versions, and the position,
/// guard and stops config feeding the Risk Manager — not just the two or
/// three fields that vary most often. A config change anywhere in this set
/// must change the fingerprint (§4.12).
fn config_fingerprint(config: &AppConfig) -> String {
    let mut map = BTreeMap::new();
    map.insert("run_id".to_string(), serde_json::Value::from(config.run_id.clone()));
    map.insert(
        "rules_ver".to_string(),
        serde_json::Value::from(config.core_algorithm.rules_ver.clone()),
    );
    map.insert(
        "features_ver".to_string(),
        serde_json::Value::from(config.core_algorithm.features_ver.clone()),
    );
    map.insert(
        "decision_engine".to_string(),
        serde_json::to_value(&config.decision_engine).unwrap_or_default(),
    );
    map.insert(
        "core_algorithm".to_string(),
        serde_json::to_value(&config.core_algorithm).unwrap_or_default(),
    );
    map.insert(
        "risk_params".to_string(),
        serde_json::to_value(&config.risk_params).unwrap_or_default(),
    );
    map.insert(
        "shadow".to_string(),
        serde_json::to_value(&config.shadow).unwrap_or_default(),
    );
    config_hash(&map)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    http::metrics::install();

    let toml_path = std::env::var("CORE_CONFIG_PATH").unwrap_or_else(|_| "core.toml".to_string());
    let config = AppConfig::load(Some(std::path::Path::new(&toml_path)))?;
    let fingerprint = config_fingerprint(&config);
    tracing::info!(config_hash = %fingerprint, run_id = %config.run_id, "starting risk-core");

    let bind = config.http_bind.clone();
    let core = Arc::new(Core::new(config, fingerprint));

    http::serve(core, &bind).await?;
    Ok(())
}
