//! Dry-run entry point: runs the behavior engine with no-op collaborators
//! so the decision logic can be observed from the logs alone.

use std::path::PathBuf;
use std::sync::Arc;
use suzu::{CompanionEngine, EngineConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("suzu.json"));
    let config = EngineConfig::load(&path)?;

    let engine = Arc::new(CompanionEngine::new(config));
    suzu::engine::tick::run(engine).await;
    Ok(())
}
