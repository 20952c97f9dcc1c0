use std::sync::Arc;

use flightdesk_agent::AgentRuntime;
use flightdesk_core::audit::TracingAuditSink;
use flightdesk_core::config::{AppConfig, ConfigError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("runtime wiring failed: {0:#}")]
    Runtime(anyhow::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let runtime = AgentRuntime::from_config(&config)
        .map_err(BootstrapError::Runtime)?
        .with_audit_sink(Arc::new(TracingAuditSink));

    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        extractor = runtime.extractor_name(),
        search_provider = runtime.coordinator().provider_name(),
        booking_provider = runtime.booking_provider_name(),
        "agent runtime wired"
    );

    Ok(Application { config, runtime: Arc::new(runtime) })
}
