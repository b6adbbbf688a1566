use std::{sync::Arc, time::Duration};

use specbridge_core::{
    config::{AppConfig, ConfigError},
    InMemoryDocumentStore, ScriptedCompletion,
};
use specbridge_slack::{
    dispatch::CommandDispatcher,
    events::default_dispatcher,
    followup::{FollowUpError, FollowUpQueue, FollowUpSender, ResponseUrlSender},
    handlers::default_registry,
    pipeline::WebhookPipeline,
    registry::RegistryError,
    replay::{ReplayGuard, DEFAULT_MAX_ENTRIES, DEFAULT_RETENTION},
    signature::SignatureVerifier,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub pipeline: Arc<WebhookPipeline>,
    pub followup_worker: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    FollowUp(#[from] FollowUpError),
    #[error("command registry could not be built: {0}")]
    Registry(#[from] RegistryError),
}

/// Wires the webhook pipeline from an already loaded configuration. Must run inside a
/// tokio runtime because it spawns the follow-up worker.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let sender: Arc<dyn FollowUpSender> = Arc::new(ResponseUrlSender::new(Duration::from_secs(
        config.dispatch.followup_timeout_secs,
    ))?);
    let (queue, followup_worker) =
        FollowUpQueue::start(config.dispatch.followup_queue_capacity, sender);

    let registry = default_registry(
        queue.clone(),
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(ScriptedCompletion),
    )?;
    info!(
        event_name = "system.bootstrap.registry_built",
        correlation_id = "bootstrap",
        commands = ?registry.command_names(),
        "command registry built"
    );

    let dispatcher = CommandDispatcher::new(Arc::new(registry))
        .with_response_deadline(Duration::from_millis(config.dispatch.response_deadline_ms))
        .with_follow_up_queue(queue.clone());
    let verifier = SignatureVerifier::from_config(&config.slack);
    let pipeline = WebhookPipeline::new(verifier, dispatcher, default_dispatcher(queue))
        .with_replay_guard(ReplayGuard::new(replay_retention(&config), DEFAULT_MAX_ENTRIES));

    info!(
        event_name = "system.bootstrap.pipeline_ready",
        correlation_id = "bootstrap",
        signing_secret_configured = config.slack.has_signing_secret(),
        replay_window_secs = config.slack.replay_window_secs,
        "webhook pipeline ready"
    );

    Ok(Application { config, pipeline: Arc::new(pipeline), followup_worker })
}

/// Keys live for one window past the later of receipt and the signed timestamp, which
/// covers every request the verifier still accepts. A disabled window falls back to the
/// default retention.
fn replay_retention(config: &AppConfig) -> Duration {
    match config.slack.replay_window_secs {
        0 => DEFAULT_RETENTION,
        secs => Duration::from_secs(secs),
    }
}
