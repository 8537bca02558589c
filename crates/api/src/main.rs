//! Automation Engine - Main Entry Point

use anyhow::Context;
use api::{create_router, init_logging, wait_for_shutdown, AppState, ServiceConfig};
use cooldown::{CooldownSnapshot, CooldownTracker};
use dispatcher::{ActuatorSink, AlertSink, Dispatcher, EngineStats, MetricsObserver, Observer};
use metrics_exporter_prometheus::PrometheusBuilder;
use rule_engine::{Evaluator, LifecycleManager, ReadingPipeline};
use rule_store::RuleStore;
use rule_validator::Validator;
use sinks::{LogActuatorSink, LogAlertSink, MqttActuatorSink, MqttReadingSource, SqliteAlertSink};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logging)?;

    info!("=== Automation Engine v{} ===", env!("CARGO_PKG_VERSION"));

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    // Engine state
    let store = Arc::new(RuleStore::new());
    let cooldowns = Arc::new(CooldownTracker::new());
    let stats = EngineStats::new();
    let observer: Arc<dyn Observer> = Arc::new(MetricsObserver::new(Arc::clone(&stats)));
    let lifecycle = Arc::new(LifecycleManager::new(
        Arc::clone(&store),
        Arc::clone(&cooldowns),
        Validator::new(config.validation.clone()),
    ));

    if let Some(path) = &config.rules.path {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read rules from {}", path))?;
        lifecycle.load_drafts(&json)?;
    }
    if let Some(path) = &config.rules.cooldown_snapshot {
        if Path::new(path).exists() {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read cooldown snapshot {}", path))?;
            cooldowns.restore(&CooldownSnapshot::from_bytes(&bytes)?);
        }
    }

    // Sinks
    let alert_db = match &config.alerts.database_url {
        Some(url) => Some(SqliteAlertSink::connect(url).await?),
        None => None,
    };
    let alert_sink: Arc<dyn AlertSink> = match &alert_db {
        Some(db) => Arc::new(db.clone()),
        None => Arc::new(LogAlertSink),
    };

    let mqtt = config.mqtt.enabled.then(|| sinks::connect(&config.mqtt));
    let actuator_sink: Arc<dyn ActuatorSink> = match &mqtt {
        Some((client, _)) => Arc::new(MqttActuatorSink::new(
            client.clone(),
            &config.mqtt.command_topic_prefix,
        )),
        None => Arc::new(LogActuatorSink),
    };

    // Dispatch and evaluation
    let (dispatch, dispatch_worker) =
        Dispatcher::new(alert_sink, actuator_sink, Arc::clone(&observer), &config.dispatch)
            .channel(&config.dispatch);
    // finishes once the pipeline has released every dispatch handle
    let dispatch_task = tokio::spawn(dispatch_worker.run(std::future::pending()));

    let evaluator = Arc::new(Evaluator::new(
        Arc::clone(&store),
        Arc::clone(&cooldowns),
        Arc::new(dispatch),
        observer,
    ));
    let pipeline = ReadingPipeline::start(evaluator, &config.pipeline);

    let (stop_tx, stop_rx) = watch::channel(false);
    let mqtt_task = mqtt.map(|(client, eventloop)| {
        let source = MqttReadingSource::new(
            client,
            eventloop,
            &config.mqtt.reading_topic,
            pipeline.sender(),
        );
        let mut stop = stop_rx.clone();
        tokio::spawn(source.run(async move {
            let _ = stop.changed().await;
        }))
    });
    if mqtt_task.is_none() {
        info!("MQTT disabled; no reading source attached");
    }

    // Status API
    let state = Arc::new(AppState::new(
        Arc::clone(&lifecycle),
        stats,
        alert_db,
        Some(metrics),
    ));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;
    info!("Starting API server on {}", config.server.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    // Stop intake, drain readings, then let dispatch finish
    let _ = stop_tx.send(true);
    if let Some(task) = mqtt_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("MQTT reading source failed: {}", e),
            Err(e) => warn!("MQTT reading source panicked: {}", e),
        }
    }
    pipeline.shutdown().await;
    let dispatched = dispatch_task.await?;
    info!("Dispatched {} events", dispatched);

    if let Some(path) = &config.rules.cooldown_snapshot {
        let bytes = cooldowns.snapshot().to_bytes()?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write cooldown snapshot {}", path))?;
        info!("Saved cooldown snapshot to {}", path);
    }

    Ok(())
}
