//! Main application state and service coordination
//!
//! This module wires storage, the pairing core, the chat handler and the
//! configured transport together, and runs the inbound dispatch loop and the
//! background tasks of the production service.

use crate::admin::AdminService;
use crate::audit::{AuditBufferConfig, BufferedAuditSink};
use crate::bot::ChatHandler;
use crate::config::{AppConfig, TransportKind, MAX_EVENT_LANES};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::pairing::{PairingEngine, Relay};
use crate::service::dispatch::EventDispatcher;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::store::{AuditSink, HistoryStore, InMemoryStore, ParticipantStore, SqliteStore};
use crate::transport::{
    AmqpConfig, AmqpConnection, AmqpGatewayTransport, AmqpInboundSource, GatewayConfig,
    InboundSource, TelegramConfig, TelegramTransport, Transport,
};
use crate::types::InboundEvent;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Transport connection error: {message}")]
    TransportConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// The three persistence roles, usually backed by one store
#[derive(Clone)]
pub struct Storage {
    pub participants: Arc<dyn ParticipantStore>,
    pub history: Arc<dyn HistoryStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl Storage {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ParticipantStore + HistoryStore + AuditSink + 'static,
    {
        Self {
            participants: store.clone(),
            history: store.clone(),
            audit: store,
        }
    }

    /// Open the SQLite database and apply migrations
    pub async fn sqlite(path: &str) -> Result<Self, ServiceError> {
        info!("Opening database at {}", path);
        let store = SqliteStore::connect(path)
            .await
            .map_err(|e| ServiceError::Storage {
                message: format!("Failed to open database {}: {}", path, e),
            })?;
        Ok(Self::from_store(Arc::new(store)))
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemoryStore::new()))
    }
}

/// Components shared by the dispatch loop, background tasks and health checks
pub struct ServiceContext {
    config: AppConfig,
    engine: PairingEngine,
    handler: ChatHandler,
    storage: Storage,
    audit_buffer: Arc<BufferedAuditSink>,
    admin: Arc<AdminService>,
    metrics_collector: Arc<MetricsCollector>,
    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl ServiceContext {
    /// Build the pairing core on top of `storage`, talking through `transport`.
    ///
    /// Audit writes from the relay go through a retry buffer; admin writes
    /// go straight to the store.
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn Transport>,
        storage: Storage,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        let engine = PairingEngine::with_metrics(metrics_collector.clone());

        let audit_buffer = Arc::new(BufferedAuditSink::new(
            storage.audit.clone(),
            AuditBufferConfig::from(&config.storage),
            metrics_collector.clone(),
        ));

        let relay = Relay::new(
            engine.clone(),
            transport,
            audit_buffer.clone(),
            storage.participants.clone(),
            metrics_collector.clone(),
        );
        let handler = ChatHandler::new(
            relay,
            storage.participants.clone(),
            metrics_collector.clone(),
        );

        let admin = Arc::new(
            AdminService::new(
                storage.participants.clone(),
                storage.history.clone(),
                storage.audit.clone(),
                config.admin.clone(),
            )
            .with_engine(engine.clone()),
        );

        Self {
            config,
            engine,
            handler,
            storage,
            audit_buffer,
            admin,
            metrics_collector,
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> &PairingEngine {
        &self.engine
    }

    pub fn handler(&self) -> &ChatHandler {
        &self.handler
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn audit_buffer(&self) -> Arc<BufferedAuditSink> {
        self.audit_buffer.clone()
    }

    pub fn admin(&self) -> Arc<AdminService> {
        self.admin.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// Main application state containing all service components
pub struct AppState {
    context: Arc<ServiceContext>,

    /// Source of inbound events
    inbound: Arc<dyn InboundSource>,

    /// Kept open for the lifetime of the AMQP transport
    amqp_connection: Option<AmqpConnection>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    listener_task: Option<JoinHandle<()>>,
    dispatch_task: Option<JoinHandle<()>>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing anonymous chat service");
        info!(
            "Configuration: service={}, transport={:?}, database={}",
            config.service.name, config.transport.kind, config.storage.database_path
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let storage = Storage::sqlite(&config.storage.database_path).await?;

        let mut amqp_connection = None;
        let transport: Arc<dyn Transport>;
        let inbound: Arc<dyn InboundSource>;
        match config.transport.kind {
            TransportKind::Telegram => {
                let telegram = Self::initialize_telegram(&config, metrics_collector.clone())?;
                transport = telegram.clone();
                inbound = telegram;
            }
            TransportKind::Amqp => {
                let (connection, gateway, source) =
                    Self::initialize_amqp(&config, metrics_collector.clone()).await?;
                amqp_connection = Some(connection);
                transport = gateway;
                inbound = source;
            }
        }

        let mut app_state =
            Self::with_components(config, transport, inbound, storage, metrics_collector);
        app_state.amqp_connection = amqp_connection;
        Ok(app_state)
    }

    /// Assemble the service from already constructed parts
    pub fn with_components(
        config: AppConfig,
        transport: Arc<dyn Transport>,
        inbound: Arc<dyn InboundSource>,
        storage: Storage,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };

        let context = Arc::new(ServiceContext::new(
            config,
            transport,
            storage,
            metrics_collector.clone(),
        ));

        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone())
                .with_context(context.clone()),
        );
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Self {
            context,
            inbound,
            amqp_connection: None,
            metrics_service,
            listener_task: None,
            dispatch_task: None,
            background_tasks: Vec::new(),
        }
    }

    pub fn context(&self) -> Arc<ServiceContext> {
        self.context.clone()
    }

    pub fn config(&self) -> &AppConfig {
        self.context.config()
    }

    pub async fn is_running(&self) -> bool {
        self.context.is_running().await
    }

    fn initialize_telegram(
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Arc<TelegramTransport>, ServiceError> {
        let telegram_config = TelegramConfig::from(&config.transport.telegram);
        info!("Using Telegram Bot API at {}", telegram_config.api_url);

        let transport = TelegramTransport::new(telegram_config, metrics_collector).map_err(|e| {
            ServiceError::TransportConnection {
                message: format!("Failed to create Telegram client: {}", e),
            }
        })?;
        Ok(Arc::new(transport))
    }

    /// Connect to the broker and set up the gateway publisher and consumer
    async fn initialize_amqp(
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<
        (
            AmqpConnection,
            Arc<AmqpGatewayTransport>,
            Arc<AmqpInboundSource>,
        ),
        ServiceError,
    > {
        let settings = &config.transport.amqp;
        let amqp_config =
            AmqpConfig::from_settings(settings).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;
        info!(
            "Connecting to AMQP broker at {}:{}",
            amqp_config.host, amqp_config.port
        );

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::TransportConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        let publish_channel =
            connection
                .open_channel()
                .await
                .map_err(|e| ServiceError::TransportConnection {
                    message: format!("Failed to open publisher channel: {}", e),
                })?;
        let gateway = AmqpGatewayTransport::new(
            publish_channel,
            GatewayConfig::from(settings),
            metrics_collector,
        )
        .await
        .map_err(|e| ServiceError::Initialization {
            message: format!("Failed to initialize gateway publisher: {}", e),
        })?;

        let consume_channel =
            connection
                .open_channel()
                .await
                .map_err(|e| ServiceError::TransportConnection {
                    message: format!("Failed to open consumer channel: {}", e),
                })?;
        let source = AmqpInboundSource::new(consume_channel, settings.inbound_queue.clone());

        Ok((connection, Arc::new(gateway), Arc::new(source)))
    }

    /// Start all background services and event consumption
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting anonymous chat service");

        self.context.set_running(true).await;

        self.start_metrics_service().await?;
        self.start_event_dispatch();
        self.start_background_tasks();

        info!("✅ Anonymous chat service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown.
    ///
    /// Inbound intake stops first; events already received are still handled
    /// until the shutdown timeout runs out.
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of anonymous chat service");

        self.context.set_running(false).await;

        if let Some(listener) = self.listener_task.take() {
            listener.abort();
            let _ = listener.await;
            info!("✅ Inbound listener stopped");
        }

        // The dispatch task ends once every lane has drained
        if let Some(mut dispatch) = self.dispatch_task.take() {
            match tokio::time::timeout(self.config().shutdown_timeout(), &mut dispatch).await {
                Ok(_) => info!("✅ All in-flight events handled"),
                Err(_) => {
                    warn!("⚠️  Shutdown timeout exceeded with events still in flight");
                    dispatch.abort();
                }
            }
        }

        self.stop_background_tasks().await;

        match self.context.audit_buffer().flush_pending().await {
            Ok(flushed) if flushed > 0 => info!("Flushed {} buffered audit records", flushed),
            Ok(_) => {}
            Err(e) => warn!("Final audit flush failed: {}", e),
        }
        let pending = self.context.audit_buffer().pending_count();
        if pending > 0 {
            error!("{} audit records could not be written before shutdown", pending);
        }

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        if let Some(connection) = self.amqp_connection.take() {
            if let Err(e) = connection.close().await {
                warn!("Failed to close AMQP connection: {}", e);
            }
        }

        let final_stats =
            self.context
                .engine()
                .stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final pairing statistics: {:?}", final_stats);
        info!("✅ Anonymous chat service shutdown completed");

        Ok(())
    }

    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config().service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.push(metrics_handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    /// Run the inbound listener and the dispatch loop feeding the handler
    fn start_event_dispatch(&mut self) {
        let (events_tx, events_rx) =
            mpsc::channel::<InboundEvent>(self.config().service.event_buffer_size);

        let inbound = self.inbound.clone();
        self.listener_task = Some(tokio::spawn(async move {
            info!("Inbound listener started");
            match inbound.listen(events_tx).await {
                Ok(()) => info!("Inbound listener stopped"),
                Err(e) => error!("Inbound listener failed: {}", e),
            }
        }));

        let service = &self.config().service;
        let lane_count = service.max_concurrent_events.clamp(1, MAX_EVENT_LANES);
        let lane_capacity = (service.event_buffer_size / lane_count).max(1);

        let handler = self.context.handler().clone();
        self.dispatch_task = Some(tokio::spawn(async move {
            let dispatcher = EventDispatcher::new(handler, lane_count, lane_capacity);
            let mut events = ReceiverStream::new(events_rx);
            info!(
                "Event dispatch started ({} participant lanes)",
                dispatcher.lane_count()
            );

            while let Some(event) = events.next().await {
                if !dispatcher.dispatch(event).await {
                    warn!("Event lane closed, stopping dispatch");
                    break;
                }
            }

            dispatcher.finish().await;
            info!("Event dispatch stopped");
        }));
    }

    /// Start background maintenance tasks
    fn start_background_tasks(&mut self) {
        info!("Starting background maintenance tasks...");

        let audit_task = {
            let audit_buffer = self.context.audit_buffer();
            let is_running = self.context.is_running.clone();
            tokio::spawn(audit_buffer.run_retry_loop(is_running))
        };

        info!("Starting pairing metrics update task (15s interval)...");
        let metrics_task = {
            let context = self.context.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(15));
                info!("Metrics update task started");

                while context.is_running().await {
                    interval.tick().await;

                    if let Err(e) = context.engine().refresh_metrics() {
                        warn!("Failed to refresh pairing metrics: {}", e);
                    }
                }

                info!("Metrics update task stopped");
            })
        };

        info!("Starting health metrics task (60s interval)...");
        let health_metrics_task = {
            let context = self.context.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                let metrics_collector = context.metrics_collector();
                info!("Health metrics task started");

                while context.is_running().await {
                    interval.tick().await;

                    let uptime_seconds = context.uptime().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    match HealthCheck::check(context.clone()).await {
                        Ok(health) => {
                            metrics_collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status != HealthStatus::Unhealthy,
                                );
                            }
                            debug!(
                                "Health: {} - {} active sessions, {} waiting, uptime {}s",
                                health.status,
                                health.stats.active_sessions,
                                health.stats.waiting_male
                                    + health.stats.waiting_female
                                    + health.stats.waiting_any,
                                uptime_seconds
                            );
                        }
                        Err(e) => warn!("Health check failed: {}", e),
                    }
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(audit_task);
        self.background_tasks.push(metrics_task);
        self.background_tasks.push(health_metrics_task);

        info!("3 background maintenance tasks started successfully");
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}

/// Transport that accepts every message without sending it anywhere
#[cfg(test)]
pub(crate) struct NullTransport;

#[cfg(test)]
#[async_trait::async_trait]
impl Transport for NullTransport {
    async fn send(
        &self,
        _participant: crate::types::ParticipantId,
        _text: &str,
    ) -> std::result::Result<(), crate::transport::TransportError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Context over in-memory storage, not yet running
#[cfg(test)]
pub(crate) fn test_context() -> Arc<ServiceContext> {
    let metrics_collector =
        Arc::new(MetricsCollector::new().expect("Failed to create metrics collector"));
    Arc::new(ServiceContext::new(
        AppConfig::default(),
        Arc::new(NullTransport),
        Storage::in_memory(),
        metrics_collector,
    ))
}
