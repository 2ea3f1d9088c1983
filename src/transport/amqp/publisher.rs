//! Outbound side of the AMQP gateway

use super::messages::{outbound_envelope, MessageEnvelope, OUTBOUND_EXCHANGE_TYPE};
use crate::config::AmqpSettings;
use crate::error::{ChatError, Result};
use crate::metrics::MetricsCollector;
use crate::transport::{Transport, TransportError};
use crate::types::{OutboundMessage, ParticipantId};
use crate::utils::current_timestamp;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for outbound publishing
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub exchange: String,
    pub routing_key: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            exchange: "chat.outbound".to_string(),
            routing_key: "message.outbound".to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl From<&AmqpSettings> for GatewayConfig {
    fn from(settings: &AmqpSettings) -> Self {
        Self {
            exchange: settings.outbound_exchange.clone(),
            routing_key: settings.outbound_routing_key.clone(),
            max_retries: settings.max_retry_attempts,
            retry_delay_ms: settings.retry_delay_ms,
        }
    }
}

/// Publishes outbound text to the gateway exchange.
///
/// The broker accepting a message is all this side can observe, so only
/// publish failures surface as delivery failures.
pub struct AmqpGatewayTransport {
    channel: Channel,
    config: GatewayConfig,
    metrics_collector: Arc<MetricsCollector>,
}

impl AmqpGatewayTransport {
    /// Create the publisher and declare its exchange
    pub async fn new(
        channel: Channel,
        config: GatewayConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let transport = Self {
            channel,
            config,
            metrics_collector,
        };
        transport.setup_exchange().await?;
        Ok(transport)
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange, OUTBOUND_EXCHANGE_TYPE)
            .durable(true)
            .finish();
        self.channel
            .exchange_declare(args)
            .await
            .map_err(|e| ChatError::TransportFailed {
                message: format!(
                    "Failed to declare exchange {}: {}",
                    self.config.exchange, e
                ),
            })?;

        info!("Declared outbound exchange '{}'", self.config.exchange);
        Ok(())
    }

    /// Single publish attempt
    async fn try_publish(
        &self,
        envelope: &MessageEnvelope<OutboundMessage>,
    ) -> std::result::Result<(), TransportError> {
        let payload = envelope.to_bytes().map_err(|e| TransportError::Protocol {
            message: e.to_string(),
        })?;

        let args = BasicPublishArguments::new(&self.config.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| TransportError::Network {
                message: format!("Failed to publish message: {}", e),
            })
    }
}

#[async_trait]
impl Transport for AmqpGatewayTransport {
    async fn send(
        &self,
        participant: ParticipantId,
        text: &str,
    ) -> std::result::Result<(), TransportError> {
        let start = Instant::now();
        let envelope = outbound_envelope(
            OutboundMessage {
                participant,
                text: text.to_string(),
                timestamp: current_timestamp(),
            },
            &self.config.routing_key,
        );

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        let result = loop {
            match self.try_publish(&envelope).await {
                Ok(()) => {
                    debug!(
                        "Published message {} for participant {} to exchange {}",
                        envelope.correlation_id, participant, self.config.exchange
                    );
                    break Ok(());
                }
                Err(e) => {
                    self.metrics_collector.record_transport_error(e.kind());

                    retry_count += 1;
                    if !e.is_retryable() || retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} attempts: {}",
                            envelope.correlation_id, retry_count, e
                        );
                        break Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        };

        self.metrics_collector.record_transport_operation(
            "amqp_publish",
            result.is_ok(),
            start.elapsed(),
        );
        result
    }

    fn name(&self) -> &'static str {
        "amqp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.exchange, "chat.outbound");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 500);
    }

    #[test]
    fn test_gateway_config_from_settings() {
        let settings = AmqpSettings {
            outbound_exchange: "gateway.out".to_string(),
            outbound_routing_key: "text".to_string(),
            max_retry_attempts: 1,
            ..AmqpSettings::default()
        };
        let config = GatewayConfig::from(&settings);
        assert_eq!(config.exchange, "gateway.out");
        assert_eq!(config.routing_key, "text");
        assert_eq!(config.max_retries, 1);
    }
}
