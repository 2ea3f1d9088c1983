//! Inbound side of the AMQP gateway
//!
//! Deliveries from the inbound queue are decoded into `InboundEvent`s and
//! pushed into the chat handler's channel. Malformed messages are rejected
//! without requeue.

use super::messages::decode_inbound_event;
use crate::error::{ChatError, Result};
use crate::transport::InboundSource;
use crate::types::InboundEvent;
use amqprs::{
    channel::{
        BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, BasicNackArguments,
        Channel, QueueDeclareArguments,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Consumes the gateway's inbound queue
pub struct AmqpInboundSource {
    channel: Channel,
    queue: String,
    consumer_tag: String,
}

impl AmqpInboundSource {
    pub fn new(channel: Channel, queue: impl Into<String>) -> Self {
        Self {
            channel,
            queue: queue.into(),
            consumer_tag: format!("chat-consumer-{}", uuid::Uuid::new_v4()),
        }
    }

    async fn declare_queue(&self) -> Result<()> {
        let args = QueueDeclareArguments::new(&self.queue)
            .durable(true)
            .auto_delete(false)
            .finish();

        self.channel
            .queue_declare(args)
            .await
            .map_err(|e| ChatError::TransportFailed {
                message: format!("Failed to declare queue {}: {}", self.queue, e),
            })?;

        info!("Queue '{}' declared", self.queue);
        Ok(())
    }
}

#[async_trait]
impl InboundSource for AmqpInboundSource {
    async fn listen(&self, events: mpsc::Sender<InboundEvent>) -> Result<()> {
        self.declare_queue().await?;

        let args = BasicConsumeArguments::new(&self.queue, &self.consumer_tag);
        self.channel
            .basic_consume(EventConsumer::new(events.clone()), args)
            .await
            .map_err(|e| ChatError::TransportFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming inbound events from queue '{}'", self.queue);

        // Deliveries are handled by the consumer; wait until nobody reads them
        events.closed().await;

        self.channel
            .basic_cancel(BasicCancelArguments::new(&self.consumer_tag))
            .await
            .map_err(|e| ChatError::TransportFailed {
                message: format!("Failed to stop consuming: {}", e),
            })?;

        info!("Stopped consuming from queue '{}'", self.queue);
        Ok(())
    }
}

/// Internal consumer pushing decoded events into the channel
struct EventConsumer {
    events: mpsc::Sender<InboundEvent>,
}

impl EventConsumer {
    fn new(events: mpsc::Sender<InboundEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl AsyncConsumer for EventConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        debug!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag,
            deliver.routing_key(),
            content.len()
        );

        let event = match decode_inbound_event(&content) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed inbound message {}: {}", delivery_tag, e);
                if let Err(e) = channel
                    .basic_nack(BasicNackArguments::new(delivery_tag, false, false))
                    .await
                {
                    error!("Failed to nack message {}: {}", delivery_tag, e);
                }
                return;
            }
        };

        if self.events.send(event).await.is_err() {
            // Leave it unacked so the broker redelivers after we go away
            warn!(
                "Inbound channel closed, message {} left for redelivery",
                delivery_tag
            );
            return;
        }

        if let Err(e) = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
        {
            error!("Failed to ack message {}: {}", delivery_tag, e);
        }
    }
}
