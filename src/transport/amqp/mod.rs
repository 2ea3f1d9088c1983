//! AMQP gateway transport
//!
//! For deployments where a separate gateway owns the chat platform: inbound
//! events arrive as JSON on a queue, outbound text is published to an exchange.

pub mod connection;
pub mod consumer;
pub mod messages;
pub mod publisher;

pub use connection::{AmqpConfig, AmqpConnection};
pub use consumer::AmqpInboundSource;
pub use messages::MessageEnvelope;
pub use publisher::{AmqpGatewayTransport, GatewayConfig};
