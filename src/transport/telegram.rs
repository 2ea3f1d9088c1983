//! Telegram Bot API transport
//!
//! Outbound text goes through `sendMessage`; inbound updates are read with
//! `getUpdates` long polling. Only text messages become inbound events.

use super::{InboundSource, Transport, TransportError};
use crate::config::TelegramSettings;
use crate::error::{ChatError, Result};
use crate::metrics::MetricsCollector;
use crate::types::{InboundEvent, ParticipantId, ParticipantProfile};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Connection settings for the Bot API
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_url: String,
    pub poll_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl From<&TelegramSettings> for TelegramConfig {
    fn from(settings: &TelegramSettings) -> Self {
        Self {
            bot_token: settings.bot_token.clone(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            poll_timeout: Duration::from_secs(settings.poll_timeout_seconds),
            max_retries: settings.max_retry_attempts,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

/// Envelope every Bot API response is wrapped in
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: ParticipantId,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
    allowed_updates: Vec<&'static str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub date: i64,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

impl Update {
    /// Convert a text update from a human into an inbound event
    pub fn into_inbound_event(self) -> Option<InboundEvent> {
        let message = self.message?;
        let text = message.text?;

        let (participant, profile) = match message.from {
            Some(user) if user.is_bot => return None,
            Some(user) => (
                user.id,
                Some(ParticipantProfile {
                    id: user.id,
                    username: user.username,
                    first_name: user.first_name,
                    last_name: user.last_name,
                }),
            ),
            None => (message.chat.id, None),
        };

        Some(InboundEvent {
            participant,
            profile,
            payload: text,
            received_at: DateTime::from_timestamp(message.date, 0)
                .unwrap_or_else(current_timestamp),
        })
    }
}

/// Map a failed Bot API call to a transport error.
///
/// 403 means the user blocked the bot or deactivated the account. A 400 about
/// the chat itself means the same thing for our purposes.
fn classify_failure(
    participant: ParticipantId,
    status: StatusCode,
    description: &str,
) -> TransportError {
    let lowered = description.to_lowercase();
    match status.as_u16() {
        403 => TransportError::Unreachable {
            participant,
            reason: description.to_string(),
        },
        400 if lowered.contains("chat not found")
            || lowered.contains("user not found")
            || lowered.contains("deactivated") =>
        {
            TransportError::Unreachable {
                participant,
                reason: description.to_string(),
            }
        }
        400 => TransportError::Rejected {
            reason: description.to_string(),
        },
        429 | 500..=599 => TransportError::Network {
            message: format!("status {}: {}", status, description),
        },
        _ => TransportError::Protocol {
            message: format!("unexpected status {}: {}", status, description),
        },
    }
}

/// Bot API client implementing both transport directions
pub struct TelegramTransport {
    config: TelegramConfig,
    client: Client,
    next_offset: AtomicI64,
    metrics_collector: Arc<MetricsCollector>,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig, metrics_collector: Arc<MetricsCollector>) -> Result<Self> {
        // Long polls hold the request open for poll_timeout
        let client = Client::builder()
            .timeout(config.poll_timeout + Duration::from_secs(10))
            .build()
            .map_err(|e| ChatError::ConfigurationError {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            client,
            next_offset: AtomicI64::new(0),
            metrics_collector,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.config.api_url, self.config.bot_token, method)
    }

    fn network_error(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Network {
                message: format!("Request timed out: {}", e),
            }
        } else if e.is_connect() {
            TransportError::Network {
                message: format!("Connection failed: {}", e),
            }
        } else {
            TransportError::Network {
                message: e.to_string(),
            }
        }
    }

    /// Single sendMessage attempt; returns the retry-after hint on rate limits
    async fn try_send(
        &self,
        participant: ParticipantId,
        text: &str,
    ) -> std::result::Result<(), (TransportError, Option<Duration>)> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest {
                chat_id: participant,
                text,
            })
            .send()
            .await
            .map_err(|e| (Self::network_error(e), None))?;

        let status = response.status();
        let body: ApiResponse<serde_json::Value> = response.json().await.map_err(|e| {
            (
                TransportError::Protocol {
                    message: format!("Failed to parse sendMessage response: {}", e),
                },
                None,
            )
        })?;

        if status.is_success() && body.ok {
            return Ok(());
        }

        let status = body
            .error_code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(status);
        let description = body.description.unwrap_or_default();
        let retry_after = body
            .parameters
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs);

        Err((classify_failure(participant, status, &description), retry_after))
    }

    /// Fetch the next batch of updates and advance the offset
    pub async fn poll_once(&self) -> std::result::Result<Vec<Update>, TransportError> {
        let timer = self.metrics_collector.start_timer();
        let request = GetUpdatesRequest {
            offset: self.next_offset.load(Ordering::SeqCst),
            timeout: self.config.poll_timeout.as_secs(),
            allowed_updates: vec!["message"],
        };

        let result = async {
            let response = self
                .client
                .post(self.method_url("getUpdates"))
                .json(&request)
                .send()
                .await
                .map_err(Self::network_error)?;

            let status = response.status();
            let body: ApiResponse<Vec<Update>> =
                response.json().await.map_err(|e| TransportError::Protocol {
                    message: format!("Failed to parse getUpdates response: {}", e),
                })?;

            if !body.ok {
                return Err(TransportError::Protocol {
                    message: format!(
                        "getUpdates failed with status {}: {}",
                        status,
                        body.description.unwrap_or_default()
                    ),
                });
            }

            Ok(body.result.unwrap_or_default())
        }
        .await;

        self.metrics_collector.record_transport_operation(
            "telegram_get_updates",
            result.is_ok(),
            timer.stop(),
        );

        let updates = result?;
        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.next_offset.store(last + 1, Ordering::SeqCst);
        }
        Ok(updates)
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(
        &self,
        participant: ParticipantId,
        text: &str,
    ) -> std::result::Result<(), TransportError> {
        let start = Instant::now();
        let mut retry_count = 0;
        let mut delay = self.config.retry_delay;

        let result = loop {
            match self.try_send(participant, text).await {
                Ok(()) => break Ok(()),
                Err((e, retry_after)) => {
                    self.metrics_collector.record_transport_error(e.kind());

                    if !e.is_retryable() {
                        break Err(e);
                    }

                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to send message to {} after {} retries: {}",
                            participant, self.config.max_retries, e
                        );
                        break Err(e);
                    }

                    let wait = retry_after.unwrap_or(delay);
                    warn!(
                        "Send attempt {} to {} failed: {}. Retrying in {:?}",
                        retry_count, participant, e, wait
                    );
                    sleep(wait).await;
                    delay = (delay * 2).min(Duration::from_secs(5));
                }
            }
        };

        self.metrics_collector.record_transport_operation(
            "telegram_send",
            result.is_ok(),
            start.elapsed(),
        );
        result
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[async_trait]
impl InboundSource for TelegramTransport {
    async fn listen(&self, events: mpsc::Sender<InboundEvent>) -> Result<()> {
        info!(
            "Starting Telegram long polling (timeout {}s)",
            self.config.poll_timeout.as_secs()
        );
        let mut backoff = self.config.retry_delay;

        while !events.is_closed() {
            let updates = match self.poll_once().await {
                Ok(updates) => {
                    backoff = self.config.retry_delay;
                    updates
                }
                Err(e) => {
                    warn!("getUpdates failed: {}. Retrying in {:?}", e, backoff);
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(30));
                    continue;
                }
            };

            debug!("Received {} Telegram updates", updates.len());

            for update in updates {
                let update_id = update.update_id;
                let Some(event) = update.into_inbound_event() else {
                    debug!("Skipping non-text update {}", update_id);
                    continue;
                };

                if events.send(event).await.is_err() {
                    info!("Inbound channel closed, stopping Telegram polling");
                    return Ok(());
                }
            }
        }

        info!("Telegram polling stopped");
        Ok(())
    }
}
