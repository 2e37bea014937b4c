use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer::PullConsumer, Message};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::domain::{
    AckToken, MessageSource, PublishTime, RawMessage, SourceError, SourceResult,
};

/// [`MessageSource`] backed by a durable NATS JetStream pull consumer.
///
/// Delivered messages are parked here, keyed by their ack token (the stream
/// sequence number), until the ingestion loop acknowledges the batch. Tokens
/// never acknowledged are dropped on close and redelivered by the server.
pub struct JetStreamSource {
    consumer: PullConsumer,
    pending: Mutex<HashMap<AckToken, Message>>,
}

impl JetStreamSource {
    pub async fn create(
        jetstream: &jetstream::Context,
        stream_name: &str,
        consumer_name: &str,
        subject_filter: &str,
    ) -> Result<Self> {
        debug!(
            stream = stream_name,
            consumer = consumer_name,
            subject = subject_filter,
            "Creating JetStream consumer"
        );

        // Create or get existing durable consumer
        let consumer = jetstream
            .create_consumer_on_stream(
                jetstream::consumer::pull::Config {
                    name: Some(consumer_name.to_string()),
                    durable_name: Some(consumer_name.to_string()),
                    filter_subject: subject_filter.to_string(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
                stream_name,
            )
            .await
            .context("Failed to create consumer")?;

        info!(
            stream = stream_name,
            consumer = consumer_name,
            "Consumer created successfully"
        );

        Ok(Self {
            consumer,
            pending: Mutex::new(HashMap::new()),
        })
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<AckToken, Message>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MessageSource for JetStreamSource {
    async fn pull(&self, max_messages: usize, wait: Duration) -> SourceResult<Vec<RawMessage>> {
        let mut batch = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| SourceError::Pull(e.to_string()))?;

        let mut messages = Vec::new();
        while let Some(result) = batch.next().await {
            match result {
                Ok(msg) => match raw_message(&msg) {
                    Some(raw) => {
                        self.pending().insert(raw.ack_token, msg);
                        messages.push(raw);
                    }
                    None => {
                        warn!("message without stream metadata, leaving for redelivery");
                    }
                },
                Err(e) => {
                    warn!(error = %e, "error receiving message from batch");
                }
            }
        }

        Ok(messages)
    }

    async fn acknowledge(&self, tokens: Vec<AckToken>) -> SourceResult<()> {
        let total = tokens.len();
        let mut failed = 0usize;

        for token in tokens {
            let msg = self.pending().remove(&token);
            let Some(msg) = msg else {
                warn!(sequence = token.0, "unknown ack token");
                failed += 1;
                continue;
            };
            if let Err(e) = msg.ack().await {
                warn!(error = %e, sequence = token.0, "failed to acknowledge message");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(SourceError::Acknowledge { failed, total });
        }
        Ok(())
    }

    async fn close(&self) -> SourceResult<()> {
        // The connection itself closes when the client is dropped.
        let mut pending = self.pending();
        if !pending.is_empty() {
            debug!(
                unacknowledged = pending.len(),
                "dropping unacknowledged messages for redelivery"
            );
        }
        pending.clear();
        Ok(())
    }
}

fn raw_message(msg: &Message) -> Option<RawMessage> {
    let info = msg.info().ok()?;
    let publish_time = PublishTime {
        seconds: info.published.unix_timestamp(),
        nanos: info.published.nanosecond(),
    };
    Some(RawMessage {
        id: info.stream_sequence.to_string(),
        publish_time: Some(publish_time),
        payload: msg.payload.to_vec(),
        ack_token: AckToken(info.stream_sequence),
    })
}
