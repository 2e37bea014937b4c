use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{
    decode_event, expand_rows, resolve_publish_time, DeviceKind, MessageSource, RawMessage,
    RowSink,
};

/// Drives repeated pull → classify → route → acknowledge cycles against the
/// message source.
///
/// Failure policy: every pulled message is acknowledged, including malformed
/// and unroutable ones — a message that reached the routing stage is never
/// redelivered by us. Only source-level failures and the shutdown signal stop
/// the loop, and both paths close the sinks and the source before returning.
pub struct IngestLoop {
    source: Arc<dyn MessageSource>,
    sink: Box<dyn RowSink>,
    batch_size: usize,
    pull_wait: Duration,
}

impl IngestLoop {
    pub fn new(
        source: Arc<dyn MessageSource>,
        sink: Box<dyn RowSink>,
        batch_size: usize,
        pull_wait: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            batch_size,
            pull_wait,
        }
    }

    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        info!(
            batch_size = self.batch_size,
            pull_wait_secs = self.pull_wait.as_secs(),
            "starting ingestion loop"
        );

        let outcome = loop {
            let source = Arc::clone(&self.source);
            // Shutdown is honored here and during the blocking pull, never
            // mid-batch.
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("received shutdown signal, stopping ingestion loop");
                    break Ok(());
                }
                pulled = source.pull(self.batch_size, self.pull_wait) => {
                    match pulled {
                        Ok(batch) => {
                            if batch.is_empty() {
                                debug!("no messages received, continuing to listen");
                            } else {
                                self.process_batch(batch).await;
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "message source failed, shutting down");
                            break Err(e).context("pulling from message source");
                        }
                    }
                }
            }
        };

        self.shutdown().await;
        outcome
    }

    async fn process_batch(&mut self, batch: Vec<RawMessage>) {
        debug!(message_count = batch.len(), "processing batch");

        // One fallback instant, shared by every message in this batch that
        // lacks a usable publish time.
        let fallback = Utc::now();
        let mut tokens = Vec::with_capacity(batch.len());

        for message in &batch {
            tokens.push(message.ack_token);
            self.process_message(message, fallback);
        }

        let token_count = tokens.len();
        match self.source.acknowledge(tokens).await {
            Ok(()) => debug!(acknowledged = token_count, "acknowledged batch"),
            // Left on the queue; the transport redelivers on its own policy.
            Err(e) => error!(error = %e, "failed to acknowledge batch"),
        }
    }

    fn process_message(&mut self, message: &RawMessage, fallback: DateTime<Utc>) {
        let event = match decode_event(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "skipping malformed message");
                return;
            }
        };

        let resolved = resolve_publish_time(message.publish_time.as_ref(), fallback, &message.id);
        let date_key = resolved.date_key();
        debug!(
            message_id = %message.id,
            device_key = %event.device_key,
            published_at = %resolved.to_iso8601(),
            "resolved message time"
        );

        let kind = DeviceKind::from_device_key(&event.device_key);
        let rows = expand_rows(kind, &event.device_key, &event.readings);

        for row in &rows {
            if let Err(e) = self.sink.append(&date_key, row) {
                error!(
                    message_id = %message.id,
                    device_key = %event.device_key,
                    error = %e,
                    "failed to route row, dropping remainder of message"
                );
                return;
            }
        }

        if !rows.is_empty() {
            debug!(
                message_id = %message.id,
                device_key = %event.device_key,
                date = %date_key,
                rows = rows.len(),
                "routed message"
            );
        }
    }

    async fn shutdown(&mut self) {
        info!("closing daily sinks");
        self.sink.close_all();
        if let Err(e) = self.source.close().await {
            warn!(error = %e, "error closing message source");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AckToken, MockMessageSource, MockRowSink, PublishTime, SinkError};

    fn message(token: u64, payload: &[u8], publish_time: Option<PublishTime>) -> RawMessage {
        RawMessage {
            id: token.to_string(),
            publish_time,
            payload: payload.to_vec(),
            ack_token: AckToken(token),
        }
    }

    fn ruuvi_message(token: u64) -> RawMessage {
        message(
            token,
            br#"{"AA:BB:CC:DD:EE:FF":{"temperature":[20.1,20.3],"humidity":[55],"pressure":[]}}"#,
            Some(PublishTime {
                seconds: 1_717_243_200,
                nanos: 0,
            }),
        )
    }

    fn ingest_loop(source: MockMessageSource, sink: MockRowSink) -> IngestLoop {
        IngestLoop::new(
            Arc::new(source),
            Box::new(sink),
            10,
            Duration::from_secs(1),
        )
    }

    fn sorted_tokens(tokens: &[AckToken]) -> Vec<u64> {
        let mut sequences: Vec<u64> = tokens.iter().map(|t| t.0).collect();
        sequences.sort_unstable();
        sequences
    }

    #[tokio::test]
    async fn routes_rows_to_the_publish_date() {
        let mut source = MockMessageSource::new();
        source
            .expect_acknowledge()
            .times(1)
            .returning(|_| Ok(()));

        let mut sink = MockRowSink::new();
        sink.expect_append()
            .withf(|date_key, row| date_key == "2024-06-01" && row.sensor_type == "Ruuvitag")
            .times(2)
            .returning(|_, _| Ok(()));

        let mut ingest = ingest_loop(source, sink);
        ingest.process_batch(vec![ruuvi_message(1)]).await;
    }

    #[tokio::test]
    async fn acknowledges_every_pulled_message() {
        let mut source = MockMessageSource::new();
        source
            .expect_acknowledge()
            .withf(|tokens| sorted_tokens(tokens) == vec![1, 2, 3, 4])
            .times(1)
            .returning(|_| Ok(()));

        let mut sink = MockRowSink::new();
        sink.expect_append().returning(|_, _| Ok(()));

        let batch = vec![
            ruuvi_message(1),
            message(2, b"not json", None),
            message(3, br#"{"a":{},"b":{}}"#, None),
            message(4, br#"{"mystery":{"temperature":[1]}}"#, None),
        ];

        let mut ingest = ingest_loop(source, sink);
        ingest.process_batch(batch).await;
    }

    #[tokio::test]
    async fn unknown_device_emits_no_rows_but_is_acknowledged() {
        let mut source = MockMessageSource::new();
        source
            .expect_acknowledge()
            .withf(|tokens| sorted_tokens(tokens) == vec![7])
            .times(1)
            .returning(|_| Ok(()));

        let mut sink = MockRowSink::new();
        sink.expect_append().times(0);

        let batch = vec![message(7, br#"{"mystery":{"temperature":[1]}}"#, None)];
        let mut ingest = ingest_loop(source, sink);
        ingest.process_batch(batch).await;
    }

    #[tokio::test]
    async fn sink_failure_still_acknowledges_the_message() {
        let mut source = MockMessageSource::new();
        source
            .expect_acknowledge()
            .withf(|tokens| sorted_tokens(tokens) == vec![9])
            .times(1)
            .returning(|_| Ok(()));

        let mut sink = MockRowSink::new();
        sink.expect_append().times(1).returning(|_, _| {
            Err(SinkError::Io(std::io::Error::other("disk full")))
        });

        let batch = vec![ruuvi_message(9)];
        let mut ingest = ingest_loop(source, sink);
        ingest.process_batch(batch).await;
    }

    #[tokio::test]
    async fn acknowledge_failure_does_not_panic_or_retry() {
        let mut source = MockMessageSource::new();
        source.expect_acknowledge().times(1).returning(|_| {
            Err(crate::domain::SourceError::Acknowledge { failed: 1, total: 1 })
        });

        let mut sink = MockRowSink::new();
        sink.expect_append().returning(|_, _| Ok(()));

        let mut ingest = ingest_loop(source, sink);
        ingest.process_batch(vec![ruuvi_message(1)]).await;
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_loop_and_closes_everything() {
        let mut source = MockMessageSource::new();
        source.expect_pull().returning(|_, _| Ok(Vec::new()));
        source.expect_close().times(1).returning(|| Ok(()));

        let mut sink = MockRowSink::new();
        sink.expect_close_all().times(1).return_const(());

        let ctx = CancellationToken::new();
        ctx.cancel();

        let ingest = ingest_loop(source, sink);
        ingest.run(ctx).await.unwrap();
    }

    #[tokio::test]
    async fn pull_failure_shuts_the_loop_down_with_an_error() {
        let mut source = MockMessageSource::new();
        source.expect_pull().times(1).returning(|_, _| {
            Err(crate::domain::SourceError::Pull("connection reset".to_string()))
        });
        source.expect_close().times(1).returning(|| Ok(()));

        let mut sink = MockRowSink::new();
        sink.expect_close_all().times(1).return_const(());

        let ingest = ingest_loop(source, sink);
        let result = ingest.run(CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
