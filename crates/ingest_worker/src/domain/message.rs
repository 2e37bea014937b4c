use std::time::Duration;

use async_trait::async_trait;

use crate::domain::SourceResult;

/// Opaque handle returned with a delivered message, presented back to the
/// source to confirm processing and prevent redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckToken(pub u64);

/// Raw publish timestamp as carried on the wire.
///
/// Both fields zero means the timestamp was never set by the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishTime {
    pub seconds: i64,
    pub nanos: u32,
}

impl PublishTime {
    pub fn is_unset(&self) -> bool {
        self.seconds == 0 && self.nanos == 0
    }
}

/// Queue envelope as delivered by the transport. Immutable once pulled.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Unique within the transport's delivery window.
    pub id: String,
    pub publish_time: Option<PublishTime>,
    pub payload: Vec<u8>,
    pub ack_token: AckToken,
}

/// Trait for the queue transport the ingestion loop drains.
///
/// Implementations own connection setup and transport specifics; the loop
/// only ever pulls batches and acknowledges tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Pull up to `max_messages` messages, waiting at most `wait` for the
    /// first one. An empty result is normal and means the wait expired.
    async fn pull(&self, max_messages: usize, wait: Duration) -> SourceResult<Vec<RawMessage>>;

    /// Acknowledge a batch of tokens in one request.
    async fn acknowledge(&self, tokens: Vec<AckToken>) -> SourceResult<()>;

    /// Close the transport connection. Unacknowledged messages are left for
    /// redelivery.
    async fn close(&self) -> SourceResult<()>;
}
