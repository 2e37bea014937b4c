use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::domain::PublishTime;

/// A message's resolved UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTime {
    pub instant: DateTime<Utc>,
}

impl ResolvedTime {
    /// UTC calendar date key selecting the daily output file.
    pub fn date_key(&self) -> String {
        self.instant.format("%Y-%m-%d").to_string()
    }

    pub fn to_iso8601(&self) -> String {
        self.instant.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Resolve a message's publish time to a usable UTC instant.
///
/// An absent or zero-valued publish time, or one that does not convert to a
/// valid instant, falls back to the instant captured at the start of the
/// current batch. Never fails.
pub fn resolve_publish_time(
    raw: Option<&PublishTime>,
    fallback: DateTime<Utc>,
    message_id: &str,
) -> ResolvedTime {
    let Some(raw) = raw else {
        warn!(message_id, "message has no publish time, using batch fallback");
        return ResolvedTime { instant: fallback };
    };

    if raw.is_unset() {
        warn!(
            message_id,
            "message has an unset publish time, using batch fallback"
        );
        return ResolvedTime { instant: fallback };
    }

    match DateTime::from_timestamp(raw.seconds, raw.nanos) {
        Some(instant) => ResolvedTime { instant },
        None => {
            warn!(
                message_id,
                seconds = raw.seconds,
                nanos = raw.nanos,
                "publish time does not convert to a valid instant, using batch fallback"
            );
            ResolvedTime { instant: fallback }
        }
    }
}
