use crate::domain::{Row, SinkResult};

/// Destination for expanded rows, keyed by UTC calendar date.
///
/// Implementations own the open output handles; the ingestion loop is the
/// only caller, so no internal locking is required.
#[cfg_attr(test, mockall::automock)]
pub trait RowSink: Send {
    /// Append one row to the sink for `date_key`, creating it on first use.
    fn append(&mut self, date_key: &str, row: &Row) -> SinkResult<()>;

    /// Close every open sink, best effort. Individual failures are logged
    /// and do not stop the rest from closing.
    fn close_all(&mut self);
}
