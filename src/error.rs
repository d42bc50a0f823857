use std::{error::Error, fmt};

use backtrace::Backtrace;

/// The classification of a checkpoint failure, matching the kinds a
/// host engine needs to distinguish when deciding whether a failed
/// checkpoint attempt is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointErrorKind {
    HorizonRead,
    TxnCollect,
    TableCollect,
    PageCollect,
    LogAppend,
    LogFlush,
    ControlFileWrite,
    StateFlush,
    BitmapFlush,
    DataFlush,
    Fsync,
}

impl fmt::Display for CheckpointErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CheckpointErrorKind::HorizonRead => "horizon_read",
            CheckpointErrorKind::TxnCollect => "txn_collect",
            CheckpointErrorKind::TableCollect => "table_collect",
            CheckpointErrorKind::PageCollect => "page_collect",
            CheckpointErrorKind::LogAppend => "log_append",
            CheckpointErrorKind::LogFlush => "log_flush",
            CheckpointErrorKind::ControlFileWrite => "control_file_write",
            CheckpointErrorKind::StateFlush => "state_flush",
            CheckpointErrorKind::BitmapFlush => "bitmap_flush",
            CheckpointErrorKind::DataFlush => "data_flush",
            CheckpointErrorKind::Fsync => "fsync",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug)]
pub struct SmallError {
    kind: CheckpointErrorKind,
    details: String,
}

impl SmallError {
    pub fn new(kind: CheckpointErrorKind, msg: &str) -> SmallError {
        SmallError {
            kind,
            details: msg.to_string(),
        }
    }

    pub fn kind(&self) -> CheckpointErrorKind {
        self.kind
    }

    /// Dump a backtrace to stderr. Call sites use this at the point an
    /// error is raised, not when it is handled, so the trace points at
    /// the actual failure.
    pub fn show_backtrace(&self) {
        let bt = Backtrace::new();
        eprintln!("error: {}\n{:?}", self, bt);
    }
}

impl fmt::Display for SmallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.details)
    }
}

impl Error for SmallError {
    fn description(&self) -> &str {
        &self.details
    }
}
