//! Checkpoint subsystem for a WAL-based transactional storage engine
//! (ARIES-style log + buffered page cache). See SPEC_FULL.md for the
//! full requirements this crate implements; DESIGN.md for the
//! grounding ledger.
//!
//! The log manager, transaction manager, page cache, control file and
//! table registry are external collaborators represented as traits in
//! [`collaborators`] — this crate depends only on those traits, never
//! on a concrete implementation of any of them.

pub mod collaborators;
pub mod collector;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod filters;
pub mod io;
pub mod lsn;
pub mod record;
pub mod types;
pub mod worker;

pub use collaborators::{
    ControlFile, DirtyPageInfo, LogManager, LogRecordKind, PageCache, PageType,
    TableRegistry, TableShare, TransactionManager, TxnSnapshot,
};
pub use config::CheckpointConfig;
pub use controller::{CheckpointOutcome, CheckpointStats, Controller};
pub use error::{CheckpointErrorKind, SmallError};
pub use lsn::{CheckpointLevel, Lsn};
pub use record::{CheckpointRecord, TableRecordEntry};
pub use worker::CheckpointService;

/// Initialise the `log`/`env_logger` backend the way every test in
/// this crate expects. Idempotent.
pub fn init_log() {
    use std::{io::Write, sync::Once};

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format_timestamp_secs()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} - {}] [{}:{}] {}",
                    record.level(),
                    record.target(),
                    record.file().unwrap_or("?"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .init();
    });
}
