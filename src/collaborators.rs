//! Interfaces to the systems this crate treats as external collaborators
//! (§1: log manager, transaction manager, page cache, control file,
//! table registry). A host engine implements these traits; this crate
//! never constructs a concrete log file, page cache, or table list of
//! its own. `tests/test_utils` carries in-memory fakes for the test
//! suite.

use std::sync::Mutex;

use crate::{
    error::SmallError,
    lsn::Lsn,
    types::SmallResult,
};

/// The category of a cached page. The filters (C1) only ever need to
/// know whether a page is a bitmap page of a data file or an
/// `LsnPage` carrying a `rec_lsn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Data,
    Index,
    Bitmap,
    LsnPage,
}

impl PageType {
    pub fn is_lsn_page(&self) -> bool {
        matches!(self, PageType::LsnPage)
    }
}

/// The linking flag between the table registry and an in-flight
/// checkpoint (I5). Transitions: `Clear -> SeenInLoop -> LooksAtMe ->
/// Clear`; a concurrent table-close instead sets `ShouldFreeMe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InCheckpointState {
    Clear,
    SeenInLoop,
    LooksAtMe,
    ShouldFreeMe,
}

/// File-level operations a table share needs during collection: write
/// its state block through the index-file descriptor, and fsync both
/// descriptors. Kept separate from `TableRegistry` because it is
/// per-share, not per-registry.
pub trait TableIo: Send + Sync {
    fn write_state(&self, payload: &[u8]) -> SmallResult;
    fn fsync_index(&self) -> SmallResult;
    fn fsync_data(&self) -> SmallResult;
}

struct ShareInner {
    in_checkpoint: InCheckpointState,
    last_version: u32,
    data_file_descriptor: i32,
    index_file_descriptor: i32,
    lsn_of_file_id: Lsn,
    is_of_horizon: Lsn,
    state: Vec<u8>,
}

/// Per-open-table object, mirroring `MARIA_SHARE` as far as the
/// checkpoint subsystem cares about it (§3). Fields set at table-open
/// time are plain; fields the checkpoint mutates during collection
/// live behind `intern_lock` (I4).
pub struct TableShare {
    pub short_id: u16,
    pub born_transactional: bool,
    pub temporary: bool,
    pub read_only: bool,
    pub pages_covered_by_bitmap: u32,
    pub open_file_name: String,
    io: Box<dyn TableIo>,
    intern_lock: Mutex<ShareInner>,
}

impl TableShare {
    pub fn new(
        short_id: u16,
        born_transactional: bool,
        temporary: bool,
        read_only: bool,
        last_version: u32,
        pages_covered_by_bitmap: u32,
        open_file_name: &str,
        data_file_descriptor: i32,
        index_file_descriptor: i32,
        io: Box<dyn TableIo>,
    ) -> Self {
        TableShare {
            short_id,
            born_transactional,
            temporary,
            read_only,
            pages_covered_by_bitmap,
            open_file_name: open_file_name.to_string(),
            io,
            intern_lock: Mutex::new(ShareInner {
                in_checkpoint: InCheckpointState::Clear,
                last_version,
                data_file_descriptor,
                index_file_descriptor,
                lsn_of_file_id: Lsn::IMPOSSIBLE,
                is_of_horizon: Lsn::IMPOSSIBLE,
                state: Vec::new(),
            }),
        }
    }

    /// Eligible for collection per §4.2 step 1: transactional,
    /// non-temporary, writable, and not already claimed by another
    /// in-flight checkpoint.
    pub fn eligible_for_checkpoint(&self) -> bool {
        let inner = self.intern_lock.lock().unwrap();
        self.born_transactional
            && !self.temporary
            && !self.read_only
            && inner.in_checkpoint == InCheckpointState::Clear
    }

    pub fn in_checkpoint(&self) -> InCheckpointState {
        self.intern_lock.lock().unwrap().in_checkpoint
    }

    pub fn set_in_checkpoint(&self, state: InCheckpointState) {
        self.intern_lock.lock().unwrap().in_checkpoint = state;
    }

    /// Conditionally flips `Clear -> SeenInLoop`; returns whether the
    /// flip happened, so the caller can count distinct-but-aliased
    /// shares exactly once (§4.2 step 1).
    pub fn mark_seen_in_loop(&self) -> bool {
        let mut inner = self.intern_lock.lock().unwrap();
        if inner.in_checkpoint == InCheckpointState::Clear {
            inner.in_checkpoint = InCheckpointState::SeenInLoop;
            true
        } else {
            false
        }
    }

    pub fn last_version(&self) -> u32 {
        self.intern_lock.lock().unwrap().last_version
    }

    pub fn descriptors(&self) -> (i32, i32) {
        let inner = self.intern_lock.lock().unwrap();
        (inner.data_file_descriptor, inner.index_file_descriptor)
    }

    pub fn lsn_of_file_id(&self) -> Lsn {
        self.intern_lock.lock().unwrap().lsn_of_file_id
    }

    /// Snapshot the in-memory state block verbatim, to be taken while
    /// the log lock is held by the caller (§4.2 step 5 / I3).
    pub fn snapshot_state(&self) -> Vec<u8> {
        self.intern_lock.lock().unwrap().state.clone()
    }

    pub fn is_of_horizon(&self) -> Lsn {
        self.intern_lock.lock().unwrap().is_of_horizon
    }

    /// Conditional state flush (§4.2 step 6): if the state was already
    /// flushed at or after `checkpoint_start_log_horizon`, skip; else
    /// stamp `is_of_horizon := horizon` and write `state_bytes` — a
    /// snapshot taken under the log lock by the caller (I3), not a
    /// fresh read, so the write reflects exactly what was current at
    /// horizon `horizon`.
    pub fn flush_state_if_stale(
        &self,
        checkpoint_start_log_horizon: Lsn,
        horizon: Lsn,
        state_bytes: &[u8],
    ) -> Result<bool, SmallError> {
        {
            let mut inner = self.intern_lock.lock().unwrap();
            if inner.is_of_horizon >= checkpoint_start_log_horizon {
                return Ok(false);
            }
            inner.is_of_horizon = horizon;
        }
        self.io.write_state(state_bytes)?;
        Ok(true)
    }

    pub fn fsync_descriptors(&self) -> Vec<SmallError> {
        let mut errors = Vec::new();
        if let Err(e) = self.io.fsync_index() {
            errors.push(e);
        }
        if let Err(e) = self.io.fsync_data() {
            errors.push(e);
        }
        errors
    }

    /// Sets the state payload; used by test fakes to simulate a
    /// dirtied in-memory state block.
    pub fn set_state(&self, bytes: Vec<u8>) {
        self.intern_lock.lock().unwrap().state = bytes;
    }
}

/// One appended record's kind. Only `Checkpoint` matters to this
/// crate; the log manager may support others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordKind {
    Checkpoint,
}

pub trait LogManager: Send + Sync {
    /// Current horizon: a strict lower bound for the next record's
    /// LSN. Safe to call without the lock, but callers that must pair
    /// a horizon read with a state snapshot (I3) take the lock first.
    fn horizon(&self) -> Lsn;

    fn lock(&self);
    fn unlock(&self);

    fn append_record(
        &self,
        kind: LogRecordKind,
        payload: &[u8],
    ) -> Result<Lsn, SmallError>;

    fn flush(&self, up_to: Lsn) -> SmallResult;

    /// Optional; defaults to a no-op. See SPEC_FULL.md §4 and §9 —
    /// purge safety was an open question in the original source and
    /// is left disabled unless a host engine opts in.
    fn purge(&self, _up_to: Lsn) -> SmallResult {
        Ok(())
    }
}

pub struct TxnSnapshot {
    pub blob_a: Vec<u8>,
    pub blob_b: Vec<u8>,
    pub min_rec_lsn: Lsn,
    pub min_first_undo_lsn: Lsn,
}

pub trait TransactionManager: Send + Sync {
    fn collect_transactions(&self) -> TxnSnapshot;
}

#[derive(Debug, Clone)]
pub struct DirtyPageInfo {
    pub descriptor: i32,
    pub page_no: u64,
    pub page_type: PageType,
    pub rec_lsn: Lsn,
}

pub trait PageCache: Send + Sync {
    /// Global snapshot for the checkpoint's page-blob (§6.1): every
    /// currently dirty page across all open files, plus the minimum
    /// `rec_lsn` among them (`LSN::IMPOSSIBLE` if none are dirty).
    fn collect_changed_blocks_with_lsn(&self) -> (Vec<DirtyPageInfo>, Lsn);

    /// Flush one file's pages selected by `filter`, in KEEP mode
    /// (pages stay resident after being written through). Returns the
    /// number of pages flushed.
    fn flush_blocks_with_filter(
        &self,
        descriptor: i32,
        filter: crate::filters::PageFilter,
        params: &mut crate::filters::FilterParams,
    ) -> Result<u32, SmallError>;

    fn flush_bitmap(&self, descriptor: i32) -> SmallResult;

    /// Monotonic counter incremented on every page write, used by the
    /// background worker's phase-0 short-circuit (§4.5).
    fn write_counter(&self) -> u64;
}

pub trait ControlFile: Send + Sync {
    fn write_and_force(&self, lsn: Lsn) -> SmallResult;
    fn last_checkpoint_lsn(&self) -> Lsn;
}

pub trait TableRegistry: Send + Sync {
    /// Run `f` with the table-registry lock held, handing it the
    /// current set of open shares. The lock is released as soon as
    /// `f` returns — callers must not retain share references past
    /// the call if they depend on registry-lock protection (only
    /// `intern_lock` protects a share afterwards).
    fn with_lock(&self, f: &mut dyn FnMut(&[std::sync::Arc<TableShare>]));
}
