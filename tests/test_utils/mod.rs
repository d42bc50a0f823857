//! Shared in-memory collaborator fakes for the checkpoint subsystem's
//! integration tests. Grounded on the teacher's `tests/test_utils/`
//! fixture style (small, reusable setup helpers rather than a mocking
//! framework) and on `src/btree/buffer_pool.rs`'s `HashMap`-backed
//! in-memory page map.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use checkpoint_engine::{
    collaborators::{
        ControlFile, DirtyPageInfo, InCheckpointState, LogManager, LogRecordKind, PageCache,
        PageType, TableIo, TableRegistry, TableShare, TransactionManager, TxnSnapshot,
    },
    error::{CheckpointErrorKind, SmallError},
    filters::{FilterDecision, FilterParams, PageFilter},
    init_log,
    lsn::Lsn,
    types::SmallResult,
};

pub fn setup() {
    init_log();
}

/// Records every `write_state`/`fsync_*` call so tests can assert on
/// what a share actually did, without touching the filesystem.
pub struct RecordingIo {
    pub written_state: Mutex<Vec<u8>>,
    pub data_fsyncs: Mutex<u32>,
    pub index_fsyncs: Mutex<u32>,
    pub fail_data_fsync: bool,
}

impl RecordingIo {
    pub fn new() -> Self {
        RecordingIo {
            written_state: Mutex::new(Vec::new()),
            data_fsyncs: Mutex::new(0),
            index_fsyncs: Mutex::new(0),
            fail_data_fsync: false,
        }
    }
}

impl TableIo for RecordingIo {
    fn write_state(&self, payload: &[u8]) -> SmallResult {
        *self.written_state.lock().unwrap() = payload.to_vec();
        Ok(())
    }
    fn fsync_index(&self) -> SmallResult {
        *self.index_fsyncs.lock().unwrap() += 1;
        Ok(())
    }
    fn fsync_data(&self) -> SmallResult {
        *self.data_fsyncs.lock().unwrap() += 1;
        if self.fail_data_fsync {
            return Err(SmallError::new(
                CheckpointErrorKind::Fsync,
                "injected data fsync failure",
            ));
        }
        Ok(())
    }
}

/// An in-memory log: a monotonically increasing horizon, a record
/// store, and the global lock/unlock pair the collaborator-ops wording
/// in the spec names explicitly.
pub struct FakeLog {
    inner: Mutex<FakeLogInner>,
}

struct FakeLogInner {
    horizon: Lsn,
    records: Vec<(LogRecordKind, Vec<u8>)>,
}

impl FakeLog {
    pub fn new(start: Lsn) -> Self {
        FakeLog {
            inner: Mutex::new(FakeLogInner {
                horizon: start,
                records: Vec::new(),
            }),
        }
    }

    pub fn records_count(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }
}

impl LogManager for FakeLog {
    fn horizon(&self) -> Lsn {
        self.inner.lock().unwrap().horizon
    }

    // Single-threaded fake: the real per-call lock()/unlock() pair
    // models a global mutex, which these tests don't need to exercise
    // concurrently.
    fn lock(&self) {}
    fn unlock(&self) {}

    fn append_record(&self, kind: LogRecordKind, payload: &[u8]) -> Result<Lsn, SmallError> {
        let mut inner = self.inner.lock().unwrap();
        let next = Lsn::new(inner.horizon.file_no(), inner.horizon.offset() + 1);
        inner.horizon = next;
        inner.records.push((kind, payload.to_vec()));
        Ok(next)
    }

    fn flush(&self, _up_to: Lsn) -> SmallResult {
        Ok(())
    }
}

/// A transaction manager with a fixed, settable snapshot; tests mutate
/// it before invoking a checkpoint to simulate active transactions.
pub struct FakeTxnManager {
    pub snapshot: Mutex<TxnSnapshot>,
}

impl FakeTxnManager {
    pub fn empty() -> Self {
        FakeTxnManager {
            snapshot: Mutex::new(TxnSnapshot {
                blob_a: Vec::new(),
                blob_b: Vec::new(),
                min_rec_lsn: Lsn::IMPOSSIBLE,
                min_first_undo_lsn: Lsn::IMPOSSIBLE,
            }),
        }
    }
}

impl TransactionManager for FakeTxnManager {
    fn collect_transactions(&self) -> TxnSnapshot {
        let s = self.snapshot.lock().unwrap();
        TxnSnapshot {
            blob_a: s.blob_a.clone(),
            blob_b: s.blob_b.clone(),
            min_rec_lsn: s.min_rec_lsn,
            min_first_undo_lsn: s.min_first_undo_lsn,
        }
    }
}

#[derive(Clone)]
pub struct FakePage {
    pub page_no: u64,
    pub page_type: PageType,
    pub rec_lsn: Lsn,
}

/// An in-memory page cache: a descriptor-keyed map of dirty pages plus
/// a write counter, grounded on `src/btree/buffer_pool.rs`'s page map.
pub struct FakePageCache {
    pages: Mutex<HashMap<i32, Vec<FakePage>>>,
    write_counter: Mutex<u64>,
    pub bitmap_flushes: Mutex<u32>,
}

impl FakePageCache {
    pub fn new() -> Self {
        FakePageCache {
            pages: Mutex::new(HashMap::new()),
            write_counter: Mutex::new(0),
            bitmap_flushes: Mutex::new(0),
        }
    }

    pub fn dirty(&self, descriptor: i32, page_no: u64, page_type: PageType, rec_lsn: Lsn) {
        self.pages
            .lock()
            .unwrap()
            .entry(descriptor)
            .or_insert_with(Vec::new)
            .push(FakePage {
                page_no,
                page_type,
                rec_lsn,
            });
        *self.write_counter.lock().unwrap() += 1;
    }

    pub fn remaining(&self, descriptor: i32) -> usize {
        self.pages
            .lock()
            .unwrap()
            .get(&descriptor)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl PageCache for FakePageCache {
    fn collect_changed_blocks_with_lsn(&self) -> (Vec<DirtyPageInfo>, Lsn) {
        let pages = self.pages.lock().unwrap();
        let mut out = Vec::new();
        let mut min_lsn = Lsn::IMPOSSIBLE;
        for (descriptor, list) in pages.iter() {
            for p in list {
                out.push(DirtyPageInfo {
                    descriptor: *descriptor,
                    page_no: p.page_no,
                    page_type: p.page_type,
                    rec_lsn: p.rec_lsn,
                });
                if !p.rec_lsn.is_impossible() && (min_lsn.is_impossible() || p.rec_lsn < min_lsn) {
                    min_lsn = p.rec_lsn;
                }
            }
        }
        (out, min_lsn)
    }

    fn flush_blocks_with_filter(
        &self,
        descriptor: i32,
        filter: PageFilter,
        params: &mut FilterParams,
    ) -> Result<u32, SmallError> {
        let mut pages = self.pages.lock().unwrap();
        let list = match pages.get_mut(&descriptor) {
            Some(l) => l,
            None => return Ok(0),
        };
        let mut flushed = 0u32;
        let mut remaining = Vec::new();
        for p in list.drain(..) {
            match filter.apply(p.page_type, p.page_no, p.rec_lsn, params) {
                FilterDecision::Flush => flushed += 1,
                FilterDecision::Skip | FilterDecision::SkipAndStop => remaining.push(p),
            }
        }
        *list = remaining;
        Ok(flushed)
    }

    fn flush_bitmap(&self, _descriptor: i32) -> SmallResult {
        *self.bitmap_flushes.lock().unwrap() += 1;
        Ok(())
    }

    fn write_counter(&self) -> u64 {
        *self.write_counter.lock().unwrap()
    }
}

pub struct FakeControlFile {
    lsn: Mutex<Lsn>,
    pub fail: bool,
}

impl FakeControlFile {
    pub fn new() -> Self {
        FakeControlFile {
            lsn: Mutex::new(Lsn::IMPOSSIBLE),
            fail: false,
        }
    }
}

impl ControlFile for FakeControlFile {
    fn write_and_force(&self, lsn: Lsn) -> SmallResult {
        if self.fail {
            return Err(SmallError::new(
                CheckpointErrorKind::ControlFileWrite,
                "injected control file failure",
            ));
        }
        *self.lsn.lock().unwrap() = lsn;
        Ok(())
    }

    fn last_checkpoint_lsn(&self) -> Lsn {
        *self.lsn.lock().unwrap()
    }
}

/// An in-memory table registry, grounded on `ma_checkpoint.c`'s global
/// `all_tables` list protected by a single lock.
pub struct FakeRegistry {
    shares: RwLock<Vec<Arc<TableShare>>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        FakeRegistry {
            shares: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, share: Arc<TableShare>) {
        self.shares.write().unwrap().push(share);
    }
}

impl TableRegistry for FakeRegistry {
    fn with_lock(&self, f: &mut dyn FnMut(&[Arc<TableShare>])) {
        let shares = self.shares.read().unwrap();
        f(&shares)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn new_share(
    short_id: u16,
    last_version: u32,
    pages_covered_by_bitmap: u32,
    open_file_name: &str,
    data_fd: i32,
    index_fd: i32,
    io: Box<dyn TableIo>,
) -> Arc<TableShare> {
    Arc::new(TableShare::new(
        short_id,
        true,
        false,
        false,
        last_version,
        pages_covered_by_bitmap,
        open_file_name,
        data_fd,
        index_fd,
        io,
    ))
}

pub fn obsolete_share(io: Box<dyn TableIo>) -> Arc<TableShare> {
    // last_version == 0 marks a share that was dropped from the table
    // cache mid-scan (§4.2's "obsolete share" edge case).
    new_share(9, 0, 4096, "dropped_table.dat", -1, -1, io)
}

#[allow(dead_code)]
pub fn assert_clear(share: &TableShare) {
    assert_eq!(share.in_checkpoint(), InCheckpointState::Clear);
}
