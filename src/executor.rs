//! Checkpoint executor (C3): orchestrate the 4-step capture, write
//! the record, durability fence. Grounded on
//! `really_execute_checkpoint` in `ma_checkpoint.c`.

use log::debug;

use crate::{
    collaborators::{
        ControlFile, DirtyPageInfo, LogManager, LogRecordKind, PageCache, TableRegistry,
        TransactionManager,
    },
    collector,
    config::CheckpointConfig,
    error::{CheckpointErrorKind, SmallError},
    io::SmallWriter,
    lsn::{CheckpointLevel, Lsn},
    record::CheckpointRecord,
};

pub struct ExecuteOutcome {
    pub lsn: Lsn,
    pub pages_to_flush_before_next_checkpoint: u32,
    pub low_water_mark: Lsn,
    /// Descriptor cursors handed to the background worker for its
    /// paced `EVENLY` flush between checkpoints (§4.5 phase 1).
    pub dfiles: Vec<i32>,
    pub kfiles: Vec<i32>,
}

fn encode_dirty_pages(pages: &[DirtyPageInfo]) -> Vec<u8> {
    let mut w = SmallWriter::new();
    for p in pages {
        w.write(&p.descriptor);
        w.write(&p.page_no);
        w.write(&(p.page_type as u8));
        w.write(&p.rec_lsn.raw());
    }
    w.to_bytes()
}

fn min_ignoring_impossible(values: &[Lsn], fallback: Lsn) -> Lsn {
    values
        .iter()
        .filter(|l| !l.is_impossible())
        .min()
        .copied()
        .unwrap_or(fallback)
}

/// Precondition: the caller holds the controller slot (C4 serialises
/// calls into this function to one at a time).
#[allow(clippy::too_many_arguments)]
pub fn execute(
    level: CheckpointLevel,
    registry: &dyn TableRegistry,
    log: &dyn LogManager,
    txn_manager: &dyn TransactionManager,
    page_cache: &dyn PageCache,
    control_file: &dyn ControlFile,
    config: &CheckpointConfig,
) -> Result<ExecuteOutcome, SmallError> {
    // Step 1: capture the horizon. A memory fence as much as a value
    // read (I3).
    log.lock();
    let checkpoint_start_log_horizon = log.horizon();
    log.unlock();
    debug!(
        "checkpoint: starting level={} horizon={}",
        level, checkpoint_start_log_horizon
    );

    // Step 2: transaction-manager snapshot. Must precede step 4 — a
    // transaction clears its rec_lsn after stamping a page; reversing
    // the order would lose both (§4.3).
    let txn_snapshot = txn_manager.collect_transactions();

    // Step 3: table collector (uses page filters internally). The
    // MEDIUM filter's up_to_lsn is the *previous* checkpoint's LSN
    // (the two-checkpoint rule), not the horizon just captured above.
    let last_checkpoint_lsn = control_file.last_checkpoint_lsn();
    let (collected, share_errors) = collector::collect(
        level,
        checkpoint_start_log_horizon,
        last_checkpoint_lsn,
        registry,
        log,
        page_cache,
        config,
    );
    let sync_errors = share_errors
        .iter()
        .filter(|e| e.kind() == CheckpointErrorKind::Fsync)
        .count();
    if sync_errors > 0 {
        return Err(SmallError::new(
            CheckpointErrorKind::Fsync,
            &format!("{} descriptor(s) failed to sync during collection", sync_errors),
        ));
    }

    // Step 4: dirty-page snapshot, taken after the collector so pages
    // it already flushed no longer appear.
    let (dirty_pages, min_page_rec_lsn) = page_cache.collect_changed_blocks_with_lsn();
    let page_payload =
        CheckpointRecord::make_page_blob(dirty_pages.len() as u32, &encode_dirty_pages(&dirty_pages));

    let record = CheckpointRecord {
        horizon: checkpoint_start_log_horizon,
        txn_blob_a: txn_snapshot.blob_a,
        txn_blob_b: txn_snapshot.blob_b,
        tables: collected.entries,
        page_payload,
    };
    let record_bytes = record.encode();

    // Step 5: append and flush the log record.
    let lsn = log
        .append_record(LogRecordKind::Checkpoint, &record_bytes)
        .map_err(|e| SmallError::new(CheckpointErrorKind::LogAppend, &e.to_string()))?;
    log.flush(lsn)
        .map_err(|e| SmallError::new(CheckpointErrorKind::LogFlush, &e.to_string()))?;

    // Step 6: publish the LSN to the control file under the log lock,
    // so recovery never observes a control-file LSN whose log record
    // isn't yet durable (I2).
    log.lock();
    let control_result = control_file.write_and_force(lsn);
    log.unlock();
    control_result
        .map_err(|e| SmallError::new(CheckpointErrorKind::ControlFileWrite, &e.to_string()))?;

    // Step 7: publish the pacer budget.
    let pages_to_flush_before_next_checkpoint = record.dirty_page_count();

    // Step 8: low-water mark (I6) — never larger than any component.
    let low_water_mark = min_ignoring_impossible(
        &[
            min_page_rec_lsn,
            txn_snapshot.min_rec_lsn,
            txn_snapshot.min_first_undo_lsn,
            checkpoint_start_log_horizon,
        ],
        checkpoint_start_log_horizon,
    );

    debug!(
        "checkpoint: done lsn={} pages_pending={} low_water_mark={}",
        lsn, pages_to_flush_before_next_checkpoint, low_water_mark
    );

    if config.purge_logs {
        if let Err(e) = log.purge(low_water_mark) {
            debug!("checkpoint: log purge up to {} failed: {}", low_water_mark, e);
        }
    }

    Ok(ExecuteOutcome {
        lsn,
        pages_to_flush_before_next_checkpoint,
        low_water_mark,
        dfiles: collected.dfiles,
        kfiles: collected.kfiles,
    })
}
