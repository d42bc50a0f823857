//! Table collector (C2): snapshot open-table metadata, flush their
//! bitmaps, flush selected dirty pages. Grounded on `collect_tables`
//! in `ma_checkpoint.c`.

use std::sync::Arc;

use log::warn;

use crate::{
    collaborators::{
        InCheckpointState, LogManager, PageCache, TableRegistry, TableShare,
    },
    config::CheckpointConfig,
    error::{CheckpointErrorKind, SmallError},
    filters::{FilterParams, PageFilter},
    lsn::{CheckpointLevel, Lsn},
    record::TableRecordEntry,
};

pub struct CollectOutput {
    pub entries: Vec<TableRecordEntry>,
    pub dfiles: Vec<i32>,
    pub kfiles: Vec<i32>,
}

fn level_filter(level: CheckpointLevel) -> PageFilter {
    match level {
        CheckpointLevel::Full => PageFilter::Full,
        // Indirect/None callers of the collector don't flush
        // data/index pages beyond bitmaps; Medium is the common case
        // that does the two-checkpoint-rule flush.
        _ => PageFilter::Medium,
    }
}

/// Runs the full §4.2 algorithm once. Returns the collected records
/// and descriptor arrays on success, together with any per-share
/// errors that were logged and skipped (a non-empty sync-error subset
/// of which the executor must treat as fatal, per §7).
#[allow(clippy::too_many_arguments)]
pub fn collect(
    level: CheckpointLevel,
    checkpoint_start_log_horizon: Lsn,
    last_checkpoint_lsn: Lsn,
    registry: &dyn TableRegistry,
    log: &dyn LogManager,
    page_cache: &dyn PageCache,
    config: &CheckpointConfig,
) -> (CollectOutput, Vec<SmallError>) {
    // Steps 1-3: two passes under the table-registry lock.
    let mut collected: Vec<Arc<TableShare>> = Vec::new();
    registry.with_lock(&mut |shares| {
        for share in shares {
            if share.eligible_for_checkpoint() {
                share.mark_seen_in_loop();
            }
        }
        for share in shares {
            if share.in_checkpoint() == InCheckpointState::SeenInLoop {
                share.set_in_checkpoint(InCheckpointState::LooksAtMe);
                collected.push(Arc::clone(share));
            }
        }
    });

    let mut entries = Vec::with_capacity(collected.len());
    let mut dfiles = Vec::with_capacity(collected.len());
    let mut kfiles = Vec::with_capacity(collected.len());
    let mut errors = Vec::new();

    // Step 5: batch the state snapshot under the log lock, STATE_COPIES
    // shares at a time.
    for batch in collected.chunks(config.state_copies) {
        log.lock();
        let horizon = log.horizon();
        let snapshots: Vec<(Arc<TableShare>, Vec<u8>)> = batch
            .iter()
            .map(|s| (Arc::clone(s), s.snapshot_state()))
            .collect();
        log.unlock();

        // Step 6: per-share processing, serialised by the share's own
        // mutex (enforced by TableShare's interior-mutability methods),
        // outside the log lock.
        for (share, state_bytes) in snapshots {
            process_share(
                &share,
                &state_bytes,
                horizon,
                checkpoint_start_log_horizon,
                last_checkpoint_lsn,
                level,
                page_cache,
                &mut entries,
                &mut dfiles,
                &mut kfiles,
                &mut errors,
            );
        }
    }

    (
        CollectOutput {
            entries,
            dfiles,
            kfiles,
        },
        errors,
    )
}

#[allow(clippy::too_many_arguments)]
fn process_share(
    share: &Arc<TableShare>,
    state_bytes: &[u8],
    horizon: Lsn,
    checkpoint_start_log_horizon: Lsn,
    last_checkpoint_lsn: Lsn,
    level: CheckpointLevel,
    page_cache: &dyn PageCache,
    entries: &mut Vec<TableRecordEntry>,
    dfiles: &mut Vec<i32>,
    kfiles: &mut Vec<i32>,
    errors: &mut Vec<SmallError>,
) {
    let (data_fd, index_fd) = share.descriptors();

    // Skip if nothing recoverable / obsolete.
    if share.short_id == 0 || share.last_version() == 0 {
        release_share(share);
        return;
    }

    entries.push(TableRecordEntry {
        short_id: share.short_id,
        index_file_descriptor: index_fd,
        data_file_descriptor: data_fd,
        lsn_of_file_id: share.lsn_of_file_id(),
        open_file_name: share.open_file_name.clone(),
    });
    dfiles.push(data_fd);
    kfiles.push(index_fd);

    // Conditional state flush.
    if let Err(e) =
        share.flush_state_if_stale(checkpoint_start_log_horizon, horizon, state_bytes)
    {
        warn!(
            "checkpoint: state flush failed for share {}: {}",
            share.short_id, e
        );
        errors.push(SmallError::new(CheckpointErrorKind::StateFlush, &e.to_string()));
    }

    // Flush the share's bitmap into the page cache.
    if let Err(e) = page_cache.flush_bitmap(data_fd) {
        warn!(
            "checkpoint: bitmap flush failed for share {}: {}",
            share.short_id, e
        );
        errors.push(SmallError::new(CheckpointErrorKind::BitmapFlush, &e.to_string()));
    }

    // Flush the share's data-file and index-file dirty pages through
    // the chosen filter. The two-checkpoint rule: MEDIUM's horizon is
    // the *previous* checkpoint's LSN, not the current one, so only
    // pages dirtied since then are forced.
    let filter = level_filter(level);
    let mut params = FilterParams::new(true, share.pages_covered_by_bitmap);
    params.up_to_lsn = last_checkpoint_lsn;
    for descriptor in [data_fd, index_fd] {
        if descriptor < 0 {
            continue;
        }
        if let Err(e) = page_cache.flush_blocks_with_filter(descriptor, filter, &mut params) {
            warn!(
                "checkpoint: data flush failed for share {}: {}",
                share.short_id, e
            );
            errors.push(SmallError::new(CheckpointErrorKind::DataFlush, &e.to_string()));
        }
    }

    // fsync both descriptors (ignore "bad descriptor" errors — normal
    // during maintenance is the caller's business; here we surface
    // every fsync failure and let the executor decide severity).
    for e in share.fsync_descriptors() {
        errors.push(SmallError::new(CheckpointErrorKind::Fsync, &e.to_string()));
    }

    release_share(share);
}

fn release_share(share: &Arc<TableShare>) {
    // If the owner handed off the free duty to us (I5, ShouldFreeMe),
    // a real engine would drop the share's resources here; this crate
    // owns nothing further beyond the Arc, so clearing the flag is
    // enough either way.
    share.set_in_checkpoint(InCheckpointState::Clear);
}
