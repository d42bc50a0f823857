//! Background worker (C5): periodic checkpoint plus paced flushing
//! between checkpoints. Grounded on `ma_checkpoint_background`,
//! `ma_checkpoint_init` and `ma_checkpoint_end` in `ma_checkpoint.c`.

use std::{
    sync::{Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
};

use log::{debug, error, warn};

use crate::{
    collaborators::{ControlFile, LogManager, PageCache, TableRegistry, TransactionManager},
    config::CheckpointConfig,
    controller::{CheckpointOutcome, Controller},
    filters::{FilterParams, PageFilter},
    lsn::{CheckpointLevel, Lsn},
};

struct PacerState {
    pages_to_flush_before_next_checkpoint: u32,
    dfiles: Vec<i32>,
    kfiles: Vec<i32>,
}

impl PacerState {
    fn new() -> Self {
        PacerState {
            pages_to_flush_before_next_checkpoint: 0,
            dfiles: Vec::new(),
            kfiles: Vec::new(),
        }
    }
}

fn pace_tick(
    bunch: u32,
    up_to_lsn: Lsn,
    state: &PacerState,
    dfile_cursor: &mut usize,
    kfile_cursor: &mut usize,
    page_cache: &dyn PageCache,
) {
    if bunch == 0 {
        return;
    }
    let mut params = FilterParams::new(true, 0);
    params.up_to_lsn = up_to_lsn;
    params.max_pages = bunch;

    while *dfile_cursor < state.dfiles.len() && params.max_pages > 0 {
        let fd = state.dfiles[*dfile_cursor];
        if let Err(e) = page_cache.flush_blocks_with_filter(fd, PageFilter::Evenly, &mut params) {
            warn!("checkpoint: background data flush failed for fd {}: {}", fd, e);
        }
        if params.max_pages == 0 {
            return;
        }
        *dfile_cursor += 1;
    }

    while *kfile_cursor < state.kfiles.len() && params.max_pages > 0 {
        let fd = state.kfiles[*kfile_cursor];
        if let Err(e) = page_cache.flush_blocks_with_filter(fd, PageFilter::Evenly, &mut params) {
            warn!("checkpoint: background index flush failed for fd {}: {}", fd, e);
        }
        if params.max_pages == 0 {
            return;
        }
        *kfile_cursor += 1;
    }
}

#[allow(clippy::too_many_arguments)]
fn run_background_loop(
    controller: Arc<Controller>,
    registry: Arc<dyn TableRegistry>,
    log: Arc<dyn LogManager>,
    txn_manager: Arc<dyn TransactionManager>,
    page_cache: Arc<dyn PageCache>,
    control_file: Arc<dyn ControlFile>,
    config: CheckpointConfig,
    shutdown: Arc<(Mutex<bool>, Condvar)>,
) {
    let mut tick: u32 = 0;
    let mut last_horizon = Lsn::IMPOSSIBLE;
    let mut last_write_counter: u64 = 0;
    let mut state = PacerState::new();
    let mut bunch: u32 = 0;
    let mut dfile_cursor = 0usize;
    let mut kfile_cursor = 0usize;

    loop {
        let (lock, cvar) = &*shutdown;
        let guard = lock.lock().unwrap();
        let (guard, _timeout) = cvar.wait_timeout(guard, config.sleep_unit).unwrap();
        let died = *guard;
        drop(guard);
        if died {
            break;
        }

        if tick == 0 {
            let horizon = log.horizon();
            let write_counter = page_cache.write_counter();
            if horizon == last_horizon && write_counter == last_write_counter {
                debug!("checkpoint: background tick 0, nothing changed, skipping");
            } else {
                match controller.request(
                    CheckpointLevel::Medium,
                    true,
                    registry.as_ref(),
                    log.as_ref(),
                    txn_manager.as_ref(),
                    page_cache.as_ref(),
                    control_file.as_ref(),
                    &config,
                ) {
                    Ok(CheckpointOutcome::Ran(outcome)) => {
                        state.pages_to_flush_before_next_checkpoint =
                            outcome.pages_to_flush_before_next_checkpoint;
                        state.dfiles = outcome.dfiles;
                        state.kfiles = outcome.kfiles;
                    }
                    Ok(CheckpointOutcome::AlreadySatisfied) => {
                        debug!("checkpoint: background tick 0, a stronger checkpoint already running");
                    }
                    Err(e) => {
                        warn!("checkpoint: background checkpoint failed: {}", e);
                    }
                }
            }
            last_horizon = horizon;
            last_write_counter = write_counter;
        } else if tick == 1 {
            bunch = state.pages_to_flush_before_next_checkpoint / config.time_between_checkpoints;
            dfile_cursor = 0;
            kfile_cursor = 0;
        } else {
            pace_tick(
                bunch,
                control_file.last_checkpoint_lsn(),
                &state,
                &mut dfile_cursor,
                &mut kfile_cursor,
                page_cache.as_ref(),
            );
        }

        tick += 1;
        if tick >= config.time_between_checkpoints {
            tick = 0;
        }
    }

    // Unconditionally perform one final FULL checkpoint before dying,
    // so a clean shutdown always leaves an empty recovery set (I6).
    if let Err(e) = controller.request(
        CheckpointLevel::Full,
        false,
        registry.as_ref(),
        log.as_ref(),
        txn_manager.as_ref(),
        page_cache.as_ref(),
        control_file.as_ref(),
        &config,
    ) {
        error!("checkpoint: final shutdown checkpoint failed: {}", e);
    }
}

/// Owns the background worker thread and the controller it drives.
/// `ma_checkpoint_init`/`ma_checkpoint_end` realised as construction
/// and `Drop`, per SPEC_FULL.md §4 (an explicit handle rather than
/// module-level globals, per the Design Notes' suggested redesign).
pub struct CheckpointService {
    controller: Arc<Controller>,
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl CheckpointService {
    pub fn start(
        registry: Arc<dyn TableRegistry>,
        log: Arc<dyn LogManager>,
        txn_manager: Arc<dyn TransactionManager>,
        page_cache: Arc<dyn PageCache>,
        control_file: Arc<dyn ControlFile>,
        config: CheckpointConfig,
    ) -> Self {
        let controller = Arc::new(Controller::new());
        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));

        let worker_controller = Arc::clone(&controller);
        let worker_shutdown = Arc::clone(&shutdown);
        let handle = thread::spawn(move || {
            run_background_loop(
                worker_controller,
                registry,
                log,
                txn_manager,
                page_cache,
                control_file,
                config,
                worker_shutdown,
            );
        });

        CheckpointService {
            controller,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }
}

impl Drop for CheckpointService {
    fn drop(&mut self) {
        {
            let (lock, cvar) = &*self.shutdown;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                error!("checkpoint: background thread panicked: {:?}", e);
            }
        }
    }
}
