//! Controller (C4): serialise checkpoint requests, expose
//! one-at-a-time semantics. Grounded on `ma_checkpoint_execute` in
//! `ma_checkpoint.c`, including the module-level
//! `checkpoints_total`/`checkpoints_ok_total` counters it maintains.

use std::sync::{Condvar, Mutex};

use crate::{
    collaborators::{ControlFile, LogManager, PageCache, TableRegistry, TransactionManager},
    config::CheckpointConfig,
    error::SmallError,
    executor::{self, ExecuteOutcome},
    lsn::CheckpointLevel,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointStats {
    pub checkpoints_total: u64,
    pub checkpoints_ok_total: u64,
}

pub enum CheckpointOutcome {
    Ran(ExecuteOutcome),
    /// `no_wait` was set and a checkpoint at least as strong as the
    /// requested level was already running.
    AlreadySatisfied,
}

struct State {
    in_progress: CheckpointLevel,
    stats: CheckpointStats,
}

pub struct Controller {
    state: Mutex<State>,
    cond: Condvar,
}

impl Controller {
    pub fn new() -> Self {
        Controller {
            state: Mutex::new(State {
                in_progress: CheckpointLevel::None,
                stats: CheckpointStats::default(),
            }),
            cond: Condvar::new(),
        }
    }

    pub fn in_progress(&self) -> CheckpointLevel {
        self.state.lock().unwrap().in_progress
    }

    pub fn stats(&self) -> CheckpointStats {
        self.state.lock().unwrap().stats
    }

    /// Admit one checkpoint request at a time (I1). `no_wait` lets the
    /// background worker skip when an equal-or-stronger checkpoint is
    /// already running instead of queueing behind it.
    #[allow(clippy::too_many_arguments)]
    pub fn request(
        &self,
        level: CheckpointLevel,
        no_wait: bool,
        registry: &dyn TableRegistry,
        log: &dyn LogManager,
        txn_manager: &dyn TransactionManager,
        page_cache: &dyn PageCache,
        control_file: &dyn ControlFile,
        config: &CheckpointConfig,
    ) -> Result<CheckpointOutcome, SmallError> {
        {
            let mut guard = self.state.lock().unwrap();
            if no_wait && guard.in_progress != CheckpointLevel::None && guard.in_progress >= level
            {
                return Ok(CheckpointOutcome::AlreadySatisfied);
            }
            while guard.in_progress != CheckpointLevel::None {
                guard = self.cond.wait(guard).unwrap();
            }
            guard.in_progress = level;
        }

        let result = executor::execute(
            level,
            registry,
            log,
            txn_manager,
            page_cache,
            control_file,
            config,
        );

        {
            let mut guard = self.state.lock().unwrap();
            guard.in_progress = CheckpointLevel::None;
            guard.stats.checkpoints_total += 1;
            if result.is_ok() {
                guard.stats.checkpoints_ok_total += 1;
            }
        }
        self.cond.notify_all();

        result.map(CheckpointOutcome::Ran)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}
