use std::time::Duration;

/// Tunables governing checkpoint pacing (§6.4).
#[derive(Debug, Clone, Copy)]
pub struct CheckpointConfig {
    /// Ticks between background checkpoints.
    pub time_between_checkpoints: u32,
    /// Length of one tick.
    pub sleep_unit: Duration,
    /// Batch size of state snapshots per log-lock acquisition.
    pub state_copies: usize,
    /// Whether the background worker's periodic checkpoint is allowed
    /// to call `log.purge` after computing the low-water mark. See
    /// SPEC_FULL.md §4/§9 — the original leaves this disabled.
    pub purge_logs: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        CheckpointConfig {
            time_between_checkpoints: 30,
            sleep_unit: Duration::from_secs(1),
            state_copies: 1024,
            purge_logs: false,
        }
    }
}
