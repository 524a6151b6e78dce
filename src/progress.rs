use std::sync::{Mutex, PoisonError};

use anyhow::anyhow;
use indicatif::ProgressBar;

/// Point-in-time view of a batch's progress counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
}

impl ProgressState {
    #[must_use]
    pub const fn succeeded(&self) -> u64 {
        self.completed - self.failed
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.completed == self.total
    }

    #[must_use]
    pub const fn percent(&self) -> u64 {
        if self.total == 0 {
            100
        } else {
            self.completed * 100 / self.total
        }
    }
}

impl std::fmt::Display for ProgressState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}% {}/{} ({} failed)",
            self.percent(),
            self.completed,
            self.total,
            self.failed
        )
    }
}

/// Shared completion counters for every worker of a batch.
///
/// The mutex is the only serialization point; the progress bar is updated
/// from a copied snapshot after the lock is released.
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
    progress_bar: ProgressBar,
}

impl ProgressTracker {
    /// Fixes the total before any worker can record a completion.
    #[must_use]
    pub fn init(total: usize, progress_bar: ProgressBar) -> Self {
        let total = u64::try_from(total).unwrap_or(u64::MAX);
        progress_bar.set_length(total);
        progress_bar.set_position(0);

        Self {
            state: Mutex::new(ProgressState {
                total,
                completed: 0,
                failed: 0,
            }),
            progress_bar,
        }
    }

    #[must_use]
    pub fn hidden(total: usize) -> Self {
        Self::init(total, ProgressBar::hidden())
    }

    /// Counts one finished file and returns the state right after the update.
    pub fn record_completion(&self, succeeded: bool) -> anyhow::Result<ProgressState> {
        let snapshot = {
            let mut state = self
                .state
                .lock()
                .map_err(|_error| anyhow!("Progress state lock was poisoned"))?;

            if state.completed >= state.total {
                return Err(anyhow!(
                    "BUG: Recorded more completions than the {} files in the batch",
                    state.total
                ));
            }

            state.completed += 1;

            if !succeeded {
                state.failed += 1;
            }

            *state
        };

        self.draw(snapshot);

        Ok(snapshot)
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn render(&self) {
        self.draw(self.snapshot());
    }

    pub fn finish(&self) {
        self.render();
        self.progress_bar.finish();
    }

    fn draw(&self, snapshot: ProgressState) {
        self.progress_bar.set_position(snapshot.completed);

        if snapshot.failed > 0 {
            self.progress_bar
                .set_message(format!("{} failed", snapshot.failed));
        }
    }
}
