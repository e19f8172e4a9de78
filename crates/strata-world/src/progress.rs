//! Progress reporting during long saves.

use tracing::info;

/// Receives coarse progress while quads are being saved.
///
/// Called from the thread that started the save, at most once per progress
/// interval. Interactive callers redraw their wait message and pump pending
/// input here.
pub trait SaveProgress {
    /// Reports `completed` of `total` quad saves finished.
    fn update(&mut self, completed: usize, total: usize);
}

impl<F> SaveProgress for F
where
    F: FnMut(usize, usize),
{
    fn update(&mut self, completed: usize, total: usize) {
        self(completed, total);
    }
}

/// Discards progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl SaveProgress for NoProgress {
    fn update(&mut self, _completed: usize, _total: usize) {}
}

/// Logs progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl SaveProgress for LogProgress {
    fn update(&mut self, completed: usize, total: usize) {
        info!("Please wait as the map saves [{completed}/{total}]");
    }
}
