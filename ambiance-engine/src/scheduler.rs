//! Deferred channel teardown.
//!
//! A fade-out schedules a task `(due, sound_id, generation)`. When the audio
//! clock passes `due`, the controller checks the task against the live channel:
//! only a channel with the same id *and* generation, still fading out, is torn
//! down. A channel recreated under the same id, or one that was switched back
//! to, therefore survives a stale task.

/// One pending teardown.
#[derive(Clone, Debug, PartialEq)]
pub struct TeardownTask {
    pub due: f64,
    pub sound_id: String,
    pub generation: u64,
}

/// Pending teardowns, ordered by due time.
#[derive(Clone, Debug, Default)]
pub struct TeardownScheduler {
    tasks: Vec<TeardownTask>,
}

impl TeardownScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline] pub fn len(&self) -> usize { self.tasks.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.tasks.is_empty() }

    /// Schedule a teardown of `sound_id` (instance `generation`) at `due`,
    /// replacing any task already pending for that id.
    pub fn schedule(&mut self, due: f64, sound_id: &str, generation: u64) {
        self.cancel(sound_id);
        let at = self.tasks.iter().position(|t| t.due > due).unwrap_or(self.tasks.len());
        self.tasks.insert(at, TeardownTask { due, sound_id: sound_id.to_owned(), generation });
    }

    /// Drop pending tasks for `sound_id`. Returns how many were dropped.
    pub fn cancel(&mut self, sound_id: &str) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.sound_id != sound_id);
        before - self.tasks.len()
    }

    /// Remove and return every task due at or before `now`, earliest first.
    pub fn take_due(&mut self, now: f64) -> Vec<TeardownTask> {
        let n = self.tasks.iter().take_while(|t| t.due <= now).count();
        self.tasks.drain(..n).collect()
    }
}
