use std::sync::atomic::{AtomicU32, Ordering};

/// Episode counter shared by every world of one manager.
///
/// Each world draws a fresh episode index when it spawns and every time it
/// resets. Indices are unique across worlds but their assignment order
/// between worlds is unspecified.
#[derive(Debug, Default)]
pub struct EpisodeManager {
    cur_episode: AtomicU32,
}

impl EpisodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next episode index.
    pub fn next_episode(&self) -> u32 {
        self.cur_episode.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of episodes started so far.
    pub fn episodes_started(&self) -> u32 {
        self.cur_episode.load(Ordering::Relaxed)
    }
}
