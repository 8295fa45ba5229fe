//! World kernel: per-world state, lockstep step logic, episode bookkeeping.
//!
//! # Invariants
//! - A world only ever reads and writes its own state and its own slots of
//!   the exported buffers.
//! - Stepping is deterministic given the inputs and the episode counter.
//! - The episode counter is the only state shared between worlds.

pub mod episode;
pub mod observe;
pub mod sim;

pub use episode::EpisodeManager;
pub use observe::render_world;
pub use sim::{MoveAction, NUM_MOVE_ACTIONS, Sim, WorldInit, WorldState};
