use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use hideseek_physics::{ObjectId, ObjectManager};

use crate::episode::EpisodeManager;

/// Distance an agent covers per move.
pub const MOVE_SPEED: f32 = 1.0;
/// Agents are clamped to [-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT] on x and z.
pub const ARENA_HALF_EXTENT: f32 = 20.0;
/// Height of the agent's centre; the unit sphere rests on the ground plane.
pub const AGENT_HEIGHT: f32 = 1.0;
/// Centre of the obstacle cube.
pub const OBSTACLE_POSITION: Vec3 = Vec3::new(0.0, 1.0, 6.0);
/// Catalog entry every world uses for its agent.
pub const AGENT_OBJECT: ObjectId = ObjectId::SPHERE;
/// Catalog entry every world uses for its obstacle.
pub const OBSTACLE_OBJECT: ObjectId = ObjectId::CUBE;
/// Number of distinct move actions.
pub const NUM_MOVE_ACTIONS: i32 = 5;

/// Discrete move action read from the action tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveAction {
    #[default]
    Stay,
    /// +Z
    Forward,
    /// -Z
    Back,
    /// -X
    Left,
    /// +X
    Right,
}

impl MoveAction {
    /// Decode a raw action value. Unknown values mean `Stay`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Forward,
            2 => Self::Back,
            3 => Self::Left,
            4 => Self::Right,
            _ => Self::Stay,
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            Self::Stay => 0,
            Self::Forward => 1,
            Self::Back => 2,
            Self::Left => 3,
            Self::Right => 4,
        }
    }

    /// Displacement on the ground plane as (x, z).
    pub fn delta(self) -> Vec2 {
        let dir = match self {
            Self::Stay => Vec2::ZERO,
            Self::Forward => Vec2::Y,
            Self::Back => Vec2::NEG_Y,
            Self::Left => Vec2::NEG_X,
            Self::Right => Vec2::X,
        };
        dir * MOVE_SPEED
    }
}

/// Per-world state. The layout is shared with the device task graph.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct WorldState {
    /// Agent position on the ground plane as (x, z).
    pub position: [f32; 2],
    pub episode: u32,
    /// Steps taken since the last reset.
    pub episode_step: u32,
}

impl WorldState {
    fn spawn(episode: u32) -> Self {
        Self {
            position: [0.0, 0.0],
            episode,
            episode_step: 0,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::from_array(self.position)
    }
}

/// Everything one world needs at construction. Identical for every world.
#[derive(Debug, Clone)]
pub struct WorldInit {
    pub episode_mgr: Arc<EpisodeManager>,
    pub objects: Arc<ObjectManager>,
    /// Catalog entry used for the agent body.
    pub agent_object: ObjectId,
    /// Catalog entry used for the obstacle.
    pub obstacle_object: ObjectId,
}

impl WorldInit {
    pub fn new(episode_mgr: Arc<EpisodeManager>, objects: Arc<ObjectManager>) -> Self {
        Self {
            episode_mgr,
            objects,
            agent_object: AGENT_OBJECT,
            obstacle_object: OBSTACLE_OBJECT,
        }
    }
}

/// One world's simulation.
#[derive(Debug)]
pub struct Sim {
    init: WorldInit,
    state: WorldState,
}

impl Sim {
    /// Spawn a world, claiming its first episode index.
    pub fn new(init: WorldInit) -> Self {
        let state = WorldState::spawn(init.episode_mgr.next_episode());
        Self { init, state }
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// Advance one tick.
    ///
    /// A non-zero `reset` flag respawns the world with a fresh episode, clears
    /// the flag and ignores `action` for this tick. Otherwise the move is
    /// applied unless it would push the agent into the obstacle.
    pub fn step(&mut self, reset: &mut i32, action: i32) {
        if *reset != 0 {
            *reset = 0;
            let finished = self.state.episode;
            self.state = WorldState::spawn(self.init.episode_mgr.next_episode());
            tracing::trace!(finished, episode = self.state.episode, "world reset");
            return;
        }

        let current = self.state.position();
        let next = (current + MoveAction::from_raw(action).delta())
            .clamp(Vec2::splat(-ARENA_HALF_EXTENT), Vec2::splat(ARENA_HALF_EXTENT));
        if !self.blocked(next) {
            self.state.position = next.to_array();
        }
        self.state.episode_step += 1;
    }

    /// Whether an agent at `position` would overlap the obstacle.
    fn blocked(&self, position: Vec2) -> bool {
        let objects = &self.init.objects;
        let (Some(agent), Some(obstacle)) = (
            objects.aabb(self.init.agent_object),
            objects.aabb(self.init.obstacle_object),
        ) else {
            return false;
        };
        let agent = agent.translated(Vec3::new(position.x, AGENT_HEIGHT, position.y));
        agent.overlaps(&obstacle.translated(OBSTACLE_POSITION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hideseek_physics::{PhysicsLoader, StorageType, load_static_primitives};

    fn init() -> WorldInit {
        let mut loader = PhysicsLoader::new(StorageType::Host, 10);
        load_static_primitives(&mut loader).unwrap();
        WorldInit::new(
            Arc::new(EpisodeManager::new()),
            Arc::new(loader.into_object_manager()),
        )
    }

    #[test]
    fn spawn_claims_episode() {
        let init = init();
        let mgr = Arc::clone(&init.episode_mgr);
        let a = Sim::new(init.clone());
        let b = Sim::new(init);
        assert_ne!(a.state().episode, b.state().episode);
        assert_eq!(mgr.episodes_started(), 2);
        assert_eq!(a.state().position(), Vec2::ZERO);
    }

    #[test]
    fn move_actions_translate_agent() {
        let mut sim = Sim::new(init());
        let mut reset = 0;
        sim.step(&mut reset, MoveAction::Right.to_raw());
        sim.step(&mut reset, MoveAction::Right.to_raw());
        sim.step(&mut reset, MoveAction::Back.to_raw());
        assert_eq!(sim.state().position(), Vec2::new(2.0, -1.0));
        assert_eq!(sim.state().episode_step, 3);
    }

    #[test]
    fn unknown_action_stays() {
        let mut sim = Sim::new(init());
        let mut reset = 0;
        sim.step(&mut reset, 42);
        sim.step(&mut reset, -1);
        assert_eq!(sim.state().position(), Vec2::ZERO);
        assert_eq!(sim.state().episode_step, 2);
    }

    #[test]
    fn obstacle_blocks_forward_motion() {
        let mut sim = Sim::new(init());
        let mut reset = 0;
        for _ in 0..10 {
            sim.step(&mut reset, MoveAction::Forward.to_raw());
        }
        // Cube spans z in [5, 7]; the unit sphere may touch it at z = 4.
        assert_eq!(sim.state().position(), Vec2::new(0.0, 4.0));
    }

    #[test]
    fn arena_clamps_position() {
        let mut sim = Sim::new(init());
        let mut reset = 0;
        for _ in 0..50 {
            sim.step(&mut reset, MoveAction::Left.to_raw());
        }
        assert_eq!(sim.state().position(), Vec2::new(-ARENA_HALF_EXTENT, 0.0));
    }

    #[test]
    fn reset_respawns_and_clears_flag() {
        let init = init();
        let mgr = Arc::clone(&init.episode_mgr);
        let mut sim = Sim::new(init);
        let first_episode = sim.state().episode;
        let mut reset = 0;
        sim.step(&mut reset, MoveAction::Right.to_raw());

        reset = 1;
        sim.step(&mut reset, MoveAction::Right.to_raw());
        assert_eq!(reset, 0);
        assert_eq!(sim.state().position(), Vec2::ZERO);
        assert_eq!(sim.state().episode_step, 0);
        assert_ne!(sim.state().episode, first_episode);
        assert_eq!(mgr.episodes_started(), 2);
    }

    #[test]
    fn missing_catalog_entries_never_block() {
        let mut init = init();
        init.obstacle_object = ObjectId(9);
        let mut sim = Sim::new(init);
        let mut reset = 0;
        for _ in 0..6 {
            sim.step(&mut reset, MoveAction::Forward.to_raw());
        }
        assert_eq!(sim.state().position(), Vec2::new(0.0, 6.0));
    }

    #[test]
    fn raw_action_round_trip() {
        for raw in 0..NUM_MOVE_ACTIONS {
            assert_eq!(MoveAction::from_raw(raw).to_raw(), raw);
        }
    }

    #[test]
    fn world_state_layout_matches_device() {
        assert_eq!(std::mem::size_of::<WorldState>(), 16);
        assert_eq!(std::mem::align_of::<WorldState>(), 4);
    }
}
