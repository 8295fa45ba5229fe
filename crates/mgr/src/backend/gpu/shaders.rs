/// Threads per workgroup for every compute node.
pub const WORKGROUP_SIZE: u32 = 64;

/// WGSL for world initialization, stepping and state export.
pub const SIM_SHADER: &str = r#"
struct Params {
    num_worlds: u32,
    render_width: u32,
    render_height: u32,
    num_objects: u32,
};

struct WorldInit {
    agent_object: u32,
    obstacle_object: u32,
};

struct WorldState {
    position: vec2<f32>,
    episode: u32,
    episode_step: u32,
};

struct PhysicsObject {
    aabb_min: vec4<f32>,
    aabb_max: vec4<f32>,
    // w holds the inverse mass
    inv_inertia: vec4<f32>,
    kind: u32,
    radius: f32,
    pad0: u32,
    pad1: u32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> world_inits: array<WorldInit>;
@group(0) @binding(2) var<storage, read_write> worlds: array<WorldState>;
@group(0) @binding(3) var<storage, read_write> episode_counter: atomic<u32>;
@group(0) @binding(4) var<storage, read> objects: array<PhysicsObject>;
@group(0) @binding(5) var<storage, read_write> reset_flags: array<i32>;
@group(0) @binding(6) var<storage, read> move_actions: array<i32>;
@group(0) @binding(7) var<storage, read_write> agent_positions: array<vec2<f32>>;

const MOVE_SPEED: f32 = 1.0;
const ARENA_HALF_EXTENT: f32 = 20.0;
const AGENT_HEIGHT: f32 = 1.0;
const OBSTACLE_POSITION: vec3<f32> = vec3<f32>(0.0, 1.0, 6.0);

fn spawn(world: u32) {
    let episode = atomicAdd(&episode_counter, 1u);
    worlds[world] = WorldState(vec2<f32>(0.0, 0.0), episode, 0u);
}

fn move_delta(action: i32) -> vec2<f32> {
    var dir = vec2<f32>(0.0, 0.0);
    switch action {
        case 1: { dir = vec2<f32>(0.0, 1.0); }
        case 2: { dir = vec2<f32>(0.0, -1.0); }
        case 3: { dir = vec2<f32>(-1.0, 0.0); }
        case 4: { dir = vec2<f32>(1.0, 0.0); }
        default: {}
    }
    return dir * MOVE_SPEED;
}

fn blocked(world_init: WorldInit, position: vec2<f32>) -> bool {
    if world_init.agent_object >= params.num_objects || world_init.obstacle_object >= params.num_objects {
        return false;
    }
    let agent = objects[world_init.agent_object];
    let obstacle = objects[world_init.obstacle_object];
    let agent_offset = vec3<f32>(position.x, AGENT_HEIGHT, position.y);
    let a_min = agent.aabb_min.xyz + agent_offset;
    let a_max = agent.aabb_max.xyz + agent_offset;
    let o_min = obstacle.aabb_min.xyz + OBSTACLE_POSITION;
    let o_max = obstacle.aabb_max.xyz + OBSTACLE_POSITION;
    return all(a_min < o_max) && all(a_max > o_min);
}

@compute @workgroup_size(64)
fn init_worlds(@builtin(global_invocation_id) id: vec3<u32>) {
    if id.x >= params.num_worlds {
        return;
    }
    spawn(id.x);
}

@compute @workgroup_size(64)
fn step_worlds(@builtin(global_invocation_id) id: vec3<u32>) {
    let world = id.x;
    if world >= params.num_worlds {
        return;
    }
    if reset_flags[world] != 0 {
        reset_flags[world] = 0;
        spawn(world);
        return;
    }

    var state = worlds[world];
    let next = clamp(
        state.position + move_delta(move_actions[world]),
        vec2<f32>(-ARENA_HALF_EXTENT),
        vec2<f32>(ARENA_HALF_EXTENT),
    );
    if !blocked(world_inits[world], next) {
        state.position = next;
    }
    state.episode_step = state.episode_step + 1u;
    worlds[world] = state;
}

@compute @workgroup_size(64)
fn export_positions(@builtin(global_invocation_id) id: vec3<u32>) {
    if id.x >= params.num_worlds {
        return;
    }
    agent_positions[id.x] = worlds[id.x].position;
}
"#;

/// WGSL for the per-world depth and color observations. Dispatched as
/// (pixel blocks, worlds, 1).
pub const RENDER_SHADER: &str = r#"
struct Params {
    num_worlds: u32,
    render_width: u32,
    render_height: u32,
    num_objects: u32,
};

struct WorldState {
    position: vec2<f32>,
    episode: u32,
    episode_step: u32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> worlds: array<WorldState>;
@group(0) @binding(2) var<storage, read_write> depth: array<f32>;
@group(0) @binding(3) var<storage, read_write> rgb: array<u32>;

const CAMERA_HEIGHT: f32 = 1.5;
const CAMERA_PITCH: f32 = 0.35;
const TAN_HALF_FOV: f32 = 1.0;
const MAX_DEPTH: f32 = 100.0;

const SKY_COLOR: vec4<u32> = vec4<u32>(135u, 206u, 235u, 255u);
const LIGHT_TILE_COLOR: vec4<u32> = vec4<u32>(200u, 200u, 200u, 255u);
const DARK_TILE_COLOR: vec4<u32> = vec4<u32>(90u, 90u, 90u, 255u);

fn pack_rgba(c: vec4<u32>) -> u32 {
    return c.x | (c.y << 8u) | (c.z << 16u) | (c.w << 24u);
}

@compute @workgroup_size(64)
fn render_observations(@builtin(global_invocation_id) id: vec3<u32>) {
    let pixels = params.render_width * params.render_height;
    let pixel = id.x;
    let world = id.y;
    if pixel >= pixels || world >= params.num_worlds {
        return;
    }

    let w = f32(params.render_width);
    let h = f32(params.render_height);
    let px = f32(pixel % params.render_width);
    let py = f32(pixel / params.render_width);
    let ndc_x = ((px + 0.5) / w * 2.0 - 1.0) * (w / h) * TAN_HALF_FOV;
    let ndc_y = (1.0 - (py + 0.5) / h * 2.0) * TAN_HALF_FOV;

    let sin_p = sin(CAMERA_PITCH);
    let cos_p = cos(CAMERA_PITCH);
    let forward = vec3<f32>(0.0, -sin_p, cos_p);
    let up = vec3<f32>(0.0, cos_p, sin_p);
    let dir = normalize(forward + vec3<f32>(1.0, 0.0, 0.0) * ndc_x + up * ndc_y);

    var hit_depth = MAX_DEPTH;
    var color = SKY_COLOR;
    if dir.y < -1e-4 {
        let t = -CAMERA_HEIGHT / dir.y;
        if t < MAX_DEPTH {
            let origin = worlds[world].position;
            let hit_x = origin.x + dir.x * t;
            let hit_z = origin.y + dir.z * t;
            let parity = (i32(floor(hit_x)) + i32(floor(hit_z))) & 1;
            hit_depth = t;
            if parity == 0 {
                color = LIGHT_TILE_COLOR;
            } else {
                color = DARK_TILE_COLOR;
            }
        }
    }

    let slot = world * pixels + pixel;
    depth[slot] = hit_depth;
    rgb[slot] = pack_rgba(color);
}
"#;
