//! Ground-plane ray caster producing per-world depth and color observations.
//!
//! The device task graph runs the same math in WGSL; both must agree pixel
//! for pixel up to float rounding.

use glam::Vec3;

use hideseek_common::RenderSize;

use crate::sim::WorldState;

pub const CAMERA_HEIGHT: f32 = 1.5;
/// Downward pitch of the camera in radians.
pub const CAMERA_PITCH: f32 = 0.35;
/// tan(fov_y / 2) for a 90 degree vertical field of view.
pub const TAN_HALF_FOV: f32 = 1.0;
/// Depth written for rays that never hit the ground.
pub const MAX_DEPTH: f32 = 100.0;

pub const SKY_COLOR: [u8; 4] = [135, 206, 235, 255];
pub const LIGHT_TILE_COLOR: [u8; 4] = [200, 200, 200, 255];
pub const DARK_TILE_COLOR: [u8; 4] = [90, 90, 90, 255];

/// Result of casting one camera ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub depth: f32,
    pub color: [u8; 4],
}

const MISS: Sample = Sample {
    depth: MAX_DEPTH,
    color: SKY_COLOR,
};

/// Direction of the ray through the centre of pixel (`px`, `py`).
pub fn ray_direction(size: RenderSize, px: u32, py: u32) -> Vec3 {
    let (w, h) = (size.width as f32, size.height as f32);
    let ndc_x = ((px as f32 + 0.5) / w * 2.0 - 1.0) * (w / h) * TAN_HALF_FOV;
    let ndc_y = (1.0 - (py as f32 + 0.5) / h * 2.0) * TAN_HALF_FOV;

    let (sin_p, cos_p) = CAMERA_PITCH.sin_cos();
    let forward = Vec3::new(0.0, -sin_p, cos_p);
    let up = Vec3::new(0.0, cos_p, sin_p);
    (forward + Vec3::X * ndc_x + up * ndc_y).normalize()
}

/// Cast one ray from the camera above `state`'s agent.
pub fn sample(state: &WorldState, size: RenderSize, px: u32, py: u32) -> Sample {
    let dir = ray_direction(size, px, py);
    if dir.y >= -1e-4 {
        return MISS;
    }
    let t = -CAMERA_HEIGHT / dir.y;
    if t >= MAX_DEPTH {
        return MISS;
    }
    let [x, z] = state.position;
    let hit_x = x + dir.x * t;
    let hit_z = z + dir.z * t;
    let parity = (hit_x.floor() as i32 + hit_z.floor() as i32) & 1;
    Sample {
        depth: t,
        color: if parity == 0 {
            LIGHT_TILE_COLOR
        } else {
            DARK_TILE_COLOR
        },
    }
}

/// Render one world's observation into row-major `depth` and `rgb` slices of
/// `size.pixel_count()` entries each.
pub fn render_world(state: &WorldState, size: RenderSize, depth: &mut [f32], rgb: &mut [[u8; 4]]) {
    debug_assert_eq!(depth.len(), size.pixel_count());
    debug_assert_eq!(rgb.len(), size.pixel_count());
    if !size.is_enabled() {
        return;
    }
    let width = size.width as usize;
    for (i, (d, c)) in depth.iter_mut().zip(rgb.iter_mut()).enumerate() {
        let s = sample(state, size, (i % width) as u32, (i / width) as u32);
        *d = s.depth;
        *c = s.color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(x: f32, z: f32) -> WorldState {
        WorldState {
            position: [x, z],
            ..WorldState::default()
        }
    }

    #[test]
    fn top_row_sees_sky_bottom_row_sees_ground() {
        let size = RenderSize::new(8, 8);
        let mut depth = vec![0.0; size.pixel_count()];
        let mut rgb = vec![[0; 4]; size.pixel_count()];
        render_world(&state_at(0.0, 0.0), size, &mut depth, &mut rgb);

        assert_eq!(depth[0], MAX_DEPTH);
        assert_eq!(rgb[0], SKY_COLOR);
        let last = size.pixel_count() - 1;
        assert!(depth[last] < 5.0);
        assert_ne!(rgb[last], SKY_COLOR);
    }

    #[test]
    fn depth_grows_towards_horizon() {
        let size = RenderSize::new(1, 16);
        let mut depth = vec![0.0; 16];
        let mut rgb = vec![[0; 4]; 16];
        render_world(&state_at(0.0, 0.0), size, &mut depth, &mut rgb);
        let ground: Vec<f32> = depth.iter().copied().filter(|d| *d < MAX_DEPTH).collect();
        assert!(ground.len() > 2);
        assert!(ground.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn observation_depends_on_position() {
        let size = RenderSize::new(16, 16);
        let render = |x| {
            let mut depth = vec![0.0; 256];
            let mut rgb = vec![[0; 4]; 256];
            render_world(&state_at(x, 0.0), size, &mut depth, &mut rgb);
            (depth, rgb)
        };
        let (d0, c0) = render(0.0);
        let (d1, c1) = render(0.5);
        // Depth only depends on the camera height, colors shift with the tiles.
        assert_eq!(d0, d1);
        assert_ne!(c0, c1);
    }

    #[test]
    fn disabled_size_writes_nothing() {
        let mut depth: Vec<f32> = Vec::new();
        let mut rgb: Vec<[u8; 4]> = Vec::new();
        render_world(&state_at(0.0, 0.0), RenderSize::new(0, 4), &mut depth, &mut rgb);
        assert!(depth.is_empty());
    }

    #[test]
    fn centre_ray_points_forward_and_down() {
        let dir = ray_direction(RenderSize::new(2, 2), 1, 1);
        assert!(dir.z > 0.0);
        assert!(dir.y < 0.0);
        assert!((dir.length() - 1.0).abs() < 1e-5);
    }
}
