//! wgpu compute backend. All world state stays resident on the device.

mod context;
mod shaders;
mod task_graph;

pub use context::GpuContext;

use bytemuck::{Pod, Zeroable};
use std::sync::Arc;
use wgpu::util::DeviceExt;

use hideseek_assets::RenderAssetCatalog;
use hideseek_common::RenderSize;
use hideseek_kernel::WorldState;
use hideseek_kernel::sim::{AGENT_OBJECT, OBSTACLE_OBJECT};
use hideseek_physics::{CollisionPrimitive, ObjectManager};

use super::{ExportSlot, NUM_EXPORTED_BUFFERS, TensorSource};
use task_graph::{GraphBuffers, TaskGraph};

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no compute adapter with index {gpu_id} ({available} available)")]
    AdapterNotFound { gpu_id: u32, available: usize },
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("buffer readback failed: {0}")]
    Readback(String),
    #[error("validation failed in {pass}: {message}")]
    Validation { pass: &'static str, message: String },
    #[error("{node} needs {workgroups} workgroups in one dimension, device allows {limit}")]
    DispatchTooLarge {
        node: &'static str,
        workgroups: u64,
        limit: u32,
    },
    #[error("{label} needs {size} bytes, device binding limit is {limit}")]
    BufferTooLarge {
        label: &'static str,
        size: u64,
        limit: u64,
    },
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Params {
    num_worlds: u32,
    render_width: u32,
    render_height: u32,
    num_objects: u32,
}

/// Device copy of a world-init record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuWorldInit {
    pub agent_object: u32,
    pub obstacle_object: u32,
}

impl Default for GpuWorldInit {
    fn default() -> Self {
        Self {
            agent_object: AGENT_OBJECT.0,
            obstacle_object: OBSTACLE_OBJECT.0,
        }
    }
}

/// Device copy of a physics catalog entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct GpuObject {
    aabb_min: [f32; 4],
    aabb_max: [f32; 4],
    /// xyz: inverse inertia tensor diagonal, w: inverse mass.
    inv_inertia: [f32; 4],
    kind: u32,
    radius: f32,
    _pad: [u32; 2],
}

fn gpu_objects(objects: &ObjectManager) -> Vec<GpuObject> {
    objects
        .iter()
        .map(|(_, meta, aabb, primitive)| GpuObject {
            aabb_min: aabb.p_min.extend(0.0).to_array(),
            aabb_max: aabb.p_max.extend(0.0).to_array(),
            inv_inertia: meta.inv_inertia_tensor.extend(meta.inv_mass).to_array(),
            kind: primitive.kind() as u32,
            radius: match primitive {
                CollisionPrimitive::Sphere { radius } => *radius,
                _ => 0.0,
            },
            _pad: [0; 2],
        })
        .collect()
}

/// The shared episode counter, resident in device memory.
#[derive(Debug, Clone)]
pub struct DeviceEpisodeManager {
    context: Arc<GpuContext>,
    counter: Arc<wgpu::Buffer>,
}

impl DeviceEpisodeManager {
    pub fn new(context: Arc<GpuContext>) -> Self {
        let counter = context
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("episode_counter"),
                contents: bytemuck::bytes_of(&0u32),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });
        Self {
            context,
            counter: Arc::new(counter),
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.counter
    }

    /// Read the counter back from the device.
    pub fn episodes_started(&self) -> Result<u32, GpuError> {
        let bytes = self.context.read_buffer(&self.counter, 4)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }
}

/// Vertex and index buffers for one imported mesh. Registered with the
/// device only; the ray-cast observation pass does not rasterize them.
#[derive(Debug)]
struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn size_in_bytes(&self) -> u64 {
        self.vertices.size() + self.indices.size()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MeshVertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

fn upload_meshes(device: &wgpu::Device, assets: &RenderAssetCatalog) -> Vec<Vec<GpuMesh>> {
    assets
        .objects()
        .iter()
        .map(|object| {
            object
                .meshes
                .iter()
                .map(|mesh| {
                    let vertices: Vec<MeshVertex> = mesh
                        .positions
                        .iter()
                        .zip(&mesh.normals)
                        .zip(&mesh.uvs)
                        .map(|((p, n), uv)| MeshVertex {
                            position: p.to_array(),
                            normal: n.to_array(),
                            uv: uv.to_array(),
                        })
                        .collect();
                    GpuMesh {
                        vertices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some(object.name.as_str()),
                            contents: bytemuck::cast_slice(&vertices),
                            usage: wgpu::BufferUsages::VERTEX,
                        }),
                        indices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some(object.name.as_str()),
                            contents: bytemuck::cast_slice(&mesh.indices),
                            usage: wgpu::BufferUsages::INDEX,
                        }),
                        index_count: mesh.indices.len() as u32,
                    }
                })
                .collect()
        })
        .collect()
}

/// Storage buffer of `len` bytes. Never smaller than 4 bytes so every binding
/// stays valid when image observations are disabled.
fn storage_buffer(
    device: &wgpu::Device,
    label: &'static str,
    len: u64,
) -> Result<wgpu::Buffer, GpuError> {
    let size = len.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
    let limit = u64::from(device.limits().max_storage_buffer_binding_size);
    if size > limit {
        return Err(GpuError::BufferTooLarge { label, size, limit });
    }
    Ok(device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    }))
}

fn storage_buffer_init(
    device: &wgpu::Device,
    label: &'static str,
    contents: &[u8],
) -> wgpu::Buffer {
    let mut padded = contents.to_vec();
    padded.resize(contents.len().max(4).next_multiple_of(4), 0);
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: &padded,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    })
}

/// Device-resident backend driven by a compiled compute task graph.
#[derive(Debug)]
pub(crate) struct GpuBackend {
    context: Arc<GpuContext>,
    params: wgpu::Buffer,
    world_inits: wgpu::Buffer,
    objects: wgpu::Buffer,
    worlds: wgpu::Buffer,
    exported: [wgpu::Buffer; NUM_EXPORTED_BUFFERS],
    depth: wgpu::Buffer,
    rgb: wgpu::Buffer,
    render_meshes: Vec<Vec<GpuMesh>>,
    graph: TaskGraph,
}

impl GpuBackend {
    pub fn new(
        context: Arc<GpuContext>,
        episodes: &DeviceEpisodeManager,
        inits: &[GpuWorldInit],
        objects: &ObjectManager,
        render_size: RenderSize,
        render_assets: &RenderAssetCatalog,
    ) -> Result<Self, GpuError> {
        let _span = tracing::info_span!("gpu_backend_init", worlds = inits.len()).entered();
        let device = context.device();
        let num_worlds = inits.len() as u64;

        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: bytemuck::bytes_of(&Params {
                num_worlds: inits.len() as u32,
                render_width: render_size.width,
                render_height: render_size.height,
                num_objects: objects.len() as u32,
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let world_inits = storage_buffer_init(device, "world_inits", bytemuck::cast_slice(inits));
        let objects_buf =
            storage_buffer_init(device, "physics_objects", bytemuck::cast_slice(&gpu_objects(objects)));
        let worlds = storage_buffer(
            device,
            "worlds",
            num_worlds * std::mem::size_of::<WorldState>() as u64,
        )?;

        let [reset, action, position] = ExportSlot::ALL.map(|slot| {
            storage_buffer(device, slot.label(), num_worlds * slot.bytes_per_world() as u64)
        });
        let exported = [reset?, action?, position?];

        let pixels = num_worlds * render_size.pixel_count() as u64;
        let depth = storage_buffer(device, "depth", pixels * 4)?;
        let rgb = storage_buffer(device, "rgb", pixels * 4)?;

        let render_meshes = upload_meshes(device, render_assets);
        tracing::debug!(
            objects = render_meshes.len(),
            meshes = render_meshes.iter().map(Vec::len).sum::<usize>(),
            indices = render_meshes
                .iter()
                .flatten()
                .map(|m| u64::from(m.index_count))
                .sum::<u64>(),
            "render meshes registered"
        );

        let graph = TaskGraph::compile(
            &context,
            &GraphBuffers {
                params: &params,
                world_inits: &world_inits,
                worlds: &worlds,
                episode_counter: episodes.buffer(),
                objects: &objects_buf,
                reset: &exported[ExportSlot::Reset.index()],
                action: &exported[ExportSlot::Action.index()],
                position: &exported[ExportSlot::Position.index()],
                depth: &depth,
                rgb: &rgb,
            },
            inits.len() as u32,
            render_size,
        )?;

        let backend = Self {
            context,
            params,
            world_inits,
            objects: objects_buf,
            worlds,
            exported,
            depth,
            rgb,
            render_meshes,
            graph,
        };
        backend.graph.run_init(&backend.context)?;
        tracing::info!(
            gpu_id = backend.context.gpu_id(),
            adapter = %backend.context.adapter_info().name,
            resident_bytes = backend.resident_bytes(),
            "gpu backend ready"
        );
        Ok(backend)
    }

    /// Run one step graph. A failed step leaves device state undefined, so it is fatal.
    pub fn step(&mut self) {
        let _span = tracing::trace_span!("gpu_step").entered();
        if let Err(err) = self.graph.run_step(&self.context) {
            panic!("gpu step failed: {err}");
        }
    }

    pub fn buffer(&self, source: TensorSource) -> &wgpu::Buffer {
        match source {
            TensorSource::Exported(slot) => &self.exported[slot.index()],
            TensorSource::Depth => &self.depth,
            TensorSource::Rgb => &self.rgb,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn gpu_id(&self) -> i32 {
        self.context.gpu_id() as i32
    }

    pub fn num_render_objects(&self) -> usize {
        self.render_meshes.len()
    }

    /// Device memory held by every buffer this backend allocated.
    pub fn resident_bytes(&self) -> u64 {
        let fixed = [&self.params, &self.world_inits, &self.objects, &self.worlds]
            .into_iter()
            .chain(&self.exported)
            .chain([&self.depth, &self.rgb])
            .map(wgpu::Buffer::size)
            .sum::<u64>();
        let meshes = self
            .render_meshes
            .iter()
            .flatten()
            .map(GpuMesh::size_in_bytes)
            .sum::<u64>();
        fixed + meshes
    }

    #[cfg(test)]
    pub fn step_node_labels(&self) -> Vec<&'static str> {
        self.graph.step_node_labels()
    }

    /// World state read back from the device.
    pub fn world_states(&self) -> Result<Vec<WorldState>, GpuError> {
        let len = self.worlds.size();
        let bytes = self.context.read_buffer(&self.worlds, len)?;
        Ok(bytes
            .chunks_exact(std::mem::size_of::<WorldState>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }
}
