//! Compiled compute task graph.
//!
//! One node table backs two schedules. The per-step graph runs `step_worlds`,
//! `export_positions` and, when image observations are enabled,
//! `render_observations`. The one-shot init graph swaps `step_worlds` for
//! `init_worlds`. Every node of a schedule is encoded into one submission.

use hideseek_common::{CompileMode, RenderSize};

use super::shaders::{RENDER_SHADER, SIM_SHADER, WORKGROUP_SIZE};
use super::{GpuContext, GpuError};

/// Buffers bound by the task graph, in binding order.
pub(super) struct GraphBuffers<'a> {
    pub params: &'a wgpu::Buffer,
    pub world_inits: &'a wgpu::Buffer,
    pub worlds: &'a wgpu::Buffer,
    pub episode_counter: &'a wgpu::Buffer,
    pub objects: &'a wgpu::Buffer,
    pub reset: &'a wgpu::Buffer,
    pub action: &'a wgpu::Buffer,
    pub position: &'a wgpu::Buffer,
    pub depth: &'a wgpu::Buffer,
    pub rgb: &'a wgpu::Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Sim,
    Render,
}

#[derive(Debug)]
struct Node {
    label: &'static str,
    pipeline: wgpu::ComputePipeline,
    group: Group,
    workgroups: [u32; 3],
}

#[derive(Debug)]
pub(super) struct TaskGraph {
    sim_group: wgpu::BindGroup,
    render_group: Option<wgpu::BindGroup>,
    nodes: Vec<Node>,
    /// Node indices run once after compilation.
    init: Vec<usize>,
    /// Node indices run by every step.
    step: Vec<usize>,
}

const INIT_NODE: usize = 0;
const STEP_NODE: usize = 1;
const EXPORT_NODE: usize = 2;

fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage(read_only: bool) -> wgpu::BufferBindingType {
    wgpu::BufferBindingType::Storage { read_only }
}

fn bind_group(
    device: &wgpu::Device,
    label: &'static str,
    layout: &wgpu::BindGroupLayout,
    buffers: &[&wgpu::Buffer],
) -> wgpu::BindGroup {
    let entries: Vec<wgpu::BindGroupEntry> = buffers
        .iter()
        .enumerate()
        .map(|(binding, buffer)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: buffer.as_entire_binding(),
        })
        .collect();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    })
}

/// Workgroups needed to cover `items` threads, checked against the device limit.
fn workgroups_for(node: &'static str, items: u64, limit: u32) -> Result<u32, GpuError> {
    let groups = items.div_ceil(u64::from(WORKGROUP_SIZE));
    u32::try_from(groups)
        .ok()
        .filter(|&g| g <= limit)
        .ok_or(GpuError::DispatchTooLarge {
            node,
            workgroups: groups,
            limit,
        })
}

impl TaskGraph {
    pub fn compile(
        ctx: &GpuContext,
        buffers: &GraphBuffers<'_>,
        num_worlds: u32,
        render_size: RenderSize,
    ) -> Result<Self, GpuError> {
        let _span = tracing::info_span!("compile_task_graph", mode = ?ctx.compile_mode()).entered();
        let device = ctx.device();
        let limit = device.limits().max_compute_workgroups_per_dimension;
        let world_groups = workgroups_for("step_worlds", u64::from(num_worlds), limit)?;
        let render_groups = if render_size.is_enabled() {
            if num_worlds > limit {
                return Err(GpuError::DispatchTooLarge {
                    node: "render_observations",
                    workgroups: u64::from(num_worlds),
                    limit,
                });
            }
            Some(workgroups_for(
                "render_observations",
                render_size.pixel_count() as u64,
                limit,
            )?)
        } else {
            None
        };

        let options = wgpu::PipelineCompilationOptions {
            zero_initialize_workgroup_memory: ctx.compile_mode() == CompileMode::Debug,
            ..Default::default()
        };

        ctx.validated("compile_task_graph", || {
            let sim_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("sim_bgl"),
                entries: &[
                    buffer_entry(0, wgpu::BufferBindingType::Uniform),
                    buffer_entry(1, storage(true)),
                    buffer_entry(2, storage(false)),
                    buffer_entry(3, storage(false)),
                    buffer_entry(4, storage(true)),
                    buffer_entry(5, storage(false)),
                    buffer_entry(6, storage(true)),
                    buffer_entry(7, storage(false)),
                ],
            });
            let sim_pipeline_layout =
                device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("sim_pipeline_layout"),
                    bind_group_layouts: &[&sim_layout],
                    push_constant_ranges: &[],
                });
            let sim_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("sim_shader"),
                source: wgpu::ShaderSource::Wgsl(SIM_SHADER.into()),
            });
            let sim_pipeline = |entry: &'static str| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry),
                    layout: Some(&sim_pipeline_layout),
                    module: &sim_module,
                    entry_point: Some(entry),
                    compilation_options: options.clone(),
                    cache: None,
                })
            };

            let sim_group = bind_group(
                device,
                "sim_bind_group",
                &sim_layout,
                &[
                    buffers.params,
                    buffers.world_inits,
                    buffers.worlds,
                    buffers.episode_counter,
                    buffers.objects,
                    buffers.reset,
                    buffers.action,
                    buffers.position,
                ],
            );

            let mut nodes = vec![
                Node {
                    label: "init_worlds",
                    pipeline: sim_pipeline("init_worlds"),
                    group: Group::Sim,
                    workgroups: [world_groups, 1, 1],
                },
                Node {
                    label: "step_worlds",
                    pipeline: sim_pipeline("step_worlds"),
                    group: Group::Sim,
                    workgroups: [world_groups, 1, 1],
                },
                Node {
                    label: "export_positions",
                    pipeline: sim_pipeline("export_positions"),
                    group: Group::Sim,
                    workgroups: [world_groups, 1, 1],
                },
            ];

            let render_group = render_groups.map(|pixel_groups| {
                let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("render_bgl"),
                    entries: &[
                        buffer_entry(0, wgpu::BufferBindingType::Uniform),
                        buffer_entry(1, storage(true)),
                        buffer_entry(2, storage(false)),
                        buffer_entry(3, storage(false)),
                    ],
                });
                let pipeline_layout =
                    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("render_pipeline_layout"),
                        bind_group_layouts: &[&layout],
                        push_constant_ranges: &[],
                    });
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("render_shader"),
                    source: wgpu::ShaderSource::Wgsl(RENDER_SHADER.into()),
                });
                nodes.push(Node {
                    label: "render_observations",
                    pipeline: device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some("render_observations"),
                        layout: Some(&pipeline_layout),
                        module: &module,
                        entry_point: Some("render_observations"),
                        compilation_options: options.clone(),
                        cache: None,
                    }),
                    group: Group::Render,
                    workgroups: [pixel_groups, num_worlds, 1],
                });
                bind_group(
                    device,
                    "render_bind_group",
                    &layout,
                    &[buffers.params, buffers.worlds, buffers.depth, buffers.rgb],
                )
            });

            // Init spawns the worlds, then publishes them like a step would.
            let published: Vec<usize> = (EXPORT_NODE..nodes.len()).collect();
            let init: Vec<usize> =
                std::iter::once(INIT_NODE).chain(published.iter().copied()).collect();
            let step: Vec<usize> = std::iter::once(STEP_NODE).chain(published).collect();

            tracing::debug!(
                init_nodes = init.len(),
                step_nodes = step.len(),
                "task graph compiled"
            );
            Self {
                sim_group,
                render_group,
                nodes,
                init,
                step,
            }
        })
    }

    /// Run the one-shot init graph.
    pub fn run_init(&self, ctx: &GpuContext) -> Result<(), GpuError> {
        self.run(ctx, "init_graph", &self.init)
    }

    /// Run the per-step graph and wait for it to finish.
    pub fn run_step(&self, ctx: &GpuContext) -> Result<(), GpuError> {
        self.run(ctx, "step_graph", &self.step)
    }

    fn run(&self, ctx: &GpuContext, label: &'static str, order: &[usize]) -> Result<(), GpuError> {
        ctx.validated(label, || {
            let mut encoder = ctx
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
            for node in order.iter().map(|&i| &self.nodes[i]) {
                let group = match node.group {
                    Group::Sim => &self.sim_group,
                    // Render nodes only exist when the render group does.
                    Group::Render => match &self.render_group {
                        Some(group) => group,
                        None => continue,
                    },
                };
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(node.label),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&node.pipeline);
                pass.set_bind_group(0, group, &[]);
                let [x, y, z] = node.workgroups;
                pass.dispatch_workgroups(x, y, z);
            }
            ctx.queue().submit(Some(encoder.finish()));
        })?;
        ctx.device().poll(wgpu::Maintain::Wait);
        Ok(())
    }

    #[cfg(test)]
    pub fn step_node_labels(&self) -> Vec<&'static str> {
        self.step.iter().map(|&i| self.nodes[i].label).collect()
    }
}
