use hideseek_assets::RenderAssetCatalog;
use hideseek_common::RenderSize;
use hideseek_kernel::{Sim, WorldInit, WorldState, render_world};

use super::{ExportSlot, NUM_EXPORTED_BUFFERS, TensorSource};
use crate::tensor::HostBuffer;

/// Single-threaded host backend. Worlds run one after another.
#[derive(Debug)]
pub(crate) struct CpuBackend {
    worlds: Vec<Sim>,
    exported: [HostBuffer; NUM_EXPORTED_BUFFERS],
    depth: HostBuffer,
    rgb: HostBuffer,
    render_size: RenderSize,
    render_assets: RenderAssetCatalog,
}

impl CpuBackend {
    pub fn new(
        inits: Vec<WorldInit>,
        render_size: RenderSize,
        render_assets: RenderAssetCatalog,
    ) -> Self {
        let num_worlds = inits.len();
        let worlds: Vec<Sim> = inits.into_iter().map(Sim::new).collect();
        let exported =
            ExportSlot::ALL.map(|slot| HostBuffer::zeroed(num_worlds * slot.bytes_per_world()));
        let pixels = num_worlds * render_size.pixel_count();

        tracing::info!(
            worlds = num_worlds,
            width = render_size.width,
            height = render_size.height,
            "cpu backend ready"
        );

        let mut backend = Self {
            worlds,
            exported,
            depth: HostBuffer::zeroed(pixels * 4),
            rgb: HostBuffer::zeroed(pixels * 4),
            render_size,
            render_assets,
        };
        // Freshly spawned worlds are observable before the first step.
        backend.export();
        backend.observe();
        backend
    }

    pub fn step(&mut self) {
        let _span = tracing::trace_span!("cpu_step", worlds = self.worlds.len()).entered();

        let [reset, action, _] = &mut self.exported;
        let reset = reset.typed_mut::<i32>();
        let action = action.typed_mut::<i32>();
        for ((sim, reset), action) in self.worlds.iter_mut().zip(reset).zip(action.iter()) {
            sim.step(reset, *action);
        }

        self.export();
        self.observe();
    }

    fn export(&mut self) {
        let positions = self.exported[ExportSlot::Position.index()].typed_mut::<[f32; 2]>();
        for (sim, out) in self.worlds.iter().zip(positions) {
            *out = sim.state().position;
        }
    }

    fn observe(&mut self) {
        if !self.render_size.is_enabled() {
            return;
        }
        let pixels = self.render_size.pixel_count();
        let depth = self.depth.typed_mut::<f32>().chunks_exact_mut(pixels);
        let rgb = self.rgb.typed_mut::<[u8; 4]>().chunks_exact_mut(pixels);
        for ((sim, depth), rgb) in self.worlds.iter().zip(depth).zip(rgb) {
            render_world(sim.state(), self.render_size, depth, rgb);
        }
    }

    pub fn buffer(&self, source: TensorSource) -> &HostBuffer {
        match source {
            TensorSource::Exported(slot) => &self.exported[slot.index()],
            TensorSource::Depth => &self.depth,
            TensorSource::Rgb => &self.rgb,
        }
    }

    pub fn world_states(&self) -> Vec<WorldState> {
        self.worlds.iter().map(|sim| *sim.state()).collect()
    }

    pub fn render_assets(&self) -> &RenderAssetCatalog {
        &self.render_assets
    }
}
