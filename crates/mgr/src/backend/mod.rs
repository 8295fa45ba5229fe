//! Execution backends. Exactly one is selected per manager and it never changes.

mod cpu;
#[cfg(feature = "gpu")]
pub mod gpu;

pub(crate) use cpu::CpuBackend;
#[cfg(feature = "gpu")]
pub(crate) use gpu::GpuBackend;

use crate::tensor::{ElementType, Tensor};

/// Number of entries in the exported-buffer table.
pub const NUM_EXPORTED_BUFFERS: usize = 3;

/// Fixed indices into the exported-buffer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportSlot {
    /// Per-world reset flag, `i32`, written by the caller and cleared by the world.
    Reset = 0,
    /// Per-world move action, `i32`, written by the caller.
    Action = 1,
    /// Per-world agent position on the ground plane, two `f32`s.
    Position = 2,
}

impl ExportSlot {
    pub const ALL: [Self; NUM_EXPORTED_BUFFERS] = [Self::Reset, Self::Action, Self::Position];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Action => "action",
            Self::Position => "position",
        }
    }

    /// Bytes each world occupies in this slot's buffer.
    pub(crate) fn bytes_per_world(self) -> usize {
        match self {
            Self::Reset | Self::Action => 4,
            Self::Position => 8,
        }
    }
}

/// Buffer a tensor view can be taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TensorSource {
    Exported(ExportSlot),
    Depth,
    Rgb,
}

/// The selected execution backend.
#[derive(Debug)]
pub(crate) enum Backend {
    Cpu(CpuBackend),
    #[cfg(feature = "gpu")]
    Gpu(GpuBackend),
}

impl Backend {
    /// Advance every world by one tick and refresh exported state and observations.
    pub fn step(&mut self) {
        match self {
            Self::Cpu(cpu) => cpu.step(),
            #[cfg(feature = "gpu")]
            Self::Gpu(gpu) => gpu.step(),
        }
    }

    pub fn tensor(
        &self,
        source: TensorSource,
        element_type: ElementType,
        shape: Vec<i64>,
    ) -> Tensor<'_> {
        match self {
            Self::Cpu(cpu) => Tensor::host(cpu.buffer(source), element_type, shape),
            #[cfg(feature = "gpu")]
            Self::Gpu(gpu) => Tensor::device(
                gpu.buffer(source),
                gpu.context(),
                element_type,
                shape,
                gpu.gpu_id(),
            ),
        }
    }

    /// Number of render objects registered with the backend's renderer.
    pub fn num_render_objects(&self) -> usize {
        match self {
            Self::Cpu(cpu) => cpu.render_assets().len(),
            #[cfg(feature = "gpu")]
            Self::Gpu(gpu) => gpu.num_render_objects(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_indices_are_fixed() {
        assert_eq!(ExportSlot::Reset.index(), 0);
        assert_eq!(ExportSlot::Action.index(), 1);
        assert_eq!(ExportSlot::Position.index(), 2);
        for slot in ExportSlot::ALL {
            assert_eq!(ExportSlot::from_index(slot.index()), Some(slot));
        }
        assert_eq!(ExportSlot::from_index(NUM_EXPORTED_BUFFERS), None);
    }
}
