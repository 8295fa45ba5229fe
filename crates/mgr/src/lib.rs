//! Execution manager for many parallel hide-and-seek worlds.
//!
//! The [`Manager`] loads the shared physics and render catalogs, replicates
//! one init record per world, hands the worlds to the selected backend and
//! steps them in lockstep. Simulation state is exposed to the training
//! process as [`Tensor`] views over backend memory, without copies.
//!
//! # Invariants
//! - Exactly `num_worlds` worlds exist from construction until drop.
//! - Exported-buffer slots are fixed: reset = 0, action = 1, position = 2.
//! - Tensors never own memory and never outlive a shared borrow of the manager.
//! - GPU execution without the `gpu` feature fails at construction.

mod backend;
mod error;
mod manager;
mod tensor;

#[cfg(feature = "gpu")]
pub use backend::gpu::{GpuContext, GpuError};
pub use backend::{ExportSlot, NUM_EXPORTED_BUFFERS};
pub use error::ManagerError;
pub use manager::Manager;
pub use tensor::{Element, ElementType, Tensor, TensorError};

/// Backends this build can execute on.
pub fn compiled_backends() -> &'static [hideseek_common::ExecMode] {
    use hideseek_common::ExecMode;
    #[cfg(feature = "gpu")]
    {
        &[ExecMode::Cpu, ExecMode::Gpu]
    }
    #[cfg(not(feature = "gpu"))]
    {
        &[ExecMode::Cpu]
    }
}
