use hideseek_assets::AssetError;
use hideseek_common::{ConfigError, ExecMode};
use hideseek_physics::PhysicsError;

#[cfg(feature = "gpu")]
use crate::backend::gpu::GpuError;

/// Errors that prevent a [`Manager`](crate::Manager) from being constructed.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("render asset import failed: {0}")]
    Assets(#[from] AssetError),
    #[error("physics catalog load failed: {0}")]
    Physics(#[from] PhysicsError),
    #[error("{0} execution requested but hideseek was not compiled with GPU support")]
    BackendUnavailable(ExecMode),
    #[cfg(feature = "gpu")]
    #[error("GPU backend error: {0}")]
    Gpu(#[from] GpuError),
}
