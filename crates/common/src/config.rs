use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{CompileMode, ExecMode, RenderSize};

/// Mesh directory shipped with the repository, used when no `data_dir` is set.
pub const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../data");

/// File names of the static objects, in catalog order.
pub const STATIC_OBJECT_FILES: [&str; 3] = ["sphere.obj", "plane.obj", "cube.obj"];

/// Errors from configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("num_worlds must be greater than zero")]
    NoWorlds,
    #[error("gpu execution requires a gpu_id")]
    MissingGpuId,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Manager configuration, supplied once at construction and immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exec_mode: ExecMode,
    /// Number of independent worlds stepped in lockstep.
    pub num_worlds: u32,
    /// Index of the compute adapter. Required iff `exec_mode` is `Gpu`.
    pub gpu_id: Option<u32>,
    /// Image observation width; 0 disables image observations.
    pub render_width: u32,
    /// Image observation height; 0 disables image observations.
    pub render_height: u32,
    /// Compile the GPU task graph with validation instead of for speed.
    pub debug_compile: bool,
    /// Directory holding the static object meshes.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exec_mode: ExecMode::Cpu,
            num_worlds: 1,
            gpu_id: None,
            render_width: 0,
            render_height: 0,
            debug_compile: false,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl Config {
    /// Check the construction invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_worlds == 0 {
            return Err(ConfigError::NoWorlds);
        }
        if self.exec_mode == ExecMode::Gpu && self.gpu_id.is_none() {
            return Err(ConfigError::MissingGpuId);
        }
        Ok(())
    }

    pub fn render_size(&self) -> RenderSize {
        RenderSize::new(self.render_width, self.render_height)
    }

    pub fn compile_mode(&self) -> CompileMode {
        if self.debug_compile {
            CompileMode::Debug
        } else {
            CompileMode::Optimized
        }
    }

    /// Paths of the static object meshes, in catalog order.
    pub fn static_object_paths(&self) -> [PathBuf; 3] {
        STATIC_OBJECT_FILES.map(|name| self.data_dir.join(name))
    }

    /// Parse a configuration from YAML. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.compile_mode(), CompileMode::Optimized);
        assert!(!cfg.render_size().is_enabled());
    }

    #[test]
    fn zero_worlds_rejected() {
        let cfg = Config {
            num_worlds: 0,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::NoWorlds)));
    }

    #[test]
    fn gpu_requires_device_id() {
        let mut cfg = Config {
            exec_mode: ExecMode::Gpu,
            num_worlds: 8,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingGpuId)));
        cfg.gpu_id = Some(0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn cpu_ignores_device_id() {
        let cfg = Config {
            gpu_id: Some(3),
            ..Config::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn static_paths_follow_catalog_order() {
        let cfg = Config {
            data_dir: PathBuf::from("/assets"),
            ..Config::default()
        };
        let paths = cfg.static_object_paths();
        assert_eq!(paths[0], Path::new("/assets/sphere.obj"));
        assert_eq!(paths[1], Path::new("/assets/plane.obj"));
        assert_eq!(paths[2], Path::new("/assets/cube.obj"));
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let cfg = Config::from_yaml_str(
            "exec_mode: gpu\nnum_worlds: 1024\ngpu_id: 1\nrender_width: 64\nrender_height: 64\n",
        )
        .unwrap();
        assert_eq!(cfg.exec_mode, ExecMode::Gpu);
        assert_eq!(cfg.num_worlds, 1024);
        assert_eq!(cfg.gpu_id, Some(1));
        assert!(!cfg.debug_compile);
        assert_eq!(cfg.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "num_worlds: 4\ndebug_compile: true\n").unwrap();
        let cfg = Config::load(tmp.path()).unwrap();
        assert_eq!(cfg.num_worlds, 4);
        assert_eq!(cfg.compile_mode(), CompileMode::Debug);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            Config::from_yaml_str("num_worlds: [1, 2"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
