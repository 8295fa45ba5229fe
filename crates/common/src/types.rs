use serde::{Deserialize, Serialize};

/// Where world state lives and how it is stepped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Host-resident worlds, stepped sequentially in-process.
    #[default]
    Cpu,
    /// Device-resident worlds, stepped by a compiled compute task graph.
    Gpu,
}

impl ExecMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }
}

impl std::fmt::Display for ExecMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Gpu),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

/// Optimization level used when the GPU task graph is compiled.
///
/// Only affects the GPU backend. `Debug` trades step throughput for
/// validation of every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompileMode {
    Debug,
    Optimized,
}

/// Width and height of the per-world image observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixels per world. Zero when either dimension is zero.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Image observations are produced only for a non-empty resolution.
    pub fn is_enabled(&self) -> bool {
        self.pixel_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_mode_parses_aliases() {
        assert_eq!("cpu".parse::<ExecMode>().unwrap(), ExecMode::Cpu);
        assert_eq!("GPU".parse::<ExecMode>().unwrap(), ExecMode::Gpu);
        assert_eq!("cuda".parse::<ExecMode>().unwrap(), ExecMode::Gpu);
        assert!("tpu".parse::<ExecMode>().is_err());
    }

    #[test]
    fn exec_mode_default_is_cpu() {
        assert_eq!(ExecMode::default(), ExecMode::Cpu);
        assert_eq!(ExecMode::Gpu.to_string(), "gpu");
    }

    #[test]
    fn render_size_disabled_when_any_dimension_is_zero() {
        assert!(!RenderSize::new(0, 64).is_enabled());
        assert!(!RenderSize::new(64, 0).is_enabled());
        assert!(RenderSize::new(64, 48).is_enabled());
        assert_eq!(RenderSize::new(64, 48).pixel_count(), 3072);
    }
}
