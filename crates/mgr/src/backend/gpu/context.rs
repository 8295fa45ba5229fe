use hideseek_common::CompileMode;

use super::GpuError;

/// Adapter, device and queue for one compute device.
pub struct GpuContext {
    gpu_id: u32,
    info: wgpu::AdapterInfo,
    compile_mode: CompileMode,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuContext {
    /// Open adapter `gpu_id`, indexing the adapters in enumeration order.
    pub fn new(gpu_id: u32, compile_mode: CompileMode) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(wgpu::Backends::all());
        let available = adapters.len();
        let adapter = adapters
            .into_iter()
            .nth(gpu_id as usize)
            .ok_or(GpuError::AdapterNotFound { gpu_id, available })?;
        let info = adapter.get_info();

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("hideseek_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        tracing::info!(
            gpu_id,
            name = %info.name,
            backend = ?info.backend,
            ?compile_mode,
            "gpu device ready"
        );

        Ok(Self {
            gpu_id,
            info,
            compile_mode,
            device,
            queue,
        })
    }

    pub fn gpu_id(&self) -> u32 {
        self.gpu_id
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    pub fn compile_mode(&self) -> CompileMode {
        self.compile_mode
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Run `f` inside a validation error scope when compiled for debugging.
    pub fn validated<R>(&self, pass: &'static str, f: impl FnOnce() -> R) -> Result<R, GpuError> {
        if self.compile_mode == CompileMode::Optimized {
            return Ok(f());
        }
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let out = f();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(GpuError::Validation {
                pass,
                message: err.to_string(),
            }),
            None => Ok(out),
        }
    }

    /// Read the first `len` bytes of `buffer` back to the host.
    pub fn read_buffer(&self, buffer: &wgpu::Buffer, len: u64) -> Result<Vec<u8>, GpuError> {
        let size = len
            .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
            .min(buffer.size());
        if size == 0 {
            return Ok(Vec::new());
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| GpuError::Readback(format!("map callback dropped: {e}")))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut bytes = mapped.to_vec();
        drop(mapped);
        staging.unmap();
        bytes.truncate(len as usize);
        Ok(bytes)
    }

    /// Queue a write to the start of `buffer`; it lands before the next submission.
    pub fn write_buffer(&self, buffer: &wgpu::Buffer, data: &[u8]) {
        self.queue.write_buffer(buffer, 0, data);
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("gpu_id", &self.gpu_id)
            .field("adapter", &self.info.name)
            .field("backend", &self.info.backend)
            .field("compile_mode", &self.compile_mode)
            .finish()
    }
}
