//! Typed, device-aware views over backend memory.
//!
//! A [`Tensor`] never owns what it points at. Host tensors wrap a pointer into
//! a backend [`HostBuffer`]; device tensors wrap the backend's own
//! `wgpu::Buffer`. The lifetime parameter ties every view to a shared borrow
//! of the manager, so no view survives into the next `step()`.

use bytemuck::Pod;
use std::cell::UnsafeCell;
use std::marker::PhantomData;

#[cfg(feature = "gpu")]
use crate::backend::gpu::{GpuContext, GpuError};

/// Element type tag carried by every tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    UInt8,
    Int8,
    Int16,
    Int32,
    Int64,
    Float16,
    Float32,
}

impl ElementType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::Float16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 => 8,
        }
    }
}

/// Rust types that can be copied in and out of a tensor.
pub trait Element: Pod {
    const ELEMENT_TYPE: ElementType;
}

macro_rules! impl_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl Element for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$tag;
        })*
    };
}

impl_element! {
    u8 => UInt8,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
}

#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    #[error("tensor holds {actual:?} elements, {requested:?} requested")]
    TypeMismatch {
        actual: ElementType,
        requested: ElementType,
    },
    #[error("slice has {len} elements, tensor has {expected}")]
    LengthMismatch { expected: usize, len: usize },
    #[error("tensor spans {needed} bytes but its buffer holds {available}")]
    OutOfBounds { needed: usize, available: usize },
    #[error("device writes must be a multiple of 4 bytes, got {len_bytes}")]
    UnalignedWrite { len_bytes: usize },
    #[cfg(feature = "gpu")]
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Zero-initialized host allocation, 4-byte aligned.
///
/// Interior mutability lets host tensors write through a shared borrow. The
/// backend only takes typed slices while it holds `&mut self`.
pub(crate) struct HostBuffer {
    words: Box<[UnsafeCell<u32>]>,
    len_bytes: usize,
}

impl HostBuffer {
    pub fn zeroed(len_bytes: usize) -> Self {
        let words = (0..len_bytes.div_ceil(4)).map(|_| UnsafeCell::new(0)).collect();
        Self { words, len_bytes }
    }

    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    pub fn as_ptr(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.words.as_ptr()).cast()
    }

    /// View the buffer as `T`s. `T` must not need more than 4-byte alignment.
    pub fn typed_mut<T: Pod>(&mut self) -> &mut [T] {
        assert!(std::mem::align_of::<T>() <= 4);
        let len = self.len_bytes / std::mem::size_of::<T>();
        // SAFETY: the allocation holds at least `len_bytes` initialized bytes,
        // is 4-byte aligned, every bit pattern is a valid `T`, and `&mut self`
        // excludes every other access for the slice's lifetime.
        unsafe { std::slice::from_raw_parts_mut(self.as_ptr().cast::<T>(), len) }
    }
}

impl std::fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBuffer")
            .field("len_bytes", &self.len_bytes)
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Storage<'a> {
    Host {
        ptr: *mut u8,
        len_bytes: usize,
        _buffer: PhantomData<&'a HostBuffer>,
    },
    #[cfg(feature = "gpu")]
    Device {
        buffer: &'a wgpu::Buffer,
        context: &'a GpuContext,
    },
}

/// Non-owning view over one backend buffer.
#[derive(Clone)]
pub struct Tensor<'a> {
    storage: Storage<'a>,
    element_type: ElementType,
    shape: Vec<i64>,
    gpu_id: Option<i32>,
}

impl<'a> Tensor<'a> {
    pub(crate) fn host(buffer: &'a HostBuffer, element_type: ElementType, shape: Vec<i64>) -> Self {
        Self {
            storage: Storage::Host {
                ptr: buffer.as_ptr(),
                len_bytes: buffer.len_bytes(),
                _buffer: PhantomData,
            },
            element_type,
            shape,
            gpu_id: None,
        }
    }

    #[cfg(feature = "gpu")]
    pub(crate) fn device(
        buffer: &'a wgpu::Buffer,
        context: &'a GpuContext,
        element_type: ElementType,
        shape: Vec<i64>,
        gpu_id: i32,
    ) -> Self {
        Self {
            storage: Storage::Device { buffer, context },
            element_type,
            shape,
            gpu_id: Some(gpu_id),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    /// Device the memory lives on, `None` for host memory.
    pub fn gpu_id(&self) -> Option<i32> {
        self.gpu_id
    }

    pub fn is_device(&self) -> bool {
        self.gpu_id.is_some()
    }

    /// Product of the dimensions; negative dimensions count as zero.
    /// Saturates at `usize::MAX` for shapes no allocation could hold.
    pub fn num_elements(&self) -> usize {
        self.checked_num_elements().unwrap_or(usize::MAX)
    }

    /// Saturates like [`Tensor::num_elements`].
    pub fn size_in_bytes(&self) -> usize {
        self.checked_size_in_bytes().unwrap_or(usize::MAX)
    }

    fn checked_num_elements(&self) -> Option<usize> {
        self.shape
            .iter()
            .map(|&d| usize::try_from(d).unwrap_or(0))
            .try_fold(1usize, usize::checked_mul)
    }

    fn checked_size_in_bytes(&self) -> Option<usize> {
        self.checked_num_elements()?
            .checked_mul(self.element_type.size_in_bytes())
    }

    /// Raw host address of the first element, null for device tensors.
    ///
    /// Host buffers never move once allocated, so the pointer stays valid
    /// until the manager is dropped. Contents change with every `step()`;
    /// reading or writing through it while a step runs is the caller's problem.
    pub fn data_ptr(&self) -> *mut u8 {
        match self.storage {
            Storage::Host { ptr, .. } => ptr,
            #[cfg(feature = "gpu")]
            Storage::Device { .. } => std::ptr::null_mut(),
        }
    }

    /// The backend buffer behind a device tensor.
    #[cfg(feature = "gpu")]
    pub fn device_buffer(&self) -> Option<&'a wgpu::Buffer> {
        match self.storage {
            Storage::Host { .. } => None,
            Storage::Device { buffer, .. } => Some(buffer),
        }
    }

    fn backing_len(&self) -> usize {
        match self.storage {
            Storage::Host { len_bytes, .. } => len_bytes,
            #[cfg(feature = "gpu")]
            Storage::Device { buffer, .. } => buffer.size() as usize,
        }
    }

    fn check<T: Element>(&self) -> Result<usize, TensorError> {
        if T::ELEMENT_TYPE != self.element_type {
            return Err(TensorError::TypeMismatch {
                actual: self.element_type,
                requested: T::ELEMENT_TYPE,
            });
        }
        let available = self.backing_len();
        let Some(needed) = self.checked_size_in_bytes() else {
            return Err(TensorError::OutOfBounds {
                needed: usize::MAX,
                available,
            });
        };
        if needed > available {
            return Err(TensorError::OutOfBounds { needed, available });
        }
        Ok(needed)
    }

    /// Copy the tensor's contents out. Device tensors are read back through
    /// a staging buffer.
    pub fn copy_to_vec<T: Element>(&self) -> Result<Vec<T>, TensorError> {
        let len_bytes = self.check::<T>()?;
        let mut out = vec![T::zeroed(); self.num_elements()];
        let dst: &mut [u8] = bytemuck::cast_slice_mut(out.as_mut_slice());
        match self.storage {
            Storage::Host { ptr, .. } => {
                // SAFETY: `check` bounded `len_bytes` by the live allocation.
                unsafe { std::ptr::copy_nonoverlapping(ptr, dst.as_mut_ptr(), len_bytes) };
            }
            #[cfg(feature = "gpu")]
            Storage::Device { buffer, context } => {
                let bytes = context.read_buffer(buffer, len_bytes as u64)?;
                dst.copy_from_slice(&bytes[..len_bytes]);
            }
        }
        Ok(out)
    }

    /// Overwrite the tensor's contents. Device writes are queued and land
    /// before the next step's work.
    pub fn copy_from_slice<T: Element>(&self, data: &[T]) -> Result<(), TensorError> {
        let len_bytes = self.check::<T>()?;
        if data.len() != self.num_elements() {
            return Err(TensorError::LengthMismatch {
                expected: self.num_elements(),
                len: data.len(),
            });
        }
        let src: &[u8] = bytemuck::cast_slice(data);
        match self.storage {
            Storage::Host { ptr, .. } => {
                // SAFETY: as in `copy_to_vec`; host buffers are `UnsafeCell`s.
                unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), ptr, len_bytes) };
            }
            #[cfg(feature = "gpu")]
            Storage::Device { buffer, context } => {
                if len_bytes % 4 != 0 {
                    return Err(TensorError::UnalignedWrite { len_bytes });
                }
                context.write_buffer(buffer, src);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Tensor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("element_type", &self.element_type)
            .field("shape", &self.shape)
            .field("gpu_id", &self.gpu_id)
            .field("data_ptr", &self.data_ptr())
            .finish()
    }
}
