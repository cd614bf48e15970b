// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! DLPack export of foreign tensors.
//!
//! Exporting moves the handle into the managed tensor; the consumer releases
//! it by calling the deleter, which frees the foreign allocation.

use std::ffi::c_void;

use crate::error::{CogitoError, CogitoResult};
use crate::tensor::Tensor;

/// Minimal subset of the DLPack data type codes required for CPU `f32` tensors.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DLDataTypeCode {
    Int = 0,
    UInt = 1,
    Float = 2,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DLDataType {
    pub code: u8,
    pub bits: u8,
    pub lanes: u16,
}

#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DLDeviceType {
    Cpu = 1,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DLDevice {
    pub device_type: i32,
    pub device_id: i32,
}

#[repr(C)]
#[derive(Debug)]
pub struct DLTensor {
    pub data: *mut c_void,
    pub device: DLDevice,
    pub ndim: i32,
    pub dtype: DLDataType,
    pub shape: *mut i64,
    pub strides: *mut i64,
    pub byte_offset: usize,
}

/// Externally managed tensor with a custom deleter.
#[repr(C)]
#[derive(Debug)]
pub struct DLManagedTensor {
    pub dl_tensor: DLTensor,
    pub manager_ctx: *mut c_void,
    pub deleter: Option<unsafe extern "C" fn(*mut DLManagedTensor)>,
}

/// State kept alive behind `manager_ctx` until the deleter runs.
#[derive(Debug)]
struct ManagedTensorState {
    // Owned only so that dropping the state releases the handle.
    #[allow(dead_code)]
    tensor: Tensor,
    shape: Box<[i64]>,
    strides: Box<[i64]>,
}

impl Tensor {
    /// Moves this tensor into a DLPack managed tensor.
    ///
    /// The foreign handle is released when the consumer invokes the deleter.
    /// The deleter must run on the thread that exported the tensor.
    pub fn into_dlpack(self) -> CogitoResult<*mut DLManagedTensor> {
        let (data, shape, strides) = {
            let view = self.view()?;
            let shape: Box<[i64]> = view.shape().iter().map(|&d| d as i64).collect();
            let strides: Box<[i64]> = view.strides().iter().map(|&s| s as i64).collect();
            (view.as_ptr() as *mut c_void, shape, strides)
        };
        let ndim = i32::try_from(shape.len()).map_err(|_| CogitoError::Dlpack {
            message: format!("rank {} exceeds i32 range", shape.len()),
        })?;

        // From here on `self` lives inside the state box, so every exit path
        // still releases the handle exactly once.
        let mut state = Box::new(ManagedTensorState {
            tensor: self,
            shape,
            strides,
        });

        let dl_tensor = DLTensor {
            data,
            device: DLDevice {
                device_type: DLDeviceType::Cpu as i32,
                device_id: 0,
            },
            ndim,
            dtype: DLDataType {
                code: DLDataTypeCode::Float as u8,
                bits: 32,
                lanes: 1,
            },
            shape: state.shape.as_mut_ptr(),
            strides: state.strides.as_mut_ptr(),
            byte_offset: 0,
        };

        let manager_ctx = Box::into_raw(state) as *mut c_void;
        let managed = Box::new(DLManagedTensor {
            dl_tensor,
            manager_ctx,
            deleter: Some(drop_exported_state),
        });
        Ok(Box::into_raw(managed))
    }
}

/// Calls the deleter associated with a managed tensor, if one exists.
///
/// # Safety
///
/// `ptr` must be null or a managed tensor that has not been deleted yet.
pub unsafe fn call_managed_deleter(ptr: *mut DLManagedTensor) {
    if ptr.is_null() {
        return;
    }
    if let Some(deleter) = (*ptr).deleter {
        deleter(ptr);
    }
}

/// Deleter installed by [`Tensor::into_dlpack`]: releases the foreign handle
/// and the export bookkeeping.
///
/// # Safety
///
/// `ptr` must come from [`Tensor::into_dlpack`] and be deleted once.
pub unsafe extern "C" fn drop_exported_state(ptr: *mut DLManagedTensor) {
    if ptr.is_null() {
        return;
    }
    let boxed = Box::from_raw(ptr);
    if !boxed.manager_ctx.is_null() {
        let state = Box::from_raw(boxed.manager_ctx as *mut ManagedTensorState);
        drop(state);
    }
}
