// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Raw declarations for the Cogito native tensor ABI.
//!
//! Nothing in this crate owns a tensor. It describes the foreign struct
//! layout, the C signatures of the engine entry points, and how the shared
//! library is located and resolved. Ownership lives in the `cogito` crate.

use std::ffi::c_int;

pub mod error;
pub mod loader;

pub use error::{render_attempts, LoadAttempt, SysError, SysResult};
pub use loader::{load, load_candidates, NativeLibrary};

/// Maximum rank shared by both sides of the ABI.
pub const MAX_DIMS: usize = 8;

/// Host mirror of `cg_tensor`.
///
/// Field order and widths are part of the ABI; the offsets below are checked
/// at compile time on 64-bit targets and the total size is checked against the
/// engine at load time when it exports `cg_tensor_struct_size`.
#[repr(C)]
#[derive(Debug)]
pub struct CgTensor {
    pub data: *mut f32,
    pub grad: *mut f32,
    pub shape: [c_int; MAX_DIMS],
    pub strides: [c_int; MAX_DIMS],
    pub ndim: c_int,
    pub size: c_int,
    pub requires_grad: bool,
}

#[cfg(target_pointer_width = "64")]
const _: () = {
    use std::mem::{offset_of, size_of};
    assert!(offset_of!(CgTensor, data) == 0);
    assert!(offset_of!(CgTensor, grad) == 8);
    assert!(offset_of!(CgTensor, shape) == 16);
    assert!(offset_of!(CgTensor, strides) == 48);
    assert!(offset_of!(CgTensor, ndim) == 80);
    assert!(offset_of!(CgTensor, size) == 84);
    assert!(offset_of!(CgTensor, requires_grad) == 88);
    assert!(size_of::<CgTensor>() == 96);
};

impl CgTensor {
    /// Active prefix of the shape array. Out-of-range ranks are clamped so a
    /// corrupt header can never index past the fixed arrays.
    pub fn dims(&self) -> &[c_int] {
        &self.shape[..self.rank()]
    }

    pub fn stride_slice(&self) -> &[c_int] {
        &self.strides[..self.rank()]
    }

    pub fn rank(&self) -> usize {
        (self.ndim.max(0) as usize).min(MAX_DIMS)
    }
}

pub type TensorNewFn = unsafe extern "C" fn(*const c_int, c_int, bool) -> *mut CgTensor;
pub type TensorFromDataFn =
    unsafe extern "C" fn(*const f32, *const c_int, c_int, bool) -> *mut CgTensor;
pub type TensorFreeFn = unsafe extern "C" fn(*mut CgTensor);
pub type TensorBinaryFn = unsafe extern "C" fn(*mut CgTensor, *mut CgTensor, *mut CgTensor);
pub type StructSizeFn = unsafe extern "C" fn() -> usize;

pub const SYM_TENSOR_NEW: &[u8] = b"cg_tensor_new\0";
pub const SYM_TENSOR_FROM_DATA: &[u8] = b"cg_tensor_from_data\0";
pub const SYM_TENSOR_FREE: &[u8] = b"cg_tensor_free\0";
pub const SYM_TENSOR_ADD: &[u8] = b"cg_tensor_add\0";
pub const SYM_TENSOR_MUL: &[u8] = b"cg_tensor_mul\0";
pub const SYM_STRUCT_SIZE: &[u8] = b"cg_tensor_struct_size\0";

/// Resolved engine entry points.
///
/// The pointers stay valid for as long as the library they were resolved from
/// is loaded; [`NativeLibrary`] keeps both together.
#[derive(Clone, Copy, Debug)]
pub struct EngineApi {
    pub tensor_new: TensorNewFn,
    pub tensor_from_data: TensorFromDataFn,
    pub tensor_free: TensorFreeFn,
    pub tensor_add: TensorBinaryFn,
    pub tensor_mul: TensorBinaryFn,
    pub struct_size: Option<StructSizeFn>,
}

impl EngineApi {
    /// Compares the engine's reported struct size with [`CgTensor`].
    pub fn check_layout(&self) -> SysResult<()> {
        let Some(struct_size) = self.struct_size else {
            return Ok(());
        };
        // SAFETY: the symbol takes no arguments and only reports a constant.
        let found = unsafe { struct_size() };
        let expected = std::mem::size_of::<CgTensor>();
        if found != expected {
            return Err(SysError::LayoutMismatch { expected, found });
        }
        Ok(())
    }
}

/// Human readable symbol name without the trailing nul.
pub fn symbol_name(symbol: &[u8]) -> &str {
    let trimmed = symbol.strip_suffix(b"\0").unwrap_or(symbol);
    std::str::from_utf8(trimmed).unwrap_or("<non-utf8 symbol>")
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn wrong_size() -> usize {
        12
    }

    unsafe extern "C" fn right_size() -> usize {
        std::mem::size_of::<CgTensor>()
    }

    unsafe extern "C" fn never_new(_: *const c_int, _: c_int, _: bool) -> *mut CgTensor {
        std::ptr::null_mut()
    }

    unsafe extern "C" fn never_from_data(
        _: *const f32,
        _: *const c_int,
        _: c_int,
        _: bool,
    ) -> *mut CgTensor {
        std::ptr::null_mut()
    }

    unsafe extern "C" fn noop_free(_: *mut CgTensor) {}

    unsafe extern "C" fn noop_binary(_: *mut CgTensor, _: *mut CgTensor, _: *mut CgTensor) {}

    fn api(struct_size: Option<StructSizeFn>) -> EngineApi {
        EngineApi {
            tensor_new: never_new,
            tensor_from_data: never_from_data,
            tensor_free: noop_free,
            tensor_add: noop_binary,
            tensor_mul: noop_binary,
            struct_size,
        }
    }

    #[test]
    fn layout_check_passes_without_size_symbol() {
        assert!(api(None).check_layout().is_ok());
    }

    #[test]
    fn layout_check_accepts_matching_size() {
        assert!(api(Some(right_size)).check_layout().is_ok());
    }

    #[test]
    fn layout_check_rejects_mismatch() {
        let err = api(Some(wrong_size)).check_layout().unwrap_err();
        assert!(matches!(
            err,
            SysError::LayoutMismatch { found: 12, .. }
        ));
    }

    #[test]
    fn dims_clamp_corrupt_rank() {
        let mut raw = CgTensor {
            data: std::ptr::null_mut(),
            grad: std::ptr::null_mut(),
            shape: [2; MAX_DIMS],
            strides: [1; MAX_DIMS],
            ndim: 3,
            size: 8,
            requires_grad: false,
        };
        assert_eq!(raw.dims(), &[2, 2, 2]);
        raw.ndim = 42;
        assert_eq!(raw.dims().len(), MAX_DIMS);
        raw.ndim = -1;
        assert!(raw.dims().is_empty());
    }

    #[test]
    fn symbol_names_strip_nul() {
        assert_eq!(symbol_name(SYM_TENSOR_NEW), "cg_tensor_new");
        assert_eq!(symbol_name(SYM_STRUCT_SIZE), "cg_tensor_struct_size");
    }
}
