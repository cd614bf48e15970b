// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Reference implementation of the Cogito native tensor ABI.
//!
//! The real engine is a C library; this crate exports the same `cg_*`
//! symbols from Rust so the bindings can be exercised in-process (through
//! [`api`]) or as a drop-in `cdylib`. Storage is zero-initialised, strides
//! are contiguous row-major, and a gradient buffer is allocated when
//! `requires_grad` is set. Kernels are plain loops.

use std::cell::{Cell, RefCell};
use std::ffi::{c_char, c_int, CString};
use std::ptr;
use std::slice;

use cogito_sys::{CgTensor, EngineApi, MAX_DIMS};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
    static LIVE_TENSORS: Cell<usize> = const { Cell::new(0) };
    static FREE_CALLS: Cell<usize> = const { Cell::new(0) };
    static ALLOC_LIMIT: Cell<usize> = const { Cell::new(usize::MAX) };
}

fn set_last_error(message: impl Into<String>) {
    let owned = message.into();
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() = CString::new(owned).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() = None;
    });
}

/// Function table pointing at this crate's exports.
pub fn api() -> EngineApi {
    EngineApi {
        tensor_new: cg_tensor_new,
        tensor_from_data: cg_tensor_from_data,
        tensor_free: cg_tensor_free,
        tensor_add: cg_tensor_add,
        tensor_mul: cg_tensor_mul,
        struct_size: Some(cg_tensor_struct_size),
    }
}

/// Tensors allocated and not yet freed on the calling thread.
pub fn live_tensors() -> usize {
    LIVE_TENSORS.with(Cell::get)
}

/// Number of `cg_tensor_free` calls on a non-null handle on this thread.
pub fn free_calls() -> usize {
    FREE_CALLS.with(Cell::get)
}

/// Makes allocations larger than `elements` fail on the calling thread,
/// standing in for an exhausted native heap. `None` lifts the limit.
pub fn set_allocation_limit(elements: Option<usize>) {
    ALLOC_LIMIT.with(|limit| limit.set(elements.unwrap_or(usize::MAX)));
}

/// Last error recorded on this thread, if any.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|msg| msg.to_string_lossy().into_owned())
    })
}

fn checked_shape(shape: *const c_int, ndim: c_int) -> Result<([c_int; MAX_DIMS], usize), String> {
    if shape.is_null() {
        return Err("shape pointer was null".to_string());
    }
    if ndim < 1 || ndim as usize > MAX_DIMS {
        return Err(format!("ndim {ndim} outside 1..={MAX_DIMS}"));
    }
    let rank = ndim as usize;
    // SAFETY: the caller promises `ndim` readable ints behind `shape`.
    let dims = unsafe { slice::from_raw_parts(shape, rank) };
    let mut out = [0; MAX_DIMS];
    let mut size: usize = 1;
    for (axis, &dim) in dims.iter().enumerate() {
        if dim <= 0 {
            return Err(format!("dimension {axis} is {dim}; must be positive"));
        }
        out[axis] = dim;
        size = size
            .checked_mul(dim as usize)
            .filter(|&s| s <= c_int::MAX as usize)
            .ok_or_else(|| "element count overflows int".to_string())?;
    }
    Ok((out, size))
}

fn zeroed_buffer(len: usize) -> *mut f32 {
    Box::into_raw(vec![0.0_f32; len].into_boxed_slice()) as *mut f32
}

unsafe fn free_buffer(data: *mut f32, len: usize) {
    if !data.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(data, len)));
    }
}

fn allocate(
    shape: [c_int; MAX_DIMS],
    ndim: usize,
    size: usize,
    requires_grad: bool,
) -> *mut CgTensor {
    let limit = ALLOC_LIMIT.with(Cell::get);
    if size > limit {
        set_last_error(format!("allocation of {size} elements exceeds limit {limit}"));
        return ptr::null_mut();
    }

    let mut strides = [0; MAX_DIMS];
    let mut stride: c_int = 1;
    for axis in (0..ndim).rev() {
        strides[axis] = stride;
        stride *= shape[axis];
    }

    let tensor = Box::new(CgTensor {
        data: zeroed_buffer(size),
        grad: if requires_grad {
            zeroed_buffer(size)
        } else {
            ptr::null_mut()
        },
        shape,
        strides,
        ndim: ndim as c_int,
        size: size as c_int,
        requires_grad,
    });
    LIVE_TENSORS.with(|live| live.set(live.get() + 1));
    clear_last_error();
    Box::into_raw(tensor)
}

/// Allocates a zero-filled tensor. Returns `NULL` on invalid shapes.
///
/// # Safety
///
/// `shape` must point to `ndim` readable ints.
#[no_mangle]
pub unsafe extern "C" fn cg_tensor_new(
    shape: *const c_int,
    ndim: c_int,
    requires_grad: bool,
) -> *mut CgTensor {
    match checked_shape(shape, ndim) {
        Ok((dims, size)) => allocate(dims, ndim as usize, size, requires_grad),
        Err(message) => {
            set_last_error(format!("cg_tensor_new: {message}"));
            ptr::null_mut()
        }
    }
}

/// Allocates a tensor and copies `size` floats from `data` into it.
///
/// # Safety
///
/// `shape` must point to `ndim` ints and `data` to as many floats as
/// their product.
#[no_mangle]
pub unsafe extern "C" fn cg_tensor_from_data(
    data: *const f32,
    shape: *const c_int,
    ndim: c_int,
    requires_grad: bool,
) -> *mut CgTensor {
    if data.is_null() {
        set_last_error("cg_tensor_from_data: data pointer was null");
        return ptr::null_mut();
    }
    let (dims, size) = match checked_shape(shape, ndim) {
        Ok(parsed) => parsed,
        Err(message) => {
            set_last_error(format!("cg_tensor_from_data: {message}"));
            return ptr::null_mut();
        }
    };
    let tensor = allocate(dims, ndim as usize, size, requires_grad);
    if !tensor.is_null() {
        ptr::copy_nonoverlapping(data, (*tensor).data, size);
    }
    tensor
}

/// Releases a tensor and its buffers. `NULL` is ignored.
///
/// # Safety
///
/// `tensor` must come from this engine and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn cg_tensor_free(tensor: *mut CgTensor) {
    if tensor.is_null() {
        return;
    }
    let boxed = Box::from_raw(tensor);
    let len = boxed.size.max(0) as usize;
    free_buffer(boxed.data, len);
    free_buffer(boxed.grad, len);
    LIVE_TENSORS.with(|live| live.set(live.get().saturating_sub(1)));
    FREE_CALLS.with(|calls| calls.set(calls.get() + 1));
}

unsafe fn binary(
    name: &str,
    a: *mut CgTensor,
    b: *mut CgTensor,
    out: *mut CgTensor,
    op: impl Fn(f32, f32) -> f32,
) {
    if a.is_null() || b.is_null() || out.is_null() {
        set_last_error(format!("{name}: null tensor handle"));
        return;
    }
    let (a, b, out) = (&*a, &*b, &*out);
    if a.dims() != b.dims() || a.dims() != out.dims() {
        set_last_error(format!(
            "{name}: shape mismatch {:?} / {:?} -> {:?}",
            a.dims(),
            b.dims(),
            out.dims()
        ));
        return;
    }
    // Raw element access: `out` may alias an operand when called in place.
    let len = out.size.max(0) as usize;
    for idx in 0..len {
        *out.data.add(idx) = op(*a.data.add(idx), *b.data.add(idx));
    }
    clear_last_error();
}

/// `out = a + b` elementwise.
///
/// # Safety
///
/// All handles must be live tensors from this engine.
#[no_mangle]
pub unsafe extern "C" fn cg_tensor_add(a: *mut CgTensor, b: *mut CgTensor, out: *mut CgTensor) {
    binary("cg_tensor_add", a, b, out, |l, r| l + r);
}

/// `out = a * b` elementwise.
///
/// # Safety
///
/// All handles must be live tensors from this engine.
#[no_mangle]
pub unsafe extern "C" fn cg_tensor_mul(a: *mut CgTensor, b: *mut CgTensor, out: *mut CgTensor) {
    binary("cg_tensor_mul", a, b, out, |l, r| l * r);
}

/// Size of `cg_tensor` as compiled into this engine.
#[no_mangle]
pub extern "C" fn cg_tensor_struct_size() -> usize {
    std::mem::size_of::<CgTensor>()
}

/// Copies the last error message into `buffer` and returns its length
/// (excluding the nul terminator). Nothing is written when `capacity` is 0.
///
/// # Safety
///
/// `buffer` must be writable for `capacity` bytes.
#[no_mangle]
pub unsafe extern "C" fn cg_last_error_message(buffer: *mut c_char, capacity: usize) -> usize {
    LAST_ERROR.with(|slot| {
        let slot = slot.borrow();
        let Some(message) = slot.as_ref() else {
            return 0;
        };
        let bytes = message.as_bytes();
        if capacity > 0 && !buffer.is_null() {
            let to_copy = bytes.len().min(capacity - 1);
            ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, buffer, to_copy);
            *buffer.add(to_copy) = 0;
        }
        bytes.len()
    })
}
