// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Owning handle over one foreign tensor.

use std::ffi::c_int;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use cogito_sys::CgTensor;
use ndarray::{ArrayBase, Data, Dimension};
use tracing::trace;

use crate::engine::{self, Engine};
use crate::error::{CogitoError, CogitoResult};
use crate::shape;
use crate::view::{TensorView, TensorViewMut};

/// Lifecycle of a handle. A failed allocation never produces a [`Tensor`],
/// so every live value starts out `Allocated`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    Allocated,
    Released,
}

/// Exclusive owner of one `cg_tensor`.
///
/// The handle is released exactly once: by [`Tensor::release`] or on drop,
/// whichever comes first. Views borrow the tensor, so none can outlive it.
/// Tensors are neither `Send` nor `Sync`; the engine gives no thread-safety
/// guarantees.
pub struct Tensor {
    raw: Option<NonNull<CgTensor>>,
    engine: &'static Engine,
}

impl Tensor {
    /// Allocates a tensor of `shape` through the process-wide engine.
    ///
    /// Initial contents are whatever the engine provides; use
    /// [`Tensor::zeros`] when they must be zero.
    pub fn new(shape: &[usize], requires_grad: bool) -> CogitoResult<Self> {
        Self::new_in(engine::global()?, shape, requires_grad)
    }

    pub fn new_in(
        engine: &'static Engine,
        shape: &[usize],
        requires_grad: bool,
    ) -> CogitoResult<Self> {
        let dims = shape::to_foreign(shape)?;
        // SAFETY: `dims` holds `dims.len()` validated ints.
        let raw = unsafe {
            (engine.api().tensor_new)(dims.as_ptr(), dims.len() as c_int, requires_grad)
        };
        Self::adopt(engine, raw, shape)
    }

    /// Allocates a tensor and fills it with zeros from the host side.
    pub fn zeros(shape: &[usize], requires_grad: bool) -> CogitoResult<Self> {
        Self::zeros_in(engine::global()?, shape, requires_grad)
    }

    pub fn zeros_in(
        engine: &'static Engine,
        shape: &[usize],
        requires_grad: bool,
    ) -> CogitoResult<Self> {
        let mut tensor = Self::new_in(engine, shape, requires_grad)?;
        tensor.view_mut()?.fill(0.0);
        Ok(tensor)
    }

    /// Copies a row-major buffer into a new foreign tensor of `shape`.
    pub fn from_slice(data: &[f32], shape: &[usize], requires_grad: bool) -> CogitoResult<Self> {
        Self::from_slice_in(engine::global()?, data, shape, requires_grad)
    }

    pub fn from_slice_in(
        engine: &'static Engine,
        data: &[f32],
        shape: &[usize],
        requires_grad: bool,
    ) -> CogitoResult<Self> {
        let dims = shape::to_foreign(shape)?;
        let expected = shape::volume(shape);
        if data.len() != expected {
            return Err(CogitoError::invalid_argument(
                shape,
                format!("buffer holds {} elements, shape needs {expected}", data.len()),
            ));
        }
        // SAFETY: `data` holds exactly the element count described by `dims`;
        // the engine copies it before returning.
        let raw = unsafe {
            (engine.api().tensor_from_data)(
                data.as_ptr(),
                dims.as_ptr(),
                dims.len() as c_int,
                requires_grad,
            )
        };
        Self::adopt(engine, raw, shape)
    }

    /// Copies an `ndarray` into a new foreign tensor with the same shape.
    ///
    /// Arrays that are not in standard (C-contiguous) layout are first copied
    /// into one.
    pub fn from_array<S, D>(array: &ArrayBase<S, D>, requires_grad: bool) -> CogitoResult<Self>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        Self::from_array_in(engine::global()?, array, requires_grad)
    }

    pub fn from_array_in<S, D>(
        engine: &'static Engine,
        array: &ArrayBase<S, D>,
        requires_grad: bool,
    ) -> CogitoResult<Self>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let shape = array.shape().to_vec();
        let standard = array.as_standard_layout();
        let data = standard.as_slice().ok_or_else(|| {
            CogitoError::invalid_argument(&shape, "array could not be made contiguous")
        })?;
        Self::from_slice_in(engine, data, &shape, requires_grad)
    }

    fn adopt(engine: &'static Engine, raw: *mut CgTensor, shape: &[usize]) -> CogitoResult<Self> {
        let raw = NonNull::new(raw).ok_or_else(|| CogitoError::Allocation {
            shape: shape.to_vec(),
        })?;
        trace!(handle = ?raw.as_ptr(), ?shape, "allocated tensor");
        Ok(Self {
            raw: Some(raw),
            engine,
        })
    }

    /// Foreign header, or `Released` naming the operation that needed it.
    pub(crate) fn header(&self, op: &'static str) -> CogitoResult<&CgTensor> {
        match self.raw {
            // SAFETY: a present handle has not been freed and is only freed
            // through `&mut self`.
            Some(raw) => Ok(unsafe { raw.as_ref() }),
            None => Err(CogitoError::Released { op }),
        }
    }

    /// Current shape, read from the foreign header on every call.
    pub fn shape(&self) -> CogitoResult<Vec<usize>> {
        let header = self.header("shape")?;
        header
            .dims()
            .iter()
            .map(|&d| {
                usize::try_from(d).ok().filter(|&d| d > 0).ok_or_else(|| {
                    CogitoError::invalid_view(format!(
                        "foreign shape {:?} has a non-positive dimension",
                        header.dims()
                    ))
                })
            })
            .collect()
    }

    pub fn ndim(&self) -> CogitoResult<usize> {
        Ok(self.header("ndim")?.rank())
    }

    /// Element count as reported by the engine.
    pub fn len(&self) -> CogitoResult<usize> {
        Ok(self.header("len")?.size.max(0) as usize)
    }

    pub fn is_empty(&self) -> CogitoResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Strides in elements.
    pub fn strides(&self) -> CogitoResult<Vec<isize>> {
        let header = self.header("strides")?;
        Ok(header.stride_slice().iter().map(|&s| s as isize).collect())
    }

    pub fn requires_grad(&self) -> CogitoResult<bool> {
        Ok(self.header("requires_grad")?.requires_grad)
    }

    pub fn state(&self) -> HandleState {
        if self.raw.is_some() {
            HandleState::Allocated
        } else {
            HandleState::Released
        }
    }

    pub fn is_released(&self) -> bool {
        self.raw.is_none()
    }

    pub fn engine(&self) -> &'static Engine {
        self.engine
    }

    /// Raw handle for passing to other engine entry points. Null once
    /// released. Ownership stays with `self`.
    pub fn as_ptr(&self) -> *mut CgTensor {
        self.raw.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Gives up ownership of the handle without releasing it.
    pub fn into_raw(self) -> Option<NonNull<CgTensor>> {
        let mut this = ManuallyDrop::new(self);
        this.raw.take()
    }

    /// Zero-copy view over the data buffer.
    pub fn view(&self) -> CogitoResult<TensorView<'_>> {
        let header = self.header("view")?;
        // SAFETY: the view borrows `self`, which keeps the handle alive.
        unsafe { TensorView::from_header(header, header.data) }
    }

    /// Mutable zero-copy view over the data buffer.
    pub fn view_mut(&mut self) -> CogitoResult<TensorViewMut<'_>> {
        let header = self.header("view_mut")?;
        // SAFETY: the view borrows `self` mutably; no other view can coexist.
        unsafe { TensorViewMut::from_header(header, header.data) }
    }

    /// Zero-copy view over the gradient buffer, `None` if the engine did not
    /// allocate one.
    pub fn grad_view(&self) -> CogitoResult<Option<TensorView<'_>>> {
        let header = self.header("grad_view")?;
        if header.grad.is_null() {
            return Ok(None);
        }
        // SAFETY: as for `view`; the gradient buffer shares the data geometry.
        unsafe { TensorView::from_header(header, header.grad) }.map(Some)
    }

    /// Copies the contents out in row-major order.
    pub fn to_vec(&self) -> CogitoResult<Vec<f32>> {
        Ok(self.view()?.to_vec())
    }

    /// Hands the handle back to the engine. Later calls are no-ops.
    pub fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            trace!(handle = ?raw.as_ptr(), "releasing tensor");
            // SAFETY: `take` guarantees this pointer is freed at most once.
            unsafe { (self.engine.api().tensor_free)(raw.as_ptr()) };
        }
    }
}

impl Drop for Tensor {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Tensor");
        dbg.field("handle", &self.as_ptr());
        match self.header("debug") {
            Ok(header) => dbg
                .field("shape", &header.dims())
                .field("requires_grad", &header.requires_grad),
            Err(_) => dbg.field("state", &HandleState::Released),
        };
        dbg.field("engine", &self.engine.label()).finish()
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.view() {
            Ok(view) => write!(f, "Tensor({})", view.as_array()),
            Err(CogitoError::Released { .. }) => f.write_str("Tensor(<released>)"),
            Err(err) => write!(f, "Tensor(<{err}>)"),
        }
    }
}
