// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Zero-copy views over foreign tensor buffers.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::slice;

use cogito_sys::CgTensor;
use ndarray::{ArrayViewD, ArrayViewMutD, IxDyn, ShapeBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{CogitoError, CogitoResult};
use crate::shape;
use crate::tensor::Tensor;

/// Version of the NumPy array interface the descriptor follows.
pub const ARRAY_INTERFACE_VERSION: u32 = 3;

/// Element type of every Cogito buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    F32,
}

impl ElementType {
    /// NumPy type string in native byte order.
    pub fn typestr(self) -> &'static str {
        match self {
            ElementType::F32 if cfg!(target_endian = "little") => "<f4",
            ElementType::F32 => ">f4",
        }
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            ElementType::F32 => std::mem::size_of::<f32>(),
        }
    }
}

/// Descriptor in the layout of NumPy's `__array_interface__`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayInterface {
    pub shape: Vec<usize>,
    pub typestr: String,
    /// `(address, read_only)`.
    pub data: (usize, bool),
    /// Byte strides; `None` for C-contiguous buffers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strides: Option<Vec<isize>>,
    pub version: u32,
}

impl ArrayInterface {
    pub fn to_json(&self) -> CogitoResult<String> {
        serde_json::to_string(self).map_err(|err| CogitoError::Serialization {
            message: err.to_string(),
        })
    }
}

/// Geometry shared by both view flavours.
#[derive(Clone, Debug)]
struct Layout {
    data: NonNull<f32>,
    shape: Vec<usize>,
    strides: Vec<isize>,
    len: usize,
}

impl Layout {
    /// Reads geometry from `header` for the buffer at `data`.
    fn read(header: &CgTensor, data: *mut f32) -> CogitoResult<Self> {
        let data = NonNull::new(data)
            .ok_or_else(|| CogitoError::invalid_view("tensor has no data buffer"))?;
        if header.ndim < 1 || header.rank() != header.ndim as usize {
            return Err(CogitoError::invalid_view(format!(
                "foreign rank {} is out of range",
                header.ndim
            )));
        }
        let mut shape = Vec::with_capacity(header.rank());
        for &dim in header.dims() {
            if dim <= 0 {
                return Err(CogitoError::invalid_view(format!(
                    "foreign shape {:?} has a non-positive dimension",
                    header.dims()
                )));
            }
            shape.push(dim as usize);
        }
        let len = header.size.max(0) as usize;
        if len != shape::volume(&shape) {
            return Err(CogitoError::invalid_view(format!(
                "foreign size {} disagrees with shape {shape:?}",
                header.size
            )));
        }
        let mut strides = Vec::with_capacity(shape.len());
        for (&stride, &dim) in header.stride_slice().iter().zip(&shape) {
            if stride < 0 || (stride == 0 && dim > 1) {
                return Err(CogitoError::invalid_view(format!(
                    "foreign strides {:?} are not supported",
                    header.stride_slice()
                )));
            }
            strides.push(stride as isize);
        }
        // The furthest element reachable through the strides must lie inside
        // the `len` elements the engine declared.
        let max_offset = shape
            .iter()
            .zip(&strides)
            .try_fold(0usize, |acc, (&dim, &stride)| {
                (dim - 1)
                    .checked_mul(stride as usize)
                    .and_then(|step| acc.checked_add(step))
            });
        match max_offset {
            Some(offset) if offset < len => {}
            _ => {
                return Err(CogitoError::invalid_view(format!(
                    "foreign strides {:?} reach past {len} elements",
                    header.stride_slice()
                )))
            }
        }
        Ok(Self {
            data,
            shape,
            strides,
            len,
        })
    }

    fn is_contiguous(&self) -> bool {
        shape::contiguous_strides(&self.shape)
            .iter()
            .zip(&self.strides)
            .zip(&self.shape)
            .all(|((&expected, &actual), &dim)| dim == 1 || expected as isize == actual)
    }

    fn ndarray_shape(&self) -> ndarray::StrideShape<IxDyn> {
        let strides: Vec<usize> = self.strides.iter().map(|&s| s as usize).collect();
        IxDyn(&self.shape).strides(IxDyn(&strides))
    }

    fn array_interface(&self, read_only: bool) -> ArrayInterface {
        let itemsize = ElementType::F32.size_in_bytes() as isize;
        ArrayInterface {
            shape: self.shape.clone(),
            typestr: ElementType::F32.typestr().to_string(),
            data: (self.data.as_ptr() as usize, read_only),
            strides: (!self.is_contiguous())
                .then(|| self.strides.iter().map(|&s| s * itemsize).collect()),
            version: ARRAY_INTERFACE_VERSION,
        }
    }
}

/// Read access to a tensor buffer without copying it.
///
/// The view borrows its [`Tensor`], so the handle cannot be released or
/// written through a dispatch while the view is alive.
#[derive(Clone, Debug)]
pub struct TensorView<'a> {
    layout: Layout,
    _owner: PhantomData<&'a Tensor>,
}

impl<'a> TensorView<'a> {
    /// # Safety
    ///
    /// `header` must describe the buffer at `data`, and both must stay valid
    /// and unwritten for `'a`.
    pub(crate) unsafe fn from_header(header: &CgTensor, data: *mut f32) -> CogitoResult<Self> {
        Ok(Self {
            layout: Layout::read(header, data)?,
            _owner: PhantomData,
        })
    }

    /// Address of the first element; equals the foreign `data` pointer.
    pub fn base_address(&self) -> usize {
        self.layout.data.as_ptr() as usize
    }

    pub fn as_ptr(&self) -> *const f32 {
        self.layout.data.as_ptr()
    }

    pub fn shape(&self) -> &[usize] {
        &self.layout.shape
    }

    /// Strides in elements.
    pub fn strides(&self) -> &[isize] {
        &self.layout.strides
    }

    pub fn len(&self) -> usize {
        self.layout.len
    }

    pub fn is_empty(&self) -> bool {
        self.layout.len == 0
    }

    pub fn element_type(&self) -> ElementType {
        ElementType::F32
    }

    /// Views handed out by a tensor are always writable through the owner.
    pub fn is_read_only(&self) -> bool {
        false
    }

    pub fn is_contiguous(&self) -> bool {
        self.layout.is_contiguous()
    }

    /// The buffer as a flat slice, when it is row-major contiguous.
    pub fn as_slice(&self) -> Option<&'a [f32]> {
        self.is_contiguous()
            // SAFETY: contiguous geometry covers exactly `len` elements.
            .then(|| unsafe { slice::from_raw_parts(self.layout.data.as_ptr(), self.layout.len) })
    }

    pub fn as_array(&self) -> ArrayViewD<'a, f32> {
        // SAFETY: geometry was validated against the foreign header.
        unsafe { ArrayViewD::from_shape_ptr(self.layout.ndarray_shape(), self.layout.data.as_ptr()) }
    }

    /// Copies the elements out in logical row-major order.
    pub fn to_vec(&self) -> Vec<f32> {
        match self.as_slice() {
            Some(slice) => slice.to_vec(),
            None => self.as_array().iter().copied().collect(),
        }
    }

    pub fn array_interface(&self) -> ArrayInterface {
        self.layout.array_interface(false)
    }
}

/// Write access to a tensor buffer without copying it.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    layout: Layout,
    _owner: PhantomData<&'a mut Tensor>,
}

impl<'a> TensorViewMut<'a> {
    /// # Safety
    ///
    /// As for [`TensorView::from_header`], and no other access to the buffer
    /// may happen during `'a`.
    pub(crate) unsafe fn from_header(header: &CgTensor, data: *mut f32) -> CogitoResult<Self> {
        Ok(Self {
            layout: Layout::read(header, data)?,
            _owner: PhantomData,
        })
    }

    pub fn base_address(&self) -> usize {
        self.layout.data.as_ptr() as usize
    }

    pub fn shape(&self) -> &[usize] {
        &self.layout.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.layout.strides
    }

    pub fn len(&self) -> usize {
        self.layout.len
    }

    pub fn is_empty(&self) -> bool {
        self.layout.len == 0
    }

    pub fn as_view(&self) -> TensorView<'_> {
        TensorView {
            layout: self.layout.clone(),
            _owner: PhantomData,
        }
    }

    pub fn as_mut_slice(&mut self) -> Option<&mut [f32]> {
        if !self.layout.is_contiguous() {
            return None;
        }
        // SAFETY: exclusive borrow of the owner; contiguous geometry.
        Some(unsafe { slice::from_raw_parts_mut(self.layout.data.as_ptr(), self.layout.len) })
    }

    pub fn as_array_mut(&mut self) -> ArrayViewMutD<'_, f32> {
        // SAFETY: geometry was validated against the foreign header.
        unsafe {
            ArrayViewMutD::from_shape_ptr(self.layout.ndarray_shape(), self.layout.data.as_ptr())
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.as_array_mut().fill(value);
    }

    /// Overwrites the contents from a row-major buffer of equal length.
    pub fn copy_from_slice(&mut self, values: &[f32]) -> CogitoResult<()> {
        if values.len() != self.layout.len {
            return Err(CogitoError::invalid_argument(
                &self.layout.shape,
                format!("expected {} values, got {}", self.layout.len, values.len()),
            ));
        }
        for (dst, &src) in self.as_array_mut().iter_mut().zip(values) {
            *dst = src;
        }
        Ok(())
    }

    pub fn array_interface(&self) -> ArrayInterface {
        self.layout.array_interface(false)
    }
}
