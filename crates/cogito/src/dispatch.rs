// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Elementwise binary operations executed by the engine.

use std::ops::{Add, Mul};
use std::ptr;

use cogito_sys::{EngineApi, TensorBinaryFn};
use tracing::trace;

use crate::error::{CogitoError, CogitoResult};
use crate::tensor::Tensor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Mul,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Mul => "mul",
        }
    }

    fn kernel(self, api: &EngineApi) -> TensorBinaryFn {
        match self {
            BinaryOp::Add => api.tensor_add,
            BinaryOp::Mul => api.tensor_mul,
        }
    }
}

/// Runs `op` on two tensors of identical shape and returns a fresh output.
///
/// Shapes are compared before anything is allocated; there is no
/// broadcasting. The engine writes straight into the output buffer.
pub fn dispatch(
    op: BinaryOp,
    lhs: &Tensor,
    rhs: &Tensor,
    requires_grad: bool,
) -> CogitoResult<Tensor> {
    let name = op.name();
    lhs.header(name)?;
    rhs.header(name)?;
    if !ptr::eq(lhs.engine(), rhs.engine()) {
        return Err(CogitoError::EngineMismatch);
    }
    let left = lhs.shape()?;
    let right = rhs.shape()?;
    if left != right {
        return Err(CogitoError::ShapeMismatch {
            op: name,
            left,
            right,
        });
    }

    let engine = lhs.engine();
    let out = Tensor::new_in(engine, &left, requires_grad)?;
    trace!(op = name, shape = ?left, "dispatching elementwise kernel");
    // SAFETY: all three handles are live, come from `engine`, and share a shape.
    unsafe { (op.kernel(engine.api()))(lhs.as_ptr(), rhs.as_ptr(), out.as_ptr()) };
    Ok(out)
}

pub fn add(lhs: &Tensor, rhs: &Tensor) -> CogitoResult<Tensor> {
    dispatch(BinaryOp::Add, lhs, rhs, false)
}

pub fn multiply(lhs: &Tensor, rhs: &Tensor) -> CogitoResult<Tensor> {
    dispatch(BinaryOp::Mul, lhs, rhs, false)
}

impl Tensor {
    pub fn add(&self, other: &Tensor) -> CogitoResult<Tensor> {
        add(self, other)
    }

    pub fn mul(&self, other: &Tensor) -> CogitoResult<Tensor> {
        multiply(self, other)
    }

    /// Like [`Tensor::add`], asking the engine to track gradients on the output.
    pub fn add_with(&self, other: &Tensor, requires_grad: bool) -> CogitoResult<Tensor> {
        dispatch(BinaryOp::Add, self, other, requires_grad)
    }

    pub fn mul_with(&self, other: &Tensor, requires_grad: bool) -> CogitoResult<Tensor> {
        dispatch(BinaryOp::Mul, self, other, requires_grad)
    }
}

impl Add for &Tensor {
    type Output = CogitoResult<Tensor>;

    fn add(self, rhs: &Tensor) -> Self::Output {
        add(self, rhs)
    }
}

impl Mul for &Tensor {
    type Output = CogitoResult<Tensor>;

    fn mul(self, rhs: &Tensor) -> Self::Output {
        multiply(self, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::test_support::engine;
    use approx::assert_relative_eq;

    fn tensor(data: &[f32], shape: &[usize]) -> Tensor {
        Tensor::from_slice_in(engine(), data, shape, false).unwrap()
    }

    #[test]
    fn add_and_multiply_are_elementwise() {
        let a = tensor(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = tensor(&[0.5, -1.0, 2.0, 10.0], &[2, 2]);
        let sum = add(&a, &b).unwrap();
        let product = multiply(&a, &b).unwrap();
        for (got, want) in sum.to_vec().unwrap().iter().zip([1.5, 1.0, 5.0, 14.0]) {
            assert_relative_eq!(*got, want);
        }
        for (got, want) in product.to_vec().unwrap().iter().zip([0.5, -2.0, 6.0, 40.0]) {
            assert_relative_eq!(*got, want);
        }
        assert_eq!(sum.shape().unwrap(), vec![2, 2]);
    }

    #[test]
    fn operands_are_left_untouched() {
        let a = tensor(&[1.0, 2.0], &[2]);
        let b = tensor(&[3.0, 4.0], &[2]);
        let _ = (&a * &b).unwrap();
        assert_eq!(a.to_vec().unwrap(), vec![1.0, 2.0]);
        assert_eq!(b.to_vec().unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn mismatched_shapes_allocate_nothing() {
        let a = tensor(&[1.0; 6], &[2, 3]);
        let b = tensor(&[1.0; 6], &[3, 2]);
        let live = cogito_engine::live_tensors();
        let err = (&a + &b).unwrap_err();
        assert_eq!(
            err,
            CogitoError::ShapeMismatch {
                op: "add",
                left: vec![2, 3],
                right: vec![3, 2],
            }
        );
        assert!(matches!(
            multiply(&a, &b),
            Err(CogitoError::ShapeMismatch { op: "mul", .. })
        ));
        assert_eq!(cogito_engine::live_tensors(), live);
    }

    #[test]
    fn released_operand_is_rejected() {
        let a = tensor(&[1.0], &[1]);
        let mut b = tensor(&[1.0], &[1]);
        b.release();
        assert_eq!(add(&a, &b).unwrap_err(), CogitoError::Released { op: "add" });
    }

    #[test]
    fn output_is_independent_of_operands() {
        let out = {
            let a = tensor(&[2.0, 3.0], &[2]);
            a.mul(&a).unwrap()
        };
        assert_eq!(out.to_vec().unwrap(), vec![4.0, 9.0]);
    }

    #[test]
    fn gradient_tracking_is_opt_in() {
        let a = tensor(&[1.0, 2.0], &[2]);
        assert!(!a.add(&a).unwrap().requires_grad().unwrap());
        let tracked = a.add_with(&a, true).unwrap();
        assert!(tracked.requires_grad().unwrap());
        assert!(tracked.grad_view().unwrap().is_some());
        assert!(a.mul_with(&a, true).unwrap().requires_grad().unwrap());
    }

    #[test]
    fn operands_from_different_engines_are_rejected() {
        static OTHER: once_cell::sync::OnceCell<Engine> = once_cell::sync::OnceCell::new();
        let other = OTHER.get_or_init(|| unsafe {
            Engine::from_api(cogito_engine::api(), "other").expect("reference layout")
        });
        let a = tensor(&[1.0], &[1]);
        let b = Tensor::from_slice_in(other, &[1.0], &[1], false).unwrap();
        assert_eq!(add(&a, &b).unwrap_err(), CogitoError::EngineMismatch);
    }
}
