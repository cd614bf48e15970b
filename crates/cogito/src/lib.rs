// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Safe bindings to the Cogito native tensor engine.
//!
//! A [`Tensor`] owns exactly one foreign `cg_tensor` and releases it on drop.
//! Its contents are reachable without copying through borrow-checked views
//! ([`TensorView`], [`TensorViewMut`]), as `ndarray` views, as a NumPy
//! `__array_interface__` descriptor, or by moving the tensor into DLPack.
//! Elementwise arithmetic allocates a fresh output and runs the engine's
//! kernel in place on it.
//!
//! The engine library is located once per process (see
//! [`cogito_config::engine::EngineConfig`]) and shared read-only. Tensors are
//! not `Send`: the engine itself is not thread-safe.

pub mod dispatch;
pub mod dlpack;
pub mod engine;
pub mod error;
pub mod shape;
pub mod telemetry;
pub mod tensor;
pub mod view;

pub use cogito_sys::MAX_DIMS;
pub use dispatch::{add, dispatch, multiply, BinaryOp};
pub use engine::Engine;
pub use error::{CogitoError, CogitoResult};
pub use tensor::{HandleState, Tensor};
pub use view::{ArrayInterface, ElementType, TensorView, TensorViewMut};

#[cfg(test)]
pub(crate) mod test_support {
    use once_cell::sync::OnceCell;

    use crate::engine::Engine;

    /// The in-process reference engine, shared by all unit tests.
    pub fn engine() -> &'static Engine {
        static ENGINE: OnceCell<Engine> = OnceCell::new();
        ENGINE.get_or_init(|| {
            unsafe { Engine::from_api(cogito_engine::api(), "reference") }
                .expect("reference engine matches the host layout")
        })
    }
}
