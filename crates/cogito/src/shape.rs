// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::ffi::c_int;

use cogito_sys::MAX_DIMS;

use crate::error::{CogitoError, CogitoResult};

/// Converts a host shape into the engine's `int` dimensions.
///
/// Rank must be in `1..=MAX_DIMS`, every dimension positive, and both each
/// dimension and the element count must fit in a C `int`.
pub fn to_foreign(shape: &[usize]) -> CogitoResult<Vec<c_int>> {
    if shape.is_empty() {
        return Err(CogitoError::invalid_argument(shape, "rank must be at least 1"));
    }
    if shape.len() > MAX_DIMS {
        return Err(CogitoError::invalid_argument(
            shape,
            format!("rank {} exceeds the maximum of {MAX_DIMS}", shape.len()),
        ));
    }
    let mut volume: usize = 1;
    let mut dims = Vec::with_capacity(shape.len());
    for (axis, &dim) in shape.iter().enumerate() {
        if dim == 0 {
            return Err(CogitoError::invalid_argument(
                shape,
                format!("dimension {axis} is zero"),
            ));
        }
        let foreign = c_int::try_from(dim).map_err(|_| {
            CogitoError::invalid_argument(shape, format!("dimension {axis} exceeds int range"))
        })?;
        volume = volume
            .checked_mul(dim)
            .filter(|&v| v <= c_int::MAX as usize)
            .ok_or_else(|| CogitoError::invalid_argument(shape, "element count exceeds int range"))?;
        dims.push(foreign);
    }
    Ok(dims)
}

/// Number of elements described by `shape`.
pub fn volume(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides, in elements.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1;
    for (slot, &dim) in strides.iter_mut().zip(shape).rev() {
        *slot = stride;
        stride *= dim;
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_rank_up_to_max() {
        for rank in 1..=MAX_DIMS {
            let shape = vec![2; rank];
            assert_eq!(to_foreign(&shape).unwrap(), vec![2; rank]);
        }
    }

    #[test]
    fn rejects_empty_and_oversized_ranks() {
        assert!(matches!(
            to_foreign(&[]),
            Err(CogitoError::InvalidArgument { .. })
        ));
        let err = to_foreign(&[1; MAX_DIMS + 1]).unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum of 8"));
    }

    #[test]
    fn rejects_zero_dimension() {
        let err = to_foreign(&[3, 0, 2]).unwrap_err();
        assert_eq!(
            err,
            CogitoError::InvalidArgument {
                shape: vec![3, 0, 2],
                reason: "dimension 1 is zero".into(),
            }
        );
    }

    #[test]
    fn rejects_int_overflow() {
        assert!(to_foreign(&[c_int::MAX as usize + 1]).is_err());
        assert!(to_foreign(&[1 << 16, 1 << 16]).is_err());
        assert!(to_foreign(&[1 << 15, 1 << 15]).is_ok());
    }

    #[test]
    fn strides_are_row_major() {
        assert_eq!(contiguous_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(contiguous_strides(&[5]), vec![1]);
        assert_eq!(volume(&[2, 3, 4]), 24);
    }
}
