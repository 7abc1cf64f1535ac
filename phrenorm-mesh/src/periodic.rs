// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Periodic
//!
//! A read-only view of a mesh-valued array which can be windowed from any origin on the mesh.
//!
//! The first two axes of the wrapped array index the `nk x nk` crystal-momentum mesh, any further
//! axes (bands, orbitals, Matsubara frequencies) are carried along untouched. The array is tiled
//! to `2nk x 2nk` once on construction so that a window never needs per-element modulo arithmetic.

use crate::{MeshError, MeshShift};
use ndarray::{concatenate, Array, ArrayView, Axis, Dimension, RemoveAxis, Slice};

#[derive(Clone, Debug)]
pub struct PeriodicArray<A, D: Dimension> {
    data: Array<A, D>,
    nk: usize,
}

impl<A: Clone, D: RemoveAxis> PeriodicArray<A, D> {
    /// Replicate `array` to twice its linear size along both mesh axes
    pub fn new(array: ArrayView<'_, A, D>) -> Result<Self, MeshError> {
        if array.ndim() < 2 {
            return Err(MeshError::Rank(array.ndim()));
        }
        let (n1, n2) = (array.len_of(Axis(0)), array.len_of(Axis(1)));
        if n1 != n2 {
            return Err(MeshError::NonSquare(n1, n2));
        }
        if n1 == 0 {
            return Err(MeshError::Empty);
        }

        let row = concatenate(Axis(1), &[array.view(), array.view()])?;
        let data = concatenate(Axis(0), &[row.view(), row.view()])?;

        Ok(Self { data, nk: n1 })
    }
}

impl<A, D: Dimension> PeriodicArray<A, D> {
    /// Number of points along each mesh axis
    pub fn nk(&self) -> usize {
        self.nk
    }

    /// The `nk x nk` window starting at `shift`, so that `window(q)[k] = array[k + q]`
    pub fn window(&self, shift: MeshShift) -> ArrayView<'_, A, D> {
        let nk = self.nk;
        let (q1, q2) = (shift.q1() % nk, shift.q2() % nk);
        self.data.slice_each_axis(|description| match description.axis.index() {
            0 => Slice::from(q1..q1 + nk),
            1 => Slice::from(q2..q2 + nk),
            _ => Slice::from(..),
        })
    }

    /// The unshifted array
    pub fn origin(&self) -> ArrayView<'_, A, D> {
        self.window(MeshShift::zero())
    }
}
