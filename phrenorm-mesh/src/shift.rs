// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use nalgebra::Point2;
use std::f64::consts::PI;

/// A momentum transfer in crystal coordinates, each component in `[0, 2 pi)`
pub type QPoint = Point2<f64>;

/// An integer offset on the `nk x nk` mesh, always reduced into `[0, nk)`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MeshShift {
    q1: usize,
    q2: usize,
}

impl MeshShift {
    /// The shift which leaves every mesh point in place
    pub fn zero() -> Self {
        Self::default()
    }

    /// Construct a shift from integer mesh indices, wrapping at the mesh boundary
    pub fn new(q1: i64, q2: i64, nk: usize) -> Self {
        let nk = nk as i64;
        Self {
            q1: q1.rem_euclid(nk) as usize,
            q2: q2.rem_euclid(nk) as usize,
        }
    }

    /// Snap a q-point in crystal coordinates to the nearest point of an `nk x nk` mesh.
    ///
    /// The resolution in q is bounded by the resolution of the k mesh: any q which does not sit on
    /// the mesh is replaced by its nearest neighbour. Ties round to even, as the reference
    /// implementation does.
    pub fn from_crystal(q: &QPoint, nk: usize) -> Self {
        let scale = nk as f64 / (2.0 * PI);
        Self::new(
            (q.x * scale).round_ties_even() as i64,
            (q.y * scale).round_ties_even() as i64,
            nk,
        )
    }

    pub fn q1(&self) -> usize {
        self.q1
    }

    pub fn q2(&self) -> usize {
        self.q2
    }

    pub fn is_zero(&self) -> bool {
        self.q1 == 0 && self.q2 == 0
    }

    /// The shift corresponding to `self - other`
    pub fn difference(&self, other: &MeshShift, nk: usize) -> Self {
        Self::new(
            self.q1 as i64 - other.q1 as i64,
            self.q2 as i64 - other.q2 as i64,
            nk,
        )
    }
}
