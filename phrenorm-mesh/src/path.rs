// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::{MeshError, QPoint};
use std::f64::consts::PI;

/// A piecewise linear path through the Brillouin zone
#[derive(Clone, Debug)]
pub struct QPath {
    points: Vec<QPoint>,
    corner_indices: Vec<usize>,
}

impl QPath {
    /// Build a path through `corners`, given as fractions of a reciprocal lattice vector.
    ///
    /// Each segment is sampled with `points_per_segment` points, the final corner is included.
    pub fn through_fractional_corners(
        corners: &[[f64; 2]],
        points_per_segment: usize,
    ) -> Result<Self, MeshError> {
        if corners.is_empty() || points_per_segment == 0 {
            return Err(MeshError::Path);
        }
        let corners: Vec<QPoint> = corners
            .iter()
            .map(|corner| QPoint::new(2.0 * PI * corner[0], 2.0 * PI * corner[1]))
            .collect();

        let mut points = Vec::with_capacity((corners.len() - 1) * points_per_segment + 1);
        let mut corner_indices = Vec::with_capacity(corners.len());
        for segment in corners.windows(2) {
            corner_indices.push(points.len());
            let step = (segment[1] - segment[0]) / points_per_segment as f64;
            points.extend((0..points_per_segment).map(|i| segment[0] + step * i as f64));
        }
        corner_indices.push(points.len());
        points.push(corners[corners.len() - 1]);

        Ok(Self {
            points,
            corner_indices,
        })
    }

    pub fn points(&self) -> &[QPoint] {
        &self.points
    }

    pub fn corner_indices(&self) -> &[usize] {
        &self.corner_indices
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Cumulative distance along the path in crystal coordinates
    pub fn distances(&self) -> Vec<f64> {
        let mut distance = 0.0;
        let mut distances = Vec::with_capacity(self.points.len());
        distances.push(distance);
        for pair in self.points.windows(2) {
            distance += (pair[1] - pair[0]).norm();
            distances.push(distance);
        }
        distances
    }
}

/// Every point of the `nk x nk` mesh in row-major order
pub fn full_mesh(nk: usize) -> Vec<QPoint> {
    let step = 2.0 * PI / nk as f64;
    (0..nk)
        .flat_map(|i| (0..nk).map(move |j| QPoint::new(step * i as f64, step * j as f64)))
        .collect()
}
