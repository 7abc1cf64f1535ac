// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Single-band tight-binding dispersions
//!
//! The dispersion is tabulated at the crystal momenta `k_i = 2 pi n_i / nk` of the uniform mesh,
//! with the chemical potential subtracted so that the Fermi level sits at zero.

use ndarray::{Array2, Array3, Axis};
use serde::Deserialize;
use std::f64::consts::PI;

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
/// The Bravais lattices with an implemented dispersion
pub enum Lattice {
    /// Square lattice with neighbours at `a1`, `a2` and next neighbours at `a1 +- a2`
    Square,
    /// Triangular lattice with neighbours at `a1`, `a2`, `a1 + a2` and next neighbours at
    /// `a1 - a2`, `2 a1 + a2`, `a1 + 2 a2`
    Triangular,
}

impl std::fmt::Display for Lattice {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Lattice::Square => write!(f, "square"),
            Lattice::Triangular => write!(f, "triangular"),
        }
    }
}

/// A single-band tight-binding model
#[derive(Clone, Debug, Deserialize)]
pub struct TightBinding {
    /// The lattice
    pub lattice: Lattice,
    /// Nearest-neighbour hopping
    pub t: f64,
    /// Next-nearest-neighbour hopping
    #[serde(default)]
    pub t_prime: f64,
    /// Chemical potential
    #[serde(default)]
    pub mu: f64,
}

impl TightBinding {
    /// A model with nearest-neighbour hopping only
    pub fn new(lattice: Lattice, t: f64, mu: f64) -> Self {
        Self {
            lattice,
            t,
            t_prime: 0.0,
            mu,
        }
    }

    /// Add a next-nearest-neighbour hopping
    pub fn with_next_neighbours(mut self, t_prime: f64) -> Self {
        self.t_prime = t_prime;
        self
    }

    /// The energy at crystal momentum `(k1, k2)`
    pub fn energy(&self, k1: f64, k2: f64) -> f64 {
        let (nearest, next) = match self.lattice {
            Lattice::Square => (k1.cos() + k2.cos(), 2.0 * k1.cos() * k2.cos()),
            Lattice::Triangular => (
                k1.cos() + k2.cos() + (k1 + k2).cos(),
                (k1 - k2).cos() + (2.0 * k1 + k2).cos() + (k1 + 2.0 * k2).cos(),
            ),
        };
        -2.0 * (self.t * nearest + self.t_prime * next) - self.mu
    }

    /// The dispersion `e[k1, k2]` on an `nk x nk` mesh
    pub fn dispersion(&self, nk: usize) -> Array2<f64> {
        let step = 2.0 * PI / nk as f64;
        Array2::from_shape_fn((nk, nk), |(i, j)| {
            self.energy(step * i as f64, step * j as f64)
        })
    }

    /// The dispersion with an explicit band axis, `e[k1, k2, 0]`
    pub fn bands(&self, nk: usize) -> Array3<f64> {
        self.dispersion(nk).insert_axis(Axis(2))
    }
}
