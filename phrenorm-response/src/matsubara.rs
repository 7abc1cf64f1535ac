// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Matsubara
//!
//! Single-band Green's functions on the fermionic Matsubara axis,
//!
//! G(k, i nu_n) = 1 / (i nu_n - e_k - Delta(i nu_n)),     nu_n = (2 n + 1) pi kT,
//!
//! for a box-shaped hybridisation of width `w` and height `h`, whose self-energy is
//! `Delta(i nu) = -2 i h atan(2 w / nu)`. The static bubble built from these is an alternative to
//! the divided-difference evaluators, with the high-frequency `1 / (i nu)^2` behaviour of the
//! truncated frequency sum restored by an analytic tail (Hafermann, PhD thesis, appendix B).
//!
//! The frequency resolved Green's function is by far the largest object in the crate, so its
//! footprint is checked against a configurable budget before anything is allocated.

use crate::{
    constants::{DEFAULT_MEMORY_LIMIT, DEFAULT_TEMPERATURE},
    ResponseError,
};
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis, Ix3, Zip};
use num_complex::Complex64;
use phrenorm_mesh::{MeshShift, PeriodicArray};
use serde::Deserialize;
use std::f64::consts::PI;

/// Parameters of the Matsubara-axis evaluators
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MatsubaraSettings {
    /// The temperature in eV
    pub kt: f64,
    /// The number of positive fermionic frequencies
    pub nmats: usize,
    /// Width of the box-shaped hybridisation
    pub hyb_width: f64,
    /// Height of the box-shaped hybridisation
    pub hyb_height: f64,
    /// Budget for the Green's functions of all workers in gigabytes
    pub memory_limit_gb: f64,
}

impl Default for MatsubaraSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPERATURE)
    }
}

impl MatsubaraSettings {
    /// Settings at temperature `kt`, 1000 frequencies, no hybridisation and a 4 GB budget
    pub fn new(kt: f64) -> Self {
        Self {
            kt,
            nmats: 1000,
            hyb_width: 1.0,
            hyb_height: 0.0,
            memory_limit_gb: DEFAULT_MEMORY_LIMIT,
        }
    }

    /// Replace the number of frequencies
    pub fn with_frequencies(mut self, nmats: usize) -> Self {
        self.nmats = nmats;
        self
    }

    /// Replace the box-shaped hybridisation
    pub fn with_hybridisation(mut self, width: f64, height: f64) -> Self {
        self.hyb_width = width;
        self.hyb_height = height;
        self
    }

    /// Replace the memory budget
    pub fn with_memory_limit(mut self, gigabytes: f64) -> Self {
        self.memory_limit_gb = gigabytes;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ResponseError> {
        if !(self.kt.is_finite() && self.kt > 0.0) {
            return Err(ResponseError::InvalidParameter(format!(
                "the temperature must be positive, found {}",
                self.kt
            )));
        }
        if self.nmats == 0 {
            return Err(ResponseError::InvalidParameter(
                "at least one Matsubara frequency is required".into(),
            ));
        }
        Ok(())
    }

    /// The positive fermionic frequencies `nu_n = (2 n + 1) pi kT`
    pub fn frequencies(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.nmats, |n| (2 * n + 1) as f64 * PI * self.kt)
    }

    /// The hybridisation `Delta(i nu_n)` at each frequency
    pub fn hybridisation(&self) -> Array1<Complex64> {
        self.frequencies().mapv(|nu| {
            Complex64::new(0.0, -2.0 * self.hyb_height * (2.0 * self.hyb_width / nu).atan())
        })
    }

    /// The tail correction of the static bubble, `-2 / (4 kT) + 4 kT sum_n 1 / nu_n^2`
    ///
    /// The formula is carried unchanged from the reference derivation and has not been verified
    /// independently, the tests compare the evaluators built on it with the direct evaluators.
    pub fn tail(&self) -> f64 {
        let sum = self.frequencies().mapv(|nu| nu.powi(-2)).sum();
        -2.0 / (4.0 * self.kt) + 4.0 * self.kt * sum
    }

    /// The footprint in gigabytes of the replicated Green's functions of `workers` workers
    pub fn required_gb(&self, nk: usize, workers: usize) -> f64 {
        let elements = self.nmats as f64 * (2 * nk).pow(2) as f64;
        elements * std::mem::size_of::<Complex64>() as f64 * workers as f64 / 1e9
    }

    /// Fail when the Green's functions of `workers` workers would exceed the budget
    pub fn check_memory(&self, nk: usize, workers: usize) -> Result<(), ResponseError> {
        let required = self.required_gb(nk, workers);
        if required > self.memory_limit_gb {
            return Err(ResponseError::MemoryLimit {
                required,
                limit: self.memory_limit_gb,
            });
        }
        Ok(())
    }
}

/// The Green's function `G[k1, k2, n]` of a single band, replicated for periodic access
#[derive(Debug)]
pub struct MatsubaraGreensFunction {
    data: PeriodicArray<Complex64, Ix3>,
}

impl MatsubaraGreensFunction {
    /// Build the Green's function of `energies[k1, k2]`
    ///
    /// The budget is checked for `workers` simultaneous copies before the array is allocated.
    pub fn new(
        energies: ArrayView2<'_, f64>,
        settings: &MatsubaraSettings,
        workers: usize,
    ) -> Result<Self, ResponseError> {
        settings.validate()?;
        let (n1, n2) = energies.dim();
        if n1 != n2 {
            return Err(ResponseError::Shape(format!(
                "the dispersion must be given on a square mesh, found {n1} x {n2}"
            )));
        }
        settings.check_memory(n1, workers)?;

        let frequencies = settings.frequencies();
        let hybridisation = settings.hybridisation();
        let greens_function = Array3::from_shape_fn((n1, n2, settings.nmats), |(i, j, n)| {
            (Complex64::new(-energies[[i, j]], frequencies[n]) - hybridisation[n]).inv()
        });
        Ok(Self {
            data: PeriodicArray::new(greens_function.view())?,
        })
    }

    /// Number of points along each mesh axis
    pub fn nk(&self) -> usize {
        self.data.nk()
    }

    /// The frequency sum `Re sum_n G(k, i nu_n) G(k + q, i nu_n)` at every `k`
    pub fn bubble(&self, shift: MeshShift) -> Array2<f64> {
        let nk = self.nk();
        let g_k = self.data.origin();
        let g_kq = self.data.window(shift);
        let mut bubble = Array2::zeros((nk, nk));
        Zip::from(&mut bubble)
            .and(g_k.lanes(Axis(2)))
            .and(g_kq.lanes(Axis(2)))
            .par_for_each(|bubble, g_k, g_kq| {
                *bubble = g_k
                    .iter()
                    .zip(g_kq.iter())
                    .map(|(a, b)| (a * b).re)
                    .sum();
            });
        bubble
    }
}

#[cfg(test)]
mod test {
    use super::{MatsubaraGreensFunction, MatsubaraSettings};
    use crate::ResponseError;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use phrenorm_mesh::MeshShift;
    use std::f64::consts::PI;

    #[test]
    fn footprint_counts_every_worker() {
        let settings = MatsubaraSettings::new(0.1).with_frequencies(100);
        // 100 frequencies on a 20 x 20 mesh of 16 byte numbers
        assert_relative_eq!(settings.required_gb(10, 1), 100.0 * 400.0 * 16.0 / 1e9);
        assert_relative_eq!(
            settings.required_gb(10, 3),
            3.0 * settings.required_gb(10, 1)
        );
    }

    #[test]
    fn an_exceeded_budget_fails_before_allocation() {
        // A budget this large would abort the process if the array were allocated
        let settings = MatsubaraSettings::new(0.1)
            .with_frequencies(1 << 20)
            .with_memory_limit(1.0);
        let energies = Array2::<f64>::zeros((512, 512));
        let result = MatsubaraGreensFunction::new(energies.view(), &settings, 4);
        match result {
            Err(ResponseError::MemoryLimit { required, limit }) => {
                assert_eq!(limit, 1.0);
                assert!(required > 1e4);
            }
            other => panic!("expected a memory error, found {other:?}"),
        }
    }

    #[test]
    fn tail_matches_the_closed_form_of_the_frequency_sum() {
        // sum_{n >= 0} 1 / (2 n + 1)^2 = pi^2 / 8, so the tail vanishes with infinitely many terms
        let settings = MatsubaraSettings::new(0.05).with_frequencies(200_000);
        assert!(settings.tail().abs() < 1e-3);
    }

    #[test]
    fn without_hybridisation_the_green_function_is_free() {
        let settings = MatsubaraSettings::new(0.2).with_frequencies(4);
        let energies = Array2::from_shape_fn((3, 3), |(i, j)| 0.1 * i as f64 - 0.2 * j as f64);
        let greens_function = MatsubaraGreensFunction::new(energies.view(), &settings, 1).unwrap();
        let bubble = greens_function.bubble(MeshShift::zero());

        for ((i, j), value) in bubble.indexed_iter() {
            let e = energies[[i, j]];
            let expected: f64 = (0..4)
                .map(|n| {
                    let nu = (2 * n + 1) as f64 * PI * 0.2;
                    (e * e - nu * nu) / (e * e + nu * nu).powi(2)
                })
                .sum();
            assert_relative_eq!(*value, expected, epsilon = 1e-12);
        }
    }
}
