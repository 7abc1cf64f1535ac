// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Occupations
//!
//! Step functions `S(x)` of the reduced energy `x = e / kT` together with the matched delta-like
//! weight `D(x) = -S'(x)` and its slope `D'(x)`. The response functions only see the
//! [`Occupation`] trait, so any of the [`Smearing`] variants (or a user implementation) can be
//! swapped in without touching them.

mod methfessel_paxton;

use crate::constants::MAXIMUM_EXPONENT;
use ndarray::{Array, ArrayView, Dimension};
use num_complex::Complex;
use serde::Deserialize;
use std::f64::consts::PI;

/// A smoothened Heaviside step and its derivatives
pub trait Occupation: Send + Sync {
    /// The population `S(x)`
    fn step(&self, x: f64) -> f64;
    /// The negative derivative `D(x) = -S'(x)`
    fn delta(&self, x: f64) -> f64;
    /// The derivative of the weight `D'(x) = -S''(x)`
    fn delta_prime(&self, x: f64) -> f64;

    /// Elementwise `S(x)`
    fn step_array<D: Dimension>(&self, x: ArrayView<'_, f64, D>) -> Array<f64, D>
    where
        Self: Sized,
    {
        x.mapv(|x| self.step(x))
    }

    /// Elementwise `D(x)`
    fn delta_array<D: Dimension>(&self, x: ArrayView<'_, f64, D>) -> Array<f64, D>
    where
        Self: Sized,
    {
        x.mapv(|x| self.delta(x))
    }

    /// Elementwise `D'(x)`
    fn delta_prime_array<D: Dimension>(&self, x: ArrayView<'_, f64, D>) -> Array<f64, D>
    where
        Self: Sized,
    {
        x.mapv(|x| self.delta_prime(x))
    }
}

/// The occupation functions available to a calculation
#[derive(Copy, Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Smearing {
    /// The Fermi-Dirac distribution
    FermiDirac,
    /// Complementary error function step with a Gaussian weight
    Gauss,
    /// Methfessel-Paxton expansion (Phys. Rev. B 40, 3616, 1989) of the given order
    MethfesselPaxton {
        /// Order of the Hermite expansion, zero reproduces `Gauss`
        order: usize,
    },
    /// Lorentzian step, which mimics a wide box-shaped hybridisation at low temperatures when
    /// `x` is the energy divided by the height of the hybridisation
    Lorentz,
    /// The Fermi-Dirac distribution as a truncated sum over fermionic Matsubara frequencies
    FermiDiracMatsubara {
        /// Number of positive frequencies in the sum
        nmats: usize,
    },
}

impl Default for Smearing {
    fn default() -> Self {
        Self::FermiDirac
    }
}

impl Occupation for Smearing {
    fn step(&self, x: f64) -> f64 {
        match self {
            Self::FermiDirac => 1.0 / (x.min(MAXIMUM_EXPONENT).exp() + 1.0),
            Self::Gauss => 0.5 * (1.0 - libm::erf(x)),
            Self::MethfesselPaxton { order } => methfessel_paxton::expansion(x, *order).step,
            Self::Lorentz => 0.5 - (x / PI).atan() / PI,
            Self::FermiDiracMatsubara { nmats } => {
                0.5 + 2.0 * matsubara_terms(x, *nmats).map(|z| z.inv().re).sum::<f64>()
            }
        }
    }

    fn delta(&self, x: f64) -> f64 {
        match self {
            Self::FermiDirac => 1.0 / (2.0 * x.abs().min(MAXIMUM_EXPONENT).cosh() + 2.0),
            Self::Gauss => (-x * x).exp() / PI.sqrt(),
            Self::MethfesselPaxton { order } => methfessel_paxton::expansion(x, *order).delta,
            Self::Lorentz => 1.0 / (x * x + PI * PI),
            Self::FermiDiracMatsubara { nmats } => {
                -2.0 * matsubara_terms(x, *nmats)
                    .map(|z| z.powi(2).inv().re)
                    .sum::<f64>()
            }
        }
    }

    fn delta_prime(&self, x: f64) -> f64 {
        match self {
            // -S'' = -S (1 - S) (1 - 2 S) = -D tanh(x / 2)
            Self::FermiDirac => -self.delta(x) * (0.5 * x).tanh(),
            Self::Gauss => -2.0 * x * self.delta(x),
            Self::MethfesselPaxton { order } => {
                methfessel_paxton::expansion(x, *order).delta_prime
            }
            Self::Lorentz => -2.0 * x / (x * x + PI * PI).powi(2),
            Self::FermiDiracMatsubara { nmats } => {
                -4.0 * matsubara_terms(x, *nmats)
                    .map(|z| z.powi(3).inv().re)
                    .sum::<f64>()
            }
        }
    }
}

/// The denominators `i nu_n - x` with `nu_n = (2 n + 1) pi` for `n < nmats`
fn matsubara_terms(x: f64, nmats: usize) -> impl Iterator<Item = Complex<f64>> {
    (0..nmats).map(move |n| Complex::new(-x, (2 * n + 1) as f64 * PI))
}

#[cfg(test)]
mod test {
    use super::{Occupation, Smearing};
    use approx::assert_relative_eq;
    use ndarray::Array1;

    const VARIANTS: [Smearing; 6] = [
        Smearing::FermiDirac,
        Smearing::Gauss,
        Smearing::MethfesselPaxton { order: 1 },
        Smearing::MethfesselPaxton { order: 3 },
        Smearing::Lorentz,
        Smearing::FermiDiracMatsubara { nmats: 2000 },
    ];

    /// Trapezoidal `-int_a^b D dx`
    fn integrated_weight(smearing: &Smearing, a: f64, b: f64, n: usize) -> f64 {
        let x = Array1::linspace(a, b, n);
        let dx = (b - a) / (n - 1) as f64;
        let mut weights = smearing.delta_array(x.view());
        weights[0] /= 2.0;
        weights[n - 1] /= 2.0;
        -weights.sum() * dx
    }

    #[test]
    fn integrated_weight_matches_the_change_in_population() {
        for smearing in VARIANTS.iter() {
            for &(a, b) in [(-4.2, 3.1), (1.5, -2.5), (-0.3, 0.4)].iter() {
                let integral = integrated_weight(smearing, a, b, 20001);
                let difference = smearing.step(b) - smearing.step(a);
                assert_relative_eq!(integral, difference, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn weight_slope_matches_finite_differences() {
        let h = 1e-5;
        for smearing in VARIANTS.iter() {
            for &x in [-2.3, -0.7, 0.0, 0.4, 1.9].iter() {
                let numerical = (smearing.delta(x + h) - smearing.delta(x - h)) / (2.0 * h);
                assert_relative_eq!(smearing.delta_prime(x), numerical, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn fermi_dirac_is_stable_far_from_the_fermi_level() {
        let smearing = Smearing::FermiDirac;
        assert!(smearing.step(1e4).is_finite() && smearing.step(1e4) < 1e-300);
        assert_eq!(smearing.step(-1e4), 1.0);
        assert!(smearing.delta(1e4).is_finite() && smearing.delta(1e4) < 1e-300);
        assert!(smearing.delta_prime(-1e4).abs() < 1e-300);
        assert_relative_eq!(smearing.step(0.0), 0.5);
        assert_relative_eq!(smearing.delta(0.0), 0.25);
    }

    #[test]
    fn zeroth_order_methfessel_paxton_is_gaussian() {
        let mp = Smearing::MethfesselPaxton { order: 0 };
        for &x in [-1.5, -0.2, 0.0, 0.8].iter() {
            assert_relative_eq!(mp.step(x), Smearing::Gauss.step(x), epsilon = 1e-14);
            assert_relative_eq!(mp.delta(x), Smearing::Gauss.delta(x), epsilon = 1e-14);
        }
    }

    #[test]
    fn matsubara_sum_converges_to_fermi_dirac() {
        let matsubara = Smearing::FermiDiracMatsubara { nmats: 10000 };
        for &x in [-3.0, -0.5, 0.0, 1.2].iter() {
            assert_relative_eq!(
                matsubara.step(x),
                Smearing::FermiDirac.step(x),
                epsilon = 1e-4
            );
            assert_relative_eq!(
                matsubara.delta(x),
                Smearing::FermiDirac.delta(x),
                epsilon = 1e-4
            );
        }
    }

    #[test]
    fn smearing_is_read_from_snake_case_names() {
        use serde::de::{value::Error, IntoDeserializer};
        use serde::Deserialize;
        let smearing = Smearing::deserialize("fermi_dirac".into_deserializer())
            .map_err(|e: Error| e)
            .unwrap();
        assert_eq!(smearing, Smearing::FermiDirac);
        let smearing = Smearing::deserialize("lorentz".into_deserializer())
            .map_err(|e: Error| e)
            .unwrap();
        assert_eq!(smearing, Smearing::Lorentz);
    }
}
