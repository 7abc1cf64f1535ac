// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Kernel
//!
//! Every response function in the crate contracts the same object, the divided difference
//!
//! (f(e_{k+q, m}) - f(e_{k, n})) / (e_{k+q, m} - e_{k, n})
//!
//! of the occupation between two points of the mesh. When the energies coincide the quotient is
//! replaced by its analytic limit `-delta(e_{k, n} / kT) / kT`. The substitution is a pure
//! elementwise selection, [`combine`], so it can be tested separately from the contractions which
//! consume it.

use crate::{
    constants::{DEFAULT_TEMPERATURE, DEFAULT_TOLERANCE},
    error::check_extent,
    occupations::{Occupation, Smearing},
    ResponseError,
};
use ndarray::{
    s, Array, Array2, Array3, Array4, ArrayView, ArrayView3, ArrayViewMut, Axis, Dimension, Ix3,
    Zip,
};
use phrenorm_mesh::{MeshShift, PeriodicArray};
use rayon::prelude::*;
use serde::Deserialize;

/// Smearing parameters shared by every divided-difference calculation
#[derive(Clone, Debug, Deserialize)]
pub struct ResponseSettings<O = Smearing> {
    /// The smearing temperature in eV
    pub kt: f64,
    /// Absolute energy difference at and below which two states are treated as degenerate
    #[serde(default = "default_tolerance")]
    pub eps: f64,
    /// The occupation function of the electrons
    #[serde(default)]
    pub occupation: O,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl Default for ResponseSettings<Smearing> {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPERATURE, Smearing::default())
    }
}

impl<O: Occupation> ResponseSettings<O> {
    /// Settings at temperature `kt` with the default degeneracy tolerance
    pub fn new(kt: f64, occupation: O) -> Self {
        Self {
            kt,
            eps: DEFAULT_TOLERANCE,
            occupation,
        }
    }

    /// Replace the degeneracy tolerance
    pub fn with_tolerance(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ResponseError> {
        if !(self.kt.is_finite() && self.kt > 0.0) {
            return Err(ResponseError::InvalidParameter(format!(
                "the smearing temperature must be positive, found {}",
                self.kt
            )));
        }
        if self.eps.is_nan() || self.eps < 0.0 {
            return Err(ResponseError::InvalidParameter(format!(
                "the degeneracy tolerance must be non-negative, found {}",
                self.eps
            )));
        }
        Ok(())
    }

    /// The occupations `f(e / kT)`
    pub fn occupations<D: Dimension>(&self, energies: ArrayView<'_, f64, D>) -> Array<f64, D> {
        energies.mapv(|e| self.occupation.step(e / self.kt))
    }

    /// The derivative of the occupations with respect to energy, `-delta(e / kT) / kT`
    pub fn derivatives<D: Dimension>(&self, energies: ArrayView<'_, f64, D>) -> Array<f64, D> {
        energies.mapv(|e| -self.occupation.delta(e / self.kt) / self.kt)
    }
}

/// Select `primary` where `mask` is set and `fallback` elsewhere
pub fn combine<D: Dimension>(
    primary: ArrayView<'_, f64, D>,
    fallback: ArrayView<'_, f64, D>,
    mask: ArrayView<'_, bool, D>,
) -> Array<f64, D> {
    Zip::from(&mask)
        .and(&primary)
        .and(&fallback)
        .map_collect(|&keep, &primary, &fallback| if keep { primary } else { fallback })
}

/// The divided difference `(f_kq - f_k) / (e_kq - e_k)`, replaced by the local derivative `dfde_k`
/// wherever `|e_kq - e_k| <= eps`
pub fn divided_difference<D: Dimension>(
    f_kq: ArrayView<'_, f64, D>,
    e_kq: ArrayView<'_, f64, D>,
    f_k: ArrayView<'_, f64, D>,
    e_k: ArrayView<'_, f64, D>,
    dfde_k: ArrayView<'_, f64, D>,
    eps: f64,
) -> Array<f64, D> {
    let de = &e_kq - &e_k;
    let quotient = (&f_kq - &f_k) / &de;
    let resolved = de.mapv(|de| de.abs() > eps);
    combine(quotient.view(), dfde_k, resolved.view())
}

/// Zero every transition whose initial and final states both lie in the target subspace
pub fn exclude_subspace<D: Dimension>(
    mut dfde: ArrayViewMut<'_, f64, D>,
    subspace_kq: ArrayView<'_, bool, D>,
    subspace_k: ArrayView<'_, bool, D>,
) {
    Zip::from(&mut dfde)
        .and(&subspace_kq)
        .and(&subspace_k)
        .for_each(|dfde, &inside_kq, &inside_k| {
            if inside_kq && inside_k {
                *dfde = 0.0;
            }
        });
}

/// Energies, occupations and their derivatives on the mesh, replicated once for periodic access
#[derive(Debug)]
pub struct MeshOccupations {
    energies: PeriodicArray<f64, Ix3>,
    occupations: PeriodicArray<f64, Ix3>,
    derivatives: Array3<f64>,
    eps: f64,
}

impl MeshOccupations {
    /// Tabulate `f` and `df/de` for the dispersion `energies[k1, k2, band]`
    pub fn new<O: Occupation>(
        energies: ArrayView3<'_, f64>,
        settings: &ResponseSettings<O>,
    ) -> Result<Self, ResponseError> {
        settings.validate()?;
        let occupations = settings.occupations(energies);
        let derivatives = settings.derivatives(energies);
        Ok(Self {
            energies: PeriodicArray::new(energies)?,
            occupations: PeriodicArray::new(occupations.view())?,
            derivatives,
            eps: settings.eps,
        })
    }

    /// Number of points along each mesh axis
    pub fn nk(&self) -> usize {
        self.energies.nk()
    }

    /// Number of bands
    pub fn nbnd(&self) -> usize {
        self.derivatives.len_of(Axis(2))
    }

    /// The periodic dispersion
    pub fn energies(&self) -> &PeriodicArray<f64, Ix3> {
        &self.energies
    }

    /// The occupation derivative `df/de` at every point of the unshifted mesh
    pub fn derivatives(&self) -> &Array3<f64> {
        &self.derivatives
    }

    /// The divided difference between band `m` at `k + q` and band `n` at `k`, over the mesh
    pub fn dfde(&self, shift: MeshShift, m: usize, n: usize) -> Array2<f64> {
        let e_kq = self.energies.window(shift).index_axis_move(Axis(2), m);
        let f_kq = self.occupations.window(shift).index_axis_move(Axis(2), m);
        let e_k = self.energies.origin().index_axis_move(Axis(2), n);
        let f_k = self.occupations.origin().index_axis_move(Axis(2), n);
        divided_difference(
            f_kq,
            e_kq,
            f_k,
            e_k,
            self.derivatives.index_axis(Axis(2), n),
            self.eps,
        )
    }

    /// The divided differences of the lowest `bands` bands, `[k1, k2, m, n]`
    pub fn dfde_all(&self, shift: MeshShift, bands: usize) -> Result<Array4<f64>, ResponseError> {
        if bands > self.nbnd() {
            return Err(ResponseError::InvalidParameter(format!(
                "requested {bands} bands from a dispersion with {}",
                self.nbnd()
            )));
        }
        let nk = self.nk();
        let blocks = (0..bands * bands)
            .into_par_iter()
            .map(|index| self.dfde(shift, index / bands, index % bands))
            .collect::<Vec<_>>();

        let mut result = Array4::zeros((nk, nk, bands, bands));
        for (index, block) in blocks.into_iter().enumerate() {
            result
                .slice_mut(s![.., .., index / bands, index % bands])
                .assign(&block);
        }
        Ok(result)
    }

    /// Validate that `array` shares the mesh of the dispersion in its first two axes
    pub(crate) fn check_mesh<A, D: Dimension>(
        &self,
        name: &str,
        array: &ArrayView<'_, A, D>,
    ) -> Result<(), ResponseError> {
        if array.ndim() < 2 {
            return Err(ResponseError::Shape(format!(
                "{name}: expected mesh axes, found an array of rank {}",
                array.ndim()
            )));
        }
        check_extent(name, "k1", array.len_of(Axis(0)), self.nk())?;
        check_extent(name, "k2", array.len_of(Axis(1)), self.nk())
    }
}

#[cfg(test)]
mod test {
    use super::{combine, divided_difference, exclude_subspace, MeshOccupations, ResponseSettings};
    use crate::occupations::{Occupation, Smearing};
    use approx::assert_relative_eq;
    use ndarray::{array, s, Array1, Array3, Axis};
    use phrenorm_mesh::MeshShift;

    #[test]
    fn combine_selects_elementwise() {
        let primary = array![1.0, 2.0, 3.0];
        let fallback = array![-1.0, -2.0, -3.0];
        let mask = array![true, false, true];
        let combined = combine(primary.view(), fallback.view(), mask.view());
        assert_eq!(combined, array![1.0, -2.0, 3.0]);
    }

    #[test]
    fn divided_difference_converges_to_the_local_derivative() {
        let settings = ResponseSettings::new(0.05, Smearing::FermiDirac);
        let e1 = 0.013;
        let limit = -settings.occupation.delta(e1 / settings.kt) / settings.kt;

        let mut previous_error = f64::INFINITY;
        for power in 2..8 {
            let e2 = e1 + 10f64.powi(-power);
            let e_k = array![e1];
            let e_kq = array![e2];
            let f_k = settings.occupations(e_k.view());
            let f_kq = settings.occupations(e_kq.view());
            let dfde_k = settings.derivatives(e_k.view());
            let result = divided_difference(
                f_kq.view(),
                e_kq.view(),
                f_k.view(),
                e_k.view(),
                dfde_k.view(),
                settings.eps,
            );
            let error = (result[0] - limit).abs();
            assert!(error < previous_error, "error grew at offset 1e-{power}");
            previous_error = error;
        }
        assert!(previous_error < 1e-6 * limit.abs());
    }

    #[test]
    fn degenerate_states_take_the_derivative() {
        let settings = ResponseSettings::new(0.025, Smearing::Gauss).with_tolerance(1e-12);
        let e_k = array![0.01, -0.2, 0.01];
        let e_kq = array![0.01, -0.2 + 1e-13, 0.04];
        let f_k = settings.occupations(e_k.view());
        let f_kq = settings.occupations(e_kq.view());
        let dfde_k = settings.derivatives(e_k.view());
        let result = divided_difference(
            f_kq.view(),
            e_kq.view(),
            f_k.view(),
            e_k.view(),
            dfde_k.view(),
            settings.eps,
        );
        assert_eq!(result[0], dfde_k[0]);
        assert_eq!(result[1], dfde_k[1]);
        assert_relative_eq!(result[2], (f_kq[2] - f_k[2]) / (0.04 - 0.01), epsilon = 1e-12);
        assert!(result.iter().all(|value| value.is_finite()));
    }

    #[test]
    fn subspace_exclusion_overrides_the_kernel() {
        let mut dfde = Array1::from_elem(4, -1.0);
        let inside_kq = array![true, true, false, false];
        let inside_k = array![true, false, true, false];
        exclude_subspace(dfde.view_mut(), inside_kq.view(), inside_k.view());
        assert_eq!(dfde, array![0.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn all_band_pairs_match_individual_evaluation() {
        let nk = 6;
        let energies = Array3::from_shape_fn((nk, nk, 3), |(i, j, b)| {
            0.1 * (i as f64 - 2.5) - 0.07 * (j as f64) * (b as f64 + 1.0)
        });
        let settings = ResponseSettings::new(0.1, Smearing::FermiDirac);
        let mesh = MeshOccupations::new(energies.view(), &settings).unwrap();
        let shift = MeshShift::new(2, 5, nk);

        let all = mesh.dfde_all(shift, 3).unwrap();
        for m in 0..3 {
            for n in 0..3 {
                assert_eq!(all.slice(s![.., .., m, n]), mesh.dfde(shift, m, n));
            }
        }
        assert!(mesh.dfde_all(shift, 4).is_err());
    }

    #[test]
    fn unshifted_diagonal_is_the_derivative() {
        let nk = 4;
        let energies = Array3::from_shape_fn((nk, nk, 1), |(i, j, _)| 0.05 * (i + 2 * j) as f64);
        let settings = ResponseSettings::default();
        let mesh = MeshOccupations::new(energies.view(), &settings).unwrap();
        let dfde = mesh.dfde(MeshShift::zero(), 0, 0);
        assert_eq!(dfde, mesh.derivatives().index_axis(Axis(2), 0));
    }

    #[test]
    fn non_positive_temperatures_are_rejected() {
        let energies = Array3::<f64>::zeros((2, 2, 1));
        let settings = ResponseSettings::new(0.0, Smearing::FermiDirac);
        assert!(MeshOccupations::new(energies.view(), &settings).is_err());
    }
}
