// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Polarization
//!
//! The density-density RPA polarization in the orbital basis
//!
//! Pi_ab(q) = 2 / N sum_{k m n} conj(UU_a) dfde_{mn}(k, q) UU_b,
//!
//! UU_a = conj(U[k + q, a, m]) U[k, a, n],
//!
//! which is Hermitian in the orbital indices by construction. When a subspace mask is provided the
//! constrained RPA is evaluated instead: transitions between two states of the target subspace are
//! removed from the bubble.

use crate::{
    error::check_extent,
    kernel::{exclude_subspace, MeshOccupations},
    matrices::adjoint,
    occupations::Occupation,
    parallel::{gather_blocks, Communicator, Partition},
    ResponseError, ResponseSettings,
};
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, ArrayView4, Axis, Ix3, Ix4};
use num_complex::Complex64;
use phrenorm_mesh::{MeshShift, PeriodicArray, QPoint};
use rayon::prelude::*;

/// The RPA, or constrained RPA, polarization of a multi-band dispersion
#[derive(Debug)]
pub struct Polarization {
    mesh: MeshOccupations,
    transform: PeriodicArray<Complex64, Ix4>,
    subspace: Option<PeriodicArray<bool, Ix3>>,
}

impl Polarization {
    /// Prepare the polarization of `energies[k1, k2, band]` with the orbital transform
    /// `transform[k1, k2, orbital, band]`
    ///
    /// `subspace[k1, k2, band]` marks the states of the cRPA target subspace.
    #[tracing::instrument(name = "Polarization", level = "info", skip_all)]
    pub fn new<O: Occupation>(
        energies: ArrayView3<'_, f64>,
        transform: ArrayView4<'_, Complex64>,
        settings: &ResponseSettings<O>,
        subspace: Option<ArrayView3<'_, bool>>,
    ) -> Result<Self, ResponseError> {
        let mesh = MeshOccupations::new(energies, settings)?;
        mesh.check_mesh("transform", &transform)?;
        check_extent("transform", "band", transform.len_of(Axis(3)), mesh.nbnd())?;
        if let Some(subspace) = subspace.as_ref() {
            if subspace.shape() != energies.shape() {
                return Err(ResponseError::Shape(format!(
                    "subspace: shape {:?} differs from the dispersion {:?}",
                    subspace.shape(),
                    energies.shape()
                )));
            }
            let excluded = subspace.iter().filter(|&&inside| inside).count();
            tracing::info!("Constrained RPA excluding {excluded} states");
        }

        Ok(Self {
            transform: PeriodicArray::new(transform)?,
            subspace: subspace.map(PeriodicArray::new).transpose()?,
            mesh,
        })
    }

    /// Prepare the polarization of a single band `energies[k1, k2]` with the orbital weights
    /// `transform[k1, k2, orbital]`
    pub fn single_band<O: Occupation>(
        energies: ArrayView2<'_, f64>,
        transform: ArrayView3<'_, Complex64>,
        settings: &ResponseSettings<O>,
        subspace: Option<ArrayView2<'_, bool>>,
    ) -> Result<Self, ResponseError> {
        Self::new(
            energies.insert_axis(Axis(2)),
            transform.insert_axis(Axis(3)),
            settings,
            subspace.map(|subspace| subspace.insert_axis(Axis(2))),
        )
    }

    /// Number of orbitals
    pub fn norb(&self) -> usize {
        self.transform.origin().len_of(Axis(2))
    }

    /// The polarization at the q-point in crystal coordinates
    pub fn evaluate(&self, q: &QPoint) -> Array2<Complex64> {
        self.evaluate_shift(MeshShift::from_crystal(q, self.mesh.nk()))
    }

    /// The polarization `Pi[a, b]` at the mesh point `shift`
    pub fn evaluate_shift(&self, shift: MeshShift) -> Array2<Complex64> {
        let nk = self.mesh.nk();
        let nbnd = self.mesh.nbnd();
        let norb = self.norb();
        let prefactor = 2.0 / (nk * nk) as f64;

        let u_kq = self.transform.window(shift);
        let u_k = self.transform.origin();

        (0..nbnd * nbnd)
            .into_par_iter()
            .map(|index| {
                let (m, n) = (index / nbnd, index % nbnd);
                let mut dfde = self.mesh.dfde(shift, m, n);
                if let Some(subspace) = self.subspace.as_ref() {
                    exclude_subspace(
                        dfde.view_mut(),
                        subspace.window(shift).index_axis_move(Axis(2), m),
                        subspace.origin().index_axis_move(Axis(2), n),
                    );
                }

                let overlaps = Array2::from_shape_fn((nk * nk, norb), |(k, a)| {
                    let (k1, k2) = (k / nk, k % nk);
                    u_kq[[k1, k2, a, m]].conj() * u_k[[k1, k2, a, n]]
                });
                let weights = dfde.iter().map(|&w| Complex64::from(w)).collect::<Array1<_>>();
                let weighted = &overlaps * &weights.insert_axis(Axis(1));
                adjoint(overlaps.view()).dot(&weighted)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .fold(Array2::zeros((norb, norb)), |total, pair| total + pair)
            * Complex64::from(prefactor)
    }

    /// The polarization `Pi[q, a, b]` at every q-point, distributed over the workers of `comm`
    pub fn evaluate_many<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
    ) -> Result<Array3<Complex64>, ResponseError> {
        let partition = Partition::for_communicator(comm, q.len())?;
        let range = partition.range(comm.rank());
        let norb = self.norb();
        let mut local = Array3::zeros((range.len(), norb, norb));
        for (mut row, q) in local.outer_iter_mut().zip(&q[range]) {
            tracing::debug!("Polarization at q = ({:.4}, {:.4})", q.x, q.y);
            row.assign(&self.evaluate(q));
        }
        Ok(gather_blocks(comm, &partition, local)?)
    }
}

#[cfg(test)]
mod test {
    use super::Polarization;
    use crate::{
        matrices::is_hermitian,
        occupations::Smearing,
        parallel::{LocalWorld, SerialCommunicator},
        susceptibility::Susceptibility,
        ResponseSettings,
    };
    use approx::assert_relative_eq;
    use ndarray::{s, Array3, Axis};
    use num_complex::Complex64;
    use phrenorm_mesh::{full_mesh, MeshShift};

    #[test]
    fn polarization_is_hermitian() {
        let (nk, nbnd) = (6, 3);
        let energies = utilities::random_dispersion(nk, nbnd, 11);
        let transform = utilities::random_transform(nk, nbnd, 12);
        let settings = ResponseSettings::new(0.1, Smearing::FermiDirac);
        let polarization =
            Polarization::new(energies.view(), transform.view(), &settings, None).unwrap();

        for &(q1, q2) in [(0, 0), (1, 4), (3, 3)].iter() {
            let pi = polarization.evaluate_shift(MeshShift::new(q1, q2, nk));
            assert!(is_hermitian(pi.view(), 1e-13));
        }
    }

    #[test]
    fn a_single_band_reproduces_the_susceptibility() {
        let nk = 8;
        let energies = utilities::random_dispersion(nk, 1, 5);
        let transform = utilities::identity_transform(nk, 1);
        let settings = ResponseSettings::new(0.1, Smearing::FermiDirac);
        let polarization =
            Polarization::new(energies.view(), transform.view(), &settings, None).unwrap();
        let chi = Susceptibility::with_default_regulator(
            energies.index_axis(Axis(2), 0),
            &settings,
        )
        .unwrap();

        for &(q1, q2) in [(0, 0), (2, 1), (4, 4)].iter() {
            let shift = MeshShift::new(q1, q2, nk);
            let pi = polarization.evaluate_shift(shift);
            assert_relative_eq!(pi[[0, 0]].re, chi.evaluate_shift(shift), max_relative = 1e-8);
            assert_eq!(pi[[0, 0]].im, 0.0);
        }
    }

    #[test]
    fn single_band_inputs_gain_a_band_axis() {
        let nk = 6;
        let energies = utilities::random_dispersion(nk, 1, 7);
        let transform = utilities::random_transform(nk, 2, 8);
        let weights = transform.slice(s![.., .., .., 0]);
        let subspace = Array3::from_shape_fn((nk, nk, 1), |(k1, _, _)| k1 % 2 == 0);
        let settings = ResponseSettings::new(0.1, Smearing::Gauss);

        let single = Polarization::single_band(
            energies.index_axis(Axis(2), 0),
            weights,
            &settings,
            Some(subspace.index_axis(Axis(2), 0)),
        )
        .unwrap();
        let explicit = Polarization::new(
            energies.view(),
            transform.slice(s![.., .., .., ..1]),
            &settings,
            Some(subspace.view()),
        )
        .unwrap();
        assert_eq!(single.norb(), 2);
        let shift = MeshShift::new(1, 4, nk);
        let (single, explicit) = (single.evaluate_shift(shift), explicit.evaluate_shift(shift));
        for (a, b) in single.iter().zip(explicit.iter()) {
            assert!((a - b).norm() < 1e-12 * (1.0 + b.norm()));
        }
    }

    #[test]
    fn constrained_rpa_removes_only_transitions_inside_the_subspace() {
        let (nk, nbnd) = (6, 3);
        let energies = utilities::random_dispersion(nk, nbnd, 21);
        let transform = utilities::identity_transform(nk, nbnd);
        let settings = ResponseSettings::new(0.15, Smearing::FermiDirac);
        let mut subspace = Array3::from_elem((nk, nk, nbnd), false);
        subspace.slice_mut(s![.., .., 0]).fill(true);

        let full = Polarization::new(energies.view(), transform.view(), &settings, None).unwrap();
        let constrained = Polarization::new(
            energies.view(),
            transform.view(),
            &settings,
            Some(subspace.view()),
        )
        .unwrap();

        let shift = MeshShift::new(2, 3, nk);
        let pi_full = full.evaluate_shift(shift);
        let pi_constrained = constrained.evaluate_shift(shift);
        // With an identity transform the diagonal holds the intraband bubble of each band
        assert_eq!(pi_constrained[[0, 0]], Complex64::new(0.0, 0.0));
        for a in 1..nbnd {
            assert_relative_eq!(
                pi_constrained[[a, a]].re,
                pi_full[[a, a]].re,
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn constrained_rpa_subtracts_the_subspace_bubble() {
        let (nk, nbnd) = (5, 3);
        let energies = utilities::random_dispersion(nk, nbnd, 31);
        let transform = utilities::random_transform(nk, nbnd, 32);
        let settings = ResponseSettings::new(0.2, Smearing::Gauss);
        let mut subspace = Array3::from_elem((nk, nk, nbnd), false);
        subspace.slice_mut(s![.., .., ..2]).fill(true);

        let full = Polarization::new(energies.view(), transform.view(), &settings, None).unwrap();
        let inside = Polarization::new(
            energies.slice(s![.., .., ..2]),
            transform.slice(s![.., .., .., ..2]),
            &settings,
            None,
        )
        .unwrap();
        let constrained = Polarization::new(
            energies.view(),
            transform.view(),
            &settings,
            Some(subspace.view()),
        )
        .unwrap();

        let shift = MeshShift::new(1, 3, nk);
        let expected = full.evaluate_shift(shift) - inside.evaluate_shift(shift);
        let found = constrained.evaluate_shift(shift);
        for (found, expected) in found.iter().zip(expected.iter()) {
            assert!((found - expected).norm() < 1e-12);
        }
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let nk = 4;
        let energies = utilities::random_dispersion(nk, 2, 1);
        let settings = ResponseSettings::default();

        let transform = utilities::random_transform(nk, 3, 2);
        assert!(Polarization::new(energies.view(), transform.view(), &settings, None).is_err());

        let transform = utilities::identity_transform(nk, 2);
        let subspace = Array3::from_elem((nk, nk, 3), true);
        assert!(Polarization::new(
            energies.view(),
            transform.view(),
            &settings,
            Some(subspace.view())
        )
        .is_err());
    }

    #[test]
    fn distributed_evaluation_matches_serial() {
        let (nk, nbnd) = (4, 2);
        let energies = utilities::random_dispersion(nk, nbnd, 41);
        let transform = utilities::random_transform(nk, nbnd, 42);
        let settings = ResponseSettings::new(0.1, Smearing::FermiDirac);
        let polarization =
            Polarization::new(energies.view(), transform.view(), &settings, None).unwrap();
        let q = full_mesh(nk);

        let serial = polarization.evaluate_many(&SerialCommunicator, &q).unwrap();
        let world = LocalWorld::new(3).unwrap();
        for result in world.run(|comm| polarization.evaluate_many(comm, &q)).unwrap() {
            assert_eq!(result, serial);
        }
    }
}
