// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Susceptibility
//!
//! The real part of the static electronic susceptibility of a single band,
//!
//! chi(q) = 2 / N sum_k (f(e_{k+q}) - f(e_k)) / (e_{k+q} - e_k + i eta),
//!
//! with the factor of two for spin. [`Susceptibility`] evaluates the sum directly,
//! [`MatsubaraSusceptibility`] evaluates the bubble of explicit Matsubara Green's functions which
//! coincides with it for a vanishing hybridisation. The resolution in q is that of the k mesh.

use crate::{
    constants::DEFAULT_ETA,
    matsubara::{MatsubaraGreensFunction, MatsubaraSettings},
    occupations::Occupation,
    parallel::{gather_blocks, Communicator, Partition},
    ResponseError, ResponseSettings,
};
use ndarray::{Array1, ArrayView2, Ix2, Zip};
use phrenorm_mesh::{MeshShift, PeriodicArray, QPoint};

/// The direct evaluator of the static susceptibility
#[derive(Debug)]
pub struct Susceptibility {
    energies: PeriodicArray<f64, Ix2>,
    occupations: PeriodicArray<f64, Ix2>,
    fermi_weight: f64,
    eta: f64,
}

impl Susceptibility {
    /// Tabulate the occupations of `energies[k1, k2]`, with `eta` the magnitude of the
    /// infinitesimal imaginary part of the denominator
    #[tracing::instrument(name = "Susceptibility", level = "info", skip(energies, settings))]
    pub fn new<O: Occupation>(
        energies: ArrayView2<'_, f64>,
        settings: &ResponseSettings<O>,
        eta: f64,
    ) -> Result<Self, ResponseError> {
        settings.validate()?;
        if eta <= 0.0 {
            tracing::warn!("A non-positive regulator leaves degenerate transitions undefined");
        }
        let occupations = settings.occupations(energies);
        let fermi_weight = -settings.derivatives(energies).sum();
        Ok(Self {
            energies: PeriodicArray::new(energies)?,
            occupations: PeriodicArray::new(occupations.view())?,
            fermi_weight,
            eta,
        })
    }

    /// A direct evaluator with the default regulator
    pub fn with_default_regulator<O: Occupation>(
        energies: ArrayView2<'_, f64>,
        settings: &ResponseSettings<O>,
    ) -> Result<Self, ResponseError> {
        Self::new(energies, settings, DEFAULT_ETA)
    }

    /// The susceptibility at the q-point in crystal coordinates
    pub fn evaluate(&self, q: &QPoint) -> f64 {
        self.evaluate_shift(MeshShift::from_crystal(q, self.energies.nk()))
    }

    /// The susceptibility at the mesh point `shift`
    pub fn evaluate_shift(&self, shift: MeshShift) -> f64 {
        let nk = self.energies.nk();
        let prefactor = 2.0 / (nk * nk) as f64;
        if shift.is_zero() {
            return -prefactor * self.fermi_weight;
        }

        let eta2 = self.eta * self.eta;
        let mut sum = 0.0;
        Zip::from(self.energies.window(shift))
            .and(self.energies.origin())
            .and(self.occupations.window(shift))
            .and(self.occupations.origin())
            .for_each(|&e_kq, &e_k, &f_kq, &f_k| {
                let de = e_kq - e_k;
                sum += (f_kq - f_k) * de / (de * de + eta2);
            });
        prefactor * sum
    }

    /// The susceptibility at every q-point, distributed over the workers of `comm`
    pub fn evaluate_many<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
    ) -> Result<Array1<f64>, ResponseError> {
        let partition = Partition::for_communicator(comm, q.len())?;
        let local = q[partition.range(comm.rank())]
            .iter()
            .map(|q| self.evaluate(q))
            .collect::<Array1<_>>();
        Ok(gather_blocks(comm, &partition, local)?)
    }
}

/// The static susceptibility as a bubble of Matsubara Green's functions
#[derive(Debug)]
pub struct MatsubaraSusceptibility {
    greens_function: MatsubaraGreensFunction,
    prefactor: f64,
    tail: f64,
}

impl MatsubaraSusceptibility {
    /// Build the Green's functions of `energies[k1, k2]`, failing if they exceed the budget
    #[tracing::instrument(name = "Matsubara susceptibility", level = "info", skip(energies))]
    pub fn new(
        energies: ArrayView2<'_, f64>,
        settings: &MatsubaraSettings,
    ) -> Result<Self, ResponseError> {
        let greens_function = MatsubaraGreensFunction::new(energies, settings, 1)?;
        let nk = greens_function.nk();
        // Two for spin and two for the negative frequencies
        let prefactor = 4.0 * settings.kt / (nk * nk) as f64;
        Ok(Self {
            greens_function,
            prefactor,
            tail: settings.tail(),
        })
    }

    /// The susceptibility at the q-point in crystal coordinates
    pub fn evaluate(&self, q: &QPoint) -> f64 {
        self.evaluate_shift(MeshShift::from_crystal(q, self.greens_function.nk()))
    }

    /// The susceptibility at the mesh point `shift`
    pub fn evaluate_shift(&self, shift: MeshShift) -> f64 {
        self.prefactor * self.greens_function.bubble(shift).sum() + self.tail
    }

    /// The susceptibility at every q-point, distributed over the workers of `comm`
    pub fn evaluate_many<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
    ) -> Result<Array1<f64>, ResponseError> {
        let partition = Partition::for_communicator(comm, q.len())?;
        let local = q[partition.range(comm.rank())]
            .iter()
            .map(|q| self.evaluate(q))
            .collect::<Array1<_>>();
        Ok(gather_blocks(comm, &partition, local)?)
    }
}

#[cfg(test)]
mod test {
    use super::{MatsubaraSusceptibility, Susceptibility};
    use crate::{
        matsubara::MatsubaraSettings,
        occupations::Smearing,
        parallel::{LocalWorld, SerialCommunicator},
        ResponseSettings,
    };
    use approx::assert_relative_eq;
    use ndarray::{s, Axis};
    use phrenorm_mesh::{full_mesh, MeshShift, QPoint};
    use std::f64::consts::PI;

    #[test]
    fn smallest_q_approaches_the_zero_q_limit() {
        let settings = ResponseSettings::new(0.2, Smearing::FermiDirac);
        let mut differences = Vec::new();
        for &nk in [96, 192].iter() {
            let energies = utilities::square_lattice_dispersion(nk, 1.0, -0.4);
            let chi = Susceptibility::with_default_regulator(energies.view(), &settings).unwrap();
            let at_zero = chi.evaluate(&QPoint::origin());
            let nearby = chi.evaluate(&QPoint::new(2.0 * PI / nk as f64, 0.0));
            assert!(at_zero < 0.0);
            differences.push(((nearby - at_zero) / at_zero).abs());
        }
        assert!(differences[0] < 2e-2);
        assert!(differences[1] < differences[0]);
    }

    #[test]
    fn matsubara_bubble_agrees_with_the_direct_sum() {
        let nk = 12;
        let kt = 0.1;
        let energies = utilities::random_dispersion(nk, 1, 7);
        let energies = energies.index_axis(Axis(2), 0);

        let direct = Susceptibility::with_default_regulator(
            energies,
            &ResponseSettings::new(kt, Smearing::FermiDirac),
        )
        .unwrap();
        let matsubara =
            MatsubaraSusceptibility::new(energies, &MatsubaraSettings::new(kt).with_frequencies(4000))
                .unwrap();

        for &(q1, q2) in [(0, 0), (1, 0), (3, 5), (6, 6), (11, 2)].iter() {
            let shift = MeshShift::new(q1, q2, nk);
            assert_relative_eq!(
                matsubara.evaluate_shift(shift),
                direct.evaluate_shift(shift),
                max_relative = 1e-4
            );
        }
    }

    #[test]
    fn hybridisation_suppresses_the_response() {
        let nk = 8;
        let kt = 0.05;
        let energies = utilities::square_lattice_dispersion(nk, 0.5, 0.0);
        let settings = MatsubaraSettings::new(kt).with_frequencies(500);
        let bare = MatsubaraSusceptibility::new(energies.view(), &settings).unwrap();
        let dressed = MatsubaraSusceptibility::new(
            energies.view(),
            &settings.clone().with_hybridisation(1.0, 0.2),
        )
        .unwrap();
        let q = QPoint::new(PI, PI);
        assert!(dressed.evaluate(&q).abs() < bare.evaluate(&q).abs());
    }

    #[test]
    fn distributed_evaluation_matches_serial_order() {
        let nk = 8;
        let energies = utilities::random_dispersion(nk, 1, 3);
        let energies = energies.slice(s![.., .., 0]);
        let settings = ResponseSettings::new(0.1, Smearing::Gauss);
        let chi = Susceptibility::with_default_regulator(energies, &settings).unwrap();
        let q = full_mesh(nk);

        let serial = chi.evaluate_many(&SerialCommunicator, &q).unwrap();
        let world = LocalWorld::new(3).unwrap();
        for result in world.run(|comm| chi.evaluate_many(comm, &q)).unwrap() {
            assert_eq!(result, serial);
        }
        for (value, q) in serial.iter().zip(q.iter()) {
            assert_eq!(*value, chi.evaluate(q));
        }
    }
}
