// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use super::check_coupling;
use crate::{
    occupations::Occupation,
    parallel::{gather_blocks, Communicator, Partition},
    ResponseError, ResponseSettings,
};
use ndarray::{s, Array1, Array2, Array4, ArrayView3, ArrayView6, Axis, Zip};
use phrenorm_mesh::{MeshShift, PeriodicArray, QPoint};

/// The double Fermi-surface average of `g2[q, mode, k1, k2, m, n]`
///
/// With the delta-like weight `d = delta(e / kT) / kT` each q-point accumulates
/// `av[q, mode] = sum g2 d(k + q, m) d(k, n)` and the normalisation `wg[q] = sum d(k + q, m) d(k, n)`,
/// so that `av / wg` is the average of the coupling over pairs of states on the Fermi surface.
#[tracing::instrument(name = "Double Fermi-surface average", level = "info", skip_all)]
pub fn double_fermi_surface_average<C: Communicator, O: Occupation>(
    comm: &C,
    q: &[QPoint],
    energies: ArrayView3<'_, f64>,
    g2: ArrayView6<'_, f64>,
    settings: &ResponseSettings<O>,
) -> Result<(Array2<f64>, Array1<f64>), ResponseError> {
    settings.validate()?;
    let (nk, _, nbnd) = energies.dim();
    check_coupling("g2", g2.shape(), q.len(), nk, nbnd)?;
    let nmodes = g2.len_of(Axis(1));

    let weights = -settings.derivatives(energies);
    let weights = PeriodicArray::new(weights.view())?;

    let partition = Partition::for_communicator(comm, q.len())?;
    let range = partition.range(comm.rank());
    let mut average = Array2::zeros((range.len(), nmodes));
    let mut normalisation = Array1::zeros(range.len());

    for (index, iq) in range.enumerate() {
        let shift = MeshShift::from_crystal(&q[iq], nk);
        let d_kq = weights.window(shift).insert_axis(Axis(3));
        let d_k = weights.origin().insert_axis(Axis(2));
        let mut d2 = Array4::zeros((nk, nk, nbnd, nbnd));
        Zip::from(&mut d2)
            .and_broadcast(&d_kq)
            .and_broadcast(&d_k)
            .for_each(|d2, &d_kq, &d_k| *d2 = d_kq * d_k);

        normalisation[index] = d2.sum();
        for mode in 0..nmodes {
            average[[index, mode]] = (&g2.slice(s![iq, mode, .., .., .., ..]) * &d2).sum();
        }
    }

    Ok((
        gather_blocks(comm, &partition, average)?,
        gather_blocks(comm, &partition, normalisation)?,
    ))
}

#[cfg(test)]
mod test {
    use super::double_fermi_surface_average;
    use crate::{
        occupations::Smearing,
        parallel::{LocalWorld, SerialCommunicator},
        ResponseSettings,
    };
    use approx::assert_relative_eq;
    use ndarray::Array6;
    use phrenorm_mesh::{full_mesh, MeshShift};

    #[test]
    fn constant_coupling_averages_to_itself() {
        let (nk, nbnd) = (6, 2);
        let energies = utilities::random_dispersion(nk, nbnd, 51);
        let q = full_mesh(nk);
        let g2 = Array6::from_elem((q.len(), 1, nk, nk, nbnd, nbnd), 0.7);
        let settings = ResponseSettings::new(0.2, Smearing::Gauss);

        let (average, normalisation) =
            double_fermi_surface_average(&SerialCommunicator, &q, energies.view(), g2.view(), &settings)
                .unwrap();
        for (average, normalisation) in average.iter().zip(normalisation.iter()) {
            assert!(*normalisation > 0.0);
            assert_relative_eq!(average / normalisation, 0.7, max_relative = 1e-12);
        }
    }

    #[test]
    fn normalisation_is_symmetric_under_inversion_of_q() {
        let (nk, nbnd) = (5, 2);
        let energies = utilities::random_dispersion(nk, nbnd, 52);
        let q = full_mesh(nk);
        let g2 = Array6::zeros((q.len(), 1, nk, nk, nbnd, nbnd));
        let settings = ResponseSettings::new(0.1, Smearing::FermiDirac);
        let (_, normalisation) =
            double_fermi_surface_average(&SerialCommunicator, &q, energies.view(), g2.view(), &settings)
                .unwrap();

        let index = |shift: MeshShift| shift.q1() * nk + shift.q2();
        for i in 0..nk as i64 {
            for j in 0..nk as i64 {
                let forward = MeshShift::new(i, j, nk);
                let backward = MeshShift::new(-i, -j, nk);
                assert_relative_eq!(
                    normalisation[index(forward)],
                    normalisation[index(backward)],
                    max_relative = 1e-12
                );
            }
        }
    }

    #[test]
    fn distributed_evaluation_matches_serial() {
        let (nk, nbnd) = (4, 2);
        let energies = utilities::random_dispersion(nk, nbnd, 53);
        let q = full_mesh(nk);
        let g2 = utilities::random_squared_coupling(q.len(), 3, nk, nbnd, 54);
        let settings = ResponseSettings::new(0.1, Smearing::FermiDirac);

        let serial =
            double_fermi_surface_average(&SerialCommunicator, &q, energies.view(), g2.view(), &settings)
                .unwrap();
        let world = LocalWorld::new(3).unwrap();
        let results = world
            .run(|comm| double_fermi_surface_average(comm, &q, energies.view(), g2.view(), &settings))
            .unwrap();
        for result in results {
            assert_eq!(result, serial);
        }
    }
}
