// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::{
    error::check_extent,
    matsubara::{MatsubaraGreensFunction, MatsubaraSettings},
    parallel::{gather_blocks, Communicator, Partition},
    ResponseError,
};
use ndarray::{s, Array2, ArrayView2, ArrayView4};
use phrenorm_mesh::{MeshShift, QPoint};

/// The phonon self-energy of a single band from explicit Matsubara Green's functions
#[derive(Clone, Debug, Default)]
pub struct MatsubaraPhononSelfEnergy {
    settings: MatsubaraSettings,
}

impl MatsubaraPhononSelfEnergy {
    /// The self-energy for the frequencies, hybridisation and memory budget in `settings`
    pub fn new(settings: MatsubaraSettings) -> Self {
        Self { settings }
    }

    /// The self-energy `Pi[q, mode]` of `energies[k1, k2]` with the squared coupling
    /// `g2[q, mode, k1, k2]`
    ///
    /// Every worker holds its own copy of the Green's functions, so the budget is checked for all
    /// of them together before anything is allocated.
    #[tracing::instrument(name = "Matsubara phonon self-energy", level = "info", skip_all)]
    pub fn calculate<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
        energies: ArrayView2<'_, f64>,
        g2: ArrayView4<'_, f64>,
    ) -> Result<Array2<f64>, ResponseError> {
        let nk = energies.nrows();
        let (nq, nmodes, n1, n2) = g2.dim();
        check_extent("g2", "q", nq, q.len())?;
        check_extent("g2", "k1", n1, nk)?;
        check_extent("g2", "k2", n2, nk)?;

        let required = self.settings.required_gb(nk, comm.size());
        tracing::info!(
            "Green's functions of {} workers need {:.3} of {} GB",
            comm.size(),
            required,
            self.settings.memory_limit_gb
        );
        let greens_function = MatsubaraGreensFunction::new(energies, &self.settings, comm.size())?;

        let nk2 = (nk * nk) as f64;
        let prefactor = 4.0 * self.settings.kt / nk2;
        let tail = self.settings.tail() / nk2;

        let partition = Partition::for_communicator(comm, q.len())?;
        let range = partition.range(comm.rank());
        let mut local = Array2::zeros((range.len(), nmodes));
        for (index, iq) in range.enumerate() {
            let shift = MeshShift::from_crystal(&q[iq], nk);
            let chi = greens_function.bubble(shift) * prefactor + tail;
            for mode in 0..nmodes {
                local[[index, mode]] = (&g2.slice(s![iq, mode, .., ..]) * &chi).sum();
            }
        }
        Ok(gather_blocks(comm, &partition, local)?)
    }
}

#[cfg(test)]
mod test {
    use super::MatsubaraPhononSelfEnergy;
    use crate::{
        matsubara::MatsubaraSettings,
        occupations::Smearing,
        parallel::{LocalWorld, SerialCommunicator},
        self_energy::PhononSelfEnergy,
        ResponseError, ResponseSettings,
    };
    use approx::assert_relative_eq;
    use ndarray::{s, Array4, Axis};
    use phrenorm_mesh::full_mesh;

    #[test]
    fn agrees_with_the_divided_difference_evaluator() {
        let nk = 6;
        let kt = 0.1;
        let energies = utilities::random_dispersion(nk, 1, 23);
        let q = full_mesh(nk);
        let g2 = utilities::random_squared_coupling(q.len(), 2, nk, 1, 24);

        let direct = PhononSelfEnergy::new(ResponseSettings::new(kt, Smearing::FermiDirac))
            .calculate(&SerialCommunicator, &q, energies.view(), Some(g2.view()))
            .unwrap();
        let matsubara =
            MatsubaraPhononSelfEnergy::new(MatsubaraSettings::new(kt).with_frequencies(4000))
                .calculate(
                    &SerialCommunicator,
                    &q,
                    energies.index_axis(Axis(2), 0),
                    g2.slice(s![.., .., .., .., 0, 0]),
                )
                .unwrap();

        for (matsubara, direct) in matsubara.iter().zip(direct.iter()) {
            assert_relative_eq!(*matsubara, *direct, max_relative = 1e-4);
        }
    }

    #[test]
    fn memory_guard_fails_before_allocation() {
        let nk = 256;
        let energies = ndarray::Array2::<f64>::zeros((nk, nk));
        let q = full_mesh(2);
        let g2 = Array4::<f64>::zeros((q.len(), 1, nk, nk));
        // 2^20 frequencies on a 512 x 512 mesh would need more than 4 TB
        let calculation = MatsubaraPhononSelfEnergy::new(
            MatsubaraSettings::new(0.1)
                .with_frequencies(1 << 20)
                .with_memory_limit(0.5),
        );
        let result = calculation.calculate(&SerialCommunicator, &q, energies.view(), g2.view());
        assert!(matches!(result, Err(ResponseError::MemoryLimit { .. })));
    }

    #[test]
    fn memory_guard_accounts_for_every_worker() {
        let nk = 4;
        let energies = utilities::random_dispersion(nk, 1, 2);
        let energies = energies.index_axis(Axis(2), 0);
        let q = full_mesh(nk);
        let g2 = Array4::<f64>::ones((q.len(), 1, nk, nk));
        // A budget for exactly two copies of the Green's functions
        let settings = MatsubaraSettings::new(0.1).with_frequencies(100);
        let limit = settings.required_gb(nk, 2);
        let calculation = MatsubaraPhononSelfEnergy::new(settings.with_memory_limit(limit));

        let world = LocalWorld::new(2).unwrap();
        assert!(world
            .run(|comm| calculation.calculate(comm, &q, energies, g2.view()))
            .is_ok());

        let world = LocalWorld::new(3).unwrap();
        let result = world.run(|comm| calculation.calculate(comm, &q, energies, g2.view()));
        assert!(matches!(result, Err(ResponseError::MemoryLimit { .. })));
    }
}
