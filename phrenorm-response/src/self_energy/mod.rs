// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Self Energy
//!
//! The static phonon self-energy
//!
//! Pi(q, nu) = 2 / N sum_{k m n} |g(q, nu, k, m, n)|^2 dfde_{mn}(k, q)
//!
//! from the divided-difference kernel ([`PhononSelfEnergy`]) or from explicit Matsubara Green's
//! functions ([`MatsubaraPhononSelfEnergy`]), together with the double Fermi-surface average of the
//! coupling.

mod fermi_surface;
mod matsubara;
mod window;

pub use fermi_surface::double_fermi_surface_average;
pub use matsubara::MatsubaraPhononSelfEnergy;
pub use window::EnergyWindow;

use crate::{
    error::check_extent,
    kernel::MeshOccupations,
    occupations::{Occupation, Smearing},
    parallel::{gather_blocks, Communicator, Partition},
    ResponseError, ResponseSettings,
};
use ndarray::{
    s, Array2, Array6, ArrayView2, ArrayView3, ArrayView4, ArrayView6, Axis, Zip,
};
use phrenorm_mesh::{MeshShift, QPoint};

/// The phonon self-energy from the divided-difference kernel
#[derive(Clone, Debug)]
pub struct PhononSelfEnergy<O = Smearing> {
    settings: ResponseSettings<O>,
    window: Option<EnergyWindow>,
}

impl<O: Occupation> PhononSelfEnergy<O> {
    /// The self-energy for the electronic smearing in `settings`
    pub fn new(settings: ResponseSettings<O>) -> Self {
        Self {
            settings,
            window: None,
        }
    }

    /// Exclude the states of an energy window around the Fermi level
    pub fn with_window(mut self, window: EnergyWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// The self-energy `Pi[q, mode]` at every q-point, distributed over the workers of `comm`
    ///
    /// `g2[q, mode, k1, k2, m, n]` holds the squared coupling at the requested q-points. Without a
    /// coupling a single mode of unit coupling is assumed.
    #[tracing::instrument(name = "Phonon self-energy", level = "info", skip_all)]
    pub fn calculate<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
        energies: ArrayView3<'_, f64>,
        g2: Option<ArrayView6<'_, f64>>,
    ) -> Result<Array2<f64>, ResponseError> {
        let (self_energy, _) = self.evaluate(comm, q, energies, g2, false)?;
        Ok(self_energy)
    }

    /// The self-energy of a single band `energies[k1, k2]` with `g2[q, mode, k1, k2]`
    pub fn calculate_single_band<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
        energies: ArrayView2<'_, f64>,
        g2: Option<ArrayView4<'_, f64>>,
    ) -> Result<Array2<f64>, ResponseError> {
        let g2 = g2.map(|g2| g2.insert_axis(Axis(4)).insert_axis(Axis(5)));
        self.calculate(comm, q, energies.insert_axis(Axis(2)), g2)
    }

    /// The self-energy together with its unsummed integrand `2 g2 dfde`, `[q, mode, k1, k2, m, n]`
    #[tracing::instrument(name = "Phonon self-energy fluctuations", level = "info", skip_all)]
    pub fn calculate_with_fluctuations<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
        energies: ArrayView3<'_, f64>,
        g2: Option<ArrayView6<'_, f64>>,
    ) -> Result<(Array2<f64>, Array6<f64>), ResponseError> {
        let (self_energy, integrand) = self.evaluate(comm, q, energies, g2, true)?;
        let integrand = integrand.ok_or_else(|| {
            ResponseError::Shape("the integrand was not retained".into())
        })?;
        Ok((self_energy, integrand))
    }

    fn evaluate<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
        energies: ArrayView3<'_, f64>,
        g2: Option<ArrayView6<'_, f64>>,
        fluctuations: bool,
    ) -> Result<(Array2<f64>, Option<Array6<f64>>), ResponseError> {
        let mesh = MeshOccupations::new(energies, &self.settings)?;
        let (nk, nbnd) = (mesh.nk(), mesh.nbnd());
        let nmodes = match g2.as_ref() {
            Some(g2) => {
                check_coupling("g2", g2.shape(), q.len(), nk, nbnd)?;
                g2.len_of(Axis(1))
            }
            None => 1,
        };
        let window = self
            .window
            .as_ref()
            .map(|window| window.tabulate(energies))
            .transpose()?;

        let partition = Partition::for_communicator(comm, q.len())?;
        let range = partition.range(comm.rank());
        tracing::info!(
            "Worker {} evaluates {} of {} q-points",
            comm.rank(),
            range.len(),
            q.len()
        );
        let prefactor = 2.0 / (nk * nk) as f64;

        let mut local = Array2::zeros((range.len(), nmodes));
        let mut local_integrand = fluctuations
            .then(|| Array6::zeros((range.len(), nmodes, nk, nk, nbnd, nbnd)));

        for (index, iq) in range.enumerate() {
            let shift = MeshShift::from_crystal(&q[iq], nk);
            let mut dfde = mesh.dfde_all(shift, nbnd)?;
            if let Some(window) = window.as_ref() {
                window.apply(shift, dfde.view_mut());
            }

            for mode in 0..nmodes {
                let integrand = match g2.as_ref() {
                    Some(g2) => &g2.slice(s![iq, mode, .., .., .., ..]) * &dfde,
                    None => dfde.clone(),
                };
                local[[index, mode]] = prefactor * integrand.sum();
                if let Some(local_integrand) = local_integrand.as_mut() {
                    Zip::from(local_integrand.slice_mut(s![index, mode, .., .., .., ..]))
                        .and(&integrand)
                        .for_each(|out, &value| *out = 2.0 * value);
                }
            }
        }

        let self_energy = gather_blocks(comm, &partition, local)?;
        let integrand = local_integrand
            .map(|local| gather_blocks(comm, &partition, local))
            .transpose()?;
        Ok((self_energy, integrand))
    }
}

/// Validate a coupling `[q, mode, k1, k2, m, n]` against the q-points, the mesh and the bands
pub(crate) fn check_coupling(
    name: &str,
    shape: &[usize],
    nq: usize,
    nk: usize,
    nbnd: usize,
) -> Result<(), ResponseError> {
    check_extent(name, "q", shape[0], nq)?;
    check_extent(name, "k1", shape[2], nk)?;
    check_extent(name, "k2", shape[3], nk)?;
    check_extent(name, "m", shape[4], nbnd)?;
    check_extent(name, "n", shape[5], nbnd)
}
