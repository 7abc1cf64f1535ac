// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use super::{joined_bubble, CouplingRenormalization, Interaction};
use crate::{
    matrices::adjoint,
    occupations::Occupation,
    parallel::{gather_blocks, Communicator, Partition},
    self_energy::check_coupling,
    ResponseError,
};
use ndarray::{s, Array6, ArrayView3, ArrayView4, ArrayView6, Axis};
use num_complex::Complex64;
use phrenorm_mesh::{MeshShift, PeriodicArray, QPoint};

impl<O: Occupation> CouplingRenormalization<O> {
    /// Dress the coupling `g[q, mode, k1, k2, m, n]` given in the band basis
    ///
    /// The bubble joins only the lowest bands selected by [`Self::with_bubble_bands`], while the
    /// correction is transformed back to every band,
    ///
    /// g~[mode, k, m, n] = g[mode, k, m, n] + (U[k+q]^H V[mode] U[k])[m, n],
    ///
    /// with `V` the interaction contracted with the bubble.
    #[tracing::instrument(name = "Coupling renormalisation in the band basis", level = "info", skip_all)]
    pub fn renormalize_coupling_band<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
        energies: ArrayView3<'_, f64>,
        g: ArrayView6<'_, Complex64>,
        interaction: &Interaction,
        transform: ArrayView4<'_, Complex64>,
    ) -> Result<Array6<Complex64>, ResponseError> {
        let mesh = self.prepare(energies, &transform)?;
        let (nk, nbnd) = (mesh.nk(), mesh.nbnd());
        check_coupling("g", g.shape(), q.len(), nk, nbnd)?;
        interaction.check(q.len(), transform.len_of(Axis(2)))?;
        let bands = self.bubble_bands.unwrap_or(nbnd);
        let nmodes = g.len_of(Axis(1));
        let transform = PeriodicArray::new(transform)?;

        let partition = Partition::for_communicator(comm, q.len())?;
        let range = partition.range(comm.rank());
        let mut local = Array6::zeros((range.len(), nmodes, nk, nk, nbnd, nbnd));

        for (index, iq) in range.enumerate() {
            if self.status {
                tracing::info!("q-point {} of {}", iq + 1, q.len());
            }
            let shift = MeshShift::from_crystal(&q[iq], nk);
            let dfde = mesh.dfde_all(shift, bands)?;
            let u_kq = transform.window(shift);
            let u_k = transform.origin();

            let bubble = joined_bubble(&dfde, u_kq.view(), u_k.view(), nmodes, |mode, k1, k2| {
                g.slice(s![iq, mode, k1, k2, ..bands, ..bands]).to_owned()
            });
            let vertex = interaction.screen(iq, bubble.view());

            let mut block = local.index_axis_mut(Axis(0), index);
            block.assign(&g.index_axis(Axis(0), iq));
            for (mode, vertex) in vertex.outer_iter().enumerate() {
                for k1 in 0..nk {
                    for k2 in 0..nk {
                        let correction = adjoint(u_kq.slice(s![k1, k2, .., ..]))
                            .dot(&vertex)
                            .dot(&u_k.slice(s![k1, k2, .., ..]));
                        let mut target = block.slice_mut(s![mode, k1, k2, .., ..]);
                        target += &correction;
                    }
                }
            }
        }

        Ok(gather_blocks(comm, &partition, local)?)
    }
}
