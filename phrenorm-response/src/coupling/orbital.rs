// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use super::{
    joined_bubble, ContractionKind, CouplingBubble, CouplingRenormalization, Interaction,
};
use crate::{
    matrices::adjoint,
    occupations::Occupation,
    parallel::{gather_blocks, Communicator, Partition},
    self_energy::check_coupling,
    ResponseError,
};
use ndarray::{s, Array4, Array6, ArrayView3, ArrayView4, ArrayView6, Axis};
use num_complex::Complex64;
use phrenorm_mesh::{MeshShift, PeriodicArray, QPoint};

impl<O: Occupation> CouplingRenormalization<O> {
    /// The joined bubble `Pi_g` of the coupling `g[q, mode, k1, k2, a, b]` given in the orbital basis
    ///
    /// The coupling is rotated into the band basis at each point of the mesh, weighted with the
    /// divided differences of all bands and rotated back.
    pub fn pi_g<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
        energies: ArrayView3<'_, f64>,
        g: ArrayView6<'_, Complex64>,
        transform: ArrayView4<'_, Complex64>,
        kind: ContractionKind,
    ) -> Result<CouplingBubble, ResponseError> {
        let bubble = self.orbital_bubble(comm, q, energies, g, transform)?;
        Ok(CouplingBubble::from_full(bubble, kind))
    }

    /// Dress the coupling `g[q, mode, k1, k2, a, b]` given in the orbital basis
    ///
    /// The correction `V[q, mode, a, b]` does not depend on `k`. A density-density interaction
    /// only shifts the orbital diagonal, a general interaction the full block.
    #[tracing::instrument(name = "Coupling renormalisation in the orbital basis", level = "info", skip_all)]
    pub fn renormalize_coupling_orbital<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
        energies: ArrayView3<'_, f64>,
        g: ArrayView6<'_, Complex64>,
        interaction: &Interaction,
        transform: ArrayView4<'_, Complex64>,
    ) -> Result<Array6<Complex64>, ResponseError> {
        interaction.check(q.len(), transform.len_of(Axis(2)))?;
        let bubble = self.orbital_bubble(comm, q, energies, g, transform)?;

        let mut dressed = g.to_owned();
        for (iq, bubble) in bubble.outer_iter().enumerate() {
            let vertex = interaction.screen(iq, bubble);
            for (mode, vertex) in vertex.outer_iter().enumerate() {
                let mut block = dressed.slice_mut(s![iq, mode, .., .., .., ..]);
                block += &vertex;
            }
        }
        Ok(dressed)
    }

    /// The full bubble `[q, mode, c, d]` gathered on every worker
    fn orbital_bubble<C: Communicator>(
        &self,
        comm: &C,
        q: &[QPoint],
        energies: ArrayView3<'_, f64>,
        g: ArrayView6<'_, Complex64>,
        transform: ArrayView4<'_, Complex64>,
    ) -> Result<Array4<Complex64>, ResponseError> {
        let mesh = self.prepare(energies, &transform)?;
        let (nk, nbnd) = (mesh.nk(), mesh.nbnd());
        let norb = transform.len_of(Axis(2));
        check_coupling("g", g.shape(), q.len(), nk, norb)?;
        let nmodes = g.len_of(Axis(1));
        let transform = PeriodicArray::new(transform)?;

        let partition = Partition::for_communicator(comm, q.len())?;
        let range = partition.range(comm.rank());
        let mut local = Array4::zeros((range.len(), nmodes, norb, norb));

        for (index, iq) in range.enumerate() {
            if self.status {
                tracing::info!("q-point {} of {}", iq + 1, q.len());
            }
            let shift = MeshShift::from_crystal(&q[iq], nk);
            let dfde = mesh.dfde_all(shift, nbnd)?;
            let u_kq = transform.window(shift);
            let u_k = transform.origin();

            let bubble = joined_bubble(&dfde, u_kq.view(), u_k.view(), nmodes, |mode, k1, k2| {
                adjoint(u_kq.slice(s![k1, k2, .., ..]))
                    .dot(&g.slice(s![iq, mode, k1, k2, .., ..]))
                    .dot(&u_k.slice(s![k1, k2, .., ..]))
            });
            local.index_axis_mut(Axis(0), index).assign(&bubble);
        }

        Ok(gather_blocks(comm, &partition, local)?)
    }
}
