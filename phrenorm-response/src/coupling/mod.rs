// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Coupling
//!
//! The electron-phonon coupling dressed by the RPA-screened Coulomb interaction,
//!
//! g~ = g + conj(U_{k+q}) U_k W Pi_g,
//!
//! where `Pi_g` joins the bare coupling with the Lindhard bubble,
//!
//! Pi_g(x, c, d) = 2 / N sum_{k m n} U[k+q, c, m] conj(U[k, d, n]) dfde_{mn}(k, q) g(x, k, m, n).
//!
//! The interaction is either density-density, `W[q, a, c]`, in which case only the orbital
//! diagonal of `Pi_g` enters, or general, `W[q, a, b, c, d]`. The two shapes are told apart once,
//! when the [`Interaction`] is built.

mod band;
mod interaction;
mod orbital;

pub use interaction::{ContractionKind, CouplingBubble, Interaction};

use crate::{
    error::check_extent,
    kernel::MeshOccupations,
    matrices::adjoint,
    occupations::{Occupation, Smearing},
    ResponseError, ResponseSettings,
};
use ndarray::{s, Array2, Array3, Array4, ArrayView3, ArrayView4, Axis};
use num_complex::Complex64;
use rayon::prelude::*;

/// Renormalisation of the electron-phonon coupling
#[derive(Clone, Debug)]
pub struct CouplingRenormalization<O = Smearing> {
    settings: ResponseSettings<O>,
    bubble_bands: Option<usize>,
    status: bool,
}

impl<O: Occupation> CouplingRenormalization<O> {
    /// A renormalisation with the electronic smearing in `settings`
    pub fn new(settings: ResponseSettings<O>) -> Self {
        Self {
            settings,
            bubble_bands: None,
            status: true,
        }
    }

    /// Restrict the bubble of the band-basis renormalisation to the lowest `bands` bands
    pub fn with_bubble_bands(mut self, bands: usize) -> Self {
        self.bubble_bands = Some(bands);
        self
    }

    /// Suppress the per q-point status messages
    pub fn quiet(mut self) -> Self {
        self.status = false;
        self
    }

    fn prepare(
        &self,
        energies: ArrayView3<'_, f64>,
        transform: &ArrayView4<'_, Complex64>,
    ) -> Result<MeshOccupations, ResponseError> {
        let mesh = MeshOccupations::new(energies, &self.settings)?;
        mesh.check_mesh("transform", transform)?;
        check_extent("transform", "band", transform.len_of(Axis(3)), mesh.nbnd())?;
        Ok(mesh)
    }
}

/// The products `U[k+q] (dfde * vertex) U[k]^H` summed over the mesh, `[mode, c, d]`
///
/// `vertex(mode, k1, k2)` returns the coupling in the band basis at one point of the mesh,
/// restricted to the bands of `dfde[k1, k2, m, n]`.
fn joined_bubble<F>(
    dfde: &Array4<f64>,
    u_kq: ArrayView4<'_, Complex64>,
    u_k: ArrayView4<'_, Complex64>,
    nmodes: usize,
    vertex: F,
) -> Array3<Complex64>
where
    F: Fn(usize, usize, usize) -> Array2<Complex64> + Sync,
{
    let nk = dfde.len_of(Axis(0));
    let bands = dfde.len_of(Axis(2));
    let norb = u_k.len_of(Axis(2));
    let prefactor = Complex64::from(2.0 / (nk * nk) as f64);

    // Rows of the mesh run in parallel, each accumulating in place, and are summed in row order
    (0..nk)
        .into_par_iter()
        .map(|k1| {
            let mut row = Array3::zeros((nmodes, norb, norb));
            for k2 in 0..nk {
                let u_kq = u_kq.slice(s![k1, k2, .., ..bands]);
                let u_k_adjoint = adjoint(u_k.slice(s![k1, k2, .., ..bands]));
                let dfde = dfde.slice(s![k1, k2, .., ..]);

                for (mode, mut block) in row.outer_iter_mut().enumerate() {
                    let mut weighted = vertex(mode, k1, k2);
                    weighted.zip_mut_with(&dfde, |z, &w| *z *= w);
                    block += &u_kq.dot(&weighted).dot(&u_k_adjoint);
                }
            }
            row
        })
        .collect::<Vec<_>>()
        .into_iter()
        .fold(Array3::zeros((nmodes, norb, norb)), |total, row| total + row)
        * prefactor
}
