// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Triangle
//!
//! The diagram with three electron-phonon vertices at `q`, `q'` and `q - q'`,
//!
//! chi(q, q') = 1 / N sum_{k a b c} f[e_a, e_b, e_c] conj(g_q[k, b, a]) g_q'[k, c, a] g_{q-q'}[k + q', b, c],
//!
//! where `e_a` belongs to band `a` at `k`, `e_b` to band `b` at `k + q` and `e_c` to band `c` at
//! `k + q'`. The kernel `f[e_a, e_b, e_c]` is the second divided difference of the occupations,
//!
//! f[e_a, e_b, e_c] = (e_a (f_b - f_c) + e_b (f_c - f_a) + e_c (f_a - f_b))
//!     / ((e_b - e_c) (e_c - e_a) (e_a - e_b)).
//!
//! Where energies coincide to within `eps` the quotient is replaced by its limit. Each point falls
//! into exactly one [`TriangleRegime`], tested in the order in which the variants are declared.

use crate::{
    constants::DEFAULT_TRIANGLE_TOLERANCE,
    error::check_extent,
    occupations::Occupation,
    ResponseError, ResponseSettings,
};
use ndarray::{Array3, ArrayView3, ArrayView4, Ix3};
use num_complex::Complex64;
use phrenorm_mesh::{MeshShift, PeriodicArray, QPoint};
use rayon::prelude::*;

/// The degeneracy of the three energies at one point of the mesh
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriangleRegime {
    /// All three differences exceed the tolerance
    Distinct,
    /// Only `e_b` and `e_c` coincide
    PairBC,
    /// Only `e_c` and `e_a` coincide
    PairCA,
    /// Only `e_a` and `e_b` coincide
    PairAB,
    /// Every other case, including two coincident pairs under a non-transitive tolerance
    Degenerate,
}

impl TriangleRegime {
    /// Classify the differences `(e_b - e_c, e_c - e_a, e_a - e_b)`
    pub fn classify(differences: [f64; 3], eps: f64) -> Self {
        let [la, lb, lc] = differences.map(|de| de.abs() > eps);
        match (la, lb, lc) {
            (true, true, true) => Self::Distinct,
            (false, true, true) => Self::PairBC,
            (true, false, true) => Self::PairCA,
            (true, true, false) => Self::PairAB,
            _ => Self::Degenerate,
        }
    }
}

/// The three states joined by the triangle at one point of the mesh
#[derive(Copy, Clone, Debug)]
pub struct TrianglePoint {
    energy: [f64; 3],
    occupation: [f64; 3],
    weight: [f64; 3],
    curvature: f64,
}

impl TrianglePoint {
    /// The states with energies `[e_a, e_b, e_c]`
    pub fn new<O: Occupation>(energy: [f64; 3], settings: &ResponseSettings<O>) -> Self {
        let kt = settings.kt;
        Self {
            energy,
            occupation: energy.map(|e| settings.occupation.step(e / kt)),
            weight: energy.map(|e| settings.occupation.delta(e / kt) / kt),
            curvature: curvature(&settings.occupation, energy[0], kt),
        }
    }

    /// The pairwise differences `(e_b - e_c, e_c - e_a, e_a - e_b)`
    fn differences(&self) -> [f64; 3] {
        let [ea, eb, ec] = self.energy;
        [eb - ec, ec - ea, ea - eb]
    }

    /// The degeneracy regime at tolerance `eps`
    pub fn regime(&self, eps: f64) -> TriangleRegime {
        TriangleRegime::classify(self.differences(), eps)
    }

    /// The second divided difference `f[e_a, e_b, e_c]`
    pub fn value(&self, eps: f64) -> f64 {
        let [ea, eb, ec] = self.energy;
        let [fa, fb, fc] = self.occupation;
        let [da, db, dc] = self.weight;
        let [dea, deb, dec] = self.differences();
        let (dfa, dfb, dfc) = (fb - fc, fc - fa, fa - fb);

        match TriangleRegime::classify([dea, deb, dec], eps) {
            TriangleRegime::Distinct => (ea * dfa + eb * dfb + ec * dfc) / (dea * deb * dec),
            TriangleRegime::PairBC => (db + dfc / dec) / dec,
            TriangleRegime::PairCA => (dc + dfa / dea) / dea,
            TriangleRegime::PairAB => (da + dfb / deb) / deb,
            TriangleRegime::Degenerate => self.curvature,
        }
    }
}

/// Half the second derivative of the occupations, `-delta'(e / kT) / (2 kT^2)`
fn curvature<O: Occupation>(occupation: &O, energy: f64, kt: f64) -> f64 {
    -occupation.delta_prime(energy / kt) / (2.0 * kt * kt)
}

impl<O: Occupation> ResponseSettings<O> {
    /// Settings with the degeneracy tolerance of the triangle diagram
    pub fn for_triangle(kt: f64, occupation: O) -> Self {
        Self::new(kt, occupation).with_tolerance(DEFAULT_TRIANGLE_TOLERANCE)
    }
}

/// Occupations, weights and curvatures of every state on the mesh
struct StateTables {
    energy: PeriodicArray<f64, Ix3>,
    occupation: PeriodicArray<f64, Ix3>,
    weight: PeriodicArray<f64, Ix3>,
    curvature: Array3<f64>,
}

impl StateTables {
    fn new<O: Occupation>(
        energies: ArrayView3<'_, f64>,
        settings: &ResponseSettings<O>,
    ) -> Result<Self, ResponseError> {
        let kt = settings.kt;
        let occupation = settings.occupations(energies);
        let weight = -settings.derivatives(energies);
        let curvature = energies.mapv(|e| curvature(&settings.occupation, e, kt));
        Ok(Self {
            energy: PeriodicArray::new(energies)?,
            occupation: PeriodicArray::new(occupation.view())?,
            weight: PeriodicArray::new(weight.view())?,
            curvature,
        })
    }

    /// Energies, occupations and weights at `k + shift`
    fn window(
        &self,
        shift: MeshShift,
    ) -> (ArrayView3<'_, f64>, ArrayView3<'_, f64>, ArrayView3<'_, f64>) {
        (
            self.energy.window(shift),
            self.occupation.window(shift),
            self.weight.window(shift),
        )
    }
}

/// The triangle diagram for the couplings `g1` at `q`, `g2` at `q'` and `g3` at `q - q'`
///
/// The third momentum transfer is not an argument: it is implied as `q - q'`, the value which
/// closes the loop of the three vertices.
///
/// Each coupling has the shape `[k1, k2, m, n]` with the first band index at the outgoing state,
/// so `g3` is read at `k + q'`.
#[tracing::instrument(name = "Triangle diagram", level = "info", skip_all)]
pub fn triangle<O: Occupation>(
    q: &QPoint,
    q_prime: &QPoint,
    energies: ArrayView3<'_, f64>,
    g1: ArrayView4<'_, Complex64>,
    g2: ArrayView4<'_, Complex64>,
    g3: ArrayView4<'_, Complex64>,
    settings: &ResponseSettings<O>,
) -> Result<Complex64, ResponseError> {
    settings.validate()?;
    let (nk, _, nbnd) = energies.dim();
    for (name, (n1, n2, m, n)) in [("g1", g1.dim()), ("g2", g2.dim()), ("g3", g3.dim())] {
        check_extent(name, "k1", n1, nk)?;
        check_extent(name, "k2", n2, nk)?;
        check_extent(name, "m", m, nbnd)?;
        check_extent(name, "n", n, nbnd)?;
    }

    let tables = StateTables::new(energies, settings)?;
    let g3 = PeriodicArray::new(g3)?;
    let shift = MeshShift::from_crystal(q, nk);
    let shift_prime = MeshShift::from_crystal(q_prime, nk);
    let g3 = g3.window(shift_prime);
    let eps = settings.eps;

    let (e_k, f_k, d_k) = tables.window(MeshShift::zero());
    let (e_kq, f_kq, d_kq) = tables.window(shift);
    let (e_kqp, f_kqp, d_kqp) = tables.window(shift_prime);
    let curvature = tables.curvature.view();

    let terms = (0..nbnd * nbnd * nbnd)
        .into_par_iter()
        .map(|index| {
            let (a, b, c) = (index / (nbnd * nbnd), (index / nbnd) % nbnd, index % nbnd);
            let mut sum = Complex64::new(0.0, 0.0);
            for k1 in 0..nk {
                for k2 in 0..nk {
                    let (ka, kb, kc) = ([k1, k2, a], [k1, k2, b], [k1, k2, c]);
                    let point = TrianglePoint {
                        energy: [e_k[ka], e_kq[kb], e_kqp[kc]],
                        occupation: [f_k[ka], f_kq[kb], f_kqp[kc]],
                        weight: [d_k[ka], d_kq[kb], d_kqp[kc]],
                        curvature: curvature[ka],
                    };
                    sum += point.value(eps)
                        * g1[[k1, k2, b, a]].conj()
                        * g2[[k1, k2, c, a]]
                        * g3[[k1, k2, b, c]];
                }
            }
            sum
        })
        .collect::<Vec<_>>();

    Ok(terms.into_iter().sum::<Complex64>() / (nk * nk) as f64)
}
