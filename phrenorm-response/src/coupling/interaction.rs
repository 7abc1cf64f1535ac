// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::{error::check_extent, ResponseError};
use ndarray::{s, Array3, Array4, Array5, ArrayD, ArrayView3, Axis, Ix3, Ix5};
use num_complex::Complex64;

/// The screened Coulomb interaction in the orbital basis
#[derive(Clone, Debug)]
pub enum Interaction {
    /// A density-density interaction `W[q, a, c]`
    DensityDensity(Array3<Complex64>),
    /// A general interaction `W[q, a, b, c, d]`
    General(Array5<Complex64>),
}

/// The two index structures of the interaction and of the bubble contracted with it
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContractionKind {
    /// Only the orbital diagonal enters
    DensityDensity,
    /// All pairs of orbitals enter
    General,
}

/// The joined bubble `Pi_g`
#[derive(Clone, Debug, PartialEq)]
pub enum CouplingBubble {
    /// `Pi_g[q, mode, c]`
    DensityDensity(Array3<Complex64>),
    /// `Pi_g[q, mode, c, d]`
    General(Array4<Complex64>),
}

impl Interaction {
    /// Classify an interaction of unknown rank
    ///
    /// Rank three is a density-density interaction, rank five a general one, and every other rank
    /// is rejected.
    pub fn from_dyn(interaction: ArrayD<Complex64>) -> Result<Self, ResponseError> {
        match interaction.ndim() {
            3 => Ok(Self::DensityDensity(
                interaction
                    .into_dimensionality::<Ix3>()
                    .map_err(|e| ResponseError::Shape(e.to_string()))?,
            )),
            5 => Ok(Self::General(
                interaction
                    .into_dimensionality::<Ix5>()
                    .map_err(|e| ResponseError::Shape(e.to_string()))?,
            )),
            rank => Err(ResponseError::Shape(format!(
                "interaction: expected rank 3 or 5, found rank {rank}"
            ))),
        }
    }

    /// The index structure of the interaction
    pub fn kind(&self) -> ContractionKind {
        match self {
            Self::DensityDensity(_) => ContractionKind::DensityDensity,
            Self::General(_) => ContractionKind::General,
        }
    }

    /// Number of q-points
    pub fn nq(&self) -> usize {
        match self {
            Self::DensityDensity(w) => w.len_of(Axis(0)),
            Self::General(w) => w.len_of(Axis(0)),
        }
    }

    pub(crate) fn check(&self, nq: usize, norb: usize) -> Result<(), ResponseError> {
        check_extent("interaction", "q", self.nq(), nq)?;
        let shape = match self {
            Self::DensityDensity(w) => w.shape(),
            Self::General(w) => w.shape(),
        };
        for (axis, &extent) in shape.iter().enumerate().skip(1) {
            check_extent("interaction", &format!("orbital {axis}"), extent, norb)?;
        }
        Ok(())
    }

    /// The vertex `V[mode, a, b] = sum_{cd} W[q, a, b, c, d] Pi_g[mode, c, d]` at q-point `iq`
    ///
    /// For a density-density interaction only the diagonals `V[mode, a, a]` and `Pi_g[mode, c, c]`
    /// take part.
    pub(crate) fn screen(&self, iq: usize, bubble: ArrayView3<'_, Complex64>) -> Array3<Complex64> {
        let (nmodes, norb, _) = bubble.dim();
        let mut vertex = Array3::zeros((nmodes, norb, norb));
        match self {
            Self::DensityDensity(w) => {
                let w = w.index_axis(Axis(0), iq);
                for (mode, mut vertex) in vertex.outer_iter_mut().enumerate() {
                    let diagonal = bubble.slice(s![mode, .., ..]).into_diag();
                    vertex.diag_mut().assign(&w.dot(&diagonal));
                }
            }
            Self::General(w) => {
                let w = w.index_axis(Axis(0), iq);
                for (mode, mut vertex) in vertex.outer_iter_mut().enumerate() {
                    let bubble = bubble.slice(s![mode, .., ..]);
                    for ((a, b), value) in vertex.indexed_iter_mut() {
                        *value = (&w.slice(s![a, b, .., ..]) * &bubble).sum();
                    }
                }
            }
        }
        vertex
    }
}

impl CouplingBubble {
    /// Reduce the full bubbles `[q, mode, c, d]` to the requested index structure
    pub(crate) fn from_full(full: Array4<Complex64>, kind: ContractionKind) -> Self {
        match kind {
            ContractionKind::General => Self::General(full),
            ContractionKind::DensityDensity => {
                let (nq, nmodes, norb, _) = full.dim();
                Self::DensityDensity(Array3::from_shape_fn((nq, nmodes, norb), |(iq, x, c)| {
                    full[[iq, x, c, c]]
                }))
            }
        }
    }

    /// The index structure of the bubble
    pub fn kind(&self) -> ContractionKind {
        match self {
            Self::DensityDensity(_) => ContractionKind::DensityDensity,
            Self::General(_) => ContractionKind::General,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ContractionKind, Interaction};
    use ndarray::{Array3, ArrayD, IxDyn};
    use num_complex::Complex64;

    #[test]
    fn rank_selects_the_interaction() {
        let dd = Interaction::from_dyn(ArrayD::zeros(IxDyn(&[2, 3, 3]))).unwrap();
        assert_eq!(dd.kind(), ContractionKind::DensityDensity);
        assert_eq!(dd.nq(), 2);

        let general = Interaction::from_dyn(ArrayD::zeros(IxDyn(&[2, 3, 3, 3, 3]))).unwrap();
        assert_eq!(general.kind(), ContractionKind::General);

        assert!(Interaction::from_dyn(ArrayD::zeros(IxDyn(&[2, 3, 3, 3]))).is_err());
    }

    #[test]
    fn orbital_extents_are_validated() {
        let interaction = Interaction::DensityDensity(Array3::zeros((2, 3, 2)));
        assert!(interaction.check(2, 3).is_err());
        assert!(interaction.check(3, 2).is_err());
        let interaction = Interaction::DensityDensity(Array3::zeros((2, 3, 3)));
        assert!(interaction.check(2, 3).is_ok());
    }

    #[test]
    fn density_density_screening_matches_the_general_contraction() {
        let norb = 3;
        let w_dd = utilities::random_interaction(1, norb, 5);
        let mut w_general = ndarray::Array5::<Complex64>::zeros((1, norb, norb, norb, norb));
        for a in 0..norb {
            for c in 0..norb {
                w_general[[0, a, a, c, c]] = w_dd[[0, a, c]];
            }
        }
        let mut bubble = Array3::<Complex64>::zeros((2, norb, norb));
        for (index, value) in bubble.iter_mut().enumerate() {
            *value = Complex64::new(index as f64 * 0.1, 1.0 - index as f64 * 0.05);
        }
        // Off-diagonal bubble elements must not enter a density-density screening
        let mut diagonal_bubble = Array3::<Complex64>::zeros((2, norb, norb));
        for x in 0..2 {
            for c in 0..norb {
                diagonal_bubble[[x, c, c]] = bubble[[x, c, c]];
            }
        }

        let dd = Interaction::DensityDensity(w_dd).screen(0, bubble.view());
        let general = Interaction::General(w_general).screen(0, diagonal_bubble.view());
        for (dd, general) in dd.iter().zip(general.iter()) {
            assert!((dd - general).norm() < 1e-14);
        }
    }
}
