// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Seeded random dispersions, transforms and couplings for the tests and benchmarks

use ndarray::{s, Array2, Array3, Array4, Array5, Array6, Axis};
use num_complex::Complex64;
use num_traits::Zero;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

fn random_complex(rng: &mut StdRng) -> Complex64 {
    Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
}

/// Band energies `e[k1, k2, band]` drawn uniformly from `[-1, 1)`
pub fn random_dispersion(nk: usize, nbnd: usize, seed: u64) -> Array3<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_simple_fn((nk, nk, nbnd), || rng.gen_range(-1.0..1.0))
}

/// The nearest-neighbour dispersion `-2 t (cos k1 + cos k2) - mu` of the square lattice
pub fn square_lattice_dispersion(nk: usize, t: f64, mu: f64) -> Array2<f64> {
    let step = 2.0 * PI / nk as f64;
    Array2::from_shape_fn((nk, nk), |(i, j)| {
        -2.0 * t * ((step * i as f64).cos() + (step * j as f64).cos()) - mu
    })
}

/// A random unitary matrix from the Gram-Schmidt orthonormalisation of random columns
pub fn random_unitary(n: usize, rng: &mut StdRng) -> Array2<Complex64> {
    let mut matrix = Array2::from_shape_simple_fn((n, n), || random_complex(rng));
    for j in 0..n {
        for i in 0..j {
            let previous = matrix.column(i).to_owned();
            let projection = previous
                .iter()
                .zip(matrix.column(j).iter())
                .fold(Complex64::zero(), |sum, (a, b)| sum + a.conj() * b);
            let mut column = matrix.column_mut(j);
            column.zip_mut_with(&previous, |b, a| *b -= projection * a);
        }
        let norm = matrix.column(j).iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
        matrix.column_mut(j).mapv_inplace(|z| z / norm);
    }
    matrix
}

/// Orbital transforms `U[k1, k2, orbital, band]`, unitary at every point of the mesh
pub fn random_transform(nk: usize, n: usize, seed: u64) -> Array4<Complex64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut transform = Array4::zeros((nk, nk, n, n));
    for k1 in 0..nk {
        for k2 in 0..nk {
            transform
                .slice_mut(s![k1, k2, .., ..])
                .assign(&random_unitary(n, &mut rng));
        }
    }
    transform
}

/// The identity transform at every point of the mesh
pub fn identity_transform(nk: usize, n: usize) -> Array4<Complex64> {
    Array4::from_shape_fn((nk, nk, n, n), |(_, _, a, b)| {
        if a == b {
            Complex64::new(1.0, 0.0)
        } else {
            Complex64::zero()
        }
    })
}

/// Squared couplings `g2[q, mode, k1, k2, m, n]` drawn uniformly from `[0, 1)`
pub fn random_squared_coupling(
    nq: usize,
    nmodes: usize,
    nk: usize,
    nbnd: usize,
    seed: u64,
) -> Array6<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array6::from_shape_simple_fn((nq, nmodes, nk, nk, nbnd, nbnd), || rng.gen_range(0.0..1.0))
}

/// Complex couplings `g[q, mode, k1, k2, m, n]`
pub fn random_coupling(
    nq: usize,
    nmodes: usize,
    nk: usize,
    nbnd: usize,
    seed: u64,
) -> Array6<Complex64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array6::from_shape_simple_fn((nq, nmodes, nk, nk, nbnd, nbnd), || random_complex(&mut rng))
}

/// A density-density interaction `W[q, a, c]`, Hermitian in the orbitals at every q-point
pub fn random_interaction(nq: usize, norb: usize, seed: u64) -> Array3<Complex64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut interaction = Array3::zeros((nq, norb, norb));
    for mut w in interaction.axis_iter_mut(Axis(0)) {
        let random = Array2::from_shape_simple_fn((norb, norb), || random_complex(&mut rng));
        w.assign(&(&random + &random.t().mapv(|z| z.conj())));
    }
    interaction
}

/// A general interaction `W[q, a, b, c, d]`
pub fn random_general_interaction(nq: usize, norb: usize, seed: u64) -> Array5<Complex64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array5::from_shape_simple_fn((nq, norb, norb, norb, norb), || random_complex(&mut rng))
}

#[cfg(test)]
mod test {
    use super::{random_transform, random_unitary};
    use ndarray::{s, Array2};
    use num_complex::Complex64;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn random_unitary_is_unitary() {
        let mut rng = StdRng::seed_from_u64(1);
        let u = random_unitary(4, &mut rng);
        let product = u.t().mapv(|z| z.conj()).dot(&u);
        let identity = Array2::<Complex64>::eye(4);
        for (a, b) in product.iter().zip(identity.iter()) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn transforms_are_reproducible() {
        let first = random_transform(2, 3, 7);
        let second = random_transform(2, 3, 7);
        assert_eq!(first, second);
        assert_ne!(first.slice(s![0, 0, .., ..]), first.slice(s![1, 1, .., ..]));
    }
}
