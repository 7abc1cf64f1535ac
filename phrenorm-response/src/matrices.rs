// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;

/// The conjugate transpose of a matrix
pub(crate) fn adjoint(matrix: ArrayView2<'_, Complex64>) -> Array2<Complex64> {
    matrix.t().mapv(|z| z.conj())
}

/// Tests for hermiticity of a matrix, relative to its largest element
pub(crate) fn is_hermitian(matrix: ArrayView2<'_, Complex64>, tolerance: f64) -> bool {
    let scale = matrix.iter().map(|z| z.norm()).fold(1_f64, f64::max);
    matrix
        .iter()
        .zip(matrix.t().iter())
        .all(|(element, transposed)| (element - transposed.conj()).norm() < tolerance * scale)
}
