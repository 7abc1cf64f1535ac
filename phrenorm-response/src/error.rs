// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Error
//! The error type for the response functions
//!
//! Every error is fatal to the calculation which raised it. Degenerate energy denominators are not
//! errors, they are resolved in place by the kernels.

use crate::parallel::ParallelError;
use miette::Diagnostic;
use phrenorm_mesh::MeshError;

#[derive(thiserror::Error, Debug, Diagnostic)]
/// General error for the construction and evaluation of response functions
pub enum ResponseError {
    /// Input arrays with inconsistent ranks or dimensions
    #[error("{0}")]
    #[diagnostic(code(phrenorm::shape))]
    Shape(String),
    /// A numerical parameter outside its valid range
    #[error("{0}")]
    #[diagnostic(code(phrenorm::parameter))]
    InvalidParameter(String),
    /// The projected footprint of the Matsubara Green's function exceeds the budget
    #[error("Memory limit ({limit} GB) exceeded: the Green's functions need {required:.3} GB")]
    #[diagnostic(
        code(phrenorm::memory_limit),
        help("reduce the number of Matsubara frequencies, the mesh, or the number of workers")
    )]
    MemoryLimit {
        /// Projected footprint in gigabytes
        required: f64,
        /// Configured budget in gigabytes
        limit: f64,
    },
    /// Failure to build a periodic mesh view
    #[error(transparent)]
    #[diagnostic(code(phrenorm::mesh))]
    Mesh(#[from] MeshError),
    /// Failure of a collective operation
    #[error(transparent)]
    #[diagnostic(code(phrenorm::parallel))]
    Parallel(#[from] ParallelError),
}

/// Fail with a `ResponseError::Shape` unless `found` has the `expected` extent
pub(crate) fn check_extent(
    name: &str,
    axis: &str,
    found: usize,
    expected: usize,
) -> Result<(), ResponseError> {
    if found == expected {
        Ok(())
    } else {
        Err(ResponseError::Shape(format!(
            "{name}: axis `{axis}` has length {found}, expected {expected}"
        )))
    }
}
