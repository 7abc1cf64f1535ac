// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use miette::Diagnostic;

#[derive(thiserror::Error, Debug, Diagnostic)]
/// Errors raised while constructing mesh-valued arrays
pub enum MeshError {
    #[error("a mesh-valued array needs at least two axes, found {0}")]
    #[diagnostic(code(phrenorm_mesh::rank))]
    Rank(usize),
    #[error("the mesh axes must be square, found {0} x {1}")]
    #[diagnostic(code(phrenorm_mesh::non_square))]
    NonSquare(usize, usize),
    #[error("the mesh must contain at least one point")]
    #[diagnostic(code(phrenorm_mesh::empty))]
    Empty,
    #[error("a q-path needs at least one corner and one point per segment")]
    #[diagnostic(code(phrenorm_mesh::path))]
    Path,
    #[error(transparent)]
    #[diagnostic(code(phrenorm_mesh::shape))]
    Shape(#[from] ndarray::ShapeError),
}
