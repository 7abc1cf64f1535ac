// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Mesh
//!
//! The uniform `nk x nk` Brillouin-zone mesh on which all response functions are evaluated.
//!
//! Arrays indexed by crystal momentum are replicated once into a [`PeriodicArray`], after which
//! the value at `k + q` for every `k` on the mesh is a contiguous window of the replicated buffer.
//! Arbitrary q-points in crystal coordinates are snapped to the nearest mesh point by [`MeshShift`].

mod error;
mod path;
mod periodic;
mod shift;

pub use error::MeshError;
pub use path::{full_mesh, QPath};
pub use periodic::PeriodicArray;
pub use shift::{MeshShift, QPoint};
