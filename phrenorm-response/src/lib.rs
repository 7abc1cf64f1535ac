// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Phrenorm evaluates static linear-response functions of a periodic crystal
//!
//! # Overview
//! Phrenorm calculates many-body response quantities on a uniform `nk x nk` mesh of the Brillouin
//! zone, starting from a tight-binding or Wannier dispersion and electron-phonon matrix elements:
//! the static electronic susceptibility, the RPA and constrained-RPA polarization in an orbital
//! basis, the phonon self-energy, the RPA-dressed electron-phonon coupling and the triangle
//! diagram with three electron-phonon vertices.
//!
//! Every one of these is built around the same kernel, the divided difference
//! `(f(e_{k+q}) - f(e_k)) / (e_{k+q} - e_k)` of the occupation function. Where the two energies
//! coincide the quotient is replaced by its analytic limit, the derivative of the occupation.
//!
//! The q-points requested by the caller are split into contiguous blocks over the workers of a
//! [`parallel::Communicator`], each worker evaluates its block independently and the blocks are
//! gathered back in the caller's order.
//!
//! # Usage
//! The library is driven through the response types, for example
//!
//! ```no_run
//! use phrenorm_response::{occupations::Smearing, susceptibility::Susceptibility, ResponseSettings};
//! use phrenorm_mesh::QPoint;
//!
//! let nk = 48;
//! let energies = ndarray::Array2::from_shape_fn((nk, nk), |(i, j)| {
//!     let (k1, k2) = (i as f64, j as f64);
//!     -(2.0 * std::f64::consts::PI * k1 / nk as f64).cos() - (2.0 * std::f64::consts::PI * k2 / nk as f64).cos()
//! });
//! let settings = ResponseSettings::new(0.025, Smearing::FermiDirac);
//! let chi = Susceptibility::new(energies.view(), &settings, 1e-10).unwrap();
//! println!("{}", chi.evaluate(&QPoint::new(std::f64::consts::PI, 0.0)));
//! ```
//!
//! and the `phrenorm` binary evaluates the same quantities along a path for a model dispersion
//! defined in a `.toml` configuration.

#![warn(missing_docs)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

/// The command line application, configuration and tracing
pub mod app;

/// Physical constants
mod constants;

/// RPA-dressed electron-phonon coupling
pub mod coupling;

/// Error handling
mod error;

/// The divided-difference kernel shared by all response functions
pub mod kernel;

/// Finite-temperature Green's functions on the Matsubara axis
pub mod matsubara;

/// Model dispersions
pub mod model;

/// Smearing and occupation functions
pub mod occupations;

/// Worker partitioning and collective communication
pub mod parallel;

/// RPA and constrained-RPA polarization
pub mod polarization;

/// Phonon self-energy and Fermi-surface averages
pub mod self_energy;

/// Static electronic susceptibility
pub mod susceptibility;

/// The triangle diagram
pub mod triangle;

/// Dense matrix helpers
mod matrices;

pub use error::ResponseError;
pub use kernel::ResponseSettings;
