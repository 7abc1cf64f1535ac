// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Constants
//!
//! Defines physical constants and the defaults shared by the response functions

pub(crate) const BOLTZMANN: f64 = 8.61733e-5; // The Boltzmann constant in eV / K

pub(crate) const DEFAULT_TEMPERATURE: f64 = 0.025; // Smearing temperature kT in eV
pub(crate) const DEFAULT_TOLERANCE: f64 = 1e-15; // Smallest energy difference treated as non-degenerate
pub(crate) const DEFAULT_TRIANGLE_TOLERANCE: f64 = 1e-14;
pub(crate) const DEFAULT_ETA: f64 = 1e-10; // Imaginary regulator of the direct susceptibility
pub(crate) const DEFAULT_MEMORY_LIMIT: f64 = 4.0; // Budget of the Matsubara Green's functions in GB

/// Largest argument for which `exp` is finite in double precision, roughly `ln(f64::MAX / 2 - 1)`
pub(crate) const MAXIMUM_EXPONENT: f64 = 709.0;
