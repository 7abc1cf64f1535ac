// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Exclusion of an energy window around the Fermi level
//!
//! The states with `|e| < Delta` are removed from the self-energy by the smooth envelope
//!
//! Theta(e) = 2 - S((e - Delta) / kT) - S((-e - Delta) / kT),
//!
//! which multiplies each transition as `Theta(e_{k+q, m}) Theta(e_{k, n})`. In derivative mode the
//! envelope is replaced by its derivative with respect to `Delta`.

use crate::{
    constants::DEFAULT_TEMPERATURE,
    occupations::{Occupation, Smearing},
    ResponseError,
};
use ndarray::{ArrayView3, ArrayViewMut4, Axis, Ix3, Zip};
use phrenorm_mesh::{MeshShift, PeriodicArray};
use serde::Deserialize;

/// A smoothly excluded window `[-delta, delta]` around the Fermi level
#[derive(Clone, Debug, Deserialize)]
pub struct EnergyWindow {
    /// Half the width of the excluded window
    pub delta: f64,
    /// Temperature smoothening the edges of the window
    #[serde(default = "default_temperature")]
    pub kt: f64,
    /// Step function realising the edges
    #[serde(default = "default_occupation")]
    pub occupation: Smearing,
    /// Whether to evaluate the derivative of the self-energy with respect to `delta`
    #[serde(default)]
    pub derivative: bool,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_occupation() -> Smearing {
    Smearing::Gauss
}

impl EnergyWindow {
    /// A window of half width `delta` with edges of width `kt`
    pub fn new(delta: f64, kt: f64, occupation: Smearing) -> Self {
        Self {
            delta,
            kt,
            occupation,
            derivative: false,
        }
    }

    /// Evaluate the derivative with respect to the half width instead
    pub fn derivative(mut self) -> Self {
        self.derivative = true;
        self
    }

    /// The envelope `Theta(e)` of a single state
    pub fn envelope(&self, energy: f64) -> f64 {
        let (x1, x2) = self.arguments(energy);
        2.0 - self.occupation.step(x1) - self.occupation.step(x2)
    }

    /// The derivative of the envelope of a single state with respect to `delta`
    pub fn envelope_slope(&self, energy: f64) -> f64 {
        let (x1, x2) = self.arguments(energy);
        -(self.occupation.delta(x1) + self.occupation.delta(x2)) / self.kt
    }

    fn arguments(&self, energy: f64) -> (f64, f64) {
        (
            (energy - self.delta) / self.kt,
            (-energy - self.delta) / self.kt,
        )
    }

    pub(crate) fn tabulate(
        &self,
        energies: ArrayView3<'_, f64>,
    ) -> Result<WindowEnvelope, ResponseError> {
        if !(self.kt.is_finite() && self.kt > 0.0) {
            return Err(ResponseError::InvalidParameter(format!(
                "the window temperature must be positive, found {}",
                self.kt
            )));
        }
        let theta = energies.mapv(|e| self.envelope(e));
        let slope = self
            .derivative
            .then(|| PeriodicArray::new(energies.mapv(|e| self.envelope_slope(e)).view()))
            .transpose()?;
        Ok(WindowEnvelope {
            theta: PeriodicArray::new(theta.view())?,
            slope,
        })
    }
}

/// The envelope of every state on the mesh
pub(crate) struct WindowEnvelope {
    theta: PeriodicArray<f64, Ix3>,
    slope: Option<PeriodicArray<f64, Ix3>>,
}

impl WindowEnvelope {
    /// Multiply `dfde[k1, k2, m, n]` at `shift` by the envelope of its transitions
    pub(crate) fn apply(&self, shift: MeshShift, dfde: ArrayViewMut4<'_, f64>) {
        let theta_kq = self.theta.window(shift).insert_axis(Axis(3));
        let theta_k = self.theta.origin().insert_axis(Axis(2));
        match self.slope.as_ref() {
            None => Zip::from(dfde)
                .and_broadcast(&theta_kq)
                .and_broadcast(&theta_k)
                .for_each(|dfde, &theta_kq, &theta_k| *dfde *= theta_kq * theta_k),
            Some(slope) => {
                let slope_kq = slope.window(shift).insert_axis(Axis(3));
                let slope_k = slope.origin().insert_axis(Axis(2));
                Zip::from(dfde)
                    .and_broadcast(&theta_kq)
                    .and_broadcast(&slope_k)
                    .and_broadcast(&slope_kq)
                    .and_broadcast(&theta_k)
                    .for_each(|dfde, &theta_kq, &slope_k, &slope_kq, &theta_k| {
                        *dfde *= theta_kq * slope_k + slope_kq * theta_k
                    });
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::EnergyWindow;
    use crate::occupations::Smearing;
    use approx::assert_relative_eq;

    #[test]
    fn states_inside_the_window_are_removed() {
        let window = EnergyWindow::new(0.5, 0.01, Smearing::Gauss);
        assert_relative_eq!(window.envelope(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(window.envelope(0.3), 0.0, epsilon = 1e-12);
        assert_relative_eq!(window.envelope(-0.3), 0.0, epsilon = 1e-12);
        assert_relative_eq!(window.envelope(0.8), 1.0, epsilon = 1e-12);
        assert_relative_eq!(window.envelope(-0.8), 1.0, epsilon = 1e-12);
        assert_relative_eq!(window.envelope(0.5), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn slope_is_the_derivative_with_respect_to_the_width() {
        let h = 1e-6;
        for &energy in [-0.52, -0.1, 0.47, 0.55].iter() {
            let window = EnergyWindow::new(0.5, 0.03, Smearing::FermiDirac);
            let above = EnergyWindow::new(0.5 + h, 0.03, Smearing::FermiDirac);
            let below = EnergyWindow::new(0.5 - h, 0.03, Smearing::FermiDirac);
            let numerical = (above.envelope(energy) - below.envelope(energy)) / (2.0 * h);
            assert_relative_eq!(window.envelope_slope(energy), numerical, epsilon = 1e-6);
        }
    }
}
