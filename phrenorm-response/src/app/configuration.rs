// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::{
    constants::{BOLTZMANN, DEFAULT_ETA, DEFAULT_TEMPERATURE, DEFAULT_TOLERANCE},
    matsubara::MatsubaraSettings,
    model::TightBinding,
    occupations::Smearing,
    ResponseSettings,
};
use super::error::AppError;
use config::{Config, File};
use serde::Deserialize;
use std::{env, path::Path, path::PathBuf};

#[derive(Debug, Deserialize)]
pub(crate) struct Configuration {
    pub(crate) global: GlobalConfiguration,
    pub(crate) smearing: SmearingConfiguration,
    #[serde(default)]
    pub(crate) matsubara: MatsubaraSettings,
    pub(crate) model: TightBinding,
    pub(crate) path: PathConfiguration,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GlobalConfiguration {
    /// Number of points along each axis of the Brillouin-zone mesh
    pub(crate) nk: usize,
    /// Directory receiving the results and the JSON log
    pub(crate) results: PathBuf,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SmearingConfiguration {
    /// Smearing temperature in eV
    kt: Option<f64>,
    /// Smearing temperature in K, used when `kt` is absent
    temperature: Option<f64>,
    #[serde(default = "default_tolerance")]
    eps: f64,
    #[serde(default = "default_eta")]
    pub(crate) eta: f64,
    #[serde(default)]
    occupation: Smearing,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_eta() -> f64 {
    DEFAULT_ETA
}

#[derive(Debug, Deserialize)]
pub(crate) struct PathConfiguration {
    /// Corners of the path as fractions of the reciprocal lattice vectors
    pub(crate) corners: Vec<[f64; 2]>,
    pub(crate) points_per_segment: usize,
}

impl SmearingConfiguration {
    /// The smearing temperature in eV
    pub(crate) fn kt(&self) -> f64 {
        match (self.kt, self.temperature) {
            (Some(kt), _) => kt,
            (None, Some(kelvin)) => BOLTZMANN * kelvin,
            (None, None) => DEFAULT_TEMPERATURE,
        }
    }
}

impl Configuration {
    pub(crate) fn build(user_file: Option<&Path>) -> Result<Self, AppError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            // The default settings for the calculation
            .add_source(File::with_name(".config/default"))
            // Overrides for the run mode, optional
            .add_source(File::with_name(&format!(".config/{}", run_mode)).required(false));
        if let Some(path) = user_file {
            builder = builder.add_source(File::from(path));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    pub(crate) fn response_settings(&self) -> ResponseSettings<Smearing> {
        ResponseSettings::new(self.smearing.kt(), self.smearing.occupation)
            .with_tolerance(self.smearing.eps)
    }

    /// The Matsubara settings at the smearing temperature
    pub(crate) fn matsubara_settings(&self) -> MatsubaraSettings {
        MatsubaraSettings {
            kt: self.smearing.kt(),
            ..self.matsubara.clone()
        }
    }
}
