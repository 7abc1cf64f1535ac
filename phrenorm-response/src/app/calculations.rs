// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Calculations
//!
//! Delegated functions from `App` evaluating a response function along the configured path

use super::{error::AppError, Calculation, Configuration};
use crate::{
    parallel::{Communicator, ParallelError},
    polarization::Polarization,
    self_energy::{double_fermi_surface_average, PhononSelfEnergy},
    susceptibility::{MatsubaraSusceptibility, Susceptibility},
};
use itertools::Itertools;
use ndarray::{Array4, Array6, Axis};
use num_complex::Complex64;
use phrenorm_mesh::QPath;
use std::{io::Write, path::Path};

/// Columns of results sampled along the path
#[derive(Debug)]
pub(crate) struct ResultTable {
    header: Vec<&'static str>,
    columns: Vec<Vec<f64>>,
}

impl ResultTable {
    fn new(distances: Vec<f64>) -> Self {
        Self {
            header: vec!["distance"],
            columns: vec![distances],
        }
    }

    fn with_column(mut self, name: &'static str, values: impl IntoIterator<Item = f64>) -> Self {
        self.header.push(name);
        self.columns.push(values.into_iter().collect());
        self
    }

    pub(crate) fn len(&self) -> usize {
        self.columns[0].len()
    }

    /// Writes the table with a commented header as whitespace-separated columns
    pub(crate) fn write(&self, path: &Path, calculation: Calculation) -> Result<(), std::io::Error> {
        let mut file = std::fs::File::create(path)?;
        writeln!(
            file,
            "# phrenorm {} {}",
            calculation,
            chrono::Local::now().to_rfc3339()
        )?;
        writeln!(
            file,
            "# {}",
            self.header.iter().map(|name| format!("{:>18}", name)).join(" ")
        )?;
        for row in 0..self.len() {
            writeln!(
                file,
                "  {}",
                self.columns
                    .iter()
                    .map(|column| format!("{:>18.10e}", column[row]))
                    .join(" ")
            )?;
        }
        Ok(())
    }
}

/// The result on the lowest rank of a collective evaluation
#[cfg_attr(feature = "mpi", allow(dead_code))]
pub(crate) fn on_root<R>(results: Vec<R>) -> Result<R, AppError> {
    results
        .into_iter()
        .next()
        .ok_or(AppError::Parallel(ParallelError::EmptyWorld))
}

/// Evaluate `calculation` along the configured path on the worker `comm`
///
/// Every worker of the world calls this with the same configuration and receives the full table.
pub(crate) fn run_calculation<C: Communicator>(
    comm: &C,
    config: &Configuration,
    calculation: Calculation,
) -> Result<ResultTable, AppError> {
    let path =
        QPath::through_fractional_corners(&config.path.corners, config.path.points_per_segment)?;
    let q = path.points();
    let nk = config.global.nk;
    let bands = config.model.bands(nk);
    let settings = config.response_settings();
    tracing::info!(
        "{} of the {} lattice at {} q-points",
        calculation,
        config.model.lattice,
        q.len()
    );
    let table = ResultTable::new(path.distances());

    Ok(match calculation {
        Calculation::Susceptibility => {
            let chi = Susceptibility::new(
                bands.index_axis(Axis(2), 0),
                &settings,
                config.smearing.eta,
            )?;
            let chi = chi.evaluate_many(comm, q)?;
            table.with_column("chi", chi.iter().copied())
        }
        Calculation::MatsubaraSusceptibility => {
            let chi = MatsubaraSusceptibility::new(
                bands.index_axis(Axis(2), 0),
                &config.matsubara_settings(),
            )?;
            let chi = chi.evaluate_many(comm, q)?;
            table.with_column("chi", chi.iter().copied())
        }
        Calculation::Polarization => {
            let transform = Array4::from_elem((nk, nk, 1, 1), Complex64::new(1.0, 0.0));
            let pi = Polarization::new(bands.view(), transform.view(), &settings, None)?;
            let pi = pi.evaluate_many(comm, q)?;
            table
                .with_column("re_pi", pi.iter().map(|z| z.re))
                .with_column("im_pi", pi.iter().map(|z| z.im))
        }
        Calculation::PhononSelfEnergy => {
            let self_energy = PhononSelfEnergy::new(settings);
            let pi = self_energy.calculate(comm, q, bands.view(), None)?;
            table.with_column("pi", pi.iter().copied())
        }
        Calculation::FermiSurfaceAverage => {
            let g2 = Array6::from_elem((q.len(), 1, nk, nk, 1, 1), 1.0);
            let (_, weight) =
                double_fermi_surface_average(comm, q, bands.view(), g2.view(), &settings)?;
            table.with_column("weight", weight.iter().copied())
        }
    })
}
