// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! This module governs the command line application
mod calculations;
mod configuration;
mod error;
mod telemetry;

pub(crate) use configuration::Configuration;
use error::AppError;

#[cfg(feature = "mpi")]
use crate::parallel::{Communicator, MpiCommunicator, ParallelError};
#[cfg(not(feature = "mpi"))]
use crate::parallel::LocalWorld;
use clap::{ArgEnum, Parser};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct App {
    /// A configuration file overriding `.config/default.toml`
    file_path: Option<PathBuf>,
    #[clap(arg_enum, short, long, default_value = "info")]
    log_level: LogLevel,
    #[clap(arg_enum, short, long)]
    calculation: Calculation,
    /// Number of workers sharing the q-points, set by the launcher when built with MPI
    #[clap(short, long, default_value_t = 1)]
    workers: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
pub(crate) enum Calculation {
    Susceptibility,
    MatsubaraSusceptibility,
    Polarization,
    PhononSelfEnergy,
    FermiSurfaceAverage,
}

impl std::fmt::Display for Calculation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Calculation::Susceptibility => write!(f, "susceptibility"),
            Calculation::MatsubaraSusceptibility => write!(f, "matsubara_susceptibility"),
            Calculation::Polarization => write!(f, "polarization"),
            Calculation::PhononSelfEnergy => write!(f, "phonon_self_energy"),
            Calculation::FermiSurfaceAverage => write!(f, "fermi_surface_average"),
        }
    }
}

/// Evaluate the requested response function along the configured path and write it to the
/// results directory
pub fn run() -> color_eyre::Result<()> {
    let cli = App::parse();

    let config = Configuration::build(cli.file_path.as_deref())?;
    std::fs::create_dir_all(&config.global.results).map_err(AppError::from)?;

    execute(&cli, &config)?;
    Ok(())
}

/// Runs the workers as threads of this process
#[cfg(not(feature = "mpi"))]
fn execute(cli: &App, config: &Configuration) -> Result<(), AppError> {
    let (subscriber, _guard) =
        telemetry::get_subscriber(cli.log_level, &config.global.results, "log.log");
    telemetry::init_subscriber(subscriber)?;
    announce(cli, config, cli.workers);

    let world = LocalWorld::new(cli.workers)?;
    let tables =
        world.run(|comm| calculations::run_calculation(comm, config, cli.calculation))?;
    write_table(cli, config, &calculations::on_root(tables)?)
}

/// Runs one worker per process of the MPI world, the root process writes the results
#[cfg(feature = "mpi")]
fn execute(cli: &App, config: &Configuration) -> Result<(), AppError> {
    let universe = mpi::initialize().ok_or(ParallelError::Initialisation)?;
    let comm = MpiCommunicator::new(universe.world());

    let (subscriber, guard) = telemetry::get_subscriber(
        cli.log_level,
        &config.global.results,
        &format!("log.{}.log", comm.rank()),
    );
    telemetry::init_subscriber(subscriber)?;
    if cli.workers != 1 {
        tracing::warn!("The number of workers is set by the MPI launcher, ignoring --workers");
    }
    announce(cli, config, comm.size());

    match calculations::run_calculation(&comm, config, cli.calculation) {
        Ok(table) if comm.is_root() => write_table(cli, config, &table),
        Ok(_) => Ok(()),
        Err(error) => {
            tracing::error!("Worker {} failed: {}", comm.rank(), error);
            drop(guard);
            comm.abort(1)
        }
    }
}

fn announce(cli: &App, config: &Configuration, workers: usize) {
    tracing::info!(
        "Running a {} calculation on {} workers with a {} x {} mesh",
        cli.calculation,
        workers,
        config.global.nk,
        config.global.nk
    );
}

fn write_table(
    cli: &App,
    config: &Configuration,
    table: &calculations::ResultTable,
) -> Result<(), AppError> {
    let path = config
        .global
        .results
        .join(format!("{}.dat", cli.calculation));
    table.write(&path, cli.calculation)?;
    tracing::info!("Results written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{App, Calculation, LogLevel};
    use clap::Parser;

    #[test]
    fn command_line_defaults() {
        let cli = App::try_parse_from(["phrenorm", "--calculation", "phonon-self-energy"]).unwrap();
        assert_eq!(cli.calculation, Calculation::PhononSelfEnergy);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert_eq!(cli.workers, 1);
        assert!(cli.file_path.is_none());
    }

    #[test]
    fn command_line_with_a_configuration_file() {
        let cli = App::try_parse_from([
            "phrenorm",
            "-c",
            "matsubara-susceptibility",
            "-w",
            "4",
            "--log-level",
            "debug",
            "custom.toml",
        ])
        .unwrap();
        assert_eq!(cli.calculation, Calculation::MatsubaraSusceptibility);
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.workers, 4);
        assert_eq!(cli.file_path.unwrap().to_str(), Some("custom.toml"));
        assert!(App::try_parse_from(["phrenorm", "-c", "triangle"]).is_err());
    }
}
