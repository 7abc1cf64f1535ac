// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Error
//! The error type for the binary

use crate::{parallel::ParallelError, ResponseError};
use miette::Diagnostic;
use phrenorm_mesh::MeshError;

#[derive(thiserror::Error, Debug, Diagnostic)]
pub(crate) enum AppError {
    #[error(transparent)]
    #[diagnostic(code(phrenorm::io_error))]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    #[diagnostic(code(phrenorm::config_error))]
    Config(#[from] config::ConfigError),
    #[error("Failed to install the tracing subscriber: {0}")]
    #[diagnostic(code(phrenorm::telemetry))]
    Telemetry(String),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Parallel(#[from] ParallelError),
    #[error(transparent)]
    Response(#[from] ResponseError),
}
