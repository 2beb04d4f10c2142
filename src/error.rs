//! Error types shared by the simulation library.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Failure reported by an external collaborator model (grid, renewables, price).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// The requested time index lies beyond the model's pre-computed horizon.
    #[error("time index {index} is outside the model horizon of {len} steps")]
    OutOfRange { index: usize, len: usize },

    /// A consumer the caller relies on is absent from the model output.
    #[error("consumer \"{0}\" is not part of the grid model")]
    MissingConsumer(String),

    /// The model was asked to do something its inputs cannot support.
    #[error("{0}")]
    Invalid(String),
}

/// Top-level error for building and running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// The scenario failed validation; the run never started.
    #[error("invalid configuration ({} error(s)): {}", .0.len(), join_config_errors(.0))]
    InvalidConfig(Vec<ConfigError>),

    /// A collaborator failed mid-run.
    #[error("step {step}: {model} model failed: {source}")]
    Model {
        step: usize,
        model: &'static str,
        #[source]
        source: ModelError,
    },

    /// An input data file is readable but its content is unusable.
    #[error("{path}: {message}")]
    Data { path: String, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub(crate) fn data(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self::Data {
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}

fn join_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
