//! Pipeline-level error taxonomy.
//!
//! Record-level problems are not errors; they are classified by the loaders
//! into [`crate::loader::DropReason`] and counted. Everything here aborts the run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source file lacks a column the field mapping requires.
    #[error("{}: required column `{column}` not found", path.display())]
    MissingColumn { path: PathBuf, column: String },

    /// A stage produced nothing a later stage could work with.
    #[error("no rows survived {0}")]
    EmptyResult(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A prediction matrix does not match the schema the model was trained on.
    #[error("feature schema mismatch: expected {expected} columns, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("numerical failure: {0}")]
    Numerical(String),
}
