//! Error types for the telemetry schema crate.

use std::io;

use crate::compiled::ConversionError;
use crate::compiler::CompileError;

/// Errors that can occur while loading, compiling or applying a schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The schema file is not valid YAML or does not match the schema shape.
    #[error("YAML decode error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The schema could not be compiled.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    /// A conversion failed.
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),
}
