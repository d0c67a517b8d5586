//! Telemetry Schema - versioned translation of OTLP data.
//!
//! This crate reads OpenTelemetry schema files and upgrades telemetry
//! produced against an older semantic-conventions version to the latest one:
//! - Parses the YAML schema file format into an AST
//! - Compiles it into per-version action chains for resources, spans,
//!   metrics and logs
//! - Applies the chains in place, recording every mutation in a change log
//!   that can restore the original data
//!
//! ## Architecture
//!
//! ```text
//! schema.yaml → parser → ast::Schema → compiler → CompiledSchema
//!                                                      ↓
//!            OTLP request → Converter (per batch version) → latest version
//!                                 ↓
//!                             ChangeLog → rollback
//! ```

pub mod ast;
pub mod compiled;
pub mod compiler;
pub mod config;
pub mod converter;
pub mod error;
pub mod generator;
pub mod parser;
pub mod version;

pub use compiled::{ChangeLog, CompiledSchema, ConversionError};
pub use compiler::{compile, CompileError};
pub use config::ConverterConfig;
pub use converter::{convert_request, ConversionStats, Converter, ExportRequest, Signal};
pub use error::SchemaError;
pub use parser::{parse_file, parse_str};
pub use version::Version;
