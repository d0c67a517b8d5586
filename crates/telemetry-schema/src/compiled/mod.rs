//! Executable form of a schema.
//!
//! The [`compiler`](crate::compiler) produces a [`CompiledSchema`]: per
//! version, ordered action chains for resources, spans, metrics and logs.
//! Applying a chain rewrites telemetry in place and records how to undo
//! every mutation in a [`ChangeLog`].

pub mod actions;
pub mod attribute_set;
pub mod change_log;
pub mod otlp;
mod schema;

pub use self::attribute_set::{AttributeSet, FAST_MAP_THRESHOLD};
pub use self::change_log::{ChangeLog, Entity, Location, Origin, UndoRecord, UndoTarget};
pub use self::schema::{CompiledSchema, VersionActions};

/// Error raised while applying compiled actions.
///
/// A conflict is not retryable: the same rules fail identically on the same
/// data. Roll the [`ChangeLog`] back or discard the data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// Two attributes of one entity would share a key after renaming.
    #[error("attribute {key} conflicts")]
    Conflict { key: String },

    #[error("cannot merge into metric {metric}: {reason}")]
    IncompatibleMerge { metric: String, reason: String },
}
