//! Executable actions compiled from schema changes.
//!
//! Actions are closed enums per telemetry kind. Each mutates the entity it is
//! handed in place and appends an undo record for every change to the
//! caller's [`ChangeLog`].

mod logs;
mod metrics;
mod resource;
mod spans;

use std::collections::HashMap;
use std::mem;

use opentelemetry_proto::tonic::common::v1::KeyValue;
use smallvec::SmallVec;
use tracing::debug;

pub use self::logs::{LogAction, LogActions};
pub use self::metrics::{
    MergeAction, MetricAction, MetricActions, MetricChain, MetricStage, SplitAction,
};
pub use self::resource::{ResourceAction, ResourceActions};
pub use self::spans::{SpanAction, SpanActions, SpanEventAction};
use super::attribute_set::AttributeSet;
use super::change_log::{ChangeLog, Location, UndoRecord, INLINE_RENAMES};
use super::ConversionError;

/// Renames attribute keys according to a fixed table.
///
/// All renames in the table apply simultaneously: `a -> b` and `b -> c` on
/// `{a, b}` yields `{b, c}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributesRenameAction {
    rules: HashMap<String, String>,
}

impl AttributesRenameAction {
    pub fn new(rules: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// The new name for `key`, if it is renamed.
    pub fn renamed(&self, key: &str) -> Option<&str> {
        self.rules.get(key).map(String::as_str)
    }

    /// Rename keys of `attributes` in place.
    ///
    /// Fails with [`ConversionError::Conflict`] when two entries would end up
    /// with the same key, whether two old keys map to one new key or a new
    /// key collides with an untouched one. Renames of the entries before the
    /// conflicting one are still written and recorded in `changes`.
    pub fn apply(
        &self,
        attributes: &mut [KeyValue],
        location: Location,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        if !attributes.iter().any(|kv| self.rules.contains_key(&kv.key)) {
            return Ok(());
        }

        let mut pending: SmallVec<[(usize, &str); INLINE_RENAMES]> = SmallVec::new();
        let mut conflict = None;
        {
            let mut claimed = AttributeSet::with_capacity(attributes.len());
            for (idx, kv) in attributes.iter().enumerate() {
                let renamed = self.rules.get(&kv.key);
                let effective = match renamed {
                    Some(new_key) => new_key.as_str(),
                    None => kv.key.as_str(),
                };
                if claimed.exists(effective) {
                    conflict = Some(effective.to_owned());
                    break;
                }
                claimed.set(effective, idx);
                if let Some(new_key) = renamed {
                    pending.push((idx, new_key.as_str()));
                }
            }
        }

        if !pending.is_empty() {
            let mut keys = SmallVec::with_capacity(pending.len());
            for (idx, new_key) in pending {
                if let Some(kv) = attributes.get_mut(idx) {
                    keys.push((idx, mem::replace(&mut kv.key, new_key.to_owned())));
                }
            }
            changes.append(UndoRecord::RenameKeys { location, keys });
        }

        match conflict {
            Some(key) => {
                debug!(key = %key, ?location, "attribute rename conflict");
                Err(ConversionError::Conflict { key })
            }
            None => Ok(()),
        }
    }
}

/// Name-indexed lookup of which actions of a chain run for an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    by_name: HashMap<String, Vec<usize>>,
    fallback: Vec<usize>,
}

impl Dispatch {
    pub fn new(by_name: HashMap<String, Vec<usize>>, fallback: Vec<usize>) -> Self {
        Self { by_name, fallback }
    }

    /// Indices, in chain order, of the actions for an entity named `name`.
    pub fn for_name(&self, name: &str) -> &[usize] {
        self.by_name
            .get(name)
            .map_or(self.fallback.as_slice(), Vec::as_slice)
    }

    pub fn fallback(&self) -> &[usize] {
        &self.fallback
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}
