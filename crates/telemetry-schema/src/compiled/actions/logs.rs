use opentelemetry_proto::tonic::logs::v1::LogRecord;

use super::AttributesRenameAction;
use crate::compiled::change_log::{ChangeLog, Entity, Location};
use crate::compiled::ConversionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogAction {
    RenameAttributes(AttributesRenameAction),
}

impl LogAction {
    pub fn apply(
        &self,
        index: usize,
        record: &mut LogRecord,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        match self {
            Self::RenameAttributes(rename) => rename.apply(
                &mut record.attributes,
                Location::local(Entity::LogRecord(index)),
                changes,
            ),
        }
    }
}

/// Log actions of one version, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogActions {
    actions: Vec<LogAction>,
}

impl LogActions {
    pub fn new(actions: Vec<LogAction>) -> Self {
        Self { actions }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Apply every action to each record in turn, stopping at the first failure.
    pub fn apply(
        &self,
        records: &mut [LogRecord],
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        if self.actions.is_empty() {
            return Ok(());
        }
        for (index, record) in records.iter_mut().enumerate() {
            for action in &self.actions {
                action.apply(index, record, changes)?;
            }
        }
        Ok(())
    }
}
