use opentelemetry_proto::tonic::resource::v1::Resource;

use super::AttributesRenameAction;
use crate::compiled::change_log::{ChangeLog, Entity, Location};
use crate::compiled::ConversionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAction {
    RenameAttributes(AttributesRenameAction),
}

impl ResourceAction {
    pub fn apply(
        &self,
        resource: &mut Resource,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        match self {
            Self::RenameAttributes(rename) => rename.apply(
                &mut resource.attributes,
                Location::local(Entity::Resource),
                changes,
            ),
        }
    }
}

/// Resource actions of one version, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceActions {
    actions: Vec<ResourceAction>,
}

impl ResourceActions {
    pub fn new(actions: Vec<ResourceAction>) -> Self {
        Self { actions }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn apply(
        &self,
        resource: &mut Resource,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        self.actions
            .iter()
            .try_for_each(|action| action.apply(resource, changes))
    }
}
