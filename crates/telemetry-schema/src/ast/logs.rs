//! Log record section.

use serde::Deserialize;

use super::AttributeMap;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VersionOfLogs {
    pub changes: Vec<LogTranslationAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogTranslationAction {
    pub rename_attributes: Option<RenameLogAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RenameLogAttributes {
    pub attribute_map: AttributeMap,
}
