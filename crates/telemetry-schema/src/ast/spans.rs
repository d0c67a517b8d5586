//! Span and span event sections.

use serde::Deserialize;

use super::AttributeMap;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VersionOfSpans {
    pub changes: Vec<SpanTranslationAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpanTranslationAction {
    pub rename_attributes: Option<RenameSpanAttributes>,
}

/// Rename span attributes, optionally only on the named spans.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RenameSpanAttributes {
    pub attribute_map: AttributeMap,
    /// Span names the rename is limited to. Empty means every span.
    pub apply_to_spans: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VersionOfSpanEvents {
    pub changes: Vec<SpanEventTranslationAction>,
}

/// One change to span events. Both fields may be set; the event rename runs first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpanEventTranslationAction {
    pub rename_events: Option<RenameSpanEvents>,
    pub rename_attributes: Option<RenameSpanEventAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RenameSpanEvents {
    pub name_map: AttributeMap,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RenameSpanEventAttributes {
    pub apply_to_spans: Vec<String>,
    pub apply_to_events: Vec<String>,
    pub attribute_map: AttributeMap,
}
