//! Metric section.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::AttributeMap;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VersionOfMetrics {
    pub changes: Vec<MetricTranslationAction>,
}

/// One metric change.
///
/// Several fields may be set on the same change; they compile in field
/// declaration order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricTranslationAction {
    /// Old metric name to new metric name.
    pub rename_metrics: BTreeMap<String, String>,
    pub rename_attributes: Option<AttributeMapForMetrics>,
    pub split: Option<SplitMetric>,
    pub merge: Option<MergeMetric>,
    /// Cumulative sums to convert to delta temporality.
    pub to_delta: Vec<String>,
}

/// Rename data point attributes, optionally only on the named metrics.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttributeMapForMetrics {
    /// Metric names the rename is limited to. Empty means every metric.
    pub apply_to_metrics: Vec<String>,
    #[serde(alias = "label_map")]
    pub attribute_map: AttributeMap,
}

/// Fan one metric out into several, one per value of `by_attribute`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SplitMetric {
    pub apply_to_metric: String,
    pub by_attribute: String,
    /// New metric name to the attribute value that selects it.
    pub metrics_from_attributes: BTreeMap<String, String>,
}

/// Combine several metrics into one, tagging each point with `by_attribute`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MergeMetric {
    pub create_metric: String,
    pub by_attribute: String,
    /// Source metric name to the attribute value its points receive.
    pub attributes_for_metrics: BTreeMap<String, String>,
}
