//! Compiled schema and the versioned conversion engine.

use opentelemetry_proto::tonic::logs::v1::LogRecord;
use opentelemetry_proto::tonic::metrics::v1::Metric;
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::Span;
use tracing::debug;

use super::actions::{LogActions, MetricActions, ResourceActions, SpanActions};
use super::change_log::ChangeLog;
use super::ConversionError;
use crate::version::Version;

/// The actions converting data from the previous version to `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionActions {
    version: Version,
    pub(crate) resource: ResourceActions,
    pub(crate) spans: SpanActions,
    pub(crate) metrics: MetricActions,
    pub(crate) logs: LogActions,
}

impl VersionActions {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            resource: ResourceActions::default(),
            spans: SpanActions::default(),
            metrics: MetricActions::default(),
            logs: LogActions::default(),
        }
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn resource(&self) -> &ResourceActions {
        &self.resource
    }

    pub fn spans(&self) -> &SpanActions {
        &self.spans
    }

    pub fn metrics(&self) -> &MetricActions {
        &self.metrics
    }

    pub fn logs(&self) -> &LogActions {
        &self.logs
    }

    pub fn is_empty(&self) -> bool {
        self.resource.is_empty()
            && self.spans.is_empty()
            && self.metrics.is_empty()
            && self.logs.is_empty()
    }
}

/// An immutable, compiled schema.
///
/// Holds one [`VersionActions`] per declared version, sorted ascending.
/// Shared read-only between any number of concurrent conversions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledSchema {
    versions: Vec<VersionActions>,
    schema_url: Option<String>,
}

impl CompiledSchema {
    /// Build a schema from per-version actions, which need not be sorted.
    pub fn new(mut versions: Vec<VersionActions>, schema_url: Option<String>) -> Self {
        versions.sort_by(|a, b| a.version.cmp(&b.version));
        Self {
            versions,
            schema_url,
        }
    }

    pub fn versions(&self) -> &[VersionActions] {
        &self.versions
    }

    pub fn latest_version(&self) -> Option<&Version> {
        self.versions.last().map(VersionActions::version)
    }

    /// URL of the latest version, if the schema declares one.
    pub fn schema_url(&self) -> Option<&str> {
        self.schema_url.as_deref()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Versions strictly newer than `from`, ascending.
    pub fn pending(&self, from: &Version) -> &[VersionActions] {
        let start = self.versions.partition_point(|v| v.version <= *from);
        &self.versions[start..]
    }

    /// Whether data at `from` needs no conversion.
    pub fn is_latest(&self, from: &Version) -> bool {
        self.pending(from).is_empty()
    }

    pub fn convert_resource_to_latest(
        &self,
        from: &Version,
        resource: &mut Resource,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        for actions in self.pending(from) {
            debug!(from = %from, version = %actions.version, "converting resource");
            actions.resource.apply(resource, changes)?;
        }
        Ok(())
    }

    pub fn convert_spans_to_latest(
        &self,
        from: &Version,
        spans: &mut [Span],
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        if spans.is_empty() {
            return Ok(());
        }
        for actions in self.pending(from) {
            debug!(
                from = %from,
                version = %actions.version,
                spans = spans.len(),
                "converting spans"
            );
            actions.spans.apply(spans, changes)?;
        }
        Ok(())
    }

    /// Metrics take the list itself since split and merge change its length.
    pub fn convert_metrics_to_latest(
        &self,
        from: &Version,
        metrics: &mut Vec<Metric>,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        if metrics.is_empty() {
            return Ok(());
        }
        for actions in self.pending(from) {
            debug!(
                from = %from,
                version = %actions.version,
                metrics = metrics.len(),
                "converting metrics"
            );
            actions.metrics.apply(metrics, changes)?;
        }
        Ok(())
    }

    pub fn convert_logs_to_latest(
        &self,
        from: &Version,
        records: &mut [LogRecord],
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        if records.is_empty() {
            return Ok(());
        }
        for actions in self.pending(from) {
            debug!(
                from = %from,
                version = %actions.version,
                records = records.len(),
                "converting logs"
            );
            actions.logs.apply(records, changes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::actions::{AttributesRenameAction, ResourceAction};
    use opentelemetry_proto::tonic::common::v1::KeyValue;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn renaming(version: &str, from: &str, to: &str) -> VersionActions {
        let mut actions = VersionActions::new(v(version));
        actions.resource = ResourceActions::new(vec![ResourceAction::RenameAttributes(
            AttributesRenameAction::new([(from.to_owned(), to.to_owned())]),
        )]);
        actions
    }

    fn resource(keys: &[&str]) -> Resource {
        Resource {
            attributes: keys
                .iter()
                .map(|k| KeyValue {
                    key: (*k).to_owned(),
                    value: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn versions_sort_numerically() {
        let schema = CompiledSchema::new(
            vec![
                renaming("1.10.0", "c", "d"),
                renaming("1.2.0", "b", "c"),
                renaming("1.9.0", "a", "b"),
            ],
            None,
        );
        let order: Vec<_> = schema.versions().iter().map(|v| v.version().to_string()).collect();
        assert_eq!(order, ["1.2.0", "1.9.0", "1.10.0"]);
        assert_eq!(schema.latest_version(), Some(&v("1.10.0")));
    }

    #[test]
    fn pending_selects_strictly_newer_versions() {
        let schema = CompiledSchema::new(
            vec![renaming("1.0.0", "a", "b"), renaming("1.1.0", "b", "c")],
            None,
        );
        assert_eq!(schema.pending(&v("0.0.0")).len(), 2);
        assert_eq!(schema.pending(&v("1.0")).len(), 1);
        assert_eq!(schema.pending(&v("1.0.5")).len(), 1);
        assert!(schema.is_latest(&v("1.1.0")));
        assert!(schema.is_latest(&v("9")));
    }

    #[test]
    fn chains_apply_in_ascending_order() {
        let schema = CompiledSchema::new(
            vec![renaming("3", "b", "c"), renaming("2", "a", "b")],
            None,
        );

        let mut from_start = resource(&["a"]);
        schema
            .convert_resource_to_latest(&v("1"), &mut from_start, &mut ChangeLog::new())
            .unwrap();
        assert_eq!(from_start.attributes[0].key, "c");

        let mut from_v2 = resource(&["a"]);
        schema
            .convert_resource_to_latest(&v("2"), &mut from_v2, &mut ChangeLog::new())
            .unwrap();
        assert_eq!(from_v2.attributes[0].key, "a");
    }

    #[test]
    fn conversion_fails_fast() {
        let schema = CompiledSchema::new(
            vec![renaming("1", "a", "b"), renaming("2", "x", "y")],
            None,
        );
        let mut res = resource(&["a", "b", "x"]);
        let mut changes = ChangeLog::new();

        let result = schema.convert_resource_to_latest(&Version::zero(), &mut res, &mut changes);

        assert!(matches!(result, Err(ConversionError::Conflict { .. })));
        assert_eq!(res.attributes[2].key, "x");
    }

    #[test]
    fn compiled_schema_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompiledSchema>();
    }
}
