//! Request-level conversion.
//!
//! Routes an OTLP export request to the versioned engine, threading a single
//! [`ChangeLog`] through every resource and scope batch so that one
//! rollback restores the whole request, whatever its signal.

use std::fmt;
use std::sync::Arc;

use opentelemetry_proto::tonic::collector::{
    logs::v1::ExportLogsServiceRequest, metrics::v1::ExportMetricsServiceRequest,
    trace::v1::ExportTraceServiceRequest,
};
use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_proto::tonic::metrics::v1::Metric;
use opentelemetry_proto::tonic::resource::v1::Resource;
use tracing::{debug, info, instrument, warn};

use crate::compiled::{
    ChangeLog, CompiledSchema, ConversionError, Entity, Location, Origin, UndoRecord, UndoTarget,
};
use crate::config::{ConverterConfig, DEFAULT_REWRITE_SCHEMA_URL};
use crate::version::Version;
use crate::{compiler, parser, SchemaError};

/// Telemetry signal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Metrics => "metrics",
            Self::Logs => "logs",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound OTLP export request of any signal.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportRequest {
    Traces(ExportTraceServiceRequest),
    Metrics(ExportMetricsServiceRequest),
    Logs(ExportLogsServiceRequest),
}

impl ExportRequest {
    pub const fn signal(&self) -> Signal {
        match self {
            Self::Traces(_) => Signal::Traces,
            Self::Metrics(_) => Signal::Metrics,
            Self::Logs(_) => Signal::Logs,
        }
    }
}

impl From<ExportTraceServiceRequest> for ExportRequest {
    fn from(request: ExportTraceServiceRequest) -> Self {
        Self::Traces(request)
    }
}

impl From<ExportMetricsServiceRequest> for ExportRequest {
    fn from(request: ExportMetricsServiceRequest) -> Self {
        Self::Metrics(request)
    }
}

impl From<ExportLogsServiceRequest> for ExportRequest {
    fn from(request: ExportLogsServiceRequest) -> Self {
        Self::Logs(request)
    }
}

/// Counts of entities passed through conversion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConversionStats {
    pub resources: u64,
    pub spans: u64,
    pub metrics: u64,
    pub log_records: u64,
}

impl ConversionStats {
    pub const fn total(&self) -> u64 {
        self.resources + self.spans + self.metrics + self.log_records
    }

    pub fn merge(&mut self, other: &Self) {
        self.resources += other.resources;
        self.spans += other.spans;
        self.metrics += other.metrics;
        self.log_records += other.log_records;
    }
}

impl fmt::Display for ConversionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resources={}, spans={}, metrics={}, log_records={}",
            self.resources, self.spans, self.metrics, self.log_records
        )
    }
}

/// Converts whole export requests to the latest schema version.
///
/// The version a batch was produced under is read from its `schema_url`,
/// with a scope's URL taking precedence over its resource's. Batches
/// without a recognisable URL are assumed to be at the fallback version.
#[derive(Debug, Clone)]
pub struct Converter {
    schema: Arc<CompiledSchema>,
    fallback_version: Version,
    rewrite_schema_url: bool,
}

impl Converter {
    pub fn new(schema: Arc<CompiledSchema>) -> Self {
        Self {
            schema,
            fallback_version: Version::zero(),
            rewrite_schema_url: DEFAULT_REWRITE_SCHEMA_URL,
        }
    }

    #[must_use]
    pub fn with_fallback_version(mut self, version: Version) -> Self {
        self.fallback_version = version;
        self
    }

    /// Whether converted batches get their `schema_url` pointed at the latest version.
    #[must_use]
    pub fn with_schema_url_rewrite(mut self, rewrite: bool) -> Self {
        self.rewrite_schema_url = rewrite;
        self
    }

    /// Load, compile and configure from a [`ConverterConfig`].
    pub fn from_config(config: &ConverterConfig) -> Result<Self, SchemaError> {
        let path = config
            .schema_file
            .as_ref()
            .ok_or_else(|| SchemaError::Config("schema_file is not set".to_owned()))?;
        let fallback: Version = config.fallback_version.parse().map_err(|e| {
            SchemaError::Config(format!(
                "invalid fallback_version {:?}: {e}",
                config.fallback_version
            ))
        })?;

        let schema = compiler::compile(&parser::parse_file(path)?)?;
        info!(
            schema_file = %path.display(),
            latest = %schema.latest_version().map(ToString::to_string).unwrap_or_default(),
            fallback = %fallback,
            rewrite_schema_url = config.rewrite_schema_url,
            "loaded telemetry schema"
        );

        Ok(Self::new(Arc::new(schema))
            .with_fallback_version(fallback)
            .with_schema_url_rewrite(config.rewrite_schema_url))
    }

    pub fn schema(&self) -> &Arc<CompiledSchema> {
        &self.schema
    }

    pub fn fallback_version(&self) -> &Version {
        &self.fallback_version
    }

    /// Convert every batch of `request` in place.
    ///
    /// Stops at the first failure. Every mutation made before it is in
    /// `changes`; call [`ChangeLog::rollback`] with the request to restore it.
    #[instrument(skip_all, fields(signal = %request.signal()))]
    pub fn convert_request(
        &self,
        request: &mut ExportRequest,
        changes: &mut ChangeLog,
    ) -> Result<ConversionStats, ConversionError> {
        let conversion = Conversion {
            schema: &self.schema,
            fallback: &self.fallback_version,
            read_schema_url: true,
            target_url: if self.rewrite_schema_url {
                self.schema.schema_url()
            } else {
                None
            },
        };
        let stats = conversion.request(request, changes)?;
        debug!(%stats, changes = changes.len(), "converted request");
        Ok(stats)
    }
}

/// Convert `request` from version `0.0.0`, ignoring any `schema_url`.
pub fn convert_request(
    request: &mut ExportRequest,
    schema: &CompiledSchema,
    changes: &mut ChangeLog,
) -> Result<ConversionStats, ConversionError> {
    let zero = Version::zero();
    Conversion {
        schema,
        fallback: &zero,
        read_schema_url: false,
        target_url: None,
    }
    .request(request, changes)
}

/// One request's conversion settings.
struct Conversion<'a> {
    schema: &'a CompiledSchema,
    fallback: &'a Version,
    read_schema_url: bool,
    target_url: Option<&'a str>,
}

/// Run `stage` against a fresh log and fold its records into `changes`,
/// whether or not it succeeded.
fn run_stage(
    changes: &mut ChangeLog,
    origin: Origin,
    stage: impl FnOnce(&mut ChangeLog) -> Result<(), ConversionError>,
) -> Result<(), ConversionError> {
    let mut local = ChangeLog::new();
    let result = stage(&mut local);
    changes.merge_within(local, origin);
    result
}

impl Conversion<'_> {
    fn request(
        &self,
        request: &mut ExportRequest,
        changes: &mut ChangeLog,
    ) -> Result<ConversionStats, ConversionError> {
        match request {
            ExportRequest::Traces(r) => self.traces(r, changes),
            ExportRequest::Metrics(r) => self.metrics(r, changes),
            ExportRequest::Logs(r) => self.logs(r, changes),
        }
    }

    fn version_of(&self, schema_url: &str, inherited: &Version) -> Version {
        if !self.read_schema_url || schema_url.is_empty() {
            return inherited.clone();
        }
        Version::from_schema_url(schema_url).unwrap_or_else(|| {
            warn!(schema_url, fallback = %inherited, "unrecognised schema URL");
            inherited.clone()
        })
    }

    /// Point a converted batch's non-empty `schema_url` at the latest version.
    fn rewrite_url(
        &self,
        schema_url: &mut String,
        from: &Version,
        location: Location,
        changes: &mut ChangeLog,
    ) {
        let Some(target) = self.target_url else {
            return;
        };
        if schema_url.is_empty() || *schema_url == target || self.schema.is_latest(from) {
            return;
        }
        let url = std::mem::replace(schema_url, target.to_owned());
        changes.append(UndoRecord::SchemaUrl { location, url });
    }

    fn resource(
        &self,
        resource: Option<&mut Resource>,
        from: &Version,
        index: usize,
        changes: &mut ChangeLog,
        stats: &mut ConversionStats,
    ) -> Result<(), ConversionError> {
        let Some(resource) = resource else {
            return Ok(());
        };
        stats.resources += 1;
        run_stage(changes, Origin::Resource(index), |log| {
            self.schema.convert_resource_to_latest(from, resource, log)
        })
    }

    fn traces(
        &self,
        request: &mut ExportTraceServiceRequest,
        changes: &mut ChangeLog,
    ) -> Result<ConversionStats, ConversionError> {
        let mut stats = ConversionStats::default();
        for (r, batch) in request.resource_spans.iter_mut().enumerate() {
            let from = self.version_of(&batch.schema_url, self.fallback);
            self.resource(batch.resource.as_mut(), &from, r, changes, &mut stats)?;

            for (s, scope) in batch.scope_spans.iter_mut().enumerate() {
                let origin = Origin::Scope {
                    resource: r,
                    scope: s,
                };
                let scope_from = self.version_of(&scope.schema_url, &from);
                stats.spans += scope.spans.len() as u64;
                run_stage(changes, origin, |log| {
                    self.schema.convert_spans_to_latest(&scope_from, &mut scope.spans, log)
                })?;
                let location = url_location(origin);
                self.rewrite_url(&mut scope.schema_url, &scope_from, location, changes);
            }
            let location = url_location(Origin::Resource(r));
            self.rewrite_url(&mut batch.schema_url, &from, location, changes);
        }
        Ok(stats)
    }

    fn metrics(
        &self,
        request: &mut ExportMetricsServiceRequest,
        changes: &mut ChangeLog,
    ) -> Result<ConversionStats, ConversionError> {
        let mut stats = ConversionStats::default();
        for (r, batch) in request.resource_metrics.iter_mut().enumerate() {
            let from = self.version_of(&batch.schema_url, self.fallback);
            self.resource(batch.resource.as_mut(), &from, r, changes, &mut stats)?;

            for (s, scope) in batch.scope_metrics.iter_mut().enumerate() {
                let origin = Origin::Scope {
                    resource: r,
                    scope: s,
                };
                let scope_from = self.version_of(&scope.schema_url, &from);
                stats.metrics += scope.metrics.len() as u64;
                run_stage(changes, origin, |log| {
                    self.schema
                        .convert_metrics_to_latest(&scope_from, &mut scope.metrics, log)
                })?;
                let location = url_location(origin);
                self.rewrite_url(&mut scope.schema_url, &scope_from, location, changes);
            }
            let location = url_location(Origin::Resource(r));
            self.rewrite_url(&mut batch.schema_url, &from, location, changes);
        }
        Ok(stats)
    }

    fn logs(
        &self,
        request: &mut ExportLogsServiceRequest,
        changes: &mut ChangeLog,
    ) -> Result<ConversionStats, ConversionError> {
        let mut stats = ConversionStats::default();
        for (r, batch) in request.resource_logs.iter_mut().enumerate() {
            let from = self.version_of(&batch.schema_url, self.fallback);
            self.resource(batch.resource.as_mut(), &from, r, changes, &mut stats)?;

            for (s, scope) in batch.scope_logs.iter_mut().enumerate() {
                let origin = Origin::Scope {
                    resource: r,
                    scope: s,
                };
                let scope_from = self.version_of(&scope.schema_url, &from);
                stats.log_records += scope.log_records.len() as u64;
                run_stage(changes, origin, |log| {
                    self.schema
                        .convert_logs_to_latest(&scope_from, &mut scope.log_records, log)
                })?;
                let location = url_location(origin);
                self.rewrite_url(&mut scope.schema_url, &scope_from, location, changes);
            }
            let location = url_location(Origin::Resource(r));
            self.rewrite_url(&mut batch.schema_url, &from, location, changes);
        }
        Ok(stats)
    }
}

const fn url_location(origin: Origin) -> Location {
    Location {
        origin,
        entity: Entity::SchemaUrl,
    }
}

// ============================================================================
// Rollback targets
// ============================================================================

impl UndoTarget for ExportTraceServiceRequest {
    fn attributes_mut(&mut self, location: &Location) -> Option<&mut [KeyValue]> {
        let local = location.localized();
        match location.origin {
            Origin::Resource(r) => self
                .resource_spans
                .get_mut(r)?
                .resource
                .as_mut()?
                .attributes_mut(&local),
            Origin::Scope { resource, scope } => self
                .resource_spans
                .get_mut(resource)?
                .scope_spans
                .get_mut(scope)?
                .spans
                .attributes_mut(&local),
            Origin::Local => None,
        }
    }

    fn name_mut(&mut self, location: &Location) -> Option<&mut String> {
        match location.origin {
            Origin::Scope { resource, scope } => self
                .resource_spans
                .get_mut(resource)?
                .scope_spans
                .get_mut(scope)?
                .spans
                .name_mut(&location.localized()),
            Origin::Resource(_) | Origin::Local => None,
        }
    }

    fn schema_url_mut(&mut self, location: &Location) -> Option<&mut String> {
        if location.entity != Entity::SchemaUrl {
            return None;
        }
        match location.origin {
            Origin::Resource(r) => Some(&mut self.resource_spans.get_mut(r)?.schema_url),
            Origin::Scope { resource, scope } => Some(
                &mut self
                    .resource_spans
                    .get_mut(resource)?
                    .scope_spans
                    .get_mut(scope)?
                    .schema_url,
            ),
            Origin::Local => None,
        }
    }
}

impl UndoTarget for ExportMetricsServiceRequest {
    fn attributes_mut(&mut self, location: &Location) -> Option<&mut [KeyValue]> {
        let local = location.localized();
        match location.origin {
            Origin::Resource(r) => self
                .resource_metrics
                .get_mut(r)?
                .resource
                .as_mut()?
                .attributes_mut(&local),
            Origin::Scope { .. } => scope_metrics(self, location)?.attributes_mut(&local),
            Origin::Local => None,
        }
    }

    fn name_mut(&mut self, location: &Location) -> Option<&mut String> {
        scope_metrics(self, location)?.name_mut(&location.localized())
    }

    fn metric_mut(&mut self, location: &Location) -> Option<&mut Metric> {
        scope_metrics(self, location)?.metric_mut(&location.localized())
    }

    fn metrics_mut(&mut self, location: &Location) -> Option<&mut Vec<Metric>> {
        scope_metrics(self, location)?.metrics_mut(&location.localized())
    }

    fn schema_url_mut(&mut self, location: &Location) -> Option<&mut String> {
        if location.entity != Entity::SchemaUrl {
            return None;
        }
        match location.origin {
            Origin::Resource(r) => Some(&mut self.resource_metrics.get_mut(r)?.schema_url),
            Origin::Scope { resource, scope } => Some(
                &mut self
                    .resource_metrics
                    .get_mut(resource)?
                    .scope_metrics
                    .get_mut(scope)?
                    .schema_url,
            ),
            Origin::Local => None,
        }
    }
}

fn scope_metrics<'a>(
    request: &'a mut ExportMetricsServiceRequest,
    location: &Location,
) -> Option<&'a mut Vec<Metric>> {
    match location.origin {
        Origin::Scope { resource, scope } => Some(
            &mut request
                .resource_metrics
                .get_mut(resource)?
                .scope_metrics
                .get_mut(scope)?
                .metrics,
        ),
        Origin::Resource(_) | Origin::Local => None,
    }
}

impl UndoTarget for ExportLogsServiceRequest {
    fn attributes_mut(&mut self, location: &Location) -> Option<&mut [KeyValue]> {
        let local = location.localized();
        match location.origin {
            Origin::Resource(r) => self
                .resource_logs
                .get_mut(r)?
                .resource
                .as_mut()?
                .attributes_mut(&local),
            Origin::Scope { resource, scope } => self
                .resource_logs
                .get_mut(resource)?
                .scope_logs
                .get_mut(scope)?
                .log_records
                .attributes_mut(&local),
            Origin::Local => None,
        }
    }

    fn name_mut(&mut self, _location: &Location) -> Option<&mut String> {
        None
    }

    fn schema_url_mut(&mut self, location: &Location) -> Option<&mut String> {
        if location.entity != Entity::SchemaUrl {
            return None;
        }
        match location.origin {
            Origin::Resource(r) => Some(&mut self.resource_logs.get_mut(r)?.schema_url),
            Origin::Scope { resource, scope } => Some(
                &mut self
                    .resource_logs
                    .get_mut(resource)?
                    .scope_logs
                    .get_mut(scope)?
                    .schema_url,
            ),
            Origin::Local => None,
        }
    }
}

impl UndoTarget for ExportRequest {
    fn attributes_mut(&mut self, location: &Location) -> Option<&mut [KeyValue]> {
        match self {
            Self::Traces(r) => r.attributes_mut(location),
            Self::Metrics(r) => r.attributes_mut(location),
            Self::Logs(r) => r.attributes_mut(location),
        }
    }

    fn name_mut(&mut self, location: &Location) -> Option<&mut String> {
        match self {
            Self::Traces(r) => r.name_mut(location),
            Self::Metrics(r) => r.name_mut(location),
            Self::Logs(r) => r.name_mut(location),
        }
    }

    fn metric_mut(&mut self, location: &Location) -> Option<&mut Metric> {
        match self {
            Self::Metrics(r) => r.metric_mut(location),
            Self::Traces(_) | Self::Logs(_) => None,
        }
    }

    fn metrics_mut(&mut self, location: &Location) -> Option<&mut Vec<Metric>> {
        match self {
            Self::Metrics(r) => r.metrics_mut(location),
            Self::Traces(_) | Self::Logs(_) => None,
        }
    }

    fn schema_url_mut(&mut self, location: &Location) -> Option<&mut String> {
        match self {
            Self::Traces(r) => r.schema_url_mut(location),
            Self::Metrics(r) => r.schema_url_mut(location),
            Self::Logs(r) => r.schema_url_mut(location),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::parser::parse_str;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue};
    use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
    use opentelemetry_proto::tonic::metrics::v1::{
        metric, number_data_point, Gauge, NumberDataPoint, ResourceMetrics, ScopeMetrics,
    };
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};

    const SCHEMA: &str = r#"
file_format: 1.0.0
schema_url: https://example.com/schemas/1.2.0
versions:
  1.2.0:
    all:
      changes:
        - rename_attributes:
            attribute_map:
              http.status_code: http.response.status_code
  1.1.0:
    resources:
      changes:
        - rename_attributes:
            attribute_map:
              k8s.cluster.name: kubernetes.cluster.name
    metrics:
      changes:
        - rename_metrics:
            cpu: cpu.usage
  1.0.0:
"#;

    fn schema() -> Arc<CompiledSchema> {
        Arc::new(compile(&parse_str(SCHEMA).unwrap()).unwrap())
    }

    fn make_kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(value.to_string())),
            }),
        }
    }

    fn make_resource(keys: &[&str]) -> Option<Resource> {
        Some(Resource {
            attributes: keys.iter().map(|k| make_kv(k, "v")).collect(),
            ..Default::default()
        })
    }

    fn trace_request(schema_url: &str, span_attrs: &[&str]) -> ExportRequest {
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: make_resource(&["k8s.cluster.name", "service.name"]),
                scope_spans: vec![ScopeSpans {
                    spans: vec![Span {
                        name: "GET /".to_string(),
                        attributes: span_attrs.iter().map(|k| make_kv(k, "200")).collect(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                schema_url: schema_url.to_string(),
            }],
        }
        .into()
    }

    fn span_keys(request: &ExportRequest) -> Vec<String> {
        let ExportRequest::Traces(r) = request else {
            panic!("expected traces");
        };
        r.resource_spans[0].scope_spans[0].spans[0]
            .attributes
            .iter()
            .map(|kv| kv.key.clone())
            .collect()
    }

    fn resource_keys(request: &ExportRequest) -> Vec<String> {
        let ExportRequest::Traces(r) = request else {
            panic!("expected traces");
        };
        r.resource_spans[0]
            .resource
            .as_ref()
            .unwrap()
            .attributes
            .iter()
            .map(|kv| kv.key.clone())
            .collect()
    }

    #[test]
    fn converts_from_version_in_schema_url() {
        let converter = Converter::new(schema());
        let mut request = trace_request("https://example.com/schemas/1.1.0", &["http.status_code"]);
        let mut changes = ChangeLog::new();

        let stats = converter.convert_request(&mut request, &mut changes).unwrap();

        // 1.1.0 changes are already applied; only 1.2.0 runs.
        assert_eq!(resource_keys(&request), ["k8s.cluster.name", "service.name"]);
        assert_eq!(span_keys(&request), ["http.response.status_code"]);
        assert_eq!(stats.resources, 1);
        assert_eq!(stats.spans, 1);

        let ExportRequest::Traces(r) = &request else {
            unreachable!()
        };
        assert_eq!(r.resource_spans[0].schema_url, "https://example.com/schemas/1.2.0");
    }

    #[test]
    fn missing_schema_url_uses_fallback() {
        let converter = Converter::new(schema());
        let mut request = trace_request("", &["http.status_code"]);

        converter.convert_request(&mut request, &mut ChangeLog::new()).unwrap();

        assert_eq!(resource_keys(&request), ["kubernetes.cluster.name", "service.name"]);
        assert_eq!(span_keys(&request), ["http.response.status_code"]);
    }

    #[test]
    fn unrecognised_schema_url_uses_fallback() {
        let converter = Converter::new(schema()).with_fallback_version("1.1.0".parse().unwrap());
        let mut request = trace_request("https://example.com/schemas/latest", &[]);

        converter.convert_request(&mut request, &mut ChangeLog::new()).unwrap();

        assert_eq!(resource_keys(&request), ["k8s.cluster.name", "service.name"]);
    }

    #[test]
    fn scope_schema_url_overrides_resource() {
        let converter = Converter::new(schema());
        let mut request = trace_request("https://example.com/schemas/1.0.0", &["http.status_code"]);
        if let ExportRequest::Traces(r) = &mut request {
            r.resource_spans[0].scope_spans[0].schema_url =
                "https://example.com/schemas/1.2.0".to_owned();
        }

        converter.convert_request(&mut request, &mut ChangeLog::new()).unwrap();

        assert_eq!(resource_keys(&request), ["kubernetes.cluster.name", "service.name"]);
        assert_eq!(span_keys(&request), ["http.status_code"]);
    }

    #[test]
    fn failed_request_rolls_back_completely() {
        let converter = Converter::new(schema());
        let mut request = trace_request(
            "https://example.com/schemas/1.0.0",
            &["http.status_code", "http.response.status_code"],
        );
        let original = request.clone();
        let mut changes = ChangeLog::new();

        let err = converter.convert_request(&mut request, &mut changes).unwrap_err();
        assert_eq!(
            err,
            ConversionError::Conflict {
                key: "http.response.status_code".to_owned()
            }
        );
        assert_ne!(request, original);

        changes.rollback(&mut request);
        assert_eq!(request, original);
    }

    #[test]
    fn metric_requests_thread_the_change_log() {
        let converter = Converter::new(schema());
        let mut request: ExportRequest = ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: make_resource(&["k8s.cluster.name"]),
                scope_metrics: vec![ScopeMetrics {
                    metrics: vec![Metric {
                        name: "cpu".to_string(),
                        data: Some(metric::Data::Gauge(Gauge {
                            data_points: vec![NumberDataPoint {
                                attributes: vec![make_kv("http.status_code", "200")],
                                value: Some(number_data_point::Value::AsInt(1)),
                                ..Default::default()
                            }],
                        })),
                        ..Default::default()
                    }],
                    schema_url: "https://example.com/schemas/1.0.0".to_string(),
                    ..Default::default()
                }],
                schema_url: String::new(),
            }],
        }
        .into();
        let original = request.clone();
        let mut changes = ChangeLog::new();

        let stats = converter.convert_request(&mut request, &mut changes).unwrap();
        assert_eq!(stats.metrics, 1);

        let ExportRequest::Metrics(r) = &request else {
            unreachable!()
        };
        let scope = &r.resource_metrics[0].scope_metrics[0];
        assert_eq!(scope.metrics[0].name, "cpu.usage");
        assert_eq!(scope.schema_url, "https://example.com/schemas/1.2.0");

        changes.rollback(&mut request);
        assert_eq!(request, original);
    }

    #[test]
    fn log_requests_convert_and_roll_back() {
        let converter = Converter::new(schema()).with_schema_url_rewrite(false);
        let mut request: ExportRequest = ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: make_resource(&["k8s.cluster.name"]),
                scope_logs: vec![ScopeLogs {
                    log_records: vec![LogRecord {
                        attributes: vec![make_kv("http.status_code", "500")],
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                schema_url: "https://example.com/schemas/1.0.0".to_string(),
            }],
        }
        .into();
        let original = request.clone();
        let mut changes = ChangeLog::new();

        let stats = converter.convert_request(&mut request, &mut changes).unwrap();
        assert_eq!(stats.to_string(), "resources=1, spans=0, metrics=0, log_records=1");

        let ExportRequest::Logs(r) = &request else {
            unreachable!()
        };
        assert_eq!(
            r.resource_logs[0].scope_logs[0].log_records[0].attributes[0].key,
            "http.response.status_code"
        );
        assert_eq!(r.resource_logs[0].schema_url, "https://example.com/schemas/1.0.0");

        changes.rollback(&mut request);
        assert_eq!(request, original);
    }

    #[test]
    fn free_function_ignores_schema_url() {
        let schema = schema();
        let mut request = trace_request("https://example.com/schemas/1.2.0", &["http.status_code"]);
        let mut changes = ChangeLog::new();

        convert_request(&mut request, &schema, &mut changes).unwrap();

        assert_eq!(resource_keys(&request), ["kubernetes.cluster.name", "service.name"]);
        assert_eq!(span_keys(&request), ["http.response.status_code"]);
        let ExportRequest::Traces(r) = &request else {
            unreachable!()
        };
        assert_eq!(r.resource_spans[0].schema_url, "https://example.com/schemas/1.2.0");
    }

    #[test]
    fn metric_stats_count_received_metrics() {
        let schema = compile(
            &parse_str(
                r#"
versions:
  2.0.0:
    metrics:
      changes:
        - merge:
            create_metric: network.io
            by_attribute: direction
            attributes_for_metrics:
              network.io.receive: receive
              network.io.transmit: transmit
"#,
            )
            .unwrap(),
        )
        .unwrap();
        let gauge = |name: &str| Metric {
            name: name.to_string(),
            data: Some(metric::Data::Gauge(Gauge {
                data_points: vec![NumberDataPoint {
                    value: Some(number_data_point::Value::AsInt(1)),
                    ..Default::default()
                }],
            })),
            ..Default::default()
        };
        let mut request: ExportRequest = ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: None,
                scope_metrics: vec![ScopeMetrics {
                    metrics: vec![gauge("network.io.receive"), gauge("network.io.transmit")],
                    ..Default::default()
                }],
                schema_url: String::new(),
            }],
        }
        .into();

        let stats = Converter::new(Arc::new(schema))
            .convert_request(&mut request, &mut ChangeLog::new())
            .unwrap();

        assert_eq!(stats.metrics, 2);
        let ExportRequest::Metrics(r) = &request else {
            unreachable!()
        };
        assert_eq!(r.resource_metrics[0].scope_metrics[0].metrics.len(), 1);
    }

    #[test]
    fn stats_merge() {
        let mut total = ConversionStats {
            resources: 1,
            spans: 2,
            ..Default::default()
        };
        total.merge(&ConversionStats {
            metrics: 3,
            log_records: 4,
            ..Default::default()
        });
        assert_eq!(total.total(), 10);
    }
}
