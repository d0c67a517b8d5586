//! Deterministic synthetic OTLP batches.
//!
//! Used by benchmarks and tests to feed the converter realistic volumes
//! without fixture files. The same seed always yields the same batch.

use opentelemetry_proto::tonic::collector::{
    logs::v1::ExportLogsServiceRequest, metrics::v1::ExportMetricsServiceRequest,
    trace::v1::ExportTraceServiceRequest,
};
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs, SeverityNumber};
use opentelemetry_proto::tonic::metrics::v1::{
    metric, number_data_point, AggregationTemporality, Metric, NumberDataPoint, ResourceMetrics,
    ScopeMetrics, Sum,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{span, ResourceSpans, ScopeSpans, Span};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BASE_TIME_NANOS: u64 = 1_704_067_200_000_000_000;

/// Resource attributes every generated resource carries, besides fillers.
pub const RESOURCE_KEYS: &[&str] = &[
    "service.name",
    "telemetry.auto.version",
    "k8s.cluster.name",
    "host.name",
];

const HTTP_STATUS_CODES: &[i64] = &[200, 201, 204, 301, 400, 404, 500, 503];

/// Seeded generator of export requests.
#[derive(Debug)]
pub struct BatchGenerator {
    rng: StdRng,
    resource_attributes: usize,
}

impl BatchGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            resource_attributes: 20,
        }
    }

    /// Total attributes per resource, fillers included.
    #[must_use]
    pub fn with_resource_attributes(mut self, count: usize) -> Self {
        self.resource_attributes = count.max(RESOURCE_KEYS.len());
        self
    }

    pub fn resource(&mut self) -> Resource {
        let mut attributes: Vec<KeyValue> = RESOURCE_KEYS
            .iter()
            .map(|key| string_kv(key, &format!("{key}-{}", self.rng.gen_range(0..8))))
            .collect();
        attributes.extend(
            (RESOURCE_KEYS.len()..self.resource_attributes)
                .map(|i| string_kv(&format!("resource.attr.{i}"), &format!("value-{i}"))),
        );
        Resource {
            attributes,
            ..Default::default()
        }
    }

    /// One resource batch of `spans` spans, each with a couple of events.
    pub fn span_batch(&mut self, spans: usize) -> ExportTraceServiceRequest {
        let spans = (0..spans).map(|i| self.span(i)).collect();
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: Some(self.resource()),
                scope_spans: vec![ScopeSpans {
                    spans,
                    ..Default::default()
                }],
                schema_url: String::new(),
            }],
        }
    }

    /// One resource batch of `metrics` cumulative sums named `metric{i}`,
    /// each with `points` data points labelled by `http.status_code`.
    pub fn metric_batch(&mut self, metrics: usize, points: usize) -> ExportMetricsServiceRequest {
        let metrics = (0..metrics)
            .map(|i| Metric {
                name: format!("metric{i}"),
                unit: "1".to_owned(),
                data: Some(metric::Data::Sum(Sum {
                    data_points: (0..points).map(|p| self.point(p)).collect(),
                    aggregation_temporality: AggregationTemporality::Cumulative as i32,
                    is_monotonic: true,
                })),
                ..Default::default()
            })
            .collect();
        ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: Some(self.resource()),
                scope_metrics: vec![ScopeMetrics {
                    metrics,
                    ..Default::default()
                }],
                schema_url: String::new(),
            }],
        }
    }

    pub fn log_batch(&mut self, records: usize) -> ExportLogsServiceRequest {
        let log_records = (0..records)
            .map(|i| LogRecord {
                time_unix_nano: BASE_TIME_NANOS + i as u64,
                severity_number: SeverityNumber::Info as i32,
                severity_text: "INFO".to_owned(),
                body: Some(AnyValue {
                    value: Some(any_value::Value::StringValue(format!("request {i} handled"))),
                }),
                attributes: vec![
                    int_kv("http.status_code", self.status_code()),
                    string_kv("http.method", "GET"),
                ],
                ..Default::default()
            })
            .collect();
        ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: Some(self.resource()),
                scope_logs: vec![ScopeLogs {
                    log_records,
                    ..Default::default()
                }],
                schema_url: String::new(),
            }],
        }
    }

    fn span(&mut self, index: usize) -> Span {
        let start = BASE_TIME_NANOS + index as u64 * 1_000;
        Span {
            trace_id: self.rng.gen::<[u8; 16]>().to_vec(),
            span_id: self.rng.gen::<[u8; 8]>().to_vec(),
            name: format!("GET /api/{}", index % 10),
            kind: span::SpanKind::Server as i32,
            start_time_unix_nano: start,
            end_time_unix_nano: start + self.rng.gen_range(1_000..1_000_000),
            attributes: vec![
                int_kv("http.status_code", self.status_code()),
                string_kv("http.method", "GET"),
                string_kv("http.route", &format!("/api/{}", index % 10)),
            ],
            events: vec![
                span::Event {
                    time_unix_nano: start + 10,
                    name: "exception".to_owned(),
                    attributes: vec![string_kv("exception.type", "IOError")],
                    ..Default::default()
                },
                span::Event {
                    time_unix_nano: start + 20,
                    name: "retry".to_owned(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn point(&mut self, index: usize) -> NumberDataPoint {
        NumberDataPoint {
            attributes: vec![int_kv("http.status_code", self.status_code())],
            start_time_unix_nano: BASE_TIME_NANOS,
            time_unix_nano: BASE_TIME_NANOS + (index as u64 + 1) * 1_000_000_000,
            value: Some(number_data_point::Value::AsInt(self.rng.gen_range(0..10_000))),
            ..Default::default()
        }
    }

    fn status_code(&mut self) -> i64 {
        HTTP_STATUS_CODES[self.rng.gen_range(0..HTTP_STATUS_CODES.len())]
    }
}

fn string_kv(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_owned(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_owned())),
        }),
    }
}

fn int_kv(key: &str, value: i64) -> KeyValue {
    KeyValue {
        key: key.to_owned(),
        value: Some(AnyValue {
            value: Some(any_value::Value::IntValue(value)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_batch() {
        let a = BatchGenerator::new(7).span_batch(5);
        let b = BatchGenerator::new(7).span_batch(5);
        assert_eq!(a, b);
    }

    #[test]
    fn resource_has_requested_attribute_count() {
        let resource = BatchGenerator::new(1).with_resource_attributes(30).resource();
        assert_eq!(resource.attributes.len(), 30);
        assert!(resource.attributes.iter().any(|kv| kv.key == "k8s.cluster.name"));

        let small = BatchGenerator::new(1).with_resource_attributes(1).resource();
        assert_eq!(small.attributes.len(), RESOURCE_KEYS.len());
    }

    #[test]
    fn metric_batch_shape() {
        let request = BatchGenerator::new(3).metric_batch(4, 6);
        let metrics = &request.resource_metrics[0].scope_metrics[0].metrics;
        assert_eq!(metrics.len(), 4);
        assert_eq!(metrics[3].name, "metric3");
        let Some(metric::Data::Sum(sum)) = &metrics[0].data else {
            panic!("expected sum");
        };
        assert_eq!(sum.data_points.len(), 6);
    }

    #[test]
    fn log_batch_shape() {
        let request = BatchGenerator::new(3).log_batch(8);
        assert_eq!(request.resource_logs[0].scope_logs[0].log_records.len(), 8);
    }
}
