//! Helpers over the OTLP metric data model.
//!
//! Metrics hold their data points in one of five variants of
//! [`metric::Data`], each with its own point type. These helpers let actions
//! treat the points uniformly where only attributes matter.

use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
use opentelemetry_proto::tonic::metrics::v1::{
    metric::Data, ExponentialHistogram, ExponentialHistogramDataPoint, Gauge, Histogram,
    HistogramDataPoint, Metric, NumberDataPoint, Sum, Summary, SummaryDataPoint,
};

/// A metric data point of any kind.
pub trait DataPoint {
    fn attributes(&self) -> &[KeyValue];
    fn attributes_mut(&mut self) -> &mut Vec<KeyValue>;
}

macro_rules! impl_data_point {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl DataPoint for $ty {
                fn attributes(&self) -> &[KeyValue] {
                    &self.attributes
                }

                fn attributes_mut(&mut self) -> &mut Vec<KeyValue> {
                    &mut self.attributes
                }
            }
        )+
    };
}

impl_data_point!(
    NumberDataPoint,
    HistogramDataPoint,
    ExponentialHistogramDataPoint,
    SummaryDataPoint,
);

/// Variant name of a metric's data, for diagnostics.
pub const fn data_kind(data: Option<&Data>) -> &'static str {
    match data {
        Some(Data::Gauge(_)) => "gauge",
        Some(Data::Sum(_)) => "sum",
        Some(Data::Histogram(_)) => "histogram",
        Some(Data::ExponentialHistogram(_)) => "exponential histogram",
        Some(Data::Summary(_)) => "summary",
        None => "empty",
    }
}

pub fn data_point_count(metric: &Metric) -> usize {
    match &metric.data {
        Some(Data::Gauge(g)) => g.data_points.len(),
        Some(Data::Sum(s)) => s.data_points.len(),
        Some(Data::Histogram(h)) => h.data_points.len(),
        Some(Data::ExponentialHistogram(e)) => e.data_points.len(),
        Some(Data::Summary(s)) => s.data_points.len(),
        None => 0,
    }
}

pub fn point_attributes_mut(metric: &mut Metric, point: usize) -> Option<&mut Vec<KeyValue>> {
    match metric.data.as_mut()? {
        Data::Gauge(g) => g.data_points.get_mut(point).map(DataPoint::attributes_mut),
        Data::Sum(s) => s.data_points.get_mut(point).map(DataPoint::attributes_mut),
        Data::Histogram(h) => h.data_points.get_mut(point).map(DataPoint::attributes_mut),
        Data::ExponentialHistogram(e) => {
            e.data_points.get_mut(point).map(DataPoint::attributes_mut)
        }
        Data::Summary(s) => s.data_points.get_mut(point).map(DataPoint::attributes_mut),
    }
}

/// Call `f` with the index and attributes of every data point, stopping at the first error.
pub fn try_for_each_point<E>(
    metric: &mut Metric,
    mut f: impl FnMut(usize, &mut Vec<KeyValue>) -> Result<(), E>,
) -> Result<(), E> {
    fn each<P: DataPoint, E>(
        points: &mut [P],
        f: &mut impl FnMut(usize, &mut Vec<KeyValue>) -> Result<(), E>,
    ) -> Result<(), E> {
        for (i, point) in points.iter_mut().enumerate() {
            f(i, point.attributes_mut())?;
        }
        Ok(())
    }

    match &mut metric.data {
        Some(Data::Gauge(g)) => each(&mut g.data_points, &mut f),
        Some(Data::Sum(s)) => each(&mut s.data_points, &mut f),
        Some(Data::Histogram(h)) => each(&mut h.data_points, &mut f),
        Some(Data::ExponentialHistogram(e)) => each(&mut e.data_points, &mut f),
        Some(Data::Summary(s)) => each(&mut s.data_points, &mut f),
        None => Ok(()),
    }
}

/// Call `f` with the index and attributes of every data point.
pub fn for_each_point_mut(metric: &mut Metric, mut f: impl FnMut(usize, &mut Vec<KeyValue>)) {
    fn each<P: DataPoint>(points: &mut [P], f: &mut impl FnMut(usize, &mut Vec<KeyValue>)) {
        for (i, point) in points.iter_mut().enumerate() {
            f(i, point.attributes_mut());
        }
    }

    match &mut metric.data {
        Some(Data::Gauge(g)) => each(&mut g.data_points, &mut f),
        Some(Data::Sum(s)) => each(&mut s.data_points, &mut f),
        Some(Data::Histogram(h)) => each(&mut h.data_points, &mut f),
        Some(Data::ExponentialHistogram(e)) => each(&mut e.data_points, &mut f),
        Some(Data::Summary(s)) => each(&mut s.data_points, &mut f),
        None => {}
    }
}

/// Whether any data point's attributes satisfy `pred`.
pub fn any_point(metric: &Metric, mut pred: impl FnMut(&[KeyValue]) -> bool) -> bool {
    fn any<P: DataPoint>(points: &[P], pred: &mut impl FnMut(&[KeyValue]) -> bool) -> bool {
        points.iter().any(|p| pred(p.attributes()))
    }

    match &metric.data {
        Some(Data::Gauge(g)) => any(&g.data_points, &mut pred),
        Some(Data::Sum(s)) => any(&s.data_points, &mut pred),
        Some(Data::Histogram(h)) => any(&h.data_points, &mut pred),
        Some(Data::ExponentialHistogram(e)) => any(&e.data_points, &mut pred),
        Some(Data::Summary(s)) => any(&s.data_points, &mut pred),
        None => false,
    }
}

/// Move data points out of `data` into `groups` new data values of the same kind.
///
/// `select` sees each point's attributes and returns the group it belongs to,
/// or `None` to leave the point where it is. Group data copies the
/// temporality and monotonicity of the source.
pub fn partition_points(
    data: &mut Data,
    groups: usize,
    mut select: impl FnMut(&mut Vec<KeyValue>) -> Option<usize>,
) -> Vec<Data> {
    fn partition<P: DataPoint>(
        points: &mut Vec<P>,
        groups: usize,
        select: &mut impl FnMut(&mut Vec<KeyValue>) -> Option<usize>,
    ) -> Vec<Vec<P>> {
        let mut out: Vec<Vec<P>> = (0..groups).map(|_| Vec::new()).collect();
        let mut kept = Vec::new();
        for mut point in points.drain(..) {
            match select(point.attributes_mut()).and_then(|g| out.get_mut(g)) {
                Some(group) => group.push(point),
                None => kept.push(point),
            }
        }
        *points = kept;
        out
    }

    match data {
        Data::Gauge(g) => partition(&mut g.data_points, groups, &mut select)
            .into_iter()
            .map(|data_points| Data::Gauge(Gauge { data_points }))
            .collect(),
        Data::Sum(s) => partition(&mut s.data_points, groups, &mut select)
            .into_iter()
            .map(|data_points| {
                Data::Sum(Sum {
                    data_points,
                    aggregation_temporality: s.aggregation_temporality,
                    is_monotonic: s.is_monotonic,
                })
            })
            .collect(),
        Data::Histogram(h) => partition(&mut h.data_points, groups, &mut select)
            .into_iter()
            .map(|data_points| {
                Data::Histogram(Histogram {
                    data_points,
                    aggregation_temporality: h.aggregation_temporality,
                })
            })
            .collect(),
        Data::ExponentialHistogram(e) => partition(&mut e.data_points, groups, &mut select)
            .into_iter()
            .map(|data_points| {
                Data::ExponentialHistogram(ExponentialHistogram {
                    data_points,
                    aggregation_temporality: e.aggregation_temporality,
                })
            })
            .collect(),
        Data::Summary(s) => partition(&mut s.data_points, groups, &mut select)
            .into_iter()
            .map(|data_points| Data::Summary(Summary { data_points }))
            .collect(),
    }
}

/// Append the points of `source` to `target`.
///
/// Returns `source` back if the two are of different kinds.
pub fn append_points(target: &mut Data, source: Data) -> Result<(), Data> {
    match (target, source) {
        (Data::Gauge(t), Data::Gauge(s)) => t.data_points.extend(s.data_points),
        (Data::Sum(t), Data::Sum(s)) => t.data_points.extend(s.data_points),
        (Data::Histogram(t), Data::Histogram(s)) => t.data_points.extend(s.data_points),
        (Data::ExponentialHistogram(t), Data::ExponentialHistogram(s)) => {
            t.data_points.extend(s.data_points);
        }
        (Data::Summary(t), Data::Summary(s)) => t.data_points.extend(s.data_points),
        (_, source) => return Err(source),
    }
    Ok(())
}

/// String form of an attribute value, used to match split selectors.
#[allow(clippy::ref_option)]
pub fn any_value_to_string(value: &Option<AnyValue>) -> String {
    let Some(inner) = value.as_ref().and_then(|v| v.value.as_ref()) else {
        return String::new();
    };

    match inner {
        any_value::Value::StringValue(s) => s.clone(),
        any_value::Value::IntValue(i) => i.to_string(),
        any_value::Value::DoubleValue(d) => d.to_string(),
        any_value::Value::BoolValue(b) => b.to_string(),
        any_value::Value::BytesValue(b) => String::from_utf8_lossy(b).into_owned(),
        any_value::Value::ArrayValue(_) => "[array]".to_owned(),
        any_value::Value::KvlistValue(_) => "[kvlist]".to_owned(),
    }
}

pub fn string_value(value: impl Into<String>) -> Option<AnyValue> {
    Some(AnyValue {
        value: Some(any_value::Value::StringValue(value.into())),
    })
}
