//! Metric actions.
//!
//! Per-metric actions (rename, label rename, to-delta) run in stages that
//! dispatch on the metric name. Split and merge rewrite the metric list as a
//! whole and form stages of their own; they snapshot the list before
//! touching it so a rollback restores it exactly.

use std::collections::{HashMap, HashSet};
use std::mem;

use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_proto::tonic::metrics::v1::{
    metric::Data, number_data_point, AggregationTemporality, Metric, NumberDataPoint,
};
use tracing::debug;

use super::{AttributesRenameAction, Dispatch};
use crate::compiled::change_log::{ChangeLog, Entity, Location, UndoRecord};
use crate::compiled::otlp;
use crate::compiled::ConversionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricAction {
    /// Old metric name to new metric name.
    Rename(HashMap<String, String>),
    /// Rename data point attributes. An empty `apply_to_metrics` means every metric.
    RenameAttributes {
        apply_to_metrics: HashSet<String>,
        rename: AttributesRenameAction,
    },
    /// Convert the named cumulative sums to delta temporality.
    ToDelta { metrics: HashSet<String> },
}

impl MetricAction {
    /// Whether the action affects a metric currently named `name`.
    pub fn applies_to(&self, name: &str) -> bool {
        match self {
            Self::Rename(names) => names.contains_key(name),
            Self::RenameAttributes {
                apply_to_metrics, ..
            } => apply_to_metrics.is_empty() || apply_to_metrics.contains(name),
            Self::ToDelta { metrics } => metrics.contains(name),
        }
    }

    /// Metric names this action is explicitly scoped to.
    fn named(&self) -> Box<dyn Iterator<Item = &String> + '_> {
        match self {
            Self::Rename(names) => Box::new(names.keys()),
            Self::RenameAttributes {
                apply_to_metrics, ..
            } => Box::new(apply_to_metrics.iter()),
            Self::ToDelta { metrics } => Box::new(metrics.iter()),
        }
    }

    fn is_unscoped(&self) -> bool {
        matches!(
            self,
            Self::RenameAttributes { apply_to_metrics, .. } if apply_to_metrics.is_empty()
        )
    }

    pub fn apply(
        &self,
        index: usize,
        metric: &mut Metric,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        if !self.applies_to(&metric.name) {
            return Ok(());
        }
        match self {
            Self::Rename(names) => {
                if let Some(new_name) = names.get(&metric.name) {
                    let old = mem::replace(&mut metric.name, new_name.clone());
                    changes.append(UndoRecord::RenameName {
                        location: Location::local(Entity::Metric(index)),
                        name: old,
                    });
                }
                Ok(())
            }
            Self::RenameAttributes { rename, .. } => {
                otlp::try_for_each_point(metric, |point, attributes| {
                    rename.apply(
                        attributes,
                        Location::local(Entity::DataPoint {
                            metric: index,
                            point,
                        }),
                        changes,
                    )
                })
            }
            Self::ToDelta { .. } => {
                cumulative_to_delta(index, metric, changes);
                Ok(())
            }
        }
    }
}

/// Rewrite a cumulative sum as a delta sum.
///
/// Points are grouped into series by attribute set and ordered by time. The
/// first point of a series keeps its value; each later point becomes the
/// difference to its predecessor, starting at the predecessor's timestamp.
/// A decrease is a counter reset and the point is kept as is.
fn cumulative_to_delta(index: usize, metric: &mut Metric, changes: &mut ChangeLog) {
    let cumulative = AggregationTemporality::Cumulative as i32;
    match &metric.data {
        Some(Data::Sum(sum)) if sum.aggregation_temporality == cumulative => {}
        _ => return,
    }

    changes.append(UndoRecord::ReplaceMetric {
        location: Location::local(Entity::Metric(index)),
        metric: Box::new(metric.clone()),
    });

    let Some(Data::Sum(sum)) = &mut metric.data else {
        return;
    };

    for mut indices in series(&sum.data_points) {
        indices.sort_by_key(|&i| sum.data_points[i].time_unix_nano);
        let mut previous: Option<(u64, Option<number_data_point::Value>)> = None;
        for &i in indices.iter() {
            let point = &mut sum.data_points[i];
            let current = (point.time_unix_nano, point.value.clone());
            if let Some((prev_time, Some(prev_value))) = previous.take() {
                if let Some(delta) = point.value.clone().and_then(|v| difference(v, prev_value)) {
                    point.value = Some(delta);
                    point.start_time_unix_nano = prev_time;
                }
            }
            previous = Some(current);
        }
    }

    sum.aggregation_temporality = AggregationTemporality::Delta as i32;
    debug!(metric = %metric.name, "converted cumulative sum to delta");
}

/// Group point indices by attribute set, ignoring attribute order.
fn series(points: &[NumberDataPoint]) -> Vec<Vec<usize>> {
    let mut keys: Vec<Vec<&KeyValue>> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, point) in points.iter().enumerate() {
        let mut key: Vec<&KeyValue> = point.attributes.iter().collect();
        key.sort_by(|a, b| a.key.cmp(&b.key));
        match keys.iter().position(|k| *k == key) {
            Some(group) => groups[group].push(i),
            None => {
                keys.push(key);
                groups.push(vec![i]);
            }
        }
    }
    groups
}

fn difference(
    current: number_data_point::Value,
    previous: number_data_point::Value,
) -> Option<number_data_point::Value> {
    use number_data_point::Value::{AsDouble, AsInt};
    match (current, previous) {
        (AsInt(c), AsInt(p)) if c >= p => Some(AsInt(c - p)),
        (AsDouble(c), AsDouble(p)) if c >= p => Some(AsDouble(c - p)),
        _ => None,
    }
}

/// Consecutive per-metric actions with a name-indexed dispatch table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricChain {
    actions: Vec<MetricAction>,
    dispatch: Dispatch,
}

impl MetricChain {
    /// Build the chain and its dispatch table.
    ///
    /// The table is computed by following each named metric through the
    /// chain's renames, so an action scoped to a metric's new name is still
    /// reached by the old name. Metrics no action names get only the
    /// unscoped attribute renames.
    pub fn new(actions: Vec<MetricAction>) -> Self {
        let names: HashSet<&String> = actions.iter().flat_map(MetricAction::named).collect();

        let by_name = names
            .into_iter()
            .map(|start| {
                let mut current = start.clone();
                let mut chain = Vec::new();
                for (i, action) in actions.iter().enumerate() {
                    if !action.applies_to(&current) {
                        continue;
                    }
                    chain.push(i);
                    if let MetricAction::Rename(renames) = action {
                        if let Some(next) = renames.get(&current) {
                            current.clone_from(next);
                        }
                    }
                }
                (start.clone(), chain)
            })
            .collect();

        let fallback = actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_unscoped())
            .map(|(i, _)| i)
            .collect();

        Self {
            dispatch: Dispatch::new(by_name, fallback),
            actions,
        }
    }

    pub fn actions(&self) -> &[MetricAction] {
        &self.actions
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn apply(
        &self,
        metrics: &mut [Metric],
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        for (index, metric) in metrics.iter_mut().enumerate() {
            for &action in self.dispatch.for_name(&metric.name) {
                self.actions[action].apply(index, metric, changes)?;
            }
        }
        Ok(())
    }
}

/// Fan a metric out into one metric per value of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAction {
    metric: String,
    by_attribute: String,
    /// New metric names, in output order.
    targets: Vec<String>,
    /// Attribute value to index into `targets`.
    lookup: HashMap<String, usize>,
}

impl SplitAction {
    /// `metrics_from_attributes` maps each new metric name to the attribute
    /// value selecting it.
    pub fn new<'a>(
        metric: impl Into<String>,
        by_attribute: impl Into<String>,
        metrics_from_attributes: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Self {
        let mut targets = Vec::new();
        let mut lookup = HashMap::new();
        for (new_metric, value) in metrics_from_attributes {
            lookup.insert(value.clone(), targets.len());
            targets.push(new_metric.clone());
        }
        Self {
            metric: metric.into(),
            by_attribute: by_attribute.into(),
            targets,
            lookup,
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    fn selects(&self, attributes: &[KeyValue]) -> bool {
        attributes.iter().any(|kv| {
            kv.key == self.by_attribute
                && self
                    .lookup
                    .contains_key(&otlp::any_value_to_string(&kv.value))
        })
    }

    /// Split every metric named [`metric`](Self::metric).
    ///
    /// Points whose attribute value is in the lookup table move, without
    /// that attribute, to the metric the table names. New metrics follow the
    /// original in table order; the original keeps unmatched points and is
    /// dropped if none remain.
    pub fn apply(&self, metrics: &mut Vec<Metric>, changes: &mut ChangeLog) {
        let affected = metrics
            .iter()
            .any(|m| m.name == self.metric && otlp::any_point(m, |attrs| self.selects(attrs)));
        if !affected {
            return;
        }

        changes.append(UndoRecord::ReplaceMetrics {
            location: Location::local(Entity::MetricList),
            metrics: metrics.clone(),
        });

        for mut metric in mem::take(metrics) {
            if metric.name != self.metric {
                metrics.push(metric);
                continue;
            }
            let Some(data) = metric.data.as_mut() else {
                metrics.push(metric);
                continue;
            };

            let groups = otlp::partition_points(data, self.targets.len(), |attributes| {
                let position = attributes.iter().position(|kv| kv.key == self.by_attribute)?;
                let value = otlp::any_value_to_string(&attributes[position].value);
                let group = *self.lookup.get(&value)?;
                attributes.remove(position);
                Some(group)
            });

            let split: Vec<Metric> = groups
                .into_iter()
                .zip(&self.targets)
                .map(|(data, name)| Metric {
                    name: name.clone(),
                    description: metric.description.clone(),
                    unit: metric.unit.clone(),
                    metadata: metric.metadata.clone(),
                    data: Some(data),
                })
                .filter(|m| otlp::data_point_count(m) > 0)
                .collect();

            debug!(metric = %self.metric, into = split.len(), "split metric");
            if otlp::data_point_count(&metric) > 0 {
                metrics.push(metric);
            }
            metrics.extend(split);
        }
    }
}

/// Combine several metrics into one, tagging each point with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeAction {
    metric: String,
    by_attribute: String,
    /// Source metric name to the attribute value its points receive.
    sources: HashMap<String, String>,
}

impl MergeAction {
    pub fn new(
        metric: impl Into<String>,
        by_attribute: impl Into<String>,
        sources: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            metric: metric.into(),
            by_attribute: by_attribute.into(),
            sources: sources.into_iter().collect(),
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Merge every source metric into [`metric`](Self::metric) at the
    /// position of the first source.
    ///
    /// Nothing is mutated if a source point already carries the tagging
    /// attribute ([`ConversionError::Conflict`]) or if sources hold
    /// different kinds of data ([`ConversionError::IncompatibleMerge`]).
    pub fn apply(
        &self,
        metrics: &mut Vec<Metric>,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        let sources: Vec<&Metric> = metrics
            .iter()
            .filter(|m| self.sources.contains_key(&m.name))
            .collect();
        let Some(first) = sources.first() else {
            return Ok(());
        };

        let kind = first.data.as_ref().map(mem::discriminant);
        for source in &sources {
            let source_kind = source.data.as_ref().map(mem::discriminant);
            if source_kind != kind {
                return Err(ConversionError::IncompatibleMerge {
                    metric: self.metric.clone(),
                    reason: format!(
                        "{} holds {} data but {} holds {} data",
                        first.name,
                        otlp::data_kind(first.data.as_ref()),
                        source.name,
                        otlp::data_kind(source.data.as_ref()),
                    ),
                });
            }
            if otlp::any_point(source, |attrs| attrs.iter().any(|kv| kv.key == self.by_attribute)) {
                debug!(metric = %source.name, key = %self.by_attribute, "merge attribute conflict");
                return Err(ConversionError::Conflict {
                    key: self.by_attribute.clone(),
                });
            }
        }

        changes.append(UndoRecord::ReplaceMetrics {
            location: Location::local(Entity::MetricList),
            metrics: metrics.clone(),
        });

        let mut merged_at: Option<usize> = None;
        for mut metric in mem::take(metrics) {
            let Some(value) = self.sources.get(&metric.name) else {
                metrics.push(metric);
                continue;
            };

            let tag = KeyValue {
                key: self.by_attribute.clone(),
                value: otlp::string_value(value.as_str()),
            };
            otlp::for_each_point_mut(&mut metric, |_, attributes| attributes.push(tag.clone()));

            let Some(position) = merged_at else {
                metric.name.clone_from(&self.metric);
                merged_at = Some(metrics.len());
                metrics.push(metric);
                continue;
            };
            let Some(data) = metric.data else {
                continue;
            };
            let target = &mut metrics[position];
            match target.data.as_mut() {
                Some(target_data) => {
                    if otlp::append_points(target_data, data).is_err() {
                        return Err(ConversionError::IncompatibleMerge {
                            metric: self.metric.clone(),
                            reason: "mixed data kinds".to_owned(),
                        });
                    }
                }
                None => target.data = Some(data),
            }
        }

        debug!(metric = %self.metric, "merged metrics");
        Ok(())
    }
}

/// One step of a version's metric conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricStage {
    PerMetric(MetricChain),
    Split(SplitAction),
    Merge(MergeAction),
}

/// Metric actions of one version, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricActions {
    stages: Vec<MetricStage>,
}

impl MetricActions {
    pub fn new(stages: Vec<MetricStage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[MetricStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| match stage {
                MetricStage::PerMetric(chain) => chain.actions().len(),
                MetricStage::Split(_) | MetricStage::Merge(_) => 1,
            })
            .sum()
    }

    pub fn apply(
        &self,
        metrics: &mut Vec<Metric>,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        for stage in &self.stages {
            match stage {
                MetricStage::PerMetric(chain) => chain.apply(metrics, changes)?,
                MetricStage::Split(split) => split.apply(metrics, changes),
                MetricStage::Merge(merge) => merge.apply(metrics, changes)?,
            }
        }
        Ok(())
    }
}
