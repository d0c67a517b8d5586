//! Reversible mutation records.
//!
//! Actions rewrite telemetry in place and append an [`UndoRecord`] for every
//! mutation. Records address what they changed through a [`Location`] rather
//! than a pointer, so a log can outlive the borrow of the data it describes
//! and be replayed against any [`UndoTarget`] that resolves the same
//! locations.

use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_proto::tonic::logs::v1::LogRecord;
use opentelemetry_proto::tonic::metrics::v1::Metric;
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::Span;
use smallvec::SmallVec;
use tracing::warn;

use super::otlp;

/// Renamed keys kept inline per record before spilling to the heap.
pub const INLINE_RENAMES: usize = 4;

/// Where, within a request, the entity addressed by [`Entity`] lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Relative to whatever the engine was handed directly.
    Local,
    /// The resource batch at this index of a request.
    Resource(usize),
    /// A scope batch within a resource batch.
    Scope { resource: usize, scope: usize },
}

/// The mutated entity, relative to its [`Origin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Resource,
    Span(usize),
    SpanEvent { span: usize, event: usize },
    /// The metric list as a whole (split and merge).
    MetricList,
    Metric(usize),
    DataPoint { metric: usize, point: usize },
    LogRecord(usize),
    SchemaUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub origin: Origin,
    pub entity: Entity,
}

impl Location {
    pub const fn local(entity: Entity) -> Self {
        Self {
            origin: Origin::Local,
            entity,
        }
    }

    /// Rebase a local location onto `origin`. Already rebased locations are kept.
    #[must_use]
    pub const fn within(self, origin: Origin) -> Self {
        match self.origin {
            Origin::Local => Self {
                origin,
                entity: self.entity,
            },
            _ => self,
        }
    }

    /// The same entity with the origin stripped.
    #[must_use]
    pub const fn localized(self) -> Self {
        Self::local(self.entity)
    }
}

/// One reversible step.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoRecord {
    /// Attribute keys rewritten in place, as `(position, original key)`.
    RenameKeys {
        location: Location,
        keys: SmallVec<[(usize, String); INLINE_RENAMES]>,
    },
    /// A span event or metric name.
    RenameName { location: Location, name: String },
    /// A metric as it was before a structural rewrite.
    ReplaceMetric {
        location: Location,
        metric: Box<Metric>,
    },
    /// A whole metric list as it was before split or merge.
    ReplaceMetrics {
        location: Location,
        metrics: Vec<Metric>,
    },
    SchemaUrl { location: Location, url: String },
}

impl UndoRecord {
    pub fn location(&self) -> Location {
        match self {
            Self::RenameKeys { location, .. }
            | Self::RenameName { location, .. }
            | Self::ReplaceMetric { location, .. }
            | Self::ReplaceMetrics { location, .. }
            | Self::SchemaUrl { location, .. } => *location,
        }
    }

    fn location_mut(&mut self) -> &mut Location {
        match self {
            Self::RenameKeys { location, .. }
            | Self::RenameName { location, .. }
            | Self::ReplaceMetric { location, .. }
            | Self::ReplaceMetrics { location, .. }
            | Self::SchemaUrl { location, .. } => location,
        }
    }

    /// Restore the recorded state. Returns `false` if the location no longer resolves.
    fn undo<T: UndoTarget + ?Sized>(self, target: &mut T) -> bool {
        match self {
            Self::RenameKeys { location, keys } => {
                let Some(attributes) = target.attributes_mut(&location) else {
                    return false;
                };
                let mut restored = true;
                for (idx, key) in keys.into_iter().rev() {
                    match attributes.get_mut(idx) {
                        Some(kv) => kv.key = key,
                        None => restored = false,
                    }
                }
                restored
            }
            Self::RenameName { location, name } => match target.name_mut(&location) {
                Some(slot) => {
                    *slot = name;
                    true
                }
                None => false,
            },
            Self::ReplaceMetric { location, metric } => match target.metric_mut(&location) {
                Some(slot) => {
                    *slot = *metric;
                    true
                }
                None => false,
            },
            Self::ReplaceMetrics { location, metrics } => match target.metrics_mut(&location) {
                Some(slot) => {
                    *slot = metrics;
                    true
                }
                None => false,
            },
            Self::SchemaUrl { location, url } => match target.schema_url_mut(&location) {
                Some(slot) => {
                    *slot = url;
                    true
                }
                None => false,
            },
        }
    }
}

/// Ordered list of undo records for one conversion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLog {
    records: SmallVec<[UndoRecord; 4]>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: UndoRecord) {
        self.records.push(record);
    }

    /// Append every record of `other` after the records already held.
    pub fn merge(&mut self, other: Self) {
        self.records.extend(other.records);
    }

    /// Like [`merge`](Self::merge), rebasing local locations onto `origin`.
    pub fn merge_within(&mut self, other: Self, origin: Origin) {
        self.records.extend(other.records.into_iter().map(|mut record| {
            let location = record.location_mut();
            *location = location.within(origin);
            record
        }));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[UndoRecord] {
        &self.records
    }

    /// Undo every recorded step, newest first, against `target`.
    ///
    /// Consumes the log. Returns the number of records restored; records
    /// whose location no longer resolves are skipped with a warning.
    pub fn rollback<T: UndoTarget + ?Sized>(self, target: &mut T) -> usize {
        let mut restored = 0;
        for record in self.records.into_iter().rev() {
            let location = record.location();
            if record.undo(target) {
                restored += 1;
            } else {
                warn!(?location, "undo location does not resolve, skipping");
            }
        }
        restored
    }
}

/// Data a [`ChangeLog`] can be rolled back against.
pub trait UndoTarget {
    fn attributes_mut(&mut self, location: &Location) -> Option<&mut [KeyValue]>;

    fn name_mut(&mut self, location: &Location) -> Option<&mut String>;

    fn metric_mut(&mut self, _location: &Location) -> Option<&mut Metric> {
        None
    }

    fn metrics_mut(&mut self, _location: &Location) -> Option<&mut Vec<Metric>> {
        None
    }

    fn schema_url_mut(&mut self, _location: &Location) -> Option<&mut String> {
        None
    }
}

impl UndoTarget for Resource {
    fn attributes_mut(&mut self, location: &Location) -> Option<&mut [KeyValue]> {
        match (location.origin, location.entity) {
            (Origin::Local, Entity::Resource) => Some(self.attributes.as_mut_slice()),
            _ => None,
        }
    }

    fn name_mut(&mut self, _location: &Location) -> Option<&mut String> {
        None
    }
}

impl UndoTarget for [Span] {
    fn attributes_mut(&mut self, location: &Location) -> Option<&mut [KeyValue]> {
        if location.origin != Origin::Local {
            return None;
        }
        match location.entity {
            Entity::Span(i) => Some(self.get_mut(i)?.attributes.as_mut_slice()),
            Entity::SpanEvent { span, event } => {
                Some(self.get_mut(span)?.events.get_mut(event)?.attributes.as_mut_slice())
            }
            _ => None,
        }
    }

    fn name_mut(&mut self, location: &Location) -> Option<&mut String> {
        match (location.origin, location.entity) {
            (Origin::Local, Entity::SpanEvent { span, event }) => {
                Some(&mut self.get_mut(span)?.events.get_mut(event)?.name)
            }
            _ => None,
        }
    }
}

impl UndoTarget for Vec<Metric> {
    fn attributes_mut(&mut self, location: &Location) -> Option<&mut [KeyValue]> {
        match (location.origin, location.entity) {
            (Origin::Local, Entity::DataPoint { metric, point }) => {
                otlp::point_attributes_mut(self.get_mut(metric)?, point).map(Vec::as_mut_slice)
            }
            _ => None,
        }
    }

    fn name_mut(&mut self, location: &Location) -> Option<&mut String> {
        match (location.origin, location.entity) {
            (Origin::Local, Entity::Metric(i)) => Some(&mut self.get_mut(i)?.name),
            _ => None,
        }
    }

    fn metric_mut(&mut self, location: &Location) -> Option<&mut Metric> {
        match (location.origin, location.entity) {
            (Origin::Local, Entity::Metric(i)) => self.get_mut(i),
            _ => None,
        }
    }

    fn metrics_mut(&mut self, location: &Location) -> Option<&mut Vec<Metric>> {
        match (location.origin, location.entity) {
            (Origin::Local, Entity::MetricList) => Some(self),
            _ => None,
        }
    }
}

impl UndoTarget for [LogRecord] {
    fn attributes_mut(&mut self, location: &Location) -> Option<&mut [KeyValue]> {
        match (location.origin, location.entity) {
            (Origin::Local, Entity::LogRecord(i)) => {
                Some(self.get_mut(i)?.attributes.as_mut_slice())
            }
            _ => None,
        }
    }

    fn name_mut(&mut self, _location: &Location) -> Option<&mut String> {
        None
    }
}
