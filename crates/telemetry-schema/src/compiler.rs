//! Schema compiler: declarative [`ast::Schema`] to [`CompiledSchema`].
//!
//! Each distinct version compiles into one [`VersionActions`]. Sections of a
//! version run in a fixed order: the `all` section first, then the section
//! specific to the telemetry kind. When a version is declared more than once
//! (possibly spelled differently, `1.0` and `1.0.0`), the declarations are
//! merged in file order and the last rename of a given key wins.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::info;

use crate::ast::{self, AttributeMap, VersionDef};
use crate::compiled::actions::{
    AttributesRenameAction, LogAction, LogActions, MergeAction, MetricAction, MetricActions,
    MetricChain, MetricStage, ResourceAction, ResourceActions, SpanAction, SpanActions,
    SpanEventAction, SplitAction,
};
use crate::compiled::{CompiledSchema, VersionActions};
use crate::version::{Version, VersionParseError};

/// Error compiling a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("invalid version {version:?}: {source}")]
    InvalidVersion {
        version: String,
        source: VersionParseError,
    },

    /// A split or merge is missing a metric or attribute name.
    #[error("incomplete {change} in version {version}: {reason}")]
    IncompleteChange {
        version: String,
        change: &'static str,
        reason: String,
    },
}

/// Compile a schema into executable per-version action chains.
pub fn compile(schema: &ast::Schema) -> Result<CompiledSchema, CompileError> {
    let mut index: HashMap<Version, usize> = HashMap::new();
    let mut grouped: Vec<(Version, Vec<&VersionDef>)> = Vec::new();

    for (raw, def) in &schema.versions {
        let version: Version = raw.parse().map_err(|source| CompileError::InvalidVersion {
            version: raw.clone(),
            source,
        })?;
        match index.get(&version) {
            Some(&i) => grouped[i].1.push(def),
            None => {
                index.insert(version.clone(), grouped.len());
                grouped.push((version, vec![def]));
            }
        }
    }

    let versions = grouped
        .into_iter()
        .map(|(version, defs)| compile_version(version, &defs))
        .collect::<Result<Vec<_>, _>>()?;

    let schema_url = (!schema.schema_url.is_empty()).then(|| schema.schema_url.clone());
    let compiled = CompiledSchema::new(versions, schema_url);

    info!(
        versions = compiled.len(),
        latest = %compiled.latest_version().map(ToString::to_string).unwrap_or_default(),
        resource_actions = compiled.versions().iter().map(|v| v.resource().len()).sum::<usize>(),
        span_actions = compiled.versions().iter().map(|v| v.spans().len()).sum::<usize>(),
        metric_actions = compiled.versions().iter().map(|v| v.metrics().len()).sum::<usize>(),
        log_actions = compiled.versions().iter().map(|v| v.logs().len()).sum::<usize>(),
        "compiled telemetry schema"
    );

    Ok(compiled)
}

fn compile_version(version: Version, defs: &[&VersionDef]) -> Result<VersionActions, CompileError> {
    let all: Vec<&AttributeMap> = defs
        .iter()
        .flat_map(|def| &def.all.changes)
        .filter_map(|change| change.rename_attributes.as_ref())
        .map(|mapping| &mapping.attribute_map)
        .collect();

    let mut actions = VersionActions::new(version);
    actions.resource = compile_resource(&all, defs);
    actions.spans = compile_spans(&all, defs);
    actions.metrics = compile_metrics(&all, defs, actions.version())?;
    actions.logs = compile_logs(&all, defs);
    Ok(actions)
}

/// Drop keys from earlier tables that a later table renames too.
fn retain_last_wins<'a>(tables: impl DoubleEndedIterator<Item = &'a mut AttributeMap>) {
    let mut seen: HashSet<String> = HashSet::new();
    for table in tables.rev() {
        table.retain(|old, _| !seen.contains(old));
        seen.extend(table.keys().cloned());
    }
}

fn rename(table: AttributeMap) -> AttributesRenameAction {
    AttributesRenameAction::new(table)
}

fn compile_resource(all: &[&AttributeMap], defs: &[&VersionDef]) -> ResourceActions {
    let mut tables: Vec<AttributeMap> = all.iter().map(|t| (*t).clone()).collect();
    tables.extend(
        defs.iter()
            .flat_map(|def| &def.resources.changes)
            .filter_map(|change| change.rename_attributes.as_ref())
            .map(|mapping| mapping.attribute_map.clone()),
    );
    retain_last_wins(tables.iter_mut());

    ResourceActions::new(
        tables
            .into_iter()
            .filter(|t| !t.is_empty())
            .map(|t| ResourceAction::RenameAttributes(rename(t)))
            .collect(),
    )
}

fn compile_logs(all: &[&AttributeMap], defs: &[&VersionDef]) -> LogActions {
    let mut tables: Vec<AttributeMap> = all.iter().map(|t| (*t).clone()).collect();
    tables.extend(
        defs.iter()
            .flat_map(|def| &def.logs.changes)
            .filter_map(|change| change.rename_attributes.as_ref())
            .map(|r| r.attribute_map.clone()),
    );
    retain_last_wins(tables.iter_mut());

    LogActions::new(
        tables
            .into_iter()
            .filter(|t| !t.is_empty())
            .map(|t| LogAction::RenameAttributes(rename(t)))
            .collect(),
    )
}

fn names(list: &[String]) -> HashSet<String> {
    list.iter().cloned().collect()
}

fn compile_spans(all: &[&AttributeMap], defs: &[&VersionDef]) -> SpanActions {
    let mut spans: Vec<(HashSet<String>, AttributeMap)> = all
        .iter()
        .map(|t| (HashSet::new(), (*t).clone()))
        .collect();
    spans.extend(
        defs.iter()
            .flat_map(|def| &def.spans.changes)
            .filter_map(|change| change.rename_attributes.as_ref())
            .map(|r| (names(&r.apply_to_spans), r.attribute_map.clone())),
    );
    retain_last_wins(
        spans
            .iter_mut()
            .filter(|(scope, _)| scope.is_empty())
            .map(|(_, table)| table),
    );

    let span_actions = spans
        .into_iter()
        .filter(|(_, table)| !table.is_empty())
        .map(|(apply_to_spans, table)| SpanAction::RenameAttributes {
            apply_to_spans,
            rename: rename(table),
        })
        .collect();

    enum EventChange {
        Names(AttributeMap),
        Attributes {
            spans: HashSet<String>,
            events: HashSet<String>,
            table: AttributeMap,
        },
    }

    let mut events: Vec<EventChange> = all
        .iter()
        .map(|t| EventChange::Attributes {
            spans: HashSet::new(),
            events: HashSet::new(),
            table: (*t).clone(),
        })
        .collect();
    for change in defs.iter().flat_map(|def| &def.span_events.changes) {
        if let Some(r) = &change.rename_events {
            events.push(EventChange::Names(r.name_map.clone()));
        }
        if let Some(r) = &change.rename_attributes {
            events.push(EventChange::Attributes {
                spans: names(&r.apply_to_spans),
                events: names(&r.apply_to_events),
                table: r.attribute_map.clone(),
            });
        }
    }
    retain_last_wins(events.iter_mut().filter_map(|change| match change {
        EventChange::Attributes {
            spans,
            events,
            table,
        } if spans.is_empty() && events.is_empty() => Some(table),
        _ => None,
    }));

    let event_actions = events
        .into_iter()
        .filter_map(|change| match change {
            EventChange::Names(map) if !map.is_empty() => Some(SpanEventAction::RenameEvents {
                names: map.into_iter().collect(),
            }),
            EventChange::Attributes {
                spans,
                events,
                table,
            } if !table.is_empty() => Some(SpanEventAction::RenameAttributes {
                apply_to_spans: spans,
                apply_to_events: events,
                rename: rename(table),
            }),
            _ => None,
        })
        .collect();

    SpanActions::new(span_actions, event_actions)
}

enum MetricChange<'a> {
    Rename(BTreeMap<String, String>),
    Labels {
        scope: HashSet<String>,
        table: AttributeMap,
    },
    Split(&'a ast::SplitMetric),
    Merge(&'a ast::MergeMetric),
    ToDelta(HashSet<String>),
}

fn compile_metrics(
    all: &[&AttributeMap],
    defs: &[&VersionDef],
    version: &Version,
) -> Result<MetricActions, CompileError> {
    let mut changes: Vec<MetricChange<'_>> = all
        .iter()
        .map(|t| MetricChange::Labels {
            scope: HashSet::new(),
            table: (*t).clone(),
        })
        .collect();

    // Keys set on one change compile in field order.
    for change in defs.iter().flat_map(|def| &def.metrics.changes) {
        if !change.rename_metrics.is_empty() {
            changes.push(MetricChange::Rename(change.rename_metrics.clone()));
        }
        if let Some(r) = &change.rename_attributes {
            changes.push(MetricChange::Labels {
                scope: names(&r.apply_to_metrics),
                table: r.attribute_map.clone(),
            });
        }
        if let Some(split) = &change.split {
            changes.push(MetricChange::Split(split));
        }
        if let Some(merge) = &change.merge {
            changes.push(MetricChange::Merge(merge));
        }
        if !change.to_delta.is_empty() {
            changes.push(MetricChange::ToDelta(names(&change.to_delta)));
        }
    }

    retain_last_wins(changes.iter_mut().filter_map(|change| match change {
        MetricChange::Labels { scope, table } if scope.is_empty() => Some(table),
        _ => None,
    }));

    let mut stages = Vec::new();
    let mut pending: Vec<MetricAction> = Vec::new();
    let flush = |pending: &mut Vec<MetricAction>, stages: &mut Vec<MetricStage>| {
        if !pending.is_empty() {
            stages.push(MetricStage::PerMetric(MetricChain::new(std::mem::take(pending))));
        }
    };

    for change in changes {
        match change {
            MetricChange::Rename(map) => {
                pending.push(MetricAction::Rename(map.into_iter().collect()));
            }
            MetricChange::Labels { scope, table } => {
                if !table.is_empty() {
                    pending.push(MetricAction::RenameAttributes {
                        apply_to_metrics: scope,
                        rename: rename(table),
                    });
                }
            }
            MetricChange::ToDelta(metrics) => pending.push(MetricAction::ToDelta { metrics }),
            MetricChange::Split(split) => {
                require(version, "split", "apply_to_metric", &split.apply_to_metric)?;
                require(version, "split", "by_attribute", &split.by_attribute)?;
                if split.metrics_from_attributes.is_empty() {
                    continue;
                }
                flush(&mut pending, &mut stages);
                stages.push(MetricStage::Split(SplitAction::new(
                    split.apply_to_metric.clone(),
                    split.by_attribute.clone(),
                    &split.metrics_from_attributes,
                )));
            }
            MetricChange::Merge(merge) => {
                require(version, "merge", "create_metric", &merge.create_metric)?;
                require(version, "merge", "by_attribute", &merge.by_attribute)?;
                if merge.attributes_for_metrics.is_empty() {
                    continue;
                }
                flush(&mut pending, &mut stages);
                stages.push(MetricStage::Merge(MergeAction::new(
                    merge.create_metric.clone(),
                    merge.by_attribute.clone(),
                    merge.attributes_for_metrics.clone(),
                )));
            }
        }
    }
    flush(&mut pending, &mut stages);

    Ok(MetricActions::new(stages))
}

fn require(
    version: &Version,
    change: &'static str,
    field: &str,
    value: &str,
) -> Result<(), CompileError> {
    if value.is_empty() {
        return Err(CompileError::IncompleteChange {
            version: version.to_string(),
            change,
            reason: format!("{field} is empty"),
        });
    }
    Ok(())
}
