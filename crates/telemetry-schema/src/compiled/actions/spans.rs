use std::collections::{HashMap, HashSet};
use std::mem;

use opentelemetry_proto::tonic::trace::v1::Span;

use super::{AttributesRenameAction, Dispatch};
use crate::compiled::change_log::{ChangeLog, Entity, Location, UndoRecord};
use crate::compiled::ConversionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanAction {
    /// Rename span attributes. An empty `apply_to_spans` means every span.
    RenameAttributes {
        apply_to_spans: HashSet<String>,
        rename: AttributesRenameAction,
    },
}

impl SpanAction {
    fn scope(&self) -> &HashSet<String> {
        match self {
            Self::RenameAttributes { apply_to_spans, .. } => apply_to_spans,
        }
    }

    pub fn applies_to(&self, span_name: &str) -> bool {
        let scope = self.scope();
        scope.is_empty() || scope.contains(span_name)
    }

    pub fn apply(
        &self,
        index: usize,
        span: &mut Span,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        if !self.applies_to(&span.name) {
            return Ok(());
        }
        match self {
            Self::RenameAttributes { rename, .. } => rename.apply(
                &mut span.attributes,
                Location::local(Entity::Span(index)),
                changes,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanEventAction {
    RenameEvents {
        names: HashMap<String, String>,
    },
    /// Rename event attributes. Empty scopes match everything.
    RenameAttributes {
        apply_to_spans: HashSet<String>,
        apply_to_events: HashSet<String>,
        rename: AttributesRenameAction,
    },
}

impl SpanEventAction {
    /// Apply to every event of the span at `index`.
    pub fn apply(
        &self,
        index: usize,
        span: &mut Span,
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        let Span { name, events, .. } = span;
        match self {
            Self::RenameEvents { names } => {
                for (event_index, event) in events.iter_mut().enumerate() {
                    if let Some(new_name) = names.get(&event.name) {
                        let old = mem::replace(&mut event.name, new_name.clone());
                        changes.append(UndoRecord::RenameName {
                            location: Location::local(Entity::SpanEvent {
                                span: index,
                                event: event_index,
                            }),
                            name: old,
                        });
                    }
                }
                Ok(())
            }
            Self::RenameAttributes {
                apply_to_spans,
                apply_to_events,
                rename,
            } => {
                if !apply_to_spans.is_empty() && !apply_to_spans.contains(name.as_str()) {
                    return Ok(());
                }
                for (event_index, event) in events.iter_mut().enumerate() {
                    if !apply_to_events.is_empty() && !apply_to_events.contains(&event.name) {
                        continue;
                    }
                    rename.apply(
                        &mut event.attributes,
                        Location::local(Entity::SpanEvent {
                            span: index,
                            event: event_index,
                        }),
                        changes,
                    )?;
                }
                Ok(())
            }
        }
    }
}

/// Span and span event actions of one version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanActions {
    actions: Vec<SpanAction>,
    dispatch: Dispatch,
    events: Vec<SpanEventAction>,
}

impl SpanActions {
    /// Build the chain, indexing scoped actions by span name.
    pub fn new(actions: Vec<SpanAction>, events: Vec<SpanEventAction>) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for action in &actions {
            for name in action.scope() {
                by_name.entry(name.clone()).or_default();
            }
        }
        for (name, chain) in &mut by_name {
            chain.extend(
                actions
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| a.applies_to(name))
                    .map(|(i, _)| i),
            );
        }
        let fallback = actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.scope().is_empty())
            .map(|(i, _)| i)
            .collect();

        Self {
            actions,
            dispatch: Dispatch::new(by_name, fallback),
            events,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len() + self.events.len()
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Apply span actions and then event actions to each span in turn.
    pub fn apply(
        &self,
        spans: &mut [Span],
        changes: &mut ChangeLog,
    ) -> Result<(), ConversionError> {
        if self.is_empty() {
            return Ok(());
        }
        for (index, span) in spans.iter_mut().enumerate() {
            for &action in self.dispatch.for_name(&span.name) {
                self.actions[action].apply(index, span, changes)?;
            }
            for action in &self.events {
                action.apply(index, span, changes)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
    use opentelemetry_proto::tonic::trace::v1::span;

    fn make_kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(value.to_string())),
            }),
        }
    }

    fn rename(from: &str, to: &str) -> AttributesRenameAction {
        AttributesRenameAction::new([(from.to_owned(), to.to_owned())])
    }

    fn make_span(name: &str, attrs: &[&str]) -> Span {
        Span {
            name: name.to_string(),
            attributes: attrs.iter().map(|k| make_kv(k, "v")).collect(),
            ..Default::default()
        }
    }

    fn scope(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| (*n).to_owned()).collect()
    }

    #[test]
    fn scoped_rename_only_touches_named_spans() {
        let actions = SpanActions::new(
            vec![
                SpanAction::RenameAttributes {
                    apply_to_spans: scope(&["checkout"]),
                    rename: rename("a", "b"),
                },
                SpanAction::RenameAttributes {
                    apply_to_spans: HashSet::new(),
                    rename: rename("x", "y"),
                },
            ],
            Vec::new(),
        );
        let mut spans = vec![make_span("checkout", &["a", "x"]), make_span("other", &["a", "x"])];
        let mut changes = ChangeLog::new();

        actions.apply(&mut spans, &mut changes).unwrap();

        assert_eq!(spans[0].attributes[0].key, "b");
        assert_eq!(spans[0].attributes[1].key, "y");
        assert_eq!(spans[1].attributes[0].key, "a");
        assert_eq!(spans[1].attributes[1].key, "y");
        assert_eq!(actions.dispatch().for_name("checkout"), &[0, 1]);
        assert_eq!(actions.dispatch().fallback(), &[1]);
    }

    #[test]
    fn event_rename_then_scoped_attribute_rename() {
        let actions = SpanActions::new(
            Vec::new(),
            vec![
                SpanEventAction::RenameEvents {
                    names: [("exception".to_owned(), "error".to_owned())]
                        .into_iter()
                        .collect(),
                },
                SpanEventAction::RenameAttributes {
                    apply_to_spans: HashSet::new(),
                    apply_to_events: scope(&["error"]),
                    rename: rename("message", "error.message"),
                },
            ],
        );
        let mut spans = vec![Span {
            name: "handler".to_owned(),
            events: vec![
                span::Event {
                    name: "exception".to_owned(),
                    attributes: vec![make_kv("message", "boom")],
                    ..Default::default()
                },
                span::Event {
                    name: "log".to_owned(),
                    attributes: vec![make_kv("message", "hi")],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }];
        let original = spans.clone();
        let mut changes = ChangeLog::new();

        actions.apply(&mut spans, &mut changes).unwrap();

        assert_eq!(spans[0].events[0].name, "error");
        assert_eq!(spans[0].events[0].attributes[0].key, "error.message");
        assert_eq!(spans[0].events[1].attributes[0].key, "message");

        changes.rollback(spans.as_mut_slice());
        assert_eq!(spans, original);
    }

    #[test]
    fn failure_stops_at_first_conflicting_span() {
        let actions = SpanActions::new(
            vec![SpanAction::RenameAttributes {
                apply_to_spans: HashSet::new(),
                rename: rename("a", "b"),
            }],
            Vec::new(),
        );
        let mut spans = vec![
            make_span("one", &["a"]),
            make_span("two", &["a", "b"]),
            make_span("three", &["a"]),
        ];
        let mut changes = ChangeLog::new();

        let result = actions.apply(&mut spans, &mut changes);

        assert!(result.is_err());
        assert_eq!(spans[0].attributes[0].key, "b");
        assert_eq!(spans[2].attributes[0].key, "a");
    }
}
