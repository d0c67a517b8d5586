//! Declarative schema definition.
//!
//! These types mirror the schema file format: a list of versions, each
//! holding per-section lists of changes. They carry no behaviour; the
//! [`compiler`](crate::compiler) turns them into executable actions.
//!
//! ```yaml
//! file_format: 1.0.0
//! schema_url: https://opentelemetry.io/schemas/1.1.0
//! versions:
//!   1.1.0:
//!     all:
//!       changes:
//!         - rename_attributes:
//!             attribute_map:
//!               k8s.cluster.name: kubernetes.cluster.name
//!   1.0.0:
//! ```

mod logs;
mod metrics;
mod spans;

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

pub use self::logs::{LogTranslationAction, RenameLogAttributes, VersionOfLogs};
pub use self::metrics::{
    AttributeMapForMetrics, MergeMetric, MetricTranslationAction, SplitMetric, VersionOfMetrics,
};
pub use self::spans::{
    RenameSpanAttributes, RenameSpanEventAttributes, RenameSpanEvents, SpanEventTranslationAction,
    SpanTranslationAction, VersionOfSpanEvents, VersionOfSpans,
};

/// Old name to new name.
pub type AttributeMap = BTreeMap<String, String>;

/// A complete schema file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Schema {
    /// Schema file format version.
    pub file_format: String,

    /// URL identifying the latest version this schema describes.
    pub schema_url: String,

    /// Versions in declaration order.
    #[serde(deserialize_with = "ordered_versions")]
    pub versions: Vec<(String, VersionDef)>,
}

impl Schema {
    /// Look up a version definition by its exact spelling.
    pub fn version(&self, name: &str) -> Option<&VersionDef> {
        self.versions
            .iter()
            .find(|(v, _)| v == name)
            .map(|(_, def)| def)
    }
}

/// The changes introduced by one version, grouped by section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VersionDef {
    /// Attribute changes that apply to every kind of telemetry.
    pub all: VersionOfAttributes,
    pub resources: VersionOfAttributes,
    pub spans: VersionOfSpans,
    pub span_events: VersionOfSpanEvents,
    pub metrics: VersionOfMetrics,
    pub logs: VersionOfLogs,
}

/// Changes of the `all` and `resources` sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VersionOfAttributes {
    pub changes: Vec<AttributeTranslationAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttributeTranslationAction {
    pub rename_attributes: Option<MappingOfAttributes>,
}

/// Rename table that accepts both `{attribute_map: {..}}` and a bare map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "MappingRepr")]
pub struct MappingOfAttributes {
    pub attribute_map: AttributeMap,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MappingRepr {
    Wrapped { attribute_map: AttributeMap },
    Bare(AttributeMap),
}

impl From<MappingRepr> for MappingOfAttributes {
    fn from(repr: MappingRepr) -> Self {
        match repr {
            MappingRepr::Wrapped { attribute_map } | MappingRepr::Bare(attribute_map) => {
                Self { attribute_map }
            }
        }
    }
}

/// YAML mappings lose their order in a `HashMap`; versions must keep it so
/// that redeclarations of the same version merge in file order.
fn ordered_versions<'de, D>(deserializer: D) -> Result<Vec<(String, VersionDef)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedVersions;

    impl<'de> Visitor<'de> for OrderedVersions {
        type Value = Vec<(String, VersionDef)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of version to version definition")
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut versions = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, def)) = map.next_entry::<VersionKey, Option<VersionDef>>()? {
                versions.push((key.0, def.unwrap_or_default()));
            }
            Ok(versions)
        }
    }

    deserializer.deserialize_map(OrderedVersions)
}

/// Version keys may be written unquoted. Read as strings, YAML keeps their
/// spelling, so `1.10` stays distinct from `1.1`.
struct VersionKey(String);

impl<'de> Deserialize<'de> for VersionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = VersionKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a version string")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(VersionKey(v.to_owned()))
            }

            fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(VersionKey(v))
            }
        }

        deserializer.deserialize_str(KeyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_keep_declaration_order() {
        let yaml = r#"
file_format: 1.0.0
schema_url: https://example.com/schemas/1.2.0
versions:
  1.2.0:
    resources:
      changes:
        - rename_attributes:
            attribute_map:
              a: b
  1.0.0:
  1.1.0: {}
"#;
        let schema: Schema = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<_> = schema.versions.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(names, ["1.2.0", "1.0.0", "1.1.0"]);
        assert_eq!(schema.schema_url, "https://example.com/schemas/1.2.0");

        let def = schema.version("1.2.0").unwrap();
        let rename = def.resources.changes[0].rename_attributes.as_ref().unwrap();
        assert_eq!(rename.attribute_map.get("a").map(String::as_str), Some("b"));
    }

    #[test]
    fn rename_attributes_accepts_bare_map() {
        let yaml = r#"
versions:
  1.1.0:
    all:
      changes:
        - rename_attributes:
            k8s.cluster.name: kubernetes.cluster.name
"#;
        let schema: Schema = serde_yaml::from_str(yaml).unwrap();
        let rename = schema.versions[0].1.all.changes[0]
            .rename_attributes
            .clone()
            .unwrap();
        assert_eq!(
            rename.attribute_map.get("k8s.cluster.name").map(String::as_str),
            Some("kubernetes.cluster.name")
        );
    }

    #[test]
    fn unquoted_numeric_version_keys() {
        let yaml = "versions:\n  1.0:\n  2:\n  1.10:\n";
        let schema: Schema = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<_> = schema.versions.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(names, ["1.0", "2", "1.10"]);
    }

    #[test]
    fn empty_document_sections_default() {
        let schema: Schema = serde_yaml::from_str("file_format: 1.0.0").unwrap();
        assert!(schema.versions.is_empty());
        assert!(schema.schema_url.is_empty());
    }
}
