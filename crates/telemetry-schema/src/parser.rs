//! Schema file loading.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::ast::Schema;
use crate::SchemaError;

/// Parse a schema from YAML text.
pub fn parse_str(text: &str) -> Result<Schema, SchemaError> {
    Ok(serde_yaml::from_str(text)?)
}

/// Read and parse a schema file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Schema, SchemaError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let schema = parse_str(&text)?;
    debug!(
        path = %path.display(),
        versions = schema.versions.len(),
        "parsed schema file"
    );
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_file_reads_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "file_format: 1.0.0\n\
             schema_url: https://example.com/schemas/1.0.0\n\
             versions:\n  1.0.0:\n"
        )
        .unwrap();

        let schema = parse_file(file.path()).unwrap();
        assert_eq!(schema.file_format, "1.0.0");
        assert_eq!(schema.versions.len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = parse_file("/nonexistent/schema.yaml").unwrap_err();
        assert!(matches!(err, SchemaError::Io(_)));
    }

    #[test]
    fn malformed_yaml_is_yaml_error() {
        let err = parse_str("versions: [unclosed").unwrap_err();
        assert!(matches!(err, SchemaError::Yaml(_)));
    }
}
