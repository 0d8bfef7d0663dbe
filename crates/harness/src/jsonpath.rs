//! Column extraction from JSON lines via a restricted JSON-path subset.
//!
//! A jsonpaths file looks like `{"jsonpaths": ["$.id", "$['name']", "$.tags[0]"]}`.
//! Each expression must address at most one value: only `$`, `.name`,
//! `['name']` and `[n]` steps are accepted. Wildcards, slices, filters and
//! recursive descent are rejected when the expression is parsed.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    expression: String,
    steps: Vec<PathStep>,
}

impl JsonPath {
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// The single value addressed by this path, if present.
    pub fn find<'v>(&self, document: &'v Value) -> Option<&'v Value> {
        self.steps
            .iter()
            .try_fold(document, |current, step| match step {
                PathStep::Field(name) => current.as_object()?.get(name),
                PathStep::Index(index) => current.as_array()?.get(*index),
            })
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for JsonPath {
    type Err = HarnessError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            HarnessError::Value(format!("invalid JSONPath expression `{expression}`: {reason}"))
        };

        let mut rest = expression
            .trim()
            .strip_prefix('$')
            .ok_or_else(|| invalid("must start with `$`"))?;
        let mut steps = Vec::new();

        while !rest.is_empty() {
            if rest.starts_with("..") {
                return Err(invalid("recursive descent is not supported"));
            } else if let Some(after_dot) = rest.strip_prefix('.') {
                let end = after_dot
                    .find(|c: char| c == '.' || c == '[')
                    .unwrap_or(after_dot.len());
                let name = &after_dot[..end];
                if name.is_empty() {
                    return Err(invalid("empty field name"));
                }
                if name == "*" {
                    return Err(invalid("wildcards are not supported"));
                }
                steps.push(PathStep::Field(name.to_string()));
                rest = &after_dot[end..];
            } else if let Some(after_bracket) = rest.strip_prefix('[') {
                let end = after_bracket
                    .find(']')
                    .ok_or_else(|| invalid("unterminated `[`"))?;
                steps.push(parse_bracket(&after_bracket[..end]).ok_or_else(|| {
                    invalid("only ['name'] and [n] subscripts are supported")
                })?);
                rest = &after_bracket[end + 1..];
            } else {
                return Err(invalid("expected `.` or `[`"));
            }
        }

        Ok(Self {
            expression: expression.trim().to_string(),
            steps,
        })
    }
}

fn parse_bracket(inner: &str) -> Option<PathStep> {
    let inner = inner.trim();
    for quote in ['\'', '"'] {
        if let Some(name) = inner
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return Some(PathStep::Field(name.to_string()));
        }
    }
    inner.parse().ok().map(PathStep::Index)
}

#[derive(Debug, Deserialize)]
struct JsonPathsFile {
    jsonpaths: Vec<String>,
}

/// Applies an ordered list of [`JsonPath`] expressions to JSON documents.
#[derive(Debug, Clone)]
pub struct JsonPathExtractor {
    paths: Vec<JsonPath>,
}

impl JsonPathExtractor {
    pub fn new(paths: Vec<JsonPath>) -> HarnessResult<Self> {
        if paths.is_empty() {
            return Err(HarnessError::Value("no JSONPath expressions given".into()));
        }
        Ok(Self { paths })
    }

    /// Parse the contents of a jsonpaths file.
    pub fn from_json_str(contents: &str) -> HarnessResult<Self> {
        let file: JsonPathsFile = serde_json::from_str(contents)?;
        let paths = file
            .jsonpaths
            .iter()
            .map(|expression| expression.parse())
            .collect::<HarnessResult<Vec<JsonPath>>>()?;
        Self::new(paths)
    }

    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| HarnessError::Io {
            message: format!("cannot read jsonpaths file {}: {err}", path.display()),
            source: Some(err),
        })?;
        Self::from_json_str(&contents).map_err(|err| match err {
            HarnessError::Value(message) => {
                HarnessError::Value(format!("{message} (in {})", path.display()))
            }
            other => other,
        })
    }

    pub fn paths(&self) -> &[JsonPath] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// One entry per expression, in expression order. Missing values and JSON
    /// `null` become `None`.
    pub fn extract_value(&self, document: &Value) -> Vec<Option<String>> {
        let values: Vec<Option<String>> = self
            .paths
            .iter()
            .map(|path| match path.find(document) {
                None => {
                    warn!(%path, "JSON path returned no results");
                    None
                }
                Some(value) => column_text(value),
            })
            .collect();
        debug!(?values, "extracted row");
        values
    }

    /// Parse one JSON line and extract its values.
    pub fn extract(&self, line: &str) -> HarnessResult<Vec<Option<String>>> {
        let document: Value = serde_json::from_str(line)?;
        Ok(self.extract_value(&document))
    }
}

/// Strings as their raw text, other values as JSON text.
fn column_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PATHS: &str = r#"{
        "jsonpaths": ["$.key1", "$.key2", "$.key4", "$.key3"]
    }"#;

    #[test]
    fn test_values_follow_expression_order() {
        let extractor = JsonPathExtractor::from_json_str(PATHS).unwrap();

        let values = extractor
            .extract(
                r#"{
                    "key1": 999,
                    "key2": "test_string",
                    "key3": ["mixed", "types", {"a": "b"}, 999, [1, 2, 3]],
                    "key4": {"inner_key": "inner_test_value"}
                }"#,
            )
            .unwrap();

        assert_eq!(
            values,
            vec![
                Some("999".to_string()),
                Some("test_string".to_string()),
                Some(r#"{"inner_key":"inner_test_value"}"#.to_string()),
                Some(r#"["mixed","types",{"a":"b"},999,[1,2,3]]"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_keys_become_none() {
        let extractor = JsonPathExtractor::from_json_str(PATHS).unwrap();

        let values = extractor
            .extract(r#"{"key1": 999, "key4": {"inner_key": "inner_test_value"}}"#)
            .unwrap();

        assert_eq!(
            values,
            vec![
                Some("999".to_string()),
                None,
                Some(r#"{"inner_key":"inner_test_value"}"#.to_string()),
                None,
            ]
        );
    }

    #[test]
    fn test_nested_and_indexed_paths() {
        let document = json!({"user": {"names": ["ada", "grace"], "id": null}});

        let path: JsonPath = "$.user.names[1]".parse().unwrap();
        assert_eq!(path.find(&document), Some(&json!("grace")));

        let path: JsonPath = "$['user']['id']".parse().unwrap();
        assert_eq!(path.find(&document), Some(&Value::Null));

        let path: JsonPath = "$.user.names[5]".parse().unwrap();
        assert_eq!(path.find(&document), None);

        let root: JsonPath = "$".parse().unwrap();
        assert!(root.steps().is_empty());
        assert_eq!(root.find(&document), Some(&document));
    }

    #[test]
    fn test_null_value_becomes_none() {
        let extractor = JsonPathExtractor::new(vec!["$.a".parse().unwrap()]).unwrap();
        assert_eq!(extractor.extract_value(&json!({"a": null})), vec![None]);
    }

    #[test]
    fn test_unsupported_expressions_are_rejected() {
        for expression in ["$.*", "$..name", "$[*]", "$[0:2]", "name", "$.a[", "$.", "$a"] {
            let err = expression.parse::<JsonPath>().unwrap_err();
            assert!(
                matches!(err, HarnessError::Value(_)),
                "{expression} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_jsonpaths_is_value_error() {
        let err = JsonPathExtractor::from_json_str(r#"{"jsonpaths": []}"#).unwrap_err();
        assert!(matches!(err, HarnessError::Value(_)));
    }

    #[test]
    fn test_from_file_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paths.json");
        std::fs::write(&path, r#"{"jsonpaths": []}"#).unwrap();

        let err = JsonPathExtractor::from_file(&path).unwrap_err();

        assert!(err.to_string().contains("paths.json"));
    }

    #[test]
    fn test_malformed_line_is_json_error() {
        let extractor = JsonPathExtractor::from_json_str(PATHS).unwrap();
        assert!(matches!(
            extractor.extract("{not json"),
            Err(HarnessError::Json(_))
        ));
    }
}
