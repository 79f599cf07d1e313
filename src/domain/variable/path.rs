//! Typed variable paths: `node.outputs.field`, `node.arr[0].x`

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::VariableError;

/// Optional segment between the node id and the field path
const OUTPUTS_SEGMENT: &str = "outputs";

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Producer id plus the chain of segments inside its outputs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariablePath {
    pub node_id: String,
    pub segments: Vec<PathSegment>,
}

impl VariablePath {
    /// Parses `node-id.outputs.field[0].x`; the `outputs` segment is optional
    pub fn parse(expression: &str) -> Result<Self, VariableError> {
        let (node_id, rest) = match expression.split_once('.') {
            Some((node_id, rest)) => (node_id, rest),
            None => (expression, ""),
        };

        // A lone trailing `outputs` is a field of that name
        let rest = match rest.split_once('.') {
            Some((OUTPUTS_SEGMENT, tail)) if !tail.is_empty() => tail,
            _ => rest,
        };

        Self::from_parts(node_id, rest)
    }

    /// Builds a path from a producer id and a field path relative to its outputs
    pub fn from_parts(node_id: &str, field_path: &str) -> Result<Self, VariableError> {
        if node_id.trim().is_empty() {
            return Err(VariableError::invalid_path(format!(
                "missing node id in '{}'",
                field_path
            )));
        }

        Ok(Self {
            node_id: node_id.to_string(),
            segments: parse_segments(field_path)?,
        })
    }

    /// First field name, used to check against declared outputs
    pub fn head(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Field(name)) => Some(name),
            _ => None,
        }
    }

    /// Walks the segments through the producer's outputs
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;

        for segment in &self.segments {
            current = match (segment, current) {
                (PathSegment::Field(name), Value::Object(map)) => map.get(name)?,
                (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
                // Numeric field names address arrays too, e.g. `items.0`
                (PathSegment::Field(name), Value::Array(items)) => {
                    items.get(name.parse::<usize>().ok()?)?
                }
                _ => return None,
            };
        }

        Some(current)
    }
}

impl fmt::Display for VariablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_id)?;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => write!(f, ".{}", name)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

fn parse_segments(field_path: &str) -> Result<Vec<PathSegment>, VariableError> {
    let mut segments = Vec::new();

    if field_path.is_empty() {
        return Ok(segments);
    }

    for part in field_path.split('.') {
        let (name, mut indexes) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if name.is_empty() && indexes.is_empty() {
            return Err(VariableError::invalid_path(format!(
                "empty segment in '{}'",
                field_path
            )));
        }

        if !name.is_empty() {
            segments.push(PathSegment::Field(name.to_string()));
        }

        while !indexes.is_empty() {
            let close = indexes.find(']').ok_or_else(|| {
                VariableError::invalid_path(format!("unclosed index in '{}'", field_path))
            })?;

            let index = indexes[1..close].trim().parse::<usize>().map_err(|_| {
                VariableError::invalid_path(format!(
                    "index '{}' is not a number in '{}'",
                    &indexes[1..close],
                    field_path
                ))
            })?;

            segments.push(PathSegment::Index(index));
            indexes = &indexes[close + 1..];

            if !indexes.is_empty() && !indexes.starts_with('[') {
                return Err(VariableError::invalid_path(format!(
                    "unexpected '{}' in '{}'",
                    indexes, field_path
                )));
            }
        }
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_with_outputs_segment() {
        let path = VariablePath::parse("spark-llm::1.outputs.answer").unwrap();
        assert_eq!(path.node_id, "spark-llm::1");
        assert_eq!(path.segments, vec![PathSegment::Field("answer".into())]);
    }

    #[test]
    fn test_trailing_outputs_is_a_field() {
        let path = VariablePath::parse("code::1.outputs").unwrap();
        assert_eq!(path.segments, vec![PathSegment::Field("outputs".into())]);

        let produced = json!({"outputs": ["a", "b"], "count": 2});
        assert_eq!(path.lookup(&produced), Some(&json!(["a", "b"])));

        let nested = VariablePath::parse("code::1.outputs.outputs").unwrap();
        assert_eq!(nested.segments, vec![PathSegment::Field("outputs".into())]);
    }

    #[test]
    fn test_parse_indexed() {
        let path = VariablePath::parse("knowledge-base::1.results[0].title").unwrap();
        assert_eq!(
            path.segments,
            vec![
                PathSegment::Field("results".into()),
                PathSegment::Index(0),
                PathSegment::Field("title".into()),
            ]
        );
        assert_eq!(path.to_string(), "knowledge-base::1.results[0].title");
        assert_eq!(path.head(), Some("results"));
    }

    #[test]
    fn test_parse_nested_indexes() {
        let path = VariablePath::from_parts("code::1", "grid[1][2]").unwrap();
        assert_eq!(
            path.segments,
            vec![
                PathSegment::Field("grid".into()),
                PathSegment::Index(1),
                PathSegment::Index(2),
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(VariablePath::from_parts("a", "items[x]").is_err());
        assert!(VariablePath::from_parts("a", "items[0").is_err());
        assert!(VariablePath::from_parts("a", "items..x").is_err());
        assert!(VariablePath::from_parts("", "x").is_err());
        assert!(VariablePath::from_parts("a", "items[0]x").is_err());
    }

    #[test]
    fn test_lookup() {
        let outputs = json!({"results": [{"title": "a"}, {"title": "b"}], "count": 2});

        let path = VariablePath::from_parts("n", "results[1].title").unwrap();
        assert_eq!(path.lookup(&outputs), Some(&json!("b")));

        let path = VariablePath::from_parts("n", "results.0.title").unwrap();
        assert_eq!(path.lookup(&outputs), Some(&json!("a")));

        let path = VariablePath::from_parts("n", "results[5]").unwrap();
        assert_eq!(path.lookup(&outputs), None);

        let path = VariablePath::from_parts("n", "").unwrap();
        assert_eq!(path.lookup(&outputs), Some(&outputs));
    }
}
