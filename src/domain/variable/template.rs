//! `{{name}}` templates rendered against a node's resolved inputs
//!
//! Supports:
//! - `{{name}}` - Input value
//! - `{{name.field[0]}}` - Nested access into an input
//! - `{{name:default}}` - Fallback when the input is missing or null

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::path::VariablePath;

/// Regex for template placeholders: {{name}}, {{name.path[0]}}, {{name:default}}
static PLACEHOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z0-9_\-]+)((?:\.[a-zA-Z0-9_\-]+|\[\d+\])*)\s*(?::([^}]*))?\}\}")
        .unwrap()
});

/// Renders every placeholder; unknown names render as their default or empty
pub fn render_template(template: &str, inputs: &Map<String, Value>) -> String {
    PLACEHOLDER_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let default = caps.get(3).map(|m| m.as_str());

            let value = inputs.get(name).and_then(|root| {
                if rest.is_empty() {
                    return Some(root.clone());
                }

                let field_path = rest.strip_prefix('.').unwrap_or(rest);
                VariablePath::from_parts(name, field_path)
                    .ok()
                    .and_then(|path| path.lookup(root).cloned())
            });

            match value {
                Some(value) if !value.is_null() => value_to_string(&value),
                _ => default.unwrap_or("").to_string(),
            }
        })
        .into_owned()
}

/// Names referenced by a template, in order of first appearance
pub fn placeholder_names(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for caps in PLACEHOLDER_PATTERN.captures_iter(template) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    names
}

/// Plain-text rendering of a JSON value
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),

        // For arrays and objects, use JSON representation
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs() -> Map<String, Value> {
        json!({
            "name": "Ada",
            "count": 3,
            "doc": {"items": [{"title": "first"}]},
            "empty": null
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_simple_placeholders() {
        assert_eq!(
            render_template("Hi {{name}}, you have {{ count }} items", &inputs()),
            "Hi Ada, you have 3 items"
        );
    }

    #[test]
    fn test_nested_placeholder() {
        assert_eq!(
            render_template("Top: {{doc.items[0].title}}", &inputs()),
            "Top: first"
        );
    }

    #[test]
    fn test_defaults_and_missing() {
        assert_eq!(render_template("{{missing:n/a}}", &inputs()), "n/a");
        assert_eq!(render_template("{{empty:none}}", &inputs()), "none");
        assert_eq!(render_template("[{{missing}}]", &inputs()), "[]");
    }

    #[test]
    fn test_structured_values_render_as_json() {
        assert_eq!(
            render_template("{{doc}}", &inputs()),
            r#"{"items":[{"title":"first"}]}"#
        );
    }

    #[test]
    fn test_placeholder_names() {
        assert_eq!(
            placeholder_names("{{a}} {{b.c}} {{a:x}}"),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
