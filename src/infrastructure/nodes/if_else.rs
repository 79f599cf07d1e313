//! `if-else` node - selects the out-edge of the first matching case

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::graph::DEFAULT_BRANCH;
use crate::domain::node::{NodeCapabilities, NodeContext, NodeError, NodeExecutor, NodeRunResult};
use crate::domain::variable::value_to_string;

/// Parameter holding the list of cases
pub const CASES_PARAM: &str = "cases";

/// Output key carrying the selected branch
pub const BRANCH_OUTPUT: &str = "branch";

/// Level of the catch-all case
pub const DEFAULT_CASE_LEVEL: u32 = 999;

/// Comparison applied to one resolved input
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompareOperator {
    Contains,
    NotContains,
    StartWith,
    EndWith,
    /// Text equality
    Is,
    IsNot,
    Empty,
    NotEmpty,
    /// Numeric equality, falling back to value equality
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Null,
    NotNull,
}

impl CompareOperator {
    pub fn evaluate(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            Self::Contains => contains(actual, expected),
            Self::NotContains => !contains(actual, expected),
            Self::StartWith => value_to_string(actual).starts_with(&value_to_string(expected)),
            Self::EndWith => value_to_string(actual).ends_with(&value_to_string(expected)),
            Self::Is => value_to_string(actual) == value_to_string(expected),
            Self::IsNot => value_to_string(actual) != value_to_string(expected),
            Self::Empty => is_empty(actual),
            Self::NotEmpty => !is_empty(actual),
            Self::Eq => equals(actual, expected),
            Self::Ne => !equals(actual, expected),
            Self::Gt => compare_numbers(actual, expected, |a, b| a > b),
            Self::Ge => compare_numbers(actual, expected, |a, b| a >= b),
            Self::Lt => compare_numbers(actual, expected, |a, b| a < b),
            Self::Le => compare_numbers(actual, expected, |a, b| a <= b),
            Self::Null => actual.is_null(),
            Self::NotNull => !actual.is_null(),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_numbers<F>(a: &Value, b: &Value, f: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (as_number(a), as_number(b)) {
        (Some(a), Some(b)) => f(a, b),
        _ => false,
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(arr) => arr.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

fn contains(field: &Value, value: &Value) -> bool {
    match field {
        Value::String(s) => s.contains(&value_to_string(value)),
        Value::Array(arr) => arr.contains(value),
        Value::Object(obj) => value.as_str().is_some_and(|key| obj.contains_key(key)),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// One comparison of a case
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Name of the resolved input to inspect
    pub var: String,
    pub compare_operator: CompareOperator,
    #[serde(default)]
    pub value: Value,
}

/// A branch candidate; the case id is the branch class of its out-edge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IfElseCase {
    pub id: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

fn default_level() -> u32 {
    DEFAULT_CASE_LEVEL
}

impl IfElseCase {
    /// A case without conditions always matches
    pub fn matches(&self, inputs: &Map<String, Value>) -> bool {
        if self.conditions.is_empty() {
            return true;
        }

        let mut results = self.conditions.iter().map(|condition| {
            let actual = inputs.get(&condition.var).unwrap_or(&Value::Null);
            condition.compare_operator.evaluate(actual, &condition.value)
        });

        match self.logical_operator {
            LogicalOperator::And => results.all(|matched| matched),
            LogicalOperator::Or => results.any(|matched| matched),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IfElseNode;

impl IfElseNode {
    pub fn new() -> Self {
        Self
    }

    fn cases(ctx: &NodeContext) -> Result<Vec<IfElseCase>, NodeError> {
        let raw = ctx
            .node()
            .params
            .get(CASES_PARAM)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));

        let mut cases: Vec<IfElseCase> = serde_json::from_value(raw).map_err(|e| {
            NodeError::invalid_input(format!("Invalid cases of '{}': {}", ctx.node_id(), e))
        })?;

        cases.sort_by_key(|case| case.level);
        Ok(cases)
    }
}

#[async_trait]
impl NodeExecutor for IfElseNode {
    fn capabilities(&self) -> NodeCapabilities {
        NodeCapabilities::default().branching()
    }

    async fn execute(
        &self,
        ctx: &NodeContext,
        inputs: Map<String, Value>,
    ) -> Result<NodeRunResult, NodeError> {
        let branch = Self::cases(ctx)?
            .into_iter()
            .find(|case| case.matches(&inputs))
            .map(|case| case.id)
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        let mut outputs = Map::new();
        outputs.insert(BRANCH_OUTPUT.to_string(), Value::String(branch.clone()));

        Ok(NodeRunResult::succeeded(outputs).with_edge_source_handle(branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::domain::graph::{NodeSpec, NodeType};

    fn ctx(cases: Value) -> NodeContext {
        let node = NodeSpec::new("if-else::1", NodeType::IfElse).with_param(CASES_PARAM, cases);
        NodeContext::new(Arc::new(node), NodeType::IfElse, "run-1")
    }

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_operators() {
        assert!(CompareOperator::Contains.evaluate(&json!("hello world"), &json!("world")));
        assert!(CompareOperator::NotContains.evaluate(&json!(["a"]), &json!("b")));
        assert!(CompareOperator::StartWith.evaluate(&json!("hello"), &json!("he")));
        assert!(CompareOperator::EndWith.evaluate(&json!("hello"), &json!("lo")));
        assert!(CompareOperator::Is.evaluate(&json!(5), &json!("5")));
        assert!(CompareOperator::IsNot.evaluate(&json!("a"), &json!("b")));
        assert!(CompareOperator::Empty.evaluate(&json!([]), &Value::Null));
        assert!(CompareOperator::NotEmpty.evaluate(&json!({"a": 1}), &Value::Null));
        assert!(CompareOperator::Eq.evaluate(&json!("3.0"), &json!(3)));
        assert!(CompareOperator::Ne.evaluate(&json!(1), &json!(2)));
        assert!(CompareOperator::Gt.evaluate(&json!(10), &json!(5)));
        assert!(CompareOperator::Ge.evaluate(&json!(5), &json!(5)));
        assert!(CompareOperator::Lt.evaluate(&json!("1"), &json!(2)));
        assert!(CompareOperator::Le.evaluate(&json!(2), &json!(2)));
        assert!(CompareOperator::Null.evaluate(&Value::Null, &Value::Null));
        assert!(CompareOperator::NotNull.evaluate(&json!(0), &Value::Null));
        assert!(!CompareOperator::Gt.evaluate(&json!("abc"), &json!(1)));
    }

    #[tokio::test]
    async fn test_first_matching_case_by_level() {
        let ctx = ctx(json!([
            {"id": "otherwise", "level": 999},
            {"id": "big", "level": 1, "conditions": [
                {"var": "n", "compareOperator": "gt", "value": 100}
            ]},
            {"id": "positive", "level": 2, "conditions": [
                {"var": "n", "compareOperator": "gt", "value": 0}
            ]}
        ]));

        let result = IfElseNode.execute(&ctx, inputs(json!({"n": 5}))).await.unwrap();

        assert_eq!(result.edge_source_handle.as_deref(), Some("positive"));
        assert_eq!(result.outputs[BRANCH_OUTPUT], json!("positive"));
    }

    #[tokio::test]
    async fn test_or_conditions() {
        let ctx = ctx(json!([
            {"id": "greeting", "level": 1, "logicalOperator": "or", "conditions": [
                {"var": "text", "compareOperator": "start_with", "value": "hi"},
                {"var": "text", "compareOperator": "start_with", "value": "hello"}
            ]}
        ]));

        let result = IfElseNode
            .execute(&ctx, inputs(json!({"text": "hello there"})))
            .await
            .unwrap();

        assert_eq!(result.edge_source_handle.as_deref(), Some("greeting"));
    }

    #[tokio::test]
    async fn test_no_match_selects_default_branch() {
        let ctx = ctx(json!([
            {"id": "yes", "level": 1, "conditions": [
                {"var": "flag", "compareOperator": "is", "value": "true"}
            ]}
        ]));

        let result = IfElseNode
            .execute(&ctx, inputs(json!({"flag": false})))
            .await
            .unwrap();

        assert_eq!(result.edge_source_handle.as_deref(), Some(DEFAULT_BRANCH));
    }

    #[tokio::test]
    async fn test_malformed_cases() {
        let ctx = ctx(json!([{"level": 1}]));

        let err = IfElseNode.execute(&ctx, Map::new()).await.unwrap_err();

        assert!(err.message.starts_with("Invalid cases of 'if-else::1'"));
    }
}
