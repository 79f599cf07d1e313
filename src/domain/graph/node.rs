//! Node specifications

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::retry::RetryConfig;
use crate::domain::workflow::WorkflowError;

/// Closed set of node types understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeType {
    Start,
    End,
    Llm,
    KnowledgeBase,
    KnowledgePro,
    IfElse,
    Code,
    DecisionMaking,
    Iteration,
    IterationStart,
    IterationEnd,
    ParameterExtractor,
    TextJoiner,
    Flow,
    Message,
    Agent,
    Plugin,
    QuestionAnswer,
    Database,
    Rpa,
    GlobalVariables,
}

impl NodeType {
    pub const ALL: [NodeType; 21] = [
        NodeType::Start,
        NodeType::End,
        NodeType::Llm,
        NodeType::KnowledgeBase,
        NodeType::KnowledgePro,
        NodeType::IfElse,
        NodeType::Code,
        NodeType::DecisionMaking,
        NodeType::Iteration,
        NodeType::IterationStart,
        NodeType::IterationEnd,
        NodeType::ParameterExtractor,
        NodeType::TextJoiner,
        NodeType::Flow,
        NodeType::Message,
        NodeType::Agent,
        NodeType::Plugin,
        NodeType::QuestionAnswer,
        NodeType::Database,
        NodeType::Rpa,
        NodeType::GlobalVariables,
    ];

    /// Wire tag used in DSL documents and node id prefixes
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "node-start",
            NodeType::End => "node-end",
            NodeType::Llm => "spark-llm",
            NodeType::KnowledgeBase => "knowledge-base",
            NodeType::KnowledgePro => "knowledge-pro-base",
            NodeType::IfElse => "if-else",
            NodeType::Code => "ifly-code",
            NodeType::DecisionMaking => "decision-making",
            NodeType::Iteration => "iteration",
            NodeType::IterationStart => "iteration-node-start",
            NodeType::IterationEnd => "iteration-node-end",
            NodeType::ParameterExtractor => "extractor-parameter",
            NodeType::TextJoiner => "text-joiner",
            NodeType::Flow => "flow",
            NodeType::Message => "message",
            NodeType::Agent => "agent",
            NodeType::Plugin => "plugin",
            NodeType::QuestionAnswer => "question-answer",
            NodeType::Database => "database",
            NodeType::Rpa => "rpa",
            NodeType::GlobalVariables => "node-variable",
        }
    }

    /// Derives the type from a node id of the form `<type>::<suffix>`
    pub fn from_node_id(id: &str) -> Option<Self> {
        let (prefix, _) = id.split_once("::")?;
        prefix.parse().ok()
    }

    /// Entry node of a scope (run start or iteration start)
    pub fn is_scope_entry(&self) -> bool {
        matches!(self, NodeType::Start | NodeType::IterationStart)
    }

    /// Exit node of a scope (run end or iteration end)
    pub fn is_scope_exit(&self) -> bool {
        matches!(self, NodeType::End | NodeType::IterationEnd)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| WorkflowError::validation(format!("Unknown node type: {}", s)))
    }
}

impl TryFrom<String> for NodeType {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeType> for String {
    fn from(value: NodeType) -> Self {
        value.as_str().to_string()
    }
}

/// Reference to another node's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    pub node_id: String,
    /// Field path inside the producer's outputs, e.g. `items[0].title`
    pub name: String,
}

/// Value of an input binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ValueSpec {
    /// Resolved lazily against the variable pool
    Ref(NodeRef),
    /// Used as-is
    Literal(Value),
}

/// Named input of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBinding {
    pub name: String,
    pub value: ValueSpec,
}

impl InputBinding {
    pub fn reference(
        name: impl Into<String>,
        node_id: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: ValueSpec::Ref(NodeRef {
                node_id: node_id.into(),
                name: path.into(),
            }),
        }
    }

    pub fn literal(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: ValueSpec::Literal(value),
        }
    }
}

/// Declared output of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default)]
    pub required: bool,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Default value declared in the schema, if any
    pub fn default_value(&self) -> Option<&Value> {
        self.schema.as_ref().and_then(|s| s.get("default"))
    }
}

/// A node as it appears in a DSL document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub id: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,

    #[serde(default)]
    pub alias: String,

    #[serde(default)]
    pub inputs: Vec<InputBinding>,

    #[serde(default)]
    pub outputs: Vec<OutputSpec>,

    #[serde(default)]
    pub params: Map<String, Value>,

    #[serde(default)]
    pub retry_config: RetryConfig,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type: Some(node_type),
            alias: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: Map::new(),
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_input(mut self, input: InputBinding) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: OutputSpec) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Explicit type, falling back to the id prefix
    pub fn resolved_type(&self) -> Result<NodeType, WorkflowError> {
        if let Some(node_type) = self.node_type {
            return Ok(node_type);
        }

        NodeType::from_node_id(&self.id).ok_or_else(|| {
            WorkflowError::validation(format!(
                "Node '{}' has no type and its id carries no known type prefix",
                self.id
            ))
        })
    }

    /// String parameter lookup
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.name.as_str())
    }

    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.id
        } else {
            &self.alias
        }
    }
}
