use std::fmt::{self, Display};

use serde::{de::Deserializer, ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_json::Value;

/// A single predicate over blob metadata.
///
/// `And` and `Or` are strictly binary. Longer chains are nested binary nodes,
/// folded to the left by both the builder and the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionNode {
    /// Blobs carrying the tag.
    Tag(String),
    /// Blobs whose metadata field `key` equals `value`.
    KeyValue { key: String, value: String },
    /// Blobs that have the metadata field, whatever its value.
    HasKey(String),
    /// Blobs whose parent set contains the id.
    Parent(String),
    And(Box<ExpressionNode>, Box<ExpressionNode>),
    Or(Box<ExpressionNode>, Box<ExpressionNode>),
    Not(Box<ExpressionNode>),
}

impl ExpressionNode {
    pub fn and(lhs: ExpressionNode, rhs: ExpressionNode) -> Self {
        ExpressionNode::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: ExpressionNode, rhs: ExpressionNode) -> Self {
        ExpressionNode::Or(Box::new(lhs), Box::new(rhs))
    }

    pub fn negate(inner: ExpressionNode) -> Self {
        ExpressionNode::Not(Box::new(inner))
    }
}

impl Serialize for ExpressionNode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ExpressionNode::Tag(tag) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("tag", tag)?;
                map.end()
            }
            ExpressionNode::KeyValue { key, value } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("key", key)?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            ExpressionNode::HasKey(key) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("key", key)?;
                map.end()
            }
            ExpressionNode::Parent(parent) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("parent", parent)?;
                map.end()
            }
            ExpressionNode::And(lhs, rhs) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("and", &[lhs.as_ref(), rhs.as_ref()])?;
                map.end()
            }
            ExpressionNode::Or(lhs, rhs) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("or", &[lhs.as_ref(), rhs.as_ref()])?;
                map.end()
            }
            ExpressionNode::Not(inner) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("not", inner.as_ref())?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ExpressionNode {
    fn deserialize<D>(deserializer: D) -> Result<ExpressionNode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        crate::expression_parse::parse_node(&raw).map_err(serde::de::Error::custom)
    }
}

impl Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionNode::Tag(tag) => write!(f, "tag:{tag}"),
            ExpressionNode::KeyValue { key, value } => write!(f, "{key}={value}"),
            ExpressionNode::HasKey(key) => write!(f, "has:{key}"),
            ExpressionNode::Parent(parent) => write!(f, "parent:{parent}"),
            ExpressionNode::And(lhs, rhs) => write!(f, "({lhs} && {rhs})"),
            ExpressionNode::Or(lhs, rhs) => write!(f, "({lhs} || {rhs})"),
            ExpressionNode::Not(inner) => write!(f, "!{inner}"),
        }
    }
}

/// A structured query expression.
///
/// An empty expression matches every blob. Every `and_*`/`or_*` call installs
/// its condition as the root when the expression is empty, and otherwise
/// makes a new binary node whose left operand is the previous root and whose
/// right operand is the new condition:
///
/// ```
/// use payload::{Expression, ExpressionNode};
///
/// let expr = Expression::new().and_tag("a").and_has_key("b");
/// assert_eq!(
///     expr.root(),
///     Some(&ExpressionNode::and(
///         ExpressionNode::Tag("a".to_string()),
///         ExpressionNode::HasKey("b".to_string()),
///     ))
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expression {
    root: Option<ExpressionNode>,
}

impl Expression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&ExpressionNode> {
        self.root.as_ref()
    }

    pub fn into_root(self) -> Option<ExpressionNode> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    fn and_node(self, node: ExpressionNode) -> Self {
        let root = match self.root {
            Some(root) => ExpressionNode::and(root, node),
            None => node,
        };
        Self { root: Some(root) }
    }

    fn or_node(self, node: ExpressionNode) -> Self {
        let root = match self.root {
            Some(root) => ExpressionNode::or(root, node),
            None => node,
        };
        Self { root: Some(root) }
    }

    /// ANDs a tag condition with the expression.
    pub fn and_tag(self, tag: impl Into<String>) -> Self {
        self.and_node(ExpressionNode::Tag(tag.into()))
    }

    /// ANDs a key/value condition with the expression.
    pub fn and_key_value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.and_node(ExpressionNode::KeyValue {
            key: key.into(),
            value: value.into(),
        })
    }

    /// ANDs a "has key" condition with the expression.
    pub fn and_has_key(self, key: impl Into<String>) -> Self {
        self.and_node(ExpressionNode::HasKey(key.into()))
    }

    /// ANDs a parent condition with the expression.
    pub fn and_parent(self, parent: impl Into<String>) -> Self {
        self.and_node(ExpressionNode::Parent(parent.into()))
    }

    /// ORs a tag condition with the expression.
    pub fn or_tag(self, tag: impl Into<String>) -> Self {
        self.or_node(ExpressionNode::Tag(tag.into()))
    }

    /// ORs a key/value condition with the expression.
    pub fn or_key_value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.or_node(ExpressionNode::KeyValue {
            key: key.into(),
            value: value.into(),
        })
    }

    /// ORs a "has key" condition with the expression.
    pub fn or_has_key(self, key: impl Into<String>) -> Self {
        self.or_node(ExpressionNode::HasKey(key.into()))
    }

    /// ORs a parent condition with the expression.
    pub fn or_parent(self, parent: impl Into<String>) -> Self {
        self.or_node(ExpressionNode::Parent(parent.into()))
    }

    /// ANDs a whole sub-expression as the right operand. An empty `other`
    /// leaves the expression untouched.
    pub fn and(self, other: Expression) -> Self {
        match other.root {
            Some(node) => self.and_node(node),
            None => self,
        }
    }

    /// ORs a whole sub-expression as the right operand. An empty `other`
    /// leaves the expression untouched.
    pub fn or(self, other: Expression) -> Self {
        match other.root {
            Some(node) => self.or_node(node),
            None => self,
        }
    }

    /// Negates the current root. Negating an empty expression is a no-op.
    pub fn negate(self) -> Self {
        Self {
            root: self.root.map(ExpressionNode::negate),
        }
    }
}

impl From<ExpressionNode> for Expression {
    fn from(node: ExpressionNode) -> Self {
        Self { root: Some(node) }
    }
}

impl Serialize for Expression {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.root.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D>(deserializer: D) -> Result<Expression, D::Error>
    where
        D: Deserializer<'de>,
    {
        let root = Option::<ExpressionNode>::deserialize(deserializer)?;
        Ok(Self { root })
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Some(root) => write!(f, "{root}"),
            None => write!(f, "*"),
        }
    }
}
