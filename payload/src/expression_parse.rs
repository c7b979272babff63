use std::str::FromStr;

use serde_json::{Map, Value};

use crate::{Expression, ExpressionError, ExpressionNode};

impl Expression {
    /// Builds an expression from its decoded JSON form.
    ///
    /// The node kind is chosen by the first key present, in this order:
    /// `tag`, `value` (with `key`), `key`, `parent`, `not`, `and`, `or`.
    /// `and`/`or` bodies must be a list of two or more sub-expressions, which
    /// are folded left: `[a, b, c]` becomes `((a, b), c)`. `null` is the
    /// empty expression.
    pub fn parse(raw: &Value) -> Result<Self, ExpressionError> {
        if raw.is_null() {
            return Ok(Expression::new());
        }
        parse_node(raw).map(Expression::from)
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: Value = serde_json::from_str(s)
            .map_err(|e| ExpressionError::invalid_shape(format!("expression is not JSON: {e}")))?;
        Expression::parse(&raw)
    }
}

pub(crate) fn parse_node(raw: &Value) -> Result<ExpressionNode, ExpressionError> {
    let fields = raw.as_object().ok_or_else(|| {
        ExpressionError::invalid_shape(format!(
            "expression should be an object, got {}",
            kind(raw)
        ))
    })?;

    if let Some(tag) = fields.get("tag") {
        return Ok(ExpressionNode::Tag(string_field("tag", tag)?));
    }
    if let Some(value) = fields.get("value") {
        return parse_key_value(fields, value);
    }
    if let Some(key) = fields.get("key") {
        return Ok(ExpressionNode::HasKey(string_field("key", key)?));
    }
    if let Some(parent) = fields.get("parent") {
        return Ok(ExpressionNode::Parent(string_field("parent", parent)?));
    }
    if let Some(inner) = fields.get("not") {
        return Ok(ExpressionNode::negate(parse_node(inner)?));
    }
    if let Some(body) = fields.get("and") {
        return fold_operands("and", body, ExpressionNode::and);
    }
    if let Some(body) = fields.get("or") {
        return fold_operands("or", body, ExpressionNode::or);
    }

    Err(ExpressionError::UnknownExpression {
        keys: fields.keys().cloned().collect(),
    })
}

fn parse_key_value(
    fields: &Map<String, Value>,
    value: &Value,
) -> Result<ExpressionNode, ExpressionError> {
    let key = fields.get("key").ok_or_else(|| {
        ExpressionError::invalid_shape("key/value condition is missing its key")
    })?;
    Ok(ExpressionNode::KeyValue {
        key: string_field("key", key)?,
        value: string_field("value", value)?,
    })
}

fn fold_operands(
    op: &str,
    body: &Value,
    combine: fn(ExpressionNode, ExpressionNode) -> ExpressionNode,
) -> Result<ExpressionNode, ExpressionError> {
    let items = body.as_array().ok_or_else(|| {
        ExpressionError::invalid_shape(format!(
            "'{op}' body must be a list of expressions, got {}",
            kind(body)
        ))
    })?;

    match items.split_first() {
        Some((first, rest)) if !rest.is_empty() => rest
            .iter()
            .try_fold(
                parse_node(first)?,
                |acc, item| -> Result<ExpressionNode, ExpressionError> {
                    Ok(combine(acc, parse_node(item)?))
                },
            ),
        _ => Err(ExpressionError::invalid_shape(format!(
            "'{op}' body needs at least two expressions, got {}",
            items.len()
        ))),
    }
}

fn string_field(name: &str, raw: &Value) -> Result<String, ExpressionError> {
    raw.as_str().map(str::to_string).ok_or_else(|| {
        ExpressionError::invalid_shape(format!("{name} should be a string, got {}", kind(raw)))
    })
}

fn kind(raw: &Value) -> &'static str {
    match raw {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
