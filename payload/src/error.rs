/// Errors raised while turning untyped input into an [`Expression`](crate::Expression).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ExpressionError {
    /// A recognized node whose body has the wrong type or arity.
    #[error("invalid expression: {reason}")]
    InvalidShape { reason: String },

    /// An object carrying none of the known node keys.
    #[error("unknown expression with keys [{}]", .keys.join(", "))]
    UnknownExpression { keys: Vec<String> },
}

impl ExpressionError {
    pub fn invalid_shape(reason: impl Into<String>) -> Self {
        ExpressionError::InvalidShape {
            reason: reason.into(),
        }
    }
}
