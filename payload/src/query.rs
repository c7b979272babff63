use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::Expression;

pub const DEFAULT_QUERY_FROM: u32 = 0;
pub const DEFAULT_QUERY_SIZE: NonZeroU32 = match NonZeroU32::new(20) {
    Some(size) => size,
    None => panic!("default query size must be positive"),
};

/// The two mutually exclusive ways of describing what a query matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryExpression {
    /// Free-text query, interpreted by the cluster.
    Raw(String),
    Structured(Expression),
}

/// A query request, as sent to `POST /query`.
///
/// A missing expression matches every blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<QueryExpression>,
    #[serde(default)]
    pub from: u32,
    #[serde(default = "default_size")]
    pub size: NonZeroU32,
    #[serde(default = "default_sign_urls")]
    pub sign_urls: bool,
    #[serde(default)]
    pub facets: bool,
}

fn default_size() -> NonZeroU32 {
    DEFAULT_QUERY_SIZE
}

fn default_sign_urls() -> bool {
    true
}

impl Default for Query {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Query {
    fn new(expression: Option<QueryExpression>) -> Self {
        Self {
            expression,
            from: DEFAULT_QUERY_FROM,
            size: DEFAULT_QUERY_SIZE,
            sign_urls: true,
            facets: false,
        }
    }

    /// A free-text query with default paging.
    pub fn unstructured(expression: impl Into<String>) -> Self {
        Self::new(Some(QueryExpression::Raw(expression.into())))
    }

    /// A structured query with default paging. An empty expression produces
    /// a match-all query.
    pub fn structured(expression: Expression) -> Self {
        if expression.is_empty() {
            return Self::new(None);
        }
        Self::new(Some(QueryExpression::Structured(expression)))
    }

    pub fn with_from(mut self, from: u32) -> Self {
        self.from = from;
        self
    }

    pub fn with_size(mut self, size: NonZeroU32) -> Self {
        self.size = size;
        self
    }

    pub fn with_sign_urls(mut self, sign_urls: bool) -> Self {
        self.sign_urls = sign_urls;
        self
    }

    pub fn with_facets(mut self, facets: bool) -> Self {
        self.facets = facets;
        self
    }
}
