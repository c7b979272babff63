//! Wire types for talking to a menmos cluster.
//!
//! Everything here is plain data: the structured query algebra
//! ([`Expression`]), the query request ([`Query`]), blob metadata
//! ([`BlobMeta`]) and the request/response bodies of the cluster API.

mod error;
mod expression;
mod expression_parse;
mod meta;
mod query;
mod response;

pub use error::ExpressionError;
pub use expression::{Expression, ExpressionNode};
pub use meta::{BlobMeta, BlobType};
pub use query::{Query, QueryExpression, DEFAULT_QUERY_FROM, DEFAULT_QUERY_SIZE};
pub use response::{
    FacetResponse,
    GetMetadataResponse,
    Hit,
    ListStorageNodesResponse,
    LoginRequest,
    LoginResponse,
    MessageResponse,
    PushResponse,
    QueryResponse,
    StorageNodeInfo,
};
