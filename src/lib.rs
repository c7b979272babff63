//! Client for menmos blob storage clusters.
//!
//! A menmos cluster is fronted by a coordinator that knows where every blob
//! lives but does not serve blob bytes itself. Blob reads and writes go to
//! the coordinator first, which answers with a temporary redirect to the
//! storage node holding (or receiving) the blob; the client then talks to
//! that node directly. [`Client`] hides this two-step dance:
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use menmos_client::{BlobMeta, Client, ClientConfig, Expression, Query, Range};
//!
//! # async fn example() -> Result<(), menmos_client::ClientError> {
//! let client = Client::new(ClientConfig::new("http://localhost:3030", "admin", "password")).await?;
//!
//! let meta = BlobMeta::file("hello.txt").with_tag("greeting").with_size(5);
//! let id = client.create_blob("hello", &meta).await?;
//!
//! // Bytes 1 to 3, both included.
//! let body: Vec<u8> = client
//!     .get_body(&id, Some(Range::new(1, 3)?))
//!     .await?
//!     .map_ok(|chunk| chunk.to_vec())
//!     .try_concat()
//!     .await?;
//! assert_eq!(body, b"ell");
//!
//! let results = client
//!     .query(&Query::structured(Expression::new().and_tag("greeting")))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
mod error;
mod range_reader;
mod redirect;
mod transfer;

#[cfg(test)]
mod testing;

pub use client::{BlobStream, Client};
pub use config::{ClientConfig, ConfigError, Profile};
pub use error::{ClientError, Result};
pub use payload::{
    BlobMeta,
    BlobType,
    Expression,
    ExpressionError,
    ExpressionNode,
    FacetResponse,
    Hit,
    Query,
    QueryExpression,
    QueryResponse,
    StorageNodeInfo,
};
pub use range_reader::{Range, RangeReader, DEFAULT_RANGE_CHUNK_SIZE};
pub use transfer::{encode_meta_header, BLOB_META_HEADER, UPLOAD_FIELD};
