//! Blob uploads.
//!
//! Metadata travels in the `x-blob-meta` header (base64 of the JSON
//! encoding) because the preliminary request to the coordinator has no body.
//! Once the storage node is known the body is sent there as a single-field
//! multipart form, with the same header attached again.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use payload::{BlobMeta, MessageResponse, PushResponse};
use reqwest::{
    header::{HeaderName, HeaderValue},
    multipart::{Form, Part},
    Body,
    Method,
};
use tracing::debug;
use url::Url;

use crate::{
    error::{ClientError, Result},
    Client,
};

pub const BLOB_META_HEADER: HeaderName = HeaderName::from_static("x-blob-meta");

/// Name of the multipart field holding the blob bytes.
pub const UPLOAD_FIELD: &str = "src";

/// Encodes blob metadata into the value of the `x-blob-meta` header.
pub fn encode_meta_header(meta: &BlobMeta) -> Result<HeaderValue> {
    let json = serde_json::to_vec(meta).map_err(|source| ClientError::Serialization {
        context: "blob metadata",
        source,
    })?;
    HeaderValue::try_from(STANDARD.encode(json)).map_err(|source| ClientError::InvalidHeader {
        name: "x-blob-meta",
        source,
    })
}

impl Client {
    /// Creates a blob and returns the id the cluster assigned to it.
    ///
    /// `body` is anything reqwest can send: `Bytes`, `Vec<u8>`, `String`, or
    /// a stream wrapped with [`Body::wrap_stream`]. Streams are forwarded as
    /// they are read, nothing is buffered up front.
    #[tracing::instrument(skip_all, fields(name = %meta.name, size = meta.size))]
    pub async fn create_blob(&self, body: impl Into<Body>, meta: &BlobMeta) -> Result<String> {
        self.push(self.url(&["blob"]), body.into(), meta).await
    }

    /// Replaces both the contents and the metadata of an existing blob.
    #[tracing::instrument(skip(self, body, meta), fields(name = %meta.name, size = meta.size))]
    pub async fn update_blob(
        &self,
        blob_id: &str,
        body: impl Into<Body>,
        meta: &BlobMeta,
    ) -> Result<()> {
        self.push(self.blob_url(blob_id), body.into(), meta).await?;
        Ok(())
    }

    /// Replaces only the metadata of a blob.
    ///
    /// The full metadata goes as a JSON body on both legs.
    #[tracing::instrument(skip(self, meta), fields(name = %meta.name))]
    pub async fn update_meta(&self, blob_id: &str, meta: &BlobMeta) -> Result<()> {
        let url = self.url(&["blob", blob_id, "metadata"]);
        let target = self
            .resolve_redirect(self.json_request(Method::PUT, url, meta, "blob metadata")?)
            .await?;

        debug!(%target, "sending metadata to storage node");
        let request = self.json_request(Method::PUT, target, meta, "blob metadata")?;
        let _: MessageResponse = self.execute_json(request).await?;
        Ok(())
    }

    async fn push(&self, url: Url, body: Body, meta: &BlobMeta) -> Result<String> {
        let meta_header = encode_meta_header(meta)?;

        let mut preliminary = self.request(Method::POST, url);
        preliminary
            .headers_mut()
            .insert(BLOB_META_HEADER, meta_header.clone());
        let target = self.resolve_redirect(preliminary).await?;

        let form = Form::new().part(UPLOAD_FIELD, Part::stream(body));
        let mut upload = self.multipart_request(Method::POST, target, form)?;
        upload.headers_mut().insert(BLOB_META_HEADER, meta_header);

        debug!(target = %upload.url(), "uploading blob body");
        let response: PushResponse = self.execute_json(upload).await?;
        Ok(response.id)
    }
}
