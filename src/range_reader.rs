use std::ops::RangeInclusive;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{
    header::{HeaderValue, RANGE},
    Method,
    StatusCode,
};
use tracing::{debug, warn};

use crate::{
    client::{ensure_success, BlobStream},
    error::{ClientError, Result},
    Client,
};

/// Chunk size used when a ranged body is handed out as a stream.
pub const DEFAULT_RANGE_CHUNK_SIZE: usize = 1024 * 1024;

/// An end-inclusive, zero-based byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    start: u64,
    end: u64,
}

impl Range {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(ClientError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered, both ends included.
    pub fn size(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl TryFrom<RangeInclusive<u64>> for Range {
    type Error = ClientError;

    fn try_from(range: RangeInclusive<u64>) -> Result<Self> {
        Range::new(*range.start(), *range.end())
    }
}

/// A forward-only reader over a fixed byte range of one blob.
///
/// Every [`read`](RangeReader::read) resolves the blob's location again and
/// fetches the next segment with a `Range` header, so consecutive segments
/// may come from different storage nodes. The reader keeps a single cursor
/// and is not meant to be shared; use one reader per range for parallel
/// fetches. Dropping it releases nothing, there is nothing held between
/// reads.
#[derive(Debug)]
pub struct RangeReader {
    client: Client,
    blob_id: String,
    cursor: u64,
    range_end: u64,
    finished: bool,
}

impl RangeReader {
    pub(crate) fn new(client: Client, blob_id: &str, range: Range) -> Self {
        Self {
            client,
            blob_id: blob_id.to_string(),
            cursor: range.start,
            range_end: range.end,
            finished: false,
        }
    }

    pub fn blob_id(&self) -> &str {
        &self.blob_id
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    pub fn remaining(&self) -> u64 {
        if self.finished {
            return 0;
        }
        (self.range_end - self.cursor).saturating_add(1)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reads up to `max_len` bytes from the range.
    ///
    /// Returns `None` once the range is exhausted. A segment is returned only
    /// if it is complete; a short answer from the storage node fails with
    /// `ShortRead` and leaves the cursor where it was.
    #[tracing::instrument(skip(self), fields(blob_id = %self.blob_id, cursor = self.cursor))]
    pub async fn read(&mut self, max_len: usize) -> Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }
        if max_len == 0 {
            return Ok(Some(Bytes::new()));
        }

        let last = self
            .range_end
            .min(self.cursor.saturating_add(max_len as u64 - 1));
        let segment = Range {
            start: self.cursor,
            end: last,
        };
        let chunk = self.client.fetch_range(&self.blob_id, segment).await?;

        match last.checked_add(1) {
            Some(next) if next <= self.range_end => self.cursor = next,
            _ => {
                self.cursor = last.saturating_add(1);
                self.finished = true;
            }
        }
        Ok(Some(chunk))
    }

    /// Turns the reader into a stream of chunks of at most `chunk_size` bytes.
    pub fn into_stream(self, chunk_size: usize) -> BlobStream {
        let chunk_size = chunk_size.max(1);
        let stream = async_stream::stream! {
            let mut reader = self;
            loop {
                match reader.read(chunk_size).await {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };
        Box::pin(stream)
    }
}

impl Client {
    /// Opens a reader over `range` of a blob. No request is made until the
    /// first read.
    pub fn range_reader(&self, blob_id: &str, range: Range) -> RangeReader {
        RangeReader::new(self.clone(), blob_id, range)
    }

    /// Fetches exactly `range` of a blob through a freshly resolved redirect.
    ///
    /// A segment that does not start at offset 0 must come back as
    /// `206 Partial Content`. A plain 200 there means the node ignored the
    /// `Range` header and sent the blob from its first byte.
    async fn fetch_range(&self, blob_id: &str, range: Range) -> Result<Bytes> {
        let target = self
            .resolve_redirect(self.request(Method::GET, self.blob_url(blob_id)))
            .await?;

        let mut request = self.request(Method::GET, target);
        let range_header = HeaderValue::try_from(range.header_value()).map_err(|source| {
            ClientError::InvalidHeader {
                name: "range",
                source,
            }
        })?;
        request.headers_mut().insert(RANGE, range_header);

        debug!(blob_id, start = range.start, end = range.end, "fetching range segment");
        let response = self.execute(request).await?;
        let response = ensure_success(&Method::GET, response)?;
        let url = response.url().to_string();
        let status = response.status();
        if range.start != 0 && status != StatusCode::PARTIAL_CONTENT {
            warn!(blob_id, %url, %status, "storage node ignored the range header");
            return Err(ClientError::UnexpectedStatus {
                method: Method::GET,
                url,
                status,
            });
        }

        let expected = range.size();
        let mut buf =
            BytesMut::with_capacity(expected.min(DEFAULT_RANGE_CHUNK_SIZE as u64) as usize);
        let mut body = response.bytes_stream();
        while (buf.len() as u64) < expected {
            match body.next().await {
                Some(chunk) => {
                    let chunk = chunk.map_err(|source| ClientError::Transport {
                        method: Method::GET,
                        url: url.clone(),
                        source,
                    })?;
                    buf.extend_from_slice(&chunk);
                }
                None => break,
            }
        }

        let actual = buf.len() as u64;
        if actual < expected {
            return Err(ClientError::ShortRead {
                blob_id: blob_id.to_string(),
                expected,
                actual,
            });
        }
        buf.truncate(expected as usize);
        Ok(buf.freeze())
    }
}
