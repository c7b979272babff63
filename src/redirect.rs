//! Redirect resolution against the coordinator.
//!
//! The coordinator never serves blob bytes. It answers blob requests with a
//! `307 Temporary Redirect` naming the storage node to talk to, and the
//! caller sends a second, fresh request there. A resolved target is good for
//! exactly one request and is never cached.

use reqwest::{header::LOCATION, Request, StatusCode};
use tracing::debug;
use url::Url;

use crate::{
    error::{ClientError, Result},
    Client,
};

impl Client {
    /// Performs `request` against the coordinator and returns the absolute
    /// URL it redirects to.
    ///
    /// Any status other than 307, including a 2xx, is a `RedirectExpected`
    /// error. A relative `Location` is resolved against the request URL.
    pub(crate) async fn resolve_redirect(&self, request: Request) -> Result<Url> {
        let method = request.method().clone();
        let url = request.url().clone();
        let response = self.execute(request).await?;

        let status = response.status();
        if status != StatusCode::TEMPORARY_REDIRECT {
            return Err(ClientError::RedirectExpected {
                method,
                url: url.to_string(),
                status,
            });
        }

        let malformed = |reason: String| ClientError::RedirectMalformed {
            method: method.clone(),
            url: url.to_string(),
            reason,
        };
        let location = response
            .headers()
            .get(LOCATION)
            .ok_or_else(|| malformed("missing Location header".to_string()))?
            .to_str()
            .map_err(|_| malformed("Location header is not valid UTF-8".to_string()))?;
        let target = url
            .join(location)
            .map_err(|e| malformed(format!("unparseable Location '{location}': {e}")))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(malformed(format!(
                "unsupported redirect scheme '{}'",
                target.scheme()
            )));
        }

        debug!(%method, from = %url, to = %target, "resolved redirect");
        Ok(target)
    }
}
