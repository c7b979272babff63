use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use payload::{
    BlobMeta,
    GetMetadataResponse,
    ListStorageNodesResponse,
    LoginRequest,
    LoginResponse,
    MessageResponse,
    Query,
    QueryResponse,
    StorageNodeInfo,
};
use reqwest::{
    header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    multipart::Form,
    redirect,
    Method,
    Request,
    Response,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::{default_user_agent, ClientConfig, Profile},
    error::{ClientError, Result},
};

/// A stream of blob bytes, as handed out by [`Client::get_body`].
pub type BlobStream = BoxStream<'static, Result<Bytes>>;

/// A handle on a menmos cluster.
///
/// The handle is cheap to clone and never changes after construction, so
/// clones can be used concurrently. Every operation performs its requests in
/// sequence and surfaces the first failure without retrying.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base: Url,
    auth: Option<HeaderValue>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.auth.is_some())
            .finish()
    }
}

impl Client {
    /// Connects to the cluster and logs in with the configured credentials.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let mut client = Self::unauthenticated(&config)?;
        let token = client
            .authenticate(&config.username, &config.password)
            .await?;
        client.auth = Some(bearer(&token)?);
        Ok(client)
    }

    /// Builds a client around a token obtained elsewhere. No request is made.
    pub fn with_token(host: &str, token: &str) -> Result<Self> {
        let mut client = Self::unauthenticated(&ClientConfig::new(host, "", ""))?;
        client.auth = Some(bearer(token)?);
        Ok(client)
    }

    /// Connects using a profile from the default client config file.
    pub async fn from_profile(name: &str) -> Result<Self> {
        let profile = Profile::load(name)?;
        Self::new(ClientConfig::from(profile)).await
    }

    fn unauthenticated(config: &ClientConfig) -> Result<Self> {
        let base = parse_base(&config.host)?;

        // Redirects are followed by hand so the second hop can carry its own
        // range and body.
        let mut builder = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(if config.user_agent.is_empty() {
                default_user_agent()
            } else {
                config.user_agent.clone()
            });
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|source| ClientError::HttpClient { source })?;

        Ok(Self {
            http,
            base,
            auth: None,
        })
    }

    pub fn host(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        let login = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let request = self.json_request(
            Method::POST,
            self.url(&["auth", "login"]),
            &login,
            "login request",
        )?;
        let response: LoginResponse = self.execute_json(request).await?;
        debug!(host = %self.host(), "authenticated");
        Ok(response.token)
    }

    /// Builds a cluster URL from path segments. Segments are percent-encoded,
    /// so opaque blob ids are safe to pass through.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub(crate) fn blob_url(&self, blob_id: &str) -> Url {
        self.url(&["blob", blob_id])
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> Request {
        let mut request = Request::new(method, url);
        self.authorize(&mut request);
        request
    }

    fn authorize(&self, request: &mut Request) {
        if let Some(auth) = &self.auth {
            request.headers_mut().insert(AUTHORIZATION, auth.clone());
        }
    }

    pub(crate) fn json_request<T: Serialize>(
        &self,
        method: Method,
        url: Url,
        body: &T,
        context: &'static str,
    ) -> Result<Request> {
        let body = serde_json::to_vec(body)
            .map_err(|source| ClientError::Serialization { context, source })?;
        let mut request = self.request(method, url);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *request.body_mut() = Some(body.into());
        Ok(request)
    }

    pub(crate) fn multipart_request(&self, method: Method, url: Url, form: Form) -> Result<Request> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .multipart(form)
            .build()
            .map_err(|source| ClientError::Transport {
                method,
                url: url.to_string(),
                source,
            })?;
        self.authorize(&mut request);
        Ok(request)
    }

    pub(crate) async fn execute(&self, request: Request) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().to_string();
        self.http
            .execute(request)
            .await
            .map_err(|source| ClientError::Transport {
                method,
                url,
                source,
            })
    }

    /// Sends a request whose answer must be a 2xx status.
    pub(crate) async fn execute_success(&self, request: Request) -> Result<Response> {
        let method = request.method().clone();
        let response = self.execute(request).await?;
        ensure_success(&method, response)
    }

    /// Sends a request and decodes its JSON answer.
    pub(crate) async fn execute_json<R: DeserializeOwned>(&self, request: Request) -> Result<R> {
        let method = request.method().clone();
        let response = self.execute_success(request).await?;
        let url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport {
                method: method.clone(),
                url: url.clone(),
                source,
            })?;
        serde_json::from_slice(&body).map_err(|source| ClientError::InvalidResponse {
            method,
            url,
            source,
        })
    }

    /// Returns the cluster's health message.
    #[tracing::instrument(skip_all, fields(host = %self.host()))]
    pub async fn health(&self) -> Result<String> {
        let request = self.request(Method::GET, self.url(&["health"]));
        let response: MessageResponse = self.execute_json(request).await?;
        Ok(response.message)
    }

    #[tracing::instrument(skip_all, fields(host = %self.host()))]
    pub async fn list_storage_nodes(&self) -> Result<Vec<StorageNodeInfo>> {
        let request = self.request(Method::GET, self.url(&["node", "storage"]));
        let response: ListStorageNodesResponse = self.execute_json(request).await?;
        Ok(response.storage_nodes)
    }

    #[tracing::instrument(skip_all, fields(from = query.from, size = query.size.get()))]
    pub async fn query(&self, query: &Query) -> Result<QueryResponse> {
        let request = self.json_request(Method::POST, self.url(&["query"]), query, "query")?;
        self.execute_json(request).await
    }

    /// Fetches the metadata of a blob. The coordinator answers this one
    /// itself, no redirect is involved.
    #[tracing::instrument(skip(self))]
    pub async fn get_metadata(&self, blob_id: &str) -> Result<BlobMeta> {
        let request = self.request(Method::GET, self.url(&["blob", blob_id, "metadata"]));
        let response: GetMetadataResponse = self.execute_json(request).await?;
        response.meta.ok_or_else(|| ClientError::NotFound {
            blob_id: blob_id.to_string(),
        })
    }

    /// Deletes a blob from the storage node holding it.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, blob_id: &str) -> Result<()> {
        let target = self
            .resolve_redirect(self.request(Method::DELETE, self.blob_url(blob_id)))
            .await?;
        let _: MessageResponse = self
            .execute_json(self.request(Method::DELETE, target))
            .await?;
        Ok(())
    }

    /// Returns the body of a blob, or of the `range` section of it.
    ///
    /// Ranged bodies are served by a [`RangeReader`](crate::RangeReader) in
    /// chunks of [`DEFAULT_RANGE_CHUNK_SIZE`](crate::DEFAULT_RANGE_CHUNK_SIZE)
    /// bytes. Use [`Client::range_reader`] to pick another chunk size.
    #[tracing::instrument(skip(self))]
    pub async fn get_body(
        &self,
        blob_id: &str,
        range: Option<crate::Range>,
    ) -> Result<BlobStream> {
        if let Some(range) = range {
            return Ok(self
                .range_reader(blob_id, range)
                .into_stream(crate::DEFAULT_RANGE_CHUNK_SIZE));
        }

        let target = self
            .resolve_redirect(self.request(Method::GET, self.blob_url(blob_id)))
            .await?;
        let response = self
            .execute_success(self.request(Method::GET, target))
            .await?;
        let url = response.url().to_string();

        let stream = async_stream::stream! {
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                yield chunk.map_err(|source| ClientError::Transport {
                    method: Method::GET,
                    url: url.clone(),
                    source,
                });
            }
        };
        Ok(Box::pin(stream))
    }
}

fn parse_base(host: &str) -> Result<Url> {
    let base = Url::parse(host).map_err(|source| ClientError::InvalidUrl {
        url: host.to_string(),
        source,
    })?;
    if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
        return Err(ClientError::InvalidUrl {
            url: host.to_string(),
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        });
    }
    Ok(base)
}

fn bearer(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::try_from(format!("Bearer {token}")).map_err(|source| {
        ClientError::InvalidHeader {
            name: "authorization",
            source,
        }
    })?;
    value.set_sensitive(true);
    Ok(value)
}

pub(crate) fn ensure_success(method: &Method, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    warn!(%method, url = %response.url(), %status, "unexpected status");
    Err(ClientError::UnexpectedStatus {
        method: method.clone(),
        url: response.url().to_string(),
        status,
    })
}
