use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::Result;
use axum::{
    extract::{Multipart, Path, Request, State},
    http::{
        header::{AUTHORIZATION, LOCATION, RANGE},
        HeaderMap,
        Method,
        StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use payload::{
    BlobMeta,
    ExpressionNode,
    FacetResponse,
    GetMetadataResponse,
    Hit,
    ListStorageNodesResponse,
    LoginRequest,
    LoginResponse,
    MessageResponse,
    PushResponse,
    Query,
    QueryExpression,
    QueryResponse,
    StorageNodeInfo,
};
use tokio::net::TcpListener;
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{Client, ClientConfig, BLOB_META_HEADER, UPLOAD_FIELD};

pub const TEST_USERNAME: &str = "admin";
pub const TEST_PASSWORD: &str = "password";
pub const TEST_TOKEN: &str = "test-token";
pub const TEST_STORAGE_NODE: &str = "storage-alpha";

/// How the coordinator answers requests that should be redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorMode {
    Redirect,
    /// Answers 200 itself instead of redirecting.
    AnswerDirectly,
    /// Answers 307 without a `Location` header.
    MissingLocation,
    /// Answers 307 with a `Location` that is not a URL.
    GarbageLocation,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub body: Bytes,
    pub meta: BlobMeta,
}

struct ClusterInner {
    base_url: String,
    blobs: BTreeMap<String, StoredBlob>,
    requests: Vec<RecordedRequest>,
    next_id: u64,
    coordinator_mode: CoordinatorMode,
    short_serve: Option<usize>,
    ignore_range: bool,
    storage_failure: Option<StatusCode>,
}

#[derive(Clone)]
pub struct ClusterState {
    inner: Arc<Mutex<ClusterInner>>,
}

impl ClusterState {
    fn new(base_url: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClusterInner {
                base_url: base_url.to_string(),
                blobs: BTreeMap::new(),
                requests: Vec::new(),
                next_id: 0,
                coordinator_mode: CoordinatorMode::Redirect,
                short_serve: None,
                ignore_range: false,
                storage_failure: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterInner> {
        self.inner.lock().unwrap()
    }
}

/// An in-process cluster playing both the coordinator and a storage node.
///
/// Storage node routes live under `/storage`. Every request is recorded
/// before it is handled.
pub struct TestCluster {
    pub url: String,
    state: ClusterState,
}

impl TestCluster {
    pub async fn start() -> Result<Self> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let state = ClusterState::new(&url);
        let app = router(state.clone());
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!("test cluster stopped: {:?}", err);
            }
        });

        Ok(Self { url, state })
    }

    pub async fn client(&self) -> Result<Client> {
        let config = ClientConfig::new(&self.url, TEST_USERNAME, TEST_PASSWORD);
        Ok(Client::new(config).await?)
    }

    pub fn insert_blob(&self, id: &str, body: impl Into<Bytes>, meta: BlobMeta) {
        self.state.lock().blobs.insert(
            id.to_string(),
            StoredBlob {
                body: body.into(),
                meta,
            },
        );
    }

    pub fn blob(&self, id: &str) -> Option<StoredBlob> {
        self.state.lock().blobs.get(id).cloned()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    pub fn set_coordinator_mode(&self, mode: CoordinatorMode) {
        self.state.lock().coordinator_mode = mode;
    }

    /// Makes the storage node answer range reads with at most `limit` bytes.
    pub fn set_short_serve(&self, limit: Option<usize>) {
        self.state.lock().short_serve = limit;
    }

    /// Makes the storage node answer range reads with the whole blob and a 200.
    pub fn set_ignore_range(&self, ignore: bool) {
        self.state.lock().ignore_range = ignore;
    }

    /// Makes every storage node route answer with `status`.
    pub fn set_storage_failure(&self, status: Option<StatusCode>) {
        self.state.lock().storage_failure = status;
    }
}

fn router(state: ClusterState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/health", get(health))
        .route("/node/storage", get(list_storage_nodes))
        .route("/query", post(query))
        .route("/blob", post(redirect_create))
        .route(
            "/blob/{id}",
            get(redirect_existing)
                .delete(redirect_existing)
                .post(redirect_replace),
        )
        .route(
            "/blob/{id}/metadata",
            get(get_metadata).put(redirect_metadata),
        )
        .route("/storage/blob", post(storage_create_blob))
        .route(
            "/storage/blob/{id}",
            get(storage_get_blob)
                .post(storage_replace_blob)
                .delete(storage_delete_blob),
        )
        .route("/storage/blob/{id}/metadata", put(storage_update_metadata))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            record_request,
        ))
        .with_state(state)
}

async fn record_request(
    State(state): State<ClusterState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    state.lock().requests.push(RecordedRequest {
        method: request.method().clone(),
        path: path.clone(),
        headers: request.headers().clone(),
    });

    if path != "/auth/login" {
        let expected = format!("Bearer {TEST_TOKEN}");
        let authorized = request
            .headers()
            .get(AUTHORIZATION)
            .is_some_and(|v| v.as_bytes() == expected.as_bytes());
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    next.run(request).await
}

async fn login(Json(request): Json<LoginRequest>) -> Response {
    if request.username != TEST_USERNAME || request.password != TEST_PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(MessageResponse {
                message: "bad credentials".to_string(),
            }),
        )
            .into_response();
    }
    Json(LoginResponse {
        token: TEST_TOKEN.to_string(),
    })
    .into_response()
}

async fn health() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "menmos is healthy".to_string(),
    })
}

async fn list_storage_nodes() -> Json<ListStorageNodesResponse> {
    Json(ListStorageNodesResponse {
        storage_nodes: vec![StorageNodeInfo {
            id: TEST_STORAGE_NODE.to_string(),
            port: 3031,
            size: 1024,
            available_space: 4096,
        }],
    })
}

async fn query(
    State(state): State<ClusterState>,
    Json(query): Json<Query>,
) -> Json<QueryResponse> {
    let inner = state.lock();
    let matching: Vec<(&String, &StoredBlob)> = inner
        .blobs
        .iter()
        .filter(|(_, blob)| match &query.expression {
            Some(QueryExpression::Structured(expr)) => match expr.root() {
                Some(root) => evaluate(root, &blob.meta),
                None => true,
            },
            _ => true,
        })
        .collect();

    let facets = query.facets.then(|| {
        let mut facets = FacetResponse::default();
        for (_, blob) in &matching {
            for tag in &blob.meta.tags {
                *facets.tags.entry(tag.clone()).or_default() += 1;
            }
            for (key, value) in &blob.meta.metadata {
                *facets
                    .meta
                    .entry(key.clone())
                    .or_default()
                    .entry(value.clone())
                    .or_default() += 1;
            }
        }
        facets
    });

    let hits: Vec<Hit> = matching
        .iter()
        .skip(query.from as usize)
        .take(query.size.get() as usize)
        .map(|(id, blob)| Hit {
            id: id.to_string(),
            meta: blob.meta.clone(),
            url: format!("{}/storage/blob/{}", inner.base_url, id),
        })
        .collect();

    Json(QueryResponse {
        count: hits.len() as u32,
        total: matching.len() as u32,
        hits,
        facets,
    })
}

fn evaluate(node: &ExpressionNode, meta: &BlobMeta) -> bool {
    match node {
        ExpressionNode::Tag(tag) => meta.has_tag(tag),
        ExpressionNode::KeyValue { key, value } => meta.metadata.get(key) == Some(value),
        ExpressionNode::HasKey(key) => meta.metadata.contains_key(key),
        ExpressionNode::Parent(parent) => meta.parents.contains(parent),
        ExpressionNode::And(lhs, rhs) => evaluate(lhs, meta) && evaluate(rhs, meta),
        ExpressionNode::Or(lhs, rhs) => evaluate(lhs, meta) || evaluate(rhs, meta),
        ExpressionNode::Not(inner) => !evaluate(inner, meta),
    }
}

fn redirect(state: &ClusterState, location: String) -> Response {
    match state.lock().coordinator_mode {
        CoordinatorMode::Redirect => {
            (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, location)]).into_response()
        }
        CoordinatorMode::AnswerDirectly => Json(MessageResponse {
            message: "here you go".to_string(),
        })
        .into_response(),
        CoordinatorMode::MissingLocation => StatusCode::TEMPORARY_REDIRECT.into_response(),
        CoordinatorMode::GarbageLocation => (
            StatusCode::TEMPORARY_REDIRECT,
            [(LOCATION, "http://[not a host".to_string())],
        )
            .into_response(),
    }
}

async fn redirect_create(State(state): State<ClusterState>) -> Response {
    let location = format!("{}/storage/blob", state.lock().base_url);
    redirect(&state, location)
}

/// Reads and deletes redirect with a relative location, the rest use
/// absolute URLs.
async fn redirect_existing(
    State(state): State<ClusterState>,
    Path(id): Path<String>,
) -> Response {
    if !state.lock().blobs.contains_key(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    redirect(&state, format!("/storage/blob/{id}"))
}

async fn redirect_replace(
    State(state): State<ClusterState>,
    Path(id): Path<String>,
) -> Response {
    let location = format!("{}/storage/blob/{}", state.lock().base_url, id);
    redirect(&state, location)
}

async fn redirect_metadata(
    State(state): State<ClusterState>,
    Path(id): Path<String>,
) -> Response {
    let location = format!("{}/storage/blob/{}/metadata", state.lock().base_url, id);
    redirect(&state, location)
}

async fn get_metadata(
    State(state): State<ClusterState>,
    Path(id): Path<String>,
) -> Json<GetMetadataResponse> {
    let meta = state.lock().blobs.get(&id).map(|blob| blob.meta.clone());
    Json(GetMetadataResponse { meta })
}

fn parse_range(headers: &HeaderMap) -> Option<(usize, usize)> {
    let raw = headers.get(RANGE)?.to_str().ok()?;
    let (start, end) = raw.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

fn decode_meta_header(headers: &HeaderMap) -> Option<BlobMeta> {
    let raw = headers.get(BLOB_META_HEADER)?;
    let json = STANDARD.decode(raw.as_bytes()).ok()?;
    serde_json::from_slice(&json).ok()
}

async fn storage_get_blob(
    State(state): State<ClusterState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let inner = state.lock();
    if let Some(status) = inner.storage_failure {
        return status.into_response();
    }
    let Some(blob) = inner.blobs.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let range = if inner.ignore_range {
        None
    } else {
        parse_range(&headers)
    };
    let (status, mut body) = match range {
        Some((start, end)) if start < blob.body.len() && start <= end => {
            let end = end.min(blob.body.len() - 1);
            (StatusCode::PARTIAL_CONTENT, blob.body.slice(start..=end))
        }
        Some(_) => return StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
        None => (StatusCode::OK, blob.body.clone()),
    };
    if let Some(limit) = inner.short_serve {
        body.truncate(limit);
    }
    (status, body).into_response()
}

async fn storage_create_blob(
    State(state): State<ClusterState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    store_upload(state, None, headers, multipart).await
}

async fn storage_replace_blob(
    State(state): State<ClusterState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    store_upload(state, Some(id), headers, multipart).await
}

async fn store_upload(
    state: ClusterState,
    id: Option<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let failure = state.lock().storage_failure;
    if let Some(status) = failure {
        return status.into_response();
    }
    let Some(meta) = decode_meta_header(&headers) else {
        return (StatusCode::BAD_REQUEST, "missing or invalid blob metadata").into_response();
    };

    let mut body = Bytes::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(UPLOAD_FIELD) => match field.bytes().await {
                Ok(bytes) => body = bytes,
                Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
            },
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        }
    }

    let mut inner = state.lock();
    let id = match id {
        Some(id) => id,
        None => {
            inner.next_id += 1;
            format!("blob-{}", inner.next_id)
        }
    };
    inner.blobs.insert(id.clone(), StoredBlob { body, meta });
    Json(PushResponse { id }).into_response()
}

async fn storage_delete_blob(
    State(state): State<ClusterState>,
    Path(id): Path<String>,
) -> Response {
    let mut inner = state.lock();
    if let Some(status) = inner.storage_failure {
        return status.into_response();
    }
    match inner.blobs.remove(&id) {
        Some(_) => Json(MessageResponse {
            message: "blob deleted".to_string(),
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn storage_update_metadata(
    State(state): State<ClusterState>,
    Path(id): Path<String>,
    Json(meta): Json<BlobMeta>,
) -> Response {
    let mut inner = state.lock();
    if let Some(status) = inner.storage_failure {
        return status.into_response();
    }
    match inner.blobs.get_mut(&id) {
        Some(blob) => {
            blob.meta = meta;
            Json(MessageResponse {
                message: "metadata updated".to_string(),
            })
            .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
