use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::BlobMeta;

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// The simplest response returned by the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// A single query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub meta: BlobMeta,
    #[serde(default)]
    pub url: String,
}

/// Aggregated counts returned when a query asks for facets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetResponse {
    #[serde(default)]
    pub tags: HashMap<String, u64>,
    #[serde(default)]
    pub meta: HashMap<String, HashMap<String, u64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub hits: Vec<Hit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<FacetResponse>,
}

/// Returned by blob creation with the id the cluster assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetMetadataResponse {
    #[serde(default)]
    pub meta: Option<BlobMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNodeInfo {
    pub id: String,
    pub port: u16,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub available_space: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListStorageNodesResponse {
    #[serde(default)]
    pub storage_nodes: Vec<StorageNodeInfo>,
}
