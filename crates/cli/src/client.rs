//! API client for communicating with the balancer engine

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the balancer engine
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.url(path, query)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path, &[])?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    pub async fn list_nodes(&self, category: Option<&str>) -> Result<Vec<ScoredNode>> {
        let query: Vec<(&str, String)> = category
            .map(|c| vec![("category", c.to_uppercase())])
            .unwrap_or_default();
        self.get("api/v1/nodes", &query).await
    }

    pub async fn get_node(&self, node_id: &str) -> Result<NodeDetail> {
        self.get(&format!("api/v1/nodes/{}", encode_segment(node_id)), &[])
            .await
    }

    pub async fn list_containers(&self) -> Result<Vec<ContainerStatus>> {
        self.get("api/v1/containers", &[]).await
    }

    pub async fn transitions(&self, node: Option<&str>, limit: usize) -> Result<Vec<Transition>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(node) = node {
            query.push(("node", node.to_string()));
        }
        self.get("api/v1/transitions", &query).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<NodeDetail> {
        self.post("api/v1/nodes", request).await
    }

    pub async fn decommission(&self, node_id: &str) -> Result<DecommissionResponse> {
        self.post(
            &format!("api/v1/nodes/{}/decommission", encode_segment(node_id)),
            &serde_json::json!({}),
        )
        .await
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        self.get("api/v1/stats", &[]).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        // 503 still carries a health body
        let url = self.url("healthz", &[])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        response.json().await.context("Failed to parse health response")
    }
}

fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredNode {
    pub id: String,
    pub name: String,
    pub cpu_score: f64,
    pub memory_score: f64,
    pub network_score: f64,
    pub availability_score: f64,
    pub overall_score: f64,
    pub utilization_category: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scores {
    pub cpu_score: f64,
    pub memory_score: f64,
    pub network_score: f64,
    pub availability_score: f64,
    pub overall_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerMeta {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub ports: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDetail {
    pub node_id: String,
    pub name: String,
    pub scores: Scores,
    pub category: String,
    pub lifecycle: String,
    #[serde(default)]
    pub stale: bool,
    pub created_at: i64,
    pub last_updated: i64,
    #[serde(default)]
    pub last_sample_at: Option<i64>,
    #[serde(default)]
    pub sample_count: u64,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub ports: BTreeMap<String, Vec<String>>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub uptime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub node_id: String,
    pub from: String,
    pub to: String,
    pub triggering_score: Option<f64>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecommissionResponse {
    pub node_id: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub nodes_tracked: usize,
    pub capacity: Option<usize>,
    pub samples_accepted: u64,
    pub samples_rejected: BTreeMap<String, u64>,
    pub transitions: u64,
    pub nodes_collected: u64,
    pub stale_nodes: usize,
    pub nodes_by_category: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}
