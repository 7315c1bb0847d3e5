use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use taskdeck_core::{clock, CategoryId, Color, NewCategory, NewTask, Priority};

use crate::config::EngineConfig;
use crate::error::{EngineError, SyncError};
use crate::EntityStore;

/// A collection that can be reconciled with the remote authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncCollection {
    Todos,
    Categories,
}

impl SyncCollection {
    /// Wire name, used as the request body key and in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Todos => "todos",
            Self::Categories => "categories",
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            Self::Todos => "/api/sync/todos",
            Self::Categories => "/api/sync/categories",
        }
    }
}

/// Result of a backend health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub connected: bool,
    pub message: String,
}

/// Replace-all reconciliation with the remote authority.
///
/// The local collection is uploaded whole; the authority's merged collection comes back
/// and replaces the local one in a single transaction. Remote ids are discarded and
/// fresh local ids are assigned.
pub struct SyncOrchestrator {
    store: Arc<EntityStore>,
    client: reqwest::Client,
    config: EngineConfig,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<EntityStore>, config: EngineConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.sync_timeout())
            .build()?;
        Ok(Self {
            store,
            client,
            config,
        })
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// The `apiUrl` setting if set, else the configured URL. No trailing slash.
    pub fn api_url(&self) -> Result<String, SyncError> {
        let from_setting = self
            .store
            .api_url_setting()
            .map_err(|source| SyncError::Read {
                collection: "settings",
                source,
            })?;
        let url = from_setting
            .or_else(|| self.config.api_url.clone())
            .filter(|url| !url.trim().is_empty())
            .ok_or(SyncError::NotConfigured)?;
        Ok(url.trim().trim_end_matches('/').to_string())
    }

    /// Upload `collection`, then replace it locally with the authority's merged result.
    ///
    /// Returns how many records the collection holds afterwards. On any failure the
    /// local collection is left as it was.
    pub async fn sync(&self, collection: SyncCollection) -> Result<usize, SyncError> {
        let base = self.api_url()?;
        let name = collection.name();
        let _guard = self.store.lock_collection(collection).await;
        tracing::info!(collection = name, "sync started");

        let local = self.read_local(collection)?;
        let mut body = Map::new();
        body.insert(name.to_string(), local);

        let url = format!("{base}{}", collection.endpoint());
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.network_failure(name, e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.network_failure(name, e))?;
        if !status.is_success() {
            let message = remote_message(&bytes, name);
            tracing::warn!(collection = name, status = status.as_u16(), %message, "sync rejected");
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let items = merged_items(&bytes)?;
        let count = match collection {
            SyncCollection::Todos => {
                let tasks = decode_tasks(items)?;
                self.store
                    .replace_tasks(&tasks)
                    .map_err(|source| SyncError::Replace { collection: name, source })?
            }
            SyncCollection::Categories => {
                let categories = decode_categories(items)?;
                self.store
                    .replace_categories(&categories)
                    .map_err(|source| SyncError::Replace { collection: name, source })?
            }
        };
        tracing::info!(collection = name, count, "sync complete");
        Ok(count)
    }

    /// A transport error means the device cannot reach the authority.
    fn network_failure(&self, name: &str, err: reqwest::Error) -> SyncError {
        if self.store.connectivity().set_online(false) {
            tracing::warn!(collection = name, error = %err, "sync request failed, marking offline");
        }
        SyncError::Network(err)
    }

    fn read_local(&self, collection: SyncCollection) -> Result<Value, SyncError> {
        let name = collection.name();
        let read_err = |source: EngineError| SyncError::Read { collection: name, source };
        match collection {
            SyncCollection::Todos => encode(self.store.get_all_tasks().map_err(read_err)?),
            SyncCollection::Categories => {
                encode(self.store.get_all_categories().map_err(read_err)?)
            }
        }
    }

    /// Whether the authority is up and is the service we expect.
    pub async fn check_backend(&self) -> BackendStatus {
        match self.verify_backend().await {
            Ok(()) => BackendStatus {
                connected: true,
                message: self.config.backend_message.clone(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "backend check failed");
                BackendStatus {
                    connected: false,
                    message: e.reason(),
                }
            }
        }
    }

    /// The authority's own view of the sync service, from `/api/sync/status`.
    pub async fn sync_status(&self) -> BackendStatus {
        match self.fetch_sync_status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "sync status check failed");
                BackendStatus {
                    connected: false,
                    message: e.reason(),
                }
            }
        }
    }

    async fn fetch_sync_status(&self) -> Result<BackendStatus, SyncError> {
        let base = self.api_url()?;
        let response = self
            .client
            .get(format!("{base}/api/sync/status"))
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message: "Backend not reachable".into(),
            });
        }
        let report: StatusReport = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::ProtocolMismatch(format!("status response: {e}")))?;
        Ok(BackendStatus {
            connected: report.connected,
            message: report.message,
        })
    }

    async fn verify_backend(&self) -> Result<(), SyncError> {
        let base = self.api_url()?;
        let response = self.client.get(format!("{base}/health")).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message: remote_message(&bytes, "health"),
            });
        }
        let health: Health = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::ProtocolMismatch(format!("health response: {e}")))?;
        if health.status != "ok" || health.message != self.config.backend_message {
            return Err(SyncError::ProtocolMismatch(format!(
                "unexpected health report: status={:?} message={:?}",
                health.status, health.message
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Health {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatusReport {
    #[serde(default)]
    connected: bool,
    #[serde(default)]
    message: String,
}

/// A merged task as returned by the authority. Its `id` is ignored.
#[derive(Debug, Deserialize)]
struct RemoteTask {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    category: Option<CategoryId>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RemoteCategory {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    count: i64,
}

fn encode<T: Serialize>(records: Vec<T>) -> Result<Value, SyncError> {
    serde_json::to_value(records)
        .map_err(|e| SyncError::ProtocolMismatch(format!("cannot encode local records: {e}")))
}

/// The error text to show for a rejected request: the body's `message` field, else the
/// raw body, else a generic line.
fn remote_message(body: &[u8], name: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        if let Some(Value::String(message)) = map.get("message") {
            return message.clone();
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        format!("Failed to sync {name}")
    } else {
        text
    }
}

fn merged_items(body: &[u8]) -> Result<Vec<Value>, SyncError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| SyncError::ProtocolMismatch(format!("response is not JSON: {e}")))?;
    let Value::Object(mut map) = payload else {
        return Err(SyncError::ProtocolMismatch("response is not an object".into()));
    };
    match map.remove("data") {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(SyncError::ProtocolMismatch("response has no `data` array".into())),
    }
}

fn decode_tasks(items: Vec<Value>) -> Result<Vec<(NewTask, i64)>, SyncError> {
    let now = clock::now_ms()
        .map_err(|e| SyncError::ProtocolMismatch(format!("cannot stamp merged tasks: {e}")))?;
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let remote: RemoteTask = serde_json::from_value(item)
                .map_err(|e| SyncError::ProtocolMismatch(format!("todos[{i}]: {e}")))?;
            let task = NewTask {
                title: remote.title,
                description: remote.description,
                priority: remote
                    .priority
                    .as_deref()
                    .and_then(|p| Priority::parse(p).ok())
                    .unwrap_or_default(),
                category: remote.category,
                completed: remote.completed,
            };
            task.validate()
                .map_err(|e| SyncError::ProtocolMismatch(format!("todos[{i}]: {e}")))?;
            Ok((task, remote.timestamp.unwrap_or(now)))
        })
        .collect()
}

fn decode_categories(items: Vec<Value>) -> Result<Vec<NewCategory>, SyncError> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let remote: RemoteCategory = serde_json::from_value(item)
                .map_err(|e| SyncError::ProtocolMismatch(format!("categories[{i}]: {e}")))?;
            Ok(NewCategory {
                name: remote.name,
                description: remote.description,
                color: remote
                    .color
                    .as_deref()
                    .and_then(|c| Color::parse(c).ok())
                    .unwrap_or_default(),
                count: remote.count,
            })
        })
        .collect()
}
