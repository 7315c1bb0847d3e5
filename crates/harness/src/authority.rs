use std::time::Duration;

use serde_json::{json, Value};
use taskdeck_engine::SyncCollection;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// An HTTP stand-in for the remote authority.
pub struct FakeAuthority {
    server: MockServer,
}

fn sync_path(collection: SyncCollection) -> String {
    format!("/api/sync/{}", collection.name())
}

impl FakeAuthority {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Drop every mounted behavior and the request log.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Answer every sync of `collection` with `data` as the merged result.
    pub async fn merge_to(&self, collection: SyncCollection, data: Value) {
        self.merge_slowly(collection, data, Duration::ZERO).await;
    }

    pub async fn merge_slowly(&self, collection: SyncCollection, data: Value, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(sync_path(collection)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": data }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer with whatever was uploaded, i.e. a merge that changes nothing.
    pub async fn echo(&self, collection: SyncCollection) {
        let name = collection.name();
        let responder = move |req: &Request| {
            let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
            let data = body.get(name).cloned().unwrap_or_else(|| json!([]));
            ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
        };
        Mock::given(method("POST"))
            .and(path(sync_path(collection)))
            .respond_with(responder)
            .mount(&self.server)
            .await;
    }

    pub async fn respond_raw(&self, collection: SyncCollection, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(sync_path(collection)))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    pub async fn health(&self, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn sync_status(&self, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path("/api/sync/status"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// The uploaded collection arrays, oldest first.
    pub async fn uploads(&self, collection: SyncCollection) -> Vec<Value> {
        let target = sync_path(collection);
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|req| req.url.path() == target)
            .filter_map(|req| serde_json::from_slice::<Value>(&req.body).ok())
            .filter_map(|body| body.get(collection.name()).cloned())
            .collect()
    }
}
