//! In-process stand-in for a remote mount service endpoint

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

#[derive(Debug, Default)]
struct ServiceState {
    sessions: HashMap<String, Value>,
    deletes: Vec<(String, bool)>,
    down: bool,
    /// Acknowledge setup and delete with empty bodies
    bare_replies: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StubService {
    state: Arc<Mutex<ServiceState>>,
}

impl StubService {
    /// Serve on an ephemeral port; the returned URL is the endpoint base.
    pub async fn spawn() -> (Self, Url) {
        let service = Self::default();
        let app = Router::new()
            .route("/api/mounts/:id", get(check).post(setup).delete(remove))
            .with_state(service.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = Url::parse(&format!("http://{addr}/api")).unwrap();
        (service, url)
    }

    pub fn set_down(&self, down: bool) {
        self.state.lock().unwrap().down = down;
    }

    pub fn set_bare_replies(&self, bare: bool) {
        self.state.lock().unwrap().bare_replies = bare;
    }

    pub fn session(&self, record_id: &str) -> Option<Value> {
        self.state.lock().unwrap().sessions.get(record_id).cloned()
    }

    pub fn drop_session(&self, record_id: &str) {
        self.state.lock().unwrap().sessions.remove(record_id);
    }

    pub fn deletes(&self) -> Vec<(String, bool)> {
        self.state.lock().unwrap().deletes.clone()
    }
}

fn unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "service down").into_response()
}

async fn check(State(service): State<StubService>, Path(id): Path<String>) -> Response {
    let state = service.state.lock().unwrap();
    if state.down {
        return unavailable();
    }
    if state.sessions.contains_key(&id) {
        Json(json!({ "mounted": true })).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn setup(
    State(service): State<StubService>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = service.state.lock().unwrap();
    if state.down {
        return unavailable();
    }
    state.sessions.insert(id, body);
    if state.bare_replies {
        return StatusCode::CREATED.into_response();
    }
    Json(json!({ "mounted": true })).into_response()
}

async fn remove(
    State(service): State<StubService>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = service.state.lock().unwrap();
    if state.down {
        return unavailable();
    }
    let cleanup = query.get("cleanup").is_some_and(|v| v == "true");
    state.deletes.push((id.clone(), cleanup));
    let bare = state.bare_replies;
    match state.sessions.remove(&id) {
        Some(_) if bare => StatusCode::NO_CONTENT.into_response(),
        Some(_) => Json(json!({ "mounted": false })).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
