//! In-process stand-in for the chart endpoint.

use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

pub(crate) enum FakeReply {
    Json(Value),
    Status(u16),
    Text(String),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SeenRequest {
    pub fields: Vec<(String, String)>,
    pub file_name: Option<String>,
}

impl SeenRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

pub(crate) struct FakeServer {
    pub url: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl FakeServer {
    pub fn last_request(&self) -> Option<SeenRequest> {
        self.seen.lock().unwrap().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

type ServerState = (Arc<FakeReply>, Arc<Mutex<Vec<SeenRequest>>>);

pub(crate) async fn spawn_chart_server(reply: FakeReply) -> FakeServer {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/chart-data", post(handle))
        .with_state((Arc::new(reply), seen.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeServer {
        url: format!("http://{}/chart-data", addr),
        seen,
    }
}

/// URL on a port that was bound and released, so connections are refused.
pub(crate) async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/chart-data", addr)
}

async fn handle(State((reply, seen)): State<ServerState>, mut multipart: Multipart) -> Response {
    let mut request = SeenRequest::default();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(file_name) = field.file_name() {
            request.file_name = Some(file_name.to_string());
        }
        let value = field.text().await.unwrap();
        request.fields.push((name, value));
    }
    seen.lock().unwrap().push(request);

    match reply.as_ref() {
        FakeReply::Json(body) => Json(body.clone()).into_response(),
        FakeReply::Status(code) => (
            StatusCode::from_u16(*code).unwrap(),
            "internal error",
        )
            .into_response(),
        FakeReply::Text(body) => body.clone().into_response(),
    }
}
