// src/test_support.rs

use std::sync::Arc;

use axum::{
    Router,
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct ReceivedField {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ReceivedField {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }
}

#[derive(Clone)]
struct BackendState {
    status: StatusCode,
    body: &'static str,
    received: Arc<Mutex<Vec<ReceivedField>>>,
    requests: Arc<Mutex<usize>>,
}

/// Backend `/items` uruchomiony w procesie testu na losowym porcie.
pub struct FakeBackend {
    pub base_url: String,
    received: Arc<Mutex<Vec<ReceivedField>>>,
    requests: Arc<Mutex<usize>>,
}

impl FakeBackend {
    pub async fn start(status: StatusCode, body: &'static str) -> Self {
        let state = BackendState {
            status,
            body,
            received: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(0)),
        };
        let received = state.received.clone();
        let requests = state.requests.clone();

        let app = Router::new()
            .route("/items", post(receive_item).get(list_items))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            received,
            requests,
        }
    }

    pub async fn received(&self) -> Vec<ReceivedField> {
        self.received.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        *self.requests.lock().await
    }
}

async fn receive_item(
    State(state): State<BackendState>,
    mut multipart: Multipart,
) -> (StatusCode, &'static str) {
    *state.requests.lock().await += 1;
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.unwrap().to_vec();
        fields.push(ReceivedField {
            name,
            file_name,
            content_type,
            bytes,
        });
    }
    *state.received.lock().await = fields;
    (state.status, state.body)
}

async fn list_items(State(state): State<BackendState>) -> (StatusCode, &'static str) {
    *state.requests.lock().await += 1;
    (state.status, state.body)
}

/// Adres, pod którym na pewno nikt nie nasłuchuje.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
