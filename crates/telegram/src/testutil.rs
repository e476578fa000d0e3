//! In-process mock of the Telegram Bot API for integration-style tests.
//!
//! Captures every request the engine issues and answers with canned
//! responses, so tests can assert on the exact API traffic without touching
//! the network.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};

use {
    axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
    serde_json::{Value, json},
    tokio::{net::TcpListener, sync::oneshot, task::JoinHandle},
};

/// One captured Bot API request.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    /// Parsed JSON body; `None` for multipart uploads.
    pub body: Option<Value>,
}

#[derive(Clone)]
struct MockState {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    next_message_id: Arc<AtomicI64>,
}

pub struct MockApi {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
    url: reqwest::Url,
}

impl MockApi {
    pub async fn start() -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            requests: Arc::clone(&requests),
            next_message_id: Arc::new(AtomicI64::new(1)),
        };
        let app = Router::new()
            .route("/{*path}", post(handler))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });
        let url = reqwest::Url::parse(&format!("http://{addr}/")).expect("parse mock url");

        Self {
            requests,
            shutdown: Some(shutdown_tx),
            server,
            url,
        }
    }

    pub fn bot(&self) -> teloxide::Bot {
        teloxide::Bot::new("123456:TEST").set_api_url(self.url.clone())
    }

    pub fn url(&self) -> reqwest::Url {
        self.url.clone()
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.method == method)
            .count()
    }

    /// Bodies of all captured requests for `method`, in arrival order.
    pub fn bodies(&self, method: &str) -> Vec<Value> {
        self.requests()
            .iter()
            .filter(|request| request.method == method)
            .filter_map(|request| request.body.clone())
            .collect()
    }

    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.server.await;
    }
}

async fn handler(State(state): State<MockState>, uri: Uri, body: Bytes) -> Json<Value> {
    let method = uri
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let body_json = serde_json::from_slice::<Value>(&body).ok();
    state
        .requests
        .lock()
        .expect("requests lock")
        .push(CapturedRequest {
            method: method.clone(),
            body: body_json.clone(),
        });

    let result = match method.as_str() {
        "SendMessage" | "EditMessageText" | "SendPhoto" | "SendVoice" | "SendVideo"
        | "SendDocument" => {
            let id = state.next_message_id.fetch_add(1, Ordering::SeqCst);
            let chat_id = body_json
                .as_ref()
                .and_then(|b| b.get("chat_id"))
                .and_then(Value::as_i64)
                .unwrap_or(42);
            let text = body_json
                .as_ref()
                .and_then(|b| b.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("ok");
            json!({
                "message_id": id,
                "date": 1,
                "chat": { "id": chat_id, "type": "private", "first_name": "Test" },
                "text": text
            })
        }
        "GetMe" => json!({
            "id": 1000,
            "is_bot": true,
            "first_name": "pontis",
            "username": "pontis_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "has_main_web_app": false
        }),
        "GetFile" => json!({
            "file_id": "file-1",
            "file_unique_id": "unique-1",
            "file_size": 3,
            "file_path": "documents/file_1.bin"
        }),
        "GetUpdates" => json!([]),
        // DeleteWebhook, DeleteMyCommands, SetMyCommands, ...
        _ => json!(true),
    };

    Json(json!({ "ok": true, "result": result }))
}
