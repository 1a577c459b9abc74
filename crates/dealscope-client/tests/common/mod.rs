//! In-process DealScope server used by the HTTP integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt as _;
use serde_json::{Value, json};

/// Frames of a short successful run, cut mid-frame and mid-line.
pub const SCRIPTED_CHUNKS: &[&str] = &[
    "event: status\ndata: {\"step\": 1, \"message\": \"Searching\", \"icon\": \"search\"}\n\n",
    "event: status\ndata: {\"step\": 1, \"message\": \"12 sources\", \"icon\": \"che",
    "ck\", \"elapsed\": 3.5}\n\nevent: graph_ready\ndata: {\"neo4j_available\": false}\n",
    "\n",
];

#[derive(Clone, Default)]
struct Store {
    rows: Arc<Mutex<Vec<Value>>>,
    next_id: Arc<Mutex<i64>>,
}

pub async fn spawn_server() -> String {
    let app = Router::new()
        .route("/analyze", post(analyze))
        .route("/analyses", get(list_analyses).post(save_analysis))
        .route(
            "/analyses/{id}",
            get(load_analysis).delete(delete_analysis),
        )
        .route("/health", get(health))
        .with_state(Store::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test app");
    });
    format!("http://{addr}")
}

fn event_stream(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn analyze(headers: HeaderMap, Json(req): Json<Value>) -> Response {
    let accepts_stream = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));
    if !accepts_stream {
        return (StatusCode::NOT_ACCEPTABLE, "expected event stream").into_response();
    }

    let company = req["company"].as_str().unwrap_or_default().to_string();
    match company.as_str() {
        "boom" => (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response(),
        "plain" => (
            [(header::CONTENT_TYPE, "application/json")],
            "{\"ok\": true}",
        )
            .into_response(),
        "slow" => {
            let first = futures::stream::iter([Ok::<_, std::io::Error>(
                SCRIPTED_CHUNKS[0].to_string(),
            )]);
            event_stream(Body::from_stream(first.chain(futures::stream::pending())))
        }
        _ => {
            let complete = json!({"company": company, "stage": req["stage"], "exit_type": req["exit_type"]});
            let mut chunks: Vec<String> = SCRIPTED_CHUNKS.iter().map(|c| c.to_string()).collect();
            chunks.push(format!("event: complete\ndata: {complete}\n\n"));
            let body = futures::stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
            event_stream(Body::from_stream(body))
        }
    }
}

async fn list_analyses(State(store): State<Store>) -> Json<Vec<Value>> {
    let rows = store.rows.lock().expect("store lock");
    Json(
        rows.iter()
            .rev()
            .map(|row| {
                json!({
                    "id": row["id"],
                    "company_name": row["company_name"],
                    "sector": row["sector"],
                    "created_at": row["created_at"],
                })
            })
            .collect(),
    )
}

async fn save_analysis(State(store): State<Store>, Json(body): Json<Value>) -> Json<Value> {
    let id = {
        let mut next = store.next_id.lock().expect("id lock");
        *next += 1;
        *next
    };
    let created_at = chrono::Utc::now().to_rfc3339();
    store.rows.lock().expect("store lock").push(json!({
        "id": id,
        "company_name": body["company_name"],
        "sector": body["sector"],
        "created_at": created_at,
        "result": body["result"],
    }));
    Json(json!({"id": id, "created_at": created_at}))
}

async fn load_analysis(State(store): State<Store>, Path(id): Path<i64>) -> Response {
    let rows = store.rows.lock().expect("store lock");
    match rows.iter().find(|row| row["id"] == id) {
        Some(row) => Json(row.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "Analysis not found"})))
            .into_response(),
    }
}

async fn delete_analysis(State(store): State<Store>, Path(id): Path<i64>) -> Response {
    let mut rows = store.rows.lock().expect("store lock");
    let before = rows.len();
    rows.retain(|row| row["id"] != id);
    if rows.len() == before {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Analysis not found"})))
            .into_response();
    }
    Json(json!({"deleted": true})).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "openai_configured": true,
        "tavily_configured": false,
        "neo4j_enabled": false,
    }))
}
