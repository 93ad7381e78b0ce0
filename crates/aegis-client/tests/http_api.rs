//! Drives a real `Session` over `ReqwestTransport` against an in-process
//! axum server.

use std::sync::Arc;

use aegis_client::models::{ApprovePermitPayload, InspeksiQuery, InspeksiStatus, PermitStatus};
use aegis_client::stats::{StatusFilter, filter_inspeksi, tally_inspeksi};
use aegis_client::{ClientConfig, ClientError, LoginCredentials, MemoryCredentialStore, Session};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

#[derive(Clone, Default)]
struct MockState {
    valid_token: Arc<Mutex<String>>,
    refreshes: Arc<Mutex<u32>>,
    request_ids: Arc<Mutex<Vec<String>>>,
    queries: Arc<Mutex<Vec<String>>>,
}

struct MockApiHandle {
    base_url: String,
    state: MockState,
    shutdown: oneshot::Sender<()>,
}

async fn spawn_mock_api() -> MockApiHandle {
    let state = MockState::default();
    let router = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/inspeksi", get(list_inspeksi))
        .route("/api/permits/:id/approve", post(approve_permit))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock api");
    let addr = listener.local_addr().expect("mock api addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        if let Err(err) = server.await {
            tracing::error!(error = %err, "mock api failed");
        }
    });

    MockApiHandle {
        base_url: format!("http://{addr}/api"),
        state,
        shutdown: shutdown_tx,
    }
}

async fn login(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    if body["password"] != "secret" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Invalid credentials" })),
        )
            .into_response();
    }
    *state.valid_token.lock().await = "AT1".to_string();
    Json(json!({
        "success": true,
        "data": {
            "user": { "id": 1, "name": "Rina", "email": body["email"], "role": "safety_officer" },
            "accessToken": "AT1",
            "refreshToken": "RT1"
        }
    }))
    .into_response()
}

async fn refresh(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    if body["refreshToken"] != "RT1" {
        return StatusCode::FORBIDDEN.into_response();
    }
    *state.refreshes.lock().await += 1;
    *state.valid_token.lock().await = "AT2".to_string();
    Json(json!({
        "success": true,
        "data": { "accessToken": "AT2", "refreshToken": "RT2" }
    }))
    .into_response()
}

async fn authorize(state: &MockState, headers: &HeaderMap) -> bool {
    if let Some(id) = headers.get("x-request-id").and_then(|value| value.to_str().ok()) {
        state.request_ids.lock().await.push(id.to_string());
    }
    let expected = format!("Bearer {}", state.valid_token.lock().await);
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected)
}

async fn list_inspeksi(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    if !authorize(&state, &headers).await {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let rendered = query
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    state.queries.lock().await.push(rendered);
    let record = |id: u32, status: &str| {
        json!({
            "id": id,
            "title": format!("APAR check {id}"),
            "description": "",
            "location": "Gudang A",
            "status": status,
            "inspector": { "id": 3, "name": "Rina" },
            "createdAt": "2024-05-01T08:00:00Z",
            "updatedAt": "2024-05-01T08:00:00Z"
        })
    };
    Json(json!({
        "success": true,
        "data": [record(1, "safe"), record(2, "unsafe"), record(3, "safe")],
        "meta": { "total": 3, "page": 1, "perPage": 10, "totalPages": 1 }
    }))
    .into_response()
}

async fn approve_permit(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !authorize(&state, &headers).await {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let status = if body["approved"] == true { "approved" } else { "rejected" };
    Json(json!({
        "success": true,
        "data": {
            "id": id,
            "permitNumber": "PTW-001",
            "type": "hot_work",
            "title": "Welding on line 3",
            "location": "Workshop",
            "status": status,
            "startDate": "2024-05-02",
            "endDate": "2024-05-03",
            "requester": { "id": 8, "name": "Andi" },
            "rejectionReason": body.get("rejectionReason"),
            "createdAt": "2024-05-01T08:00:00Z",
            "updatedAt": "2024-05-01T09:00:00Z"
        }
    }))
    .into_response()
}

fn session_for(mock: &MockApiHandle) -> Session {
    Session::connect(
        ClientConfig::new(mock.base_url.clone()),
        Arc::new(MemoryCredentialStore::default()),
    )
    .expect("session")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_list_and_refresh_over_http() {
    let mock = spawn_mock_api().await;
    let session = session_for(&mock);

    let user = session
        .login(&LoginCredentials::new("rina@k3.example.com", "secret"))
        .await
        .expect("login");
    assert!(user.can_approve_permits());

    let query = InspeksiQuery {
        status: Some(InspeksiStatus::Safe),
        page: Some(1),
        limit: None,
    };
    let page = session.api().list_inspeksi(&query).await.expect("list");
    assert_eq!(page.meta.total, 3);
    assert_eq!(tally_inspeksi(&page.data).safe, 2);
    assert_eq!(
        filter_inspeksi(&page.data, StatusFilter::Only(InspeksiStatus::Unsafe)).len(),
        1
    );

    *mock.state.valid_token.lock().await = "rotated-server-side".to_string();
    let permit = session
        .api()
        .approve_permit("7", &ApprovePermitPayload::reject("Missing gas test"))
        .await
        .expect("approve after refresh");
    assert_eq!(permit.id, "7");
    assert_eq!(permit.status, PermitStatus::Rejected);
    assert_eq!(permit.rejection_reason.as_deref(), Some("Missing gas test"));

    assert_eq!(*mock.state.refreshes.lock().await, 1);
    assert_eq!(
        session.dispatcher().store().access_token().as_deref(),
        Some("AT2")
    );
    assert_eq!(mock.state.queries.lock().await.as_slice(), ["status=safe&page=1"]);
    let ids = mock.state.request_ids.lock().await.clone();
    assert!(!ids.is_empty());
    assert!(ids.iter().all(|id| id.starts_with("req_")));

    let _ = mock.shutdown.send(());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_password_is_reported_with_server_message() {
    let mock = spawn_mock_api().await;
    let session = session_for(&mock);

    let error = session
        .login(&LoginCredentials::new("rina@k3.example.com", "nope"))
        .await
        .expect_err("rejected");
    assert!(matches!(error, ClientError::Auth { message } if message == "Invalid credentials"));
    assert!(!session.is_authenticated());

    let _ = mock.shutdown.send(());
}
