//! End-to-end tests over HTTP
//!
//! Serves the PSI REST API from an axum router backed by a
//! `MockRemoteSession`, then drives it with `HttpSessionClient`.
//!
//! Test organization:
//! - Fast tests (no #[ignore]): run in CI
//! - Slow tests (#[ignore]): large datasets for manual/nightly runs

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use psi_client::{ClientError, HttpSessionClient, MockRemoteSession, Orchestrator, RemoteSession};
use psi_core::wire::{AlgorithmParameterList, AlgorithmParameterRequest, DatasetMapMessage};
use psi_core::{AlgorithmKind, AlgorithmParameter, ClientDataset, ServerDatasetPage, SessionDescriptor};
use reqwest::Client;
use serde::Deserialize;
use tokio::net::TcpListener;

const SERVER: [&str; 4] = ["COMMON1", "COMMON2", "X", "Y"];

type SharedMock = Arc<MockRemoteSession>;

struct ApiError(ClientError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ClientError::SessionNegotiation { status, message } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST),
                message.clone(),
            ),
            ClientError::SessionExpired { status, .. } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::REQUEST_TIMEOUT),
                self.0.to_string(),
            ),
            ClientError::Transport(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()),
        };
        (status, message).into_response()
    }
}

#[derive(Deserialize)]
struct PageQuery {
    page: u32,
    size: u32,
}

async fn parameters(State(mock): State<SharedMock>) -> Result<Json<AlgorithmParameterList>, ApiError> {
    let content = mock.list_parameters().await.map_err(ApiError)?;
    Ok(Json(AlgorithmParameterList { content }))
}

async fn open_session(
    State(mock): State<SharedMock>,
    Json(request): Json<AlgorithmParameterRequest>,
) -> Result<Json<SessionDescriptor>, ApiError> {
    mock.open_session(request.content).await.map(Json).map_err(ApiError)
}

async fn client_set(
    State(mock): State<SharedMock>,
    Path(session_id): Path<u64>,
    Json(message): Json<DatasetMapMessage>,
) -> Result<Json<DatasetMapMessage>, ApiError> {
    let reply = mock
        .submit_client_set(session_id, &message.content)
        .await
        .map_err(ApiError)?;
    Ok(Json(DatasetMapMessage::from(reply)))
}

async fn server_set(
    State(mock): State<SharedMock>,
    Path(session_id): Path<u64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ServerDatasetPage>, ApiError> {
    mock.fetch_server_page(session_id, query.page, query.size)
        .await
        .map(Json)
        .map_err(ApiError)
}

fn create_router(mock: SharedMock) -> Router {
    Router::new()
        .route("/psi/parameters", get(parameters))
        .route("/psi", post(open_session))
        .route("/psi/{id}/clientSet", post(client_set))
        .route("/psi/{id}/serverSet", get(server_set))
        .with_state(mock)
}

/// Test harness serving one mock on an ephemeral port
pub struct TestHarness {
    pub server_url: String,
    pub mock: SharedMock,
    pub http: Client,
    _shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_mock(MockRemoteSession::new(SERVER)).await
    }

    pub async fn with_mock(mock: MockRemoteSession) -> Self {
        let mock = Arc::new(mock);
        let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let listener = TcpListener::bind(addr).await.expect("Bind should succeed");
        let port = listener.local_addr().expect("Listener has an address").port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let router = create_router(mock.clone());
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            server_url: format!("http://127.0.0.1:{}/", port),
            mock,
            http: Client::new(),
            _shutdown: Some(shutdown_tx),
        }
    }

    pub fn client(&self) -> HttpSessionClient {
        HttpSessionClient::with_timeout(&self.server_url, Duration::from_secs(10))
            .expect("Harness URL is valid")
    }
}

fn client_dataset() -> ClientDataset {
    ["A", "B", "C", "COMMON1", "COMMON2"].into_iter().collect()
}

fn expected() -> BTreeSet<String> {
    ["COMMON1", "COMMON2"].iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_list_parameters() {
    let harness = TestHarness::new().await;
    let parameters = harness.client().list_parameters().await.unwrap();
    assert!(parameters.contains(&AlgorithmParameter::new(AlgorithmKind::EcDiffieHellman, 256)));
    assert!(parameters.contains(&AlgorithmParameter::new(AlgorithmKind::DiffieHellman, 2048)));
}

#[tokio::test]
async fn test_base_url_trailing_slash_trimmed() {
    let harness = TestHarness::new().await;
    let client = harness.client();
    assert!(!client.base_url().ends_with('/'));
}

#[tokio::test]
async fn test_full_run_ecdh_over_http() {
    let harness = TestHarness::with_mock(
        MockRemoteSession::new(SERVER).with_bloom_filter_age(chrono::Duration::minutes(2)),
    )
    .await;
    let mut orchestrator = Orchestrator::builder(Arc::new(harness.client()))
        .page_size(2)
        .bloom_filter_max_age(chrono::Duration::minutes(30))
        .build();

    let report = orchestrator.run(&client_dataset(), "ECDH", 256).await.unwrap();
    assert_eq!(report.intersection, expected());
    assert!(report.pre_filter.is_applied());
    assert_eq!(report.ingest.entries, 4);
}

#[tokio::test]
async fn test_full_run_dh_over_http() {
    let harness = TestHarness::new().await;
    let mut orchestrator = Orchestrator::builder(Arc::new(harness.client()))
        .page_size(3)
        .build();

    let report = orchestrator.run(&client_dataset(), "DH", 2048).await.unwrap();
    assert_eq!(report.intersection, expected());
    assert_eq!(report.ingest.pages, 2);
}

#[tokio::test]
async fn test_empty_pages_over_http() {
    let harness = TestHarness::with_mock(
        MockRemoteSession::new(SERVER)
            .with_max_page_size(1)
            .with_empty_pages([1, 2]),
    )
    .await;
    let mut orchestrator = Orchestrator::builder(Arc::new(harness.client())).build();

    let report = orchestrator.run(&client_dataset(), "ECDH", 256).await.unwrap();
    assert_eq!(report.intersection, expected());
    assert_eq!(report.ingest.pages, 6);
    assert_eq!(harness.mock.fetched_pages().await, vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_rejected_key_size_is_negotiation_failure() {
    let harness = TestHarness::new().await;
    let err = harness
        .client()
        .open_session(AlgorithmParameter::new(AlgorithmKind::DiffieHellman, 1024))
        .await
        .unwrap_err();
    match err {
        ClientError::SessionNegotiation { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("DH-1024"), "{}", message);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_on_submit_is_session_expired() {
    let harness = TestHarness::with_mock(MockRemoteSession::new(SERVER).expire_on_submit()).await;
    let mut orchestrator = Orchestrator::builder(Arc::new(harness.client())).build();

    let failure = orchestrator.run(&client_dataset(), "ECDH", 256).await.unwrap_err();
    assert!(matches!(failure.error, ClientError::SessionExpired { status: 408, .. }));
}

#[tokio::test]
async fn test_unknown_session_is_session_expired() {
    let harness = TestHarness::new().await;
    let err = harness.client().fetch_server_page(999, 0, 10).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired { session_id: 999, status: 404 }));
}

#[tokio::test]
async fn test_wire_shape_of_session_descriptor() {
    let harness = TestHarness::with_mock(
        MockRemoteSession::new(SERVER).with_bloom_filter_age(chrono::Duration::minutes(1)),
    )
    .await;
    let resp = harness
        .http
        .post(format!("{}psi", harness.server_url))
        .json(&serde_json::json!({"content": {"algorithm": "ECDH", "keySize": 256}}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["sessionId"].is_u64());
    assert!(body["expiration"].is_string());
    assert_eq!(body["psiClientSession"]["psiAlgorithmParameter"]["algorithm"], "ECDH");
    assert_eq!(body["psiClientSession"]["ecSpecName"], "ristretto255");
    assert!(body["bloomFilterDTO"]["serializedBloomFilter"].is_string());
    assert!(body["bloomFilterDTO"]["bloomFilterCreationDate"].is_string());
}

#[tokio::test]
async fn test_server_continues_after_error() {
    let harness = TestHarness::new().await;
    let client = harness.client();
    assert!(client.fetch_server_page(12345, 0, 10).await.is_err());
    assert!(!client.list_parameters().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Slow: thousands of 2048-bit exponentiations
async fn test_large_dh_run() {
    let server: Vec<String> = (0..2_000).map(|i| format!("entry-{}", i)).collect();
    let harness = TestHarness::with_mock(MockRemoteSession::new(server)).await;

    let client: ClientDataset = (1_500..3_000).map(|i| format!("entry-{}", i)).collect();
    let mut orchestrator = Orchestrator::builder(Arc::new(harness.client()))
        .page_size(100)
        .build();

    let report = orchestrator.run(&client, "DH", 2048).await.unwrap();
    assert_eq!(report.intersection.len(), 500);
    assert_eq!(report.ingest.pages, 20);
}
