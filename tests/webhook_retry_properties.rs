use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use event_scheduler::scheduling::error::SchedulingError;
use event_scheduler::scheduling::webhook::WebhookClient;
use serde_json::json;

async fn spawn_fake_endpoint(
    responses: Vec<StatusCode>,
) -> (String, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let responses = Arc::new(responses);

    #[derive(Clone)]
    struct FakeState {
        counter: Arc<AtomicUsize>,
        responses: Arc<Vec<StatusCode>>,
    }

    async fn handler(State(state): State<FakeState>) -> StatusCode {
        let attempt = state.counter.fetch_add(1, Ordering::SeqCst);
        state
            .responses
            .get(attempt)
            .copied()
            .unwrap_or(*state.responses.last().unwrap())
    }

    let state = FakeState { counter: counter.clone(), responses };
    let app = Router::new().route("/webhook", post(handler)).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/webhook"), counter, handle)
}

#[tokio::test]
async fn webhook_retries_transient_failures_then_succeeds() {
    let (url, counter, server) = spawn_fake_endpoint(vec![
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::OK,
    ])
    .await;

    let client = WebhookClient::new();
    let result = client
        .deliver(&url, &json!({"hello": "world"}), "event-0000000000000000")
        .await;

    assert!(result.is_ok());
    assert_eq!(counter.load(Ordering::SeqCst), 4, "one initial attempt plus the full retry budget");
    server.abort();
}

#[tokio::test]
async fn webhook_exhausts_retry_budget_on_persistent_transient_failure() {
    let (url, counter, server) = spawn_fake_endpoint(vec![StatusCode::SERVICE_UNAVAILABLE; 8]).await;

    let client = WebhookClient::new();
    let result = client
        .deliver(&url, &json!({"hello": "world"}), "event-0000000000000000")
        .await;

    assert!(matches!(result, Err(SchedulingError::InfrastructureError(_))));
    assert_eq!(counter.load(Ordering::SeqCst), 4, "exactly one initial attempt plus three retries");
    server.abort();
}

#[tokio::test]
async fn webhook_does_not_retry_permanent_client_errors() {
    let (url, counter, server) = spawn_fake_endpoint(vec![StatusCode::BAD_REQUEST]).await;

    let client = WebhookClient::new();
    let result = client
        .deliver(&url, &json!({"hello": "world"}), "event-0000000000000000")
        .await;

    assert!(matches!(
        result,
        Err(SchedulingError::PermanentDeliveryError { status_code: 400 })
    ));
    assert_eq!(counter.load(Ordering::SeqCst), 1, "permanent errors must not be retried");
    server.abort();
}
