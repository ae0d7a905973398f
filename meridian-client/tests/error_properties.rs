//! Error classification over every body shape the backend produces.

use meridian_client::{ApiRequest, Method, SyncError, Transport};
use meridian_test_utils::generators::{arb_error_body, arb_error_status};
use meridian_test_utils::MockTransport;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_non_success_is_never_ok_and_message_never_empty(
        status in arb_error_status(),
        body in arb_error_body(),
    ) {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/accounts", status, body.clone());
        let result = runtime().block_on(mock.send(ApiRequest::get("/accounts")));

        let err = result.unwrap_err();
        prop_assert_eq!(&err, &SyncError::from_response(status, &body));
        let message = err.user_message("Failed to load accounts");
        prop_assert!(!message.trim().is_empty());
        prop_assert!(!message.contains('{'), "message contains a brace: {}", message);
        prop_assert_eq!(err.is_retryable(), status >= 500);
    }
}

#[tokio::test]
async fn test_unscripted_route_is_a_business_error() {
    let mock = MockTransport::new();
    let err = mock.send(ApiRequest::get("/nowhere")).await.unwrap_err();
    assert!(matches!(err, SyncError::Business { status: 404, .. }));
}

#[tokio::test]
async fn test_transport_failure_is_retryable() {
    let mock = MockTransport::new();
    mock.fail_once(Method::Get, "/accounts", SyncError::transport("connection reset"));
    mock.respond(Method::Get, "/accounts", 200, serde_json::json!([]));

    let first = mock.send(ApiRequest::get("/accounts")).await;
    let second = mock.send(ApiRequest::get("/accounts")).await;

    assert!(first.unwrap_err().is_retryable());
    assert!(second.is_ok());
    assert_eq!(mock.request_count(), 2);
}
