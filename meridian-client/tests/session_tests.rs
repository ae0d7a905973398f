//! Session handling: 401 interception, token persistence, logout.

use meridian_client::features::NewAccount;
use meridian_client::{
    FileTokenStore, FilterParams, Method, SessionEvent, SyncContext, SyncError, TokenStore,
};
use meridian_test_utils::fixtures;
use meridian_test_utils::MockTransport;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_unauthorized_read_requires_login() {
    let mock = MockTransport::new();
    mock.respond(Method::Get, "/accounts", 401, json!({"detail": "Not authenticated"}));
    let ctx = fixtures::context(&mock);
    let mut events = ctx.session().subscribe();
    assert_eq!(ctx.session().current(), SessionEvent::Active);

    let list = ctx.accounts().list(&FilterParams::new());
    list.load().await;

    assert_eq!(list.error(), Some(SyncError::Unauthorized));
    assert!(events.has_changed().unwrap());
    assert_eq!(*events.borrow_and_update(), SessionEvent::LoginRequired);
    assert_eq!(ctx.tokens().load().unwrap(), None);
}

#[tokio::test]
async fn test_unauthorized_write_shows_session_message() {
    let mock = MockTransport::new();
    mock.respond(Method::Post, "/accounts", 401, json!({}));
    let ctx = fixtures::context(&mock);

    let result = ctx
        .accounts()
        .create()
        .mutate_async(NewAccount {
            name: "Initech".into(),
            industry: None,
        })
        .await;

    assert_eq!(result, Err(SyncError::Unauthorized));
    assert_eq!(ctx.session().current(), SessionEvent::LoginRequired);
    let shown = ctx.notifications().visible();
    assert_eq!(shown[0].title, "Error");
    assert_eq!(
        shown[0].description.as_deref(),
        Some("Your session has expired. Please sign in again.")
    );
}

#[tokio::test]
async fn test_login_persists_token_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session").join("token.json");
    let mock = MockTransport::new();
    mock.respond(Method::Post, "/auth/login", 200, json!({"access_token": "abc123"}));
    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&path));
    let ctx = SyncContext::with_transport(mock.clone(), tokens, &fixtures::test_config()).unwrap();
    assert_eq!(ctx.session().current(), SessionEvent::SignedOut);

    ctx.login(&meridian_client::Credentials::new("ada", "hunter2"))
        .await
        .unwrap();

    let reopened = FileTokenStore::new(&path);
    assert_eq!(reopened.load().unwrap().as_deref(), Some("abc123"));
    let login = &mock.requests()[0];
    assert_eq!(login.body, Some(json!({"username": "ada", "password": "hunter2"})));
}

#[tokio::test]
async fn test_logout_drops_cached_reads() {
    let mock = MockTransport::new();
    mock.respond(Method::Get, "/accounts", 200, json!([fixtures::account("A1", "Acme")]));
    let ctx = fixtures::context(&mock);
    let list = ctx.accounts().list(&FilterParams::new());
    list.load().await;
    assert!(list.data().is_some());

    ctx.logout().unwrap();

    assert!(list.data().is_none());
    assert_eq!(ctx.session().current(), SessionEvent::SignedOut);
    list.load().await;
    assert_eq!(mock.count(Method::Get, "/accounts"), 2);
}
