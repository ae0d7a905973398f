//! The sync context: one transport, one cache, one notification center.
//!
//! Everything a feature needs is passed explicitly through [`SyncContext`];
//! there is no global client. Clones share all state.

use crate::auth::{FileTokenStore, MemoryTokenStore, TokenStore};
use crate::error::ClientError;
use crate::http::{ApiRequest, ApiResponse, RestClient, SharedTransport, Transport};
use crate::resource::{Resource, ResourceSpec};
use crate::session::{SessionEvent, SessionEvents, SessionGuard};
use meridian_cache::{
    FetchOptions, Mutation, MutationDescriptor, NotificationCenter, Query, QueryCache,
};
use meridian_core::{CacheKey, MeridianConfig, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const LOGIN_PATH: &str = "/auth/login";
const EXPIRY_TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Clone)]
pub struct SyncContext {
    transport: SharedTransport,
    cache: QueryCache,
    notifications: NotificationCenter,
    tokens: Arc<dyn TokenStore>,
    session: SessionEvents,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("cache", &self.cache)
            .field("notifications", &self.notifications)
            .field("session", &self.session.current())
            .finish()
    }
}

impl SyncContext {
    /// Wire a context from configuration: token store, REST client behind the
    /// 401 interceptor, cache and notification center.
    pub fn from_config(config: &MeridianConfig) -> Result<Self, ClientError> {
        let tokens: Arc<dyn TokenStore> = match &config.session.token_path {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        let rest = RestClient::from_config(&config.api, Arc::clone(&tokens))?;
        Self::with_transport(rest, tokens, config)
    }

    /// Like [`SyncContext::from_config`] with a caller-supplied transport.
    /// The transport is still wrapped in the 401 interceptor.
    pub fn with_transport<T>(
        transport: T,
        tokens: Arc<dyn TokenStore>,
        config: &MeridianConfig,
    ) -> Result<Self, ClientError>
    where
        T: Transport + 'static,
    {
        let initial = if tokens.load()?.is_some() {
            SessionEvent::Active
        } else {
            SessionEvent::SignedOut
        };
        let session = SessionEvents::new(initial);
        let guarded = SessionGuard::new(transport, Arc::clone(&tokens), session.clone());
        Ok(Self {
            transport: Arc::new(guarded),
            cache: QueryCache::new(config.cache.clone()),
            notifications: NotificationCenter::new(config.notifications.clone()),
            tokens,
            session,
        })
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn session(&self) -> &SessionEvents {
        &self.session
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Start periodic eviction of inactive cache entries.
    pub fn spawn_gc(&self) -> JoinHandle<()> {
        self.cache.spawn_gc(self.cache.settings().gc_interval())
    }

    /// Start auto-dismissal of notifications whose duration has elapsed.
    pub fn spawn_expiry(&self) -> JoinHandle<()> {
        self.notifications.spawn_expiry(EXPIRY_TICK)
    }

    pub fn resource<S: ResourceSpec>(&self) -> Resource<S> {
        Resource::new(self.clone())
    }

    /// Bind a GET request to `key`, decoding the body with `decode`.
    pub fn fetch<T, D>(
        &self,
        key: CacheKey,
        options: FetchOptions,
        request: ApiRequest,
        decode: D,
    ) -> Query<T>
    where
        T: Send + Sync + 'static,
        D: Fn(&Value) -> Result<T, SyncError> + Send + Sync + 'static,
    {
        let transport = Arc::clone(&self.transport);
        let decode = Arc::new(decode);
        self.cache.query(key, options, move || {
            let transport = Arc::clone(&transport);
            let request = request.clone();
            let decode = Arc::clone(&decode);
            async move {
                let response = transport.send(request).await?;
                decode(&response.data)
            }
        })
    }

    /// Bind a write: `build` turns the payload into a request, `decode` turns
    /// the response into the mutation result.
    pub fn mutation<P, R, B, D>(
        &self,
        descriptor: impl MutationDescriptor<P, R>,
        build: B,
        decode: D,
    ) -> Mutation<P, R>
    where
        P: Clone + Send + Sync + 'static,
        R: Clone + Send + Sync + 'static,
        B: Fn(&P) -> Result<ApiRequest, SyncError> + Send + Sync + 'static,
        D: Fn(&P, &ApiResponse) -> Result<R, SyncError> + Send + Sync + 'static,
    {
        let transport = Arc::clone(&self.transport);
        let build = Arc::new(build);
        let decode = Arc::new(decode);
        Mutation::new(
            self.cache.clone(),
            self.notifications.clone(),
            descriptor,
            move |payload: P| {
                let transport = Arc::clone(&transport);
                let build = Arc::clone(&build);
                let decode = Arc::clone(&decode);
                async move {
                    let request = build(&payload)?;
                    let response = transport.send(request).await?;
                    decode(&payload, &response)
                }
            },
        )
    }

    /// Exchange credentials for a bearer token and store it.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), SyncError> {
        let request = ApiRequest::post(LOGIN_PATH).with_json(credentials)?;
        let response: LoginResponse = self.transport.send(request).await?.decode()?;
        self.set_token(&response.access_token)
            .map_err(|e| SyncError::unexpected(e.to_string()))?;
        tracing::info!(username = %credentials.username, "Logged in");
        Ok(())
    }

    pub fn set_token(&self, token: &str) -> Result<(), ClientError> {
        self.tokens.save(token)?;
        self.session.publish(SessionEvent::Active);
        Ok(())
    }

    /// Forget the token and every cached read.
    pub fn logout(&self) -> Result<(), ClientError> {
        self.tokens.clear()?;
        self.cache.clear();
        self.notifications.clear();
        self.session.publish(SessionEvent::SignedOut);
        tracing::info!("Logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct LoginBackend;

    #[async_trait]
    impl Transport for LoginBackend {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
            match request.path.as_str() {
                LOGIN_PATH => Ok(ApiResponse::ok(json!({"access_token": "fresh"}))),
                _ => Err(SyncError::Unauthorized),
            }
        }
    }

    fn context() -> SyncContext {
        SyncContext::with_transport(
            LoginBackend,
            Arc::new(MemoryTokenStore::new()),
            &MeridianConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_login_stores_token_and_activates_session() {
        let ctx = context();
        assert_eq!(ctx.session().current(), SessionEvent::SignedOut);
        ctx.login(&Credentials::new("ada", "secret")).await.unwrap();
        assert_eq!(ctx.tokens().load().unwrap().as_deref(), Some("fresh"));
        assert_eq!(ctx.session().current(), SessionEvent::Active);
    }

    #[tokio::test]
    async fn test_any_401_requires_login() {
        let ctx = context();
        ctx.set_token("stale").unwrap();
        let result = ctx.transport().send(ApiRequest::get("/budgets/summary")).await;
        assert_eq!(result, Err(SyncError::Unauthorized));
        assert_eq!(ctx.session().current(), SessionEvent::LoginRequired);
        assert_eq!(ctx.tokens().load().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_auto_dismiss() {
        let ctx = context();
        let _expiry = ctx.spawn_expiry();
        ctx.notifications().success("Success", Some("Account created".into()));

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(ctx.notifications().len(), 1);
        let default = ctx.notifications().settings().default_duration();
        tokio::time::sleep(default).await;
        assert!(ctx.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_cache_and_notifications() {
        let ctx = context();
        ctx.set_token("tok").unwrap();
        ctx.notifications().info("Welcome", None);
        let query = ctx.cache().query(
            meridian_core::KeyFactory::new("accounts").lists(),
            ctx.cache().default_options(),
            || async { Ok::<_, SyncError>(1u8) },
        );
        query.load().await;
        assert!(!ctx.cache().is_empty());

        ctx.logout().unwrap();
        assert!(ctx.cache().is_empty());
        assert!(ctx.notifications().is_empty());
        assert_eq!(ctx.session().current(), SessionEvent::SignedOut);
    }
}
