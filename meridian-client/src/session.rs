//! Session state and the 401 interceptor.

use crate::auth::TokenStore;
use crate::http::{ApiRequest, ApiResponse, Transport};
use async_trait::async_trait;
use meridian_core::SyncError;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A token is present and has not been rejected.
    Active,
    /// The backend rejected the token; the UI should route to login.
    LoginRequired,
    /// The user logged out.
    SignedOut,
}

/// Process-wide session status feed. Clones share one channel.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: Arc<watch::Sender<SessionEvent>>,
}

impl SessionEvents {
    pub fn new(initial: SessionEvent) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> SessionEvent {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        self.sender.send_replace(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(SessionEvent::SignedOut)
    }
}

/// Wraps a transport so that any 401 clears the stored token and publishes
/// [`SessionEvent::LoginRequired`], whichever call triggered it.
pub struct SessionGuard<T> {
    inner: T,
    tokens: Arc<dyn TokenStore>,
    events: SessionEvents,
}

impl<T> SessionGuard<T> {
    pub fn new(inner: T, tokens: Arc<dyn TokenStore>, events: SessionEvents) -> Self {
        Self {
            inner,
            tokens,
            events,
        }
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn expire(&self, request: &ApiRequest) {
        if let Err(err) = self.tokens.clear() {
            tracing::warn!(error = %err, "Failed to clear access token");
        }
        tracing::warn!(
            method = %request.method,
            path = %request.path,
            "Session rejected by backend; login required"
        );
        self.events.publish(SessionEvent::LoginRequired);
    }
}

#[async_trait]
impl<T: Transport> Transport for SessionGuard<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
        let target = request.clone();
        match self.inner.send(request).await {
            Err(SyncError::Unauthorized) => {
                self.expire(&target);
                Err(SyncError::Unauthorized)
            }
            other => other,
        }
    }
}
