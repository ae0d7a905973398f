//! Meridian Test Utilities
//!
//! Shared test infrastructure for the Meridian workspace:
//! - A scripted mock transport with gated responses and a request log
//! - Context and record fixtures
//! - Proptest generators for keys, filters and error bodies

pub use meridian_cache::{InvalidationPlan, QueryCache, RetryPolicy};
pub use meridian_client::{
    ApiRequest, ApiResponse, MemoryTokenStore, Method, SyncContext, Transport,
};
pub use meridian_core::{CacheKey, FilterParams, KeyFactory, MeridianConfig, SyncError};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

type Outcome = Result<(u16, Value), SyncError>;

enum Reply {
    Status(u16, Value),
    Fail(SyncError),
    Gated(oneshot::Receiver<Outcome>),
}

#[derive(Default)]
struct Route {
    queued: VecDeque<Reply>,
    fallback: Option<(u16, Value)>,
}

#[derive(Default)]
struct MockState {
    routes: HashMap<String, Route>,
    log: Vec<ApiRequest>,
}

struct MockInner {
    state: Mutex<MockState>,
    requests: watch::Sender<usize>,
}

/// Scripted [`Transport`] keyed by `METHOD path?query`.
///
/// Queued replies (`respond_once`, `fail_once`, `gate`) are consumed in order;
/// after that the route's `respond` fallback is used. Unscripted requests get
/// a 404. Non-2xx statuses are classified with [`SyncError::from_response`],
/// exactly as the REST client does. Clones share the script and the log.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

/// Releases one held response.
pub struct Gate {
    sender: oneshot::Sender<Outcome>,
}

impl Gate {
    pub fn respond(self, status: u16, body: Value) {
        let _ = self.sender.send(Ok((status, body)));
    }

    pub fn fail(self, err: SyncError) {
        let _ = self.sender.send(Err(err));
    }
}

fn route_key(method: Method, target: &str) -> String {
    format!("{} {}", method, target)
}

impl MockTransport {
    pub fn new() -> Self {
        let (requests, _) = watch::channel(0);
        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState::default()),
                requests,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn route(&self, method: Method, target: &str, edit: impl FnOnce(&mut Route)) {
        let mut state = self.state();
        edit(state.routes.entry(route_key(method, target)).or_default());
    }

    /// Answer every request to `target` with `status` and `body`.
    pub fn respond(&self, method: Method, target: &str, status: u16, body: Value) -> &Self {
        self.route(method, target, |route| route.fallback = Some((status, body)));
        self
    }

    /// Answer the next request to `target` only.
    pub fn respond_once(&self, method: Method, target: &str, status: u16, body: Value) -> &Self {
        self.route(method, target, |route| route.queued.push_back(Reply::Status(status, body)));
        self
    }

    /// Fail the next request to `target` below the HTTP layer.
    pub fn fail_once(&self, method: Method, target: &str, err: SyncError) -> &Self {
        self.route(method, target, |route| route.queued.push_back(Reply::Fail(err)));
        self
    }

    /// Hold the next request to `target` until the returned gate is released.
    pub fn gate(&self, method: Method, target: &str) -> Gate {
        let (sender, receiver) = oneshot::channel();
        self.route(method, target, |route| route.queued.push_back(Reply::Gated(receiver)));
        Gate { sender }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state().log.clone()
    }

    pub fn request_count(&self) -> usize {
        *self.inner.requests.borrow()
    }

    /// Requests received for one route.
    pub fn count(&self, method: Method, target: &str) -> usize {
        self.state()
            .log
            .iter()
            .filter(|request| request.method == method && request.target() == target)
            .count()
    }

    /// Wait until at least `n` requests have arrived.
    pub async fn wait_for_requests(&self, n: usize) {
        let mut receiver = self.inner.requests.subscribe();
        let _ = receiver.wait_for(|count| *count >= n).await;
    }

    fn take_reply(&self, request: &ApiRequest) -> Option<Reply> {
        let mut state = self.state();
        state.log.push(request.clone());
        let route = state
            .routes
            .get_mut(&route_key(request.method, &request.target()))?;
        match route.queued.pop_front() {
            Some(reply) => Some(reply),
            None => route
                .fallback
                .clone()
                .map(|(status, body)| Reply::Status(status, body)),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn finish(status: u16, body: Value) -> Result<ApiResponse, SyncError> {
    if (200..300).contains(&status) {
        Ok(ApiResponse::new(status, body))
    } else {
        Err(SyncError::from_response(status, &body))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
        let reply = self.take_reply(&request);
        self.inner.requests.send_modify(|count| *count += 1);
        match reply {
            Some(Reply::Status(status, body)) => finish(status, body),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Gated(receiver)) => match receiver.await {
                Ok(Ok((status, body))) => finish(status, body),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(SyncError::transport("gate dropped")),
            },
            None => finish(
                404,
                json!({"detail": format!("no route for {} {}", request.method, request.target())}),
            ),
        }
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    pub const TEST_TOKEN: &str = "test-token";

    /// Defaults with retries disabled so failures surface immediately.
    pub fn test_config() -> MeridianConfig {
        let mut config = MeridianConfig::default();
        config.cache.retry = 0;
        config
    }

    /// A signed-in context over `transport`.
    pub fn context(transport: &MockTransport) -> SyncContext {
        context_with(transport, &test_config())
    }

    pub fn context_with(transport: &MockTransport, config: &MeridianConfig) -> SyncContext {
        let tokens = Arc::new(MemoryTokenStore::with_token(TEST_TOKEN));
        match SyncContext::with_transport(transport.clone(), tokens, config) {
            Ok(ctx) => ctx,
            Err(err) => panic!("failed to build test context: {}", err),
        }
    }

    pub fn filters(pairs: &[(&str, &str)]) -> FilterParams {
        pairs
            .iter()
            .fold(FilterParams::new(), |params, (k, v)| params.with(*k, *v))
    }

    pub fn fresh_id(prefix: &str) -> String {
        format!("{}-{}", prefix, uuid::Uuid::now_v7().simple())
    }

    pub fn account(id: &str, name: &str) -> Value {
        json!({"id": id, "name": name, "status": "active"})
    }

    pub fn contact(id: &str, account_id: &str, first_name: &str, is_primary: bool) -> Value {
        json!({
            "id": id,
            "account_id": account_id,
            "first_name": first_name,
            "last_name": "Tester",
            "is_primary": is_primary,
        })
    }

    pub fn requisition(id: &str, title: &str, amount: f64) -> Value {
        json!({"id": id, "title": title, "amount": amount, "status": "submitted"})
    }

    pub fn invoice(id: &str, amount: f64, balance_due: f64) -> Value {
        let status = if balance_due > 0.0 { "open" } else { "paid" };
        json!({
            "id": id,
            "number": format!("INV-{}", id),
            "amount": amount,
            "balance_due": balance_due,
            "status": status,
        })
    }

    pub fn proposal(id: &str, account_id: &str, opportunity_id: &str) -> Value {
        json!({
            "id": id,
            "account_id": account_id,
            "opportunity_id": opportunity_id,
            "title": "Proposal",
            "status": "draft",
        })
    }

    pub fn budget_summary(allocated: f64, committed: f64, spent: f64) -> Value {
        json!({"allocated": allocated, "committed": committed, "spent": spent})
    }

    /// A 422 body in the field-list validation shape.
    pub fn validation_error(loc: &[&str], msg: &str) -> Value {
        json!({"detail": [{"loc": loc, "msg": msg, "type": "value_error"}]})
    }

    /// `{data: .., message: ..}` success envelope.
    pub fn with_message(data: Value, message: &str) -> Value {
        json!({"data": data, "message": message})
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_feature() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("accounts"),
            Just("contacts"),
            Just("opportunities"),
            Just("proposals"),
            Just("requisitions"),
            Just("invoices"),
            Just("budgets"),
            Just("surveys"),
            Just("employees"),
        ]
    }

    pub fn arb_record_id() -> impl Strategy<Value = String> {
        "[A-Z][0-9]{1,4}"
    }

    /// Filters as `(name, Option<value>)` pairs; `None` means "not set".
    pub fn arb_filter_pairs() -> impl Strategy<Value = Vec<(String, Option<String>)>> {
        prop::collection::vec(
            ("[a-z_]{1,8}", prop::option::of("[a-z0-9]{1,6}")),
            0..6,
        )
    }

    pub fn arb_filters() -> impl Strategy<Value = FilterParams> {
        arb_filter_pairs().prop_map(|pairs| {
            pairs.into_iter().fold(FilterParams::new(), |params, (k, v)| {
                params.with_opt(k, v)
            })
        })
    }

    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        (arb_feature(), arb_record_id(), arb_filters(), 0..3u8).prop_map(
            |(feature, id, filters, shape)| {
                let keys = KeyFactory::new(feature);
                match shape {
                    0 => keys.all(),
                    1 => keys.list(&filters),
                    _ => keys.detail(id),
                }
            },
        )
    }

    /// Error bodies in every shape the backend produces.
    pub fn arb_error_body() -> impl Strategy<Value = Value> {
        let field = (
            prop::collection::vec("[a-z_]{1,8}", 1..3),
            "[a-z][a-z ]{0,15}",
        )
            .prop_map(|(loc, msg)| json!({"loc": loc, "msg": msg}));
        prop_oneof![
            "[A-Za-z][A-Za-z ]{0,23}".prop_map(|detail| json!({"detail": detail})),
            prop::collection::vec(field, 1..4).prop_map(|items| json!({"detail": items})),
            "[A-Za-z][A-Za-z ]{0,23}".prop_map(|message| json!({"message": message})),
            Just(json!({})),
        ]
    }

    pub fn arb_error_status() -> impl Strategy<Value = u16> {
        prop_oneof![Just(400u16), Just(403), Just(404), Just(409), Just(422), Just(500), Just(503)]
    }
}
