//! Generic resource factory.
//!
//! Every feature exposes the same surface (list, detail, create, update,
//! delete) over a REST collection; a [`ResourceSpec`] supplies the paths,
//! record types and the relations that extend the default invalidation plans.

use crate::context::SyncContext;
use crate::http::{decode_value, ApiRequest, ApiResponse};
use meridian_cache::{FetchOptions, InvalidationPlan, Mutation, MutationSpec, Query};
use meridian_core::{FilterParams, KeyFactory, SyncError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::ops::Deref;

/// Static description of one REST collection.
pub trait ResourceSpec: Send + Sync + 'static {
    type Record: DeserializeOwned + Clone + Send + Sync + 'static;
    type Create: Serialize + Clone + Send + Sync + 'static;
    type Update: Serialize + Clone + Send + Sync + 'static;

    /// Cache namespace.
    const NAMESPACE: &'static str;
    /// Collection path, e.g. `/accounts`.
    const PATH: &'static str;
    /// Singular label for notifications, e.g. `Account`.
    const LABEL: &'static str;

    fn record_id(record: &Self::Record) -> String;

    fn keys() -> KeyFactory {
        KeyFactory::new(Self::NAMESPACE)
    }

    /// Other namespaces a create affects.
    fn on_create(_record: &Self::Record) -> InvalidationPlan {
        InvalidationPlan::new()
    }

    /// Other namespaces an update affects.
    fn on_update(_id: &str, _changes: &Self::Update, _record: &Self::Record) -> InvalidationPlan {
        InvalidationPlan::new()
    }

    /// Other namespaces a delete affects.
    fn on_delete(_id: &str) -> InvalidationPlan {
        InvalidationPlan::new()
    }
}

/// A record returned by a write, with the server's message if it sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct Saved<T> {
    pub record: T,
    pub message: Option<String>,
}

impl<T: DeserializeOwned> Saved<T> {
    pub fn from_response(response: &ApiResponse) -> Result<Self, SyncError> {
        Ok(Self {
            record: response.decode()?,
            message: response.message(),
        })
    }
}

impl<T> Deref for Saved<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

/// Acknowledgement of a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub id: String,
    pub message: Option<String>,
}

/// Changes to one record.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePayload<U> {
    pub id: String,
    pub changes: U,
}

impl<U> UpdatePayload<U> {
    pub fn new(id: impl Into<String>, changes: U) -> Self {
        Self {
            id: id.into(),
            changes,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Items { items: Vec<T> },
    Data { data: Vec<T> },
}

/// Decode a collection: a bare array, `{items: [..]}` or `{data: [..]}`.
pub fn decode_list<T: DeserializeOwned>(value: &Value) -> Result<Vec<T>, SyncError> {
    match serde_json::from_value::<ListBody<T>>(value.clone()) {
        Ok(ListBody::Bare(items))
        | Ok(ListBody::Items { items })
        | Ok(ListBody::Data { data: items }) => Ok(items),
        Err(err) => Err(SyncError::decode(err.to_string())),
    }
}

pub(crate) fn record_path(base: &str, id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), id)
}

fn lowercase(label: &str) -> String {
    label.to_lowercase()
}

/// The shared surface of a feature, bound to one [`SyncContext`].
pub struct Resource<S> {
    ctx: SyncContext,
    keys: KeyFactory,
    _spec: PhantomData<fn() -> S>,
}

impl<S> Clone for Resource<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            keys: self.keys.clone(),
            _spec: PhantomData,
        }
    }
}

impl<S: ResourceSpec> Resource<S> {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            keys: S::keys(),
            _spec: PhantomData,
        }
    }

    pub fn keys(&self) -> &KeyFactory {
        &self.keys
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn list(&self, filters: &FilterParams) -> Query<Vec<S::Record>> {
        self.list_with(filters, self.ctx.cache().default_options())
    }

    pub fn list_with(
        &self,
        filters: &FilterParams,
        options: FetchOptions,
    ) -> Query<Vec<S::Record>> {
        let request = ApiRequest::get(S::PATH).with_filters(filters);
        self.ctx
            .fetch(self.keys.list(filters), options, request, decode_list::<S::Record>)
    }

    /// Detail binding. An empty id yields a disabled binding.
    pub fn detail(&self, id: &str) -> Query<S::Record> {
        let options = self.ctx.cache().default_options().enabled(!id.is_empty());
        let request = ApiRequest::get(record_path(S::PATH, id));
        self.ctx
            .fetch(self.keys.detail(id), options, request, decode_value::<S::Record>)
    }

    pub fn create(&self) -> Mutation<S::Create, Saved<S::Record>> {
        let keys = self.keys.clone();
        let spec = MutationSpec::new(
            format!("{}.create", S::NAMESPACE),
            format!("{} created", S::LABEL),
            format!("Failed to create {}", lowercase(S::LABEL)),
        )
        .invalidates(move |_: &S::Create, saved: &Saved<S::Record>| {
            InvalidationPlan::new()
                .subtree(keys.lists())
                .exact(keys.detail(S::record_id(&saved.record)))
                .extend(S::on_create(&saved.record))
        })
        .server_message(|saved: &Saved<S::Record>| saved.message.clone());

        self.ctx.mutation(
            spec,
            |payload: &S::Create| ApiRequest::post(S::PATH).with_json(payload),
            |_: &S::Create, response: &ApiResponse| Saved::from_response(response),
        )
    }

    pub fn update(&self) -> Mutation<UpdatePayload<S::Update>, Saved<S::Record>> {
        let keys = self.keys.clone();
        let spec = MutationSpec::new(
            format!("{}.update", S::NAMESPACE),
            format!("{} updated", S::LABEL),
            format!("Failed to update {}", lowercase(S::LABEL)),
        )
        .invalidates(
            move |payload: &UpdatePayload<S::Update>, saved: &Saved<S::Record>| {
                InvalidationPlan::new()
                    .exact_refetch(keys.detail(payload.id.clone()))
                    .subtree(keys.lists())
                    .extend(S::on_update(&payload.id, &payload.changes, &saved.record))
            },
        )
        .server_message(|saved: &Saved<S::Record>| saved.message.clone());

        self.ctx.mutation(
            spec,
            |payload: &UpdatePayload<S::Update>| {
                ApiRequest::patch(record_path(S::PATH, &payload.id)).with_json(&payload.changes)
            },
            |_: &UpdatePayload<S::Update>, response: &ApiResponse| Saved::from_response(response),
        )
    }

    pub fn delete(&self) -> Mutation<String, Deleted> {
        let keys = self.keys.clone();
        let spec = MutationSpec::new(
            format!("{}.delete", S::NAMESPACE),
            format!("{} deleted", S::LABEL),
            format!("Failed to delete {}", lowercase(S::LABEL)),
        )
        .invalidates(move |id: &String, _: &Deleted| {
            InvalidationPlan::new()
                .subtree(keys.lists())
                .remove(keys.detail(id.clone()))
                .extend(S::on_delete(id))
        })
        .server_message(|deleted: &Deleted| deleted.message.clone());

        self.ctx.mutation(
            spec,
            |id: &String| Ok(ApiRequest::delete(record_path(S::PATH, id))),
            |id: &String, response: &ApiResponse| {
                Ok(Deleted {
                    id: id.clone(),
                    message: response.message(),
                })
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Row {
        id: String,
    }

    #[test]
    fn test_decode_list_shapes() {
        let expected = vec![Row { id: "A1".into() }];
        for body in [
            json!([{"id": "A1"}]),
            json!({"items": [{"id": "A1"}], "total": 1}),
            json!({"data": [{"id": "A1"}]}),
        ] {
            assert_eq!(decode_list::<Row>(&body).unwrap(), expected);
        }
        assert!(matches!(
            decode_list::<Row>(&json!({"rows": []})),
            Err(SyncError::Decode { .. })
        ));
    }

    #[test]
    fn test_saved_prefers_server_message() {
        let response = ApiResponse::ok(json!({
            "data": {"id": "R1"},
            "message": "Requisition R1 submitted",
        }));
        let saved = Saved::<Row>::from_response(&response).unwrap();
        assert_eq!(saved.id, "R1");
        assert_eq!(saved.message.as_deref(), Some("Requisition R1 submitted"));
    }

    #[test]
    fn test_record_path() {
        assert_eq!(record_path("/accounts", "A1"), "/accounts/A1");
        assert_eq!(record_path("/accounts/", "A1"), "/accounts/A1");
    }
}
