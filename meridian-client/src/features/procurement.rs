//! Procurement requisitions and their approval workflow.

use super::finance::budget_keys;
use crate::context::SyncContext;
use crate::http::{ApiRequest, ApiResponse};
use crate::resource::{record_path, Resource, ResourceSpec, Saved};
use meridian_cache::{InvalidationPlan, Mutation, MutationSpec};
use meridian_core::KeyFactory;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: String,
    pub title: String,
    pub amount: f64,
    pub status: String,
    #[serde(default)]
    pub department_id: Option<String>,
}

/// `amount` is optional client-side; the backend validates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRequisition {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequisitionChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

pub struct RequisitionSpec;

impl ResourceSpec for RequisitionSpec {
    type Record = Requisition;
    type Create = NewRequisition;
    type Update = RequisitionChanges;

    const NAMESPACE: &'static str = "requisitions";
    const PATH: &'static str = "/requisitions";
    const LABEL: &'static str = "Requisition";

    fn record_id(record: &Requisition) -> String {
        record.id.clone()
    }

    /// Submitted requisitions commit budget.
    fn on_create(_record: &Requisition) -> InvalidationPlan {
        InvalidationPlan::new().subtree(budget_keys().all())
    }
}

pub type Requisitions = Resource<RequisitionSpec>;

pub fn purchase_order_keys() -> KeyFactory {
    KeyFactory::new("purchase-orders")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn action(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequisitionDecision {
    #[serde(skip)]
    pub requisition_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RequisitionDecision {
    pub fn new(requisition_id: impl Into<String>) -> Self {
        Self {
            requisition_id: requisition_id.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Plan of an approve/reject. Approval creates a purchase order.
pub fn decision_plan(
    keys: &KeyFactory,
    requisition_id: &str,
    decision: Decision,
) -> InvalidationPlan {
    let plan = InvalidationPlan::new()
        .exact_refetch(keys.detail(requisition_id))
        .subtree(keys.lists());
    match decision {
        Decision::Approve => plan.subtree(purchase_order_keys().lists()),
        Decision::Reject => plan,
    }
}

impl Resource<RequisitionSpec> {
    pub fn approve(&self) -> Mutation<RequisitionDecision, Saved<Requisition>> {
        self.decide(Decision::Approve)
    }

    pub fn reject(&self) -> Mutation<RequisitionDecision, Saved<Requisition>> {
        self.decide(Decision::Reject)
    }

    fn decide(&self, decision: Decision) -> Mutation<RequisitionDecision, Saved<Requisition>> {
        let keys = self.keys().clone();
        let (success, failure) = match decision {
            Decision::Approve => ("Requisition approved", "Failed to approve requisition"),
            Decision::Reject => ("Requisition rejected", "Failed to reject requisition"),
        };
        let spec = MutationSpec::new(
            format!("requisitions.{}", decision.action()),
            success,
            failure,
        )
        .invalidates(move |payload: &RequisitionDecision, _: &Saved<Requisition>| {
            decision_plan(&keys, &payload.requisition_id, decision)
        })
        .server_message(|saved: &Saved<Requisition>| saved.message.clone());

        self.context().mutation(
            spec,
            move |payload: &RequisitionDecision| {
                let path = format!(
                    "{}/{}",
                    record_path(RequisitionSpec::PATH, &payload.requisition_id),
                    decision.action()
                );
                ApiRequest::post(path).with_json(payload)
            },
            |_: &RequisitionDecision, response: &ApiResponse| Saved::from_response(response),
        )
    }
}

impl SyncContext {
    pub fn requisitions(&self) -> Requisitions {
        self.resource::<RequisitionSpec>()
    }
}
