//! Sales opportunities and their conversion into proposals.

use super::accounts::AccountSpec;
use super::proposals::{Proposal, ProposalSpec};
use crate::context::SyncContext;
use crate::http::{ApiRequest, ApiResponse};
use crate::resource::{record_path, Resource, ResourceSpec, Saved};
use meridian_cache::{InvalidationPlan, Mutation, MutationSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub stage: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOpportunity {
    pub account_id: String,
    pub name: String,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpportunityChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

pub struct OpportunitySpec;

impl ResourceSpec for OpportunitySpec {
    type Record = Opportunity;
    type Create = NewOpportunity;
    type Update = OpportunityChanges;

    const NAMESPACE: &'static str = "opportunities";
    const PATH: &'static str = "/opportunities";
    const LABEL: &'static str = "Opportunity";

    fn record_id(record: &Opportunity) -> String {
        record.id.clone()
    }
}

pub type Opportunities = Resource<OpportunitySpec>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertToProposal {
    #[serde(skip)]
    pub opportunity_id: String,
    pub title: String,
}

impl Resource<OpportunitySpec> {
    /// Convert an opportunity into a proposal. The plan uses the account of
    /// the proposal the server created.
    pub fn convert_to_proposal(&self) -> Mutation<ConvertToProposal, Saved<Proposal>> {
        let opportunities = self.keys().clone();
        let spec = MutationSpec::new(
            "opportunities.convert",
            "Proposal created from opportunity",
            "Failed to convert opportunity",
        )
        .invalidates(move |payload: &ConvertToProposal, saved: &Saved<Proposal>| {
            InvalidationPlan::new()
                .exact_refetch(opportunities.detail(payload.opportunity_id.clone()))
                .subtree(ProposalSpec::keys().lists())
                .exact_refetch(AccountSpec::keys().detail(saved.account_id.clone()))
        })
        .server_message(|saved: &Saved<Proposal>| saved.message.clone());

        self.context().mutation(
            spec,
            |payload: &ConvertToProposal| {
                let path = format!(
                    "{}/convert",
                    record_path(OpportunitySpec::PATH, &payload.opportunity_id)
                );
                ApiRequest::post(path).with_json(payload)
            },
            |_: &ConvertToProposal, response: &ApiResponse| Saved::from_response(response),
        )
    }
}

impl SyncContext {
    pub fn opportunities(&self) -> Opportunities {
        self.resource::<OpportunitySpec>()
    }
}
