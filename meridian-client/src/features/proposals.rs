//! Proposals.

use crate::context::SyncContext;
use crate::resource::{Resource, ResourceSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub account_id: String,
    #[serde(default)]
    pub opportunity_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProposal {
    pub account_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProposalChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

pub struct ProposalSpec;

impl ResourceSpec for ProposalSpec {
    type Record = Proposal;
    type Create = NewProposal;
    type Update = ProposalChanges;

    const NAMESPACE: &'static str = "proposals";
    const PATH: &'static str = "/proposals";
    const LABEL: &'static str = "Proposal";

    fn record_id(record: &Proposal) -> String {
        record.id.clone()
    }
}

pub type Proposals = Resource<ProposalSpec>;

impl SyncContext {
    pub fn proposals(&self) -> Proposals {
        self.resource::<ProposalSpec>()
    }
}
