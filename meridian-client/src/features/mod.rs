//! Per-feature resources.
//!
//! Each module declares its REST paths, record types and the invalidation
//! relations between features.

pub mod accounts;
pub mod finance;
pub mod opportunities;
pub mod procurement;
pub mod proposals;
pub mod resources;
pub mod surveys;

pub use accounts::{
    Account, AccountChanges, AccountSpec, Accounts, Contact, ContactChanges, ContactRef,
    ContactUpdate, Contacts, NewAccount, NewContact,
};
pub use finance::{
    budget_keys, BudgetSummary, Budgets, Invoice, InvoiceChanges, InvoiceSpec, Invoices,
    NewInvoice, Payment,
};
pub use opportunities::{
    ConvertToProposal, NewOpportunity, Opportunities, Opportunity, OpportunityChanges,
    OpportunitySpec,
};
pub use procurement::{
    purchase_order_keys, Decision, NewRequisition, Requisition, RequisitionChanges,
    RequisitionDecision, RequisitionSpec, Requisitions,
};
pub use proposals::{NewProposal, Proposal, ProposalChanges, ProposalSpec, Proposals};
pub use resources::{Assignment, Employee, EmployeeChanges, EmployeeSpec, Employees, NewEmployee};
pub use surveys::{
    response_keys, NewSurvey, ResponseSubmission, Survey, SurveyChanges, SurveyResponse,
    SurveySpec, Surveys,
};
