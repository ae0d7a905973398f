//! Finance: invoices, payments and the budget summary.

use crate::context::SyncContext;
use crate::http::{decode_value, ApiRequest, ApiResponse};
use crate::resource::{record_path, Resource, ResourceSpec, Saved};
use chrono::{DateTime, Utc};
use meridian_cache::{InvalidationPlan, Mutation, MutationSpec, Query};
use meridian_core::KeyFactory;
use serde::{Deserialize, Serialize};

const BUDGET_SUMMARY_PATH: &str = "/budgets/summary";

pub fn budget_keys() -> KeyFactory {
    KeyFactory::new("budgets")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub number: String,
    #[serde(default)]
    pub account_id: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub balance_due: f64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewInvoice {
    pub number: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

pub struct InvoiceSpec;

impl ResourceSpec for InvoiceSpec {
    type Record = Invoice;
    type Create = NewInvoice;
    type Update = InvoiceChanges;

    const NAMESPACE: &'static str = "invoices";
    const PATH: &'static str = "/invoices";
    const LABEL: &'static str = "Invoice";

    fn record_id(record: &Invoice) -> String {
        record.id.clone()
    }
}

pub type Invoices = Resource<InvoiceSpec>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    #[serde(skip)]
    pub invoice_id: String,
    pub amount: f64,
    pub paid_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Payments settle invoices and move budget actuals.
pub fn payment_plan(invoices: &KeyFactory, invoice_id: &str) -> InvalidationPlan {
    InvalidationPlan::new()
        .exact_refetch(invoices.detail(invoice_id))
        .subtree(invoices.lists())
        .subtree(budget_keys().all())
}

impl Resource<InvoiceSpec> {
    pub fn record_payment(&self) -> Mutation<Payment, Saved<Invoice>> {
        let keys = self.keys().clone();
        let spec = MutationSpec::new(
            "invoices.record_payment",
            "Payment recorded",
            "Failed to record payment",
        )
        .invalidates(move |payment: &Payment, _: &Saved<Invoice>| {
            payment_plan(&keys, &payment.invoice_id)
        })
        .server_message(|saved: &Saved<Invoice>| saved.message.clone());

        self.context().mutation(
            spec,
            |payment: &Payment| {
                let invoice = record_path(InvoiceSpec::PATH, &payment.invoice_id);
                let path = format!("{}/payments", invoice);
                ApiRequest::post(path).with_json(payment)
            },
            |_: &Payment, response: &ApiResponse| Saved::from_response(response),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BudgetSummary {
    pub allocated: f64,
    pub committed: f64,
    pub spent: f64,
}

impl BudgetSummary {
    pub fn remaining(&self) -> f64 {
        self.allocated - self.committed - self.spent
    }
}

/// Read-only budget bindings.
#[derive(Clone)]
pub struct Budgets {
    ctx: SyncContext,
    keys: KeyFactory,
}

impl Budgets {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            keys: budget_keys(),
        }
    }

    pub fn summary(&self) -> Query<BudgetSummary> {
        self.ctx.fetch(
            self.keys.operation("summary"),
            self.ctx.cache().default_options(),
            ApiRequest::get(BUDGET_SUMMARY_PATH),
            decode_value::<BudgetSummary>,
        )
    }
}

impl SyncContext {
    pub fn invoices(&self) -> Invoices {
        self.resource::<InvoiceSpec>()
    }

    pub fn budgets(&self) -> Budgets {
        Budgets::new(self.clone())
    }
}
