//! End-to-end invalidation scenarios over the mock transport.

use chrono::Utc;
use meridian_client::features::{
    AccountChanges, AccountSpec, ContactChanges, ContactUpdate, ConvertToProposal, Invoice,
    NewRequisition, Payment, ProposalSpec, RequisitionSpec,
};
use meridian_client::{
    Draft, FilterParams, Method, ResourceSpec, Severity, SyncError, UpdatePayload,
};
use meridian_test_utils::fixtures::{self, filters};
use meridian_test_utils::MockTransport;
use serde_json::json;

#[tokio::test]
async fn test_requisition_validation_error_is_flattened_and_list_untouched() {
    let mock = MockTransport::new();
    let desks = fixtures::requisition("R1", "Desks", 900.0);
    mock.respond(Method::Get, "/requisitions", 200, json!([desks]));
    let rejected = json!({
        "response": {
            "status": 422,
            "data": {"detail": [{"loc": ["body", "amount"], "msg": "required"}]},
        }
    });
    mock.respond(Method::Post, "/requisitions", 422, rejected);
    let ctx = fixtures::context(&mock);
    let requisitions = ctx.requisitions();

    let list = requisitions.list(&FilterParams::new());
    list.load().await;
    assert_eq!(list.data().map(|rows| rows.len()), Some(1));

    let create = requisitions.create();
    let result = create
        .mutate_async(NewRequisition {
            title: "Chairs".into(),
            amount: None,
            department_id: None,
        })
        .await;

    assert!(matches!(result, Err(SyncError::Validation { status: 422, .. })));
    let shown = ctx.notifications().visible();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].severity, Severity::Error);
    assert_eq!(shown[0].description.as_deref(), Some("body.amount: required"));

    assert_eq!(mock.count(Method::Get, "/requisitions"), 1);
    assert!(!ctx.cache().is_invalidated(&RequisitionSpec::keys().lists()));
    assert!(create.state().error().is_some());
}

#[tokio::test]
async fn test_contact_update_refetches_owning_account_only() {
    let mock = MockTransport::new();
    mock.respond(Method::Get, "/accounts", 200, json!([fixtures::account("A1", "Acme")]));
    mock.respond(Method::Get, "/accounts/A1", 200, fixtures::account("A1", "Acme"));
    mock.respond(
        Method::Get,
        "/accounts/A1/contacts",
        200,
        json!([fixtures::contact("C1", "A1", "Ada", false)]),
    );
    mock.respond(Method::Get, "/accounts/A2/contacts", 200, json!([]));
    mock.respond(
        Method::Patch,
        "/accounts/A1/contacts/C1",
        200,
        fixtures::contact("C1", "A1", "Ada", false),
    );
    let ctx = fixtures::context(&mock);

    let accounts = ctx.accounts().list(&FilterParams::new());
    let account = ctx.accounts().detail("A1");
    let contacts = ctx.contacts().list("A1", &FilterParams::new());
    let other = ctx.contacts().list("A2", &FilterParams::new());
    accounts.load().await;
    account.load().await;
    contacts.load().await;
    other.load().await;
    assert_eq!(mock.request_count(), 4);

    ctx.contacts()
        .update()
        .mutate_async(ContactUpdate {
            account_id: "A1".into(),
            contact_id: "C1".into(),
            changes: ContactChanges {
                email: Some("ada@acme.test".into()),
                ..ContactChanges::default()
            },
        })
        .await
        .unwrap();

    assert_eq!(mock.count(Method::Get, "/accounts/A1/contacts"), 2);
    assert_eq!(mock.count(Method::Get, "/accounts/A1"), 2);
    assert_eq!(mock.count(Method::Get, "/accounts"), 1);
    assert_eq!(mock.count(Method::Get, "/accounts/A2/contacts"), 1);
    assert!(!ctx.cache().is_invalidated(&AccountSpec::keys().lists()));
}

#[tokio::test]
async fn test_primary_promotion_also_refetches_account_lists() {
    let mock = MockTransport::new();
    mock.respond(Method::Get, "/accounts", 200, json!([fixtures::account("A1", "Acme")]));
    mock.respond(Method::Get, "/accounts/A1", 200, fixtures::account("A1", "Acme"));
    mock.respond(
        Method::Patch,
        "/accounts/A1/contacts/C1",
        200,
        fixtures::contact("C1", "A1", "Ada", true),
    );
    let ctx = fixtures::context(&mock);

    let accounts = ctx.accounts().list(&FilterParams::new());
    let account = ctx.accounts().detail("A1");
    accounts.load().await;
    account.load().await;

    ctx.contacts()
        .update()
        .mutate_async(ContactUpdate {
            account_id: "A1".into(),
            contact_id: "C1".into(),
            changes: ContactChanges {
                is_primary: Some(true),
                ..ContactChanges::default()
            },
        })
        .await
        .unwrap();

    assert_eq!(mock.count(Method::Get, "/accounts"), 2);
    assert_eq!(mock.count(Method::Get, "/accounts/A1"), 2);
}

#[tokio::test]
async fn test_page_flip_shows_only_final_page() {
    let mock = MockTransport::new();
    let old = json!([fixtures::account("A1", "Old")]);
    mock.respond_once(Method::Get, "/accounts?page=1", 200, old);
    let ctx = fixtures::context(&mock);
    let accounts = ctx.accounts();
    let page1 = filters(&[("page", "1")]);
    let page2 = filters(&[("page", "2")]);

    let first = accounts.list(&page1);
    first.load().await;
    drop(first);

    let late_page2 = mock.gate(Method::Get, "/accounts?page=2");
    let fresh_page1 = mock.gate(Method::Get, "/accounts?page=1");

    let second = accounts.list(&page2);
    let current = accounts.list(&page1);
    let release = async {
        mock.wait_for_requests(3).await;
        fresh_page1.respond(200, json!([fixtures::account("A1", "Fresh")]));
        tokio::task::yield_now().await;
        late_page2.respond(200, json!([fixtures::account("A9", "Page two")]));
    };
    tokio::join!(second.load(), current.refetch(), release);
    drop(second);

    assert_eq!(mock.count(Method::Get, "/accounts?page=1"), 2);
    assert_eq!(mock.count(Method::Get, "/accounts?page=2"), 1);
    let shown = current.data().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].name, "Fresh");
    assert_eq!(ctx.cache().stats().superseded, 0);
}

#[tokio::test]
async fn test_invoice_payment_touches_budgets() {
    let mock = MockTransport::new();
    mock.respond(Method::Get, "/invoices", 200, json!([fixtures::invoice("I1", 500.0, 500.0)]));
    mock.respond(Method::Get, "/invoices/I1", 200, fixtures::invoice("I1", 500.0, 500.0));
    mock.respond(Method::Get, "/budgets/summary", 200, fixtures::budget_summary(1000.0, 0.0, 0.0));
    mock.respond(
        Method::Post,
        "/invoices/I1/payments",
        201,
        fixtures::with_message(fixtures::invoice("I1", 500.0, 0.0), "Payment applied"),
    );
    let ctx = fixtures::context(&mock);

    let list = ctx.invoices().list(&FilterParams::new());
    let detail = ctx.invoices().detail("I1");
    let summary = ctx.budgets().summary();
    list.load().await;
    detail.load().await;
    summary.load().await;
    assert!((summary.data().unwrap().remaining() - 1000.0).abs() < f64::EPSILON);

    let saved = ctx
        .invoices()
        .record_payment()
        .mutate_async(Payment {
            invoice_id: "I1".into(),
            amount: 500.0,
            paid_at: Utc::now(),
            reference: None,
        })
        .await
        .unwrap();

    let invoice: &Invoice = &saved;
    assert_eq!(invoice.status, "paid");
    assert_eq!(mock.count(Method::Get, "/invoices"), 2);
    assert_eq!(mock.count(Method::Get, "/invoices/I1"), 2);
    assert_eq!(mock.count(Method::Get, "/budgets/summary"), 2);

    let body = mock
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Post)
        .and_then(|r| r.body)
        .unwrap();
    assert!(body.get("invoice_id").is_none());
    assert_eq!(body["amount"], json!(500.0));

    let shown = ctx.notifications().visible();
    assert_eq!(shown[0].title, "Success");
    assert_eq!(shown[0].description.as_deref(), Some("Payment applied"));
}

#[tokio::test]
async fn test_convert_to_proposal_refreshes_resolved_account() {
    let mock = MockTransport::new();
    mock.respond(
        Method::Get,
        "/opportunities/O1",
        200,
        json!({"id": "O1", "account_id": "A1", "name": "Renewal", "stage": "won"}),
    );
    mock.respond(Method::Get, "/proposals", 200, json!([]));
    mock.respond(Method::Get, "/accounts/A1", 200, fixtures::account("A1", "Acme"));
    mock.respond(Method::Get, "/accounts/A2", 200, fixtures::account("A2", "Globex"));
    mock.respond(
        Method::Post,
        "/opportunities/O1/convert",
        201,
        fixtures::proposal("P1", "A1", "O1"),
    );
    let ctx = fixtures::context(&mock);

    let opportunity = ctx.opportunities().detail("O1");
    let proposals = ctx.proposals().list(&FilterParams::new());
    let owner = ctx.accounts().detail("A1");
    let unrelated = ctx.accounts().detail("A2");
    opportunity.load().await;
    proposals.load().await;
    owner.load().await;
    unrelated.load().await;

    let saved = ctx
        .opportunities()
        .convert_to_proposal()
        .mutate_async(ConvertToProposal {
            opportunity_id: "O1".into(),
            title: "Renewal 2027".into(),
        })
        .await
        .unwrap();

    assert_eq!(saved.account_id, "A1");
    assert_eq!(mock.count(Method::Get, "/opportunities/O1"), 2);
    assert_eq!(mock.count(Method::Get, "/proposals"), 2);
    assert_eq!(mock.count(Method::Get, "/accounts/A1"), 2);
    assert_eq!(mock.count(Method::Get, "/accounts/A2"), 1);
    assert!(ctx.cache().contains(&ProposalSpec::keys().lists()));
}

#[tokio::test]
async fn test_failed_delete_keeps_detail_cached() {
    let mock = MockTransport::new();
    mock.respond(Method::Get, "/accounts/A1", 200, fixtures::account("A1", "Acme"));
    mock.respond(
        Method::Delete,
        "/accounts/A1",
        409,
        json!({"detail": "Account has open invoices"}),
    );
    let ctx = fixtures::context(&mock);
    let detail = ctx.accounts().detail("A1");
    detail.load().await;

    let err = ctx
        .accounts()
        .delete()
        .mutate_async("A1".to_string())
        .await
        .unwrap_err();

    assert_eq!(err.user_message("Failed to delete account"), "Account has open invoices");
    assert!(ctx.cache().contains(&AccountSpec::keys().detail("A1")));
    assert_eq!(
        ctx.notifications().visible()[0].description.as_deref(),
        Some("Account has open invoices")
    );
}

#[tokio::test]
async fn test_delete_removes_detail_and_refetches_lists() {
    let mock = MockTransport::new();
    mock.respond(Method::Get, "/accounts", 200, json!([fixtures::account("A1", "Acme")]));
    mock.respond(Method::Get, "/accounts/A1", 200, fixtures::account("A1", "Acme"));
    mock.respond(Method::Delete, "/accounts/A1", 204, serde_json::Value::Null);
    let ctx = fixtures::context(&mock);
    let list = ctx.accounts().list(&FilterParams::new());
    let detail = ctx.accounts().detail("A1");
    list.load().await;
    detail.load().await;

    let deleted = ctx
        .accounts()
        .delete()
        .mutate_async("A1".to_string())
        .await
        .unwrap();

    assert_eq!(deleted.id, "A1");
    assert!(!ctx.cache().contains(&AccountSpec::keys().detail("A1")));
    assert_eq!(mock.count(Method::Get, "/accounts"), 2);
    assert_eq!(
        ctx.notifications().visible()[0].description.as_deref(),
        Some("Account deleted")
    );
}

#[tokio::test]
async fn test_draft_commit_sends_working_copy() {
    let mock = MockTransport::new();
    mock.respond(Method::Get, "/accounts/A1", 200, fixtures::account("A1", "Acme"));
    mock.respond(Method::Patch, "/accounts/A1", 200, fixtures::account("A1", "Acme Corp"));
    let ctx = fixtures::context(&mock);
    let detail = ctx.accounts().detail("A1");
    detail.load().await;

    let mut draft = Draft::from_query(&detail).unwrap();
    draft.edit(|account| account.name = "Acme Corp".into());
    assert!(draft.is_dirty());

    let update = ctx.accounts().update();
    draft
        .commit(&update, |account| {
            UpdatePayload::new(
                account.id.clone(),
                AccountChanges {
                    name: Some(account.name.clone()),
                    ..AccountChanges::default()
                },
            )
        })
        .await
        .unwrap();

    assert!(!draft.is_dirty());
    let patch = mock
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Patch)
        .unwrap();
    assert_eq!(patch.body, Some(json!({"name": "Acme Corp"})));
    assert_eq!(mock.count(Method::Get, "/accounts/A1"), 2);
}
