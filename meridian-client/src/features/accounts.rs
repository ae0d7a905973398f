//! Accounts and their contacts.
//!
//! Contacts live under `/accounts/{account_id}/contacts`. Every contact write
//! refreshes the owning account's contact lists and detail; promoting a
//! contact to primary also refreshes account lists, which show the primary
//! contact.

use crate::context::SyncContext;
use crate::http::{ApiRequest, ApiResponse};
use crate::resource::{decode_list, record_path, Deleted, Resource, ResourceSpec, Saved};
use meridian_cache::{InvalidationPlan, Mutation, MutationSpec, Query};
use meridian_core::{FilterParams, KeyFactory};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub primary_contact_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAccount {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

pub struct AccountSpec;

impl ResourceSpec for AccountSpec {
    type Record = Account;
    type Create = NewAccount;
    type Update = AccountChanges;

    const NAMESPACE: &'static str = "accounts";
    const PATH: &'static str = "/accounts";
    const LABEL: &'static str = "Account";

    fn record_id(record: &Account) -> String {
        record.id.clone()
    }
}

pub type Accounts = Resource<AccountSpec>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub account_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewContact {
    #[serde(skip)]
    pub account_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContactChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactUpdate {
    pub account_id: String,
    pub contact_id: String,
    pub changes: ContactChanges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRef {
    pub account_id: String,
    pub contact_id: String,
}

/// Contact bindings, keyed by owning account.
#[derive(Clone)]
pub struct Contacts {
    ctx: SyncContext,
    keys: KeyFactory,
    accounts: KeyFactory,
}

fn contacts_path(account_id: &str) -> String {
    format!("{}/contacts", record_path(AccountSpec::PATH, account_id))
}

fn account_filter(account_id: &str) -> FilterParams {
    FilterParams::new().with("account_id", account_id)
}

impl Contacts {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            keys: KeyFactory::new("contacts"),
            accounts: AccountSpec::keys(),
        }
    }

    pub fn keys(&self) -> &KeyFactory {
        &self.keys
    }

    /// Plan shared by every contact write for `account_id`.
    fn account_plan(
        keys: &KeyFactory,
        accounts: &KeyFactory,
        account_id: &str,
    ) -> InvalidationPlan {
        InvalidationPlan::new()
            .subtree(keys.list(&account_filter(account_id)))
            .exact_refetch(accounts.detail(account_id))
    }

    /// Contacts of one account. Extra filters (paging, search) narrow the
    /// key below the account's contact subtree.
    pub fn list(&self, account_id: &str, filters: &FilterParams) -> Query<Vec<Contact>> {
        let mut key_filters = filters.clone();
        key_filters.insert("account_id", account_id);
        let options = self
            .ctx
            .cache()
            .default_options()
            .enabled(!account_id.is_empty());
        let request = ApiRequest::get(contacts_path(account_id)).with_filters(filters);
        self.ctx
            .fetch(self.keys.list(&key_filters), options, request, decode_list::<Contact>)
    }

    pub fn create(&self) -> Mutation<NewContact, Saved<Contact>> {
        let (keys, accounts) = (self.keys.clone(), self.accounts.clone());
        let spec = MutationSpec::new(
            "contacts.create",
            "Contact created",
            "Failed to create contact",
        )
        .invalidates(move |payload: &NewContact, saved: &Saved<Contact>| {
            Self::account_plan(&keys, &accounts, &payload.account_id)
                .exact(keys.detail(saved.id.clone()))
                .extend(primary_plan(&accounts, payload.is_primary))
        })
        .server_message(|saved: &Saved<Contact>| saved.message.clone());

        self.ctx.mutation(
            spec,
            |payload: &NewContact| {
                ApiRequest::post(contacts_path(&payload.account_id)).with_json(payload)
            },
            |_: &NewContact, response: &ApiResponse| Saved::from_response(response),
        )
    }

    pub fn update(&self) -> Mutation<ContactUpdate, Saved<Contact>> {
        let (keys, accounts) = (self.keys.clone(), self.accounts.clone());
        let spec = MutationSpec::new(
            "contacts.update",
            "Contact updated",
            "Failed to update contact",
        )
        .invalidates(move |payload: &ContactUpdate, _: &Saved<Contact>| {
            Self::account_plan(&keys, &accounts, &payload.account_id)
                .exact_refetch(keys.detail(payload.contact_id.clone()))
                .extend(primary_plan(&accounts, payload.changes.is_primary == Some(true)))
        })
        .server_message(|saved: &Saved<Contact>| saved.message.clone());

        self.ctx.mutation(
            spec,
            |payload: &ContactUpdate| {
                let path = record_path(&contacts_path(&payload.account_id), &payload.contact_id);
                ApiRequest::patch(path).with_json(&payload.changes)
            },
            |_: &ContactUpdate, response: &ApiResponse| Saved::from_response(response),
        )
    }

    pub fn delete(&self) -> Mutation<ContactRef, Deleted> {
        let (keys, accounts) = (self.keys.clone(), self.accounts.clone());
        let spec = MutationSpec::new(
            "contacts.delete",
            "Contact deleted",
            "Failed to delete contact",
        )
        .invalidates(move |payload: &ContactRef, _: &Deleted| {
            Self::account_plan(&keys, &accounts, &payload.account_id)
                .remove(keys.detail(payload.contact_id.clone()))
        })
        .server_message(|deleted: &Deleted| deleted.message.clone());

        self.ctx.mutation(
            spec,
            |payload: &ContactRef| {
                Ok(ApiRequest::delete(record_path(
                    &contacts_path(&payload.account_id),
                    &payload.contact_id,
                )))
            },
            |payload: &ContactRef, response: &ApiResponse| {
                Ok(Deleted {
                    id: payload.contact_id.clone(),
                    message: response.message(),
                })
            },
        )
    }
}

/// Account lists show the primary contact, so a promotion refreshes them.
fn primary_plan(accounts: &KeyFactory, promoted: bool) -> InvalidationPlan {
    if promoted {
        InvalidationPlan::new().subtree(accounts.lists())
    } else {
        InvalidationPlan::new()
    }
}

impl SyncContext {
    pub fn accounts(&self) -> Accounts {
        self.resource::<AccountSpec>()
    }

    pub fn contacts(&self) -> Contacts {
        Contacts::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_cache::InvalidationTarget;

    #[test]
    fn test_contact_plan_targets_owning_account() {
        let keys = KeyFactory::new("contacts");
        let accounts = AccountSpec::keys();
        let plan = Contacts::account_plan(&keys, &accounts, "A1");
        assert_eq!(
            plan.targets(),
            &[
                InvalidationTarget::Subtree(keys.list(&account_filter("A1"))),
                InvalidationTarget::Exact {
                    key: accounts.detail("A1"),
                    refetch_active: true,
                },
            ]
        );
    }

    #[test]
    fn test_promotion_adds_account_lists() {
        let accounts = AccountSpec::keys();
        assert!(primary_plan(&accounts, false).is_empty());
        assert_eq!(
            primary_plan(&accounts, true).targets(),
            &[InvalidationTarget::Subtree(accounts.lists())]
        );
    }

    #[test]
    fn test_contacts_path() {
        assert_eq!(contacts_path("A1"), "/accounts/A1/contacts");
    }

    #[test]
    fn test_new_contact_body_omits_account_id() {
        let body = serde_json::to_value(NewContact {
            account_id: "A1".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: None,
            is_primary: false,
        })
        .unwrap();
        assert!(body.get("account_id").is_none());
        assert!(body.get("email").is_none());
    }
}
