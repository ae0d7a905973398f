//! Local edit buffers kept apart from cached server data.

use crate::mutation::Mutation;
use crate::query::Query;
use meridian_core::SyncError;

/// A working copy of a record. Edits never touch the cached value; the draft
/// only becomes clean again after a successful commit or a reset.
#[derive(Debug, Clone)]
pub struct Draft<T> {
    base: T,
    working: T,
}

impl<T: Clone + PartialEq> Draft<T> {
    pub fn from_snapshot(snapshot: &T) -> Self {
        Self {
            base: snapshot.clone(),
            working: snapshot.clone(),
        }
    }

    /// Start a draft from whatever the binding currently holds.
    pub fn from_query(query: &Query<T>) -> Option<Self>
    where
        T: Send + Sync + 'static,
    {
        query.data().map(|data| Self::from_snapshot(&data))
    }

    pub fn working(&self) -> &T {
        &self.working
    }

    /// The snapshot the draft started from (or was last committed as).
    pub fn base(&self) -> &T {
        &self.base
    }

    pub fn edit(&mut self, edit: impl FnOnce(&mut T)) {
        edit(&mut self.working);
    }

    pub fn is_dirty(&self) -> bool {
        self.working != self.base
    }

    /// Throw away local edits.
    pub fn reset(&mut self) {
        self.working = self.base.clone();
    }

    /// Adopt a newer server snapshot. Ignored while there are local edits.
    pub fn rebase(&mut self, snapshot: &T) -> bool {
        if self.is_dirty() {
            return false;
        }
        self.base = snapshot.clone();
        self.working = snapshot.clone();
        true
    }

    /// Send the working copy through `mutation`. Edits survive a failure.
    pub async fn commit<P, R>(
        &mut self,
        mutation: &Mutation<P, R>,
        to_payload: impl FnOnce(&T) -> P,
    ) -> Result<R, SyncError>
    where
        P: Clone + Send + Sync + 'static,
        R: Clone + Send + Sync + 'static,
    {
        let payload = to_payload(&self.working);
        let response = mutation.mutate_async(payload).await?;
        self.base = self.working.clone();
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationSpec;
    use crate::notify::NotificationCenter;
    use crate::QueryCache;

    #[derive(Debug, Clone, PartialEq)]
    struct Contact {
        name: String,
        is_primary: bool,
    }

    fn contact() -> Contact {
        Contact {
            name: "Ada".into(),
            is_primary: false,
        }
    }

    fn save_mutation(fail: bool) -> Mutation<Contact, Contact> {
        let spec = MutationSpec::new(
            "contacts.update",
            "Contact updated",
            "Failed to update contact",
        );
        Mutation::new(
            QueryCache::default(),
            NotificationCenter::default(),
            spec,
            move |contact: Contact| async move {
                if fail {
                    Err(SyncError::transport("offline"))
                } else {
                    Ok(contact)
                }
            },
        )
    }

    #[test]
    fn test_edits_do_not_alias_snapshot() {
        let snapshot = contact();
        let mut draft = Draft::from_snapshot(&snapshot);
        draft.edit(|c| c.name = "Grace".into());
        assert!(draft.is_dirty());
        assert_eq!(snapshot.name, "Ada");
        assert!(!draft.rebase(&snapshot));

        draft.reset();
        assert!(!draft.is_dirty());
        assert_eq!(draft.working().name, "Ada");
    }

    #[tokio::test]
    async fn test_commit_clears_only_on_success() {
        let mut draft = Draft::from_snapshot(&contact());
        draft.edit(|c| c.is_primary = true);

        assert!(draft.commit(&save_mutation(true), Contact::clone).await.is_err());
        assert!(draft.is_dirty());

        let saved = draft.commit(&save_mutation(false), Contact::clone).await.unwrap();
        assert!(saved.is_primary);
        assert!(!draft.is_dirty());
        assert!(draft.base().is_primary);
    }
}
