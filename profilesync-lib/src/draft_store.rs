//! In-memory draft the editor reads and writes.
//!
//! Local edits apply immediately, before any storage confirmation. The
//! latest value is published on a watch channel, so subscribers always see
//! the newest optimistic or canonical state.

use tokio::sync::watch;

use crate::error::Target;
use crate::model::{Collection, CollectionItems, ProfileDraft, ProfileFieldsPatch};
use crate::update::ProfileUpdate;

/// A published draft and its revision number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftSnapshot {
    /// Incremented on every change
    pub revision: u64,
    pub draft: ProfileDraft,
}

#[derive(Debug)]
pub struct DraftStore {
    sender: watch::Sender<DraftSnapshot>,
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::new(ProfileDraft::default())
    }
}

impl DraftStore {
    pub fn new(draft: ProfileDraft) -> Self {
        let (sender, _) = watch::channel(DraftSnapshot { revision: 0, draft });
        Self { sender }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> DraftSnapshot {
        self.sender.borrow().clone()
    }

    /// Current draft
    pub fn draft(&self) -> ProfileDraft {
        self.sender.borrow().draft.clone()
    }

    pub fn revision(&self) -> u64 {
        self.sender.borrow().revision
    }

    /// Receive every future change
    pub fn subscribe(&self) -> watch::Receiver<DraftSnapshot> {
        self.sender.subscribe()
    }

    fn modify(&self, edit: impl FnOnce(&mut ProfileDraft)) {
        self.sender.send_modify(|snapshot| {
            edit(&mut snapshot.draft);
            snapshot.revision += 1;
        });
    }

    /// Replace one collection with its complete next array
    pub fn replace_collection(&self, items: CollectionItems) {
        self.modify(|draft| draft.set_collection(items));
    }

    pub fn merge_scalar_fields(&self, patch: &ProfileFieldsPatch) {
        self.modify(|draft| patch.apply_to(&mut draft.fields));
    }

    /// Apply every touched part of an update optimistically, as one change
    pub fn apply_update(&self, update: &ProfileUpdate) {
        self.modify(|draft| {
            for collection in update.touched_collections() {
                if let Some(items) = update.items(collection) {
                    draft.set_collection(items);
                }
            }
            if let Some(patch) = &update.fields {
                patch.apply_to(&mut draft.fields);
            }
        });
    }

    /// Overwrite the draft with canonical state, except for `keep`, whose
    /// optimistic values stay so a rejected edit can be corrected
    pub fn absorb(&self, canonical: ProfileDraft, keep: &[Target]) {
        self.modify(|draft| {
            let ProfileDraft {
                fields,
                wallet_methods,
                social_links,
                goals,
            } = canonical;
            if !keep.contains(&Target::Profile) {
                draft.fields = fields;
            }
            if !keep.contains(&Target::Collection(Collection::WalletMethods)) {
                draft.wallet_methods = wallet_methods;
            }
            if !keep.contains(&Target::Collection(Collection::SocialLinks)) {
                draft.social_links = social_links;
            }
            if !keep.contains(&Target::Collection(Collection::Goals)) {
                draft.goals = goals;
            }
        });
    }
}
