use std::sync::Arc;

use crate::error::{SyncError, Target};
use crate::gateway::PersistenceGateway;
use crate::model::{Collection, CollectionItems, OwnerId, ProfileDraft, ProfileFields};
use crate::records::Loaded;
use crate::transform::rows_to_items;

/// Canonical profile state read back from storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalProfile {
    pub draft: ProfileDraft,
    /// Targets whose storage did not exist; they load as empty/default
    pub missing: Vec<Target>,
}

/// Reads scalar fields and all three collections for an owner.
///
/// Used for the initial load of an editing session and after every
/// reconcile pass that did not end fatally.
pub struct RefreshLoader<G: ?Sized> {
    gateway: Arc<G>,
}

impl<G: PersistenceGateway + ?Sized> RefreshLoader<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    #[tracing::instrument(skip_all, fields(owner = %owner))]
    pub async fn load(&self, owner: OwnerId) -> Result<CanonicalProfile, SyncError> {
        // Each part is fetched independently; a missing one does not fail the rest
        let (fields, wallet_methods, social_links, goals) = futures::try_join!(
            self.load_fields(owner),
            self.load_items(owner, Collection::WalletMethods),
            self.load_items(owner, Collection::SocialLinks),
            self.load_items(owner, Collection::Goals),
        )?;

        let mut canonical = CanonicalProfile::default();
        match fields {
            Some(fields) => canonical.draft.fields = fields,
            None => canonical.missing.push(Target::Profile),
        }
        for (collection, loaded) in [
            (Collection::WalletMethods, wallet_methods),
            (Collection::SocialLinks, social_links),
            (Collection::Goals, goals),
        ] {
            match loaded {
                Loaded::Present(items) => canonical.draft.set_collection(items),
                Loaded::Missing => canonical.missing.push(Target::Collection(collection)),
            }
        }

        tracing::debug!(
            wallet_methods = canonical.draft.wallet_methods.len(),
            social_links = canonical.draft.social_links.len(),
            goals = canonical.draft.goals.len(),
            missing = canonical.missing.len(),
            "profile loaded"
        );
        Ok(canonical)
    }

    async fn load_fields(&self, owner: OwnerId) -> Result<Option<ProfileFields>, SyncError> {
        match self.gateway.load_profile(owner).await {
            Ok(fields) => Ok(Some(fields)),
            Err(e) if e.is_missing_collection() => {
                tracing::warn!("profile storage missing, using defaults");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn load_items(
        &self,
        owner: OwnerId,
        collection: Collection,
    ) -> Result<Loaded<CollectionItems>, SyncError> {
        match self.gateway.load_collection(owner, collection).await {
            Ok(Loaded::Present(rows)) => Ok(Loaded::Present(rows_to_items(rows))),
            Ok(Loaded::Missing) => {
                tracing::warn!(%collection, "collection storage missing, loading as empty");
                Ok(Loaded::Missing)
            }
            Err(e) if e.is_missing_collection() => {
                tracing::warn!(%collection, "collection storage missing, loading as empty");
                Ok(Loaded::Missing)
            }
            Err(e) => Err(e),
        }
    }
}
