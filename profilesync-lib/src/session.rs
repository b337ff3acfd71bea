//! One editing session over one owner's profile.
//!
//! Each submit runs one update cycle:
//! `Idle -> Submitting -> {Success | PartialFailure | Fatal} -> Idle`.
//! On success or partial failure the canonical state is reloaded and
//! overwrites the draft; on a fatal fault the optimistic draft is left as
//! is and the fault is returned.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::draft_store::{DraftSnapshot, DraftStore};
use crate::error::{SyncError, Target, ValidationFault};
use crate::gateway::PersistenceGateway;
use crate::media::{ImageKind, ImageUploader};
use crate::model::{Collection, CollectionItems, OwnerId, ProfileDraft, ProfileFieldsPatch};
use crate::reconciler::{Reconciler, SyncReport};
use crate::refresh::{CanonicalProfile, RefreshLoader};
use crate::update::ProfileUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    /// At least one update cycle has gateway calls in flight
    Submitting,
}

/// Where an uploaded image goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Avatar,
    Banner,
    /// Photo story of the social link at this position
    SocialPhoto(usize),
}

impl ImageSlot {
    pub fn kind(&self) -> ImageKind {
        match self {
            ImageSlot::Avatar => ImageKind::Avatar,
            ImageSlot::Banner => ImageKind::Banner,
            ImageSlot::SocialPhoto(_) => ImageKind::SocialPhoto,
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ProfileSession<G: ?Sized> {
    owner: OwnerId,
    store: DraftStore,
    reconciler: Reconciler<G>,
    loader: RefreshLoader<G>,
    uploader: Option<Arc<dyn ImageUploader>>,
    in_flight: AtomicUsize,
}

impl<G: PersistenceGateway + ?Sized> ProfileSession<G> {
    /// Load the owner's profile and start editing it
    pub async fn open(gateway: Arc<G>, owner: OwnerId) -> Result<Self, SyncError> {
        let loader = RefreshLoader::new(gateway.clone());
        let canonical = loader.load(owner).await?;
        tracing::info!(%owner, missing = ?canonical.missing, "editing session opened");

        Ok(Self {
            owner,
            store: DraftStore::new(canonical.draft),
            reconciler: Reconciler::new(gateway),
            loader,
            uploader: None,
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Use `uploader` for [`ProfileSession::attach_image`]
    pub fn with_uploader(mut self, uploader: Arc<dyn ImageUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn store(&self) -> &DraftStore {
        &self.store
    }

    pub fn draft(&self) -> ProfileDraft {
        self.store.draft()
    }

    pub fn subscribe(&self) -> watch::Receiver<DraftSnapshot> {
        self.store.subscribe()
    }

    pub fn state(&self) -> SyncState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            SyncState::Submitting
        } else {
            SyncState::Idle
        }
    }

    /// Local-only edit of one collection
    pub fn edit_collection(&self, items: CollectionItems) {
        self.store.replace_collection(items);
    }

    /// Local-only edit of scalar fields
    pub fn edit_fields(&self, patch: &ProfileFieldsPatch) {
        self.store.merge_scalar_fields(patch);
    }

    /// Apply `update` optimistically, persist it, then reload canonical state.
    ///
    /// Returns the report on success or partial failure. A rejected value is
    /// returned as [`SyncError::Validation`] after the refresh; the rejected
    /// part keeps its optimistic value in the draft.
    pub async fn submit(&self, update: ProfileUpdate) -> Result<SyncReport, SyncError> {
        self.store.apply_update(&update);
        let _in_flight = InFlight::enter(&self.in_flight);

        let report = match self.reconciler.reconcile(self.owner, &update).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(owner = %self.owner, error = %e, "update failed, keeping optimistic draft");
                return Err(e);
            }
        };

        let keep: Vec<Target> = report.rejections().iter().map(|fault| fault.target).collect();
        let canonical = self.loader.load(self.owner).await?;
        self.store.absorb(canonical.draft, &keep);

        report.into_result()
    }

    /// Reload canonical state and overwrite the whole draft with it
    pub async fn refresh(&self) -> Result<CanonicalProfile, SyncError> {
        let canonical = self.loader.load(self.owner).await?;
        self.store.absorb(canonical.draft.clone(), &[]);
        Ok(canonical)
    }

    /// Upload an image and submit the field or social link that holds it
    pub async fn attach_image(&self, slot: ImageSlot, file: Vec<u8>) -> Result<SyncReport, SyncError> {
        let kind = slot.kind();
        let uploader = self
            .uploader
            .as_ref()
            .ok_or_else(|| SyncError::unexpected(kind.target(), "no image uploader configured"))?;

        // Check the slot before uploading anything
        if let ImageSlot::SocialPhoto(position) = slot {
            if position >= self.store.draft().social_links.len() {
                return Err(no_social_link(position).into());
            }
        }

        let url = uploader.upload(file, self.owner, kind).await?;
        tracing::debug!(%kind, %url, "image uploaded");

        let update = match slot {
            ImageSlot::Avatar => ProfileUpdate::new().fields(ProfileFieldsPatch {
                avatar_url: Some(Some(url)),
                ..Default::default()
            }),
            ImageSlot::Banner => ProfileUpdate::new().fields(ProfileFieldsPatch {
                banner_url: Some(Some(url)),
                ..Default::default()
            }),
            ImageSlot::SocialPhoto(position) => {
                let mut links = self.store.draft().social_links;
                let link = links.get_mut(position).ok_or_else(|| no_social_link(position))?;
                link.photo_url = Some(url);
                ProfileUpdate::new().social_links(links)
            }
        };
        self.submit(update).await
    }
}

fn no_social_link(position: usize) -> ValidationFault {
    ValidationFault::new(Collection::SocialLinks, "photo_url", "no social link at this position").at(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;
    use crate::media::MemoryImageStore;
    use crate::memory_gateway::MemoryGateway;
    use crate::model::{Goal, SocialLink, WalletKind, WalletMethod};
    use uuid::Uuid;

    async fn open() -> (Arc<MemoryGateway>, ProfileSession<MemoryGateway>) {
        let gateway = Arc::new(MemoryGateway::new());
        let session = ProfileSession::open(gateway.clone(), Uuid::new_v4()).await.unwrap();
        (gateway, session)
    }

    #[tokio::test]
    async fn test_submit_absorbs_canonical_ids() {
        let (_gateway, session) = open().await;

        session
            .submit(ProfileUpdate::new().social_links(vec![SocialLink::new("Twitter", "https://x.com/a")]))
            .await
            .unwrap();

        let draft = session.draft();
        assert!(draft.social_links[0].id.is_some());
        assert_eq!(draft.social_links[0].platform, "twitter");
        assert_eq!(session.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_fatal_fault_keeps_optimistic_draft() {
        let (gateway, session) = open().await;
        gateway.fail_next(Collection::Goals, FaultKind::Unexpected).await;
        let before = session.store().revision();

        let err = session
            .submit(ProfileUpdate::new().goals(vec![Goal::new("Studio", 1000.0, 250.0)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FaultKind::Unexpected);

        let snapshot = session.store().snapshot();
        assert_eq!(snapshot.revision, before + 1);
        assert_eq!(snapshot.draft.goals.len(), 1);
        assert_eq!(snapshot.draft.goals[0].id, None);
    }

    #[tokio::test]
    async fn test_validation_fault_is_reported_after_refresh() {
        let (_gateway, session) = open().await;
        let mut goal = Goal::new("Studio", 1000.0, 0.0);
        goal.target_amount = None;

        let err = session
            .submit(
                ProfileUpdate::new()
                    .wallet_methods(vec![WalletMethod::new(WalletKind::Payid, "payid", "PayID")])
                    .goals(vec![goal]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FaultKind::Validation);

        let draft = session.draft();
        assert!(draft.wallet_methods[0].id.is_some());
        assert_eq!(draft.goals.len(), 1);
        assert_eq!(draft.goals[0].target_amount, None);
    }

    #[tokio::test]
    async fn test_attach_social_photo_keeps_link_id() {
        let (_gateway, session) = open().await;
        let session = session.with_uploader(Arc::new(MemoryImageStore::new("memory://img")));
        session
            .submit(ProfileUpdate::new().social_links(vec![SocialLink::new("ig", "https://instagram.com/a")]))
            .await
            .unwrap();
        let id = session.draft().social_links[0].id;

        session
            .attach_image(ImageSlot::SocialPhoto(0), b"photo".to_vec())
            .await
            .unwrap();

        let link = &session.draft().social_links[0];
        assert_eq!(link.id, id);
        assert!(link.photo_url.as_deref().is_some_and(|url| url.starts_with("memory://img/")));
    }

    #[tokio::test]
    async fn test_attach_image_checks_slot_and_uploader() {
        let (_gateway, session) = open().await;
        let err = session.attach_image(ImageSlot::Avatar, b"png".to_vec()).await.unwrap_err();
        assert_eq!(err.kind(), FaultKind::Unexpected);

        let session = session.with_uploader(Arc::new(MemoryImageStore::new("memory://img")));
        let err = session
            .attach_image(ImageSlot::SocialPhoto(3), b"png".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FaultKind::Validation);

        session.attach_image(ImageSlot::Banner, b"png".to_vec()).await.unwrap();
        assert!(session.draft().fields.banner_url.is_some());
    }
}
