use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SyncError;
use crate::model::{Collection, OwnerId, ProfileFields, ProfileFieldsPatch};
use crate::records::{CollectionRows, Loaded};

/// The storage boundary the synchronization engine depends on.
///
/// Implementations report absent storage for a collection as
/// [`Loaded::Missing`] on reads and [`SyncError::MissingCollection`] on
/// writes, never as an I/O error.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Scalar fields of the owner's profile
    async fn load_profile(&self, owner: OwnerId) -> Result<ProfileFields, SyncError>;

    /// All rows of one collection for the owner, ordered by position
    async fn load_collection(
        &self,
        owner: OwnerId,
        collection: Collection,
    ) -> Result<Loaded<CollectionRows>, SyncError>;

    /// Delete every row the owner has in `rows.collection()` and insert
    /// `rows` in its place. Rows without an id get one from storage.
    async fn replace_collection(
        &self,
        owner: OwnerId,
        rows: CollectionRows,
    ) -> Result<CollectionRows, SyncError>;

    /// Insert rows without an id, update rows with one
    async fn upsert_collection(
        &self,
        owner: OwnerId,
        rows: CollectionRows,
    ) -> Result<CollectionRows, SyncError>;

    async fn delete_rows(&self, collection: Collection, ids: &[Uuid]) -> Result<(), SyncError>;

    async fn update_scalar_fields(
        &self,
        owner: OwnerId,
        patch: &ProfileFieldsPatch,
    ) -> Result<(), SyncError>;
}
