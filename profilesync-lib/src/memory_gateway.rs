//! In-process [`PersistenceGateway`] over per-owner tables.
//!
//! Besides being a complete gateway, it can pretend a collection's storage
//! does not exist and inject one-shot faults, which is how the reconciler's
//! failure paths are exercised without a database.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{FaultKind, SyncError, Target, ValidationFault};
use crate::gateway::PersistenceGateway;
use crate::model::{Collection, OwnerId, ProfileFields, ProfileFieldsPatch};
use crate::records::{CollectionRows, GoalRecord, Loaded, SocialLinkRecord, WalletMethodRecord};

/// One call received by the gateway, recorded in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    LoadProfile,
    LoadCollection(Collection),
    ReplaceCollection(Collection),
    UpsertCollection(Collection),
    DeleteRows(Collection, usize),
    UpdateScalarFields,
}

impl GatewayCall {
    /// The part of the profile this call writes, if it is a write
    pub fn written_target(&self) -> Option<Target> {
        match self {
            GatewayCall::ReplaceCollection(c)
            | GatewayCall::UpsertCollection(c)
            | GatewayCall::DeleteRows(c, _) => Some(Target::Collection(*c)),
            GatewayCall::UpdateScalarFields => Some(Target::Profile),
            GatewayCall::LoadProfile | GatewayCall::LoadCollection(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct OwnerTables {
    profile: Option<ProfileFields>,
    wallet_methods: Vec<WalletMethodRecord>,
    social_links: Vec<SocialLinkRecord>,
    goals: Vec<GoalRecord>,
}

#[derive(Debug, Default)]
struct State {
    owners: HashMap<OwnerId, OwnerTables>,
    missing: HashSet<Target>,
    faults: HashMap<Target, VecDeque<FaultKind>>,
    calls: Vec<GatewayCall>,
}

impl State {
    fn record(&mut self, call: GatewayCall) {
        self.calls.push(call);
    }

    /// Missing storage wins over injected faults
    fn check(&mut self, target: Target) -> Result<(), SyncError> {
        if self.missing.contains(&target) {
            return Err(SyncError::MissingCollection(target));
        }
        let injected = self.faults.get_mut(&target).and_then(|queue| queue.pop_front());
        match injected {
            None => Ok(()),
            Some(FaultKind::MissingCollection) => Err(SyncError::MissingCollection(target)),
            Some(FaultKind::Validation) => Err(ValidationFault::new(target, "row", "rejected by storage").into()),
            Some(FaultKind::TransientIo) => Err(SyncError::transient(target, "injected connection failure")),
            Some(FaultKind::Unexpected) => Err(SyncError::unexpected(target, "injected failure")),
        }
    }

    fn tables(&mut self, owner: OwnerId) -> &mut OwnerTables {
        self.owners.entry(owner).or_default()
    }

    /// Ids of `collection` rows held by owners other than `owner`
    fn foreign_ids(&self, owner: OwnerId, collection: Collection) -> HashSet<Uuid> {
        self.owners
            .iter()
            .filter(|(other, _)| **other != owner)
            .flat_map(|(_, tables)| rows_of(tables, collection).ids())
            .collect()
    }
}

fn rows_of(tables: &OwnerTables, collection: Collection) -> CollectionRows {
    match collection {
        Collection::WalletMethods => CollectionRows::WalletMethods(tables.wallet_methods.clone()),
        Collection::SocialLinks => CollectionRows::SocialLinks(tables.social_links.clone()),
        Collection::Goals => CollectionRows::Goals(tables.goals.clone()),
    }
}

/// Rows with an id replace the stored row with that id, keeping its
/// `created_at`; everything else is appended
macro_rules! upsert_into {
    ($table:expr, $rows:expr) => {{
        for row in $rows.iter() {
            match $table.iter_mut().find(|existing| existing.id == row.id) {
                Some(existing) => {
                    let created_at = existing.created_at.or(row.created_at);
                    *existing = row.clone();
                    existing.created_at = created_at;
                }
                None => $table.push(row.clone()),
            }
        }
        $table.sort_by_key(|row| row.order_index);
    }};
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the storage for `target` does (not) exist
    pub async fn set_missing(&self, target: impl Into<Target>, missing: bool) {
        let mut state = self.state.lock().await;
        let target = target.into();
        if missing {
            state.missing.insert(target);
        } else {
            state.missing.remove(&target);
        }
    }

    /// Fail the next call touching `target` with a fault of `kind`
    pub async fn fail_next(&self, target: impl Into<Target>, kind: FaultKind) {
        let mut state = self.state.lock().await;
        state.faults.entry(target.into()).or_default().push_back(kind);
    }

    /// Every call received so far
    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn load_profile(&self, owner: OwnerId) -> Result<ProfileFields, SyncError> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::LoadProfile);
        state.check(Target::Profile)?;
        Ok(state.tables(owner).profile.clone().unwrap_or_default())
    }

    async fn load_collection(
        &self,
        owner: OwnerId,
        collection: Collection,
    ) -> Result<Loaded<CollectionRows>, SyncError> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::LoadCollection(collection));
        match state.check(collection.into()) {
            Ok(()) => Ok(Loaded::Present(rows_of(state.tables(owner), collection))),
            Err(e) if e.is_missing_collection() => Ok(Loaded::Missing),
            Err(e) => Err(e),
        }
    }

    async fn replace_collection(
        &self,
        owner: OwnerId,
        mut rows: CollectionRows,
    ) -> Result<CollectionRows, SyncError> {
        let collection = rows.collection();
        let mut state = self.state.lock().await;
        state.record(GatewayCall::ReplaceCollection(collection));
        state.check(collection.into())?;

        let taken = state.foreign_ids(owner, collection);
        if let Some(id) = rows.ids().into_iter().find(|id| taken.contains(id)) {
            return Err(ValidationFault::new(collection, "id", format!("id {} belongs to another profile", id)).into());
        }

        rows.assign_missing_ids();
        let tables = state.tables(owner);
        match &rows {
            CollectionRows::WalletMethods(r) => tables.wallet_methods = r.clone(),
            CollectionRows::SocialLinks(r) => tables.social_links = r.clone(),
            CollectionRows::Goals(r) => tables.goals = r.clone(),
        }
        Ok(rows)
    }

    async fn upsert_collection(
        &self,
        owner: OwnerId,
        mut rows: CollectionRows,
    ) -> Result<CollectionRows, SyncError> {
        let collection = rows.collection();
        let mut state = self.state.lock().await;
        state.record(GatewayCall::UpsertCollection(collection));
        state.check(collection.into())?;

        let taken = state.foreign_ids(owner, collection);
        if let Some(id) = rows.ids().into_iter().find(|id| taken.contains(id)) {
            return Err(ValidationFault::new(collection, "id", format!("id {} belongs to another profile", id)).into());
        }

        rows.assign_missing_ids();
        let tables = state.tables(owner);
        match &rows {
            CollectionRows::WalletMethods(r) => upsert_into!(tables.wallet_methods, r),
            CollectionRows::SocialLinks(r) => upsert_into!(tables.social_links, r),
            CollectionRows::Goals(r) => upsert_into!(tables.goals, r),
        }

        // Report what storage now holds for these rows
        let stored = rows_of(tables, collection);
        let committed = match (rows, stored) {
            (CollectionRows::WalletMethods(r), CollectionRows::WalletMethods(s)) => {
                CollectionRows::WalletMethods(r.iter().filter_map(|row| s.iter().find(|x| x.id == row.id).cloned()).collect())
            }
            (CollectionRows::SocialLinks(r), CollectionRows::SocialLinks(s)) => {
                CollectionRows::SocialLinks(r.iter().filter_map(|row| s.iter().find(|x| x.id == row.id).cloned()).collect())
            }
            (CollectionRows::Goals(r), CollectionRows::Goals(s)) => {
                CollectionRows::Goals(r.iter().filter_map(|row| s.iter().find(|x| x.id == row.id).cloned()).collect())
            }
            _ => return Err(SyncError::unexpected(collection, "collection changed during upsert")),
        };
        Ok(committed)
    }

    async fn delete_rows(&self, collection: Collection, ids: &[Uuid]) -> Result<(), SyncError> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::DeleteRows(collection, ids.len()));
        state.check(collection.into())?;

        for tables in state.owners.values_mut() {
            match collection {
                Collection::WalletMethods => tables.wallet_methods.retain(|r| !r.id.is_some_and(|id| ids.contains(&id))),
                Collection::SocialLinks => tables.social_links.retain(|r| !r.id.is_some_and(|id| ids.contains(&id))),
                Collection::Goals => tables.goals.retain(|r| !r.id.is_some_and(|id| ids.contains(&id))),
            }
        }
        Ok(())
    }

    async fn update_scalar_fields(
        &self,
        owner: OwnerId,
        patch: &ProfileFieldsPatch,
    ) -> Result<(), SyncError> {
        let mut state = self.state.lock().await;
        state.record(GatewayCall::UpdateScalarFields);
        state.check(Target::Profile)?;

        let profile = state.tables(owner).profile.get_or_insert_with(ProfileFields::default);
        patch.apply_to(profile);
        tracing::trace!(%owner, "profile fields updated in memory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WalletKind;

    fn wallet_row(owner: OwnerId, name: &str, order_index: i32) -> WalletMethodRecord {
        WalletMethodRecord {
            id: None,
            profile_id: owner,
            method_type: WalletKind::External,
            platform: "paypal".to_string(),
            name: name.to_string(),
            handle: None,
            url: None,
            details: None,
            enabled: true,
            order_index,
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_replace_assigns_ids_and_replaces_rows() {
        let gateway = MemoryGateway::new();
        let owner = Uuid::new_v4();

        let first = gateway
            .replace_collection(owner, CollectionRows::WalletMethods(vec![wallet_row(owner, "A", 0)]))
            .await
            .unwrap();
        assert_eq!(first.ids().len(), 1);

        gateway
            .replace_collection(owner, CollectionRows::WalletMethods(vec![wallet_row(owner, "B", 0)]))
            .await
            .unwrap();

        let loaded = gateway
            .load_collection(owner, Collection::WalletMethods)
            .await
            .unwrap()
            .or_empty(Collection::WalletMethods);
        match loaded {
            CollectionRows::WalletMethods(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].name, "B");
            }
            other => panic!("unexpected rows: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_collection_reads_empty_and_rejects_writes() {
        let gateway = MemoryGateway::new();
        let owner = Uuid::new_v4();
        gateway.set_missing(Collection::Goals, true).await;

        let loaded = gateway.load_collection(owner, Collection::Goals).await.unwrap();
        assert!(loaded.is_missing());

        let err = gateway
            .replace_collection(owner, CollectionRows::Goals(Vec::new()))
            .await
            .unwrap_err();
        assert!(err.is_missing_collection());
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let gateway = MemoryGateway::new();
        let owner = Uuid::new_v4();
        gateway.fail_next(Collection::SocialLinks, FaultKind::TransientIo).await;

        let err = gateway.load_collection(owner, Collection::SocialLinks).await.unwrap_err();
        assert_eq!(err.kind(), FaultKind::TransientIo);
        assert!(gateway.load_collection(owner, Collection::SocialLinks).await.is_ok());
    }

    #[tokio::test]
    async fn test_ids_cannot_cross_owners() {
        let gateway = MemoryGateway::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let committed = gateway
            .replace_collection(alice, CollectionRows::WalletMethods(vec![wallet_row(alice, "A", 0)]))
            .await
            .unwrap();
        let stolen = committed.ids()[0];

        let mut row = wallet_row(bob, "B", 0);
        row.id = Some(stolen);
        let err = gateway
            .replace_collection(bob, CollectionRows::WalletMethods(vec![row]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FaultKind::Validation);
    }

    #[tokio::test]
    async fn test_update_scalar_fields_creates_profile() {
        let gateway = MemoryGateway::new();
        let owner = Uuid::new_v4();
        let patch = ProfileFieldsPatch {
            display_name: Some("Ada".to_string()),
            ..Default::default()
        };

        gateway.update_scalar_fields(owner, &patch).await.unwrap();
        let fields = gateway.load_profile(owner).await.unwrap();
        assert_eq!(fields.display_name, "Ada");
        assert_eq!(
            gateway.calls().await,
            vec![GatewayCall::UpdateScalarFields, GatewayCall::LoadProfile]
        );
    }
}
