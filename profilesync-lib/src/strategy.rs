//! Collection sync strategies.
//!
//! * Full-Replace (wallet methods, goals): the stored collection becomes
//!   exactly the incoming array.
//! * Upsert-Preserve (social links): incoming rows are matched to stored
//!   rows by natural key so their ids survive edits, then stored rows whose
//!   url disappeared are deleted.
//!
//! Both absorb a missing collection by reporting [`StrategyOutcome::Skipped`].

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::SyncError;
use crate::gateway::PersistenceGateway;
use crate::identity::{find_match, normalize_platform};
use crate::model::{Collection, OwnerId};
use crate::records::{CollectionRows, Loaded, SocialLinkRecord};
use crate::transform::touch;

/// Which algorithm a collection is synced with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    FullReplace,
    UpsertPreserve,
}

impl SyncStrategy {
    pub fn for_collection(collection: Collection) -> Self {
        match collection {
            Collection::WalletMethods | Collection::Goals => SyncStrategy::FullReplace,
            // Social links anchor photo stories and wallet references,
            // so their ids must survive edits
            Collection::SocialLinks => SyncStrategy::UpsertPreserve,
        }
    }

    /// Run this strategy for one complete incoming batch
    pub async fn run<G: PersistenceGateway + ?Sized>(
        &self,
        gateway: &G,
        owner: OwnerId,
        rows: CollectionRows,
        now: DateTime<Utc>,
    ) -> Result<StrategyOutcome, SyncError> {
        match (self, rows) {
            (SyncStrategy::UpsertPreserve, CollectionRows::SocialLinks(links)) => {
                upsert_preserve(gateway, owner, links, now).await
            }
            (SyncStrategy::UpsertPreserve, rows) => Err(SyncError::unexpected(
                rows.collection(),
                "upsert-preserve only applies to social links",
            )),
            (SyncStrategy::FullReplace, rows) => full_replace(gateway, owner, rows, now).await,
        }
    }
}

/// What a strategy committed
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    /// Rows as storage returned them, ids included
    pub rows: CollectionRows,
    /// Rows that kept an existing id
    pub preserved: usize,
    /// Stored rows deleted because they were no longer present
    pub pruned: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Committed(Committed),
    /// The collection's storage does not exist; nothing was written
    Skipped,
}

fn absorb_missing<T>(
    collection: Collection,
    result: Result<T, SyncError>,
) -> Result<Option<T>, SyncError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_missing_collection() => {
            tracing::warn!(%collection, "collection storage missing, skipping write");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn stamp_rows(rows: &mut CollectionRows, now: DateTime<Utc>) {
    match rows {
        CollectionRows::WalletMethods(rows) => {
            for row in rows.iter_mut() {
                touch(&mut row.created_at, &mut row.updated_at, now);
            }
        }
        CollectionRows::SocialLinks(rows) => {
            for row in rows.iter_mut() {
                touch(&mut row.created_at, &mut row.updated_at, now);
            }
        }
        CollectionRows::Goals(rows) => {
            for row in rows.iter_mut() {
                touch(&mut row.created_at, &mut row.updated_at, now);
            }
        }
    }
}

/// Replace the owner's stored collection with `rows`.
///
/// Rows that already carry a storage id are written back under that id;
/// the gateway performs the delete and the insert as one unit.
pub async fn full_replace<G: PersistenceGateway + ?Sized>(
    gateway: &G,
    owner: OwnerId,
    mut rows: CollectionRows,
    now: DateTime<Utc>,
) -> Result<StrategyOutcome, SyncError> {
    let collection = rows.collection();
    let preserved = rows.ids().len();
    stamp_rows(&mut rows, now);

    tracing::debug!(%collection, rows = rows.len(), preserved, "replacing collection");
    let committed = absorb_missing(collection, gateway.replace_collection(owner, rows).await)?;

    Ok(match committed {
        Some(rows) => StrategyOutcome::Committed(Committed {
            rows,
            preserved,
            pruned: 0,
        }),
        None => StrategyOutcome::Skipped,
    })
}

/// Match incoming social links against stored ones, upsert, then prune.
pub async fn upsert_preserve<G: PersistenceGateway + ?Sized>(
    gateway: &G,
    owner: OwnerId,
    mut incoming: Vec<SocialLinkRecord>,
    now: DateTime<Utc>,
) -> Result<StrategyOutcome, SyncError> {
    let collection = Collection::SocialLinks;

    let persisted = match absorb_missing(collection, gateway.load_collection(owner, collection).await)? {
        None => return Ok(StrategyOutcome::Skipped),
        Some(Loaded::Missing) => {
            tracing::warn!(%collection, "collection storage missing, skipping write");
            return Ok(StrategyOutcome::Skipped);
        }
        Some(Loaded::Present(CollectionRows::SocialLinks(rows))) => rows,
        Some(Loaded::Present(other)) => {
            return Err(SyncError::unexpected(
                collection,
                format!("gateway returned {} rows for social links", other.collection()),
            ))
        }
    };

    // A stored row can be claimed by one incoming row only
    let mut available = persisted.clone();
    let mut preserved = 0;
    for row in incoming.iter_mut() {
        let platform = normalize_platform(&row.platform);
        row.platform = platform.to_string();

        let matched = find_match(platform, &row.url, &available).map(|m| (m.id, m.created_at));
        match matched {
            Some((id, created_at)) => {
                available.retain(|candidate| candidate.id != id);
                row.id = id;
                row.created_at = created_at;
                preserved += 1;
            }
            None => {
                row.id = None;
                row.created_at = None;
            }
        }
        touch(&mut row.created_at, &mut row.updated_at, now);
    }

    let incoming_urls: HashSet<&str> = incoming.iter().map(|row| row.url.as_str()).collect();
    let orphans: Vec<Uuid> = persisted
        .iter()
        .filter(|row| !incoming_urls.contains(row.url.as_str()))
        .filter_map(|row| row.id)
        .collect();

    let committed = if incoming.is_empty() {
        CollectionRows::SocialLinks(Vec::new())
    } else {
        match absorb_missing(
            collection,
            gateway
                .upsert_collection(owner, CollectionRows::SocialLinks(incoming))
                .await,
        )? {
            Some(rows) => rows,
            None => return Ok(StrategyOutcome::Skipped),
        }
    };

    if !orphans.is_empty() {
        tracing::debug!(%collection, count = orphans.len(), "pruning orphaned rows");
        if absorb_missing(collection, gateway.delete_rows(collection, &orphans).await)?.is_none() {
            return Ok(StrategyOutcome::Skipped);
        }
    }

    tracing::debug!(
        %collection,
        rows = committed.len(),
        preserved,
        pruned = orphans.len(),
        "upserted collection"
    );
    Ok(StrategyOutcome::Committed(Committed {
        rows: committed,
        preserved,
        pruned: orphans.len(),
    }))
}
