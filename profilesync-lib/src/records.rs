//! Storage-native rows exchanged with a [`crate::gateway::PersistenceGateway`].
//!
//! Amounts are integer minor units and every row carries its owner, its
//! position and the storage timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Collection, OwnerId, WalletDetails, WalletKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletMethodRecord {
    pub id: Option<Uuid>,
    pub profile_id: OwnerId,
    pub method_type: WalletKind,
    pub platform: String,
    pub name: String,
    pub handle: Option<String>,
    pub url: Option<String>,
    pub details: Option<WalletDetails>,
    pub enabled: bool,
    pub order_index: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialLinkRecord {
    pub id: Option<Uuid>,
    pub profile_id: OwnerId,
    /// Normalized platform name
    pub platform: String,
    pub username: String,
    pub url: String,
    pub photo_url: Option<String>,
    pub photo_caption: Option<String>,
    pub wallet_method_id: Option<Uuid>,
    pub order_index: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRecord {
    pub id: Option<Uuid>,
    pub profile_id: OwnerId,
    pub title: String,
    pub description: Option<String>,
    /// Minor units (cents)
    pub target_amount: i64,
    /// Minor units (cents)
    pub current_amount: i64,
    pub wallet_method_id: Option<Uuid>,
    pub active: bool,
    pub order_index: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An ordered batch of rows belonging to one collection
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionRows {
    WalletMethods(Vec<WalletMethodRecord>),
    SocialLinks(Vec<SocialLinkRecord>),
    Goals(Vec<GoalRecord>),
}

impl CollectionRows {
    /// An empty batch for the given collection
    pub fn empty(collection: Collection) -> Self {
        match collection {
            Collection::WalletMethods => CollectionRows::WalletMethods(Vec::new()),
            Collection::SocialLinks => CollectionRows::SocialLinks(Vec::new()),
            Collection::Goals => CollectionRows::Goals(Vec::new()),
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            CollectionRows::WalletMethods(_) => Collection::WalletMethods,
            CollectionRows::SocialLinks(_) => Collection::SocialLinks,
            CollectionRows::Goals(_) => Collection::Goals,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CollectionRows::WalletMethods(rows) => rows.len(),
            CollectionRows::SocialLinks(rows) => rows.len(),
            CollectionRows::Goals(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every row that has one, in order
    pub fn ids(&self) -> Vec<Uuid> {
        match self {
            CollectionRows::WalletMethods(rows) => rows.iter().filter_map(|r| r.id).collect(),
            CollectionRows::SocialLinks(rows) => rows.iter().filter_map(|r| r.id).collect(),
            CollectionRows::Goals(rows) => rows.iter().filter_map(|r| r.id).collect(),
        }
    }

    /// Give every row without an id a fresh one
    pub fn assign_missing_ids(&mut self) {
        match self {
            CollectionRows::WalletMethods(rows) => rows.iter_mut().for_each(|r| {
                r.id.get_or_insert_with(Uuid::new_v4);
            }),
            CollectionRows::SocialLinks(rows) => rows.iter_mut().for_each(|r| {
                r.id.get_or_insert_with(Uuid::new_v4);
            }),
            CollectionRows::Goals(rows) => rows.iter_mut().for_each(|r| {
                r.id.get_or_insert_with(Uuid::new_v4);
            }),
        }
    }
}

/// Result of loading a collection whose storage may be absent
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<T> {
    Present(T),
    /// The collection's storage does not exist
    Missing,
}

impl<T> Loaded<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Loaded::Missing)
    }
}

impl Loaded<CollectionRows> {
    /// Rows when present, an empty batch of `collection` when missing
    pub fn or_empty(self, collection: Collection) -> CollectionRows {
        match self {
            Loaded::Present(rows) => rows,
            Loaded::Missing => CollectionRows::empty(collection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_collection_loads_as_empty() {
        let loaded: Loaded<CollectionRows> = Loaded::Missing;
        assert!(loaded.is_missing());

        let rows = loaded.or_empty(Collection::Goals);
        assert_eq!(rows, CollectionRows::Goals(Vec::new()));
        assert!(rows.is_empty());
    }

    #[test]
    fn test_ids_skip_unsaved_rows() {
        let saved = Uuid::new_v4();
        let rows = CollectionRows::SocialLinks(vec![
            SocialLinkRecord {
                id: Some(saved),
                ..Default::default()
            },
            SocialLinkRecord::default(),
        ]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows.ids(), vec![saved]);
        assert_eq!(rows.collection(), Collection::SocialLinks);
    }
}
