use serde::{Deserialize, Serialize};

use crate::model::{
    Collection, CollectionItems, Goal, ProfileFieldsPatch, SocialLink, WalletMethod,
};

/// A partial update submitted by one editor component.
///
/// Every collection present carries its complete next array; absent
/// collections are left untouched in storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<ProfileFieldsPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_methods: Option<Vec<WalletMethod>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_links: Option<Vec<SocialLink>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<Goal>>,
}

impl ProfileUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the changed scalar fields
    pub fn fields(mut self, patch: ProfileFieldsPatch) -> Self {
        self.fields = Some(patch);
        self
    }

    /// Replace the wallet method list
    pub fn wallet_methods(mut self, methods: Vec<WalletMethod>) -> Self {
        self.wallet_methods = Some(methods);
        self
    }

    /// Replace the social link list
    pub fn social_links(mut self, links: Vec<SocialLink>) -> Self {
        self.social_links = Some(links);
        self
    }

    /// Replace the goal list
    pub fn goals(mut self, goals: Vec<Goal>) -> Self {
        self.goals = Some(goals);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.touched_collections().is_empty() && !self.touches_fields()
    }

    /// Whether any scalar field changes
    pub fn touches_fields(&self) -> bool {
        self.fields.as_ref().is_some_and(|patch| !patch.is_empty())
    }

    /// Touched collections in sync order
    pub fn touched_collections(&self) -> Vec<Collection> {
        Collection::SYNC_ORDER
            .into_iter()
            .filter(|collection| match collection {
                Collection::WalletMethods => self.wallet_methods.is_some(),
                Collection::SocialLinks => self.social_links.is_some(),
                Collection::Goals => self.goals.is_some(),
            })
            .collect()
    }

    /// The complete next array for `collection`, if touched
    pub fn items(&self, collection: Collection) -> Option<CollectionItems> {
        match collection {
            Collection::WalletMethods => self.wallet_methods.clone().map(CollectionItems::WalletMethods),
            Collection::SocialLinks => self.social_links.clone().map(CollectionItems::SocialLinks),
            Collection::Goals => self.goals.clone().map(CollectionItems::Goals),
        }
    }
}
