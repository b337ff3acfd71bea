//! Draft-side (UI-native) representation of a profile.
//!
//! Monetary amounts here are major units (dollars) as the editor shows them.
//! Storage-native rows live in [`crate::records`]; conversion between the two
//! happens only in [`crate::transform`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::identity::{normalize_platform, Platform};
use crate::transform::display_major_units;

/// Identifier of the profile owner; every collection is scoped by it
pub type OwnerId = Uuid;

/// The three independently persisted child collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    WalletMethods,
    SocialLinks,
    Goals,
}

impl Collection {
    /// Order in which the reconciler visits touched collections
    pub const SYNC_ORDER: [Collection; 3] = [
        Collection::WalletMethods,
        Collection::SocialLinks,
        Collection::Goals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::WalletMethods => "wallet_methods",
            Collection::SocialLinks => "social_links",
            Collection::Goals => "goals",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-section visibility toggles shown on the public profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionVisibility {
    pub wallet: bool,
    pub socials: bool,
    pub goals: bool,
}

impl Default for SectionVisibility {
    fn default() -> Self {
        Self {
            wallet: true,
            socials: true,
            goals: true,
        }
    }
}

/// Scalar fields of the profile aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileFields {
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    pub location: Option<String>,
    pub theme_id: Option<String>,
    pub visibility: SectionVisibility,
}

/// Changed scalar fields; `None` leaves a field untouched.
///
/// Nullable fields use `Option<Option<_>>` so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileFieldsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub bio: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_url: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub banner_url: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub location: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub theme_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_wallet: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_socials: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_goals: Option<bool>,
}

/// Distinguish an explicit `null` (clear the field) from an absent key
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ProfileFieldsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every present field onto `fields`
    pub fn apply_to(&self, fields: &mut ProfileFields) {
        if let Some(display_name) = &self.display_name {
            fields.display_name = display_name.clone();
        }
        if let Some(bio) = &self.bio {
            fields.bio = bio.clone();
        }
        if let Some(avatar_url) = &self.avatar_url {
            fields.avatar_url = avatar_url.clone();
        }
        if let Some(banner_url) = &self.banner_url {
            fields.banner_url = banner_url.clone();
        }
        if let Some(location) = &self.location {
            fields.location = location.clone();
        }
        if let Some(theme_id) = &self.theme_id {
            fields.theme_id = theme_id.clone();
        }
        if let Some(show) = self.show_wallet {
            fields.visibility.wallet = show;
        }
        if let Some(show) = self.show_socials {
            fields.visibility.socials = show;
        }
        if let Some(show) = self.show_goals {
            fields.visibility.goals = show;
        }
    }
}

/// Kind of payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    /// Link to a third-party checkout (PayPal, Ko-fi, ...)
    External,
    /// PayID via email or phone
    Payid,
    /// Direct bank transfer
    Bank,
}

impl std::str::FromStr for WalletKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "external" => Ok(WalletKind::External),
            "payid" => Ok(WalletKind::Payid),
            "bank" => Ok(WalletKind::Bank),
            _ => Err(format!("Invalid WalletKind variant: {}", s)),
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WalletKind::External => "external",
            WalletKind::Payid => "payid",
            WalletKind::Bank => "bank",
        };
        write!(f, "{}", s)
    }
}

/// Structured payment details; which fields apply depends on the kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bsb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl WalletDetails {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletMethod {
    /// Assigned by storage; `None` until the first sync
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: WalletKind,
    pub platform: String,
    pub name: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub details: Option<WalletDetails>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Position in the list; rewritten from the array index on every sync
    #[serde(default)]
    pub order_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl WalletMethod {
    pub fn new(kind: WalletKind, platform: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            platform: platform.into(),
            name: name.into(),
            handle: None,
            url: None,
            details: None,
            enabled: true,
            order_index: 0,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialLink {
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Platform as typed by the user, e.g. "IG" or " Twitter "
    pub platform: String,
    #[serde(default)]
    pub username: String,
    pub url: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub photo_caption: Option<String>,
    /// Weak reference; may point at a wallet method that no longer exists
    #[serde(default)]
    pub wallet_method_id: Option<Uuid>,
}

impl SocialLink {
    pub fn new(platform: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            platform: platform.into(),
            username: String::new(),
            url: url.into(),
            photo_url: None,
            photo_caption: None,
            wallet_method_id: None,
        }
    }

    pub fn normalized_platform(&self) -> Platform {
        normalize_platform(&self.platform)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Major units; `None` models an empty input box
    #[serde(default)]
    pub target_amount: Option<f64>,
    /// Major units
    #[serde(default)]
    pub current_amount: Option<f64>,
    #[serde(default)]
    pub wallet_method_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn new(title: impl Into<String>, target_amount: f64, current_amount: f64) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: None,
            target_amount: Some(target_amount),
            current_amount: Some(current_amount),
            wallet_method_id: None,
            active: true,
            created_at: None,
        }
    }

    /// Fraction of the target reached, clamped to `[0, 1]`.
    ///
    /// Missing or non-numeric amounts render as 0.
    pub fn progress(&self) -> f64 {
        let target = display_major_units(self.target_amount);
        let current = display_major_units(self.current_amount);
        if target <= 0.0 {
            return 0.0;
        }
        (current / target).clamp(0.0, 1.0)
    }
}

fn default_true() -> bool {
    true
}

/// The full in-memory profile being edited
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDraft {
    pub fields: ProfileFields,
    pub wallet_methods: Vec<WalletMethod>,
    pub social_links: Vec<SocialLink>,
    pub goals: Vec<Goal>,
}

impl ProfileDraft {
    /// Resolve a weak wallet reference; dangling ids yield `None`
    pub fn wallet_method(&self, id: Option<Uuid>) -> Option<&WalletMethod> {
        let id = id?;
        self.wallet_methods.iter().find(|method| method.id == Some(id))
    }

    /// Overwrite one collection with the given items
    pub fn set_collection(&mut self, items: CollectionItems) {
        match items {
            CollectionItems::WalletMethods(items) => self.wallet_methods = items,
            CollectionItems::SocialLinks(items) => self.social_links = items,
            CollectionItems::Goals(items) => self.goals = items,
        }
    }
}

/// A complete next array for one collection
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionItems {
    WalletMethods(Vec<WalletMethod>),
    SocialLinks(Vec<SocialLink>),
    Goals(Vec<Goal>),
}

impl CollectionItems {
    pub fn collection(&self) -> Collection {
        match self {
            CollectionItems::WalletMethods(_) => Collection::WalletMethods,
            CollectionItems::SocialLinks(_) => Collection::SocialLinks,
            CollectionItems::Goals(_) => Collection::Goals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_applies_only_present_fields() {
        let mut fields = ProfileFields {
            display_name: "Ada".to_string(),
            bio: Some("old bio".to_string()),
            location: Some("Sydney".to_string()),
            ..Default::default()
        };

        let patch = ProfileFieldsPatch {
            bio: Some(None),
            show_goals: Some(false),
            ..Default::default()
        };
        patch.apply_to(&mut fields);

        assert_eq!(fields.display_name, "Ada");
        assert_eq!(fields.bio, None);
        assert_eq!(fields.location.as_deref(), Some("Sydney"));
        assert!(!fields.visibility.goals);
        assert!(fields.visibility.wallet);
        assert!(ProfileFieldsPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_dangling_wallet_reference_resolves_to_none() {
        let mut method = WalletMethod::new(WalletKind::External, "paypal", "PayPal");
        let id = Uuid::new_v4();
        method.id = Some(id);
        let draft = ProfileDraft {
            wallet_methods: vec![method],
            ..Default::default()
        };

        assert_eq!(draft.wallet_method(Some(id)).map(|m| m.name.as_str()), Some("PayPal"));
        assert!(draft.wallet_method(Some(Uuid::new_v4())).is_none());
        assert!(draft.wallet_method(None).is_none());
    }

    #[test]
    fn test_goal_progress_degrades_to_zero() {
        let goal = Goal::new("Studio", 1000.0, 250.0);
        assert_eq!(goal.progress(), 0.25);

        let mut broken = goal.clone();
        broken.target_amount = Some(f64::NAN);
        assert_eq!(broken.progress(), 0.0);

        broken.target_amount = None;
        assert_eq!(broken.progress(), 0.0);

        let mut overfunded = goal;
        overfunded.current_amount = Some(5000.0);
        assert_eq!(overfunded.progress(), 1.0);
    }

    #[test]
    fn test_wallet_kind_parsing() {
        assert_eq!("payid".parse::<WalletKind>(), Ok(WalletKind::Payid));
        assert_eq!(WalletKind::Bank.to_string(), "bank");
        assert!("crypto".parse::<WalletKind>().is_err());
    }
}
