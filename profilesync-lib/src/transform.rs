//! Conversion between draft values and storage values.
//!
//! Currency is the only lossy conversion: the draft works in major units
//! (`f64` dollars as typed), storage keeps integer minor units. Rounding is
//! half-up on the decimal value the user typed, so `12.345` becomes `1235`
//! even though the nearest `f64` is slightly below `12.345`.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;
use std::str::FromStr;

use crate::error::{Target, ValidationFault};
use crate::identity::normalize_platform;
use crate::model::{
    Collection, CollectionItems, Goal, OwnerId, ProfileFieldsPatch, SocialLink, WalletMethod,
};
use crate::records::{CollectionRows, GoalRecord, SocialLinkRecord, WalletMethodRecord};

/// Minor units per major unit (cents per dollar)
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Why a major-unit amount could not be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is required")]
    Missing,
    #[error("amount is not a number")]
    NotANumber,
    #[error("amount cannot be negative")]
    Negative,
    #[error("amount is too large to store in minor units")]
    OutOfRange,
}

/// Convert a major-unit amount to minor units, rounding half-up.
///
/// Missing and non-finite values are rejected, never coerced.
pub fn to_minor_units(value: Option<f64>) -> Result<i64, AmountError> {
    let value = value.ok_or(AmountError::Missing)?;
    if !value.is_finite() {
        return Err(AmountError::NotANumber);
    }
    if value < 0.0 {
        return Err(AmountError::Negative);
    }

    // Display yields the shortest decimal that round-trips to `value`,
    // i.e. what the user typed rather than the binary approximation
    let major = match Decimal::from_str(&value.to_string()) {
        Ok(major) => major,
        // More fractional digits than a decimal holds, far below half a cent
        Err(_) if value < 1.0 => return Ok(0),
        Err(_) => return Err(AmountError::OutOfRange),
    };
    major
        .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
        .ok_or(AmountError::OutOfRange)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(AmountError::OutOfRange)
}

/// Minor units back to a major-unit amount for display
pub fn to_major_units(minor: i64) -> f64 {
    minor as f64 / MINOR_UNITS_PER_MAJOR as f64
}

/// Minor units formatted with two decimals, e.g. `1235` -> `"12.35"`
pub fn format_minor_units(minor: i64) -> String {
    Decimal::new(minor, 2).to_string()
}

/// Display-path amount: missing or NaN renders as 0
pub fn display_major_units(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Stamp a row being written: `created_at` only when first created,
/// `updated_at` on every write
pub fn touch(
    created_at: &mut Option<DateTime<Utc>>,
    updated_at: &mut Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) {
    created_at.get_or_insert(now);
    *updated_at = Some(now);
}

/// Scalar field checks applied before the profile row is written
pub fn check_fields_patch(patch: &ProfileFieldsPatch) -> Result<(), ValidationFault> {
    if let Some(name) = &patch.display_name {
        if name.trim().is_empty() {
            return Err(ValidationFault::new(Target::Profile, "display_name", "cannot be blank"));
        }
    }
    Ok(())
}

fn position_i32(position: usize) -> i32 {
    i32::try_from(position).unwrap_or(i32::MAX)
}

fn blank_to_none(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn wallet_method_to_record(
    owner: OwnerId,
    position: usize,
    method: &WalletMethod,
) -> WalletMethodRecord {
    WalletMethodRecord {
        id: method.id,
        profile_id: owner,
        method_type: method.kind,
        platform: method.platform.trim().to_string(),
        name: method.name.trim().to_string(),
        handle: blank_to_none(&method.handle),
        url: blank_to_none(&method.url),
        details: method.details.clone().filter(|details| !details.is_empty()),
        enabled: method.enabled,
        order_index: position_i32(position),
        created_at: method.created_at,
        updated_at: None,
    }
}

pub fn wallet_method_from_record(record: WalletMethodRecord) -> WalletMethod {
    WalletMethod {
        id: record.id,
        kind: record.method_type,
        platform: record.platform,
        name: record.name,
        handle: record.handle,
        url: record.url,
        details: record.details,
        enabled: record.enabled,
        order_index: record.order_index,
        created_at: record.created_at,
    }
}

/// Storage row for a social link; the platform is stored normalized and the
/// id is left for the sync strategy to resolve
pub fn social_link_to_record(owner: OwnerId, position: usize, link: &SocialLink) -> SocialLinkRecord {
    SocialLinkRecord {
        id: None,
        profile_id: owner,
        platform: normalize_platform(&link.platform).to_string(),
        username: link.username.trim().to_string(),
        url: link.url.clone(),
        photo_url: link.photo_url.clone(),
        photo_caption: blank_to_none(&link.photo_caption),
        wallet_method_id: link.wallet_method_id,
        order_index: position_i32(position),
        created_at: None,
        updated_at: None,
    }
}

pub fn social_link_from_record(record: SocialLinkRecord) -> SocialLink {
    SocialLink {
        id: record.id,
        platform: record.platform,
        username: record.username,
        url: record.url,
        photo_url: record.photo_url,
        photo_caption: record.photo_caption,
        wallet_method_id: record.wallet_method_id,
    }
}

pub fn goal_to_record(owner: OwnerId, position: usize, goal: &Goal) -> Result<GoalRecord, ValidationFault> {
    let amount = |field: &str, value: Option<f64>| {
        to_minor_units(value)
            .map_err(|e| ValidationFault::new(Collection::Goals, field, e.to_string()).at(position))
    };

    Ok(GoalRecord {
        id: goal.id,
        profile_id: owner,
        title: goal.title.trim().to_string(),
        description: blank_to_none(&goal.description),
        target_amount: amount("target_amount", goal.target_amount)?,
        current_amount: amount("current_amount", goal.current_amount)?,
        wallet_method_id: goal.wallet_method_id,
        active: goal.active,
        order_index: position_i32(position),
        created_at: goal.created_at,
        updated_at: None,
    })
}

pub fn goal_from_record(record: GoalRecord) -> Goal {
    Goal {
        id: record.id,
        title: record.title,
        description: record.description,
        target_amount: Some(to_major_units(record.target_amount)),
        current_amount: Some(to_major_units(record.current_amount)),
        wallet_method_id: record.wallet_method_id,
        active: record.active,
        created_at: record.created_at,
    }
}

/// Reject an incoming array that repeats a storage id
fn check_unique_ids<'a>(
    collection: Collection,
    ids: impl Iterator<Item = Option<&'a uuid::Uuid>>,
) -> Result<(), ValidationFault> {
    let mut seen = HashSet::new();
    for (position, id) in ids.enumerate() {
        if let Some(id) = id {
            if !seen.insert(*id) {
                return Err(ValidationFault::new(collection, "id", format!("duplicate id {}", id)).at(position));
            }
        }
    }
    Ok(())
}

/// Convert a complete draft array into storage rows for `owner`
pub fn items_to_rows(owner: OwnerId, items: &CollectionItems) -> Result<CollectionRows, ValidationFault> {
    match items {
        CollectionItems::WalletMethods(methods) => {
            check_unique_ids(Collection::WalletMethods, methods.iter().map(|m| m.id.as_ref()))?;
            Ok(CollectionRows::WalletMethods(
                methods
                    .iter()
                    .enumerate()
                    .map(|(i, m)| wallet_method_to_record(owner, i, m))
                    .collect(),
            ))
        }
        CollectionItems::SocialLinks(links) => Ok(CollectionRows::SocialLinks(
            links
                .iter()
                .enumerate()
                .map(|(i, l)| social_link_to_record(owner, i, l))
                .collect(),
        )),
        CollectionItems::Goals(goals) => {
            check_unique_ids(Collection::Goals, goals.iter().map(|g| g.id.as_ref()))?;
            let rows = goals
                .iter()
                .enumerate()
                .map(|(i, g)| goal_to_record(owner, i, g))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CollectionRows::Goals(rows))
        }
    }
}

/// Convert canonical storage rows back into draft items
pub fn rows_to_items(rows: CollectionRows) -> CollectionItems {
    match rows {
        CollectionRows::WalletMethods(rows) => {
            CollectionItems::WalletMethods(rows.into_iter().map(wallet_method_from_record).collect())
        }
        CollectionRows::SocialLinks(rows) => {
            CollectionItems::SocialLinks(rows.into_iter().map(social_link_from_record).collect())
        }
        CollectionRows::Goals(rows) => {
            CollectionItems::Goals(rows.into_iter().map(goal_from_record).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_to_minor_units_rounds_half_up() {
        assert_eq!(to_minor_units(Some(12.345)), Ok(1235));
        assert_eq!(to_minor_units(Some(1.005)), Ok(101));
        assert_eq!(to_minor_units(Some(2.675)), Ok(268));
        assert_eq!(to_minor_units(Some(0.125)), Ok(13));
        assert_eq!(to_minor_units(Some(12.344)), Ok(1234));
        assert_eq!(to_minor_units(Some(1000.0)), Ok(100000));
        assert_eq!(to_minor_units(Some(0.0)), Ok(0));
    }

    #[test]
    fn test_to_minor_units_beyond_decimal_precision() {
        assert_eq!(to_minor_units(Some(1e-30)), Ok(0));
        assert_eq!(to_minor_units(Some(1.2345678901234567e-20)), Ok(0));
        assert_eq!(to_minor_units(Some(f64::MIN_POSITIVE)), Ok(0));
        assert_eq!(to_minor_units(Some(1e30)), Err(AmountError::OutOfRange));
        assert_eq!(to_minor_units(Some(1e20)), Err(AmountError::OutOfRange));
    }

    #[test]
    fn test_to_minor_units_rejects_bad_input() {
        assert_eq!(to_minor_units(None), Err(AmountError::Missing));
        assert_eq!(to_minor_units(Some(f64::NAN)), Err(AmountError::NotANumber));
        assert_eq!(to_minor_units(Some(f64::INFINITY)), Err(AmountError::NotANumber));
        assert_eq!(to_minor_units(Some(-5.0)), Err(AmountError::Negative));
        assert_eq!(to_minor_units(Some(1e30)), Err(AmountError::OutOfRange));
    }

    #[test]
    fn test_minor_to_major_display() {
        assert_eq!(to_major_units(1235), 12.35);
        assert_eq!(format_minor_units(1235), "12.35");
        assert_eq!(format_minor_units(100000), "1000.00");
        assert_eq!(display_major_units(Some(f64::NAN)), 0.0);
        assert_eq!(display_major_units(None), 0.0);
        assert_eq!(display_major_units(Some(3.5)), 3.5);
    }

    #[test]
    fn test_touch_keeps_created_at() {
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let mut created_at = None;
        let mut updated_at = None;
        touch(&mut created_at, &mut updated_at, first);
        assert_eq!(created_at, Some(first));
        assert_eq!(updated_at, Some(first));

        touch(&mut created_at, &mut updated_at, later);
        assert_eq!(created_at, Some(first));
        assert_eq!(updated_at, Some(later));
    }

    #[test]
    fn test_goal_conversion_reports_field_and_row() {
        let owner = Uuid::new_v4();
        let mut goal = Goal::new("Studio", 1000.0, 250.0);
        let record = goal_to_record(owner, 0, &goal).unwrap();
        assert_eq!(record.target_amount, 100000);
        assert_eq!(record.current_amount, 25000);

        goal.current_amount = Some(f64::NAN);
        let fault = goal_to_record(owner, 3, &goal).unwrap_err();
        assert_eq!(fault.field, "current_amount");
        assert_eq!(fault.position, Some(3));

        let back = goal_from_record(record);
        assert_eq!(back.target_amount, Some(1000.0));
        assert_eq!(back.current_amount, Some(250.0));
    }

    #[test]
    fn test_items_to_rows_rejects_duplicate_ids() {
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();
        let mut first = WalletMethod::new(crate::model::WalletKind::External, "paypal", "PayPal");
        first.id = Some(id);
        let second = first.clone();

        let fault = items_to_rows(owner, &CollectionItems::WalletMethods(vec![first, second])).unwrap_err();
        assert_eq!(fault.field, "id");
        assert_eq!(fault.position, Some(1));
    }

    #[test]
    fn test_social_link_record_is_normalized() {
        let owner = Uuid::new_v4();
        let mut link = SocialLink::new(" IG ", "https://instagram.com/ada");
        link.photo_caption = Some("   ".to_string());
        let record = social_link_to_record(owner, 4, &link);

        assert_eq!(record.platform, "instagram");
        assert_eq!(record.order_index, 4);
        assert_eq!(record.photo_caption, None);
        assert_eq!(record.id, None);
    }
}
