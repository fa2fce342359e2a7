//! Row types for the loyalty tables. Mirror the backend's JSON shapes.

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// LOOKUP REFS
// =============================================================================

/// Restaurant row selected by the principal lookup (`select=id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RestaurantRef {
    pub id: Uuid,
}

/// Customer row selected by the principal lookup (`select=id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CustomerRef {
    pub id: Uuid,
}

// =============================================================================
// RESTAURANTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRestaurant {
    pub name: String,
    pub slug: String,
    pub location: String,
    pub owner_name: String,
    pub email: String,
    pub phone: String,
    pub auth_id: Uuid,
    pub is_active: bool,
}

// =============================================================================
// CUSTOMERS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub restaurant_id: Option<Uuid>,
    /// Six-digit code staff can key in instead of scanning.
    #[serde(default)]
    pub redemption_code: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub restaurant_id: Uuid,
    pub user_id: Uuid,
    pub redemption_code: String,
}

// =============================================================================
// COUPONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(default)]
    pub is_redeemed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub redeemed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub customer_id: Uuid,
    pub restaurant_id: Uuid,
}

/// Name and email of the customer holding a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponHolder {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Coupon with its holder embedded, as returned by the staff validation query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponDetails {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(default)]
    pub is_redeemed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub redeemed_at: Option<OffsetDateTime>,
    #[serde(default, deserialize_with = "first_of_one_or_many")]
    pub customer: Option<CouponHolder>,
}

/// Embedded relations arrive as an object or a one-element array depending
/// on how the backend resolves the foreign key.
fn first_of_one_or_many<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        Some(OneOrMany::One(v)) => Some(v),
        Some(OneOrMany::Many(v)) => v.into_iter().next(),
        None => None,
    })
}

// =============================================================================
// STAMPS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StampProgramRef {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampProgram {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub stamps_required: u32,
    #[serde(default)]
    pub reward_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampCard {
    pub id: Uuid,
    pub current_stamps: u32,
    pub total_stamps_earned: u32,
    pub status: String,
    #[serde(default, deserialize_with = "first_of_one_or_many")]
    pub program: Option<StampProgram>,
}

impl StampCard {
    /// Stamps still needed for the next reward, if the program is known.
    #[must_use]
    pub fn stamps_remaining(&self) -> Option<u32> {
        self.program
            .as_ref()
            .map(|p| p.stamps_required.saturating_sub(self.current_stamps))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewStampCard {
    pub customer_id: Uuid,
    pub program_id: Uuid,
    pub current_stamps: u32,
    pub total_stamps_earned: u32,
    pub status: &'static str,
}

impl NewStampCard {
    /// An empty, active card for `customer_id` in `program_id`.
    #[must_use]
    pub fn empty(customer_id: Uuid, program_id: Uuid) -> Self {
        Self { customer_id, program_id, current_stamps: 0, total_stamps_earned: 0, status: "active" }
    }
}

/// One granted stamp from the customer's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampEntry {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub added_by_email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Arguments of the `add_stamp_to_customer` stored procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddStampRequest {
    pub p_customer_id: Uuid,
    pub p_restaurant_auth_id: Uuid,
    pub p_notes: Option<String>,
}

/// Result object of the `add_stamp_to_customer` stored procedure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddStampOutcome {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reward_issued: bool,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub reward_value: Option<String>,
}

#[cfg(test)]
#[path = "models_test.rs"]
mod tests;
