//! Restaurant dashboard: customers, statistics, stamp granting and coupon
//! validation.
//!
//! DESIGN
//! ======
//! Stamp counting and reward issuance happen in the backend procedure
//! behind `LoyaltyStore::add_stamp`; this module only looks up the
//! customer, forwards the request and reports the outcome. Coupon checks
//! and redemption are scoped to the signed-in restaurant. Redemption only
//! updates a coupon that is still unredeemed, so two terminals racing on
//! the same code cannot both succeed.
//!
//! ERROR HANDLING
//! ==============
//! A session without a restaurant row is signed out and sent back to
//! restaurant login. Statistics and per-customer stamp counts degrade to
//! zero with a warning.

use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{DashboardError, codes, or_log, qr};
use crate::backend::BackendError;
use crate::backend::models::{AddStampRequest, CouponDetails, Customer, Restaurant};
use crate::router::SessionRouter;
use crate::state::AppState;

// =============================================================================
// DASHBOARD
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerWithStamps {
    pub customer: Customer,
    /// Stamps this restaurant has granted the customer.
    pub stamp_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestaurantStats {
    pub total_customers: u64,
    pub total_stamps: u64,
    pub total_coupons: u64,
    pub redeemed_coupons: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantDashboard {
    pub restaurant: Restaurant,
    /// Newest customers first.
    pub customers: Vec<CustomerWithStamps>,
    pub stats: RestaurantStats,
}

impl RestaurantDashboard {
    /// Link new customers follow to join this restaurant.
    #[must_use]
    pub fn signup_url(&self, public_url: &str) -> String {
        qr::restaurant_signup_url(public_url, &self.restaurant.slug)
    }

    /// QR image encoding the signup link.
    ///
    /// # Errors
    ///
    /// Returns an error if the image URL cannot be built.
    pub fn qr_image_url(&self, public_url: &str) -> Result<String, qr::QrError> {
        qr::restaurant_qr_url(public_url, &self.restaurant.slug)
    }

    /// Download the signup QR image into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the download or the file write fails.
    pub async fn download_qr(&self, state: &AppState, dir: &Path) -> Result<PathBuf, qr::QrError> {
        let image_url = self.qr_image_url(&state.config.public_url)?;
        qr::download_restaurant_qr(&state.http, &image_url, &self.restaurant.name, dir).await
    }
}

/// Load the signed-in restaurant's dashboard.
///
/// # Errors
///
/// `NotSignedIn` without a session, `ProfileMissing` when the principal
/// owns no restaurant (the session is ended), or a backend error when the
/// customer list cannot be read.
pub async fn load(state: &AppState, router: &mut SessionRouter) -> Result<RestaurantDashboard, DashboardError> {
    let Some(session) = state.auth.current_session().await? else {
        router.on_restaurant_logout().await;
        return Err(DashboardError::NotSignedIn);
    };
    let principal = session.principal();

    let restaurant = match state.store.restaurant_for_principal(principal).await {
        Ok(Some(restaurant)) => restaurant,
        Ok(None) => {
            warn!(%principal, "no restaurant for session; signing out");
            log_out(state, router).await;
            return Err(DashboardError::ProfileMissing);
        }
        Err(e) => {
            warn!(%principal, error = %e, "restaurant load failed; signing out");
            log_out(state, router).await;
            return Err(DashboardError::ProfileMissing);
        }
    };

    let rows = state.store.restaurant_customers(restaurant.id).await?;
    let mut customers = Vec::with_capacity(rows.len());
    for customer in rows {
        let stamp_count = or_log(
            state.store.count_stamps(restaurant.id, Some(customer.id)).await,
            "customer stamp count",
            0,
        );
        customers.push(CustomerWithStamps { customer, stamp_count });
    }

    let stats = RestaurantStats {
        total_customers: customers.len() as u64,
        total_stamps: or_log(state.store.count_stamps(restaurant.id, None).await, "stamp count", 0),
        total_coupons: or_log(state.store.count_coupons(restaurant.id, false).await, "coupon count", 0),
        redeemed_coupons: or_log(state.store.count_coupons(restaurant.id, true).await, "redeemed count", 0),
    };

    Ok(RestaurantDashboard { restaurant, customers, stats })
}

/// Sign out and return to restaurant login.
pub async fn log_out(state: &AppState, router: &mut SessionRouter) {
    if let Err(e) = state.auth.sign_out().await {
        warn!(error = %e, "sign-out failed");
    }
    router.on_restaurant_logout().await;
}

// =============================================================================
// CUSTOMER LOOKUP
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("enter a 6-digit code or the scanned QR data")]
    InvalidInput,
    #[error("invalid QR code")]
    InvalidQr,
    #[error("no customer with this code at your restaurant")]
    UnknownCode,
    #[error("customer not found")]
    NotFound,
    #[error("customer lookup failed: {0}")]
    Backend(#[from] BackendError),
}

/// What staff typed or scanned to identify a customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StampInput {
    RedemptionCode(String),
    Scanned(Uuid),
}

impl StampInput {
    /// Parse a 6-digit redemption code or a stamp QR payload.
    ///
    /// # Errors
    ///
    /// `InvalidQr` for JSON that is not a stamp payload, `InvalidInput`
    /// for anything else.
    pub fn parse(input: &str) -> Result<Self, LookupError> {
        let input = input.trim();
        if codes::is_redemption_code(input) {
            return Ok(Self::RedemptionCode(input.to_string()));
        }
        let value: serde_json::Value = serde_json::from_str(input).map_err(|_| LookupError::InvalidInput)?;
        if value.get("type").and_then(serde_json::Value::as_str) != Some(qr::STAMP_PAYLOAD_TYPE) {
            return Err(LookupError::InvalidQr);
        }
        value
            .get("customerId")
            .and_then(serde_json::Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
            .map(Self::Scanned)
            .ok_or(LookupError::InvalidQr)
    }
}

/// Resolve staff input to a customer and their stamp count here.
///
/// # Errors
///
/// See `LookupError`.
pub async fn find_customer(
    state: &AppState,
    restaurant_id: Uuid,
    input: &str,
) -> Result<CustomerWithStamps, LookupError> {
    let customer = match StampInput::parse(input)? {
        StampInput::RedemptionCode(code) => state
            .store
            .customer_by_redemption_code(restaurant_id, &code)
            .await?
            .ok_or(LookupError::UnknownCode)?,
        StampInput::Scanned(id) => state.store.customer_by_id(id).await?.ok_or(LookupError::NotFound)?,
    };
    let stamp_count = or_log(
        state.store.count_stamps(restaurant_id, Some(customer.id)).await,
        "customer stamp count",
        0,
    );
    Ok(CustomerWithStamps { customer, stamp_count })
}

// =============================================================================
// STAMPS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StampError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("{0}")]
    Rejected(String),
    #[error("stamp could not be added: {0}")]
    Backend(#[from] BackendError),
}

/// Coupon issued when a stamp completed a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reward {
    pub coupon_code: String,
    pub reward_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampResult {
    pub message: String,
    pub reward: Option<Reward>,
}

/// Grant one stamp to `customer_id` on behalf of the signed-in staff.
///
/// # Errors
///
/// `Rejected` carries the backend's reason when it refuses the stamp.
pub async fn add_stamp(state: &AppState, customer_id: Uuid, notes: Option<&str>) -> Result<StampResult, StampError> {
    let Some(session) = state.auth.current_session().await? else {
        return Err(StampError::NotSignedIn);
    };
    let request = AddStampRequest {
        p_customer_id: customer_id,
        p_restaurant_auth_id: session.principal(),
        p_notes: notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
    };
    let outcome = state.store.add_stamp(&request).await?;
    if !outcome.success {
        let reason = outcome.error.unwrap_or_else(|| "stamp could not be added".to_string());
        warn!(%customer_id, %reason, "stamp rejected");
        return Err(StampError::Rejected(reason));
    }

    let reward = outcome.reward_issued.then(|| Reward {
        coupon_code: outcome.coupon_code.clone().unwrap_or_default(),
        reward_value: outcome.reward_value.clone().unwrap_or_default(),
    });
    info!(%customer_id, reward = reward.is_some(), "stamp added");
    Ok(StampResult { message: outcome.message.unwrap_or_else(|| "Stamp added".to_string()), reward })
}

// =============================================================================
// COUPONS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    #[error("coupon not found or not issued by your restaurant")]
    NotFound,
    #[error("this coupon has expired")]
    Expired,
    #[error("this coupon was already redeemed{}", redeemed_on(.at))]
    AlreadyRedeemed { at: Option<OffsetDateTime> },
    #[error("coupon check failed: {0}")]
    Backend(#[from] BackendError),
}

fn redeemed_on(at: &Option<OffsetDateTime>) -> String {
    at.map(|at| format!(" on {}", at.date())).unwrap_or_default()
}

/// Check a coupon code against this restaurant. Expiry is checked before
/// redemption.
///
/// # Errors
///
/// See `CouponError`.
pub async fn validate_coupon(state: &AppState, restaurant_id: Uuid, code: &str) -> Result<CouponDetails, CouponError> {
    let code = code.trim().to_uppercase();
    let coupon = state
        .store
        .coupon_for_restaurant(restaurant_id, &code)
        .await?
        .ok_or(CouponError::NotFound)?;
    if coupon.expires_at < OffsetDateTime::now_utc() {
        return Err(CouponError::Expired);
    }
    if coupon.is_redeemed {
        return Err(CouponError::AlreadyRedeemed { at: coupon.redeemed_at });
    }
    Ok(coupon)
}

/// Mark a validated coupon as redeemed now.
///
/// # Errors
///
/// `AlreadyRedeemed` if the coupon was redeemed since it was validated,
/// or the backend error if the update fails.
pub async fn redeem_coupon(state: &AppState, restaurant_id: Uuid, coupon: &CouponDetails) -> Result<(), CouponError> {
    if !state.store.redeem_coupon(restaurant_id, &coupon.code, OffsetDateTime::now_utc()).await? {
        warn!(code = %coupon.code, "coupon already redeemed elsewhere");
        return Err(CouponError::AlreadyRedeemed { at: None });
    }
    info!(code = %coupon.code, "coupon redeemed");
    Ok(())
}

#[cfg(test)]
#[path = "restaurant_test.rs"]
mod tests;
