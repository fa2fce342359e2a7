//! Customer and restaurant registration.
//!
//! DESIGN
//! ======
//! Registration is two writes against different services: the auth
//! identity, then the profile row. If the profile row cannot be written the
//! fresh session is terminated so no principal stays authenticated without a
//! profile. The welcome coupon and stamp card are extras: their failures are
//! logged and signup still succeeds.

use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::codes;
use crate::backend::models::{Customer, DiscountType, NewCoupon, NewCustomer, NewRestaurant, NewStampCard, Restaurant};
use crate::backend::{BackendError, ProfileAttrs};
use crate::router::SessionRouter;
use crate::state::AppState;

const EMAIL_TAKEN_MARKER: &str = "already registered";

#[derive(Debug, thiserror::Error)]
pub enum SignupError {
    #[error("this email is already registered; please log in instead")]
    EmailTaken,
    #[error("please confirm your email address, then log in")]
    ConfirmationPending,
    #[error("no restaurant available to join")]
    NoRestaurant,
    #[error("account could not be created: {0}")]
    ProfileCreation(BackendError),
    #[error("registration failed: {0}")]
    Auth(BackendError),
    #[error("restaurants could not be loaded: {0}")]
    Restaurants(BackendError),
}

impl From<BackendError> for SignupError {
    fn from(e: BackendError) -> Self {
        if matches!(e, BackendError::ConfirmationPending) {
            return Self::ConfirmationPending;
        }
        if e.server_message().is_some_and(|m| m.contains(EMAIL_TAKEN_MARKER)) {
            return Self::EmailTaken;
        }
        Self::Auth(e)
    }
}

// =============================================================================
// CUSTOMER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSignup {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub restaurant_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignupReceipt {
    pub customer: Customer,
    pub coupon_code: String,
    /// Whether an empty stamp card was opened.
    pub stamp_card: bool,
}

/// Active restaurants a customer can join, ordered by name.
///
/// # Errors
///
/// Returns an error if the listing fails.
pub async fn available_restaurants(state: &AppState) -> Result<Vec<Restaurant>, SignupError> {
    state.store.active_restaurants().await.map_err(SignupError::Restaurants)
}

/// The restaurant matching `slug`, otherwise the first one.
#[must_use]
pub fn preselect<'a>(restaurants: &'a [Restaurant], slug: Option<&str>) -> Option<&'a Restaurant> {
    slug.and_then(|s| restaurants.iter().find(|r| r.slug == s))
        .or_else(|| restaurants.first())
}

/// Register a customer, mint the welcome coupon and report to the router.
///
/// # Errors
///
/// Fails if the identity or the customer row cannot be created.
pub async fn sign_up_customer(
    state: &AppState,
    router: &mut SessionRouter,
    form: &CustomerSignup,
) -> Result<SignupReceipt, SignupError> {
    let profile = ProfileAttrs { name: form.name.clone(), phone: Some(form.phone.clone()).filter(|p| !p.is_empty()) };
    let session = state.auth.sign_up(&form.email, &form.password, &profile).await?;
    let principal = session.principal();
    info!(%principal, restaurant_id = %form.restaurant_id, "customer identity created");

    let new = NewCustomer {
        name: form.name.clone(),
        email: form.email.clone(),
        phone: form.phone.clone(),
        restaurant_id: form.restaurant_id,
        user_id: principal,
        redemption_code: codes::redemption_code(),
    };
    let customer = match state.store.insert_customer(&new).await {
        Ok(customer) => customer,
        Err(e) => {
            error!(%principal, error = %e, "customer insert failed; signing out");
            if let Err(e) = state.auth.sign_out().await {
                warn!(error = %e, "sign-out after failed signup failed");
            }
            return Err(SignupError::ProfileCreation(e));
        }
    };

    let coupon_code = codes::coupon_code();
    let coupon = NewCoupon {
        code: coupon_code.clone(),
        discount_type: DiscountType::Percentage,
        discount_value: state.config.coupon.discount_percent,
        expires_at: codes::expiry_after(OffsetDateTime::now_utc(), state.config.coupon.valid_days),
        customer_id: customer.id,
        restaurant_id: form.restaurant_id,
    };
    if let Err(e) = state.store.insert_coupon(&coupon).await {
        error!(customer_id = %customer.id, error = %e, "welcome coupon insert failed");
    }

    let stamp_card = open_stamp_card(state, customer.id, form.restaurant_id).await;

    info!(customer_id = %customer.id, stamp_card, "customer signup complete");
    router.on_signup_success(&coupon_code, &form.name).await;
    Ok(SignupReceipt { customer, coupon_code, stamp_card })
}

async fn open_stamp_card(state: &AppState, customer_id: Uuid, restaurant_id: Uuid) -> bool {
    let program = match state.store.active_stamp_program(restaurant_id).await {
        Ok(Some(program)) => program,
        Ok(None) => return false,
        Err(e) => {
            warn!(%restaurant_id, error = %e, "stamp program lookup failed; no card opened");
            return false;
        }
    };
    match state.store.insert_stamp_card(&NewStampCard::empty(customer_id, program.id)).await {
        Ok(()) => true,
        Err(e) => {
            warn!(%customer_id, error = %e, "stamp card insert failed");
            false
        }
    }
}

// =============================================================================
// RESTAURANT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestaurantSignup {
    pub name: String,
    pub location: String,
    pub owner_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

/// Register a restaurant owner and the restaurant row, then report to the router.
///
/// # Errors
///
/// Fails if the identity or the restaurant row cannot be created.
pub async fn sign_up_restaurant(
    state: &AppState,
    router: &mut SessionRouter,
    form: &RestaurantSignup,
) -> Result<Restaurant, SignupError> {
    let profile = ProfileAttrs { name: form.owner_name.clone(), phone: Some(form.phone.clone()).filter(|p| !p.is_empty()) };
    let session = state.auth.sign_up(&form.email, &form.password, &profile).await?;
    let principal = session.principal();

    let new = NewRestaurant {
        name: form.name.clone(),
        slug: codes::slugify(&form.name),
        location: form.location.clone(),
        owner_name: form.owner_name.clone(),
        email: form.email.clone(),
        phone: form.phone.clone(),
        auth_id: principal,
        is_active: true,
    };
    let restaurant = match state.store.insert_restaurant(&new).await {
        Ok(restaurant) => restaurant,
        Err(e) => {
            error!(%principal, error = %e, "restaurant insert failed; signing out");
            if let Err(e) = state.auth.sign_out().await {
                warn!(error = %e, "sign-out after failed signup failed");
            }
            return Err(SignupError::ProfileCreation(e));
        }
    };

    info!(restaurant_id = %restaurant.id, slug = %restaurant.slug, "restaurant signup complete");
    router.on_restaurant_signup_success().await;
    Ok(restaurant)
}

#[cfg(test)]
#[path = "signup_test.rs"]
mod tests;
