//! Backend seams: auth provider, account directory and loyalty store.
//!
//! DESIGN
//! ======
//! The managed backend is reached through three async traits so the session
//! router and form services can run against the remote clients in `auth` and
//! `rest` or an in-memory double in tests. Stamp counting and reward
//! issuance stay server-side behind `LoyaltyStore::add_stamp`.

pub mod auth;
pub mod http;
pub mod models;
pub mod rest;
pub mod types;

#[cfg(test)]
pub mod mock;

use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use models::{
    AddStampOutcome, AddStampRequest, Coupon, CouponDetails, Customer, CustomerRef, NewCoupon, NewCustomer,
    NewRestaurant, NewStampCard, Restaurant, RestaurantRef, StampCard, StampEntry, StampProgramRef,
};
pub use types::{AuthChange, AuthEvent, AuthUser, BackendError, ProfileAttrs, Session};

/// Issues, refreshes and terminates sessions.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current session, refreshed if it is about to expire.
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn sign_up(&self, email: &str, password: &str, profile: &ProfileAttrs) -> Result<Session, BackendError>;

    /// Terminate the session. The local session is dropped even when the
    /// remote call fails.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Subscribe to auth-state notifications. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

/// Maps a principal to its zero-or-one restaurant and customer profile.
#[async_trait::async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_restaurant_by_principal(&self, principal: Uuid) -> Result<Option<RestaurantRef>, BackendError>;

    async fn find_customer_by_principal(&self, principal: Uuid) -> Result<Option<CustomerRef>, BackendError>;
}

/// Row-level reads and writes used by the forms and dashboards.
#[async_trait::async_trait]
pub trait LoyaltyStore: Send + Sync {
    /// Active restaurants ordered by name.
    async fn active_restaurants(&self) -> Result<Vec<Restaurant>, BackendError>;

    async fn restaurant_for_principal(&self, principal: Uuid) -> Result<Option<Restaurant>, BackendError>;

    async fn insert_restaurant(&self, new: &NewRestaurant) -> Result<Restaurant, BackendError>;

    async fn insert_customer(&self, new: &NewCustomer) -> Result<Customer, BackendError>;

    async fn customer_for_principal(&self, principal: Uuid) -> Result<Option<Customer>, BackendError>;

    async fn customer_by_id(&self, id: Uuid) -> Result<Option<Customer>, BackendError>;

    async fn customer_by_redemption_code(
        &self,
        restaurant_id: Uuid,
        code: &str,
    ) -> Result<Option<Customer>, BackendError>;

    async fn restaurant_customers(&self, restaurant_id: Uuid) -> Result<Vec<Customer>, BackendError>;

    async fn insert_coupon(&self, new: &NewCoupon) -> Result<(), BackendError>;

    /// Coupons of a customer, newest first.
    async fn customer_coupons(&self, customer_id: Uuid) -> Result<Vec<Coupon>, BackendError>;

    async fn coupon_for_restaurant(&self, restaurant_id: Uuid, code: &str)
    -> Result<Option<CouponDetails>, BackendError>;

    /// Mark an unredeemed coupon of this restaurant as redeemed. `false`
    /// when no such coupon was left to update.
    async fn redeem_coupon(&self, restaurant_id: Uuid, code: &str, at: OffsetDateTime) -> Result<bool, BackendError>;

    async fn count_coupons(&self, restaurant_id: Uuid, redeemed_only: bool) -> Result<u64, BackendError>;

    async fn active_stamp_program(&self, restaurant_id: Uuid) -> Result<Option<StampProgramRef>, BackendError>;

    async fn insert_stamp_card(&self, new: &NewStampCard) -> Result<(), BackendError>;

    async fn active_stamp_cards(&self, customer_id: Uuid) -> Result<Vec<StampCard>, BackendError>;

    /// Most recent stamps of a customer, newest first.
    async fn stamp_history(&self, customer_id: Uuid, limit: usize) -> Result<Vec<StampEntry>, BackendError>;

    /// Stamps granted by a restaurant, optionally narrowed to one customer.
    async fn count_stamps(&self, restaurant_id: Uuid, customer_id: Option<Uuid>) -> Result<u64, BackendError>;

    /// Invoke the server-side procedure that grants a stamp and issues rewards.
    async fn add_stamp(&self, request: &AddStampRequest) -> Result<AddStampOutcome, BackendError>;
}
