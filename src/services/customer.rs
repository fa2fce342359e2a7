//! Customer dashboard: profile, coupons, stamp cards and stamp history.
//!
//! Only the profile read is required. The other reads degrade to empty
//! lists with a warning so one failing table does not blank the screen.

use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{DashboardError, or_log, qr};
use crate::backend::models::{Coupon, Customer, StampCard, StampEntry};
use crate::router::SessionRouter;
use crate::state::AppState;

pub const STAMP_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerDashboard {
    pub customer: Customer,
    /// Unredeemed and unexpired, newest first.
    pub active_coupons: Vec<Coupon>,
    pub used_coupons: Vec<Coupon>,
    pub stamp_cards: Vec<StampCard>,
    pub stamp_history: Vec<StampEntry>,
}

impl CustomerDashboard {
    /// QR image the customer shows at the counter to collect a stamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the image URL cannot be built.
    pub fn stamp_qr_url(&self) -> Result<String, qr::QrError> {
        qr::customer_qr_url(self.customer.id, &self.customer.name)
    }
}

/// Split coupons into active (unredeemed, not yet expired) and used.
/// Expired unredeemed coupons are in neither list.
#[must_use]
pub fn split_coupons(coupons: Vec<Coupon>, now: OffsetDateTime) -> (Vec<Coupon>, Vec<Coupon>) {
    let mut active = Vec::new();
    let mut used = Vec::new();
    for coupon in coupons {
        if coupon.is_redeemed {
            used.push(coupon);
        } else if coupon.expires_at > now {
            active.push(coupon);
        }
    }
    (active, used)
}

/// Load the signed-in customer's dashboard.
///
/// # Errors
///
/// `NotSignedIn` without a session (the router is sent to login),
/// `ProfileMissing` when the principal has no customer row.
pub async fn load(state: &AppState, router: &mut SessionRouter) -> Result<CustomerDashboard, DashboardError> {
    let Some(session) = state.auth.current_session().await? else {
        debug!("customer dashboard without session");
        router.on_logout().await;
        return Err(DashboardError::NotSignedIn);
    };
    let principal = session.principal();

    let Some(customer) = state.store.customer_for_principal(principal).await? else {
        warn!(%principal, "customer profile missing");
        return Err(DashboardError::ProfileMissing);
    };

    let coupons = or_log(state.store.customer_coupons(customer.id).await, "coupon load", Vec::new());
    let (active_coupons, used_coupons) = split_coupons(coupons, OffsetDateTime::now_utc());
    let stamp_cards = or_log(state.store.active_stamp_cards(customer.id).await, "stamp card load", Vec::new());
    let stamp_history = or_log(
        state.store.stamp_history(customer.id, STAMP_HISTORY_LIMIT).await,
        "stamp history load",
        Vec::new(),
    );

    Ok(CustomerDashboard { customer, active_coupons, used_coupons, stamp_cards, stamp_history })
}

/// Sign out and return to the login screen.
pub async fn log_out(state: &AppState, router: &mut SessionRouter) {
    if let Err(e) = state.auth.sign_out().await {
        warn!(error = %e, "sign-out failed");
    }
    router.on_logout().await;
}

#[cfg(test)]
#[path = "customer_test.rs"]
mod tests;
