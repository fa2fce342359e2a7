//! Password login for customers and restaurant staff.

use tracing::{info, warn};

use crate::backend::BackendError;
use crate::backend::models::Restaurant;
use crate::router::SessionRouter;
use crate::state::AppState;

const INVALID_CREDENTIALS_MARKER: &str = "Invalid login credentials";

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("no restaurant account found; please register first")]
    NoRestaurantAccount,
    #[error("login failed: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for LoginError {
    fn from(e: BackendError) -> Self {
        if e.server_message().is_some_and(|m| m.contains(INVALID_CREDENTIALS_MARKER)) {
            Self::InvalidCredentials
        } else {
            Self::Backend(e)
        }
    }
}

/// Sign a customer in and let the router pick the dashboard.
///
/// # Errors
///
/// Returns `InvalidCredentials` for a rejected password, otherwise the backend error.
pub async fn log_in_customer(
    state: &AppState,
    router: &mut SessionRouter,
    email: &str,
    password: &str,
) -> Result<(), LoginError> {
    let session = state.auth.sign_in_with_password(email, password).await?;
    info!(principal = %session.principal(), "customer login");
    router.on_login_success().await;
    Ok(())
}

/// Sign restaurant staff in. A principal without a restaurant row is
/// signed out again.
///
/// # Errors
///
/// Returns `NoRestaurantAccount` when the principal owns no restaurant.
pub async fn log_in_restaurant(
    state: &AppState,
    router: &mut SessionRouter,
    email: &str,
    password: &str,
) -> Result<Restaurant, LoginError> {
    let session = state.auth.sign_in_with_password(email, password).await?;
    let principal = session.principal();

    let restaurant = match state.store.restaurant_for_principal(principal).await {
        Ok(Some(restaurant)) => restaurant,
        Ok(None) => {
            warn!(%principal, "login without restaurant; signing out");
            sign_out_quietly(state).await;
            return Err(LoginError::NoRestaurantAccount);
        }
        Err(e) => {
            warn!(%principal, error = %e, "restaurant lookup failed; signing out");
            sign_out_quietly(state).await;
            return Err(LoginError::Backend(e));
        }
    };

    info!(%principal, restaurant_id = %restaurant.id, "restaurant login");
    router.on_restaurant_login_success().await;
    Ok(restaurant)
}

async fn sign_out_quietly(state: &AppState) {
    if let Err(e) = state.auth.sign_out().await {
        warn!(error = %e, "sign-out failed");
    }
}

#[cfg(test)]
#[path = "login_test.rs"]
mod tests;
