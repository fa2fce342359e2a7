//! Form and dashboard services.
//!
//! ARCHITECTURE
//! ============
//! Each service drives the backend seams in `AppState` and reports its
//! outcome to the session router through the action callbacks. Services
//! never set the view directly. User-facing failures come back as typed
//! errors for the shell to print.

pub mod codes;
pub mod customer;
pub mod login;
pub mod qr;
pub mod restaurant;
pub mod signup;

use crate::backend::BackendError;

/// Failures loading or acting on a dashboard.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("no profile found for this account; please sign out and register again")]
    ProfileMissing,
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Log a failed optional read and continue with the fallback.
pub(crate) fn or_log<T>(result: Result<T, BackendError>, what: &str, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "{what} failed; continuing without it");
            fallback
        }
    }
}
