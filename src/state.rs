//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` bundles the backend seams, the shared HTTP client and the
//! config. Services take it by reference; the session router gets the auth
//! provider and directory out of it at mount time. Clone is cheap since all
//! inner fields are Arc-wrapped or Clone.

use std::sync::Arc;

use crate::backend::auth::RemoteAuth;
use crate::backend::http::http_client;
use crate::backend::rest::RemoteDirectory;
use crate::backend::{AccountDirectory, AuthProvider, BackendError, LoyaltyStore};
use crate::config::StampcardConfig;
use crate::router::{Location, SessionRouter};

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub directory: Arc<dyn AccountDirectory>,
    pub store: Arc<dyn LoyaltyStore>,
    /// Shared client, also used for QR image downloads.
    pub http: reqwest::Client,
    pub config: Arc<StampcardConfig>,
}

impl AppState {
    /// Wire the remote auth and data clients from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn remote(config: StampcardConfig) -> Result<Self, BackendError> {
        let http = http_client(config.timeouts)?;
        let auth = Arc::new(RemoteAuth::new(http.clone(), &config));
        let rest = Arc::new(RemoteDirectory::new(http.clone(), &config.backend_url, Arc::clone(&auth)));
        let directory: Arc<dyn AccountDirectory> = rest.clone();
        let store: Arc<dyn LoyaltyStore> = rest;
        Ok(Self { auth, directory, store, http, config: Arc::new(config) })
    }

    /// Mount a session router over this state's backend.
    #[must_use]
    pub fn mount_router(&self, location: Location) -> SessionRouter {
        SessionRouter::mount(Arc::clone(&self.auth), Arc::clone(&self.directory), location, self.config.watchdog)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
