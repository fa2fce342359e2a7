//! Session and profile lookups shared by initial resolution and the action
//! callbacks. Failures degrade to "absent" and are logged here, so callers
//! only ever see a routing decision.

use std::sync::Arc;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::backend::{AccountDirectory, AuthProvider, Session};

/// Which profile an authenticated principal is linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    Restaurant,
    Customer,
    /// Authenticated but linked to neither profile.
    Unlinked,
}

#[derive(Clone)]
pub(crate) struct Lookup {
    auth: Arc<dyn AuthProvider>,
    directory: Arc<dyn AccountDirectory>,
}

impl Lookup {
    pub(crate) fn new(auth: Arc<dyn AuthProvider>, directory: Arc<dyn AccountDirectory>) -> Self {
        Self { auth, directory }
    }

    pub(crate) async fn session(&self) -> Option<Session> {
        match self.auth.current_session().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "session read failed; treating as signed out");
                None
            }
        }
    }

    pub(crate) async fn has_restaurant(&self, principal: Uuid) -> bool {
        match self.directory.find_restaurant_by_principal(principal).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(%principal, error = %e, "restaurant lookup failed; treating as absent");
                false
            }
        }
    }

    pub(crate) async fn has_customer(&self, principal: Uuid) -> bool {
        match self.directory.find_customer_by_principal(principal).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(%principal, error = %e, "customer lookup failed; treating as absent");
                false
            }
        }
    }

    /// Restaurant is checked first and wins if both profiles exist.
    pub(crate) async fn classify(&self, principal: Uuid) -> AccountKind {
        let kind = if self.has_restaurant(principal).await {
            AccountKind::Restaurant
        } else if self.has_customer(principal).await {
            AccountKind::Customer
        } else {
            AccountKind::Unlinked
        };
        debug!(%principal, ?kind, "classified principal");
        kind
    }

    pub(crate) async fn sign_out(&self) {
        if let Err(e) = self.auth.sign_out().await {
            error!(error = %e, "forced sign-out failed");
        }
    }
}
