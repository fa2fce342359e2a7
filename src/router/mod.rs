//! Session router: decides which screen is active from the session and the
//! principal's profile.
//!
//! ARCHITECTURE
//! ============
//! One owned `SessionRouter` per mount holds the view and the loading flag
//! in a `watch` channel. Initial resolution spawns the lookup chain and
//! races it against the watchdog; the winner commits once and the loser is
//! aborted. Auth notifications arrive on a broadcast subscription that the
//! owner drains, either through `next_auth_change` in its event loop or
//! implicitly before every commit made by an action callback.
//!
//! ORDERING
//! ========
//! Pending notifications are applied before an action commits its own
//! result, so a sign-out issued by the router is observed first and the
//! action's destination wins.
//!
//! TRADE-OFFS
//! ==========
//! Lookup failures are logged and routed as "not found". The watchdog
//! trades destination correctness for liveness: a slow backend lands on
//! signup rather than a stuck loading screen.

pub mod lookup;
pub mod view;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::backend::{AccountDirectory, AuthChange, AuthEvent, AuthProvider};
pub use lookup::AccountKind;
use lookup::Lookup;
pub use view::{CouponDisplay, Location, NavHint, View};

/// Observable router state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterState {
    pub view: View,
    pub loading: bool,
}

// =============================================================================
// GUARDS
// =============================================================================

/// Clears the loading flag when dropped, on every exit path.
struct LoadingGuard(Arc<watch::Sender<RouterState>>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|state| state.loading = false);
    }
}

/// Aborts the wrapped task when dropped, so a lost race leaves no effects.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Marks the router unmounted from outside its owner.
#[derive(Clone)]
pub struct Teardown(Arc<AtomicBool>);

impl Teardown {
    pub fn unmount(&self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// ROUTER
// =============================================================================

pub struct SessionRouter {
    lookup: Lookup,
    location: Location,
    watchdog: Duration,
    state: Arc<watch::Sender<RouterState>>,
    events: Option<broadcast::Receiver<AuthChange>>,
    alive: Arc<AtomicBool>,
}

impl SessionRouter {
    /// Mount a router: subscribe to auth notifications and start on the
    /// signup screen with loading set.
    #[must_use]
    pub fn mount(
        auth: Arc<dyn AuthProvider>,
        directory: Arc<dyn AccountDirectory>,
        location: Location,
        watchdog: Duration,
    ) -> Self {
        let events = auth.subscribe();
        let (state, _) = watch::channel(RouterState { view: View::Signup, loading: true });
        Self {
            lookup: Lookup::new(auth, directory),
            location,
            watchdog,
            state: Arc::new(state),
            events: Some(events),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    #[must_use]
    pub fn view(&self) -> View {
        self.state.borrow().view.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Receiver that observes every view and loading change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<RouterState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn teardown(&self) -> Teardown {
        Teardown(Arc::clone(&self.alive))
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.events.is_some()
    }

    /// Stop applying changes and drop the auth subscription.
    pub fn unmount(&mut self) {
        self.alive.store(false, Ordering::Release);
        self.events = None;
        debug!("router unmounted");
    }

    fn commit(&self, view: View) {
        if !self.is_mounted() {
            debug!(%view, "router unmounted; discarding view change");
            return;
        }
        info!(%view, "view changed");
        self.state.send_modify(|state| state.view = view);
    }

    // =========================================================================
    // INITIAL RESOLUTION
    // =========================================================================

    /// Resolve the first screen. Runs the lookup chain against the watchdog;
    /// a timeout or a panicked chain lands on signup. Loading is cleared on
    /// every path, including cancellation of this future.
    pub async fn resolve_initial(&mut self) {
        let _loading = LoadingGuard(Arc::clone(&self.state));
        info!(hint = ?self.location.view, "resolving initial view");

        let chain = AbortOnDrop(tokio::spawn(resolve_chain(self.lookup.clone(), self.location.view)));
        let view = match tokio::time::timeout(self.watchdog, chain).await {
            Ok(Ok(view)) => view,
            Ok(Err(e)) => {
                error!(error = %e, "initial resolution failed; defaulting to signup");
                View::Signup
            }
            Err(_) => {
                warn!(
                    watchdog_secs = self.watchdog.as_secs_f64(),
                    "initial resolution timed out; defaulting to signup"
                );
                View::Signup
            }
        };

        self.pump().await;
        self.commit(view);
    }

    // =========================================================================
    // AUTH NOTIFICATIONS
    // =========================================================================

    /// Wait for the next auth notification. `None` once unmounted or the
    /// provider is gone.
    pub async fn next_auth_change(&mut self) -> Option<AuthChange> {
        loop {
            if !self.is_mounted() {
                self.events = None;
                return None;
            }
            let events = self.events.as_mut()?;
            match events.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth notifications lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.events = None;
                    return None;
                }
            }
        }
    }

    /// Apply one auth notification. Signed-in re-runs the profile lookup;
    /// signed-out lands on the screen the location hint names.
    pub async fn handle_auth_change(&self, change: AuthChange) {
        if !self.is_mounted() {
            return;
        }
        match change.event {
            AuthEvent::SignedIn => {
                let Some(session) = change.session else {
                    return;
                };
                match self.lookup.classify(session.principal()).await {
                    AccountKind::Restaurant => self.commit(View::RestaurantDashboard),
                    AccountKind::Customer => self.commit(View::CustomerDashboard),
                    AccountKind::Unlinked => debug!("signed in without a profile yet; view unchanged"),
                }
            }
            AuthEvent::SignedOut => self.commit(self.location.signed_out_view()),
            AuthEvent::TokenRefreshed => debug!("token refreshed"),
        }
    }

    /// Apply every notification already queued.
    async fn pump(&mut self) {
        loop {
            let change = match self.events.as_mut().map(broadcast::Receiver::try_recv) {
                Some(Ok(change)) => change,
                Some(Err(broadcast::error::TryRecvError::Lagged(skipped))) => {
                    warn!(skipped, "auth notifications lagged");
                    continue;
                }
                Some(Err(broadcast::error::TryRecvError::Closed)) => {
                    self.events = None;
                    return;
                }
                Some(Err(broadcast::error::TryRecvError::Empty)) | None => return,
            };
            self.handle_auth_change(change).await;
        }
    }

    // =========================================================================
    // ACTION CALLBACKS
    // =========================================================================

    pub async fn on_signup_success(&mut self, coupon_code: &str, customer_name: &str) {
        self.pump().await;
        self.commit(View::Success(CouponDisplay::new(coupon_code, customer_name)));
    }

    /// Route by profile after a customer login. An unlinked principal is
    /// signed out and sent back to login.
    pub async fn on_login_success(&mut self) {
        self.pump().await;
        let Some(session) = self.lookup.session().await else {
            debug!("login reported without a session; view unchanged");
            return;
        };
        let view = match self.lookup.classify(session.principal()).await {
            AccountKind::Restaurant => View::RestaurantDashboard,
            AccountKind::Customer => View::CustomerDashboard,
            AccountKind::Unlinked => {
                warn!(principal = %session.principal(), "login without a profile; signing out");
                self.lookup.sign_out().await;
                self.pump().await;
                View::Login
            }
        };
        self.commit(view);
    }

    pub async fn on_restaurant_signup_success(&mut self) {
        self.confirm_restaurant(View::RestaurantSignup).await;
    }

    pub async fn on_restaurant_login_success(&mut self) {
        self.confirm_restaurant(View::RestaurantLogin).await;
    }

    async fn confirm_restaurant(&mut self, fallback: View) {
        self.pump().await;
        let Some(session) = self.lookup.session().await else {
            debug!("restaurant action reported without a session; view unchanged");
            return;
        };
        if self.lookup.has_restaurant(session.principal()).await {
            self.commit(View::RestaurantDashboard);
        } else {
            warn!(principal = %session.principal(), "no restaurant for session; signing out");
            self.lookup.sign_out().await;
            self.pump().await;
            self.commit(fallback);
        }
    }

    pub async fn on_logout(&mut self) {
        self.pump().await;
        self.commit(View::Login);
    }

    pub async fn on_restaurant_logout(&mut self) {
        self.pump().await;
        self.commit(View::RestaurantLogin);
    }

    pub fn show_login(&self) {
        self.commit(View::Login);
    }

    pub fn show_signup(&self) {
        self.commit(View::Signup);
    }

    pub fn show_restaurant_login(&self) {
        self.commit(View::RestaurantLogin);
    }

    pub fn show_restaurant_signup(&self) {
        self.commit(View::RestaurantSignup);
    }
}

/// The initial lookup chain. Runs as its own task so the watchdog can
/// abandon it.
async fn resolve_chain(lookup: Lookup, hint: Option<NavHint>) -> View {
    match hint {
        Some(NavHint::RestaurantSignup) => {
            if let Some(session) = lookup.session().await {
                if !lookup.has_restaurant(session.principal()).await {
                    info!(principal = %session.principal(), "session without restaurant on restaurant signup; signing out");
                    lookup.sign_out().await;
                }
            }
            View::RestaurantSignup
        }
        Some(NavHint::RestaurantLogin) => {
            let Some(session) = lookup.session().await else {
                return View::RestaurantLogin;
            };
            if lookup.has_restaurant(session.principal()).await {
                View::RestaurantDashboard
            } else {
                info!(principal = %session.principal(), "session without restaurant on restaurant login; signing out");
                lookup.sign_out().await;
                View::RestaurantLogin
            }
        }
        hint => {
            let Some(session) = lookup.session().await else {
                return if hint == Some(NavHint::Login) { View::Login } else { View::Signup };
            };
            match lookup.classify(session.principal()).await {
                AccountKind::Restaurant => View::RestaurantDashboard,
                AccountKind::Customer => View::CustomerDashboard,
                AccountKind::Unlinked => {
                    warn!(principal = %session.principal(), "authenticated principal has no profile; signing out");
                    lookup.sign_out().await;
                    View::Login
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
