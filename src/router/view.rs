//! Screens, navigation hints and location parsing.

use std::fmt;

use tracing::warn;

use crate::services::codes::first_name;

/// Placeholder origin for resolving relative locations such as `/?view=login`.
const RELATIVE_BASE: &str = "http://localhost/";

/// Data carried from a completed customer signup into the success screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponDisplay {
    pub code: String,
    pub first_name: String,
}

impl CouponDisplay {
    #[must_use]
    pub fn new(code: &str, customer_name: &str) -> Self {
        Self { code: code.to_string(), first_name: first_name(customer_name) }
    }
}

/// The single active screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Signup,
    Login,
    Success(CouponDisplay),
    CustomerDashboard,
    RestaurantSignup,
    RestaurantLogin,
    RestaurantDashboard,
}

impl View {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Login => "login",
            Self::Success(_) => "success",
            Self::CustomerDashboard => "customer-dashboard",
            Self::RestaurantSignup => "restaurant-signup",
            Self::RestaurantLogin => "restaurant-login",
            Self::RestaurantDashboard => "restaurant-dashboard",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Recognized values of the `view` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavHint {
    Login,
    RestaurantSignup,
    RestaurantLogin,
}

impl NavHint {
    /// Parse a hint; unknown values give `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "login" => Some(Self::Login),
            "restaurant-signup" => Some(Self::RestaurantSignup),
            "restaurant-login" => Some(Self::RestaurantLogin),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::RestaurantSignup => "restaurant-signup",
            Self::RestaurantLogin => "restaurant-login",
        }
    }
}

/// What the router reads from the current location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub view: Option<NavHint>,
    /// Slug that preselects a restaurant in the customer signup form.
    pub restaurant: Option<String>,
}

impl Location {
    /// Parse an absolute URL or a relative path-and-query. The first
    /// occurrence of each parameter wins; unparsable input yields no hints.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let parsed = reqwest::Url::parse(input)
            .or_else(|_| reqwest::Url::parse(RELATIVE_BASE).and_then(|base| base.join(input)));
        let url = match parsed {
            Ok(url) => url,
            Err(e) => {
                warn!(input, error = %e, "unparsable location; ignoring hints");
                return Self::default();
            }
        };

        let mut view = None;
        let mut restaurant = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "view" if view.is_none() => view = Some(NavHint::parse(&value)),
                "restaurant" if restaurant.is_none() => restaurant = Some(value.into_owned()),
                _ => {}
            }
        }
        Self {
            view: view.flatten(),
            restaurant: restaurant.filter(|slug| !slug.is_empty()),
        }
    }

    #[must_use]
    pub fn with_hint(hint: Option<NavHint>) -> Self {
        Self { view: hint, restaurant: None }
    }

    /// Landing screen without a session: the login-type screen the hint
    /// names, otherwise customer signup.
    #[must_use]
    pub fn signed_out_view(&self) -> View {
        match self.view {
            Some(NavHint::RestaurantSignup) => View::RestaurantSignup,
            Some(NavHint::RestaurantLogin) => View::RestaurantLogin,
            Some(NavHint::Login) => View::Login,
            None => View::Signup,
        }
    }
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
