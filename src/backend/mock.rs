//! In-memory backend double for router and service tests.
//!
//! Tables live behind a `std::sync::Mutex` that is never held across an
//! await. Knobs on `MockState` inject latency, failures and panics into the
//! principal lookups and the session read.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::models::{
    AddStampOutcome, AddStampRequest, Coupon, CouponDetails, CouponHolder, Customer, CustomerRef, NewCoupon,
    NewCustomer, NewRestaurant, NewStampCard, Restaurant, RestaurantRef, StampCard, StampEntry, StampProgram,
    StampProgramRef,
};
use super::types::{AuthChange, AuthUser, BackendError, ProfileAttrs, Session};
use super::{AccountDirectory, AuthProvider, LoyaltyStore};

pub struct MockAccount {
    pub email: String,
    pub password: String,
    pub user: AuthUser,
}

pub struct MockCoupon {
    pub coupon: Coupon,
    pub customer_id: Uuid,
    pub restaurant_id: Uuid,
}

pub struct MockProgram {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub program: StampProgram,
}

pub struct MockStamp {
    pub entry: StampEntry,
    pub customer_id: Uuid,
    pub restaurant_id: Uuid,
}

pub struct MockCard {
    pub card: NewStampCard,
    pub id: Uuid,
}

#[derive(Default)]
pub struct MockState {
    pub session: Option<Session>,
    pub accounts: Vec<MockAccount>,
    /// `(auth principal, row)`
    pub restaurants: Vec<(Uuid, Restaurant)>,
    /// `(auth principal, row)`
    pub customers: Vec<(Uuid, Customer)>,
    pub coupons: Vec<MockCoupon>,
    pub programs: Vec<MockProgram>,
    pub cards: Vec<MockCard>,
    pub stamps: Vec<MockStamp>,

    /// Every trait call in order, by short name.
    pub calls: Vec<String>,
    pub lookup_delay: Option<Duration>,
    pub fail_lookups: bool,
    pub panic_lookups: bool,
    pub session_delay: Option<Duration>,
    pub fail_session: bool,
    pub fail_sign_out: bool,
    /// Signups succeed without issuing a session.
    pub confirm_signups: bool,
    /// Tables whose inserts are rejected.
    pub fail_inserts: HashSet<&'static str>,
    /// Fixed result for `add_stamp` instead of the built-in bookkeeping.
    pub stamp_outcome: Option<AddStampOutcome>,
}

pub struct MockBackend {
    state: Mutex<MockState>,
    events: broadcast::Sender<AuthChange>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self { state: Mutex::new(MockState::default()), events }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == name).count()
    }

    pub fn emit(&self, change: AuthChange) {
        let _ = self.events.send(change);
    }

    /// Install a session for `principal` without notifying subscribers.
    pub fn sign_in_silently(&self, principal: Uuid) -> Session {
        let session = session_for(principal, None);
        self.state().session = Some(session.clone());
        session
    }

    pub fn add_account(&self, email: &str, password: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state().accounts.push(MockAccount {
            email: email.into(),
            password: password.into(),
            user: AuthUser { id, email: Some(email.into()), user_metadata: serde_json::Value::Null },
        });
        id
    }

    pub fn add_restaurant(&self, principal: Uuid, name: &str, slug: &str) -> Restaurant {
        let restaurant = Restaurant {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: slug.into(),
            location: Some("Berlin".into()),
            owner_name: None,
            email: None,
            phone: None,
        };
        self.state().restaurants.push((principal, restaurant.clone()));
        restaurant
    }

    pub fn add_customer(&self, principal: Uuid, restaurant_id: Uuid, name: &str, code: &str) -> Customer {
        let customer = Customer {
            id: Uuid::new_v4(),
            name: name.into(),
            email: None,
            phone: None,
            restaurant_id: Some(restaurant_id),
            redemption_code: Some(code.into()),
            created_at: Some(OffsetDateTime::now_utc()),
        };
        self.state().customers.push((principal, customer.clone()));
        customer
    }

    pub fn add_program(&self, restaurant_id: Uuid, stamps_required: u32) -> Uuid {
        let id = Uuid::new_v4();
        self.state().programs.push(MockProgram {
            id,
            restaurant_id,
            program: StampProgram {
                name: "Coffee card".into(),
                description: None,
                stamps_required,
                reward_value: Some("1 free coffee".into()),
            },
        });
        id
    }

    pub fn add_coupon(&self, customer_id: Uuid, restaurant_id: Uuid, code: &str, expires_at: OffsetDateTime) {
        self.state().coupons.push(MockCoupon {
            coupon: Coupon {
                id: Uuid::new_v4(),
                code: code.into(),
                discount_type: super::models::DiscountType::Percentage,
                discount_value: 15.0,
                expires_at,
                is_redeemed: false,
                redeemed_at: None,
            },
            customer_id,
            restaurant_id,
        });
    }

    fn record(&self, call: &str) {
        self.state().calls.push(call.to_string());
    }

    async fn lookup_gate(&self, call: &str) -> Result<(), BackendError> {
        let (delay, fail, panic) = {
            let mut state = self.state();
            state.calls.push(call.to_string());
            (state.lookup_delay, state.fail_lookups, state.panic_lookups)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        assert!(!panic, "injected lookup panic");
        if fail {
            return Err(BackendError::Request("injected lookup failure".into()));
        }
        Ok(())
    }

    fn insert_gate(&self, table: &'static str) -> Result<(), BackendError> {
        let mut state = self.state();
        state.calls.push(format!("insert_{table}"));
        if state.fail_inserts.contains(table) {
            return Err(BackendError::Status { status: 409, message: format!("insert into {table} rejected") });
        }
        Ok(())
    }
}

fn session_for(principal: Uuid, email: Option<String>) -> Session {
    Session {
        access_token: format!("access-{principal}"),
        refresh_token: format!("refresh-{principal}"),
        expires_at: OffsetDateTime::now_utc().unix_timestamp() + 3600,
        user: AuthUser { id: principal, email, user_metadata: serde_json::Value::Null },
    }
}

// =============================================================================
// AUTH
// =============================================================================

#[async_trait::async_trait]
impl AuthProvider for MockBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let (delay, fail) = {
            let mut state = self.state();
            state.calls.push("current_session".into());
            (state.session_delay, state.fail_session)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(BackendError::Request("injected session failure".into()));
        }
        Ok(self.state().session.clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let session = {
            let mut state = self.state();
            state.calls.push("sign_in".into());
            let Some(account) = state.accounts.iter().find(|a| a.email == email && a.password == password) else {
                return Err(BackendError::Status { status: 400, message: "Invalid login credentials".into() });
            };
            let session = session_for(account.user.id, account.user.email.clone());
            state.session = Some(session.clone());
            session
        };
        self.emit(AuthChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, profile: &ProfileAttrs) -> Result<Session, BackendError> {
        let session = {
            let mut state = self.state();
            state.calls.push("sign_up".into());
            if state.accounts.iter().any(|a| a.email == email) {
                return Err(BackendError::Status { status: 422, message: "User already registered".into() });
            }
            let id = Uuid::new_v4();
            let metadata = serde_json::to_value(profile).unwrap_or_default();
            state.accounts.push(MockAccount {
                email: email.into(),
                password: password.into(),
                user: AuthUser { id, email: Some(email.into()), user_metadata: metadata },
            });
            if state.confirm_signups {
                return Err(BackendError::ConfirmationPending);
            }
            let session = session_for(id, Some(email.into()));
            state.session = Some(session.clone());
            session
        };
        self.emit(AuthChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let had_session = {
            let mut state = self.state();
            state.calls.push("sign_out".into());
            if state.fail_sign_out {
                return Err(BackendError::Request("injected sign-out failure".into()));
            }
            state.session.take().is_some()
        };
        if had_session {
            self.emit(AuthChange::signed_out());
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}

// =============================================================================
// DIRECTORY
// =============================================================================

#[async_trait::async_trait]
impl AccountDirectory for MockBackend {
    async fn find_restaurant_by_principal(&self, principal: Uuid) -> Result<Option<RestaurantRef>, BackendError> {
        self.lookup_gate("find_restaurant").await?;
        Ok(self
            .state()
            .restaurants
            .iter()
            .find(|(p, _)| *p == principal)
            .map(|(_, r)| RestaurantRef { id: r.id }))
    }

    async fn find_customer_by_principal(&self, principal: Uuid) -> Result<Option<CustomerRef>, BackendError> {
        self.lookup_gate("find_customer").await?;
        Ok(self
            .state()
            .customers
            .iter()
            .find(|(p, _)| *p == principal)
            .map(|(_, c)| CustomerRef { id: c.id }))
    }
}

// =============================================================================
// STORE
// =============================================================================

#[async_trait::async_trait]
impl LoyaltyStore for MockBackend {
    async fn active_restaurants(&self) -> Result<Vec<Restaurant>, BackendError> {
        self.record("active_restaurants");
        let mut rows: Vec<Restaurant> = self.state().restaurants.iter().map(|(_, r)| r.clone()).collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn restaurant_for_principal(&self, principal: Uuid) -> Result<Option<Restaurant>, BackendError> {
        self.record("restaurant_for_principal");
        Ok(self
            .state()
            .restaurants
            .iter()
            .find(|(p, _)| *p == principal)
            .map(|(_, r)| r.clone()))
    }

    async fn insert_restaurant(&self, new: &NewRestaurant) -> Result<Restaurant, BackendError> {
        self.insert_gate("restaurants")?;
        let restaurant = Restaurant {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            slug: new.slug.clone(),
            location: Some(new.location.clone()),
            owner_name: Some(new.owner_name.clone()),
            email: Some(new.email.clone()),
            phone: Some(new.phone.clone()),
        };
        self.state().restaurants.push((new.auth_id, restaurant.clone()));
        Ok(restaurant)
    }

    async fn insert_customer(&self, new: &NewCustomer) -> Result<Customer, BackendError> {
        self.insert_gate("customers")?;
        let customer = Customer {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            email: Some(new.email.clone()),
            phone: Some(new.phone.clone()),
            restaurant_id: Some(new.restaurant_id),
            redemption_code: Some(new.redemption_code.clone()),
            created_at: Some(OffsetDateTime::now_utc()),
        };
        self.state().customers.push((new.user_id, customer.clone()));
        Ok(customer)
    }

    async fn customer_for_principal(&self, principal: Uuid) -> Result<Option<Customer>, BackendError> {
        self.record("customer_for_principal");
        Ok(self
            .state()
            .customers
            .iter()
            .find(|(p, _)| *p == principal)
            .map(|(_, c)| c.clone()))
    }

    async fn customer_by_id(&self, id: Uuid) -> Result<Option<Customer>, BackendError> {
        self.record("customer_by_id");
        Ok(self
            .state()
            .customers
            .iter()
            .find(|(_, c)| c.id == id)
            .map(|(_, c)| c.clone()))
    }

    async fn customer_by_redemption_code(
        &self,
        restaurant_id: Uuid,
        code: &str,
    ) -> Result<Option<Customer>, BackendError> {
        self.record("customer_by_redemption_code");
        Ok(self
            .state()
            .customers
            .iter()
            .find(|(_, c)| c.restaurant_id == Some(restaurant_id) && c.redemption_code.as_deref() == Some(code))
            .map(|(_, c)| c.clone()))
    }

    async fn restaurant_customers(&self, restaurant_id: Uuid) -> Result<Vec<Customer>, BackendError> {
        self.record("restaurant_customers");
        Ok(self
            .state()
            .customers
            .iter()
            .rev()
            .filter(|(_, c)| c.restaurant_id == Some(restaurant_id))
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn insert_coupon(&self, new: &NewCoupon) -> Result<(), BackendError> {
        self.insert_gate("coupons")?;
        self.state().coupons.push(MockCoupon {
            coupon: Coupon {
                id: Uuid::new_v4(),
                code: new.code.clone(),
                discount_type: new.discount_type,
                discount_value: new.discount_value,
                expires_at: new.expires_at,
                is_redeemed: false,
                redeemed_at: None,
            },
            customer_id: new.customer_id,
            restaurant_id: new.restaurant_id,
        });
        Ok(())
    }

    async fn customer_coupons(&self, customer_id: Uuid) -> Result<Vec<Coupon>, BackendError> {
        self.record("customer_coupons");
        Ok(self
            .state()
            .coupons
            .iter()
            .rev()
            .filter(|c| c.customer_id == customer_id)
            .map(|c| c.coupon.clone())
            .collect())
    }

    async fn coupon_for_restaurant(
        &self,
        restaurant_id: Uuid,
        code: &str,
    ) -> Result<Option<CouponDetails>, BackendError> {
        self.record("coupon_for_restaurant");
        let state = self.state();
        let Some(stored) = state
            .coupons
            .iter()
            .find(|c| c.restaurant_id == restaurant_id && c.coupon.code == code)
        else {
            return Ok(None);
        };
        let customer = state
            .customers
            .iter()
            .find(|(_, c)| c.id == stored.customer_id)
            .map(|(_, c)| CouponHolder { name: c.name.clone(), email: c.email.clone() });
        let coupon = &stored.coupon;
        Ok(Some(CouponDetails {
            code: coupon.code.clone(),
            discount_type: coupon.discount_type,
            discount_value: coupon.discount_value,
            expires_at: coupon.expires_at,
            is_redeemed: coupon.is_redeemed,
            redeemed_at: coupon.redeemed_at,
            customer,
        }))
    }

    async fn redeem_coupon(&self, restaurant_id: Uuid, code: &str, at: OffsetDateTime) -> Result<bool, BackendError> {
        self.record("redeem_coupon");
        let mut updated = false;
        for stored in self
            .state()
            .coupons
            .iter_mut()
            .filter(|c| c.restaurant_id == restaurant_id && c.coupon.code == code && !c.coupon.is_redeemed)
        {
            stored.coupon.is_redeemed = true;
            stored.coupon.redeemed_at = Some(at);
            updated = true;
        }
        Ok(updated)
    }

    async fn count_coupons(&self, restaurant_id: Uuid, redeemed_only: bool) -> Result<u64, BackendError> {
        self.record("count_coupons");
        let count = self
            .state()
            .coupons
            .iter()
            .filter(|c| c.restaurant_id == restaurant_id && (!redeemed_only || c.coupon.is_redeemed))
            .count();
        Ok(count as u64)
    }

    async fn active_stamp_program(&self, restaurant_id: Uuid) -> Result<Option<StampProgramRef>, BackendError> {
        self.record("active_stamp_program");
        Ok(self
            .state()
            .programs
            .iter()
            .find(|p| p.restaurant_id == restaurant_id)
            .map(|p| StampProgramRef { id: p.id }))
    }

    async fn insert_stamp_card(&self, new: &NewStampCard) -> Result<(), BackendError> {
        self.insert_gate("stamp_cards")?;
        self.state().cards.push(MockCard { card: new.clone(), id: Uuid::new_v4() });
        Ok(())
    }

    async fn active_stamp_cards(&self, customer_id: Uuid) -> Result<Vec<StampCard>, BackendError> {
        self.record("active_stamp_cards");
        let state = self.state();
        Ok(state
            .cards
            .iter()
            .filter(|c| c.card.customer_id == customer_id && c.card.status == "active")
            .map(|c| StampCard {
                id: c.id,
                current_stamps: c.card.current_stamps,
                total_stamps_earned: c.card.total_stamps_earned,
                status: c.card.status.to_string(),
                program: state
                    .programs
                    .iter()
                    .find(|p| p.id == c.card.program_id)
                    .map(|p| p.program.clone()),
            })
            .collect())
    }

    async fn stamp_history(&self, customer_id: Uuid, limit: usize) -> Result<Vec<StampEntry>, BackendError> {
        self.record("stamp_history");
        Ok(self
            .state()
            .stamps
            .iter()
            .rev()
            .filter(|s| s.customer_id == customer_id)
            .take(limit)
            .map(|s| s.entry.clone())
            .collect())
    }

    async fn count_stamps(&self, restaurant_id: Uuid, customer_id: Option<Uuid>) -> Result<u64, BackendError> {
        self.record("count_stamps");
        let count = self
            .state()
            .stamps
            .iter()
            .filter(|s| s.restaurant_id == restaurant_id && customer_id.is_none_or(|id| s.customer_id == id))
            .count();
        Ok(count as u64)
    }

    async fn add_stamp(&self, request: &AddStampRequest) -> Result<AddStampOutcome, BackendError> {
        let mut state = self.state();
        state.calls.push("add_stamp".into());
        if let Some(outcome) = state.stamp_outcome.clone() {
            return Ok(outcome);
        }

        let Some(restaurant_id) = state
            .restaurants
            .iter()
            .find(|(p, _)| *p == request.p_restaurant_auth_id)
            .map(|(_, r)| r.id)
        else {
            return Ok(AddStampOutcome { error: Some("Restaurant not found".into()), ..AddStampOutcome::default() });
        };
        state.stamps.push(MockStamp {
            entry: StampEntry {
                id: Uuid::new_v4(),
                created_at: OffsetDateTime::now_utc(),
                added_by_email: None,
                notes: request.p_notes.clone(),
            },
            customer_id: request.p_customer_id,
            restaurant_id,
        });
        Ok(AddStampOutcome { success: true, message: Some("Stamp added".into()), ..AddStampOutcome::default() })
    }
}
