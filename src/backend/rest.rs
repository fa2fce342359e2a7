//! Data client for the managed backend's `/rest/v1` table API.
//!
//! DESIGN
//! ======
//! Requests carry the anon key as `apikey` and the signed-in user's access
//! token as bearer, so row-level policies on the backend see the caller.
//! Pure helpers (`parse_content_range_total`, `eq`) are kept free of I/O
//! for testability.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::auth::RemoteAuth;
use super::http::{read_body, send};
use super::models::{
    AddStampOutcome, AddStampRequest, Coupon, CouponDetails, Customer, CustomerRef, NewCoupon, NewCustomer,
    NewRestaurant, NewStampCard, Restaurant, RestaurantRef, StampCard, StampEntry, StampProgramRef,
};
use super::types::BackendError;
use super::{AccountDirectory, LoyaltyStore};

const COUPON_DETAILS_SELECT: &str =
    "code,discount_type,discount_value,expires_at,is_redeemed,redeemed_at,customer:customers(name,email)";
const STAMP_CARD_SELECT: &str =
    "id,current_stamps,total_stamps_earned,status,program:stamp_programs(name,description,stamps_required,reward_value)";

type Query = Vec<(&'static str, String)>;

// =============================================================================
// CLIENT
// =============================================================================

pub struct RemoteDirectory {
    http: reqwest::Client,
    rest_url: String,
    auth: Arc<RemoteAuth>,
}

impl RemoteDirectory {
    #[must_use]
    pub fn new(http: reqwest::Client, backend_url: &str, auth: Arc<RemoteAuth>) -> Self {
        Self { http, rest_url: format!("{backend_url}/rest/v1"), auth }
    }

    async fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self
            .auth
            .access_token()
            .await
            .unwrap_or_else(|| self.auth.anon_key().to_string());
        request.header("apikey", self.auth.anon_key()).bearer_auth(token)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>, BackendError> {
        let request = self.http.get(self.table_url(table)).query(query);
        let body = send(self.authorized(request).await).await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Parse(format!("{table}: {e}")))
    }

    /// Zero rows is `None`; more than one is an error.
    async fn maybe_single<T: DeserializeOwned>(
        &self,
        table: &'static str,
        query: &Query,
    ) -> Result<Option<T>, BackendError> {
        let mut rows: Vec<T> = self.select(table, query).await?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            count => Err(BackendError::Ambiguous { table, count }),
        }
    }

    async fn insert<B: Serialize + Sync>(&self, table: &str, row: &B) -> Result<(), BackendError> {
        let request = self
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(row);
        send(self.authorized(request).await).await.map(|_| ())
    }

    async fn insert_returning<B, T>(&self, table: &'static str, row: &B) -> Result<T, BackendError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let request = self
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(row);
        let body = send(self.authorized(request).await).await?;
        let rows: Vec<T> = serde_json::from_str(&body).map_err(|e| BackendError::Parse(format!("{table}: {e}")))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Parse(format!("{table}: insert returned no row")))
    }

    /// Update and return how many rows the filter matched.
    async fn update_counted(
        &self,
        table: &str,
        query: &Query,
        patch: &serde_json::Value,
    ) -> Result<usize, BackendError> {
        let request = self
            .http
            .patch(self.table_url(table))
            .query(query)
            .header("Prefer", "return=representation")
            .json(patch);
        let body = send(self.authorized(request).await).await?;
        let rows: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| BackendError::Parse(format!("{table}: {e}")))?;
        Ok(rows.len())
    }

    /// Exact row count via a HEAD request and the `Content-Range` header.
    async fn count(&self, table: &str, query: &Query) -> Result<u64, BackendError> {
        let request = self
            .http
            .head(self.table_url(table))
            .query(query)
            .header("Prefer", "count=exact");
        let response = self
            .authorized(request)
            .await
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        read_body(response).await?;

        let range = range.ok_or_else(|| BackendError::Parse(format!("{table}: missing content-range")))?;
        parse_content_range_total(&range)
            .ok_or_else(|| BackendError::Parse(format!("{table}: bad content-range {range:?}")))
    }

    async fn rpc<A: Serialize + Sync, T: DeserializeOwned>(&self, function: &str, args: &A) -> Result<T, BackendError> {
        let request = self
            .http
            .post(format!("{}/rpc/{function}", self.rest_url))
            .json(args);
        let body = send(self.authorized(request).await).await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Parse(format!("{function}: {e}")))
    }
}

/// Filter value for an equality match.
fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
pub(crate) fn parse_content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.trim().rsplit_once('/')?;
    total.parse().ok()
}

// =============================================================================
// TRAIT IMPLS
// =============================================================================

#[async_trait::async_trait]
impl AccountDirectory for RemoteDirectory {
    async fn find_restaurant_by_principal(&self, principal: Uuid) -> Result<Option<RestaurantRef>, BackendError> {
        debug!(%principal, "looking up restaurant");
        self.maybe_single("restaurants", &vec![("select", "id".into()), ("auth_id", eq(principal))])
            .await
    }

    async fn find_customer_by_principal(&self, principal: Uuid) -> Result<Option<CustomerRef>, BackendError> {
        debug!(%principal, "looking up customer");
        self.maybe_single("customers", &vec![("select", "id".into()), ("user_id", eq(principal))])
            .await
    }
}

#[async_trait::async_trait]
impl LoyaltyStore for RemoteDirectory {
    async fn active_restaurants(&self) -> Result<Vec<Restaurant>, BackendError> {
        let query = vec![
            ("select", "id,name,slug,location".into()),
            ("is_active", eq(true)),
            ("order", "name.asc".into()),
        ];
        self.select("restaurants", &query).await
    }

    async fn restaurant_for_principal(&self, principal: Uuid) -> Result<Option<Restaurant>, BackendError> {
        self.maybe_single("restaurants", &vec![("select", "*".into()), ("auth_id", eq(principal))])
            .await
    }

    async fn insert_restaurant(&self, new: &NewRestaurant) -> Result<Restaurant, BackendError> {
        self.insert_returning("restaurants", new).await
    }

    async fn insert_customer(&self, new: &NewCustomer) -> Result<Customer, BackendError> {
        self.insert_returning("customers", new).await
    }

    async fn customer_for_principal(&self, principal: Uuid) -> Result<Option<Customer>, BackendError> {
        self.maybe_single("customers", &vec![("select", "*".into()), ("user_id", eq(principal))])
            .await
    }

    async fn customer_by_id(&self, id: Uuid) -> Result<Option<Customer>, BackendError> {
        self.maybe_single("customers", &vec![("select", "*".into()), ("id", eq(id))])
            .await
    }

    async fn customer_by_redemption_code(
        &self,
        restaurant_id: Uuid,
        code: &str,
    ) -> Result<Option<Customer>, BackendError> {
        let query = vec![
            ("select", "*".into()),
            ("redemption_code", eq(code)),
            ("restaurant_id", eq(restaurant_id)),
        ];
        self.maybe_single("customers", &query).await
    }

    async fn restaurant_customers(&self, restaurant_id: Uuid) -> Result<Vec<Customer>, BackendError> {
        let query = vec![
            ("select", "*".into()),
            ("restaurant_id", eq(restaurant_id)),
            ("order", "created_at.desc".into()),
        ];
        self.select("customers", &query).await
    }

    async fn insert_coupon(&self, new: &NewCoupon) -> Result<(), BackendError> {
        self.insert("coupons", &[new]).await
    }

    async fn customer_coupons(&self, customer_id: Uuid) -> Result<Vec<Coupon>, BackendError> {
        let query = vec![
            ("select", "*".into()),
            ("customer_id", eq(customer_id)),
            ("order", "created_at.desc".into()),
        ];
        self.select("coupons", &query).await
    }

    async fn coupon_for_restaurant(
        &self,
        restaurant_id: Uuid,
        code: &str,
    ) -> Result<Option<CouponDetails>, BackendError> {
        let query = vec![
            ("select", COUPON_DETAILS_SELECT.into()),
            ("code", eq(code)),
            ("restaurant_id", eq(restaurant_id)),
        ];
        self.maybe_single("coupons", &query).await
    }

    async fn redeem_coupon(&self, restaurant_id: Uuid, code: &str, at: OffsetDateTime) -> Result<bool, BackendError> {
        let redeemed_at = at
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| BackendError::Parse(e.to_string()))?;
        let patch = serde_json::json!({ "is_redeemed": true, "redeemed_at": redeemed_at });
        let query = vec![
            ("select", "code".into()),
            ("code", eq(code)),
            ("restaurant_id", eq(restaurant_id)),
            ("is_redeemed", eq(false)),
        ];
        Ok(self.update_counted("coupons", &query, &patch).await? > 0)
    }

    async fn count_coupons(&self, restaurant_id: Uuid, redeemed_only: bool) -> Result<u64, BackendError> {
        let mut query = vec![("select", "id".into()), ("restaurant_id", eq(restaurant_id))];
        if redeemed_only {
            query.push(("is_redeemed", eq(true)));
        }
        self.count("coupons", &query).await
    }

    async fn active_stamp_program(&self, restaurant_id: Uuid) -> Result<Option<StampProgramRef>, BackendError> {
        let query = vec![
            ("select", "id".into()),
            ("restaurant_id", eq(restaurant_id)),
            ("is_active", eq(true)),
        ];
        self.maybe_single("stamp_programs", &query).await
    }

    async fn insert_stamp_card(&self, new: &NewStampCard) -> Result<(), BackendError> {
        self.insert("stamp_cards", &[new]).await
    }

    async fn active_stamp_cards(&self, customer_id: Uuid) -> Result<Vec<StampCard>, BackendError> {
        let query = vec![
            ("select", STAMP_CARD_SELECT.into()),
            ("customer_id", eq(customer_id)),
            ("status", eq("active")),
        ];
        self.select("stamp_cards", &query).await
    }

    async fn stamp_history(&self, customer_id: Uuid, limit: usize) -> Result<Vec<StampEntry>, BackendError> {
        let query = vec![
            ("select", "id,created_at,added_by_email,notes".into()),
            ("customer_id", eq(customer_id)),
            ("order", "created_at.desc".into()),
            ("limit", limit.to_string()),
        ];
        self.select("stamps", &query).await
    }

    async fn count_stamps(&self, restaurant_id: Uuid, customer_id: Option<Uuid>) -> Result<u64, BackendError> {
        let mut query = vec![("select", "id".into()), ("restaurant_id", eq(restaurant_id))];
        if let Some(customer_id) = customer_id {
            query.push(("customer_id", eq(customer_id)));
        }
        self.count("stamps", &query).await
    }

    async fn add_stamp(&self, request: &AddStampRequest) -> Result<AddStampOutcome, BackendError> {
        self.rpc("add_stamp_to_customer", request).await
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
