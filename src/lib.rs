//! # stampcard
//!
//! Client for a restaurant loyalty program: customers sign up, collect
//! stamps and redeem coupons; restaurant staff grant stamps and validate
//! coupons. Reward issuance and stamp counting live in the managed backend.
//!
//! The crate is split into the remote `backend` clients, the session
//! `router` that decides which screen is active, the `services` that back
//! each form and dashboard, and the terminal `shell` binary front end.

pub mod backend;
pub mod config;
pub mod router;
pub mod services;
pub mod shell;
pub mod state;
