//! Route handlers.
//!
//! Every non-health handler resolves the caller through [`principal`] first and
//! maps service errors through [`crate::api::error::ApiError`].

pub mod admins;
pub mod audit;
pub mod auth;
pub mod health;
pub mod principal;
pub mod reports;
pub mod stats;
pub mod users;
