//! Kidbank HTTP API service.
//!
//! This crate provides the HTTP API for kidbank and the background tickers
//! that post recurring credits:
//!
//! - Child accounts
//! - Deposits, withdrawals, balance and history
//! - Allowance and interest schedules
//! - [`ticker`]: the allowance and interest tickers
//!
//! # Authentication
//!
//! Every `/api` route takes a bearer JWT (HS256) naming either a parent or a
//! child of one family. Parents may act on any child of their family; a child
//! may only read its own account.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ticker;

pub use auth::sign_token;
pub use config::{ConfigError, ServiceConfig};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use ticker::{AllowanceJob, InterestJob, RecurringJob, ScanReport, Ticker};
