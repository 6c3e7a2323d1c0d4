//! Resource-server middleware for x402 "exact" payments.
//!
//! A [`PayWall`](paywall::PayWall) prices the routes of a [`RouteTable`](routes::RouteTable),
//! answers unpaid requests with 402 and the payment requirements, verifies `X-PAYMENT`
//! headers with a facilitator, and settles after the protected handler has run.

pub mod config;
pub mod errors;
pub mod html;
pub mod paywall;
pub mod processor;
pub mod routes;

#[cfg(feature = "axum")]
pub mod axum;
