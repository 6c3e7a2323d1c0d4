//! The x402 "exact" payment scheme on EVM networks.
//!
//! Buyers sign EIP-3009 `transferWithAuthorization` messages ([`schemes::exact_evm_signer`]),
//! facilitators verify and settle them ([`schemes::exact_evm_facilitator`]), and both sides
//! exchange the [`transport`] types over HTTP.

pub mod chain;
pub mod errors;
pub mod facilitator;
pub mod networks;
pub mod price;
pub mod schemes;
pub mod transport;
pub mod types;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "facilitator-client")]
pub mod facilitator_client;

#[cfg(feature = "facilitator-server")]
pub mod facilitator_server;
