//! Payment schemes and the registry dispatching to them.
//!
//! A scheme is looked up by its name and the family of the requested network, so that one
//! implementation serves every network of a family.

pub mod exact_evm;
pub mod exact_evm_facilitator;
pub mod exact_evm_signer;

use std::{collections::HashMap, pin::Pin, sync::Arc};

use crate::{
    networks::NetworkFamily,
    transport::{
        PaymentPayload, PaymentRequirements, SettleResponse, SupportedKind, VerifyResponse,
    },
    types::{Base64EncodedHeader, X402Version},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    #[error("No payment scheme registered for {scheme} on {network}")]
    Unsupported { scheme: String, network: String },
    #[error(transparent)]
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl SchemeError {
    pub fn failed(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        SchemeError::Failed(Box::new(err))
    }
}

/// Facilitator side of a scheme: verifies and settles payloads of its family.
pub trait SchemeFacilitator: Send + Sync {
    /// The `(version, scheme, network)` triples this facilitator can serve.
    fn kinds(&self) -> Vec<SupportedKind>;

    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, VerifyResponse>;

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, SettleResponse>;
}

/// Client side of a scheme: turns requirements into an `X-PAYMENT` header value.
pub trait SchemeClient: Send + Sync {
    fn address(&self) -> String;

    fn chain_id(&self) -> Option<u64>;

    fn create_payment_header<'a>(
        &'a self,
        x402_version: X402Version,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<Base64EncodedHeader, SchemeError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemeKey {
    pub scheme: String,
    pub family: NetworkFamily,
}

/// Scheme implementations keyed by `(scheme, network family)`.
pub struct SchemeRegistry<T: ?Sized> {
    entries: HashMap<SchemeKey, Arc<T>>,
}

impl<T: ?Sized> Default for SchemeRegistry<T> {
    fn default() -> Self {
        SchemeRegistry {
            entries: HashMap::new(),
        }
    }
}

impl<T: ?Sized> Clone for SchemeRegistry<T> {
    fn clone(&self) -> Self {
        SchemeRegistry {
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> SchemeRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        scheme: impl Into<String>,
        family: NetworkFamily,
        implementation: Arc<T>,
    ) -> Self {
        let key = SchemeKey {
            scheme: scheme.into(),
            family,
        };
        self.entries.insert(key, implementation);
        self
    }

    /// The implementation serving `scheme` on `network`, if the network is known.
    pub fn get(&self, scheme: &str, network: &str) -> Option<&Arc<T>> {
        let family = NetworkFamily::of(network)?;
        self.entries.get(&SchemeKey {
            scheme: scheme.to_string(),
            family,
        })
    }

    pub fn values(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.values()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
