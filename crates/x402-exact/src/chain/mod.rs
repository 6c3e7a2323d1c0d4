//! Chain access used by signing, verification and settlement.
//!
//! The protocol only needs a handful of reads and one write against an EIP-3009 token
//! contract. They are expressed as two capability traits so that any RPC stack, or an
//! in-memory fake, can back them.

#[cfg(feature = "evm-rpc")]
pub mod rpc;

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use alloy_core::sol_types::Eip712Domain;
use alloy_primitives::{Address, B256, U256};

use crate::{
    networks::evm::{EvmAddress, EvmNetwork},
    schemes::exact_evm::{DomainExtra, ExactEvmPayload, token_domain},
};

/// Read-only access to a token contract.
pub trait ChainReader: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn token_balance(
        &self,
        asset: EvmAddress,
        owner: EvmAddress,
    ) -> impl Future<Output = Result<U256, Self::Error>> + Send;

    /// The `name` of the token's EIP-712 domain.
    fn token_name(
        &self,
        asset: EvmAddress,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;

    /// The `version` of the token's EIP-712 domain.
    fn token_version(
        &self,
        asset: EvmAddress,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

/// Write access, used to settle an authorization.
pub trait ChainWriter: ChainReader {
    /// Submit `transferWithAuthorization` on `asset`, returning the transaction hash.
    fn transfer_with_authorization(
        &self,
        asset: EvmAddress,
        payload: &ExactEvmPayload,
    ) -> impl Future<Output = Result<B256, Self::Error>> + Send;

    fn wait_for_receipt(
        &self,
        transaction_hash: B256,
    ) -> impl Future<Output = Result<TransactionReceipt, Self::Error>> + Send;
}

impl<C: ChainReader> ChainReader for Arc<C> {
    type Error = C::Error;

    fn token_balance(
        &self,
        asset: EvmAddress,
        owner: EvmAddress,
    ) -> impl Future<Output = Result<U256, Self::Error>> + Send {
        self.as_ref().token_balance(asset, owner)
    }

    fn token_name(
        &self,
        asset: EvmAddress,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send {
        self.as_ref().token_name(asset)
    }

    fn token_version(
        &self,
        asset: EvmAddress,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send {
        self.as_ref().token_version(asset)
    }
}

impl<C: ChainWriter> ChainWriter for Arc<C> {
    fn transfer_with_authorization(
        &self,
        asset: EvmAddress,
        payload: &ExactEvmPayload,
    ) -> impl Future<Output = Result<B256, Self::Error>> + Send {
        self.as_ref().transfer_with_authorization(asset, payload)
    }

    fn wait_for_receipt(
        &self,
        transaction_hash: B256,
    ) -> impl Future<Output = Result<TransactionReceipt, Self::Error>> + Send {
        self.as_ref().wait_for_receipt(transaction_hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub success: bool,
}

/// A reader with no chain behind it.
///
/// Suitable when every payment requirement carries the domain `name` and `version` in
/// `extra`, which is the case for requirements built by the paywall.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("No chain client configured")]
pub struct OfflineError;

impl ChainReader for Offline {
    type Error = OfflineError;

    async fn token_balance(&self, _: EvmAddress, _: EvmAddress) -> Result<U256, Self::Error> {
        Err(OfflineError)
    }

    async fn token_name(&self, _: EvmAddress) -> Result<String, Self::Error> {
        Err(OfflineError)
    }

    async fn token_version(&self, _: EvmAddress) -> Result<String, Self::Error> {
        Err(OfflineError)
    }
}

/// Read-through cache of token EIP-712 domain versions, keyed by chain id and token address.
///
/// Entries never expire on their own. Share it behind an `Arc` between the signer and the
/// facilitator of one process, or give each its own.
#[derive(Debug, Default)]
pub struct DomainVersionCache {
    versions: RwLock<HashMap<(u64, Address), String>>,
}

impl DomainVersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chain_id: u64, asset: EvmAddress) -> Option<String> {
        self.versions
            .read()
            .ok()
            .and_then(|versions| versions.get(&(chain_id, asset.0)).cloned())
    }

    pub fn insert(&self, chain_id: u64, asset: EvmAddress, version: impl Into<String>) {
        if let Ok(mut versions) = self.versions.write() {
            versions.insert((chain_id, asset.0), version.into());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut versions) = self.versions.write() {
            versions.clear();
        }
    }

    /// Cached version for `asset`, reading it from the chain on a miss.
    pub async fn get_or_fetch<R: ChainReader>(
        &self,
        network: &EvmNetwork,
        asset: EvmAddress,
        reader: &R,
    ) -> Result<String, R::Error> {
        if let Some(version) = self.get(network.chain_id, asset) {
            return Ok(version);
        }
        let version = reader.token_version(asset).await?;
        self.insert(network.chain_id, asset, version.clone());
        Ok(version)
    }
}

/// Build the EIP-712 domain of `asset`, taking `name` and `version` from `extra` and
/// falling back to the token contract for whichever is missing.
pub async fn resolve_domain<R: ChainReader>(
    reader: &R,
    cache: &DomainVersionCache,
    network: &EvmNetwork,
    asset: EvmAddress,
    extra: DomainExtra,
) -> Result<Eip712Domain, R::Error> {
    let name = match extra.name {
        Some(name) => name,
        None => reader.token_name(asset).await?,
    };
    let version = match extra.version {
        Some(version) => version,
        None => cache.get_or_fetch(network, asset, reader).await?,
    };
    Ok(token_domain(name, version, network, asset))
}
