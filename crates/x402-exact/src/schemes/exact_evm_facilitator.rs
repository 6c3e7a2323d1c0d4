//! Verification and settlement of "exact" EVM payments.

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::U256;
use bon::Builder;

use crate::{
    chain::{ChainReader, ChainWriter, DomainVersionCache, resolve_domain},
    networks::evm::{EvmAddress, EvmNetwork},
    schemes::{
        BoxFuture, SchemeFacilitator,
        exact_evm::{DomainExtra, ExactEvmPayload, SCHEME, TimestampSeconds},
    },
    transport::{
        ErrorReason, PaymentPayload, PaymentRequirements, SettleResponse, SupportedKind,
        VerifyResponse,
    },
    types::X402Version,
};

/// An authorization must stay valid at least this long after verification, to cover the
/// round trip to the chain.
pub const EXPIRY_BUFFER_SECONDS: u64 = 6;

/// Facilitator for the "exact" scheme on the EVM networks it holds a chain client for.
#[derive(Builder)]
pub struct ExactEvmFacilitator<C> {
    #[builder(default)]
    chains: HashMap<u64, C>,
    #[builder(default)]
    versions: Arc<DomainVersionCache>,
}

#[derive(Debug)]
struct Rejection {
    reason: ErrorReason,
    payer: Option<EvmAddress>,
}

impl Rejection {
    fn new(reason: ErrorReason) -> Self {
        Rejection {
            reason,
            payer: None,
        }
    }

    fn by(payer: EvmAddress, reason: ErrorReason) -> Self {
        Rejection {
            reason,
            payer: Some(payer),
        }
    }

    fn payer(&self) -> Option<String> {
        self.payer.map(|p| p.to_string())
    }
}

/// A payload that passed every check, with what settlement needs.
struct Verified<'a, C> {
    chain: &'a C,
    payload: ExactEvmPayload,
    asset: EvmAddress,
    payer: EvmAddress,
}

impl<C> Default for ExactEvmFacilitator<C> {
    fn default() -> Self {
        ExactEvmFacilitator {
            chains: HashMap::new(),
            versions: Arc::default(),
        }
    }
}

impl<C: ChainReader> ExactEvmFacilitator<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `network` through `chain`, replacing any previous client for it.
    pub fn with_chain(mut self, network: EvmNetwork, chain: C) -> Self {
        self.chains.insert(network.chain_id, chain);
        self
    }

    pub fn networks(&self) -> Vec<EvmNetwork> {
        let mut networks: Vec<_> = self
            .chains
            .keys()
            .filter_map(|id| EvmNetwork::by_chain_id(*id))
            .collect();
        networks.sort_by_key(|n| n.chain_id);
        networks
    }

    /// Share `versions` with other signers or facilitators of this process.
    pub fn with_version_cache(mut self, versions: Arc<DomainVersionCache>) -> Self {
        self.versions = versions;
        self
    }

    pub fn version_cache(&self) -> &Arc<DomainVersionCache> {
        &self.versions
    }

    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyResponse {
        self.verify_at(payload, requirements, TimestampSeconds::now())
            .await
    }

    /// Verify against an explicit clock.
    pub async fn verify_at(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        now: TimestampSeconds,
    ) -> VerifyResponse {
        match self.check(payload, requirements, now).await {
            Ok(verified) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    payer = %verified.payer,
                    network = %requirements.network,
                    "Payment verified"
                );
                VerifyResponse::valid(verified.payer.to_string())
            }
            Err(rejection) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    reason = %rejection.reason,
                    payer = ?rejection.payer,
                    "Payment rejected"
                );
                VerifyResponse::invalid(rejection.reason.clone(), rejection.payer())
            }
        }
    }

    async fn check<'a>(
        &'a self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        now: TimestampSeconds,
    ) -> Result<Verified<'a, C>, Rejection> {
        if payload.scheme != SCHEME || requirements.scheme != SCHEME {
            return Err(Rejection::new(ErrorReason::InvalidScheme));
        }
        if payload.network != requirements.network {
            return Err(Rejection::new(ErrorReason::InvalidNetwork));
        }
        let network = EvmNetwork::by_name(&requirements.network)
            .ok_or_else(|| Rejection::new(ErrorReason::InvalidNetwork))?;
        let chain = self
            .chains
            .get(&network.chain_id)
            .ok_or_else(|| Rejection::new(ErrorReason::InvalidNetwork))?;

        let exact = ExactEvmPayload::from_payment_payload(payload)
            .map_err(|_| Rejection::new(ErrorReason::InvalidPayload))?;
        let authorization = &exact.authorization;
        let payer = authorization.from;

        let asset = requirements
            .asset
            .parse::<EvmAddress>()
            .map_err(|_| Rejection::by(payer, ErrorReason::InvalidNetwork))?;
        let domain = resolve_domain(
            chain,
            &self.versions,
            &network,
            asset,
            DomainExtra::from_requirements(requirements),
        )
        .await
        .map_err(|_| Rejection::by(payer, ErrorReason::InvalidNetwork))?;

        match exact.recover_signer(&domain) {
            Ok(signer) if signer == payer => {}
            _ => return Err(Rejection::by(payer, ErrorReason::InvalidSignature)),
        }

        if authorization.valid_before < now.plus(EXPIRY_BUFFER_SECONDS) {
            return Err(Rejection::by(payer, ErrorReason::AuthorizationExpired));
        }
        if authorization.valid_after > now {
            return Err(Rejection::by(payer, ErrorReason::AuthorizationNotYetValid));
        }

        let required: U256 = requirements.max_amount_required.value();
        let balance = chain
            .token_balance(asset, payer)
            .await
            .map_err(|_| Rejection::by(payer, ErrorReason::UnexpectedChainError))?;
        if balance < required {
            return Err(Rejection::by(payer, ErrorReason::InsufficientFunds));
        }

        if authorization.value.value() < required {
            return Err(Rejection::by(payer, ErrorReason::InsufficientValue));
        }
        let pay_to = requirements.pay_to.parse::<EvmAddress>().ok();
        if pay_to != Some(authorization.to) {
            return Err(Rejection::by(payer, ErrorReason::RecipientMismatch));
        }

        Ok(Verified {
            chain,
            payload: exact,
            asset,
            payer,
        })
    }
}

impl<C: ChainWriter> ExactEvmFacilitator<C> {
    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse {
        self.settle_at(payload, requirements, TimestampSeconds::now())
            .await
    }

    /// Re-verify, then submit the authorization and wait for its receipt.
    pub async fn settle_at(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        now: TimestampSeconds,
    ) -> SettleResponse {
        let network = requirements.network.as_str();
        let verified = match self.check(payload, requirements, now).await {
            Ok(verified) => verified,
            Err(rejection) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    reason = %rejection.reason,
                    "Settlement refused, payment no longer valid"
                );
                return SettleResponse::failed(
                    rejection.reason.clone(),
                    "",
                    network,
                    rejection.payer(),
                );
            }
        };
        let payer = verified.payer.to_string();

        let transaction_hash = match verified
            .chain
            .transfer_with_authorization(verified.asset, &verified.payload)
            .await
        {
            Ok(hash) => hash,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    error = %_err,
                    payer = %payer,
                    "Failed to submit transferWithAuthorization"
                );
                return SettleResponse::failed(
                    ErrorReason::UnexpectedChainError,
                    "",
                    network,
                    Some(payer),
                );
            }
        };

        match verified.chain.wait_for_receipt(transaction_hash).await {
            Ok(receipt) if receipt.success => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    transaction = %receipt.transaction_hash,
                    payer = %payer,
                    "Payment settled"
                );
                SettleResponse::success(receipt.transaction_hash.to_string(), network, payer)
            }
            Ok(receipt) => SettleResponse::failed(
                ErrorReason::TransactionFailed,
                receipt.transaction_hash.to_string(),
                network,
                Some(payer),
            ),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    error = %_err,
                    transaction = %transaction_hash,
                    "No receipt for settlement transaction"
                );
                SettleResponse::failed(
                    ErrorReason::TransactionFailed,
                    transaction_hash.to_string(),
                    network,
                    Some(payer),
                )
            }
        }
    }
}

impl<C: ChainWriter + 'static> SchemeFacilitator for ExactEvmFacilitator<C> {
    fn kinds(&self) -> Vec<SupportedKind> {
        self.networks()
            .into_iter()
            .map(|network| SupportedKind {
                x402_version: X402Version::V1,
                scheme: SCHEME.to_string(),
                network: network.name.to_string(),
            })
            .collect()
    }

    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, VerifyResponse> {
        Box::pin(ExactEvmFacilitator::verify(self, payload, requirements))
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, SettleResponse> {
        Box::pin(ExactEvmFacilitator::settle(self, payload, requirements))
    }
}
