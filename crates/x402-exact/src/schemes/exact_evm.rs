//! Payload types of the "exact" scheme on EVM networks (EIP-3009 transfer authorizations).

use alloy_core::{
    sol,
    sol_types::{Eip712Domain, SolStruct, eip712_domain},
};
use alloy_primitives::{FixedBytes, U256};
use serde::{Deserialize, Serialize};

use crate::{
    networks::evm::{EvmAddress, EvmNetwork, EvmSignature, NetworkError},
    transport::{PaymentPayload, PaymentRequirements},
    types::{AmountValue, X402Version},
};

use std::{
    fmt::{Debug, Display},
    str::FromStr,
    time::SystemTime,
};

pub const SCHEME: &str = "exact";

/// Seconds subtracted from "now" for `validAfter`, tolerating block timestamp drift.
pub const VALID_AFTER_SKEW_SECONDS: u64 = 60;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce(pub [u8; 32]);

impl Nonce {
    /// A fresh nonce from the thread-local CSPRNG.
    pub fn random() -> Self {
        Nonce(rand::random())
    }
}

impl Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({self})")
    }
}

impl Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Nonce {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Nonce(arr))
    }
}

impl Serialize for Nonce {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Nonce::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Unix time in seconds, carried on the wire as a decimal string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampSeconds(pub u64);

impl TimestampSeconds {
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        TimestampSeconds(secs)
    }

    pub fn plus(self, seconds: u64) -> Self {
        TimestampSeconds(self.0.saturating_add(seconds))
    }

    pub fn minus(self, seconds: u64) -> Self {
        TimestampSeconds(self.0.saturating_sub(seconds))
    }
}

impl Display for TimestampSeconds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for TimestampSeconds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimestampSeconds({})", self.0)
    }
}

impl Serialize for TimestampSeconds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TimestampSeconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let seconds = s.parse::<u64>().map_err(serde::de::Error::custom)?;
        Ok(TimestampSeconds(seconds))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub signature: EvmSignature,
    pub authorization: ExactEvmAuthorization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmAuthorization {
    pub from: EvmAddress,
    pub to: EvmAddress,
    pub value: AmountValue,
    pub valid_after: TimestampSeconds,
    pub valid_before: TimestampSeconds,
    pub nonce: Nonce,
}

impl ExactEvmPayload {
    /// Parse the scheme-specific part of a [`PaymentPayload`].
    pub fn from_payment_payload(payload: &PaymentPayload) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.payload.clone())
    }

    /// Recover the address that signed this authorization under `domain`.
    pub fn recover_signer(
        &self,
        domain: &Eip712Domain,
    ) -> Result<EvmAddress, alloy_primitives::SignatureError> {
        let hash = TransferWithAuthorization::from(&self.authorization).eip712_signing_hash(domain);
        self.signature
            .0
            .recover_address_from_prehash(&hash)
            .map(EvmAddress)
    }
}

sol!(
    /// EIP-3009 `TransferWithAuthorization` message
    ///
    /// The struct name is part of the EIP-712 type hash and must not change.
    #[derive(Debug)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

impl From<&ExactEvmAuthorization> for TransferWithAuthorization {
    fn from(authorization: &ExactEvmAuthorization) -> Self {
        TransferWithAuthorization {
            from: authorization.from.0,
            to: authorization.to.0,
            value: authorization.value.value(),
            validAfter: U256::from(authorization.valid_after.0),
            validBefore: U256::from(authorization.valid_before.0),
            nonce: FixedBytes(authorization.nonce.0),
        }
    }
}

/// The `{name, version}` advertised in `requirements.extra`, either of which may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DomainExtra {
    pub name: Option<String>,
    pub version: Option<String>,
}

impl DomainExtra {
    pub fn from_requirements(requirements: &PaymentRequirements) -> Self {
        requirements
            .extra
            .as_ref()
            .and_then(|extra| serde_json::from_value::<DomainExtra>(extra.clone()).ok())
            .unwrap_or_default()
    }
}

/// The EIP-712 domain of a token contract.
pub fn token_domain(
    name: String,
    version: String,
    network: &EvmNetwork,
    asset: EvmAddress,
) -> Eip712Domain {
    eip712_domain! {
        name: name,
        version: version,
        chain_id: network.chain_id,
        verifying_contract: asset.0,
    }
}

/// An authorization waiting for its signature.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedPaymentPayload {
    pub x402_version: X402Version,
    pub scheme: String,
    pub network: String,
    pub authorization: ExactEvmAuthorization,
}

impl UnsignedPaymentPayload {
    pub fn into_payment_payload(
        self,
        signature: EvmSignature,
    ) -> Result<PaymentPayload, serde_json::Error> {
        let payload = serde_json::to_value(ExactEvmPayload {
            signature,
            authorization: self.authorization,
        })?;
        Ok(PaymentPayload {
            x402_version: self.x402_version,
            scheme: self.scheme,
            network: self.network,
            payload,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("Invalid payTo address: {0}")]
    InvalidPayTo(String),
}

/// Build the unsigned authorization for `requirements`, valid from a minute ago until
/// `maxTimeoutSeconds` from now, with a fresh random nonce.
pub fn prepare_payment_header(
    from: EvmAddress,
    x402_version: X402Version,
    requirements: &PaymentRequirements,
) -> Result<UnsignedPaymentPayload, PrepareError> {
    prepare_payment_header_at(from, x402_version, requirements, TimestampSeconds::now())
}

pub fn prepare_payment_header_at(
    from: EvmAddress,
    x402_version: X402Version,
    requirements: &PaymentRequirements,
    now: TimestampSeconds,
) -> Result<UnsignedPaymentPayload, PrepareError> {
    if requirements.scheme != SCHEME {
        return Err(PrepareError::UnsupportedScheme(requirements.scheme.clone()));
    }
    EvmNetwork::try_from_name(&requirements.network)?;
    let to = requirements
        .pay_to
        .parse::<EvmAddress>()
        .map_err(|_| PrepareError::InvalidPayTo(requirements.pay_to.clone()))?;

    Ok(UnsignedPaymentPayload {
        x402_version,
        scheme: requirements.scheme.clone(),
        network: requirements.network.clone(),
        authorization: ExactEvmAuthorization {
            from,
            to,
            value: requirements.max_amount_required,
            valid_after: now.minus(VALID_AFTER_SKEW_SECONDS),
            valid_before: now.plus(requirements.max_timeout_seconds),
            nonce: Nonce::random(),
        },
    })
}
