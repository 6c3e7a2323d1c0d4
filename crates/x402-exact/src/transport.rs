//! Wire types of the x402 protocol and their header encodings.

use std::fmt::Display;

use http::HeaderName;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    errors::DecodeError,
    types::{AmountValue, AnyJson, Base64EncodedHeader, X402Version},
};

/// Request header carrying a base64 encoded [`PaymentPayload`].
pub const X_PAYMENT: HeaderName = HeaderName::from_static("x-payment");

/// Response header carrying a base64 encoded [`SettleResponse`].
pub const X_PAYMENT_RESPONSE: HeaderName = HeaderName::from_static("x-payment-response");

/// What a resource server demands for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Scheme name, currently only "exact"
    pub scheme: String,
    /// Network name, e.g. "base-sepolia"
    pub network: String,
    /// Maximum amount required for the payment in atomic units
    pub max_amount_required: AmountValue,
    /// Absolute URL of the resource
    pub resource: Url,
    /// Description of the resource
    pub description: String,
    /// MIME type of the resource response
    pub mime_type: String,
    /// Destination address to pay to
    pub pay_to: String,
    /// Maximum time in seconds the payment authorization stays valid
    pub max_timeout_seconds: u64,
    /// Token contract address
    pub asset: String,
    /// Schema of the resource's input / output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<AnyJson>,
    /// Scheme-specific metadata, e.g. the token's EIP-712 domain name and version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<AnyJson>,
}

/// What a client presents in the `X-PAYMENT` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version,
    pub scheme: String,
    pub network: String,
    /// Scheme-specific payload, see [`crate::schemes::exact_evm::ExactEvmPayload`]
    pub payload: AnyJson,
}

impl PaymentPayload {
    /// Whether this payload was built for the given requirements' scheme and network.
    pub fn matches(&self, requirements: &PaymentRequirements) -> bool {
        self.scheme == requirements.scheme && self.network == requirements.network
    }
}

impl TryFrom<&PaymentPayload> for Base64EncodedHeader {
    type Error = serde_json::Error;

    fn try_from(value: &PaymentPayload) -> Result<Self, Self::Error> {
        Base64EncodedHeader::encode(value)
    }
}

impl TryFrom<&Base64EncodedHeader> for PaymentPayload {
    type Error = DecodeError;

    fn try_from(value: &Base64EncodedHeader) -> Result<Self, Self::Error> {
        value.decode()
    }
}

/// The JSON body of a 402 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: X402Version,
    pub error: String,
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Body of the facilitator `/verify` and `/settle` endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest {
    pub x402_version: X402Version,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

impl FacilitatorRequest {
    pub fn new(payment_payload: PaymentPayload, payment_requirements: PaymentRequirements) -> Self {
        FacilitatorRequest {
            x402_version: payment_payload.x402_version,
            payment_payload,
            payment_requirements,
        }
    }
}

/// Why a payment was rejected, one code per distinct check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    InvalidScheme,
    InvalidNetwork,
    InvalidPayload,
    InvalidSignature,
    AuthorizationExpired,
    AuthorizationNotYetValid,
    InsufficientFunds,
    InsufficientValue,
    RecipientMismatch,
    UnexpectedChainError,
    TransactionFailed,
    /// A reason this crate does not know, kept verbatim.
    Other(String),
}

impl ErrorReason {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorReason::InvalidScheme => "invalid_scheme",
            ErrorReason::InvalidNetwork => "invalid_network",
            ErrorReason::InvalidPayload => "invalid_payload",
            ErrorReason::InvalidSignature => "invalid_signature",
            ErrorReason::AuthorizationExpired => "authorization_expired",
            ErrorReason::AuthorizationNotYetValid => "authorization_not_yet_valid",
            ErrorReason::InsufficientFunds => "insufficient_funds",
            ErrorReason::InsufficientValue => "insufficient_value",
            ErrorReason::RecipientMismatch => "recipient_mismatch",
            ErrorReason::UnexpectedChainError => "unexpected_chain_error",
            ErrorReason::TransactionFailed => "transaction_failed",
            ErrorReason::Other(s) => s,
        }
    }
}

impl From<&str> for ErrorReason {
    fn from(value: &str) -> Self {
        match value {
            "invalid_scheme" => ErrorReason::InvalidScheme,
            "invalid_network" => ErrorReason::InvalidNetwork,
            "invalid_payload" => ErrorReason::InvalidPayload,
            "invalid_signature" => ErrorReason::InvalidSignature,
            "authorization_expired" => ErrorReason::AuthorizationExpired,
            "authorization_not_yet_valid" => ErrorReason::AuthorizationNotYetValid,
            "insufficient_funds" => ErrorReason::InsufficientFunds,
            "insufficient_value" => ErrorReason::InsufficientValue,
            "recipient_mismatch" => ErrorReason::RecipientMismatch,
            "unexpected_chain_error" => ErrorReason::UnexpectedChainError,
            "transaction_failed" => ErrorReason::TransactionFailed,
            other => ErrorReason::Other(other.to_string()),
        }
    }
}

impl Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorReason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorReason {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ErrorReason::from(s.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<ErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    pub fn valid(payer: impl Into<String>) -> Self {
        VerifyResponse {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer.into()),
        }
    }

    pub fn invalid(reason: ErrorReason, payer: Option<String>) -> Self {
        VerifyResponse {
            is_valid: false,
            invalid_reason: Some(reason),
            payer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,
    /// Transaction hash, empty when nothing was submitted
    #[serde(default)]
    pub transaction: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl SettleResponse {
    pub fn success(
        transaction: impl Into<String>,
        network: impl Into<String>,
        payer: impl Into<String>,
    ) -> Self {
        SettleResponse {
            success: true,
            error_reason: None,
            transaction: transaction.into(),
            network: network.into(),
            payer: Some(payer.into()),
        }
    }

    pub fn failed(
        reason: ErrorReason,
        transaction: impl Into<String>,
        network: impl Into<String>,
        payer: Option<String>,
    ) -> Self {
        SettleResponse {
            success: false,
            error_reason: Some(reason),
            transaction: transaction.into(),
            network: network.into(),
            payer,
        }
    }
}

impl TryFrom<&SettleResponse> for Base64EncodedHeader {
    type Error = serde_json::Error;

    fn try_from(value: &SettleResponse) -> Result<Self, Self::Error> {
        Base64EncodedHeader::encode(value)
    }
}

/// Decode the `X-PAYMENT-RESPONSE` header of a paid response.
pub fn decode_payment_response(header: &str) -> Result<SettleResponse, DecodeError> {
    Base64EncodedHeader::from(header).decode()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub x402_version: X402Version,
    pub scheme: String,
    pub network: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedKind>,
}
