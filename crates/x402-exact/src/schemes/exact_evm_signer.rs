use std::sync::Arc;

use alloy_core::sol_types::{Eip712Domain, SolStruct};

use crate::{
    chain::{ChainReader, DomainVersionCache, Offline, resolve_domain},
    networks::evm::{EvmAddress, EvmNetwork, EvmSignature},
    schemes::{
        BoxFuture, SchemeClient, SchemeError,
        exact_evm::{
            DomainExtra, PrepareError, TransferWithAuthorization, UnsignedPaymentPayload,
            prepare_payment_header,
        },
    },
    transport::{PaymentPayload, PaymentRequirements},
    types::{Base64EncodedHeader, X402Version},
};

/// A capability able to produce EIP-712 typed-data signatures.
pub trait Signer: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn address(&self) -> EvmAddress;

    /// The chain the signer is bound to, if any.
    fn chain_id(&self) -> Option<u64> {
        None
    }

    fn sign_typed_data<T: SolStruct + Send + Sync>(
        &self,
        domain: &Eip712Domain,
        message: &T,
    ) -> impl Future<Output = Result<EvmSignature, Self::Error>> + Send;
}

/// A raw private key held in memory.
#[cfg(feature = "evm-signer")]
#[derive(Debug, Clone)]
pub struct LocalKeySigner {
    key: alloy_signer_local::PrivateKeySigner,
}

#[cfg(feature = "evm-signer")]
impl LocalKeySigner {
    pub fn new(key: alloy_signer_local::PrivateKeySigner) -> Self {
        LocalKeySigner { key }
    }

    pub fn random() -> Self {
        LocalKeySigner::new(alloy_signer_local::PrivateKeySigner::random())
    }
}

#[cfg(feature = "evm-signer")]
impl std::str::FromStr for LocalKeySigner {
    type Err = alloy_signer_local::LocalSignerError;

    /// Parse a hex-encoded private key, with or without `0x`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(LocalKeySigner::new)
    }
}

#[cfg(feature = "evm-signer")]
impl Signer for LocalKeySigner {
    type Error = alloy_signer::Error;

    fn address(&self) -> EvmAddress {
        EvmAddress(self.key.address())
    }

    fn sign_typed_data<T: SolStruct + Send + Sync>(
        &self,
        domain: &Eip712Domain,
        message: &T,
    ) -> impl Future<Output = Result<EvmSignature, Self::Error>> + Send {
        use alloy_signer::SignerSync;

        let hash = message.eip712_signing_hash(domain);
        std::future::ready(self.key.sign_hash_sync(&hash).map(EvmSignature))
    }
}

/// Any alloy signer, such as a hardware or remote wallet, optionally bound to a chain.
#[cfg(feature = "evm-signer")]
#[derive(Debug, Clone)]
pub struct WalletSigner<S> {
    wallet: S,
}

#[cfg(feature = "evm-signer")]
impl<S: alloy_signer::Signer> WalletSigner<S> {
    pub fn new(wallet: S) -> Self {
        WalletSigner { wallet }
    }
}

#[cfg(feature = "evm-signer")]
impl<S> Signer for WalletSigner<S>
where
    S: alloy_signer::Signer + Send + Sync,
{
    type Error = alloy_signer::Error;

    fn address(&self) -> EvmAddress {
        EvmAddress(self.wallet.address())
    }

    fn chain_id(&self) -> Option<u64> {
        self.wallet.chain_id()
    }

    async fn sign_typed_data<T: SolStruct + Send + Sync>(
        &self,
        domain: &Eip712Domain,
        message: &T,
    ) -> Result<EvmSignature, Self::Error> {
        let hash = message.eip712_signing_hash(domain);
        let signature = self.wallet.sign_hash(&hash).await?;
        Ok(EvmSignature(signature))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExactEvmSignError<S, C> {
    #[error(transparent)]
    Prepare(#[from] PrepareError),
    #[error("Invalid asset address: {0}")]
    InvalidAsset(String),
    #[error("Failed to resolve the token's EIP-712 domain: {0}")]
    Domain(C),
    #[error("Signer error: {0}")]
    Signer(S),
    #[error("Failed to encode payment payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Client side of the "exact" EVM scheme: prepares, signs and encodes authorizations.
///
/// When `requirements.extra` lacks the token's domain `name` or `version`, they are read
/// through the configured [`ChainReader`], which defaults to [`Offline`].
pub struct ExactEvmSigner<S, R = Offline> {
    signer: S,
    chain: R,
    versions: Arc<DomainVersionCache>,
}

pub type SignResult<T, S, R> =
    Result<T, ExactEvmSignError<<S as Signer>::Error, <R as ChainReader>::Error>>;

impl<S: Signer> ExactEvmSigner<S> {
    pub fn new(signer: S) -> Self {
        ExactEvmSigner {
            signer,
            chain: Offline,
            versions: Arc::default(),
        }
    }
}

impl<S: Signer, R: ChainReader> ExactEvmSigner<S, R> {
    pub fn with_chain<R2: ChainReader>(self, chain: R2) -> ExactEvmSigner<S, R2> {
        ExactEvmSigner {
            signer: self.signer,
            chain,
            versions: self.versions,
        }
    }

    pub fn with_version_cache(mut self, versions: Arc<DomainVersionCache>) -> Self {
        self.versions = versions;
        self
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Sign a prepared authorization, producing the full payment payload.
    pub async fn sign_payment_header(
        &self,
        requirements: &PaymentRequirements,
        unsigned: UnsignedPaymentPayload,
    ) -> SignResult<PaymentPayload, S, R> {
        let network = EvmNetwork::try_from_name(&requirements.network).map_err(PrepareError::from)?;
        let asset = requirements
            .asset
            .parse::<EvmAddress>()
            .map_err(|_| ExactEvmSignError::InvalidAsset(requirements.asset.clone()))?;

        let domain = resolve_domain(
            &self.chain,
            &self.versions,
            &network,
            asset,
            DomainExtra::from_requirements(requirements),
        )
        .await
        .map_err(ExactEvmSignError::Domain)?;

        let message = TransferWithAuthorization::from(&unsigned.authorization);
        let signature = self
            .signer
            .sign_typed_data(&domain, &message)
            .await
            .map_err(ExactEvmSignError::Signer)?;

        Ok(unsigned.into_payment_payload(signature)?)
    }

    /// Prepare, sign and base64-encode a payment for `requirements`, ready for `X-PAYMENT`.
    pub async fn create_payment_header(
        &self,
        x402_version: X402Version,
        requirements: &PaymentRequirements,
    ) -> SignResult<Base64EncodedHeader, S, R> {
        let unsigned = prepare_payment_header(self.signer.address(), x402_version, requirements)?;
        let payload = self.sign_payment_header(requirements, unsigned).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            payer = %self.signer.address(),
            network = %payload.network,
            "Signed payment authorization"
        );

        Ok(Base64EncodedHeader::try_from(&payload)?)
    }
}

impl<S, R> SchemeClient for ExactEvmSigner<S, R>
where
    S: Signer + 'static,
    R: ChainReader + 'static,
{
    fn address(&self) -> String {
        self.signer.address().to_string()
    }

    fn chain_id(&self) -> Option<u64> {
        self.signer.chain_id()
    }

    fn create_payment_header<'a>(
        &'a self,
        x402_version: X402Version,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<Base64EncodedHeader, SchemeError>> {
        Box::pin(async move {
            ExactEvmSigner::create_payment_header(self, x402_version, requirements)
                .await
                .map_err(SchemeError::failed)
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use serde_json::json;
    use url_macro::url;

    use crate::{
        chain::mock::MockChain,
        networks::evm::{BASE_SEPOLIA, USDC_BASE_SEPOLIA},
        schemes::exact_evm::{ExactEvmPayload, TimestampSeconds, token_domain},
    };

    use super::*;

    fn requirements(extra: Option<serde_json::Value>) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: "base-sepolia".to_string(),
            max_amount_required: 1000u32.into(),
            resource: url!("https://example.com/payment"),
            description: "Payment for services".to_string(),
            mime_type: "application/json".to_string(),
            pay_to: "0x3CB9B3bBfde8501f411bB69Ad3DC07908ED0dE20".to_string(),
            max_timeout_seconds: 60,
            asset: USDC_BASE_SEPOLIA.address.to_string(),
            output_schema: None,
            extra,
        }
    }

    #[tokio::test]
    async fn test_signing_recovers_to_signer() {
        let signer = ExactEvmSigner::new(LocalKeySigner::random());
        let req = requirements(Some(json!({ "name": "USDC", "version": "2" })));

        let header = signer
            .create_payment_header(X402Version::V1, &req)
            .await
            .expect("Signing should succeed");

        let payload = PaymentPayload::try_from(&header).unwrap();
        let exact = ExactEvmPayload::from_payment_payload(&payload).unwrap();
        assert_eq!(exact.authorization.value.to_string(), "1000");
        assert_eq!(
            exact.authorization.to.0,
            address!("0x3CB9B3bBfde8501f411bB69Ad3DC07908ED0dE20")
        );
        let now = TimestampSeconds::now();
        assert!(exact.authorization.valid_after < now);
        assert!(exact.authorization.valid_before > now);

        let domain = token_domain(
            "USDC".to_string(),
            "2".to_string(),
            &BASE_SEPOLIA,
            USDC_BASE_SEPOLIA.address,
        );
        let recovered = exact.recover_signer(&domain).unwrap();
        assert_eq!(recovered, signer.signer().address());

        let wrong_domain = token_domain(
            "USD Coin".to_string(),
            "2".to_string(),
            &BASE_SEPOLIA,
            USDC_BASE_SEPOLIA.address,
        );
        assert_ne!(exact.recover_signer(&wrong_domain).unwrap(), signer.signer().address());
    }

    #[tokio::test]
    async fn test_domain_read_from_chain_when_extra_missing() {
        let chain = MockChain::usdc();
        let signer = ExactEvmSigner::new(LocalKeySigner::random()).with_chain(chain);
        let req = requirements(None);

        let header = signer
            .create_payment_header(X402Version::V1, &req)
            .await
            .unwrap();
        let payload = PaymentPayload::try_from(&header).unwrap();
        let exact = ExactEvmPayload::from_payment_payload(&payload).unwrap();

        let domain = token_domain(
            "USDC".to_string(),
            "2".to_string(),
            &BASE_SEPOLIA,
            USDC_BASE_SEPOLIA.address,
        );
        assert_eq!(exact.recover_signer(&domain).unwrap(), signer.signer().address());
    }

    #[tokio::test]
    async fn test_offline_signer_needs_domain_in_extra() {
        let signer = ExactEvmSigner::new(LocalKeySigner::random());
        let result = signer
            .create_payment_header(X402Version::V1, &requirements(None))
            .await;
        assert!(matches!(result, Err(ExactEvmSignError::Domain(_))));
    }

    #[tokio::test]
    async fn test_wallet_signer_reports_chain() {
        let wallet = alloy_signer_local::PrivateKeySigner::random();
        let wallet = alloy_signer::Signer::with_chain_id(wallet, Some(BASE_SEPOLIA.chain_id));
        let signer = WalletSigner::new(wallet);
        assert_eq!(Signer::chain_id(&signer), Some(84532));

        let signer = ExactEvmSigner::new(signer);
        let req = requirements(Some(json!({ "name": "USDC", "version": "2" })));
        let header = signer
            .create_payment_header(X402Version::V1, &req)
            .await
            .unwrap();
        let payload = PaymentPayload::try_from(&header).unwrap();
        assert_eq!(payload.scheme, "exact");
        assert_eq!(payload.network, "base-sepolia");
    }
}
