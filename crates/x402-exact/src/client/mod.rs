//! HTTP client paying for 402 responses.

mod selector;

pub use selector::select_payment_requirements;

use std::sync::Arc;

use bon::Builder;
use http::{HeaderValue, StatusCode, header::ACCESS_CONTROL_EXPOSE_HEADERS};
use reqwest::{IntoUrl, Request, RequestBuilder, Response};

use crate::{
    networks::{NetworkFamily, evm::EvmNetwork},
    schemes::{SchemeClient, SchemeError, SchemeRegistry, exact_evm::SCHEME},
    transport::{PaymentRequired, X_PAYMENT},
};

/// Which send of a request this is. A 402 is only answered with a payment once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    PaymentRetry,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentClientError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Payment required but no payment requirements were offered")]
    NoPaymentRequirements,
    #[error(transparent)]
    Scheme(#[from] SchemeError),
    #[error("Invalid payment header: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    #[error("Request body cannot be replayed with a payment")]
    RequestNotCloneable,
    #[error("Payment rejected: {error}")]
    PaymentRejected {
        error: String,
        payer: Option<String>,
    },
}

/// Wraps a [`reqwest::Client`], answering a 402 challenge by signing a payment and
/// retrying the request exactly once with an `X-PAYMENT` header.
#[derive(Builder, Clone)]
pub struct PaymentClient {
    #[builder(default)]
    http: reqwest::Client,
    #[builder(default)]
    schemes: SchemeRegistry<dyn SchemeClient>,
    /// Network to pay on when several are offered; defaults to the signer's chain.
    #[builder(into)]
    preferred_network: Option<String>,
}

impl PaymentClient {
    /// A client paying with the "exact" scheme on EVM networks.
    pub fn exact_evm(signer: impl SchemeClient + 'static) -> Self {
        PaymentClient::builder()
            .schemes(SchemeRegistry::<dyn SchemeClient>::new().register(
                SCHEME,
                NetworkFamily::Evm,
                Arc::new(signer),
            ))
            .build()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn get(&self, url: impl IntoUrl) -> Result<Response, PaymentClientError> {
        self.execute(self.http.get(url).build()?).await
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<Response, PaymentClientError> {
        self.execute(request.build()?).await
    }

    pub async fn execute(&self, request: Request) -> Result<Response, PaymentClientError> {
        let retry = request.try_clone();
        let response = self.dispatch(request, Attempt::Initial).await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        let required: PaymentRequired = response.json().await?;
        let mut retry = retry.ok_or(PaymentClientError::RequestNotCloneable)?;

        let header = self.create_payment_header(&required).await?;
        let headers = retry.headers_mut();
        headers.insert(X_PAYMENT, HeaderValue::try_from(header)?);
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("X-PAYMENT-RESPONSE"),
        );

        self.dispatch(retry, Attempt::PaymentRetry).await
    }

    async fn dispatch(
        &self,
        request: Request,
        attempt: Attempt,
    ) -> Result<Response, PaymentClientError> {
        let response = self.http.execute(request).await?;
        if attempt == Attempt::PaymentRetry && response.status() == StatusCode::PAYMENT_REQUIRED {
            let rejection = response.json::<PaymentRequired>().await.ok();
            #[cfg(feature = "tracing")]
            tracing::warn!(error = ?rejection.as_ref().map(|r| &r.error), "Payment was rejected");
            return Err(PaymentClientError::PaymentRejected {
                error: rejection
                    .as_ref()
                    .map(|r| r.error.clone())
                    .unwrap_or_default(),
                payer: rejection.and_then(|r| r.payer),
            });
        }
        Ok(response)
    }

    fn preferred_network(&self) -> Option<String> {
        self.preferred_network.clone().or_else(|| {
            self.schemes
                .values()
                .find_map(|client| client.chain_id())
                .and_then(EvmNetwork::by_chain_id)
                .map(|network| network.name.to_string())
        })
    }

    async fn create_payment_header(
        &self,
        required: &PaymentRequired,
    ) -> Result<crate::types::Base64EncodedHeader, PaymentClientError> {
        let network = self.preferred_network();
        let requirements =
            select_payment_requirements(&required.accepts, network.as_deref(), Some(SCHEME))
                .ok_or(PaymentClientError::NoPaymentRequirements)?;

        let client = self
            .schemes
            .get(&requirements.scheme, &requirements.network)
            .ok_or_else(|| SchemeError::Unsupported {
                scheme: requirements.scheme.clone(),
                network: requirements.network.clone(),
            })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            network = %requirements.network,
            amount = %requirements.max_amount_required,
            pay_to = %requirements.pay_to,
            "Paying for resource"
        );

        Ok(client
            .create_payment_header(required.x402_version, requirements)
            .await?)
    }
}
