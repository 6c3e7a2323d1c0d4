use std::fmt::Display;

use bon::Builder;
use http::{
    HeaderMap, Request, Response, StatusCode,
    header::{ACCEPT, HOST, USER_AGENT},
};
use serde_json::json;
use url::Url;
use x402_exact::{
    facilitator::Facilitator,
    networks::evm::{EvmAddress, EvmNetwork},
    price::process_price_to_atomic_amount,
    schemes::exact_evm::SCHEME,
    transport::{PaymentPayload, PaymentRequired, PaymentRequirements, X_PAYMENT},
    types::{Base64EncodedHeader, X402Version},
};

use crate::{
    errors::{ErrorBody, ErrorResponse},
    html::{PaywallPage, display_amount},
    processor::{PaymentState, RequestProcessor},
    routes::{Route, RouteTable},
};

/// Where a request stands in the payment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStage {
    /// No priced route matches; the request passes through.
    Unmatched,
    /// Requirements for the matched route could not be built.
    Pricing,
    /// Priced route requested without an `X-PAYMENT` header.
    NoPayment,
    /// The `X-PAYMENT` header could not be decoded.
    Decoding,
    /// The payload's scheme and network match no offered requirements.
    RequirementMismatch,
    /// The facilitator rejected the payment or could not be reached.
    Verifying,
    /// Payment verified; the handler runs.
    Verified,
    /// Settlement after the handler failed; the handler's response is discarded.
    SettlementFailed,
    /// Settlement succeeded; the response carries `X-PAYMENT-RESPONSE`.
    Settled,
}

/// A http paywall charging for the routes of a [`RouteTable`], using a facilitator to
/// verify and settle payments.
#[derive(Builder, Clone)]
pub struct PayWall<F: Facilitator> {
    /// The facilitator to use for payment verification and settlement.
    pub facilitator: F,
    /// Address receiving the payments.
    pub pay_to: EvmAddress,
    pub routes: RouteTable,
    #[builder(default)]
    pub config: PayWallConfig,
}

/// Paywall configuration options.
///
/// Every verified payment is settled once the handler returns, whatever its status.
#[derive(Builder, Debug, Clone, Default)]
pub struct PayWallConfig {
    /// Return handler responses with an error status (>= 400) without settling.
    #[builder(default, with = || true)]
    pub skip_settlement_on_error_status: bool,
    /// Application name shown on the paywall page.
    #[builder(into)]
    pub app_name: Option<String>,
    /// Logo URL shown on the paywall page.
    #[builder(into)]
    pub app_logo: Option<String>,
}

/// Outcome of matching a request against the paywall.
pub enum Matched<'pw, F: Facilitator, Req> {
    Unmatched(Request<Req>),
    Payment(RequestProcessor<'pw, F, Req>),
}

impl<F: Facilitator, Req> Matched<'_, F, Req> {
    pub fn stage(&self) -> PaymentStage {
        match self {
            Matched::Unmatched(_) => PaymentStage::Unmatched,
            Matched::Payment(processor) => processor.payment_state.stage,
        }
    }
}

impl<F: Facilitator> PayWall<F> {
    /// Run `handler` behind the paywall.
    ///
    /// Requests to unpriced routes go straight to the handler. Paid requests are verified
    /// before the handler runs and settled after it returns; the handler's response is
    /// only released once settlement has succeeded.
    pub async fn handle_payment<Fun, Fut, Req, Res>(
        &self,
        request: Request<Req>,
        handler: Fun,
    ) -> Result<Response<Res>, ErrorResponse>
    where
        Fun: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Response<Res>>,
    {
        let processor = match self.process_request(request)? {
            Matched::Unmatched(request) => return Ok(handler(request).await),
            Matched::Payment(processor) => processor,
        };

        let response = processor
            .verify()
            .await?
            .run_handler(handler)
            .await
            .settle_on(|response| {
                !self.config.skip_settlement_on_error_status || response.status().as_u16() < 400
            })
            .await?
            .response();

        Ok(response)
    }

    /// Match the request to a priced route and extract its payment.
    pub fn process_request<Req>(
        &self,
        request: Request<Req>,
    ) -> Result<Matched<'_, F, Req>, ErrorResponse> {
        let Some(route) = self.routes.find(request.method(), request.uri().path()) else {
            return Ok(Matched::Unmatched(request));
        };

        let accepts = vec![self.payment_requirements(route, &request)?];

        let Some(header) = request.headers().get(X_PAYMENT) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(path = %request.uri().path(), "Payment required");
            return Err(self.payment_required(route, &request, accepts));
        };

        let header = header.to_str().map_err(|err| {
            self.invalid_payment(
                PaymentStage::Decoding,
                format!("Invalid or malformed payment header: {err}"),
                accepts.clone(),
            )
        })?;

        let payload = PaymentPayload::try_from(&Base64EncodedHeader::from(header)).map_err(|err| {
            self.invalid_payment(
                PaymentStage::Decoding,
                format!("Invalid or malformed payment header: {err}"),
                accepts.clone(),
            )
        })?;

        let Some(selected) = accepts.iter().find(|r| payload.matches(r)).cloned() else {
            return Err(self.invalid_payment(
                PaymentStage::RequirementMismatch,
                "Unable to find matching payment requirements",
                accepts,
            ));
        };

        Ok(Matched::Payment(RequestProcessor {
            paywall: self,
            request,
            accepts,
            payment_state: PaymentState::new(payload, selected),
        }))
    }

    /// Build the requirements a request to `route` must satisfy.
    pub fn payment_requirements<Req>(
        &self,
        route: &Route,
        request: &Request<Req>,
    ) -> Result<PaymentRequirements, ErrorResponse> {
        let config = &route.config;
        let options = &config.options;

        let atomic = process_price_to_atomic_amount(&config.price, &config.network)
            .map_err(|err| self.server_error(PaymentStage::Pricing, err, vec![]))?;

        let resource = match &options.resource {
            Some(resource) => resource.clone(),
            None => request_url(request)
                .map_err(|err| self.server_error(PaymentStage::Pricing, err, vec![]))?,
        };

        Ok(PaymentRequirements {
            scheme: SCHEME.to_string(),
            network: config.network.clone(),
            max_amount_required: atomic.max_amount_required,
            resource,
            description: options.description().to_string(),
            mime_type: options.mime_type().to_string(),
            pay_to: self.pay_to.to_string(),
            max_timeout_seconds: options.max_timeout_seconds(),
            asset: atomic.asset.address,
            output_schema: Some(json!({
                "input": {
                    "type": "http",
                    "method": request.method().as_str(),
                    "discoverable": options.discoverable.unwrap_or(true),
                },
                "output": options.output_schema,
            })),
            extra: atomic.asset.extra,
        })
    }

    /// Payment needed to access the resource: the paywall page for browsers, JSON otherwise.
    pub fn payment_required<Req>(
        &self,
        route: &Route,
        request: &Request<Req>,
        accepts: Vec<PaymentRequirements>,
    ) -> ErrorResponse {
        if !is_browser(request.headers()) {
            return self.rejection(
                StatusCode::PAYMENT_REQUIRED,
                PaymentStage::NoPayment,
                "X-PAYMENT header is required",
                accepts,
                None,
            );
        }

        let html = match &route.config.options.custom_paywall_html {
            Some(html) => html.clone(),
            None => {
                let current_url = accepts
                    .first()
                    .map(|r| r.resource.to_string())
                    .unwrap_or_default();
                PaywallPage {
                    amount: display_amount(&route.config.price),
                    requirements: &accepts,
                    current_url: &current_url,
                    testnet: EvmNetwork::by_name(&route.config.network)
                        .is_none_or(|network| network.testnet),
                    app_name: self.config.app_name.as_deref(),
                    app_logo: self.config.app_logo.as_deref(),
                }
                .render()
            }
        };

        ErrorResponse {
            status: StatusCode::PAYMENT_REQUIRED,
            stage: PaymentStage::NoPayment,
            body: ErrorBody::Html(html),
        }
    }

    /// Malformed payment header or no matching requirements.
    pub fn invalid_payment(
        &self,
        stage: PaymentStage,
        reason: impl Display,
        accepts: Vec<PaymentRequirements>,
    ) -> ErrorResponse {
        #[cfg(feature = "tracing")]
        tracing::debug!(?stage, "Invalid payment: {reason}");
        self.rejection(StatusCode::PAYMENT_REQUIRED, stage, reason, accepts, None)
    }

    /// Payment verification or settlement failed.
    pub fn payment_failed(
        &self,
        stage: PaymentStage,
        reason: impl Display,
        accepts: Vec<PaymentRequirements>,
        payer: Option<String>,
    ) -> ErrorResponse {
        #[cfg(feature = "tracing")]
        tracing::debug!(?stage, ?payer, "Payment failed: {reason}");
        self.rejection(StatusCode::PAYMENT_REQUIRED, stage, reason, accepts, payer)
    }

    /// Internal server error during payment processing.
    pub fn server_error(
        &self,
        stage: PaymentStage,
        reason: impl Display,
        accepts: Vec<PaymentRequirements>,
    ) -> ErrorResponse {
        #[cfg(feature = "tracing")]
        tracing::warn!(?stage, "Payment processing error: {reason}");
        self.rejection(
            StatusCode::INTERNAL_SERVER_ERROR,
            stage,
            reason,
            accepts,
            None,
        )
    }

    fn rejection(
        &self,
        status: StatusCode,
        stage: PaymentStage,
        error: impl Display,
        accepts: Vec<PaymentRequirements>,
        payer: Option<String>,
    ) -> ErrorResponse {
        ErrorResponse {
            status,
            stage,
            body: ErrorBody::Json(PaymentRequired {
                x402_version: X402Version::V1,
                error: error.to_string(),
                accepts,
                payer,
            }),
        }
    }
}

fn is_browser(headers: &HeaderMap) -> bool {
    let contains = |name, needle: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains(needle))
    };
    contains(ACCEPT, "text/html") && contains(USER_AGENT, "Mozilla")
}

#[derive(Debug, thiserror::Error)]
enum RequestUrlError {
    #[error("Cannot determine resource URL: request has no host")]
    MissingHost,
    #[error("Cannot determine resource URL: {0}")]
    Parse(#[from] url::ParseError),
}

/// Absolute URL of the request, rebuilt from the `Host` header when the URI is relative.
fn request_url<Req>(request: &Request<Req>) -> Result<Url, RequestUrlError> {
    let uri = request.uri();
    let authority = uri
        .authority()
        .map(|a| a.as_str())
        .or_else(|| request.headers().get(HOST).and_then(|h| h.to_str().ok()))
        .ok_or(RequestUrlError::MissingHost)?;
    let scheme = uri.scheme_str().unwrap_or("http");
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    Ok(Url::parse(&format!("{scheme}://{authority}{path}"))?)
}
