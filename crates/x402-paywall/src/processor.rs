use http::{HeaderValue, Request, Response};
use x402_exact::{
    facilitator::Facilitator,
    transport::{
        FacilitatorRequest, PaymentPayload, PaymentRequirements, SettleResponse, VerifyResponse,
        X_PAYMENT_RESPONSE,
    },
    types::Base64EncodedHeader,
};

use crate::{
    errors::ErrorResponse,
    paywall::{PayWall, PaymentStage},
};

/// The state of a payment processed by the paywall.
///
/// Attached to the request extensions before the resource handler runs.
#[derive(Debug, Clone)]
pub struct PaymentState {
    pub stage: PaymentStage,
    pub payload: PaymentPayload,
    /// The requirements the payload was matched against.
    pub requirements: PaymentRequirements,
    /// Verification result, once verified.
    pub verified: Option<VerifyResponse>,
    /// Settlement result, once settled.
    pub settled: Option<SettleResponse>,
}

impl PaymentState {
    pub fn new(payload: PaymentPayload, requirements: PaymentRequirements) -> Self {
        PaymentState {
            stage: PaymentStage::Verifying,
            payload,
            requirements,
            verified: None,
            settled: None,
        }
    }

    pub fn payer(&self) -> Option<&str> {
        self.verified.as_ref().and_then(|v| v.payer.as_deref())
    }

    fn facilitator_request(&self) -> FacilitatorRequest {
        FacilitatorRequest::new(self.payload.clone(), self.requirements.clone())
    }
}

/// A matched request whose payment has been decoded but not yet paid out.
pub struct RequestProcessor<'pw, F: Facilitator, Req> {
    pub paywall: &'pw PayWall<F>,
    pub request: Request<Req>,
    /// The requirements offered for the route, echoed in every rejection.
    pub accepts: Vec<PaymentRequirements>,
    pub payment_state: PaymentState,
}

impl<'pw, F: Facilitator, Req> RequestProcessor<'pw, F, Req> {
    /// Ask the facilitator whether the payload authorizes the selected requirements.
    ///
    /// An invalid payload becomes a 402 carrying the facilitator's reason and the payer. So
    /// does a facilitator that cannot be reached.
    pub async fn verify(mut self) -> Result<Self, ErrorResponse> {
        let response = self
            .paywall
            .facilitator
            .verify(self.payment_state.facilitator_request())
            .await
            .map_err(|err| {
                self.paywall.payment_failed(
                    PaymentStage::Verifying,
                    format!("Failed to verify payment: {err}"),
                    self.accepts.clone(),
                    None,
                )
            })?;

        if !response.is_valid {
            let reason = response
                .invalid_reason
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "Payment verification failed".to_string());
            return Err(self.paywall.payment_failed(
                PaymentStage::Verifying,
                reason,
                self.accepts,
                response.payer,
            ));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(payer = ?response.payer, "Payment verified");

        self.payment_state.stage = PaymentStage::Verified;
        self.payment_state.verified = Some(response);
        Ok(self)
    }

    /// Call `handler` with a [`PaymentState`] extension on the request.
    pub async fn run_handler<Fun, Fut, Res>(
        mut self,
        handler: Fun,
    ) -> ResponseProcessor<'pw, F, Res>
    where
        Fun: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Response<Res>>,
    {
        self.request
            .extensions_mut()
            .insert(self.payment_state.clone());

        let response = handler(self.request).await;
        ResponseProcessor {
            paywall: self.paywall,
            response,
            accepts: self.accepts,
            payment_state: self.payment_state,
        }
    }
}

/// The verified payment together with the handler's response.
///
/// The handler's response is held here until settlement has completed.
pub struct ResponseProcessor<'pw, F: Facilitator, Res> {
    pub paywall: &'pw PayWall<F>,
    pub response: Response<Res>,
    pub accepts: Vec<PaymentRequirements>,
    pub payment_state: PaymentState,
}

impl<'pw, F: Facilitator, Res> ResponseProcessor<'pw, F, Res> {
    /// Submit the authorization through the facilitator.
    ///
    /// On failure the handler's response is dropped and a 402 is returned instead.
    pub async fn settle(mut self) -> Result<Self, ErrorResponse> {
        let settlement = self
            .paywall
            .facilitator
            .settle(self.payment_state.facilitator_request())
            .await
            .map_err(|err| {
                self.paywall.payment_failed(
                    PaymentStage::SettlementFailed,
                    format!("Failed to settle payment: {err}"),
                    self.accepts.clone(),
                    self.payment_state.payer().map(str::to_string),
                )
            })?;

        if !settlement.success {
            let reason = settlement
                .error_reason
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "Settlement failed".to_string());
            let payer = settlement
                .payer
                .or_else(|| self.payment_state.payer().map(str::to_string));
            return Err(self.paywall.payment_failed(
                PaymentStage::SettlementFailed,
                reason,
                self.accepts,
                payer,
            ));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Settled {} on {} for payer {}",
            settlement.transaction,
            settlement.network,
            settlement.payer.as_deref().unwrap_or_default()
        );

        self.payment_state.stage = PaymentStage::Settled;
        self.payment_state.settled = Some(settlement);
        Ok(self)
    }

    /// Settle only when `predicate` accepts the handler's response.
    pub async fn settle_on(
        self,
        predicate: impl Fn(&Response<Res>) -> bool,
    ) -> Result<Self, ErrorResponse> {
        if predicate(&self.response) {
            self.settle().await
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Handler answered {}, leaving the authorization unsettled",
                self.response.status()
            );
            Ok(self)
        }
    }

    /// The handler's response, with `X-PAYMENT-RESPONSE` added once settled.
    pub fn response(self) -> Response<Res> {
        let mut response = self.response;

        if let Some(settled) = &self.payment_state.settled {
            let header = Base64EncodedHeader::try_from(settled)
                .inspect_err(|_err| {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Failed to encode X-PAYMENT-RESPONSE header: {_err}; skipping");
                })
                .ok()
                .and_then(|h| {
                    HeaderValue::try_from(h)
                        .inspect_err(|_err| {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(
                                "Failed to encode X-PAYMENT-RESPONSE header: {_err}; skipping"
                            );
                        })
                        .ok()
                });

            if let Some(header) = header {
                response.headers_mut().insert(X_PAYMENT_RESPONSE, header);
            }
        }

        response
    }
}
