use std::{convert::Infallible, sync::Arc};

use crate::{
    networks::NetworkFamily,
    schemes::{SchemeFacilitator, SchemeRegistry},
    transport::{
        ErrorReason, FacilitatorRequest, SettleResponse, SupportedResponse, VerifyResponse,
    },
};

/// The public facilitator used when none is configured.
pub const DEFAULT_FACILITATOR_URL: &str = "https://x402.org/facilitator";

/// X402 facilitator interface.
pub trait Facilitator {
    type Error: std::error::Error + Send + Sync + 'static;

    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send;

    fn verify(
        &self,
        request: FacilitatorRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    fn settle(
        &self,
        request: FacilitatorRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;
}

impl<F: Facilitator + Send + Sync> Facilitator for Arc<F> {
    type Error = F::Error;

    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send {
        (**self).supported()
    }

    fn verify(
        &self,
        request: FacilitatorRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send {
        (**self).verify(request)
    }

    fn settle(
        &self,
        request: FacilitatorRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send {
        (**self).settle(request)
    }
}

/// A facilitator running in-process, dispatching to registered schemes.
///
/// Requests for a scheme or network with no registered implementation are answered with
/// `invalid_scheme` or `invalid_network` rather than an error.
#[derive(Clone, Default)]
pub struct LocalFacilitator {
    schemes: SchemeRegistry<dyn SchemeFacilitator>,
}

impl LocalFacilitator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheme(
        mut self,
        scheme: impl Into<String>,
        family: NetworkFamily,
        facilitator: Arc<dyn SchemeFacilitator>,
    ) -> Self {
        self.schemes = self.schemes.register(scheme, family, facilitator);
        self
    }

    fn unsupported(request: &FacilitatorRequest) -> ErrorReason {
        match NetworkFamily::of(&request.payment_requirements.network) {
            Some(_) => ErrorReason::InvalidScheme,
            None => ErrorReason::InvalidNetwork,
        }
    }
}

impl Facilitator for LocalFacilitator {
    type Error = Infallible;

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        let mut kinds: Vec<_> = self.schemes.values().flat_map(|s| s.kinds()).collect();
        kinds.sort_by(|a, b| (&a.scheme, &a.network).cmp(&(&b.scheme, &b.network)));
        Ok(SupportedResponse { kinds })
    }

    async fn verify(&self, request: FacilitatorRequest) -> Result<VerifyResponse, Self::Error> {
        let requirements = &request.payment_requirements;
        match self.schemes.get(&requirements.scheme, &requirements.network) {
            Some(scheme) => Ok(scheme.verify(&request.payment_payload, requirements).await),
            None => Ok(VerifyResponse::invalid(Self::unsupported(&request), None)),
        }
    }

    async fn settle(&self, request: FacilitatorRequest) -> Result<SettleResponse, Self::Error> {
        let requirements = &request.payment_requirements;
        match self.schemes.get(&requirements.scheme, &requirements.network) {
            Some(scheme) => Ok(scheme.settle(&request.payment_payload, requirements).await),
            None => Ok(SettleResponse::failed(
                Self::unsupported(&request),
                "",
                requirements.network.clone(),
                None,
            )),
        }
    }
}
