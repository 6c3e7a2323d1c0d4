use std::{convert::Infallible, pin::Pin};

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use tower::{Layer, Service};
use x402_exact::facilitator::Facilitator;

use crate::paywall::PayWall;

impl<F: Facilitator + Clone, S> Layer<S> for PayWall<F> {
    type Service = PayWallService<F, S>;

    fn layer(&self, inner: S) -> Self::Service {
        PayWallService {
            paywall: self.clone(),
            inner,
        }
    }
}

#[derive(Clone)]
pub struct PayWallService<F: Facilitator, S> {
    paywall: PayWall<F>,
    inner: S,
}

impl<F, S> Service<Request> for PayWallService<F, S>
where
    F: Facilitator + Clone + Send + Sync + 'static,
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The ready service is the one that must handle this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let paywall = self.paywall.clone();

        Box::pin(async move {
            let response = paywall
                .handle_payment(request, move |req| {
                    let future = inner.call(req);
                    async move {
                        match future.await {
                            Ok(response) => response,
                            Err(never) => match never {},
                        }
                    }
                })
                .await
                .unwrap_or_else(|err| err.into_response());

            Ok(response)
        })
    }
}
