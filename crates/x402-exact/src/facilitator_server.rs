//! HTTP endpoints serving a [`Facilitator`]: `POST /verify`, `POST /settle`, `GET /supported`.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::{facilitator::Facilitator, transport::FacilitatorRequest};

/// Build a router exposing `facilitator` over HTTP.
pub fn facilitator_router<F>(facilitator: F) -> Router
where
    F: Facilitator + Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/verify", post(post_verify::<F>))
        .route("/settle", post(post_settle::<F>))
        .route("/supported", get(get_supported::<F>))
        .with_state(facilitator)
}

fn internal_error(error: impl std::error::Error) -> Response {
    #[cfg(feature = "tracing")]
    tracing::warn!(%error, "Facilitator request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": error.to_string() })),
    )
        .into_response()
}

async fn get_supported<F: Facilitator>(State(facilitator): State<F>) -> Response {
    match facilitator.supported().await {
        Ok(supported) => Json(supported).into_response(),
        Err(error) => internal_error(error),
    }
}

async fn post_verify<F: Facilitator>(
    State(facilitator): State<F>,
    Json(request): Json<FacilitatorRequest>,
) -> Response {
    match facilitator.verify(request).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => internal_error(error),
    }
}

async fn post_settle<F: Facilitator>(
    State(facilitator): State<F>,
    Json(request): Json<FacilitatorRequest>,
) -> Response {
    match facilitator.settle(request).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => internal_error(error),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use http::{Request, header::CONTENT_TYPE};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::{
        chain::mock::MockChain,
        facilitator::LocalFacilitator,
        networks::{NetworkFamily, evm::BASE_SEPOLIA},
        schemes::exact_evm_facilitator::ExactEvmFacilitator,
    };

    use super::*;

    fn router() -> Router {
        let exact = ExactEvmFacilitator::new().with_chain(BASE_SEPOLIA, MockChain::usdc());
        let facilitator =
            LocalFacilitator::new().with_scheme("exact", NetworkFamily::Evm, Arc::new(exact));
        facilitator_router(facilitator)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_supported() {
        let response = router()
            .oneshot(Request::get("/supported").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "kinds": [{ "x402Version": 1, "scheme": "exact", "network": "base-sepolia" }] })
        );
    }

    #[tokio::test]
    async fn test_verify_rejects_unknown_network() {
        let request = json!({
            "x402Version": 1,
            "paymentPayload": {
                "x402Version": 1,
                "scheme": "exact",
                "network": "solana",
                "payload": {}
            },
            "paymentRequirements": {
                "scheme": "exact",
                "network": "solana",
                "maxAmountRequired": "10000",
                "resource": "https://example.com/weather",
                "description": "",
                "mimeType": "application/json",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "maxTimeoutSeconds": 300,
                "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
            }
        });
        let response = router()
            .oneshot(
                Request::post("/verify")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(request.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "isValid": false, "invalidReason": "invalid_network" })
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let response = router()
            .oneshot(
                Request::post("/settle")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"x402Version\": 2}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
