use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Extension, Json, Router,
    body::{Body, to_bytes},
    http::{
        HeaderMap, Request, StatusCode,
        header::{ACCEPT, CONTENT_TYPE, HOST, USER_AGENT},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use x402_exact::{
    facilitator::Facilitator,
    transport::{
        ErrorReason, FacilitatorRequest, SettleResponse, SupportedResponse, VerifyResponse,
        decode_payment_response,
    },
    types::Base64EncodedHeader,
};
use x402_paywall::{
    paywall::{PayWall, PayWallConfig},
    processor::PaymentState,
    routes::{RouteConfig, RouteOptions, RouteTable},
};

const PAYER: &str = "0x857b06519E91e3A54538791bDbb0E22373e36b66";

#[derive(Debug, thiserror::Error)]
#[error("facilitator unreachable")]
struct Unreachable;

/// Facilitator answering with canned results and recording the calls it receives.
#[derive(Clone)]
struct MockFacilitator {
    verify: Option<VerifyResponse>,
    settle: Option<SettleResponse>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl MockFacilitator {
    fn accepting() -> Self {
        MockFacilitator {
            verify: Some(VerifyResponse::valid(PAYER)),
            settle: Some(SettleResponse::success("0xabc123", "base-sepolia", PAYER)),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl Facilitator for MockFacilitator {
    type Error = Unreachable;

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        Ok(SupportedResponse::default())
    }

    async fn verify(&self, request: FacilitatorRequest) -> Result<VerifyResponse, Self::Error> {
        assert_eq!(request.payment_requirements.network, "base-sepolia");
        self.calls.lock().unwrap().push("verify");
        self.verify.clone().ok_or(Unreachable)
    }

    async fn settle(&self, _: FacilitatorRequest) -> Result<SettleResponse, Self::Error> {
        self.calls.lock().unwrap().push("settle");
        self.settle.clone().ok_or(Unreachable)
    }
}

struct App {
    router: Router,
    facilitator: MockFacilitator,
    hits: Arc<AtomicUsize>,
}

fn app(facilitator: MockFacilitator) -> App {
    app_with(facilitator, PayWallConfig::builder().app_name("Weather").build())
}

fn app_with(facilitator: MockFacilitator, config: PayWallConfig) -> App {
    let routes = RouteTable::new()
        .route("GET /weather", "$0.001")
        .unwrap()
        .route(
            "/reports/[id]",
            RouteConfig::builder()
                .price("$0.10")
                .options(
                    RouteOptions::builder()
                        .description("Quarterly report")
                        .mime_type("text/plain")
                        .build(),
                )
                .build(),
        )
        .unwrap();

    let paywall = PayWall::builder()
        .facilitator(facilitator.clone())
        .pay_to("0x209693Bc6afc0C5328bA36FaF03C514EF312287C".parse().unwrap())
        .routes(routes)
        .config(config)
        .build();

    let hits = Arc::new(AtomicUsize::new(0));
    let weather_hits = hits.clone();
    let report_hits = hits.clone();

    let router = Router::new()
        .route(
            "/weather",
            get(move |Extension(state): Extension<PaymentState>| async move {
                weather_hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "weather": "sunny", "payer": state.payer() }))
            }),
        )
        .route(
            "/reports/{id}",
            get(move || async move {
                report_hits.fetch_add(1, Ordering::SeqCst);
                (StatusCode::NOT_FOUND, "no such report").into_response()
            }),
        )
        .route("/free", get(|| async { "free" }))
        .layer(paywall);

    App {
        router,
        facilitator,
        hits,
    }
}

fn payment_header(network: &str) -> String {
    Base64EncodedHeader::encode(&json!({
        "x402Version": 1,
        "scheme": "exact",
        "network": network,
        "payload": {}
    }))
    .unwrap()
    .0
}

fn get_request(path: &str) -> axum::http::request::Builder {
    Request::get(path).header(HOST, "localhost:3000")
}

async fn send(
    app: &App,
    request: axum::http::request::Builder,
) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response: Response = app
        .router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_unpriced_route_passes_through() {
    let app = app(MockFacilitator::accepting());
    let (status, headers, body) = send(&app, get_request("/free")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"free");
    assert!(headers.get("x-payment-response").is_none());
    assert!(app.facilitator.calls().is_empty());
}

#[tokio::test]
async fn test_missing_payment_lists_route_requirements() {
    let app = app(MockFacilitator::accepting());
    let (status, headers, body) = send(&app, get_request("/weather")).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(headers[CONTENT_TYPE], "application/json");
    let body = json_body(&body);
    assert_eq!(body["x402Version"], json!(1));
    assert_eq!(body["error"], json!("X-PAYMENT header is required"));

    let accepts = body["accepts"].as_array().unwrap();
    assert_eq!(accepts.len(), 1);
    assert_eq!(accepts[0]["scheme"], json!("exact"));
    assert_eq!(accepts[0]["network"], json!("base-sepolia"));
    assert_eq!(accepts[0]["maxAmountRequired"], json!("1000"));
    assert_eq!(accepts[0]["resource"], json!("http://localhost:3000/weather"));
    assert_eq!(accepts[0]["mimeType"], json!("application/json"));
    assert_eq!(accepts[0]["maxTimeoutSeconds"], json!(300));
    assert_eq!(accepts[0]["extra"], json!({ "name": "USDC", "version": "2" }));

    assert_eq!(app.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_route_options_and_params() {
    let app = app(MockFacilitator::accepting());
    let (status, _, body) = send(&app, get_request("/reports/q3")).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    let body = json_body(&body);
    let accepts = &body["accepts"][0];
    assert_eq!(accepts["maxAmountRequired"], json!("100000"));
    assert_eq!(accepts["description"], json!("Quarterly report"));
    assert_eq!(accepts["mimeType"], json!("text/plain"));
}

#[tokio::test]
async fn test_browsers_get_paywall_page() {
    let app = app(MockFacilitator::accepting());
    let request = get_request("/weather")
        .header(ACCEPT, "text/html,application/xhtml+xml")
        .header(USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64)");
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(headers[CONTENT_TYPE], "text/html; charset=utf-8");
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("Weather - Payment Required"));
    assert!(html.contains("window.x402"));
}

#[tokio::test]
async fn test_malformed_header() {
    let app = app(MockFacilitator::accepting());
    let request = get_request("/weather").header("X-PAYMENT", "definitely not base64");
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    let body = json_body(&body);
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid or malformed payment header")
    );
    assert_eq!(body["accepts"].as_array().unwrap().len(), 1);
    assert!(app.facilitator.calls().is_empty());
}

#[tokio::test]
async fn test_payment_for_another_network() {
    let app = app(MockFacilitator::accepting());
    let request = get_request("/weather").header("X-PAYMENT", payment_header("base"));
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(
        json_body(&body)["error"],
        json!("Unable to find matching payment requirements")
    );
    assert!(app.facilitator.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_payment_is_rejected_before_the_handler() {
    let facilitator = MockFacilitator {
        verify: Some(VerifyResponse::invalid(
            ErrorReason::InsufficientFunds,
            Some(PAYER.to_string()),
        )),
        ..MockFacilitator::accepting()
    };
    let app = app(facilitator);
    let request = get_request("/weather").header("X-PAYMENT", payment_header("base-sepolia"));
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    let body = json_body(&body);
    assert_eq!(body["error"], json!("insufficient_funds"));
    assert_eq!(body["payer"], json!(PAYER));
    assert_eq!(body["accepts"].as_array().unwrap().len(), 1);
    assert_eq!(app.hits.load(Ordering::SeqCst), 0);
    assert_eq!(app.facilitator.calls(), vec!["verify"]);
}

#[tokio::test]
async fn test_unreachable_facilitator_rejects_payment() {
    let facilitator = MockFacilitator {
        verify: None,
        ..MockFacilitator::accepting()
    };
    let app = app(facilitator);
    let request = get_request("/weather").header("X-PAYMENT", payment_header("base-sepolia"));
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    let body = json_body(&body);
    assert_eq!(
        body["error"],
        json!("Failed to verify payment: facilitator unreachable")
    );
    assert_eq!(body["accepts"].as_array().unwrap().len(), 1);
    assert_eq!(app.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_paid_request_is_served_and_settled() {
    let app = app(MockFacilitator::accepting());
    let request = get_request("/weather").header("X-PAYMENT", payment_header("base-sepolia"));
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body),
        json!({ "weather": "sunny", "payer": PAYER })
    );

    let settled =
        decode_payment_response(headers["x-payment-response"].to_str().unwrap()).unwrap();
    assert!(settled.success);
    assert_eq!(settled.transaction, "0xabc123");
    assert_eq!(settled.payer.as_deref(), Some(PAYER));
    assert_eq!(app.facilitator.calls(), vec!["verify", "settle"]);
}

#[tokio::test]
async fn test_failed_settlement_discards_the_response() {
    let facilitator = MockFacilitator {
        settle: Some(SettleResponse::failed(
            ErrorReason::TransactionFailed,
            "0xdead",
            "base-sepolia",
            Some(PAYER.to_string()),
        )),
        ..MockFacilitator::accepting()
    };
    let app = app(facilitator);
    let request = get_request("/weather").header("X-PAYMENT", payment_header("base-sepolia"));
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(headers.get("x-payment-response").is_none());
    let body = json_body(&body);
    assert_eq!(body["error"], json!("transaction_failed"));
    assert_eq!(body["payer"], json!(PAYER));
    assert!(body.get("weather").is_none());
    assert_eq!(app.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_facilitator_during_settlement() {
    let facilitator = MockFacilitator {
        settle: None,
        ..MockFacilitator::accepting()
    };
    let app = app(facilitator);
    let request = get_request("/weather").header("X-PAYMENT", payment_header("base-sepolia"));
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(headers.get("x-payment-response").is_none());
    let body = json_body(&body);
    assert_eq!(
        body["error"],
        json!("Failed to settle payment: facilitator unreachable")
    );
    assert_eq!(body["payer"], json!(PAYER));
    assert_eq!(body["accepts"].as_array().unwrap().len(), 1);
    assert!(body.get("weather").is_none());
    assert_eq!(app.hits.load(Ordering::SeqCst), 1);
    assert_eq!(app.facilitator.calls(), vec!["verify", "settle"]);
}

#[tokio::test]
async fn test_error_responses_are_settled() {
    let app = app(MockFacilitator::accepting());
    let request = get_request("/reports/q4").header("X-PAYMENT", payment_header("base-sepolia"));
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"no such report");
    let settled =
        decode_payment_response(headers["x-payment-response"].to_str().unwrap()).unwrap();
    assert!(settled.success);
    assert_eq!(app.facilitator.calls(), vec!["verify", "settle"]);
}

#[tokio::test]
async fn test_error_responses_can_skip_settlement() {
    let app = app_with(
        MockFacilitator::accepting(),
        PayWallConfig::builder()
            .skip_settlement_on_error_status()
            .build(),
    );

    let request = get_request("/reports/q4").header("X-PAYMENT", payment_header("base-sepolia"));
    let (status, headers, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"no such report");
    assert!(headers.get("x-payment-response").is_none());
    assert_eq!(app.facilitator.calls(), vec!["verify"]);

    let request = get_request("/weather").header("X-PAYMENT", payment_header("base-sepolia"));
    let (status, headers, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("x-payment-response").is_some());
    assert_eq!(app.facilitator.calls(), vec!["verify", "verify", "settle"]);
}
