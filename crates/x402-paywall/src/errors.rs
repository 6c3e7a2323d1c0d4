use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, header::CONTENT_TYPE};
use http_body_util::Full;
use x402_exact::transport::PaymentRequired;

use crate::paywall::PaymentStage;

/// A response produced by the paywall instead of the protected handler.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    /// The stage at which the request was stopped.
    pub stage: PaymentStage,
    pub body: ErrorBody,
}

#[derive(Debug, Clone)]
pub enum ErrorBody {
    Json(PaymentRequired),
    /// Paywall page served to browsers.
    Html(String),
}

impl ErrorResponse {
    /// The 402 body, when this is a JSON response.
    pub fn payment_required(&self) -> Option<&PaymentRequired> {
        match &self.body {
            ErrorBody::Json(body) => Some(body),
            ErrorBody::Html(_) => None,
        }
    }

    fn into_parts(self) -> (StatusCode, &'static str, Bytes) {
        match self.body {
            ErrorBody::Json(body) => {
                let bytes = serde_json::to_vec(&body).unwrap_or_else(|_err| {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Failed to serialize 402 body: {_err}");
                    b"{}".to_vec()
                });
                (self.status, "application/json", Bytes::from(bytes))
            }
            ErrorBody::Html(html) => (self.status, "text/html; charset=utf-8", Bytes::from(html)),
        }
    }
}

impl From<ErrorResponse> for Response<Full<Bytes>> {
    fn from(error: ErrorResponse) -> Self {
        let (status, content_type, body) = error.into_parts();
        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let (status, content_type, body) = self.into_parts();
        (status, [(CONTENT_TYPE, content_type)], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use x402_exact::types::X402Version;

    use super::*;

    #[tokio::test]
    async fn test_json_error_response() {
        let error = ErrorResponse {
            status: StatusCode::PAYMENT_REQUIRED,
            stage: PaymentStage::NoPayment,
            body: ErrorBody::Json(PaymentRequired {
                x402_version: X402Version::V1,
                error: "X-PAYMENT header is required".to_string(),
                accepts: vec![],
                payer: None,
            }),
        };
        let response: Response<Full<Bytes>> = error.into();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "x402Version": 1,
                "error": "X-PAYMENT header is required",
                "accepts": []
            })
        );
    }

    #[test]
    fn test_html_error_response() {
        let error = ErrorResponse {
            status: StatusCode::PAYMENT_REQUIRED,
            stage: PaymentStage::NoPayment,
            body: ErrorBody::Html("<html></html>".to_string()),
        };
        assert!(error.payment_required().is_none());
        let response: Response<Full<Bytes>> = error.into();
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
    }
}
