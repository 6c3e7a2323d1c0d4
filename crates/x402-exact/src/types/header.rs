use std::fmt::Display;

use base64::{Engine, prelude::BASE64_STANDARD};
use serde::{Serialize, de::DeserializeOwned};

use crate::errors::DecodeError;

/// A header value carrying base64 encoded UTF-8 JSON, as used by `X-PAYMENT` and
/// `X-PAYMENT-RESPONSE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Base64EncodedHeader(pub String);

impl Base64EncodedHeader {
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(value)?;
        Ok(Base64EncodedHeader(BASE64_STANDARD.encode(json)))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let bytes = BASE64_STANDARD.decode(self.0.trim())?;
        let json = String::from_utf8(bytes)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Base64EncodedHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Base64EncodedHeader {
    fn from(value: &str) -> Self {
        Base64EncodedHeader(value.to_string())
    }
}

impl TryFrom<Base64EncodedHeader> for http::HeaderValue {
    type Error = http::header::InvalidHeaderValue;

    fn try_from(value: Base64EncodedHeader) -> Result<Self, Self::Error> {
        http::HeaderValue::from_str(&value.0)
    }
}
