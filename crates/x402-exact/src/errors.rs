/// Failure to turn a header value back into a protocol object.
///
/// Decode errors describe a malformed client, not a failed payment, so they carry a
/// human-readable message instead of a reason code.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid UTF-8 in decoded header: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}
