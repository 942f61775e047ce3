use thiserror::Error;

/// Errors raised while decoding a wire message. All of these indicate a
/// corrupted or truncated packet and are fatal to the affected endpoint.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("message too short: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("text field is not valid UTF-8")]
    BadText,
    #[error("flow payload length {actual} does not match {expected} records")]
    BadRecordCount { expected: usize, actual: usize },
}
