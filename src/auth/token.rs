use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};

use crate::error::{EngineError, EngineResult};

const DELIMITER: char = '|';

/// Builds the url-escaped api token carried as a path segment:
/// `base64url(email) | authentication_token`.
pub fn compose(email: &str, authentication_token: &str) -> String {
    let raw = format!("{}{DELIMITER}{authentication_token}", URL_SAFE.encode(email));
    utf8_percent_encode(&raw, NON_ALPHANUMERIC).to_string()
}

/// Splits a token into (email, secret). Purely structural; the secret is
/// checked against the directory by the gateway.
pub fn parse(raw: &str) -> EngineResult<(String, String)> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| EngineError::MalformedToken)?;
    let (identity, secret) = decoded
        .split_once(DELIMITER)
        .ok_or(EngineError::MalformedToken)?;
    if secret.is_empty() {
        return Err(EngineError::MalformedToken);
    }
    let email_bytes = URL_SAFE
        .decode(identity)
        .map_err(|_| EngineError::MalformedToken)?;
    let email = String::from_utf8(email_bytes).map_err(|_| EngineError::MalformedToken)?;
    Ok((email, secret.to_string()))
}
