//! Request signing for Binance signed endpoints

use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

use crate::common::errors::{OpsError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the API key on every signed request
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Sign a query string with HMAC-SHA256
///
/// Returns the hex-encoded signature to append as `&signature=<sig>`.
pub fn sign(query_string: &str, secret_key: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|e| OpsError::Authentication(format!("Failed to create HMAC: {}", e)))?;
    mac.update(query_string.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build the url-encoded, signed query for a request
///
/// `timestamp` and `recvWindow` are appended after the caller's params so the
/// signature covers the exact string that is sent.
pub fn signed_query(
    params: &[(&str, String)],
    secret_key: &str,
    timestamp_ms: i64,
    recv_window_ms: u64,
) -> Result<String> {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("recvWindow", &recv_window_ms.to_string());
    serializer.append_pair("timestamp", &timestamp_ms.to_string());
    let query = serializer.finish();

    let signature = sign(&query, secret_key)?;
    Ok(format!("{}&signature={}", query, signature))
}
